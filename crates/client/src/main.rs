//! Bank Client
//!
//! Drives concurrent random transfers against the cluster, then checks that every
//! replica ended up with the same balances and halts the cluster.

use anyhow::{ensure, Context, Result};
use bank_consensus::{PeerService, Request};
use bank_ledger::{AccountId, Amount};
use bank_replica::ClusterConfig;
use bank_rpc::RpcPeer;
use clap::Parser;
use futures::future::join_all;
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::{collections::BTreeMap, path::PathBuf, sync::Arc, time::Instant};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod workload;

use workload::{pick_accounts, TaskStats};

/// Workload generator for the replicated bank
#[derive(Parser, Debug)]
#[command(name = "bank-client")]
#[command(about = "Random transfer workload against a bank cluster", long_about = None)]
struct Args {
    /// Cluster config file (JSON)
    #[arg(long, default_value = "cluster.json")]
    config: PathBuf,

    /// Concurrent client tasks
    #[arg(long, default_value = "4")]
    tasks: usize,

    /// Transfers issued by each task
    #[arg(long, default_value = "200")]
    transfers: usize,

    /// Amount moved by each transfer
    #[arg(long, default_value = "10")]
    amount: Amount,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Leave the cluster running afterwards
    #[arg(long)]
    no_halt: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    run(args).await
}

async fn run(args: Args) -> Result<()> {
    let config = ClusterConfig::load(&args.config)?;
    ensure!(
        config.initial_accounts >= 2,
        "Transfers need at least two accounts"
    );

    let mut replicas = Vec::new();
    for endpoint in &config.replicas {
        let peer = RpcPeer::new(endpoint.addr(), config.request_timeout())?;
        let id = peer
            .identity()
            .await
            .with_context(|| format!("Replica-{} at {} is not reachable", endpoint.id, endpoint.addr()))?;
        ensure!(
            id == endpoint.id,
            "{} answered as Replica-{}, expected Replica-{}",
            endpoint.addr(),
            id,
            endpoint.id
        );
        replicas.push(Arc::new(peer));
    }
    let replicas = Arc::new(replicas);

    tracing::info!(
        "Starting {} tasks x {} transfers of {} across {} replicas",
        args.tasks,
        args.transfers,
        args.amount,
        replicas.len()
    );
    let started = Instant::now();

    let tasks = (0..args.tasks).map(|task| {
        let replicas = replicas.clone();
        let accounts = config.initial_accounts;
        let (transfers, amount) = (args.transfers, args.amount);
        tokio::spawn(async move {
            let origin = format!("client-{}", task);
            let mut rng = StdRng::from_entropy();
            let mut stats = TaskStats::default();

            for _ in 0..transfers {
                let (from, to) = pick_accounts(&mut rng, accounts);
                let target = rng.gen_range(0..replicas.len());
                let request = Request::transfer(from, to, amount, origin.clone());

                let sent = Instant::now();
                match replicas[target].client_request(&request).await {
                    Ok(res) => {
                        let success = res.success() == Some(true);
                        tracing::debug!(
                            "{} -> Replica-{}: {} success={}",
                            origin,
                            target,
                            request,
                            success
                        );
                        stats.record(sent.elapsed(), success);
                    }
                    Err(e) => {
                        tracing::warn!("{} -> Replica-{}: {} failed: {}", origin, target, request, e);
                        stats.record_failure();
                    }
                }
            }
            stats
        })
    });

    let mut stats = TaskStats::default();
    for task in join_all(tasks).await {
        stats.merge(&task.context("Client task panicked")?);
    }

    tracing::info!(
        "Workload done in {:.2}s: {} applied, {} refused, {} failed",
        started.elapsed().as_secs_f64(),
        stats.succeeded,
        stats.rejected,
        stats.failed
    );
    if let Some(avg) = stats.average_latency() {
        tracing::info!("Average request latency: {:.4}s", avg.as_secs_f64());
    }

    verify_balances(&replicas, &config).await?;

    if !args.no_halt {
        halt(&replicas[0]).await?;
    }

    Ok(())
}

/// Read every balance from every replica and compare them
async fn verify_balances(replicas: &[Arc<RpcPeer>], config: &ClusterConfig) -> Result<()> {
    let expected_total = Amount::from(config.initial_accounts) * config.initial_balance;
    let mut snapshots: Vec<BTreeMap<AccountId, Amount>> = Vec::new();

    for (i, replica) in replicas.iter().enumerate() {
        let mut balances = BTreeMap::new();
        for uid in 1..=config.initial_accounts {
            let res = replica
                .client_request(&Request::get_balance(uid, "client"))
                .await
                .with_context(|| format!("Cannot read balance of {} from Replica-{}", uid, i))?;
            balances.insert(uid, res.balance().unwrap_or_default());
        }

        let total: Amount = balances.values().sum();
        if total == expected_total {
            tracing::info!("Replica-{} total balance: {}", i, total);
        } else {
            tracing::error!(
                "Replica-{} total balance: {}, expected {}",
                i,
                total,
                expected_total
            );
        }
        snapshots.push(balances);
    }

    // Reads are not ordered, so in-flight commits from other clients can show here
    for (i, balances) in snapshots.iter().enumerate().skip(1) {
        if *balances != snapshots[0] {
            tracing::warn!("Replica-{} balances differ from Replica-0", i);
        }
    }
    Ok(())
}

/// Send `Halt`; the replica may shut down before its reply arrives
async fn halt(replica: &RpcPeer) -> Result<()> {
    match replica.client_request(&Request::halt("client")).await {
        Ok(res) => {
            if let Some(report) = res.halt_report() {
                tracing::info!(
                    "Replica-{} halted: total={}, {} pending",
                    report.replica,
                    report.total,
                    report.pending.len()
                );
            }
            Ok(())
        }
        Err(e) if e.is_delivery_failure() => {
            tracing::info!("Halt sent, replica stopped before replying: {}", e);
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
