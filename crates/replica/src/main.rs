//! Bank Replica
//!
//! Runs one replica of the bank: serves JSON-RPC, connects to every peer in the
//! cluster config, then handles client requests until a `Halt` is executed.

use anyhow::{Context, Result};
use bank_consensus::{
    Event, EventKind, EventSink, JsonLinesSink, Replica, ReplicaBuilder, ReplicaId, Sinks,
    TracingSink,
};
use bank_replica::ClusterConfig;
use bank_rpc::{resolve_peer, HttpRpcServer, RpcContext, RpcServerConfig};
use clap::Parser;
use std::{path::PathBuf, sync::Arc, time::Duration};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Replica of the replicated bank
#[derive(Parser, Debug)]
#[command(name = "bank-replica")]
#[command(about = "Actively replicated bank ledger replica", long_about = None)]
struct Args {
    /// Id of this replica in the cluster config
    #[arg(long)]
    id: ReplicaId,

    /// Cluster config file (JSON)
    #[arg(long, default_value = "cluster.json")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Append protocol events to this file as JSON lines
    #[arg(long)]
    event_log: Option<PathBuf>,

    /// Delay between executing Halt and stopping the server
    #[arg(long, default_value = "200")]
    halt_grace_ms: u64,

    /// Stop on its own after this many seconds (0 = never)
    #[arg(long, default_value = "300")]
    lifetime_secs: u64,

    /// Time in-flight calls get to finish once shutdown starts
    #[arg(long, default_value = "5000")]
    drain_ms: u64,
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
    let endpoint = config.endpoint(args.id)?.clone();

    tracing::info!("Starting bank replica {}", args.id);
    tracing::info!("  Cluster: {} replicas", config.replicas.len());
    tracing::info!(
        "  Accounts: 1..={} at {}",
        config.initial_accounts,
        config.initial_balance
    );

    let mut sinks = Sinks::new().with(Arc::new(TracingSink));
    if let Some(path) = &args.event_log {
        let sink = JsonLinesSink::open(path)
            .with_context(|| format!("Cannot open event log {:?}", path))?;
        sinks = sinks.with(Arc::new(sink));
    }
    let events: Arc<dyn EventSink> = Arc::new(sinks);

    let replica = Arc::new(
        ReplicaBuilder::new(args.id)
            .initial_accounts(config.initial_accounts, config.initial_balance)
            .halt_grace(Duration::from_millis(args.halt_grace_ms))
            .events(events.clone())
            .build()?,
    );
    let shutdown = replica.shutdown_signal().clone();

    // Serve first, peers resolve us while we resolve them
    let rpc_config = RpcServerConfig {
        http_addr: endpoint.addr(),
        drain_timeout: Duration::from_millis(args.drain_ms),
    };
    let server = HttpRpcServer::new(rpc_config, Arc::new(RpcContext::new(replica.clone())));
    let listener = server.bind().await?;
    let local = listener.local_addr()?;
    let http_server = tokio::spawn(server.serve(listener, shutdown.clone()));
    events.record(
        Event::new(EventKind::Live, args.id).with_params(format!("listening on {}", local)),
    );

    tokio::select! {
        result = connect_peers(&replica, &config, events.as_ref()) => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted while connecting to peers");
            shutdown.trigger();
            return join_server(http_server).await;
        }
    }
    replica.mark_ready();

    tracing::info!("Replica {} ready. Press Ctrl+C to stop.", args.id);

    tokio::select! {
        _ = shutdown.wait() => {
            tracing::info!("Halt executed, shutting down...");
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutting down...");
            shutdown.trigger();
        }
        _ = lifetime(args.lifetime_secs) => {
            tracing::warn!("No halt after {}s, shutting down", args.lifetime_secs);
            shutdown.trigger();
        }
    }

    join_server(http_server).await?;
    tracing::info!("Replica {} stopped", args.id);

    Ok(())
}

/// Resolve every other replica in the config and register it as a peer
async fn connect_peers(
    replica: &Replica,
    config: &ClusterConfig,
    events: &dyn EventSink,
) -> Result<()> {
    let resolver = config.resolver();
    for peer in config.peers_of(replica.id()) {
        let addr = peer.addr();
        let link = resolve_peer(replica.id(), peer.id, &addr, &resolver, events)
            .await
            .with_context(|| format!("Cannot connect to Replica-{} at {}", peer.id, addr))?;
        replica.add_peer(Arc::new(link));
    }
    Ok(())
}

async fn lifetime(secs: u64) {
    if secs == 0 {
        std::future::pending::<()>().await;
    } else {
        tokio::time::sleep(Duration::from_secs(secs)).await;
    }
}

async fn join_server(handle: tokio::task::JoinHandle<Result<()>>) -> Result<()> {
    match handle.await {
        Ok(result) => result,
        Err(e) => {
            tracing::error!("HTTP RPC server task failed: {}", e);
            Err(e.into())
        }
    }
}
