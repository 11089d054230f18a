//! Transfer workload and its statistics

use bank_ledger::AccountId;
use rand::Rng;
use std::time::Duration;

/// Two distinct accounts from `1..=accounts`
pub fn pick_accounts<R: Rng>(rng: &mut R, accounts: u32) -> (AccountId, AccountId) {
    let from = rng.gen_range(1..=accounts);
    // Draw from the remaining ids and skip over `from`
    let mut to = rng.gen_range(1..accounts);
    if to >= from {
        to += 1;
    }
    (from, to)
}

/// Outcome counts and latency of one or more workload tasks
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TaskStats {
    /// Transfers applied
    pub succeeded: u64,
    /// Transfers refused for insufficient funds
    pub rejected: u64,
    /// Calls that returned an error
    pub failed: u64,
    /// Summed latency of calls that returned a response
    pub latency: Duration,
}

impl TaskStats {
    pub fn record(&mut self, elapsed: Duration, success: bool) {
        if success {
            self.succeeded += 1;
        } else {
            self.rejected += 1;
        }
        self.latency += elapsed;
    }

    pub fn record_failure(&mut self) {
        self.failed += 1;
    }

    pub fn merge(&mut self, other: &TaskStats) {
        self.succeeded += other.succeeded;
        self.rejected += other.rejected;
        self.failed += other.failed;
        self.latency += other.latency;
    }

    pub fn answered(&self) -> u64 {
        self.succeeded + self.rejected
    }

    /// Mean latency of answered calls
    pub fn average_latency(&self) -> Option<Duration> {
        let answered = u32::try_from(self.answered()).ok().filter(|n| *n > 0)?;
        Some(self.latency / answered)
    }
}
