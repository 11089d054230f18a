//! Logical clocks
//!
//! A `Clock` is a `(counter, replica)` pair. Counters issued by one replica are
//! strictly increasing and the replica id breaks ties, so no two requests in the
//! whole system ever share a clock.

use serde::{Deserialize, Serialize};
use std::{
    cmp::Ordering as CmpOrdering,
    fmt,
    sync::atomic::{AtomicU64, Ordering},
};

/// Replica identifier, fixed for the process lifetime
pub type ReplicaId = u32;

/// Logical timestamp attached to a request when it is first received
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Clock {
    pub counter: u64,
    pub replica: ReplicaId,
}

impl Clock {
    pub fn new(counter: u64, replica: ReplicaId) -> Self {
        Self { counter, replica }
    }
}

impl Ord for Clock {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.counter
            .cmp(&other.counter)
            .then(self.replica.cmp(&other.replica))
    }
}

impl PartialOrd for Clock {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Clock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.counter, self.replica)
    }
}

/// Per-replica counter source
#[derive(Debug)]
pub struct LogicalClock {
    replica: ReplicaId,
    counter: AtomicU64,
}

impl LogicalClock {
    pub fn new(replica: ReplicaId) -> Self {
        Self {
            replica,
            counter: AtomicU64::new(0),
        }
    }

    /// Advance the counter by one and return the new value
    pub fn increment(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Advance and stamp a clock owned by this replica
    pub fn tick(&self) -> Clock {
        Clock::new(self.increment(), self.replica)
    }

    /// Move the counter forward to at least the counter of an observed clock
    pub fn witness(&self, observed: Clock) {
        self.counter.fetch_max(observed.counter, Ordering::SeqCst);
    }

    /// Current counter value
    pub fn current(&self) -> u64 {
        self.counter.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{collections::HashSet, sync::Arc, thread};

    #[test]
    fn test_clock_ordering() {
        assert!(Clock::new(1, 5) < Clock::new(2, 0));
        assert!(Clock::new(3, 0) < Clock::new(3, 1));
        assert_eq!(Clock::new(3, 1).cmp(&Clock::new(3, 1)), CmpOrdering::Equal);
        assert_eq!(Clock::new(7, 2).to_string(), "[7, 2]");
    }

    #[test]
    fn test_increment_strictly_increasing() {
        let clock = LogicalClock::new(0);
        let a = clock.tick();
        let b = clock.tick();
        assert_eq!(a, Clock::new(1, 0));
        assert_eq!(b, Clock::new(2, 0));
        assert!(a < b);
    }

    #[test]
    fn test_concurrent_increment_is_unique() {
        let clock = Arc::new(LogicalClock::new(1));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let clock = clock.clone();
                thread::spawn(move || (0..500).map(|_| clock.increment()).collect::<Vec<_>>())
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for value in handle.join().unwrap() {
                assert!(seen.insert(value), "counter {} issued twice", value);
            }
        }
        assert_eq!(seen.len(), 4000);
        assert_eq!(clock.current(), 4000);
    }

    #[test]
    fn test_witness_never_moves_backwards() {
        let clock = LogicalClock::new(0);
        clock.witness(Clock::new(10, 3));
        assert_eq!(clock.tick(), Clock::new(11, 0));

        clock.witness(Clock::new(4, 1));
        assert_eq!(clock.current(), 11);
    }
}
