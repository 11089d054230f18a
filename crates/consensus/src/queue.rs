//! Order queue of pending requests, sorted by clock

use crate::{clock::Clock, types::Request};

/// Pending requests in ascending clock order.
///
/// Only stamped requests are queued. Entries are located by clock value, never by
/// position or identity, because every replica holds its own copy of a request.
#[derive(Debug, Default)]
pub struct OrderQueue {
    entries: Vec<(Clock, Request)>,
}

impl OrderQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a request and keep the queue sorted. A second insert of the same clock
    /// replaces the first.
    pub fn insert(&mut self, clock: Clock, request: Request) {
        let at = self.entries.partition_point(|(c, _)| *c < clock);
        match self.entries.get_mut(at) {
            Some(entry) if entry.0 == clock => entry.1 = request,
            _ => self.entries.insert(at, (clock, request)),
        }
    }

    /// Lowest-clock pending request
    pub fn head(&self) -> Option<&Request> {
        self.entries.first().map(|(_, r)| r)
    }

    /// Clock of the lowest pending request
    pub fn head_clock(&self) -> Option<Clock> {
        self.entries.first().map(|(c, _)| *c)
    }

    /// Remove the entry whose clock equals `clock`. `None` when it is not queued.
    pub fn remove_by_clock(&mut self, clock: Clock) -> Option<Request> {
        let at = self.position(clock)?;
        Some(self.entries.remove(at).1)
    }

    /// Index of `clock` in the queue, 0 meaning head
    pub fn position(&self, clock: Clock) -> Option<usize> {
        self.entries.binary_search_by(|(c, _)| c.cmp(&clock)).ok()
    }

    pub fn contains(&self, clock: Clock) -> bool {
        self.position(clock).is_some()
    }

    /// Pending requests in clock order
    pub fn pending(&self) -> Vec<Request> {
        self.entries.iter().map(|(_, r)| r.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(counter: u64, replica: u32) -> (Clock, Request) {
        let clock = Clock::new(counter, replica);
        (clock, Request::deposit(1, 1, "test").stamped(clock))
    }

    #[test]
    fn test_insert_keeps_clock_order() {
        let mut queue = OrderQueue::new();
        for (counter, replica) in [(3, 0), (1, 1), (2, 0), (1, 0), (3, 1)] {
            let (clock, r) = req(counter, replica);
            queue.insert(clock, r);
        }

        let order: Vec<Clock> = queue.pending().iter().filter_map(|r| r.clock()).collect();
        assert_eq!(
            order,
            vec![
                Clock::new(1, 0),
                Clock::new(1, 1),
                Clock::new(2, 0),
                Clock::new(3, 0),
                Clock::new(3, 1),
            ]
        );
        assert_eq!(queue.head_clock(), Some(Clock::new(1, 0)));
    }

    #[test]
    fn test_empty_head() {
        let queue = OrderQueue::new();
        assert!(queue.head().is_none());
        assert!(queue.head_clock().is_none());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_remove_by_clock() {
        let mut queue = OrderQueue::new();
        let (a, ra) = req(1, 0);
        let (b, rb) = req(2, 1);
        queue.insert(b, rb.clone());
        queue.insert(a, ra);

        assert_eq!(queue.remove_by_clock(b), Some(rb));
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.position(a), Some(0));

        queue.insert(a, Request::halt("dup").stamped(a));
        assert_eq!(queue.len(), 1);

        // Second removal of the same clock is not found, not a failure
        assert_eq!(queue.remove_by_clock(b), None);
        assert!(!queue.contains(Clock::new(9, 9)));
    }

    #[test]
    fn test_removal_matches_by_value() {
        let mut queue = OrderQueue::new();
        let (clock, r) = req(5, 2);
        queue.insert(clock, r.relabeled("Replica-2"));

        // A separately built copy with the same clock removes the queued entry
        let copy = Request::deposit(1, 1, "elsewhere").stamped(Clock::new(5, 2));
        assert!(queue.remove_by_clock(copy.clock().unwrap()).is_some());
        assert!(queue.is_empty());
    }
}
