//! Deferred stream status transitions.
//!
//! Transitions are kept in a min-heap keyed by fire time; entries with the
//! same fire time come out in the order they were scheduled. The queue holds
//! no locks and never touches streams: the registry drains due entries and
//! applies them.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use kinesim_types::StreamStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Move to ACTIVE, but only if the stream is still in `from`
    Activate { from: StreamStatus },
    /// Drop a DELETING stream from the registry
    Remove,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deferred {
    pub fire_at_ms: i64,
    pub stream: String,
    /// Incarnation the transition was scheduled for; a re-created stream ignores it
    pub incarnation: u64,
    pub transition: Transition,
    order: u64,
}

impl Ord for Deferred {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.fire_at_ms, self.order).cmp(&(other.fire_at_ms, other.order))
    }
}

impl PartialOrd for Deferred {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Default)]
pub struct StatusScheduler {
    queue: BinaryHeap<Reverse<Deferred>>,
    next_order: u64,
}

impl StatusScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(
        &mut self,
        fire_at_ms: i64,
        stream: impl Into<String>,
        incarnation: u64,
        transition: Transition,
    ) {
        let order = self.next_order;
        self.next_order += 1;
        self.queue.push(Reverse(Deferred {
            fire_at_ms,
            stream: stream.into(),
            incarnation,
            transition,
            order,
        }));
    }

    /// Remove and return every transition due at or before `now_ms`, earliest first.
    pub fn take_due(&mut self, now_ms: i64) -> Vec<Deferred> {
        let mut due = Vec::new();
        while self
            .queue
            .peek()
            .is_some_and(|Reverse(next)| next.fire_at_ms <= now_ms)
        {
            if let Some(Reverse(deferred)) = self.queue.pop() {
                due.push(deferred);
            }
        }
        due
    }

    pub fn next_fire_at(&self) -> Option<i64> {
        self.queue.peek().map(|Reverse(next)| next.fire_at_ms)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_due_in_fire_order() {
        let mut scheduler = StatusScheduler::new();
        scheduler.schedule(300, "c", 1, Transition::Remove);
        scheduler.schedule(100, "a", 1, Transition::Activate { from: StreamStatus::Creating });
        scheduler.schedule(200, "b", 1, Transition::Remove);

        assert_eq!(scheduler.next_fire_at(), Some(100));
        let due: Vec<_> = scheduler.take_due(250).into_iter().map(|d| d.stream).collect();
        assert_eq!(due, vec!["a", "b"]);
        assert_eq!(scheduler.len(), 1);
        assert!(scheduler.take_due(299).is_empty());
    }

    #[test]
    fn test_ties_are_fifo() {
        let mut scheduler = StatusScheduler::new();
        for name in ["first", "second", "third"] {
            scheduler.schedule(50, name, 1, Transition::Remove);
        }

        let due: Vec<_> = scheduler.take_due(50).into_iter().map(|d| d.stream).collect();
        assert_eq!(due, vec!["first", "second", "third"]);
        assert!(scheduler.is_empty());
    }
}
