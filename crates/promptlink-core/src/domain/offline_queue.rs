//! Bounded FIFO for prompts submitted while the client is offline.

use std::collections::VecDeque;
use std::time::SystemTime;

/// Default number of prompts held while offline.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10;

/// One queued item and when it was queued.
#[derive(Debug, Clone, PartialEq)]
pub struct Queued<T> {
    pub item: T,
    pub enqueued_at: SystemTime,
}

/// A FIFO that drops its oldest entry when full.
#[derive(Debug, Clone)]
pub struct OfflineQueue<T> {
    items: VecDeque<Queued<T>>,
    capacity: usize,
}

impl<T> OfflineQueue<T> {
    /// Creates an empty queue.  A zero capacity is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends `item`.  Returns the entry evicted to make room, if any.
    pub fn push(&mut self, item: T, now: SystemTime) -> Option<Queued<T>> {
        let evicted = if self.items.len() >= self.capacity {
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(Queued {
            item,
            enqueued_at: now,
        });
        evicted
    }

    /// Removes and returns every entry, oldest first.
    pub fn drain(&mut self) -> Vec<Queued<T>> {
        self.items.drain(..).collect()
    }

    /// Puts entries back at the front, preserving their order.
    ///
    /// Used when a flush is interrupted halfway.  Entries beyond capacity are
    /// dropped from the old end.
    pub fn requeue_front(&mut self, entries: Vec<Queued<T>>) {
        for entry in entries.into_iter().rev() {
            self.items.push_front(entry);
        }
        while self.items.len() > self.capacity {
            self.items.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<T> Default for OfflineQueue<T> {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, UNIX_EPOCH};

    use super::*;

    fn at(secs: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(secs)
    }

    #[test]
    fn test_eleventh_push_drops_oldest() {
        // Arrange
        let mut queue = OfflineQueue::default();
        for i in 0..10 {
            assert!(queue.push(format!("p{i}"), at(i)).is_none());
        }

        // Act
        let evicted = queue.push("p10".to_string(), at(10));

        // Assert
        assert_eq!(evicted.unwrap().item, "p0");
        assert_eq!(queue.len(), 10);
    }

    #[test]
    fn test_queue_never_exceeds_capacity() {
        let mut queue = OfflineQueue::default();
        for i in 0..100 {
            queue.push(i, at(i));
            assert!(queue.len() <= DEFAULT_QUEUE_CAPACITY);
        }
    }

    #[test]
    fn test_drain_returns_original_order_and_empties() {
        // Arrange
        let mut queue = OfflineQueue::default();
        for i in 0..13u64 {
            queue.push(i, at(i));
        }

        // Act
        let drained: Vec<u64> = queue.drain().into_iter().map(|q| q.item).collect();

        // Assert
        assert_eq!(drained, (3..13).collect::<Vec<_>>());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_entries_are_tagged_with_enqueue_time() {
        let mut queue = OfflineQueue::default();
        queue.push("a", at(42));
        assert_eq!(queue.drain()[0].enqueued_at, at(42));
    }

    #[test]
    fn test_requeue_front_restores_unsent_tail_in_order() {
        let mut queue = OfflineQueue::new(3);
        queue.push("a", at(1));
        queue.push("b", at(2));
        let mut drained = queue.drain();
        let unsent = drained.split_off(1);
        queue.push("c", at(3));

        queue.requeue_front(unsent);

        let order: Vec<&str> = queue.drain().into_iter().map(|q| q.item).collect();
        assert_eq!(order, vec!["b", "c"]);
    }

    #[test]
    fn test_zero_capacity_is_raised_to_one() {
        let mut queue = OfflineQueue::new(0);
        queue.push(1, at(0));
        queue.push(2, at(0));
        assert_eq!(queue.capacity(), 1);
        assert_eq!(queue.drain()[0].item, 2);
    }
}
