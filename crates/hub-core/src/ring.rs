//! Bounded ring buffer with drop-oldest eviction

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Fixed-capacity buffer. Pushing into a full buffer evicts the oldest item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RingBuffer<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> RingBuffer<T> {
    /// Create an empty buffer. A capacity of zero is bumped to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    /// Append an item, returning the evicted one if the buffer was full
    pub fn push(&mut self, item: T) -> Option<T> {
        let evicted = if self.items.len() == self.capacity {
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(item);
        evicted
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

    /// Iterate oldest first
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator {
        self.items.iter()
    }

    /// The most recent `n` items, oldest first
    pub fn recent(&self, n: usize) -> impl Iterator<Item = &T> {
        let skip = self.items.len().saturating_sub(n);
        self.items.iter().skip(skip)
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

impl<T> Extend<T> for RingBuffer<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for item in iter {
            self.push(item);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_evicts_oldest() {
        let mut ring = RingBuffer::new(3);
        assert!(ring.push(1).is_none());
        ring.push(2);
        ring.push(3);
        assert_eq!(ring.push(4), Some(1));
        assert_eq!(ring.iter().copied().collect::<Vec<_>>(), vec![2, 3, 4]);
    }

    #[test]
    fn test_recent() {
        let mut ring = RingBuffer::new(10);
        ring.extend(1..=6);
        assert_eq!(ring.recent(2).copied().collect::<Vec<_>>(), vec![5, 6]);
        assert_eq!(ring.recent(100).count(), 6);
    }

    #[test]
    fn test_zero_capacity() {
        let mut ring = RingBuffer::new(0);
        ring.push("a");
        ring.push("b");
        assert_eq!(ring.len(), 1);
        assert_eq!(ring.capacity(), 1);
    }
}
