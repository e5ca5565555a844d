//! Fixed-capacity ring buffer
//!
//! Once full, pushing evicts the oldest element.

use std::collections::VecDeque;

/// Bounded FIFO that keeps the newest `capacity` elements
#[derive(Debug, Clone)]
pub struct BoundedBuffer<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> BoundedBuffer<T> {
    /// Create an empty buffer; a capacity of 0 is treated as 1
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    /// Append an element, returning the evicted one if the buffer was full
    pub fn push(&mut self, item: T) -> Option<T> {
        let evicted = if self.items.len() == self.capacity {
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(item);
        evicted
    }

    /// Number of stored elements
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the buffer is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Maximum number of stored elements
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Iterate from oldest to newest
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator {
        self.items.iter()
    }

    /// The newest `n` elements, oldest first
    pub fn latest(&self, n: usize) -> impl Iterator<Item = &T> {
        self.items.iter().skip(self.items.len().saturating_sub(n))
    }

    /// Newest element
    #[must_use]
    pub fn last(&self) -> Option<&T> {
        self.items.back()
    }
}

impl<T: Clone> BoundedBuffer<T> {
    /// Copy the contents, oldest first
    #[must_use]
    pub fn to_vec(&self) -> Vec<T> {
        self.items.iter().cloned().collect()
    }
}

impl<T> Extend<T> for BoundedBuffer<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for item in iter {
            self.push(item);
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]
    use super::*;

    #[test]
    fn test_push_evicts_oldest_when_full() {
        let mut buffer = BoundedBuffer::new(3);
        assert_eq!(buffer.push(1), None);
        assert_eq!(buffer.push(2), None);
        assert_eq!(buffer.push(3), None);
        assert_eq!(buffer.push(4), Some(1));
        assert_eq!(buffer.to_vec(), vec![2, 3, 4]);
        assert_eq!(buffer.len(), 3);
    }

    #[test]
    fn test_zero_capacity_keeps_one() {
        let mut buffer = BoundedBuffer::new(0);
        buffer.push("a");
        buffer.push("b");
        assert_eq!(buffer.capacity(), 1);
        assert_eq!(buffer.to_vec(), vec!["b"]);
    }

    #[test]
    fn test_latest_returns_newest_in_order() {
        let mut buffer = BoundedBuffer::new(10);
        buffer.extend(1..=6);
        let latest: Vec<_> = buffer.latest(3).copied().collect();
        assert_eq!(latest, vec![4, 5, 6]);

        let all: Vec<_> = buffer.latest(100).copied().collect();
        assert_eq!(all.len(), 6);
        assert_eq!(buffer.last(), Some(&6));
    }
}
