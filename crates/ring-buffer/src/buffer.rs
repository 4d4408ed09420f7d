//! Bounded Ring Buffer Implementation

use std::collections::VecDeque;

/// Default buffer capacity for the live sample stream
pub const DEFAULT_CAPACITY: usize = 500;

/// Fixed-capacity FIFO that overwrites its oldest entry when full
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    storage: VecDeque<T>,
    capacity: usize,
    total_written: usize,
}

impl<T: Clone> RingBuffer<T> {
    /// Create a new ring buffer with given capacity (at least 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            storage: VecDeque::with_capacity(capacity),
            capacity,
            total_written: 0,
        }
    }

    /// Push an item, returning the evicted oldest item if the buffer was full
    pub fn push(&mut self, item: T) -> Option<T> {
        let evicted = if self.storage.len() == self.capacity {
            self.storage.pop_front()
        } else {
            None
        };
        self.storage.push_back(item);
        self.total_written += 1;
        evicted
    }

    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.storage.len() == self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Most recent item
    pub fn latest(&self) -> Option<&T> {
        self.storage.back()
    }

    /// Copy of the last N items, oldest first
    pub fn read_last(&self, count: usize) -> Vec<T> {
        let skip = self.storage.len().saturating_sub(count);
        self.storage.iter().skip(skip).cloned().collect()
    }

    /// Copy of the whole contents, oldest first
    pub fn snapshot(&self) -> Vec<T> {
        self.storage.iter().cloned().collect()
    }

    /// Iterate oldest first without copying
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        self.storage.iter()
    }

    /// Total items ever pushed (for statistics)
    pub fn total_written(&self) -> usize {
        self.total_written
    }

    /// Clear the buffer; the write counter is kept
    pub fn clear(&mut self) {
        self.storage.clear();
    }
}
