use crate::entry::SubtitleEntry;

use std::collections::VecDeque;

use tracing::debug;

pub const DEFAULT_CAPACITY: usize = 50;

/// Bounded, capture-ordered subtitle history. Once full, appending evicts
/// the oldest entry.
#[derive(Debug)]
pub struct HistoryBuffer {
    entries: VecDeque<SubtitleEntry>,
    capacity: usize,
}

impl HistoryBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends at the tail, returning the evicted head if the bound was exceeded.
    pub fn append(&mut self, entry: SubtitleEntry) -> Option<SubtitleEntry> {
        self.entries.push_back(entry);
        if self.entries.len() > self.capacity {
            self.entries.pop_front()
        } else {
            None
        }
    }

    pub fn clear(&mut self, reason: &str) {
        debug!(reason, dropped = self.entries.len(), "clearing subtitle history");
        self.entries.clear();
    }

    pub fn snapshot(&self) -> Vec<SubtitleEntry> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for HistoryBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
