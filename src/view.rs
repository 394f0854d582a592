use crate::entry::SubtitleEntry;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;

pub const DEFAULT_DISPLAY_COUNT: usize = 10;
pub const DEFAULT_MAX_DISPLAY_COUNT: usize = 50;

/// Consumer-side mirror of the producer's history.
///
/// The watcher replaces the whole sequence with one pointer swap; readers
/// get an `Arc` to a complete sequence and never wait on a parse.
#[derive(Debug)]
pub struct ViewState {
    entries: ArcSwap<Vec<SubtitleEntry>>,
    display_count: AtomicUsize,
    max_display_count: usize,
}

impl ViewState {
    pub fn new(display_count: usize, max_display_count: usize) -> Self {
        let max_display_count = max_display_count.max(1);
        Self {
            entries: ArcSwap::from_pointee(Vec::new()),
            display_count: AtomicUsize::new(display_count.clamp(1, max_display_count)),
            max_display_count,
        }
    }

    pub fn replace(&self, entries: Vec<SubtitleEntry>) {
        self.entries.store(Arc::new(entries));
    }

    pub fn read(&self) -> Arc<Vec<SubtitleEntry>> {
        self.entries.load_full()
    }

    /// The trailing `display_count` entries, oldest first.
    pub fn visible(&self) -> Vec<SubtitleEntry> {
        let entries = self.read();
        let skip = entries.len().saturating_sub(self.display_count());
        entries[skip..].to_vec()
    }

    pub fn display_count(&self) -> usize {
        self.display_count.load(Ordering::Relaxed)
    }

    /// Returns the value actually stored after clamping to
    /// `1..=max_display_count`.
    pub fn set_display_count(&self, count: usize) -> usize {
        let count = count.clamp(1, self.max_display_count);
        self.display_count.store(count, Ordering::Relaxed);
        count
    }

    pub fn max_display_count(&self) -> usize {
        self.max_display_count
    }
}

impl Default for ViewState {
    fn default() -> Self {
        Self::new(DEFAULT_DISPLAY_COUNT, DEFAULT_MAX_DISPLAY_COUNT)
    }
}
