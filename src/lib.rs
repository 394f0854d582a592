//! File-based synchronization of a bounded subtitle history between a media
//! player script (the producer) and a live viewer (the consumer).
//!
//! The producer keeps a [`HistoryBuffer`] and rewrites the whole interchange
//! file after every mutation. The consumer watches that file and swaps each
//! complete snapshot into a [`ViewState`]. The file is the only channel
//! between the two processes.

pub mod config;
pub mod entry;
pub mod error;
pub mod filter;
pub mod history;
pub mod host;
pub mod logger;
pub mod producer;
pub mod seek;
pub mod snapshot;
pub mod view;
pub mod watcher;

pub use crate::config::Config;
pub use crate::entry::SubtitleEntry;
pub use crate::error::{Result, SubhistError};
pub use crate::history::HistoryBuffer;
pub use crate::producer::{PlayerEvent, ProducerContext, Track};
pub use crate::seek::{SeekDecision, SeekDetector};
pub use crate::snapshot::{Snapshot, SnapshotReader, SnapshotWriter};
pub use crate::view::ViewState;
pub use crate::watcher::{ChangeWatcher, WatcherHandle};
