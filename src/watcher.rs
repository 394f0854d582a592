//! Keeps a [`ViewState`] in step with the interchange file.
//!
//! A [`ChangeSource`] turns file-system activity into [`ChangeEvent`]s. The
//! [`ChangeWatcher`] thread collapses each burst of events arriving within the
//! debounce window into one re-read, and replaces the view only when the read
//! produced a complete, valid snapshot.

use crate::error::{Result, SubhistError};
use crate::snapshot::{parent_dir, Snapshot, SnapshotReader};
use crate::view::ViewState;

use std::ffi::OsString;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant, SystemTime};

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde::Deserialize;
use tracing::{debug, info, warn};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(50);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// How often a blocked watcher thread wakes up to check for shutdown.
const SHUTDOWN_POLL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeEvent {
    Modified,
    Removed,
}

/// A stream of change events for one path. Dropping it releases whatever
/// resource produces the events.
pub struct Subscription {
    events: Receiver<ChangeEvent>,
    _guard: Box<dyn Send>,
}

impl Subscription {
    pub fn new<G: Send + 'static>(events: Receiver<ChangeEvent>, guard: G) -> Self {
        Self {
            events,
            _guard: Box::new(guard),
        }
    }
}

pub trait ChangeSource {
    fn subscribe(&self, path: &Path) -> Result<Subscription>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WatchMode {
    Native,
    Poll,
}

/// Opens a subscription in the requested mode. A native watcher that cannot
/// be created falls back to polling.
pub fn open_subscription(
    mode: WatchMode,
    path: &Path,
    poll_interval: Duration,
) -> Result<Subscription> {
    match mode {
        WatchMode::Poll => PollSource::new(poll_interval).subscribe(path),
        WatchMode::Native => match NotifySource.subscribe(path) {
            Ok(subscription) => Ok(subscription),
            Err(err) => {
                warn!(error = %err, "native file watching unavailable, polling instead");
                PollSource::new(poll_interval).subscribe(path)
            }
        },
    }
}

/// OS file-system notifications via `notify`.
///
/// The parent directory is watched rather than the file itself, since every
/// snapshot write replaces the file's inode.
#[derive(Debug, Default, Clone, Copy)]
pub struct NotifySource;

impl ChangeSource for NotifySource {
    fn subscribe(&self, path: &Path) -> Result<Subscription> {
        let (tx, rx) = mpsc::channel();
        let target = path.file_name().map(OsString::from);
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if let Some(change) = classify(&event, target.as_deref()) {
                        let _ = tx.send(change);
                    }
                }
                Err(err) => {
                    // Events may have been lost; force a re-read.
                    warn!(error = %err, "watch error");
                    let _ = tx.send(ChangeEvent::Modified);
                }
            },
            Config::default(),
        )
        .map_err(|source| SubhistError::Watch {
            path: path.to_path_buf(),
            source,
        })?;
        watcher
            .watch(parent_dir(path), RecursiveMode::NonRecursive)
            .map_err(|source| SubhistError::Watch {
                path: path.to_path_buf(),
                source,
            })?;
        debug!(path = %path.display(), "watching for native change notifications");
        Ok(Subscription::new(rx, watcher))
    }
}

fn classify(event: &Event, target: Option<&std::ffi::OsStr>) -> Option<ChangeEvent> {
    let change = match event.kind {
        EventKind::Remove(_) => ChangeEvent::Removed,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Any => ChangeEvent::Modified,
        EventKind::Access(_) | EventKind::Other => return None,
    };
    match target {
        Some(name) if !event.paths.iter().any(|p| p.file_name() == Some(name)) => None,
        _ => Some(change),
    }
}

/// Polls the file's metadata on a fixed interval.
#[derive(Debug, Clone, Copy)]
pub struct PollSource {
    interval: Duration,
}

impl PollSource {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl Default for PollSource {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL)
    }
}

struct PollGuard {
    stop: Arc<AtomicBool>,
}

impl Drop for PollGuard {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

/// Inode, length and mtime. Every snapshot write renames a fresh file into
/// place, so the inode changes even when length and mtime do not.
type Fingerprint = Option<(u64, u64, Option<SystemTime>)>;

fn fingerprint(path: &Path) -> Fingerprint {
    std::fs::metadata(path)
        .ok()
        .map(|meta| (inode(&meta), meta.len(), meta.modified().ok()))
}

#[cfg(unix)]
fn inode(meta: &std::fs::Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    meta.ino()
}

#[cfg(not(unix))]
fn inode(_meta: &std::fs::Metadata) -> u64 {
    0
}

impl ChangeSource for PollSource {
    fn subscribe(&self, path: &Path) -> Result<Subscription> {
        let (tx, rx) = mpsc::channel();
        let stop = Arc::new(AtomicBool::new(false));
        let path = path.to_path_buf();
        let interval = self.interval;
        let thread_stop = Arc::clone(&stop);
        // Taken before returning, so a write right after subscribe is seen.
        let mut last = fingerprint(&path);
        std::thread::spawn(move || {
            while !thread_stop.load(Ordering::Relaxed) {
                std::thread::sleep(interval);
                let current = fingerprint(&path);
                if current == last {
                    continue;
                }
                let change = if current.is_none() {
                    ChangeEvent::Removed
                } else {
                    ChangeEvent::Modified
                };
                last = current;
                if tx.send(change).is_err() {
                    break;
                }
            }
        });
        debug!(interval_ms = interval.as_millis() as u64, "polling for changes");
        Ok(Subscription::new(rx, PollGuard { stop }))
    }
}

pub struct ChangeWatcher {
    reader: SnapshotReader,
    view: Arc<ViewState>,
    debounce: Duration,
    stop: Arc<AtomicBool>,
    reloads: Arc<AtomicU64>,
}

impl ChangeWatcher {
    /// Loads the current snapshot into `view`, then keeps re-reading it on a
    /// background thread until the returned handle is shut down or dropped.
    pub fn spawn(
        reader: SnapshotReader,
        subscription: Subscription,
        view: Arc<ViewState>,
        debounce: Duration,
    ) -> WatcherHandle {
        let stop = Arc::new(AtomicBool::new(false));
        let reloads = Arc::new(AtomicU64::new(0));
        let watcher = ChangeWatcher {
            reader,
            view,
            debounce,
            stop: Arc::clone(&stop),
            reloads: Arc::clone(&reloads),
        };
        let thread = std::thread::spawn(move || watcher.run(subscription));
        WatcherHandle {
            stop,
            reloads,
            thread: Some(thread),
        }
    }

    fn run(self, subscription: Subscription) {
        let events = &subscription.events;
        info!(path = %self.reader.path().display(), "watching subtitle snapshot");
        self.reload(true);
        while !self.stop.load(Ordering::Relaxed) {
            match events.recv_timeout(SHUTDOWN_POLL) {
                Ok(first) => {
                    let burst = self.collect_burst(events);
                    debug!(?first, burst, "change notification");
                    self.reload(false);
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    info!("change source closed");
                    break;
                }
            }
        }
        debug!("watcher stopped");
    }

    /// Drains events until the debounce window after the first one closes.
    fn collect_burst(&self, events: &Receiver<ChangeEvent>) -> usize {
        let deadline = Instant::now() + self.debounce;
        let mut count = 1;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return count;
            }
            match events.recv_timeout(remaining) {
                Ok(_) => count += 1,
                Err(_) => return count,
            }
        }
    }

    fn reload(&self, initial: bool) {
        match self.reader.read() {
            Ok(Snapshot::Entries(entries)) => {
                debug!(entries = entries.len(), "applying snapshot");
                self.view.replace(entries);
                self.reloads.fetch_add(1, Ordering::Relaxed);
            }
            Ok(Snapshot::Missing) if initial => {
                info!("no snapshot yet, starting with empty history");
                self.view.replace(Vec::new());
            }
            Ok(Snapshot::Missing) => {
                debug!("snapshot removed, keeping last known history");
            }
            Err(err) => {
                warn!(error = %err, "skipping snapshot update");
            }
        }
    }
}

pub struct WatcherHandle {
    stop: Arc<AtomicBool>,
    reloads: Arc<AtomicU64>,
    thread: Option<JoinHandle<()>>,
}

impl WatcherHandle {
    /// Number of snapshots applied to the view so far.
    pub fn reloads(&self) -> u64 {
        self.reloads.load(Ordering::Relaxed)
    }

    /// Stops the watcher thread and waits for it. A reload in progress
    /// completes before the thread exits.
    pub fn shutdown(mut self) {
        self.stop_and_join();
    }

    fn stop_and_join(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("watcher thread panicked");
            }
        }
    }
}

impl Drop for WatcherHandle {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}
