//! Producer side of the protocol: turns host playback events into history
//! mutations, each followed by a full snapshot write.
//!
//! The host delivers events one at a time on its dispatch thread, so the
//! context is owned and mutated without locking.

use crate::entry::SubtitleEntry;
use crate::filter::CaptureFilter;
use crate::history::HistoryBuffer;
use crate::seek::{SeekDecision, SeekDetector};
use crate::snapshot::SnapshotWriter;

use tracing::{debug, info, warn};

pub const DEFAULT_SECONDARY_PREFIX: &str = "[2] ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Track {
    Primary,
    Secondary,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    SubtitleChanged { track: Track, text: String },
    SeekOccurred,
    FileLoaded,
    PositionSampled(f64),
}

/// Synchronous query of the host's current playback position.
pub trait PlaybackClock {
    fn position(&self) -> Option<f64>;
}

/// Clock backed by the most recent `time-pos` observation. A file load
/// forgets the previous file's position until the next sample arrives.
#[derive(Debug, Default, Clone, Copy)]
pub struct LastPosition(Option<f64>);

impl LastPosition {
    pub fn observe(&mut self, event: &PlayerEvent) {
        match event {
            PlayerEvent::PositionSampled(p) => self.0 = Some(*p),
            PlayerEvent::FileLoaded => self.0 = None,
            _ => (),
        }
    }
}

impl PlaybackClock for LastPosition {
    fn position(&self) -> Option<f64> {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Dispatched {
    Captured,
    Ignored,
    Cleared(&'static str),
    Sampled,
}

#[derive(Debug, Clone)]
pub struct ProducerOptions {
    pub capacity: usize,
    pub seek_threshold: f64,
    pub secondary_prefix: String,
}

impl Default for ProducerOptions {
    fn default() -> Self {
        Self {
            capacity: crate::history::DEFAULT_CAPACITY,
            seek_threshold: crate::seek::DEFAULT_SEEK_THRESHOLD,
            secondary_prefix: DEFAULT_SECONDARY_PREFIX.to_string(),
        }
    }
}

#[derive(Debug)]
pub struct ProducerContext {
    history: HistoryBuffer,
    detector: SeekDetector,
    writer: SnapshotWriter,
    filter: CaptureFilter,
    secondary_prefix: String,
}

impl ProducerContext {
    /// Creates the context and publishes an empty snapshot, which tells the
    /// consumer the producer is running.
    pub fn start(options: ProducerOptions, writer: SnapshotWriter, filter: CaptureFilter) -> Self {
        info!(path = %writer.path().display(), capacity = options.capacity, "producer started");
        let ctx = Self {
            history: HistoryBuffer::new(options.capacity),
            detector: SeekDetector::new(options.seek_threshold),
            writer,
            filter,
            secondary_prefix: options.secondary_prefix,
        };
        ctx.persist();
        ctx
    }

    pub fn dispatch(&mut self, event: PlayerEvent, clock: &dyn PlaybackClock) -> Dispatched {
        match event {
            PlayerEvent::SubtitleChanged { track, text } => self.capture(track, &text, clock),
            PlayerEvent::PositionSampled(position) => self.sample(position),
            PlayerEvent::SeekOccurred => self.sample(clock.position().unwrap_or(0.0)),
            PlayerEvent::FileLoaded => {
                self.detector.reset();
                self.clear("file loaded")
            }
        }
    }

    pub fn history(&self) -> &HistoryBuffer {
        &self.history
    }

    fn capture(&mut self, track: Track, text: &str, clock: &dyn PlaybackClock) -> Dispatched {
        let text = text.trim();
        if text.is_empty() || self.filter.is_dropped(text) {
            return Dispatched::Ignored;
        }
        let text = match track {
            Track::Primary => text.to_string(),
            Track::Secondary => format!("{}{}", self.secondary_prefix, text),
        };
        let start_time = clock.position().unwrap_or(0.0);
        let captured_at = chrono::Utc::now().timestamp();
        let entry = match SubtitleEntry::new(text, start_time, captured_at) {
            Some(entry) => entry,
            None => return Dispatched::Ignored,
        };
        debug!(?track, start_time, text = %entry.text, "captured subtitle");
        if let Some(evicted) = self.history.append(entry) {
            debug!(text = %evicted.text, "evicted oldest subtitle");
        }
        self.persist();
        Dispatched::Captured
    }

    fn sample(&mut self, position: f64) -> Dispatched {
        match self.detector.sample(position) {
            SeekDecision::SeekDetected => self.clear("seek detected"),
            SeekDecision::Continue => Dispatched::Sampled,
        }
    }

    fn clear(&mut self, reason: &'static str) -> Dispatched {
        self.history.clear(reason);
        self.persist();
        Dispatched::Cleared(reason)
    }

    fn persist(&self) {
        if let Err(err) = self.writer.write(&self.history.snapshot()) {
            warn!(error = %err, "snapshot write failed, keeping history in memory");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::HostEventParser;
    use crate::snapshot::{Snapshot, SnapshotReader};

    use std::path::PathBuf;

    struct Fixture {
        _dir: tempfile::TempDir,
        path: PathBuf,
        ctx: ProducerContext,
        clock: LastPosition,
    }

    impl Fixture {
        fn new(options: ProducerOptions) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("subs.json");
            let ctx = ProducerContext::start(
                options,
                SnapshotWriter::new(&path),
                CaptureFilter::default(),
            );
            Self {
                _dir: dir,
                path,
                ctx,
                clock: LastPosition::default(),
            }
        }

        fn send(&mut self, event: PlayerEvent) -> Dispatched {
            self.clock.observe(&event);
            self.ctx.dispatch(event, &self.clock)
        }

        fn sub(&mut self, track: Track, text: &str) -> Dispatched {
            self.send(PlayerEvent::SubtitleChanged {
                track,
                text: text.to_string(),
            })
        }

        fn on_disk(&self) -> Vec<String> {
            match SnapshotReader::new(&self.path).read().unwrap() {
                Snapshot::Entries(entries) => entries.into_iter().map(|e| e.text).collect(),
                Snapshot::Missing => panic!("snapshot missing"),
            }
        }
    }

    #[test]
    fn start_publishes_empty_snapshot() {
        let fx = Fixture::new(ProducerOptions::default());
        assert_eq!(std::fs::read_to_string(&fx.path).unwrap(), "[]");
    }

    #[test]
    fn secondary_track_is_prefixed_in_arrival_order() {
        let mut fx = Fixture::new(ProducerOptions::default());
        fx.send(PlayerEvent::PositionSampled(3.0));
        fx.sub(Track::Primary, "first");
        fx.send(PlayerEvent::PositionSampled(2.0));
        fx.sub(Track::Secondary, "line");
        fx.sub(Track::Primary, "third");
        assert_eq!(fx.on_disk(), vec!["first", "[2] line", "third"]);
    }

    #[test]
    fn start_time_comes_from_clock() {
        let mut fx = Fixture::new(ProducerOptions::default());
        fx.sub(Track::Primary, "before any position");
        fx.send(PlayerEvent::PositionSampled(12.5));
        fx.sub(Track::Primary, "after");
        let starts: Vec<_> = fx.ctx.history().snapshot().iter().map(|e| e.start_time).collect();
        assert_eq!(starts, vec![0.0, 12.5]);
    }

    #[test]
    fn blank_text_is_ignored() {
        let mut fx = Fixture::new(ProducerOptions::default());
        assert_eq!(fx.sub(Track::Primary, "  \n "), Dispatched::Ignored);
        assert!(fx.ctx.history().is_empty());
    }

    #[test]
    fn seek_clears_exactly_once() {
        let mut fx = Fixture::new(ProducerOptions::default());
        fx.sub(Track::Primary, "context");
        let mut cleared = 0;
        for p in [10.0, 10.5, 11.0, 50.0] {
            if let Dispatched::Cleared(reason) = fx.send(PlayerEvent::PositionSampled(p)) {
                assert_eq!(reason, "seek detected");
                assert_eq!(p, 50.0);
                cleared += 1;
            }
        }
        assert_eq!(cleared, 1);
        assert!(fx.on_disk().is_empty());
    }

    #[test]
    fn seek_event_uses_queried_position() {
        let mut fx = Fixture::new(ProducerOptions::default());
        fx.send(PlayerEvent::PositionSampled(10.0));
        fx.sub(Track::Primary, "context");
        fx.send(PlayerEvent::SeekOccurred);
        assert_eq!(fx.ctx.history().len(), 1);

        fx.clock = LastPosition(Some(200.0));
        assert_eq!(
            fx.send(PlayerEvent::SeekOccurred),
            Dispatched::Cleared("seek detected")
        );
    }

    #[test]
    fn file_load_clears_and_suppresses_first_sample() {
        let mut fx = Fixture::new(ProducerOptions::default());
        fx.send(PlayerEvent::PositionSampled(30.0));
        fx.sub(Track::Primary, "old file");
        assert_eq!(
            fx.send(PlayerEvent::FileLoaded),
            Dispatched::Cleared("file loaded")
        );
        assert!(fx.on_disk().is_empty());

        fx.sub(Track::Primary, "new file");
        assert_eq!(fx.send(PlayerEvent::PositionSampled(900.0)), Dispatched::Sampled);
        assert_eq!(fx.on_disk(), vec!["new file"]);
        assert_eq!(fx.ctx.history().snapshot()[0].start_time, 0.0);
    }

    #[test]
    fn file_load_forgets_previous_position() {
        let script = "prop time-pos 300.0\n\
                      prop sub-text old\n\
                      event file-loaded\n\
                      event seek\n\
                      prop sub-text new file line\n\
                      prop time-pos 0.5\n";
        let mut fx = Fixture::new(ProducerOptions::default());
        let mut parser = HostEventParser::new();
        for line in script.lines() {
            if let Some(event) = parser.parse_line(line).unwrap() {
                fx.send(event);
            }
        }

        let history = fx.ctx.history().snapshot();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].text, "new file line");
        assert_eq!(history[0].start_time, 0.0);
        assert_eq!(fx.on_disk(), vec!["new file line"]);
    }

    #[test]
    fn events_before_first_position_after_load() {
        let mut fx = Fixture::new(ProducerOptions::default());
        fx.send(PlayerEvent::PositionSampled(120.0));
        fx.sub(Track::Primary, "old file");
        fx.send(PlayerEvent::FileLoaded);
        assert_eq!(fx.clock.position(), None);

        assert_eq!(fx.sub(Track::Primary, "opening"), Dispatched::Captured);
        assert_eq!(fx.send(PlayerEvent::SeekOccurred), Dispatched::Sampled);
        assert_eq!(fx.sub(Track::Secondary, "apertura"), Dispatched::Captured);
        assert_eq!(fx.send(PlayerEvent::PositionSampled(1.0)), Dispatched::Sampled);

        let history = fx.ctx.history().snapshot();
        assert_eq!(history.len(), 2);
        let starts: Vec<_> = history.iter().map(|e| e.start_time).collect();
        assert_eq!(starts, vec![0.0, 0.0]);
        assert_eq!(fx.on_disk(), vec!["opening", "[2] apertura"]);
    }

    #[test]
    fn history_bound_applies_to_snapshot() {
        let mut fx = Fixture::new(ProducerOptions {
            capacity: 2,
            ..ProducerOptions::default()
        });
        for text in ["a", "b", "c"] {
            fx.sub(Track::Primary, text);
        }
        assert_eq!(fx.on_disk(), vec!["b", "c"]);
    }

    #[test]
    fn filtered_text_is_not_captured() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = ProducerContext::start(
            ProducerOptions::default(),
            SnapshotWriter::new(dir.path().join("subs.json")),
            CaptureFilter::new(&["^advert"]).unwrap(),
        );
        let clock = LastPosition::default();
        let event = PlayerEvent::SubtitleChanged {
            track: Track::Primary,
            text: "advert: buy now".to_string(),
        };
        assert_eq!(ctx.dispatch(event, &clock), Dispatched::Ignored);
    }

    #[test]
    fn write_failure_keeps_history() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("subs.json");
        let mut ctx = ProducerContext::start(
            ProducerOptions::default(),
            SnapshotWriter::new(&path),
            CaptureFilter::default(),
        );
        let clock = LastPosition::default();
        let event = PlayerEvent::SubtitleChanged {
            track: Track::Primary,
            text: "kept".to_string(),
        };
        assert_eq!(ctx.dispatch(event, &clock), Dispatched::Captured);
        assert_eq!(ctx.history().len(), 1);

        std::fs::create_dir(path.parent().unwrap()).unwrap();
        let event = PlayerEvent::SubtitleChanged {
            track: Track::Primary,
            text: "retried".to_string(),
        };
        ctx.dispatch(event, &clock);
        let on_disk = SnapshotReader::new(&path).read().unwrap();
        match on_disk {
            Snapshot::Entries(entries) => assert_eq!(entries.len(), 2),
            Snapshot::Missing => panic!("retry did not write"),
        }
    }
}
