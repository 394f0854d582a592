pub const DEFAULT_SEEK_THRESHOLD: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekDecision {
    Continue,
    SeekDetected,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackPositionState {
    pub last_known_position: f64,
    pub threshold: f64,
}

/// Tells a timeline jump apart from normal forward playback by comparing
/// consecutive position samples.
#[derive(Debug)]
pub struct SeekDetector {
    state: PlaybackPositionState,
}

impl SeekDetector {
    pub fn new(threshold: f64) -> Self {
        Self {
            state: PlaybackPositionState {
                last_known_position: 0.0,
                threshold,
            },
        }
    }

    pub fn sample(&mut self, position: f64) -> SeekDecision {
        if !position.is_finite() {
            return SeekDecision::Continue;
        }
        let last = self.state.last_known_position;
        // A zero last position means no sample has been seen since start or
        // since the last file load.
        let decision = if last > 0.0 && (position - last).abs() > self.state.threshold {
            SeekDecision::SeekDetected
        } else {
            SeekDecision::Continue
        };
        self.state.last_known_position = position;
        decision
    }

    /// Forget the last position. Called on file load.
    pub fn reset(&mut self) {
        self.state.last_known_position = 0.0;
    }

    pub fn state(&self) -> PlaybackPositionState {
        self.state
    }
}

impl Default for SeekDetector {
    fn default() -> Self {
        Self::new(DEFAULT_SEEK_THRESHOLD)
    }
}
