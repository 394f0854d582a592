use serde::{Deserialize, Serialize};

/// One captured subtitle line, as stored in the interchange file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtitleEntry {
    pub text: String,
    pub start_time: f64,
    #[serde(default)]
    pub end_time: Option<f64>,
    #[serde(rename = "timestamp")]
    pub captured_at: i64,
}

impl SubtitleEntry {
    /// Returns `None` for empty text. A negative or non-finite start time is
    /// clamped to zero.
    pub fn new(text: impl Into<String>, start_time: f64, captured_at: i64) -> Option<Self> {
        let text = text.into();
        if text.is_empty() {
            return None;
        }
        let start_time = if start_time.is_finite() && start_time > 0.0 {
            start_time
        } else {
            0.0
        };
        Some(Self {
            text,
            start_time,
            end_time: None,
            captured_at,
        })
    }

    pub fn with_end_time(mut self, end_time: f64) -> Self {
        self.end_time = Some(end_time);
        self
    }

    /// Whether a deserialized entry satisfies the data model.
    pub(crate) fn is_well_formed(&self) -> bool {
        !self.text.is_empty() && self.start_time.is_finite() && self.start_time >= 0.0
    }
}
