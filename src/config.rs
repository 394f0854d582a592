use crate::error::{Result, SubhistError};
use crate::filter::CaptureFilter;
use crate::producer::ProducerOptions;
use crate::watcher::WatchMode;

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

pub const DEFAULT_CONFIG_FILE: &str = "subhist.toml";

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub path: PathBuf,
    pub producer: ProducerConfig,
    pub consumer: ConsumerConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProducerConfig {
    pub capacity: usize,
    pub seek_threshold: f64,
    pub secondary_prefix: String,
    pub drop_patterns: Vec<String>,
    pub drop_patterns_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConsumerConfig {
    pub display_count: usize,
    pub max_display_count: usize,
    pub debounce_ms: u64,
    pub watch_mode: WatchMode,
    pub poll_interval_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            path: crate::snapshot::default_path(),
            producer: ProducerConfig::default(),
            consumer: ConsumerConfig::default(),
        }
    }
}

impl Default for ProducerConfig {
    fn default() -> Self {
        let options = ProducerOptions::default();
        Self {
            capacity: options.capacity,
            seek_threshold: options.seek_threshold,
            secondary_prefix: options.secondary_prefix,
            drop_patterns: Vec::new(),
            drop_patterns_file: None,
        }
    }
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            display_count: crate::view::DEFAULT_DISPLAY_COUNT,
            max_display_count: crate::view::DEFAULT_MAX_DISPLAY_COUNT,
            debounce_ms: crate::watcher::DEFAULT_DEBOUNCE.as_millis() as u64,
            watch_mode: WatchMode::Native,
            poll_interval_ms: crate::watcher::DEFAULT_POLL_INTERVAL.as_millis() as u64,
        }
    }
}

impl Config {
    /// Loads the given file, or `subhist.toml` from the working directory if
    /// it exists, or falls back to defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::from_file(path);
        }
        let default_path = Path::new(DEFAULT_CONFIG_FILE);
        if default_path.exists() {
            return Self::from_file(default_path);
        }
        Ok(Self::default())
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| SubhistError::ReadConfig {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| SubhistError::ParseConfig {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> Result<()> {
        let p = &self.producer;
        if p.capacity == 0 {
            return Err(invalid("producer.capacity", "must be at least 1"));
        }
        if !p.seek_threshold.is_finite() || p.seek_threshold <= 0.0 {
            return Err(invalid(
                "producer.seek_threshold",
                format!("must be a positive number, got {}", p.seek_threshold),
            ));
        }
        let c = &self.consumer;
        if c.max_display_count == 0 {
            return Err(invalid("consumer.max_display_count", "must be at least 1"));
        }
        if c.display_count == 0 || c.display_count > c.max_display_count {
            return Err(invalid(
                "consumer.display_count",
                format!("must be between 1 and {}", c.max_display_count),
            ));
        }
        if c.poll_interval_ms == 0 {
            return Err(invalid("consumer.poll_interval_ms", "must be at least 1"));
        }
        Ok(())
    }

    pub fn producer_options(&self) -> ProducerOptions {
        ProducerOptions {
            capacity: self.producer.capacity,
            seek_threshold: self.producer.seek_threshold,
            secondary_prefix: self.producer.secondary_prefix.clone(),
        }
    }

    pub fn capture_filter(&self) -> Result<CaptureFilter> {
        let mut filter = CaptureFilter::new(&self.producer.drop_patterns)?;
        if let Some(file) = &self.producer.drop_patterns_file {
            filter.extend_from_file(file)?;
        }
        Ok(filter)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.consumer.debounce_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.consumer.poll_interval_ms)
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> SubhistError {
    SubhistError::InvalidConfig {
        field,
        reason: reason.into(),
    }
}
