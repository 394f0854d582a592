use crate::error::{Result, SubhistError};

use std::path::Path;

use regex::Regex;
use tracing::debug;

/// Drops subtitle lines matching any of a set of patterns before capture.
#[derive(Debug, Default)]
pub struct CaptureFilter {
    patterns: Vec<Regex>,
}

impl CaptureFilter {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(|p| compile(p.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    /// Adds the patterns in a file, one per line. Blank lines and lines
    /// starting with `#` are skipped.
    pub fn extend_from_file<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| SubhistError::ReadConfig {
            path: path.to_path_buf(),
            source,
        })?;
        for pattern in pattern_lines(&content) {
            self.patterns.push(compile(pattern)?);
        }
        Ok(())
    }

    pub fn is_dropped(&self, text: &str) -> bool {
        self.patterns.iter().any(|regex| {
            let mtch = text.lines().any(|line| regex.is_match(line));
            if mtch {
                debug!(pattern = %regex, text, "dropping subtitle");
            }
            mtch
        })
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

fn pattern_lines(content: &str) -> impl Iterator<Item = &str> {
    content
        .split('\n')
        .map(|p| p.trim())
        .filter(|p| !p.is_empty() && !p.starts_with('#'))
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|source| SubhistError::InvalidPattern {
        pattern: pattern.to_string(),
        source,
    })
}
