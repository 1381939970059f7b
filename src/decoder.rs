use crate::error::{HapError, Result};
use regex::Regex;

/// Default Illumina read header:
/// `@instrument:run:flowcell:lane:tile:x:y read:filtered:control:sample`
pub const ILLUMINA_HEADER_PATTERN: &str =
    r"^@?([^:]+):(\d+):([^:]+):(\d+):(\d+):(\d+):(\d+) (\d+):([YN]):(\d+):(.*)$";
pub const ILLUMINA_SAMPLE_GROUP: usize = 11;

/// Pulls one capture group out of sequencer read headers.
#[derive(Debug, Clone)]
pub struct IlluminaNameDecoder {
    pattern: Regex,
    index: usize,
}

impl IlluminaNameDecoder {
    pub fn new(pattern: &str, index: usize) -> Result<Self> {
        let pattern = Regex::new(pattern)
            .map_err(|e| HapError::config(format!("invalid header pattern '{}': {}", pattern, e)))?;
        Ok(Self { pattern, index })
    }

    pub fn illumina() -> Result<Self> {
        Self::new(ILLUMINA_HEADER_PATTERN, ILLUMINA_SAMPLE_GROUP)
    }

    /// Capture group at the configured index, or an empty string when the
    /// header does not match or the group is absent
    pub fn get_index_value(&self, header: &str) -> String {
        self.pattern
            .captures(header)
            .and_then(|caps| caps.get(self.index))
            .map(|m| m.as_str().to_string())
            .unwrap_or_default()
    }

    pub fn sample_name(&self, header: &str) -> String {
        self.get_index_value(header)
    }
}
