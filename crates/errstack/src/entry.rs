//! # Error Entry
//!
//! One diagnostic record: where it happened, what failed, and whether the
//! message is meant for an end user or a maintainer.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Severity of a diagnostic entry, rendered as a single character on the
/// wire (W/E/F).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    /// Recoverable condition worth recording.
    Warning,
    /// Operation failed; processing continues.
    Error,
    /// Process cannot continue.
    Fatal,
}

impl Severity {
    /// Single-character wire representation.
    #[must_use]
    pub fn as_char(self) -> char {
        match self {
            Severity::Warning => 'W',
            Severity::Error => 'E',
            Severity::Fatal => 'F',
        }
    }

    /// Parse the wire character; anything unknown is `None`.
    #[must_use]
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            'W' => Some(Severity::Warning),
            'E' => Some(Severity::Error),
            'F' => Some(Severity::Fatal),
            _ => None,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// One entry in the error stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEntry {
    /// Wall-clock timestamp, seconds.microseconds since the Unix epoch.
    pub timestamp: String,
    /// Name of the process that recorded the entry.
    pub proc_name: String,
    /// Module that raised the error.
    pub module_id: String,
    /// Source location, `file:line`.
    pub location: String,
    /// Numeric error code, unique within the module.
    pub code: i32,
    /// Whether the message is suitable to show to an end user.
    pub is_user: bool,
    /// Severity of the condition.
    pub severity: Severity,
    /// Formatted message with runtime parameters already substituted.
    pub message: String,
}

/// Current wall-clock time in the entry timestamp format.
#[must_use]
pub fn wall_clock_timestamp() -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    format!("{}.{:06}", now.as_secs(), now.subsec_micros())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_chars() {
        assert_eq!(Severity::Warning.as_char(), 'W');
        assert_eq!(Severity::from_char('F'), Some(Severity::Fatal));
        assert_eq!(Severity::from_char('x'), None);
    }

    #[test]
    fn test_timestamp_shape() {
        let ts = wall_clock_timestamp();
        let (secs, micros) = ts.split_once('.').unwrap();
        assert!(secs.parse::<u64>().is_ok());
        assert_eq!(micros.len(), 6);
    }
}
