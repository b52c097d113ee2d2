//! # Logging Collaborator Interface
//!
//! The logging subsystem itself is an external collaborator; this module
//! only carries the configuration surface the bus needs to drive it:
//! stdout and logfile verbosity levels plus the date and file:line
//! annotation toggles. Changes are applied to a shared settings value
//! and announced through `tracing`.

use std::sync::{Arc, RwLock};
use tracing::info;

/// Verbosity levels run 1 (quiet) to 5 (very detailed).
pub const MIN_LOG_LEVEL: i32 = 1;
pub const MAX_LOG_LEVEL: i32 = 5;

/// Configuration surface of the logging collaborator.
pub trait LogControl {
    fn set_stdout_level(&self, level: i32);
    fn set_logfile_level(&self, level: i32);
    fn set_print_date(&self, on: bool);
    fn set_print_file_line(&self, on: bool);
}

/// Current logging configuration of the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub stdout_level: i32,
    pub logfile_level: i32,
    pub print_date: bool,
    pub print_file_line: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            stdout_level: 3,
            logfile_level: 3,
            print_date: true,
            print_file_line: true,
        }
    }
}

/// Shared handle to the process logging configuration.
///
/// Cloned into the composition root (CLI options) and the debug-command
/// handler; both apply changes through [`LogControl`].
#[derive(Debug, Clone, Default)]
pub struct SharedLogSettings {
    inner: Arc<RwLock<LogSettings>>,
}

impl SharedLogSettings {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the current settings.
    #[must_use]
    pub fn snapshot(&self) -> LogSettings {
        self.inner.read().map(|s| s.clone()).unwrap_or_default()
    }
}

impl LogControl for SharedLogSettings {
    fn set_stdout_level(&self, level: i32) {
        let level = level.clamp(MIN_LOG_LEVEL, MAX_LOG_LEVEL);
        if let Ok(mut s) = self.inner.write() {
            s.stdout_level = level;
        }
        info!(level, "Stdout log level changed");
    }

    fn set_logfile_level(&self, level: i32) {
        let level = level.clamp(MIN_LOG_LEVEL, MAX_LOG_LEVEL);
        if let Ok(mut s) = self.inner.write() {
            s.logfile_level = level;
        }
        info!(level, "Logfile log level changed");
    }

    fn set_print_date(&self, on: bool) {
        if let Ok(mut s) = self.inner.write() {
            s.print_date = on;
        }
        info!(on, "Date annotation toggled");
    }

    fn set_print_file_line(&self, on: bool) {
        if let Ok(mut s) = self.inner.write() {
            s.print_file_line = on;
        }
        info!(on, "File:line annotation toggled");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = SharedLogSettings::new();
        let snap = settings.snapshot();
        assert_eq!(snap.stdout_level, 3);
        assert!(snap.print_date);
    }

    #[test]
    fn test_changes_visible_through_clones() {
        let settings = SharedLogSettings::new();
        let other = settings.clone();

        settings.set_stdout_level(5);
        settings.set_print_file_line(false);

        let snap = other.snapshot();
        assert_eq!(snap.stdout_level, 5);
        assert!(!snap.print_file_line);
    }

    #[test]
    fn test_levels_clamped() {
        let settings = SharedLogSettings::new();
        settings.set_logfile_level(99);
        assert_eq!(settings.snapshot().logfile_level, MAX_LOG_LEVEL);
        settings.set_logfile_level(-3);
        assert_eq!(settings.snapshot().logfile_level, MIN_LOG_LEVEL);
    }
}
