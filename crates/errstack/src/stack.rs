//! # Error Stack
//!
//! Bounded ordered sequence of [`ErrorEntry`] values. Push appends at the
//! top; once the bound is reached further pushes are rejected so the root
//! cause at the bottom of the stack is never evicted.

use crate::entry::{wall_clock_timestamp, ErrorEntry, Severity};
use thiserror::Error;
use tracing::{error, warn};

/// Maximum number of entries a stack may hold.
pub const STACK_MAX_SIZE: usize = 127;

/// Field separator inside one packed entry (ASCII unit separator).
const FIELD_SEP: char = '\u{1f}';

/// Record separator between packed entries (ASCII record separator).
const ENTRY_SEP: char = '\u{1e}';

/// Number of fields in one packed entry.
const FIELD_COUNT: usize = 8;

/// Local failure codes of stack operations. These never propagate as
/// panics; callers decide whether a failure becomes a wire reply.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StackError {
    /// The stack already holds [`STACK_MAX_SIZE`] entries.
    #[error("Error stack overflow: {capacity} entries, push rejected")]
    StackOverflow { capacity: usize },

    /// The packed representation does not fit the caller's buffer.
    #[error("Buffer too small for packed stack: need {needed} bytes, have {max}")]
    BufferTooSmall { needed: usize, max: usize },

    /// The buffer handed to `unpack` is not a packed stack.
    #[error("Malformed packed stack: {0}")]
    MalformedBuffer(String),
}

/// Ordered, bounded, serializable collection of diagnostic entries.
///
/// One instance per process, owned by the reactor for its lifetime.
#[derive(Debug, Clone, Default)]
pub struct ErrorStack {
    proc_name: String,
    entries: Vec<ErrorEntry>,
}

impl ErrorStack {
    /// Create the stack for `proc_name`, done once at process init.
    #[must_use]
    pub fn new(proc_name: impl Into<String>) -> Self {
        Self {
            proc_name: proc_name.into(),
            entries: Vec::new(),
        }
    }

    /// Name of the owning process.
    #[must_use]
    pub fn proc_name(&self) -> &str {
        &self.proc_name
    }

    /// Append an entry at the top of the stack.
    ///
    /// # Errors
    ///
    /// [`StackError::StackOverflow`] once the bound is reached; the push
    /// is rejected rather than evicting the oldest entry.
    pub fn push(&mut self, entry: ErrorEntry) -> Result<(), StackError> {
        if self.entries.len() >= STACK_MAX_SIZE {
            return Err(StackError::StackOverflow {
                capacity: STACK_MAX_SIZE,
            });
        }
        self.entries.push(entry);
        Ok(())
    }

    /// Record an internal (maintainer-facing) error.
    pub fn add(
        &mut self,
        module_id: &str,
        location: &str,
        code: i32,
        message: impl Into<String>,
    ) -> Result<(), StackError> {
        self.push(ErrorEntry {
            timestamp: wall_clock_timestamp(),
            proc_name: self.proc_name.clone(),
            module_id: module_id.to_string(),
            location: location.to_string(),
            code,
            is_user: false,
            severity: Severity::Error,
            message: message.into(),
        })
    }

    /// Record an end-user oriented error; this is what
    /// [`last_user_error`](Self::last_user_error) prefers.
    pub fn add_user(
        &mut self,
        module_id: &str,
        location: &str,
        code: i32,
        message: impl Into<String>,
    ) -> Result<(), StackError> {
        self.push(ErrorEntry {
            timestamp: wall_clock_timestamp(),
            proc_name: self.proc_name.clone(),
            module_id: module_id.to_string(),
            location: location.to_string(),
            code,
            is_user: true,
            severity: Severity::Error,
            message: message.into(),
        })
    }

    /// Empty the stack, done after the diagnostics have been shipped or
    /// displayed.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of entries currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the stack holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries oldest first.
    #[must_use]
    pub fn entries(&self) -> &[ErrorEntry] {
        &self.entries
    }

    /// Whether an error of `code` raised by `module_id` is in the stack.
    #[must_use]
    pub fn contains(&self, module_id: &str, code: i32) -> bool {
        self.entries
            .iter()
            .any(|e| e.module_id == module_id && e.code == code)
    }

    /// The message to show to a human.
    ///
    /// Scans from the most recent entry for the first user-facing one; if
    /// none is user-facing the most recent entry wins; `None` on an empty
    /// stack.
    #[must_use]
    pub fn last_user_error(&self) -> Option<&ErrorEntry> {
        self.entries
            .iter()
            .rev()
            .find(|e| e.is_user)
            .or_else(|| self.entries.last())
    }

    /// Serialize the stack, oldest entry first, into at most `max_len`
    /// bytes.
    ///
    /// # Errors
    ///
    /// [`StackError::BufferTooSmall`] when the rendering exceeds
    /// `max_len`; nothing is written in that case.
    pub fn pack(&self, max_len: usize) -> Result<Vec<u8>, StackError> {
        let mut out = String::new();
        for (i, e) in self.entries.iter().enumerate() {
            if i > 0 {
                out.push(ENTRY_SEP);
            }
            out.push_str(&e.timestamp);
            out.push(FIELD_SEP);
            out.push_str(&e.proc_name);
            out.push(FIELD_SEP);
            out.push_str(&e.module_id);
            out.push(FIELD_SEP);
            out.push_str(&e.location);
            out.push(FIELD_SEP);
            out.push_str(&e.code.to_string());
            out.push(FIELD_SEP);
            out.push(if e.is_user { '1' } else { '0' });
            out.push(FIELD_SEP);
            out.push(e.severity.as_char());
            out.push(FIELD_SEP);
            out.push_str(&e.message);
        }

        if out.len() > max_len {
            return Err(StackError::BufferTooSmall {
                needed: out.len(),
                max: max_len,
            });
        }
        Ok(out.into_bytes())
    }

    /// Reconstruct the ordered entry sequence packed by
    /// [`pack`](Self::pack). The stack keeps its own process name; the
    /// entries keep the one they were recorded under.
    pub fn unpack(&mut self, buffer: &[u8]) -> Result<(), StackError> {
        let text = std::str::from_utf8(buffer)
            .map_err(|e| StackError::MalformedBuffer(e.to_string()))?;

        self.entries.clear();
        if text.is_empty() {
            return Ok(());
        }

        for record in text.split(ENTRY_SEP) {
            let fields: Vec<&str> = record.split(FIELD_SEP).collect();
            if fields.len() != FIELD_COUNT {
                return Err(StackError::MalformedBuffer(format!(
                    "expected {FIELD_COUNT} fields, found {}",
                    fields.len()
                )));
            }

            let code = fields[4]
                .parse::<i32>()
                .map_err(|_| StackError::MalformedBuffer(format!("bad code '{}'", fields[4])))?;
            let is_user = match fields[5] {
                "1" => true,
                "0" => false,
                other => {
                    return Err(StackError::MalformedBuffer(format!(
                        "bad user flag '{other}'"
                    )))
                }
            };
            let severity = fields[6]
                .chars()
                .next()
                .and_then(Severity::from_char)
                .ok_or_else(|| {
                    StackError::MalformedBuffer(format!("bad severity '{}'", fields[6]))
                })?;

            self.push(ErrorEntry {
                timestamp: fields[0].to_string(),
                proc_name: fields[1].to_string(),
                module_id: fields[2].to_string(),
                location: fields[3].to_string(),
                code,
                is_user,
                severity,
                message: fields[7].to_string(),
            })?;
        }
        Ok(())
    }

    /// Render every entry to the diagnostic sink, oldest first. Display
    /// itself is the logging collaborator's job; this only delegates.
    pub fn log_to_sink(&self) {
        for e in &self.entries {
            match e.severity {
                Severity::Warning => warn!(
                    module = %e.module_id,
                    location = %e.location,
                    code = e.code,
                    "{}",
                    e.message
                ),
                Severity::Error | Severity::Fatal => error!(
                    module = %e.module_id,
                    location = %e.location,
                    code = e.code,
                    "{}",
                    e.message
                ),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(code: i32, is_user: bool, message: &str) -> ErrorEntry {
        ErrorEntry {
            timestamp: wall_clock_timestamp(),
            proc_name: "testProc".to_string(),
            module_id: "cmd".to_string(),
            location: "param.rs:42".to_string(),
            code,
            is_user,
            severity: Severity::Error,
            message: message.to_string(),
        }
    }

    #[test]
    fn test_push_and_size() {
        let mut stack = ErrorStack::new("testProc");
        assert!(stack.is_empty());

        stack.push(entry(1, false, "first")).unwrap();
        stack.push(entry(2, false, "second")).unwrap();
        assert_eq!(stack.len(), 2);
        assert!(stack.contains("cmd", 2));
        assert!(!stack.contains("msg", 2));

        stack.clear();
        assert!(stack.is_empty());
    }

    #[test]
    fn test_overflow_rejects_push_keeps_root_cause() {
        let mut stack = ErrorStack::new("testProc");
        for i in 0..STACK_MAX_SIZE {
            stack.push(entry(i as i32, false, "e")).unwrap();
        }

        let err = stack.push(entry(999, false, "late")).unwrap_err();
        assert_eq!(
            err,
            StackError::StackOverflow {
                capacity: STACK_MAX_SIZE
            }
        );
        // The oldest entry survives, the rejected one is absent.
        assert_eq!(stack.entries()[0].code, 0);
        assert!(!stack.contains("cmd", 999));
    }

    #[test]
    fn test_pack_unpack_roundtrip() {
        let mut stack = ErrorStack::new("testProc");
        stack.push(entry(10, false, "internal detail")).unwrap();
        stack.push(entry(11, true, "value out of range")).unwrap();
        stack.push(entry(12, false, "routing failed")).unwrap();

        let packed = stack.pack(4096).unwrap();

        let mut back = ErrorStack::new("otherProc");
        back.unpack(&packed).unwrap();
        assert_eq!(back.entries(), stack.entries());
    }

    #[test]
    fn test_pack_buffer_too_small() {
        let mut stack = ErrorStack::new("testProc");
        stack.push(entry(1, false, "some long-ish message")).unwrap();

        let err = stack.pack(8).unwrap_err();
        assert!(matches!(err, StackError::BufferTooSmall { max: 8, .. }));
    }

    #[test]
    fn test_unpack_rejects_garbage() {
        let mut stack = ErrorStack::new("testProc");
        let err = stack.unpack(b"not a packed stack").unwrap_err();
        assert!(matches!(err, StackError::MalformedBuffer(_)));
    }

    #[test]
    fn test_unpack_empty_buffer_is_empty_stack() {
        let mut stack = ErrorStack::new("testProc");
        stack.push(entry(1, false, "stale")).unwrap();
        stack.unpack(b"").unwrap();
        assert!(stack.is_empty());
    }

    #[test]
    fn test_last_user_error_prefers_user_facing() {
        let mut stack = ErrorStack::new("testProc");
        assert!(stack.last_user_error().is_none());

        stack.push(entry(1, false, "internal one")).unwrap();
        assert_eq!(stack.last_user_error().unwrap().message, "internal one");

        stack.push(entry(2, true, "for the user")).unwrap();
        stack.push(entry(3, false, "internal two")).unwrap();
        assert_eq!(stack.last_user_error().unwrap().message, "for the user");
    }

    #[test]
    fn test_add_user_stamps_context() {
        let mut stack = ErrorStack::new("ccdServer");
        stack
            .add_user("cmd", "param.rs:100", 7, "exposure must be less than 60")
            .unwrap();

        let e = &stack.entries()[0];
        assert!(e.is_user);
        assert_eq!(e.proc_name, "ccdServer");
        assert_eq!(e.module_id, "cmd");
        assert_eq!(e.code, 7);
    }
}
