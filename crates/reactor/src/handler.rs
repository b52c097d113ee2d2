//! # Callback Table
//!
//! Ordered mapping from event key to handler. Registration order is the
//! search order during dispatch; re-registering an equal key replaces
//! the prior entry in place (last-writer-wins).

use crate::dispatch::ReactorContext;
use crate::key::EventKey;
use msg_proto::Envelope;
use tracing::debug;

/// Completion result a handler returns to the reactor.
///
/// Replaces the original success/failure × delete/no-delete bitmask with
/// three cases that make reply ownership explicit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackResult {
    /// Handler succeeded; the reactor sends the success reply and
    /// releases the message.
    Replied,
    /// Handler failed; the reactor packs the current error stack into a
    /// failure reply and releases the message.
    FailedWithReply,
    /// Handler already sent its own reply (or will, asynchronously) and
    /// retains ownership; the reactor must not reply or release.
    Deferred,
}

/// A registered handler. Runs to completion on the reactor task before
/// the next readiness check; long-running work must return
/// [`CallbackResult::Deferred`] and answer out of band.
pub type Callback = Box<dyn FnMut(&Envelope, &mut ReactorContext<'_>) -> CallbackResult + Send>;

/// Ordered key-to-handler table.
#[derive(Default)]
pub struct CallbackTable {
    entries: Vec<(EventKey, Callback)>,
}

impl CallbackTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` under `key`. An entry whose key `equals` the
    /// new one is replaced in place, keeping its position in the search
    /// order.
    pub fn register(&mut self, key: EventKey, callback: Callback) {
        if let Some(slot) = self.entries.iter_mut().find(|(k, _)| k.equals(&key)) {
            debug!(?key, "Replacing registered callback");
            slot.1 = callback;
        } else {
            debug!(?key, "Registering callback");
            self.entries.push((key, callback));
        }
    }

    /// Remove the entry whose key `equals` `key`, if any.
    pub fn unregister(&mut self, key: &EventKey) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(k, _)| !k.equals(key));
        self.entries.len() != before
    }

    /// First entry whose registered key `matches` the lookup key, in
    /// registration order.
    pub fn find(&mut self, lookup: &EventKey) -> Option<&mut Callback> {
        self.entries
            .iter_mut()
            .find(|(k, _)| k.matches(lookup))
            .map(|(_, cb)| cb)
    }

    /// Number of registered entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use errstack::ErrorStack;

    fn noop(result: CallbackResult) -> Callback {
        Box::new(move |_, _| result)
    }

    fn test_ctx(stack: &mut ErrorStack) -> ReactorContext<'_> {
        ReactorContext::new("testProc", stack)
    }

    #[test]
    fn test_register_and_find() {
        let mut table = CallbackTable::new();
        table.register(EventKey::command("DEBUG"), noop(CallbackResult::Replied));
        table.register(EventKey::IoStream(5), noop(CallbackResult::Deferred));

        assert_eq!(table.len(), 2);
        assert!(table.find(&EventKey::command("DEBUG")).is_some());
        assert!(table.find(&EventKey::IoStream(5)).is_some());
        assert!(table.find(&EventKey::command("EXIT")).is_none());
    }

    #[test]
    fn test_reregistration_replaces_last_writer_wins() {
        let mut stack = ErrorStack::new("testProc");
        let mut table = CallbackTable::new();
        table.register(EventKey::command("STATUS"), noop(CallbackResult::Replied));
        table.register(EventKey::command("STATUS"), noop(CallbackResult::Deferred));

        assert_eq!(table.len(), 1);
        let env = Envelope::command("a", "b", "STATUS", Vec::new());
        let cb = table.find(&EventKey::command("STATUS")).unwrap();
        let mut ctx = test_ctx(&mut stack);
        assert_eq!(cb(&env, &mut ctx), CallbackResult::Deferred);
    }

    #[test]
    fn test_first_match_wins_in_registration_order() {
        let mut stack = ErrorStack::new("testProc");
        let mut table = CallbackTable::new();
        table.register(EventKey::command("PING"), noop(CallbackResult::Replied));
        table.register(EventKey::command("PING2"), noop(CallbackResult::Deferred));

        let env = Envelope::command("a", "b", "PING", Vec::new());
        let cb = table.find(&EventKey::command("PING")).unwrap();
        let mut ctx = test_ctx(&mut stack);
        assert_eq!(cb(&env, &mut ctx), CallbackResult::Replied);
    }

    #[test]
    fn test_unregister() {
        let mut table = CallbackTable::new();
        table.register(EventKey::command("X"), noop(CallbackResult::Replied));
        assert!(table.unregister(&EventKey::command("X")));
        assert!(!table.unregister(&EventKey::command("X")));
        assert!(table.is_empty());
    }
}
