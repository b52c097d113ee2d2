//! # Event Keys
//!
//! A key identifies what a callback is registered against: an I/O stream
//! (by descriptor identity) or a command (by name). The original class
//! hierarchy becomes a tagged union; `equals` and `matches` stay distinct
//! so future variants can widen the routing predicate without touching
//! the equality contract the table relies on.

/// Tagged key locating a callback in the dispatch table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKey {
    /// An input stream, identified by its descriptor.
    IoStream(i32),
    /// A command, identified by its name.
    Command(String),
}

impl EventKey {
    /// Build a command key from an envelope's command name.
    #[must_use]
    pub fn command(name: impl Into<String>) -> Self {
        EventKey::Command(name.into())
    }

    /// Strict identity on kind and discriminant. Used when registering,
    /// so re-registration replaces exactly the entry with the same key.
    #[must_use]
    pub fn equals(&self, other: &EventKey) -> bool {
        self == other
    }

    /// Routing predicate invoked during dispatch. Defaults to the same
    /// strict identity as [`equals`](Self::equals); kept separate as the
    /// extension point for prefix or wildcard routing.
    #[must_use]
    pub fn matches(&self, other: &EventKey) -> bool {
        self.equals(other)
    }
}
