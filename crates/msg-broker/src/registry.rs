//! # Process Registry
//!
//! Name-to-connection table of the message service. A process becomes
//! reachable when its registration is accepted and stays registered
//! until its connection closes or it is evicted by a newcomer under
//! [`CollisionPolicy::EvictIncumbent`].

use thiserror::Error;
use tracing::{debug, info};

/// Module id stamped on diagnostic entries raised by the message service.
pub const MODULE_ID: &str = "msg";

/// Diagnostic code: a unique process name is already registered.
pub const CODE_DUPLICATE_PROCESS: i32 = 1;

/// Diagnostic code: a command named a recipient nobody registered.
pub const CODE_RECIPIENT_NOT_FOUND: i32 = 2;

/// Diagnostic code: the registration payload did not decode.
pub const CODE_MALFORMED_REGISTRATION: i32 = 3;

/// Diagnostic code: a connection sent traffic before registering.
pub const CODE_NOT_REGISTERED: i32 = 4;

/// What happens when a registration collides on a unique name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CollisionPolicy {
    /// Keep the incumbent, refuse the newcomer.
    #[default]
    RejectNewcomer,
    /// Drop the incumbent's registration, accept the newcomer.
    EvictIncumbent,
}

/// One registered process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessEntry {
    /// Name the process is reachable under.
    pub name: String,
    /// Operating-system process id, for diagnostics.
    pub pid: u32,
    /// When set, `name` may have at most one live registration.
    pub unique: bool,
    /// Broker-local id of the connection the process registered over.
    pub conn_id: u64,
}

/// Registration refused.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Process '{name}' is already registered")]
    Duplicate { name: String },
}

/// Accepted registration, possibly at the expense of incumbents.
#[derive(Debug, PartialEq, Eq)]
pub enum RegisterOutcome {
    Registered,
    /// Connection ids whose registrations were dropped to make room.
    Evicted(Vec<u64>),
}

/// Registration-order table of live processes.
#[derive(Debug, Default)]
pub struct ProcessRegistry {
    entries: Vec<ProcessEntry>,
    policy: CollisionPolicy,
}

impl ProcessRegistry {
    #[must_use]
    pub fn new(policy: CollisionPolicy) -> Self {
        Self {
            entries: Vec::new(),
            policy,
        }
    }

    /// Insert `entry`, applying the collision policy when the name is
    /// taken and either side declared it unique. Non-unique duplicates
    /// coexist; unicast routing picks the earliest registration.
    pub fn register(&mut self, entry: ProcessEntry) -> Result<RegisterOutcome, RegistryError> {
        let colliding: Vec<u64> = self
            .entries
            .iter()
            .filter(|e| e.name == entry.name && (e.unique || entry.unique))
            .map(|e| e.conn_id)
            .collect();

        if colliding.is_empty() {
            debug!(name = %entry.name, pid = entry.pid, "Process registered");
            self.entries.push(entry);
            return Ok(RegisterOutcome::Registered);
        }

        match self.policy {
            CollisionPolicy::RejectNewcomer => {
                info!(name = %entry.name, pid = entry.pid, "Registration refused, name in use");
                Err(RegistryError::Duplicate { name: entry.name })
            }
            CollisionPolicy::EvictIncumbent => {
                info!(
                    name = %entry.name,
                    evicted = colliding.len(),
                    "Evicting incumbent registration"
                );
                self.entries.retain(|e| !colliding.contains(&e.conn_id));
                self.entries.push(entry);
                Ok(RegisterOutcome::Evicted(colliding))
            }
        }
    }

    /// Drop the registration held by `conn_id`, if any.
    pub fn remove_by_conn(&mut self, conn_id: u64) -> Option<ProcessEntry> {
        let idx = self.entries.iter().position(|e| e.conn_id == conn_id)?;
        let entry = self.entries.remove(idx);
        debug!(name = %entry.name, "Process unregistered");
        Some(entry)
    }

    /// Earliest registration under `name`.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&ProcessEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Registration held by `conn_id`.
    #[must_use]
    pub fn find_by_conn(&self, conn_id: u64) -> Option<&ProcessEntry> {
        self.entries.iter().find(|e| e.conn_id == conn_id)
    }

    /// All live registrations, in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &ProcessEntry> {
        self.entries.iter()
    }

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

    fn entry(name: &str, unique: bool, conn_id: u64) -> ProcessEntry {
        ProcessEntry {
            name: name.to_string(),
            pid: 1000 + conn_id as u32,
            unique,
            conn_id,
        }
    }

    #[test]
    fn test_duplicate_unique_name_rejected_by_default() {
        let mut reg = ProcessRegistry::new(CollisionPolicy::RejectNewcomer);
        reg.register(entry("ccdServer", true, 1)).unwrap();

        let err = reg.register(entry("ccdServer", true, 2)).unwrap_err();
        assert_eq!(
            err,
            RegistryError::Duplicate {
                name: "ccdServer".to_string()
            }
        );
        // Incumbent untouched.
        assert_eq!(reg.find("ccdServer").unwrap().conn_id, 1);
    }

    #[test]
    fn test_eviction_policy_replaces_incumbent() {
        let mut reg = ProcessRegistry::new(CollisionPolicy::EvictIncumbent);
        reg.register(entry("ccdServer", true, 1)).unwrap();

        let outcome = reg.register(entry("ccdServer", true, 2)).unwrap();
        assert_eq!(outcome, RegisterOutcome::Evicted(vec![1]));
        assert_eq!(reg.find("ccdServer").unwrap().conn_id, 2);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_non_unique_names_coexist_first_wins_routing() {
        let mut reg = ProcessRegistry::new(CollisionPolicy::RejectNewcomer);
        reg.register(entry("worker", false, 1)).unwrap();
        reg.register(entry("worker", false, 2)).unwrap();

        assert_eq!(reg.len(), 2);
        assert_eq!(reg.find("worker").unwrap().conn_id, 1);
    }

    #[test]
    fn test_unique_flag_collides_with_non_unique_incumbent() {
        let mut reg = ProcessRegistry::new(CollisionPolicy::RejectNewcomer);
        reg.register(entry("worker", false, 1)).unwrap();

        let err = reg.register(entry("worker", true, 2)).unwrap_err();
        assert_eq!(
            err,
            RegistryError::Duplicate {
                name: "worker".to_string()
            }
        );
    }

    #[test]
    fn test_remove_by_conn() {
        let mut reg = ProcessRegistry::new(CollisionPolicy::RejectNewcomer);
        reg.register(entry("a", true, 1)).unwrap();
        reg.register(entry("b", true, 2)).unwrap();

        let removed = reg.remove_by_conn(1).unwrap();
        assert_eq!(removed.name, "a");
        assert!(reg.find("a").is_none());
        assert!(reg.find_by_conn(2).is_some());
        assert!(reg.remove_by_conn(1).is_none());
    }
}
