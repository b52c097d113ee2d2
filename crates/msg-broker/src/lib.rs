//! # Message Service
//!
//! Central broker of the bus: it accepts connections, registers
//! processes by name and routes envelopes between them. Clients reach a
//! peer by its registered name and `*` broadcasts to every registered
//! peer but the sender.

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod broker;
pub mod registry;

// Re-export main types
pub use broker::{Broker, BrokerConfig, BROKER_PROC_NAME, DEFAULT_PORT};
pub use registry::{
    CollisionPolicy, ProcessEntry, ProcessRegistry, RegisterOutcome, RegistryError,
};
