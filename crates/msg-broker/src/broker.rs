//! # Broker Loop
//!
//! One owner task holds the registry and all connection write halves;
//! one reader task per connection decodes frames and forwards them over
//! a channel. All routing decisions happen on the owner task, so the
//! registry needs no locking.
//!
//! ```text
//!             ┌──────────────┐      ConnEvent       ┌─────────────┐
//! conn 1 ───→ │ reader task 1 │ ───────────────────→ │             │
//! conn 2 ───→ │ reader task 2 │ ───────────────────→ │ owner loop  │
//! conn n ───→ │ reader task n │ ───────────────────→ │ (registry,  │
//!             └──────────────┘                       │  writers)   │
//!                  replies and routed envelopes  ←── │             │
//!                                                    └─────────────┘
//! ```

use crate::registry::{
    CollisionPolicy, ProcessEntry, ProcessRegistry, RegisterOutcome, CODE_DUPLICATE_PROCESS,
    CODE_MALFORMED_REGISTRATION, CODE_NOT_REGISTERED, CODE_RECIPIENT_NOT_FOUND, MODULE_ID,
};
use errstack::ErrorStack;
use msg_proto::{
    Envelope, EnvelopeReader, EnvelopeWriter, MsgSocketServer, ProtocolError, RegisterRequest,
    REGISTER_CMD,
};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, trace, warn};

/// Default TCP port of the message service.
pub const DEFAULT_PORT: u16 = 8791;

/// Name the broker signs its own replies with.
pub const BROKER_PROC_NAME: &str = "msgManager";

/// Upper bound for a packed error stack shipped in a reply body.
const REPLY_PACK_MAX: usize = 32 * 1024;

const EVENT_QUEUE_DEPTH: usize = 256;
const HOUSEKEEPING_TICK: Duration = Duration::from_secs(1);

/// Broker startup parameters.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Interface to listen on.
    pub host: String,
    /// TCP port of the message service.
    pub port: u16,
    /// Behaviour on unique-name collisions.
    pub policy: CollisionPolicy,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            policy: CollisionPolicy::default(),
        }
    }
}

/// What a reader task reports to the owner loop.
enum ConnEvent {
    Inbound { conn_id: u64, envelope: Envelope },
    Closed { conn_id: u64 },
}

/// The message service: accepts connections, registers processes and
/// routes envelopes between them.
pub struct Broker {
    config: BrokerConfig,
}

impl Broker {
    #[must_use]
    pub fn new(config: BrokerConfig) -> Self {
        Self { config }
    }

    /// Bind the configured endpoint and serve until `shutdown` fires.
    pub async fn run(&mut self, shutdown: watch::Receiver<bool>) -> Result<(), ProtocolError> {
        let server = MsgSocketServer::open(&self.config.host, self.config.port).await?;
        info!(addr = %server.local_addr()?, "Message service ready");
        self.serve(server, shutdown).await
    }

    /// Serve over an already-bound listener. Split out so tests can bind
    /// port 0 and learn the address before starting the loop.
    pub async fn serve(
        &mut self,
        server: MsgSocketServer,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), ProtocolError> {
        let mut registry = ProcessRegistry::new(self.config.policy);
        let mut writers: HashMap<u64, EnvelopeWriter> = HashMap::new();
        let mut next_conn_id: u64 = 1;
        let (events_tx, mut events_rx) = mpsc::channel::<ConnEvent>(EVENT_QUEUE_DEPTH);
        let mut tick = tokio::time::interval(HOUSEKEEPING_TICK);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                accepted = server.accept() => match accepted {
                    Ok(socket) => {
                        let conn_id = next_conn_id;
                        next_conn_id += 1;
                        debug!(conn_id, peer = %socket.peer_addr(), "Connection opened");
                        let (reader, writer) = socket.into_split();
                        writers.insert(conn_id, writer);
                        tokio::spawn(read_loop(conn_id, reader, events_tx.clone()));
                    }
                    Err(e) => {
                        warn!(error = %e, "Accept failed");
                    }
                },
                event = events_rx.recv() => match event {
                    Some(ConnEvent::Inbound { conn_id, envelope }) => {
                        handle_envelope(conn_id, envelope, &mut registry, &mut writers).await;
                    }
                    Some(ConnEvent::Closed { conn_id }) => {
                        writers.remove(&conn_id);
                        if let Some(entry) = registry.remove_by_conn(conn_id) {
                            info!(name = %entry.name, pid = entry.pid, "Process disconnected");
                        } else {
                            debug!(conn_id, "Unregistered connection closed");
                        }
                    }
                    // All senders live in reader tasks spawned above.
                    None => unreachable!("event channel closed while owner holds a sender"),
                },
                _ = tick.tick() => {
                    trace!(registered = registry.len(), "Housekeeping tick");
                }
                _ = shutdown.changed() => {
                    info!(registered = registry.len(), "Message service shutting down");
                    return Ok(());
                }
            }
        }
    }
}

/// Forward decoded frames from one connection to the owner loop.
async fn read_loop(conn_id: u64, mut reader: EnvelopeReader, events: mpsc::Sender<ConnEvent>) {
    loop {
        match reader.recv().await {
            Ok(envelope) => {
                if events
                    .send(ConnEvent::Inbound { conn_id, envelope })
                    .await
                    .is_err()
                {
                    return;
                }
            }
            Err(e) => {
                if !e.is_disconnect() {
                    warn!(conn_id, error = %e, "Dropping connection after read error");
                }
                let _ = events.send(ConnEvent::Closed { conn_id }).await;
                return;
            }
        }
    }
}

/// Route one inbound envelope.
async fn handle_envelope(
    conn_id: u64,
    envelope: Envelope,
    registry: &mut ProcessRegistry,
    writers: &mut HashMap<u64, EnvelopeWriter>,
) {
    if envelope.command == REGISTER_CMD && !envelope.is_reply() {
        handle_registration(conn_id, &envelope, registry, writers).await;
        return;
    }

    if registry.find_by_conn(conn_id).is_none() {
        warn!(conn_id, command = %envelope.command, "Traffic before registration");
        let reply = Envelope::error_reply(
            &envelope,
            BROKER_PROC_NAME,
            packed_error(
                CODE_NOT_REGISTERED,
                "Process must register before sending messages",
            ),
        );
        if !deliver(writers, conn_id, &reply).await {
            registry.remove_by_conn(conn_id);
        }
        return;
    }

    if envelope.is_broadcast() {
        let targets: Vec<u64> = registry
            .iter()
            .filter(|e| e.conn_id != conn_id)
            .map(|e| e.conn_id)
            .collect();
        trace!(command = %envelope.command, n = targets.len(), "Broadcasting");
        for target in targets {
            if !deliver(writers, target, &envelope).await {
                registry.remove_by_conn(target);
            }
        }
        return;
    }

    match registry.find(&envelope.recipient).map(|e| e.conn_id) {
        Some(target) => {
            trace!(
                command = %envelope.command,
                from = %envelope.sender,
                to = %envelope.recipient,
                "Routing envelope"
            );
            if deliver(writers, target, &envelope).await {
                return;
            }
            registry.remove_by_conn(target);
            // Fall through: the recipient is effectively gone.
            report_unroutable(conn_id, &envelope, registry, writers).await;
        }
        None => report_unroutable(conn_id, &envelope, registry, writers).await,
    }
}

/// Tell the sender its envelope could not be routed. Undeliverable
/// replies are only logged; error-replying to a reply would ping-pong.
async fn report_unroutable(
    conn_id: u64,
    envelope: &Envelope,
    registry: &mut ProcessRegistry,
    writers: &mut HashMap<u64, EnvelopeWriter>,
) {
    if envelope.is_reply() {
        warn!(
            command = %envelope.command,
            to = %envelope.recipient,
            "Dropping reply to unknown recipient"
        );
        return;
    }
    debug!(command = %envelope.command, to = %envelope.recipient, "Recipient not found");
    let reply = Envelope::error_reply(
        envelope,
        BROKER_PROC_NAME,
        packed_error(
            CODE_RECIPIENT_NOT_FOUND,
            format!("Process '{}' is not registered", envelope.recipient),
        ),
    );
    if !deliver(writers, conn_id, &reply).await {
        registry.remove_by_conn(conn_id);
    }
}

/// First envelope of a connection: decode the payload, apply the
/// collision policy and answer the handshake. A connection holds at
/// most one registration; further handshakes are refused without
/// touching the one it has.
async fn handle_registration(
    conn_id: u64,
    envelope: &Envelope,
    registry: &mut ProcessRegistry,
    writers: &mut HashMap<u64, EnvelopeWriter>,
) {
    if let Some(name) = registry.find_by_conn(conn_id).map(|e| e.name.clone()) {
        warn!(conn_id, %name, "Re-registration refused");
        let reply = Envelope::error_reply(
            envelope,
            BROKER_PROC_NAME,
            packed_error(
                CODE_DUPLICATE_PROCESS,
                format!("Connection is already registered as '{name}'"),
            ),
        );
        if !deliver(writers, conn_id, &reply).await {
            registry.remove_by_conn(conn_id);
        }
        return;
    }

    let mut refused = false;
    let reply = match bincode::deserialize::<RegisterRequest>(&envelope.body) {
        Err(e) => {
            refused = true;
            Envelope::error_reply(
                envelope,
                BROKER_PROC_NAME,
                packed_error(
                    CODE_MALFORMED_REGISTRATION,
                    format!("Malformed registration payload: {e}"),
                ),
            )
        }
        Ok(request) => {
            let entry = ProcessEntry {
                name: request.name,
                pid: request.pid,
                unique: request.unique,
                conn_id,
            };
            match registry.register(entry) {
                Ok(RegisterOutcome::Registered) => {
                    Envelope::success_reply(envelope, BROKER_PROC_NAME, b"OK".to_vec())
                }
                Ok(RegisterOutcome::Evicted(conns)) => {
                    // Dropping the write half signals the evicted peer.
                    for conn in conns {
                        writers.remove(&conn);
                    }
                    Envelope::success_reply(envelope, BROKER_PROC_NAME, b"OK".to_vec())
                }
                Err(err) => {
                    refused = true;
                    Envelope::error_reply(
                        envelope,
                        BROKER_PROC_NAME,
                        packed_error(CODE_DUPLICATE_PROCESS, err.to_string()),
                    )
                }
            }
        }
    };

    if !deliver(writers, conn_id, &reply).await {
        registry.remove_by_conn(conn_id);
        return;
    }
    // A refused connection is dropped; the incumbent is untouched.
    if refused {
        writers.remove(&conn_id);
    }
}

/// Send `envelope` to the connection, dropping the writer on failure.
/// A broken peer never takes the broker down.
async fn deliver(
    writers: &mut HashMap<u64, EnvelopeWriter>,
    conn_id: u64,
    envelope: &Envelope,
) -> bool {
    let Some(writer) = writers.get_mut(&conn_id) else {
        debug!(conn_id, "No writer for connection");
        return false;
    };
    match writer.send(envelope).await {
        Ok(()) => true,
        Err(e) => {
            if e.is_disconnect() {
                info!(conn_id, "Peer went away during delivery");
            } else {
                warn!(conn_id, error = %e, "Delivery failed");
            }
            writers.remove(&conn_id);
            false
        }
    }
}

/// One-entry packed stack for a broker-originated failure reply.
fn packed_error(code: i32, message: impl Into<String>) -> Vec<u8> {
    let mut stack = ErrorStack::new(BROKER_PROC_NAME);
    if stack
        .add_user(MODULE_ID, concat!(file!(), ":", line!()), code, message)
        .is_err()
    {
        warn!("Diagnostic entry dropped: stack full");
    }
    stack.pack(REPLY_PACK_MAX).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packed_error_unpacks_to_user_entry() {
        let body = packed_error(CODE_RECIPIENT_NOT_FOUND, "Process 'x' is not registered");

        let mut stack = ErrorStack::new("client");
        stack.unpack(&body).unwrap();
        assert_eq!(stack.len(), 1);
        let entry = stack.last_user_error().unwrap();
        assert!(entry.is_user);
        assert_eq!(entry.code, CODE_RECIPIENT_NOT_FOUND);
        assert_eq!(entry.proc_name, BROKER_PROC_NAME);
    }

    #[test]
    fn test_default_config() {
        let config = BrokerConfig::default();
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.policy, CollisionPolicy::RejectNewcomer);
    }
}
