//! # Dispatch Loop
//!
//! The reactor owns the process error stack, the callback table and the
//! connection to the broker. One cooperative loop blocks until the
//! connection becomes readable, reads one complete envelope, and
//! dispatches it; every callback runs to completion before the next
//! readiness check.

use crate::handler::{Callback, CallbackResult, CallbackTable};
use crate::key::EventKey;
use crate::{CODE_COMMAND_NOT_FOUND, MODULE_ID};
use errstack::ErrorStack;
use msg_proto::{Envelope, MsgSocket, ProtocolError};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

/// Upper bound for a packed error stack shipped in a reply body.
const REPLY_PACK_MAX: usize = 32 * 1024;

/// Interval of the bounded wait per loop iteration, so housekeeping can
/// run even when no traffic arrives.
const HOUSEKEEPING_TICK: Duration = Duration::from_secs(1);

/// What a handler sees while it runs: the process error stack and an
/// outbox for replies it wants to send itself.
pub struct ReactorContext<'a> {
    proc_name: &'a str,
    /// Error stack of the owning process.
    pub stack: &'a mut ErrorStack,
    outbox: Vec<Envelope>,
}

impl<'a> ReactorContext<'a> {
    /// Build a context over the process stack.
    pub fn new(proc_name: &'a str, stack: &'a mut ErrorStack) -> Self {
        Self {
            proc_name,
            stack,
            outbox: Vec::new(),
        }
    }

    /// Name the replies are sent under.
    #[must_use]
    pub fn proc_name(&self) -> &str {
        self.proc_name
    }

    /// Queue an explicit success reply to `request`. A handler doing this
    /// must return [`CallbackResult::Deferred`] so the reactor does not
    /// reply a second time.
    pub fn reply_ok(&mut self, request: &Envelope, body: impl Into<Vec<u8>>) {
        self.outbox
            .push(Envelope::success_reply(request, self.proc_name, body));
    }

    /// Queue an explicit failure reply carrying the packed error stack,
    /// then clear the stack. Same ownership rule as
    /// [`reply_ok`](Self::reply_ok).
    pub fn reply_error(&mut self, request: &Envelope) {
        let body = pack_or_summarize(self.stack);
        self.outbox
            .push(Envelope::error_reply(request, self.proc_name, body));
        self.stack.clear();
    }

    /// Queue an arbitrary envelope, for handlers that forward or emit
    /// follow-up commands.
    pub fn send(&mut self, envelope: Envelope) {
        self.outbox.push(envelope);
    }

    pub(crate) fn into_outbox(self) -> Vec<Envelope> {
        self.outbox
    }
}

/// Pack the stack for a reply body; if the rendering exceeds the bound,
/// fall back to the last user-facing message so the caller still sees
/// something meaningful.
fn pack_or_summarize(stack: &ErrorStack) -> Vec<u8> {
    match stack.pack(REPLY_PACK_MAX) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(error = %e, "Error stack too large for reply, sending summary");
            stack
                .last_user_error()
                .map(|entry| entry.message.clone().into_bytes())
                .unwrap_or_default()
        }
    }
}

/// Single-threaded event dispatcher of one client process.
pub struct Reactor {
    proc_name: String,
    table: CallbackTable,
    stack: ErrorStack,
    pending_replies: VecDeque<Envelope>,
}

impl Reactor {
    /// Create the reactor for `proc_name`, creating the process error
    /// stack with it.
    #[must_use]
    pub fn new(proc_name: impl Into<String>) -> Self {
        let proc_name = proc_name.into();
        Self {
            stack: ErrorStack::new(proc_name.clone()),
            proc_name,
            table: CallbackTable::new(),
            pending_replies: VecDeque::new(),
        }
    }

    /// Registered name of this process.
    #[must_use]
    pub fn proc_name(&self) -> &str {
        &self.proc_name
    }

    /// The process error stack, for operations running outside a
    /// callback.
    pub fn stack_mut(&mut self) -> &mut ErrorStack {
        &mut self.stack
    }

    /// Register a callback; last-writer-wins on equal keys.
    pub fn register(&mut self, key: EventKey, callback: Callback) {
        self.table.register(key, callback);
    }

    /// Remove a registration.
    pub fn unregister(&mut self, key: &EventKey) -> bool {
        self.table.unregister(key)
    }

    /// Oldest reply received and not yet consumed, if any.
    pub fn pop_reply(&mut self) -> Option<Envelope> {
        self.pending_replies.pop_front()
    }

    /// Dispatch one inbound envelope; returns the envelopes to send.
    ///
    /// Replies are queued for [`pop_reply`](Self::pop_reply). Commands
    /// are matched against the callback table; with no match the reactor
    /// auto-sends a not-found failure reply and invokes nothing.
    pub fn dispatch_envelope(&mut self, envelope: &Envelope) -> Vec<Envelope> {
        if envelope.is_reply() {
            trace!(command = %envelope.command, "Reply received");
            self.pending_replies.push_back(envelope.clone());
            return Vec::new();
        }

        let lookup = EventKey::command(envelope.command.clone());
        let Some(callback) = self.table.find(&lookup) else {
            debug!(command = %envelope.command, "No callback for command");
            if self
                .stack
                .add_user(
                    MODULE_ID,
                    concat!(file!(), ":", line!()),
                    CODE_COMMAND_NOT_FOUND,
                    format!("Command '{}' is not supported", envelope.command),
                )
                .is_err()
            {
                warn!("Diagnostic entry dropped: stack full");
            }
            let body = pack_or_summarize(&self.stack);
            self.stack.clear();
            return vec![Envelope::error_reply(envelope, &self.proc_name, body)];
        };

        let mut ctx = ReactorContext::new(&self.proc_name, &mut self.stack);
        let result = callback(envelope, &mut ctx);
        let mut out = ctx.into_outbox();

        match result {
            CallbackResult::Replied => {
                out.push(Envelope::success_reply(envelope, &self.proc_name, b"OK".to_vec()));
            }
            CallbackResult::FailedWithReply => {
                let body = pack_or_summarize(&self.stack);
                self.stack.clear();
                out.push(Envelope::error_reply(envelope, &self.proc_name, body));
            }
            CallbackResult::Deferred => {
                trace!(command = %envelope.command, "Handler deferred the reply");
            }
        }
        out
    }

    /// Dispatch a readiness event of an application-watched input stream.
    ///
    /// The matched callback receives an empty placeholder envelope; there
    /// is no requester, so no automatic reply is generated whatever the
    /// callback returns.
    pub fn dispatch_stream(&mut self, sd: i32) -> Vec<Envelope> {
        let lookup = EventKey::IoStream(sd);
        let Some(callback) = self.table.find(&lookup) else {
            trace!(sd, "No callback for stream");
            return Vec::new();
        };

        let placeholder = Envelope::command(self.proc_name.clone(), self.proc_name.clone(), "", Vec::new());
        let mut ctx = ReactorContext::new(&self.proc_name, &mut self.stack);
        let _ = callback(&placeholder, &mut ctx);
        ctx.into_outbox()
    }

    /// Run the dispatch loop over the broker connection until the peer
    /// goes away or `shutdown` fires.
    ///
    /// A broken pipe while replying is logged and treated as the end of
    /// the connection, never as a process abort. Malformed frames are
    /// logged and skipped.
    pub async fn run(
        &mut self,
        socket: MsgSocket,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), ProtocolError> {
        let (mut reader, mut writer) = socket.into_split();
        let mut tick = tokio::time::interval(HOUSEKEEPING_TICK);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        info!(proc = %self.proc_name, "Reactor entering main loop");
        loop {
            tokio::select! {
                received = reader.recv() => match received {
                    Ok(envelope) => {
                        for out in self.dispatch_envelope(&envelope) {
                            if let Err(e) = writer.send(&out).await {
                                if e.is_disconnect() {
                                    warn!(error = %e, "Broker connection lost while replying");
                                    return Ok(());
                                }
                                warn!(error = %e, "Failed to send reply");
                            }
                        }
                    }
                    Err(e) if e.is_disconnect() => {
                        info!(proc = %self.proc_name, "Connection to broker closed");
                        return Ok(());
                    }
                    Err(e) => {
                        warn!(error = %e, "Ignoring malformed frame");
                    }
                },
                _ = tick.tick() => {
                    trace!(proc = %self.proc_name, "Housekeeping tick");
                }
                _ = shutdown.changed() => {
                    info!(proc = %self.proc_name, "Shutdown signal received");
                    return Ok(());
                }
            }
        }
    }
}
