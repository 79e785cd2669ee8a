//! Communicator - encodes frames for a session and decides their fate.
//!
//! Every outgoing frame goes through here. Replies (`CallResult`,
//! `CallError`) are sent once or dropped. Calls split in two:
//!
//! - transaction-related calls are never lost: if they cannot be sent now
//!   they join a FIFO [`RetryQueue`] that is drained one frame per tick once
//!   the transport is connected
//! - every other call fails fast: the communicator hands back a synthesized
//!   `NotConnected` CallError which the session routes like a peer reply
//!
//! While the queue is non-empty new transaction-related calls go behind it,
//! so the peer always sees them in the order they were made.

mod retry;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::time::MissedTickBehavior;

pub use retry::{QueuedCall, RetryQueue};

use crate::error::Result;
use crate::protocol::{CallFailure, Message, ParseError, ProtocolVersion};
use crate::transport::Transport;

/// Default interval between retry attempts.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(1);

/// What happened to an outgoing call.
#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    /// Handed to the transport.
    Sent,
    /// Waiting in the retry queue.
    Queued,
    /// Could not be sent. Carries the synthesized reply to route back to
    /// the caller.
    Rejected(Message),
}

struct Inner {
    version: RwLock<ProtocolVersion>,
    retry_interval: Duration,
    transport: RwLock<Option<Arc<dyn Transport>>>,
    queue: Mutex<RetryQueue>,
    /// True while a drain task runs. Cleared under the queue lock.
    draining: AtomicBool,
}

impl Inner {
    fn is_connected(&self) -> bool {
        self.transport
            .read()
            .as_ref()
            .is_some_and(|t| t.is_connected())
    }

    /// Hand a frame to the transport. `false` if it was not accepted.
    fn try_send(&self, frame: Bytes) -> bool {
        let transport = self.transport.read().clone();
        match transport {
            Some(t) if t.is_connected() => match t.send(frame) {
                Ok(()) => true,
                Err(e) => {
                    tracing::debug!(error = %e, "transport refused frame");
                    false
                }
            },
            _ => false,
        }
    }
}

/// Outbound side of a session.
///
/// Cloning is cheap and yields a handle to the same queue and transport.
#[derive(Clone)]
pub struct Communicator {
    inner: Arc<Inner>,
}

impl Communicator {
    /// Create a communicator spelling error codes for `version`.
    pub fn new(version: ProtocolVersion, retry_interval: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                version: RwLock::new(version),
                retry_interval,
                transport: RwLock::new(None),
                queue: Mutex::new(RetryQueue::new()),
                draining: AtomicBool::new(false),
            }),
        }
    }

    /// Bind the transport frames go to.
    pub fn attach(&self, transport: Arc<dyn Transport>) {
        *self.inner.transport.write() = Some(transport);
    }

    /// Unbind `transport` if it is still the bound one.
    ///
    /// A later `attach` may already have replaced it; that binding is kept.
    pub fn detach(&self, transport: &Arc<dyn Transport>) -> bool {
        let mut bound = self.inner.transport.write();
        match bound.as_ref() {
            Some(current) if Arc::ptr_eq(current, transport) => {
                *bound = None;
                true
            }
            _ => false,
        }
    }

    /// Whether a transport is bound and connected.
    pub fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    /// Version used to spell error codes.
    pub fn version(&self) -> ProtocolVersion {
        *self.inner.version.read()
    }

    /// Spell error codes for `version` from now on.
    pub fn set_version(&self, version: ProtocolVersion) {
        *self.inner.version.write() = version;
    }

    /// Number of calls waiting in the retry queue.
    pub fn queued_len(&self) -> usize {
        self.inner.queue.lock().len()
    }

    /// Send a call, queueing or rejecting it when it cannot go out now.
    ///
    /// Only encoding failures are returned as errors.
    pub fn send_call(
        &self,
        unique_id: &str,
        action: &str,
        payload: Value,
        transaction_related: bool,
    ) -> Result<SendOutcome> {
        let frame = Message::call(unique_id, action, payload).encode(self.version())?;

        if transaction_related {
            let mut queue = self.inner.queue.lock();
            if queue.is_empty() && self.inner.try_send(frame.clone()) {
                return Ok(SendOutcome::Sent);
            }
            queue.push(QueuedCall::new(unique_id, action, frame));
            tracing::debug!(unique_id, action, queued = queue.len(), "call queued for retry");
            drop(queue);

            if self.is_connected() {
                self.ensure_draining();
            }
            return Ok(SendOutcome::Queued);
        }

        if self.inner.try_send(frame) {
            Ok(SendOutcome::Sent)
        } else {
            tracing::debug!(unique_id, action, "call not sent, peer not connected");
            Ok(SendOutcome::Rejected(Message::call_error(
                unique_id,
                CallFailure::not_connected(),
            )))
        }
    }

    /// Send a successful reply. Never queued.
    pub fn send_call_result(&self, unique_id: &str, payload: Value) -> Result<()> {
        self.send_reply(Message::call_result(unique_id, payload))
    }

    /// Send an error reply. Never queued.
    pub fn send_call_error(&self, unique_id: &str, failure: CallFailure) -> Result<()> {
        self.send_reply(Message::call_error(unique_id, failure))
    }

    fn send_reply(&self, reply: Message) -> Result<()> {
        let frame = reply.encode(self.version())?;
        if !self.inner.try_send(frame) {
            tracing::debug!(unique_id = reply.unique_id(), "reply dropped, peer not connected");
        }
        Ok(())
    }

    /// The transport came up: start draining the retry queue.
    pub fn on_connected(&self) {
        self.ensure_draining();
    }

    /// Parse an inbound frame.
    pub fn decode(&self, raw: &[u8]) -> std::result::Result<Message, ParseError> {
        Message::decode(raw)
    }

    /// Spawn the drain task unless one is running or there is nothing to do.
    fn ensure_draining(&self) {
        if self.inner.queue.lock().is_empty() {
            return;
        }
        if self.inner.draining.swap(true, Ordering::AcqRel) {
            return;
        }
        tokio::spawn(drain(self.inner.clone()));
    }
}

/// Send the queue head once per tick until the queue is empty or the
/// transport goes away.
async fn drain(inner: Arc<Inner>) {
    let mut ticker = tokio::time::interval(inner.retry_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let mut queue = inner.queue.lock();
        if queue.is_empty() || !inner.is_connected() {
            inner.draining.store(false, Ordering::Release);
            break;
        }

        let Some(head) = queue.head() else {
            continue;
        };
        if inner.try_send(head.frame.clone()) {
            if let Some(sent) = queue.pop() {
                tracing::debug!(
                    unique_id = %sent.unique_id,
                    action = %sent.action,
                    waited_ms = sent.enqueued_at.elapsed().as_millis() as u64,
                    remaining = queue.len(),
                    "queued call sent"
                );
            }
        } else {
            tracing::debug!(unique_id = %head.unique_id, "retry failed, keeping call at head");
        }
    }
}
