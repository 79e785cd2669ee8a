//! Session - one logical connection between two OCPP peers.
//!
//! A session ties together a [`Communicator`] (outbound frames and the retry
//! queue), a [`FeatureRegistry`] for the negotiated version and a
//! [`PromiseRepository`] of outgoing calls awaiting their reply.
//!
//! # Lifecycle
//!
//! ```text
//! Idle ──open()──► Open ──close() / transport gone──► Closed
//! ```
//!
//! While Open the transport may drop and come back; only the end of its
//! event stream (or `close()`) closes the session. One event-loop task per
//! session routes inbound frames. Replies resolve pending calls directly,
//! incoming calls run their handler on a spawned task.
//!
//! # Example
//!
//! ```ignore
//! let session = Session::new(registry, ProtocolVersion::Ocpp16, &SessionConfig::default());
//! session.open(link, Arc::new(()))?;
//!
//! let confirmation = session.send(BootNotificationRequest::new("Vendor", "Model"))?.await?;
//! ```

use std::any::type_name;
use std::future::Future;
use std::marker::PhantomData;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use std::time::Duration;

use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use tokio::sync::{mpsc, Notify, Semaphore};
use uuid::Uuid;

use crate::codec::JsonCodec;
use crate::communicator::{Communicator, SendOutcome, DEFAULT_RETRY_INTERVAL};
use crate::error::{OcppError, Result};
use crate::feature::{AnyConfirmation, CallContext, FeatureRegistry};
use crate::model::{Confirmation, Request};
use crate::promise::{PromiseHandle, PromiseRepository};
use crate::protocol::{
    message_type, Call, CallError, CallFailure, CallResult, ErrorCode, Message, ParseError,
    ProtocolVersion,
};
use crate::transport::{Transport, TransportEvent, TransportLink};

/// Default maximum concurrent handlers.
pub const DEFAULT_MAX_CONCURRENT_HANDLERS: usize = 256;

/// Session settings.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Interval between retry attempts of queued transaction-related calls.
    pub retry_interval: Duration,
    /// Incoming calls handled at once. Further calls wait for a slot.
    pub max_concurrent_handlers: usize,
    /// Close the session after this long without inbound traffic.
    pub idle_timeout: Option<Duration>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            retry_interval: DEFAULT_RETRY_INTERVAL,
            max_concurrent_handlers: DEFAULT_MAX_CONCURRENT_HANDLERS,
            idle_timeout: None,
        }
    }
}

/// Callbacks from a session's event loop.
///
/// All methods default to doing nothing. They run on the event loop, so
/// they must not block.
pub trait SessionEvents: Send + Sync + 'static {
    /// The transport is connected.
    fn connection_opened(&self) {}

    /// The transport disconnected. Fires once per `connection_opened`.
    fn connection_closed(&self) {}

    /// An incoming call for `action` was routed: to its handler, or answered
    /// `NotSupported` when there is none.
    fn request_handled(&self, _action: &str) {}

    /// A reply to one of our calls for `action` arrived.
    fn confirmation_handled(&self, _action: &str) {}

    /// An inbound frame could not be parsed.
    fn protocol_error(&self, _error: &ParseError) {}

    /// The event loop stopped. Fires once, after the last `connection_closed`.
    fn session_closed(&self) {}
}

impl SessionEvents for () {}

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Open,
    Closed,
}

/// Lifecycle contract shared by a session and wrappers around it.
pub trait SessionControl: Send + Sync + 'static {
    /// The underlying session.
    fn session(&self) -> &Session;

    /// Bind a transport and start the event loop.
    fn open(&self, link: TransportLink, events: Arc<dyn SessionEvents>) -> Result<()>;

    /// Close the session and its transport.
    fn close(&self);
}

struct Inner {
    id: Uuid,
    version: ProtocolVersion,
    registry: Arc<FeatureRegistry>,
    communicator: Communicator,
    promises: PromiseRepository<AnyConfirmation>,
    /// Transport bound by `open`, released by `close`.
    transport: Mutex<Option<Arc<dyn Transport>>>,
    state: Mutex<SessionState>,
    events: RwLock<Arc<dyn SessionEvents>>,
    handler_permits: Arc<Semaphore>,
    shutdown: Notify,
}

/// One connection's RPC state. Cheap to clone.
#[derive(Clone)]
pub struct Session {
    inner: Arc<Inner>,
}

/// Non-owning reference to a [`Session`].
#[derive(Clone)]
pub struct WeakSession {
    inner: Weak<Inner>,
}

impl WeakSession {
    /// The session, if it still exists.
    pub fn upgrade(&self) -> Option<Session> {
        self.inner.upgrade().map(|inner| Session { inner })
    }
}

impl Session {
    /// Create an idle session answering with `registry`.
    pub fn new(registry: Arc<FeatureRegistry>, version: ProtocolVersion, config: &SessionConfig) -> Self {
        let communicator = Communicator::new(version, config.retry_interval);
        Self::with_parts(registry, version, config, communicator, PromiseRepository::new())
    }

    /// Create an idle session that takes over the retry queue and the
    /// pending calls of `previous`.
    ///
    /// Transaction-related calls queued on `previous` go out once this
    /// session's transport connects, and replies to calls made on `previous`
    /// resolve them. `previous` must not be open any more.
    pub fn resume(
        previous: &Session,
        registry: Arc<FeatureRegistry>,
        version: ProtocolVersion,
        config: &SessionConfig,
    ) -> Self {
        let communicator = previous.inner.communicator.clone();
        communicator.set_version(version);
        Self::with_parts(registry, version, config, communicator, previous.inner.promises.clone())
    }

    fn with_parts(
        registry: Arc<FeatureRegistry>,
        version: ProtocolVersion,
        config: &SessionConfig,
        communicator: Communicator,
        promises: PromiseRepository<AnyConfirmation>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                id: Uuid::new_v4(),
                version,
                registry,
                communicator,
                promises,
                transport: Mutex::new(None),
                state: Mutex::new(SessionState::Idle),
                events: RwLock::new(Arc::new(())),
                handler_permits: Arc::new(Semaphore::new(config.max_concurrent_handlers.max(1))),
                shutdown: Notify::new(),
            }),
        }
    }

    /// Session id.
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// Protocol version of this session.
    pub fn version(&self) -> ProtocolVersion {
        self.inner.version
    }

    /// Registry serving this session.
    pub fn registry(&self) -> &FeatureRegistry {
        &self.inner.registry
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        *self.inner.state.lock()
    }

    /// Whether the session is open.
    pub fn is_open(&self) -> bool {
        self.state() == SessionState::Open
    }

    /// Whether frames can currently reach the peer.
    pub fn is_connected(&self) -> bool {
        self.inner.communicator.is_connected()
    }

    /// Outgoing calls still waiting for a reply.
    pub fn pending_count(&self) -> usize {
        self.inner.promises.len()
    }

    /// Transaction-related calls waiting in the retry queue.
    pub fn queued_count(&self) -> usize {
        self.inner.communicator.queued_len()
    }

    /// Non-owning reference, for watchers that must not keep the session alive.
    pub fn downgrade(&self) -> WeakSession {
        WeakSession {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Bind `link` and start the event loop.
    ///
    /// Must be called inside a tokio runtime. Fails with
    /// [`OcppError::InvalidState`] unless the session is idle.
    pub fn open(&self, link: TransportLink, events: Arc<dyn SessionEvents>) -> Result<()> {
        {
            let mut state = self.inner.state.lock();
            match *state {
                SessionState::Idle => *state = SessionState::Open,
                SessionState::Open => return Err(OcppError::InvalidState("session already open")),
                SessionState::Closed => return Err(OcppError::InvalidState("session closed")),
            }
        }

        *self.inner.events.write() = events;
        *self.inner.transport.lock() = Some(link.transport.clone());
        self.inner.communicator.set_version(self.version());
        self.inner.communicator.attach(link.transport);
        tokio::spawn(self.clone().run(link.events));

        tracing::debug!(session = %self.id(), version = %self.version(), "session opened");
        Ok(())
    }

    /// Send a request to the peer.
    ///
    /// Returns as soon as the call is sent, queued or rejected; await the
    /// returned [`PendingResponse`] for the confirmation. Dropping it
    /// abandons the call.
    pub fn send<R: Request>(&self, request: R) -> Result<PendingResponse<R::Confirmation>> {
        if self.state() == SessionState::Closed {
            return Err(OcppError::NotConnected);
        }

        let feature = self
            .inner
            .registry
            .find_request::<R>()
            .ok_or_else(|| OcppError::UnsupportedFeature(type_name::<R>().to_string()))?;
        let action = feature.action();

        request
            .validate()
            .map_err(|e| OcppError::OccurenceConstraint(format!("{}: {}", action, e)))?;

        let transaction_related = request.transaction_related();
        let payload = JsonCodec::pack(&request)?;
        let unique_id = Uuid::new_v4().to_string();
        let handle = self.inner.promises.create(&unique_id, action)?;

        let outcome =
            self.inner
                .communicator
                .send_call(&unique_id, action, payload, transaction_related)?;
        if let SendOutcome::Rejected(reply) = outcome {
            self.dispatch(reply);
        }

        Ok(PendingResponse::new(handle))
    }

    /// Close the session and disconnect its transport.
    ///
    /// Pending calls are not failed; they resolve if a reply still arrives
    /// or when their caller gives up.
    pub fn close(&self) {
        {
            let mut state = self.inner.state.lock();
            if *state == SessionState::Closed {
                return;
            }
            *state = SessionState::Closed;
        }

        self.inner.shutdown.notify_one();
        let transport = self.inner.transport.lock().take();
        if let Some(transport) = transport {
            self.inner.communicator.detach(&transport);
            transport.disconnect();
        }
        tracing::debug!(session = %self.id(), "session closed");
    }

    fn events(&self) -> Arc<dyn SessionEvents> {
        self.inner.events.read().clone()
    }

    async fn run(self, mut transport_events: mpsc::UnboundedReceiver<TransportEvent>) {
        let mut connected = false;

        loop {
            let event = tokio::select! {
                _ = self.inner.shutdown.notified() => break,
                event = transport_events.recv() => event,
            };

            match event {
                Some(TransportEvent::Connected) => {
                    if !connected {
                        connected = true;
                        self.inner.communicator.on_connected();
                        self.events().connection_opened();
                    }
                }
                Some(TransportEvent::Disconnected) => {
                    if connected {
                        connected = false;
                        self.events().connection_closed();
                    }
                }
                Some(TransportEvent::Message(raw)) => self.on_frame(&raw),
                None => {
                    tracing::debug!(session = %self.id(), "transport gone");
                    break;
                }
            }
        }

        if connected {
            self.events().connection_closed();
        }
        self.close();

        let events = std::mem::replace(&mut *self.inner.events.write(), Arc::new(()));
        events.session_closed();
    }

    fn on_frame(&self, raw: &[u8]) {
        match self.inner.communicator.decode(raw) {
            Ok(message) => self.dispatch(message),
            Err(error) => self.handle_malformed(error),
        }
    }

    fn dispatch(&self, message: Message) {
        match message {
            Message::Call(call) => self.handle_call(call),
            Message::CallResult(result) => self.handle_result(result),
            Message::CallError(error) => self.handle_error(error),
        }
    }

    fn handle_call(&self, call: Call) {
        let Call {
            unique_id,
            action,
            payload,
        } = call;

        let handler = self
            .inner
            .registry
            .find_action(&action)
            .and_then(|feature| feature.handler().cloned());
        self.events().request_handled(&action);

        let Some(handler) = handler else {
            tracing::debug!(session = %self.id(), action = %action, "no handler for incoming call");
            self.reply_error(&unique_id, CallFailure::not_supported(&action));
            return;
        };

        let ctx = CallContext::new(self.id(), unique_id.clone(), action, self.version());
        let permits = self.inner.handler_permits.clone();
        let communicator = self.inner.communicator.clone();

        tokio::spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };

            let action = ctx.action().to_string();
            let outcome = AssertUnwindSafe(async move { handler.call(payload, ctx).await })
                .catch_unwind()
                .await;

            let sent = match outcome {
                Ok(Ok(confirmation)) => communicator.send_call_result(&unique_id, confirmation),
                Ok(Err(failure)) => {
                    tracing::debug!(unique_id = %unique_id, action = %action, failure = %failure, "handler failed");
                    communicator.send_call_error(&unique_id, failure)
                }
                Err(_) => {
                    tracing::error!(unique_id = %unique_id, action = %action, "handler panicked");
                    communicator.send_call_error(
                        &unique_id,
                        CallFailure::internal(format!("handler for {} panicked", action)),
                    )
                }
            };
            if let Err(e) = sent {
                tracing::warn!(unique_id = %unique_id, error = %e, "failed to send reply");
            }
        });
    }

    fn handle_result(&self, result: CallResult) {
        let CallResult { unique_id, payload } = result;

        let Some(action) = self.inner.promises.action_of(&unique_id) else {
            tracing::debug!(session = %self.id(), unique_id = %unique_id, "reply for unknown or abandoned call dropped");
            return;
        };
        self.events().confirmation_handled(&action);

        let decoded = match self.inner.registry.find_action(&action) {
            Some(feature) => feature.decode_confirmation(payload),
            None => Err(OcppError::UnsupportedFeature(action)),
        };
        match decoded {
            Ok(confirmation) => {
                self.inner.promises.complete(&unique_id, confirmation);
            }
            Err(e) => {
                tracing::warn!(unique_id = %unique_id, error = %e, "invalid confirmation");
                self.inner.promises.fail(&unique_id, e);
            }
        }
    }

    fn handle_error(&self, error: CallError) {
        let CallError { unique_id, failure } = error;

        let Some(action) = self.inner.promises.action_of(&unique_id) else {
            tracing::debug!(session = %self.id(), unique_id = %unique_id, "error for unknown or abandoned call dropped");
            return;
        };
        if failure.code != ErrorCode::NotConnected {
            self.events().confirmation_handled(&action);
        }
        self.inner.promises.fail(&unique_id, OcppError::Call(failure));
    }

    fn handle_malformed(&self, error: ParseError) {
        tracing::warn!(session = %self.id(), error = %error, "malformed frame");
        self.events().protocol_error(&error);

        let Some(unique_id) = error.unique_id.as_deref() else {
            return;
        };

        match error.message_type {
            Some(message_type::CALL) => {
                self.reply_error(unique_id, CallFailure::new(ErrorCode::ProtocolError, &error.reason));
            }
            Some(message_type::CALL_RESULT) | Some(message_type::CALL_ERROR) => {
                self.inner
                    .promises
                    .fail(unique_id, OcppError::Protocol(error.reason.clone()));
            }
            Some(_) if self.version().is_v2() => {
                self.reply_error(
                    unique_id,
                    CallFailure::new(ErrorCode::MessageTypeNotSupported, &error.reason),
                );
            }
            _ => {}
        }
    }

    fn reply_error(&self, unique_id: &str, failure: CallFailure) {
        if let Err(e) = self.inner.communicator.send_call_error(unique_id, failure) {
            tracing::warn!(unique_id, error = %e, "failed to send error reply");
        }
    }
}

impl SessionControl for Session {
    fn session(&self) -> &Session {
        self
    }

    fn open(&self, link: TransportLink, events: Arc<dyn SessionEvents>) -> Result<()> {
        Session::open(self, link, events)
    }

    fn close(&self) {
        Session::close(self)
    }
}

/// Reply to a call made with [`Session::send`].
///
/// Resolves to the confirmation, to [`OcppError::Call`] when the peer (or the
/// local transport) answered with a CallError, or to another error when the
/// reply could not be decoded.
pub struct PendingResponse<C> {
    handle: PromiseHandle<AnyConfirmation>,
    _confirmation: PhantomData<fn() -> C>,
}

impl<C> PendingResponse<C> {
    fn new(handle: PromiseHandle<AnyConfirmation>) -> Self {
        Self {
            handle,
            _confirmation: PhantomData,
        }
    }

    /// Unique id of the call on the wire.
    pub fn unique_id(&self) -> &str {
        self.handle.unique_id()
    }
}

impl<C: Confirmation> Future for PendingResponse<C> {
    type Output = Result<C>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        Pin::new(&mut this.handle).poll(cx).map(|outcome| {
            outcome.and_then(|any| {
                any.downcast::<C>()
                    .map(|confirmation| *confirmation)
                    .map_err(|_| {
                        OcppError::Protocol(format!("reply is not a {}", type_name::<C>()))
                    })
            })
        })
    }
}
