//! Client builder and connection handle.
//!
//! The [`ClientBuilder`] provides a fluent API for installing profiles per
//! protocol version and tuning the session. The [`Client`] then:
//! 1. Offers its versions to the server in the WebSocket handshake
//! 2. Opens a session on the negotiated version's registry
//! 3. Sends requests and answers the server's calls until disconnected
//!
//! The retry queue and the table of pending calls outlive connections.
//! Transaction-related requests sent before the first connect, or while
//! the link is down, wait in the queue and go out on the next connection;
//! other requests fail fast with a `NotConnected` CallError.
//!
//! # Example
//!
//! ```ignore
//! use ocpp_rpc::{Client, Profile, ProtocolVersion};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::builder()
//!         .install(
//!             ProtocolVersion::Ocpp16,
//!             Profile::new("core")
//!                 .send::<BootNotificationRequest>()
//!                 .handle(|req: ResetRequest, _ctx| async move {
//!                     Ok(ResetConfirmation::accepted())
//!                 }),
//!         )
//!         .reconnect_interval(std::time::Duration::from_secs(5))
//!         .build()?;
//!
//!     client.connect("ws://csms.example.com/ocpp/CP001", ()).await?;
//!     let boot = client.send(BootNotificationRequest::new("Vendor", "Model"))?.await?;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::{OcppError, Result};
use crate::feature::Profile;
use crate::model::Request;
use crate::negotiator::{NegotiatorBuilder, ProtocolNegotiator};
use crate::protocol::ProtocolVersion;
use crate::session::{
    PendingResponse, Session, SessionConfig, SessionControl, SessionEvents, SessionState,
};
use crate::supervisor::supervise;
use crate::transport::websocket::{self, WebSocketConfig};
use crate::transport::TransportLink;

/// Builder for configuring and creating a client.
pub struct ClientBuilder {
    negotiator: NegotiatorBuilder,
    session_config: SessionConfig,
    websocket_config: WebSocketConfig,
}

impl ClientBuilder {
    /// Create a new client builder.
    pub fn new() -> Self {
        Self {
            negotiator: NegotiatorBuilder::new(),
            session_config: SessionConfig::default(),
            websocket_config: WebSocketConfig::default(),
        }
    }

    /// Install a profile for `version`. Versions are offered in the order
    /// they are first installed.
    pub fn install(mut self, version: ProtocolVersion, profile: Profile) -> Self {
        self.negotiator = self.negotiator.install(version, profile);
        self
    }

    /// Set the interval between retries of queued transaction-related calls.
    ///
    /// Default: 1 second
    pub fn retry_interval(mut self, interval: Duration) -> Self {
        self.session_config.retry_interval = interval;
        self
    }

    /// Close the session after this long without inbound traffic.
    ///
    /// Default: disabled
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.session_config.idle_timeout = Some(timeout);
        self
    }

    /// Set the maximum number of incoming calls handled at once.
    ///
    /// Further calls wait for a free slot.
    /// Default: 256
    pub fn max_concurrent_handlers(mut self, limit: usize) -> Self {
        self.session_config.max_concurrent_handlers = limit;
        self
    }

    /// Reconnect after a dropped connection, waiting `interval` between
    /// attempts.
    ///
    /// Default: disabled
    pub fn reconnect_interval(mut self, interval: Duration) -> Self {
        self.websocket_config.reconnect_interval = Some(interval);
        self
    }

    /// Set the maximum pending outbound frames.
    ///
    /// Default: 1024
    pub fn max_pending_frames(mut self, limit: usize) -> Self {
        self.websocket_config.writer.max_pending_frames = limit;
        self
    }

    /// Set the writer channel capacity.
    ///
    /// Default: 1024
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.websocket_config.writer.channel_capacity = capacity;
        self
    }

    /// Build the client.
    ///
    /// Fails when two profiles of one version overlap or no version was
    /// installed.
    pub fn build(self) -> Result<Client> {
        let negotiator = self.negotiator.build()?;
        let version = negotiator
            .priority()
            .first()
            .copied()
            .ok_or(OcppError::InvalidState("no protocol version installed"))?;
        let registry = negotiator
            .registry(version)
            .ok_or(OcppError::InvalidState("no registry for preferred version"))?;

        // Idle until the first connect; collects queued calls meanwhile.
        let session = Session::new(registry, version, &self.session_config);
        let current = supervise(session, self.session_config.idle_timeout);

        Ok(Client {
            negotiator,
            session_config: self.session_config,
            websocket_config: self.websocket_config,
            current: Mutex::new(current),
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// The charge point side (or any initiating side) of an OCPP connection.
pub struct Client {
    negotiator: ProtocolNegotiator,
    session_config: SessionConfig,
    websocket_config: WebSocketConfig,
    current: Mutex<Arc<dyn SessionControl>>,
}

impl Client {
    /// Create a new client builder.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Connect to `uri` over WebSocket and open a session.
    ///
    /// Returns the negotiated version.
    pub async fn connect(&self, uri: &str, events: impl SessionEvents) -> Result<ProtocolVersion> {
        self.ensure_not_open()?;

        let (link, version) = websocket::connect(
            uri,
            self.negotiator.priority(),
            self.websocket_config.clone(),
        )
        .await?;

        let transport = link.transport.clone();
        if let Err(e) = self.connect_link(link, version, events) {
            transport.disconnect();
            return Err(e);
        }
        Ok(version)
    }

    /// Open a session over an already established transport.
    pub fn connect_link(
        &self,
        link: TransportLink,
        version: ProtocolVersion,
        events: impl SessionEvents,
    ) -> Result<()> {
        let mut current = self.current.lock();
        if current.session().is_open() {
            return Err(OcppError::InvalidState("client already connected"));
        }

        let registry = self
            .negotiator
            .registry(version)
            .ok_or_else(|| OcppError::NoCommonProtocol(version.subprotocol().to_string()))?;

        let session = Session::resume(current.session(), registry, version, &self.session_config);
        let control = supervise(session, self.session_config.idle_timeout);
        control.open(link, Arc::new(events))?;

        *current = control;
        Ok(())
    }

    /// Send a request to the server.
    ///
    /// Works connected or not: while offline, transaction-related requests
    /// are queued and every other request resolves to a `NotConnected`
    /// CallError.
    pub fn send<R: Request>(&self, request: R) -> Result<PendingResponse<R::Confirmation>> {
        self.active().send(request)
    }

    /// Close the current connection. Queued calls are kept for the next one.
    pub fn disconnect(&self) {
        let control = self.current.lock().clone();
        control.close();
    }

    /// Session of the current (or most recent) connection.
    pub fn session(&self) -> Session {
        self.current.lock().session().clone()
    }

    /// Whether a connection is open and its transport connected.
    pub fn is_connected(&self) -> bool {
        let session = self.session();
        session.is_open() && session.is_connected()
    }

    /// Negotiated version of the open connection.
    pub fn version(&self) -> Option<ProtocolVersion> {
        let session = self.session();
        session.is_open().then(|| session.version())
    }

    /// Versions this client offers, most preferred first.
    pub fn supported_versions(&self) -> &[ProtocolVersion] {
        self.negotiator.priority()
    }

    fn ensure_not_open(&self) -> Result<()> {
        if self.session().is_open() {
            return Err(OcppError::InvalidState("client already connected"));
        }
        Ok(())
    }

    /// The session to send on. A closed one is replaced by an idle
    /// successor holding its queue, so sends keep queueing between
    /// connections.
    fn active(&self) -> Session {
        let mut current = self.current.lock();
        let previous = current.session().clone();
        if previous.state() != SessionState::Closed {
            return previous;
        }

        let Some(registry) = self.negotiator.registry(previous.version()) else {
            return previous;
        };
        let successor = Session::resume(&previous, registry, previous.version(), &self.session_config);
        *current = supervise(successor.clone(), self.session_config.idle_timeout);
        successor
    }
}
