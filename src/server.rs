//! Server: accepts connections and keeps a table of live sessions.
//!
//! Each accepted connection gets a [`Session`] bound to the registry of the
//! negotiated version and a fresh [`Uuid`]. The session is put in the table
//! before the application hears about it through
//! [`ServerEvents::new_session`], and taken out before
//! [`ServerEvents::lost_session`] fires, so an id handed to the application
//! is always routable until it is reported lost.
//!
//! # Example
//!
//! ```ignore
//! struct Csms;
//!
//! impl ServerEvents for Csms {
//!     fn new_session(&self, id: Uuid, info: &ConnectionInfo) {
//!         tracing::info!(%id, identity = ?info.identity, "charge point connected");
//!     }
//!     fn lost_session(&self, id: Uuid) {
//!         tracing::info!(%id, "charge point gone");
//!     }
//! }
//!
//! let server = Server::builder()
//!     .install(ProtocolVersion::Ocpp16, core_profile())
//!     .build()?;
//! let addr = server.open("0.0.0.0", 8887, Csms).await?;
//! ```

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::error::{OcppError, Result};
use crate::feature::Profile;
use crate::model::Request;
use crate::negotiator::{NegotiatorBuilder, ProtocolNegotiator};
use crate::protocol::ProtocolVersion;
use crate::session::{PendingResponse, Session, SessionConfig, SessionControl, SessionEvents};
use crate::supervisor::supervise;
use crate::transport::websocket::{self, ConnectionInfo, Rejection};
use crate::transport::{TransportLink, WriterConfig};

/// Application callbacks of a [`Server`].
pub trait ServerEvents: Send + Sync + 'static {
    /// Decide whether a connecting peer may open a session. Runs during the
    /// handshake; returning `false` answers `401`.
    fn authenticate(&self, _info: &ConnectionInfo) -> bool {
        true
    }

    /// A session is open and routable under `session_id`.
    fn new_session(&self, session_id: Uuid, info: &ConnectionInfo);

    /// The session's connection is gone and `session_id` is no longer routable.
    fn lost_session(&self, session_id: Uuid);
}

/// Builder for configuring and creating a server.
pub struct ServerBuilder {
    negotiator: NegotiatorBuilder,
    session_config: SessionConfig,
    writer_config: WriterConfig,
}

impl ServerBuilder {
    /// Create a new server builder.
    pub fn new() -> Self {
        Self {
            negotiator: NegotiatorBuilder::new(),
            session_config: SessionConfig::default(),
            writer_config: WriterConfig::default(),
        }
    }

    /// Install a profile for `version`. The first install of a version fixes
    /// its negotiation priority.
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

    /// Close sessions after this long without inbound traffic.
    ///
    /// Default: disabled
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.session_config.idle_timeout = Some(timeout);
        self
    }

    /// Set the maximum number of incoming calls handled at once per session.
    ///
    /// Default: 256
    pub fn max_concurrent_handlers(mut self, limit: usize) -> Self {
        self.session_config.max_concurrent_handlers = limit;
        self
    }

    /// Set the writer channel capacity per connection.
    ///
    /// Default: 1024
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.writer_config.channel_capacity = capacity;
        self
    }

    /// Build the server.
    pub fn build(self) -> Result<Server> {
        Ok(Server {
            inner: Arc::new(Inner {
                negotiator: self.negotiator.build()?,
                session_config: self.session_config,
                writer_config: self.writer_config,
                sessions: RwLock::new(HashMap::new()),
                listener: Mutex::new(None),
            }),
        })
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A table entry.
struct Entry {
    control: Arc<dyn SessionControl>,
    events: Arc<dyn ServerEvents>,
}

struct Inner {
    negotiator: ProtocolNegotiator,
    session_config: SessionConfig,
    writer_config: WriterConfig,
    sessions: RwLock<HashMap<Uuid, Entry>>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl Inner {
    /// Take `session_id` out of the table, report it lost and close it.
    fn forget(&self, session_id: Uuid) {
        let removed = self.sessions.write().remove(&session_id);
        if let Some(entry) = removed {
            entry.events.lost_session(session_id);
            entry.control.close();
        }
    }
}

/// The central system side of OCPP connections. Cheap to clone.
#[derive(Clone)]
pub struct Server {
    inner: Arc<Inner>,
}

impl Server {
    /// Create a new server builder.
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    /// Listen for WebSocket connections on `host:port`.
    ///
    /// Returns the bound address (useful with port 0). Calling `open` again
    /// replaces the previous listener; existing sessions are kept.
    pub async fn open(&self, host: &str, port: u16, events: impl ServerEvents) -> Result<SocketAddr> {
        let listener = TcpListener::bind((host, port)).await?;
        let addr = listener.local_addr()?;
        tracing::debug!(%addr, "server listening");

        let events: Arc<dyn ServerEvents> = Arc::new(events);
        let server = self.clone();
        let task = tokio::spawn(async move { server.accept_loop(listener, events).await });

        if let Some(previous) = self.inner.listener.lock().replace(task) {
            previous.abort();
        }
        Ok(addr)
    }

    async fn accept_loop(self, listener: TcpListener, events: Arc<dyn ServerEvents>) {
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    let server = self.clone();
                    let events = events.clone();
                    tokio::spawn(async move { server.handshake(stream, peer, events).await });
                }
                Err(e) => {
                    tracing::warn!(error = %e, "accept failed");
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }

    async fn handshake(self, stream: TcpStream, peer: SocketAddr, events: Arc<dyn ServerEvents>) {
        let negotiator = &self.inner.negotiator;
        let decide = |info: &ConnectionInfo, offered: &[&str]| {
            if !events.authenticate(info) {
                return Err(Rejection::Unauthorized);
            }
            negotiator
                .negotiate(offered)
                .map_err(|_| Rejection::NoCommonProtocol)
        };

        let accepted = websocket::accept(stream, Some(peer), decide, self.inner.writer_config.clone()).await;
        match accepted {
            Ok((link, version, info)) => {
                if let Err(e) = self.register(link, version, info, &events) {
                    tracing::warn!(%peer, error = %e, "could not open session");
                }
            }
            Err(e) => tracing::debug!(%peer, error = %e, "handshake failed"),
        }
    }

    /// Open a session over an already accepted transport.
    ///
    /// Runs [`ServerEvents::authenticate`] first. Returns the new session id.
    pub fn accept(
        &self,
        link: TransportLink,
        version: ProtocolVersion,
        info: ConnectionInfo,
        events: Arc<dyn ServerEvents>,
    ) -> Result<Uuid> {
        if !events.authenticate(&info) {
            link.transport.disconnect();
            return Err(OcppError::Rejected("authentication failed".to_string()));
        }
        self.register(link, version, info, &events)
    }

    fn register(
        &self,
        link: TransportLink,
        version: ProtocolVersion,
        info: ConnectionInfo,
        events: &Arc<dyn ServerEvents>,
    ) -> Result<Uuid> {
        let Some(registry) = self.inner.negotiator.registry(version) else {
            link.transport.disconnect();
            return Err(OcppError::NoCommonProtocol(version.subprotocol().to_string()));
        };

        let session = Session::new(registry, version, &self.inner.session_config);
        let session_id = session.id();
        let control = supervise(session, self.inner.session_config.idle_timeout);

        self.inner.sessions.write().insert(
            session_id,
            Entry {
                control: control.clone(),
                events: events.clone(),
            },
        );

        let watch = Arc::new(ConnectionWatch {
            session_id,
            server: Arc::downgrade(&self.inner),
            announce: Mutex::new(Announce::Pending),
        });
        if let Err(e) = control.open(link, watch.clone()) {
            self.inner.sessions.write().remove(&session_id);
            return Err(e);
        }

        tracing::debug!(session = %session_id, path = %info.path, %version, "session registered");
        events.new_session(session_id, &info);
        watch.announced();
        Ok(session_id)
    }

    /// Send a request to the peer of `session_id`.
    ///
    /// Fails with [`OcppError::NotConnected`] when the id is not in the table.
    pub fn send<R: Request>(
        &self,
        session_id: Uuid,
        request: R,
    ) -> Result<PendingResponse<R::Confirmation>> {
        let session = self.session(session_id).ok_or(OcppError::NotConnected)?;
        session.send(request)
    }

    /// The session registered under `session_id`.
    pub fn session(&self, session_id: Uuid) -> Option<Session> {
        self.inner
            .sessions
            .read()
            .get(&session_id)
            .map(|entry| entry.control.session().clone())
    }

    /// Close one session. `lost_session` fires for it.
    pub fn close_session(&self, session_id: Uuid) {
        self.inner.forget(session_id);
    }

    /// Whether `session_id` is in the table and open.
    pub fn is_session_open(&self, session_id: Uuid) -> bool {
        self.session(session_id).is_some_and(|s| s.is_open())
    }

    /// Ids of all sessions in the table.
    pub fn session_ids(&self) -> Vec<Uuid> {
        self.inner.sessions.read().keys().copied().collect()
    }

    /// Stop listening and close every session.
    pub fn close(&self) {
        if let Some(listener) = self.inner.listener.lock().take() {
            listener.abort();
        }
        for session_id in self.session_ids() {
            self.inner.forget(session_id);
        }
    }
}

/// Whether `new_session` has fired for a watched session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Announce {
    Pending,
    Announced,
    /// The connection went away before `new_session` returned.
    LostEarly,
}

/// Removes a session from the table when its connection goes away.
///
/// The session loop may run on another worker and end before `register`
/// has announced the session. Such a loss is held back and replayed once
/// `new_session` returned, so `lost_session` never overtakes it.
struct ConnectionWatch {
    session_id: Uuid,
    server: Weak<Inner>,
    announce: Mutex<Announce>,
}

impl ConnectionWatch {
    fn announced(&self) {
        let previous = std::mem::replace(&mut *self.announce.lock(), Announce::Announced);
        if previous == Announce::LostEarly {
            tracing::debug!(session = %self.session_id, "connection lost while announcing");
            self.forget_now();
        }
    }

    fn forget(&self) {
        {
            let mut announce = self.announce.lock();
            if *announce != Announce::Announced {
                *announce = Announce::LostEarly;
                return;
            }
        }
        self.forget_now();
    }

    fn forget_now(&self) {
        if let Some(server) = self.server.upgrade() {
            server.forget(self.session_id);
        }
    }
}

impl SessionEvents for ConnectionWatch {
    fn connection_closed(&self) {
        self.forget();
    }

    // Covers a transport that ended before it ever connected.
    fn session_closed(&self) {
        self.forget();
    }
}
