//! OCPP-J over WebSocket.
//!
//! The protocol version is negotiated in the HTTP upgrade through the
//! `Sec-WebSocket-Protocol` header. [`connect`] offers a list of versions and
//! checks the server's pick; [`accept`] lets the caller authenticate the
//! request and pick a version, and answers `400 Bad Request` when nothing
//! matches.
//!
//! After the handshake a driver task per connection reads frames into the
//! [`TransportEvent`] channel and a writer task owns the sink. A client can
//! reconnect on a fixed interval; it re-offers only the version negotiated
//! first so the session's registry stays valid.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Notify};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::header::{AUTHORIZATION, SEC_WEBSOCKET_PROTOCOL};
use tokio_tungstenite::tungstenite::http::{HeaderValue, StatusCode};
use tokio_tungstenite::tungstenite;
use tokio_tungstenite::{accept_hdr_async, connect_async, MaybeTlsStream, WebSocketStream};

use super::{spawn_writer_task, Transport, TransportEvent, TransportLink, WriterConfig, WriterHandle};
use crate::error::{OcppError, Result};
use crate::protocol::{parse_subprotocol_header, ProtocolVersion};

/// How long a closing connection may take to flush its close frame.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

type ClientStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Configuration for WebSocket transports.
#[derive(Debug, Clone, Default)]
pub struct WebSocketConfig {
    /// Client only: wait this long between reconnect attempts. `None`
    /// disables reconnecting.
    pub reconnect_interval: Option<Duration>,
    /// Writer task settings.
    pub writer: WriterConfig,
}

/// What the server knows about a connecting peer when it authenticates it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionInfo {
    /// Request path, e.g. `/ocpp/CP001`.
    pub path: String,
    /// Charge point identity: the last non-empty path segment.
    pub identity: Option<String>,
    /// Raw `Authorization` header, if sent.
    pub authorization: Option<String>,
    /// Peer socket address, when known.
    pub remote_addr: Option<SocketAddr>,
}

impl ConnectionInfo {
    /// Info for a request path, with the identity taken from its last segment.
    pub fn from_path(path: impl Into<String>) -> Self {
        let path = path.into();
        let identity = path
            .rsplit('/')
            .find(|segment| !segment.is_empty())
            .map(str::to_string);
        Self {
            path,
            identity,
            ..Self::default()
        }
    }

    fn from_request(request: &Request, remote_addr: Option<SocketAddr>) -> Self {
        let authorization = request
            .headers()
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        Self {
            authorization,
            remote_addr,
            ..Self::from_path(request.uri().path())
        }
    }
}

/// Why the server refused a handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Authentication failed (`401`).
    Unauthorized,
    /// No offered sub-protocol is supported (`400`).
    NoCommonProtocol,
}

impl Rejection {
    fn response(self) -> ErrorResponse {
        let (status, body) = match self {
            Rejection::Unauthorized => (StatusCode::UNAUTHORIZED, "authentication failed"),
            Rejection::NoCommonProtocol => (StatusCode::BAD_REQUEST, "no supported sub-protocol"),
        };
        let mut response = ErrorResponse::new(Some(body.to_string()));
        *response.status_mut() = status;
        response
    }
}

/// State shared by a transport handle and its driver task.
#[derive(Default)]
struct Shared {
    writer: Mutex<Option<WriterHandle>>,
    connected: AtomicBool,
    closed: AtomicBool,
    shutdown: Notify,
}

/// A WebSocket connection (client or server side).
pub struct WebSocketTransport {
    shared: Arc<Shared>,
}

impl Transport for WebSocketTransport {
    fn send(&self, frame: Bytes) -> Result<()> {
        if !self.shared.connected.load(Ordering::Acquire) {
            return Err(OcppError::NotConnected);
        }
        match self.shared.writer.lock().as_ref() {
            Some(writer) => writer.send(frame),
            None => Err(OcppError::NotConnected),
        }
    }

    fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::Acquire)
    }

    fn disconnect(&self) {
        if !self.shared.closed.swap(true, Ordering::AcqRel) {
            self.shared.shutdown.notify_one();
        }
    }
}

/// Connect to `uri`, offering `versions` in priority order.
///
/// Returns the link and the version the server picked. Fails with
/// [`OcppError::NoCommonProtocol`] when the server picks nothing we offered
/// or answers `400`.
pub async fn connect(
    uri: &str,
    versions: &[ProtocolVersion],
    config: WebSocketConfig,
) -> Result<(TransportLink, ProtocolVersion)> {
    let (stream, version) = handshake(uri, versions).await?;
    tracing::debug!(uri, %version, "websocket connected");

    let shared = Arc::new(Shared::default());
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let transport = Arc::new(WebSocketTransport {
        shared: shared.clone(),
    });

    tokio::spawn(client_loop(
        stream,
        uri.to_string(),
        version,
        config,
        shared,
        events_tx,
    ));

    Ok((TransportLink::new(transport, events_rx), version))
}

async fn handshake(uri: &str, versions: &[ProtocolVersion]) -> Result<(ClientStream, ProtocolVersion)> {
    let offered = versions
        .iter()
        .map(|v| v.subprotocol())
        .collect::<Vec<_>>()
        .join(", ");

    let mut request = uri.into_client_request()?;
    let header = HeaderValue::from_str(&offered)
        .map_err(|e| OcppError::Protocol(format!("invalid sub-protocol header: {}", e)))?;
    request.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, header);

    let (stream, response) = match connect_async(request).await {
        Ok(connected) => connected,
        Err(tungstenite::Error::Http(response)) if response.status() == StatusCode::BAD_REQUEST => {
            return Err(OcppError::NoCommonProtocol(offered));
        }
        Err(tungstenite::Error::Http(response)) => {
            return Err(OcppError::Rejected(format!("HTTP {}", response.status())));
        }
        Err(e) => return Err(e.into()),
    };

    let chosen = response
        .headers()
        .get(SEC_WEBSOCKET_PROTOCOL)
        .and_then(|v| v.to_str().ok())
        .and_then(ProtocolVersion::from_subprotocol);

    match chosen {
        Some(version) if versions.contains(&version) => Ok((stream, version)),
        _ => Err(OcppError::NoCommonProtocol(offered)),
    }
}

async fn client_loop(
    mut stream: ClientStream,
    uri: String,
    version: ProtocolVersion,
    config: WebSocketConfig,
    shared: Arc<Shared>,
    events: mpsc::UnboundedSender<TransportEvent>,
) {
    loop {
        drive(stream, &shared, &events, &config.writer).await;

        if shared.closed.load(Ordering::Acquire) {
            break;
        }
        let Some(interval) = config.reconnect_interval else {
            break;
        };

        stream = loop {
            tokio::select! {
                _ = shared.shutdown.notified() => return,
                _ = tokio::time::sleep(interval) => {}
            }
            match handshake(&uri, &[version]).await {
                Ok((stream, _)) => {
                    tracing::debug!(uri = %uri, "websocket reconnected");
                    break stream;
                }
                Err(e) => tracing::debug!(uri = %uri, error = %e, "reconnect failed"),
            }
        };
    }
}

/// Accept a WebSocket upgrade on `stream`.
///
/// `decide` sees the connection info and the offered sub-protocol tokens and
/// either picks a version or rejects the handshake.
pub async fn accept<S, F>(
    stream: S,
    remote_addr: Option<SocketAddr>,
    decide: F,
    config: WriterConfig,
) -> Result<(TransportLink, ProtocolVersion, ConnectionInfo)>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    F: FnOnce(&ConnectionInfo, &[&str]) -> std::result::Result<ProtocolVersion, Rejection>
        + Unpin
        + Send,
{
    let mut accepted: Option<(ProtocolVersion, ConnectionInfo)> = None;
    let mut refused: Option<(Rejection, String)> = None;

    let callback = |request: &Request, mut response: Response| {
        let info = ConnectionInfo::from_request(request, remote_addr);
        let header = request
            .headers()
            .get(SEC_WEBSOCKET_PROTOCOL)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        let offered = parse_subprotocol_header(header);

        match decide(&info, &offered) {
            Ok(version) => {
                response.headers_mut().insert(
                    SEC_WEBSOCKET_PROTOCOL,
                    HeaderValue::from_static(version.subprotocol()),
                );
                accepted = Some((version, info));
                Ok(response)
            }
            Err(rejection) => {
                refused = Some((rejection, header.to_string()));
                Err(rejection.response())
            }
        }
    };

    let handshake = accept_hdr_async(stream, callback).await;

    let ws = match (handshake, refused) {
        (Ok(ws), _) => ws,
        (Err(_), Some((Rejection::NoCommonProtocol, offered))) => {
            return Err(OcppError::NoCommonProtocol(offered));
        }
        (Err(_), Some((Rejection::Unauthorized, _))) => {
            return Err(OcppError::Rejected("authentication failed".to_string()));
        }
        (Err(e), None) => return Err(e.into()),
    };
    let Some((version, info)) = accepted else {
        return Err(OcppError::Protocol("handshake finished without a decision".to_string()));
    };
    tracing::debug!(path = %info.path, %version, "websocket accepted");

    let shared = Arc::new(Shared::default());
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let transport = Arc::new(WebSocketTransport {
        shared: shared.clone(),
    });

    tokio::spawn(async move {
        drive(ws, &shared, &events_tx, &config).await;
    });

    Ok((TransportLink::new(transport, events_rx), version, info))
}

/// Run one connection until it drops or the transport is told to disconnect.
async fn drive<S>(
    stream: WebSocketStream<S>,
    shared: &Shared,
    events: &mpsc::UnboundedSender<TransportEvent>,
    config: &WriterConfig,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (sink, mut source) = stream.split();
    let (writer, writer_task) = spawn_writer_task(sink, config.clone());
    *shared.writer.lock() = Some(writer);
    shared.connected.store(true, Ordering::Release);
    let _ = events.send(TransportEvent::Connected);

    loop {
        let frame = tokio::select! {
            _ = shared.shutdown.notified() => break,
            frame = source.next() => frame,
        };

        match frame {
            Some(Ok(msg)) if msg.is_text() || msg.is_binary() => {
                let _ = events.send(TransportEvent::Message(Bytes::from(msg.into_data())));
            }
            Some(Ok(msg)) if msg.is_close() => {
                tracing::debug!("peer closed the websocket");
                break;
            }
            // Ping/pong are answered by tungstenite.
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                tracing::debug!(error = %e, "websocket read failed");
                break;
            }
            None => break,
        }
    }

    shared.connected.store(false, Ordering::Release);
    let writer = shared.writer.lock().take();
    if let Some(writer) = writer {
        writer.close();
    }
    let _ = events.send(TransportEvent::Disconnected);

    match tokio::time::timeout(CLOSE_TIMEOUT, writer_task).await {
        Ok(Ok(Err(e))) => tracing::debug!(error = %e, "websocket writer stopped with error"),
        Ok(Err(e)) => tracing::error!(error = %e, "websocket writer task panicked"),
        Err(_) => tracing::debug!("websocket writer did not finish in time"),
        Ok(Ok(Ok(()))) => {}
    }
}
