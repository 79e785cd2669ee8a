//! In-process transport.
//!
//! [`channel`] returns a transport whose far end is a [`MemRemote`]: tests
//! read what the engine sent, inject frames, and flip connectivity.
//! [`pair`] links two transports back to back so a client and a server
//! session can talk without sockets.
//!
//! # Example
//!
//! ```
//! use ocpp_rpc::transport::{mem, Transport, TransportEvent};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let (mut link, mut remote) = mem::channel();
//! remote.connect();
//! assert_eq!(link.events.recv().await, Some(TransportEvent::Connected));
//!
//! link.transport.send("[2,\"1\",\"Heartbeat\",{}]".into()).unwrap();
//! assert_eq!(remote.try_next_sent().unwrap(), "[2,\"1\",\"Heartbeat\",{}]");
//! # }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::{Transport, TransportEvent, TransportLink};
use crate::error::{OcppError, Result};

/// In-memory transport endpoint.
pub struct MemTransport {
    connected: AtomicBool,
    refuse_sends: AtomicBool,
    /// Event sender towards the session. `None` once disconnected for good.
    events: Mutex<Option<mpsc::UnboundedSender<TransportEvent>>>,
    /// Frames sent by the session.
    outbound: mpsc::UnboundedSender<Bytes>,
    /// Other end of a [`pair`].
    peer: Mutex<Option<Weak<MemTransport>>>,
}

impl MemTransport {
    fn new(
        events: mpsc::UnboundedSender<TransportEvent>,
        outbound: mpsc::UnboundedSender<Bytes>,
    ) -> Self {
        Self {
            connected: AtomicBool::new(false),
            refuse_sends: AtomicBool::new(false),
            events: Mutex::new(Some(events)),
            outbound,
            peer: Mutex::new(None),
        }
    }

    fn emit(&self, event: TransportEvent) {
        if let Some(tx) = self.events.lock().as_ref() {
            let _ = tx.send(event);
        }
    }

    fn set_connected(&self, connected: bool) {
        if self.connected.swap(connected, Ordering::AcqRel) != connected {
            self.emit(if connected {
                TransportEvent::Connected
            } else {
                TransportEvent::Disconnected
            });
        }
    }
}

impl Transport for MemTransport {
    fn send(&self, frame: Bytes) -> Result<()> {
        if !self.connected.load(Ordering::Acquire) || self.refuse_sends.load(Ordering::Acquire) {
            return Err(OcppError::NotConnected);
        }
        self.outbound
            .send(frame)
            .map_err(|_| OcppError::NotConnected)
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn disconnect(&self) {
        if self.events.lock().is_none() {
            return;
        }
        self.set_connected(false);
        self.events.lock().take();

        let peer = self.peer.lock().take().and_then(|p| p.upgrade());
        if let Some(peer) = peer {
            peer.disconnect();
        }
    }
}

/// Far end of a [`channel`] transport.
pub struct MemRemote {
    transport: Arc<MemTransport>,
    sent: mpsc::UnboundedReceiver<Bytes>,
}

impl MemRemote {
    /// Bring the connection up (emits `Connected`).
    pub fn connect(&self) {
        self.transport.set_connected(true);
    }

    /// Drop the connection without closing the transport (emits
    /// `Disconnected`); `connect` may follow.
    pub fn drop_connection(&self) {
        self.transport.set_connected(false);
    }

    /// Close the transport for good; the session's event stream ends.
    pub fn close(&self) {
        self.transport.disconnect();
    }

    /// Make sends fail while still reporting connected.
    pub fn refuse_sends(&self, refuse: bool) {
        self.transport.refuse_sends.store(refuse, Ordering::Release);
    }

    /// Deliver a frame to the session.
    pub fn deliver(&self, frame: impl Into<Bytes>) {
        self.transport.emit(TransportEvent::Message(frame.into()));
    }

    /// Next frame the session sent, waiting for it.
    pub async fn next_sent(&mut self) -> Option<String> {
        self.sent.recv().await.map(bytes_to_string)
    }

    /// Next frame the session sent, if one is already there.
    pub fn try_next_sent(&mut self) -> Option<String> {
        self.sent.try_recv().ok().map(bytes_to_string)
    }

    /// Whether the transport is connected.
    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Whether the transport was closed for good.
    pub fn is_closed(&self) -> bool {
        self.transport.events.lock().is_none()
    }
}

fn bytes_to_string(frame: Bytes) -> String {
    String::from_utf8_lossy(&frame).into_owned()
}

/// A transport driven by a [`MemRemote`]. Starts disconnected.
pub fn channel() -> (TransportLink, MemRemote) {
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (sent_tx, sent_rx) = mpsc::unbounded_channel();
    let transport = Arc::new(MemTransport::new(events_tx, sent_tx));

    let link = TransportLink::new(transport.clone(), events_rx);
    (link, MemRemote { transport, sent: sent_rx })
}

/// Two connected transports; frames sent on one arrive on the other.
///
/// Must be called inside a tokio runtime. Disconnecting either side
/// disconnects both.
pub fn pair() -> (TransportLink, TransportLink) {
    let (a_events_tx, a_events_rx) = mpsc::unbounded_channel();
    let (a_sent_tx, a_sent_rx) = mpsc::unbounded_channel();
    let (b_events_tx, b_events_rx) = mpsc::unbounded_channel();
    let (b_sent_tx, b_sent_rx) = mpsc::unbounded_channel();

    let a = Arc::new(MemTransport::new(a_events_tx, a_sent_tx));
    let b = Arc::new(MemTransport::new(b_events_tx, b_sent_tx));
    *a.peer.lock() = Some(Arc::downgrade(&b));
    *b.peer.lock() = Some(Arc::downgrade(&a));

    tokio::spawn(relay(a_sent_rx, Arc::downgrade(&b)));
    tokio::spawn(relay(b_sent_rx, Arc::downgrade(&a)));

    a.set_connected(true);
    b.set_connected(true);

    (
        TransportLink::new(a, a_events_rx),
        TransportLink::new(b, b_events_rx),
    )
}

/// Forward frames sent on one side to the other until the sender is gone.
async fn relay(mut sent: mpsc::UnboundedReceiver<Bytes>, to: Weak<MemTransport>) {
    while let Some(frame) = sent.recv().await {
        let Some(to) = to.upgrade() else {
            break;
        };
        to.emit(TransportEvent::Message(frame));
    }
}
