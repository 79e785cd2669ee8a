//! Transport module - the message pipe under a session.
//!
//! The engine needs very little from a transport: hand it a text frame, ask
//! whether it is connected, tell it to go away, and receive its events on a
//! channel. Framing, TLS and reconnect policy stay inside the implementation.
//!
//! Provides:
//! - [`Transport`] / [`TransportEvent`] / [`TransportLink`] - the contract
//! - [`mem`] - in-process transport for tests and embedding
//! - [`websocket`] - OCPP-J over WebSocket (`tokio-tungstenite`)

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::error::Result;

pub mod mem;
pub mod websocket;
mod writer;

pub use writer::{spawn_writer_task, WriterConfig, WriterHandle};

/// Event delivered by a transport.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// The connection is up; frames may be sent.
    Connected,
    /// The connection dropped. The transport may reconnect later.
    Disconnected,
    /// A frame arrived.
    Message(Bytes),
}

/// Outbound side of a transport.
pub trait Transport: Send + Sync + 'static {
    /// Hand a frame to the transport without waiting.
    ///
    /// Returns [`OcppError::NotConnected`](crate::OcppError::NotConnected) when
    /// there is no live connection.
    fn send(&self, frame: Bytes) -> Result<()>;

    /// Whether frames can currently be sent.
    fn is_connected(&self) -> bool;

    /// Close the connection for good. The event stream ends afterwards.
    fn disconnect(&self);
}

/// A transport together with its event stream.
///
/// The stream ending means the transport is gone for good.
pub struct TransportLink {
    pub transport: Arc<dyn Transport>,
    pub events: mpsc::UnboundedReceiver<TransportEvent>,
}

impl TransportLink {
    /// Bundle a transport with its events.
    pub fn new(
        transport: Arc<dyn Transport>,
        events: mpsc::UnboundedReceiver<TransportEvent>,
    ) -> Self {
        Self { transport, events }
    }
}
