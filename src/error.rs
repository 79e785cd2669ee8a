//! Error types for ocpp-rpc.

use thiserror::Error;

use crate::protocol::{CallFailure, ErrorCode};

/// Main error type for all engine operations.
#[derive(Debug, Error)]
pub enum OcppError {
    /// I/O error on the underlying socket.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket handshake or framing error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] Box<tokio_tungstenite::tungstenite::Error>),

    /// Protocol misuse or an unexpected frame.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// No feature matches the request type.
    #[error("No feature registered for {0}")]
    UnsupportedFeature(String),

    /// The request failed its own validation before being sent.
    #[error("Occurence constraint violation: {0}")]
    OccurenceConstraint(String),

    /// No live connection for this request.
    #[error("Not connected")]
    NotConnected,

    /// Two features claim the same action or payload type.
    #[error("Duplicate feature registration: {0}")]
    DuplicateAction(String),

    /// A unique id was registered twice while still pending.
    #[error("Unique id already pending: {0}")]
    DuplicateId(String),

    /// The peers share no protocol version.
    #[error("No common protocol version (offered: {0})")]
    NoCommonProtocol(String),

    /// The server refused the connection during the handshake.
    #[error("Connection rejected: {0}")]
    Rejected(String),

    /// The peer (or the local transport) answered with a CallError.
    #[error("Call failed with {0}")]
    Call(CallFailure),

    /// The pending request was dropped without an answer.
    #[error("Request abandoned")]
    Cancelled,

    /// The outbound channel is full.
    #[error("Outbound queue full")]
    Backpressure,

    /// Session is already open or has been closed.
    #[error("Invalid session state: {0}")]
    InvalidState(&'static str),
}

impl OcppError {
    /// True for the local `NotConnected` error and for a synthesized
    /// `NotConnected` CallError.
    pub fn is_not_connected(&self) -> bool {
        match self {
            OcppError::NotConnected => true,
            OcppError::Call(failure) => failure.code == ErrorCode::NotConnected,
            _ => false,
        }
    }

    /// The CallError code, when this error came from a CallError.
    pub fn call_error_code(&self) -> Option<&ErrorCode> {
        match self {
            OcppError::Call(failure) => Some(&failure.code),
            _ => None,
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for OcppError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        OcppError::WebSocket(Box::new(err))
    }
}

/// Result type alias using OcppError.
pub type Result<T> = std::result::Result<T, OcppError>;
