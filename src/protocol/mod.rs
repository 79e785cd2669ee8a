//! Protocol module - wire envelope, error codes and versions.
//!
//! - [`Message`] - the three OCPP-J frame kinds
//! - [`ErrorCode`] - CallError codes with per-version spelling
//! - [`ProtocolVersion`] - negotiated sub-protocol

mod error_code;
mod message;
mod version;

pub use error_code::ErrorCode;
pub use message::{message_type, Call, CallError, CallFailure, CallResult, Message, ParseError};
pub use version::{parse_subprotocol_header, ProtocolVersion};
