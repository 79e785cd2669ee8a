//! OCPP-J message envelope.
//!
//! Every frame is a JSON array whose first element is the message type:
//!
//! ```text
//! Call:       [2, "<uniqueId>", "<action>", {payload}]
//! CallResult: [3, "<uniqueId>", {payload}]
//! CallError:  [4, "<uniqueId>", "<errorCode>", "<errorDescription>", {details}]
//! ```
//!
//! # Example
//!
//! ```
//! use ocpp_rpc::protocol::{Message, ProtocolVersion};
//! use serde_json::json;
//!
//! let call = Message::call("19223201", "Heartbeat", json!({}));
//! let bytes = call.encode(ProtocolVersion::Ocpp16).unwrap();
//! assert_eq!(&bytes[..], br#"[2,"19223201","Heartbeat",{}]"#);
//! assert_eq!(Message::decode(&bytes).unwrap(), call);
//! ```

use std::fmt;

use bytes::Bytes;
use serde_json::{json, Value};
use thiserror::Error;

use super::{ErrorCode, ProtocolVersion};
use crate::error::Result;

/// Message type numbers.
pub mod message_type {
    /// Request.
    pub const CALL: u64 = 2;
    /// Successful reply.
    pub const CALL_RESULT: u64 = 3;
    /// Failed reply.
    pub const CALL_ERROR: u64 = 4;
}

/// A request frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub unique_id: String,
    pub action: String,
    pub payload: Value,
}

/// A successful reply frame.
#[derive(Debug, Clone, PartialEq)]
pub struct CallResult {
    pub unique_id: String,
    pub payload: Value,
}

/// A failed reply frame.
#[derive(Debug, Clone, PartialEq)]
pub struct CallError {
    pub unique_id: String,
    pub failure: CallFailure,
}

/// Error information of a `CallError`, detached from its unique id.
///
/// Handlers return this to reply with a specific error code, and callers
/// receive it through [`OcppError::Call`](crate::OcppError::Call).
#[derive(Debug, Clone, PartialEq)]
pub struct CallFailure {
    pub code: ErrorCode,
    pub description: String,
    pub details: Value,
}

impl CallFailure {
    /// Create a failure with empty details.
    pub fn new(code: ErrorCode, description: impl Into<String>) -> Self {
        Self {
            code,
            description: description.into(),
            details: json!({}),
        }
    }

    /// Attach an error details object.
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }

    /// `InternalError` with the given description.
    pub fn internal(description: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, description)
    }

    /// `NotSupported` for the given action.
    pub fn not_supported(action: &str) -> Self {
        Self::new(
            ErrorCode::NotSupported,
            format!("Action {} is not supported", action),
        )
    }

    /// Local `NotConnected` failure used when a call could not be transmitted.
    pub fn not_connected() -> Self {
        Self::new(ErrorCode::NotConnected, "The call could not be sent to the peer")
    }
}

impl fmt::Display for CallFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.description)
    }
}

/// A decoded frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Call(Call),
    CallResult(CallResult),
    CallError(CallError),
}

/// Why an inbound frame could not be decoded.
///
/// Carries whatever could still be read from it so the session can reply
/// when the peer is waiting for an answer.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("malformed frame: {reason}")]
pub struct ParseError {
    /// Unique id, when element 1 was a string.
    pub unique_id: Option<String>,
    /// Message type number, when element 0 was an integer.
    pub message_type: Option<u64>,
    /// Human-readable reason.
    pub reason: String,
}

impl ParseError {
    fn new(unique_id: Option<String>, message_type: Option<u64>, reason: impl Into<String>) -> Self {
        Self {
            unique_id,
            message_type,
            reason: reason.into(),
        }
    }
}

impl Message {
    /// Build a `Call`.
    pub fn call(unique_id: impl Into<String>, action: impl Into<String>, payload: Value) -> Self {
        Message::Call(Call {
            unique_id: unique_id.into(),
            action: action.into(),
            payload,
        })
    }

    /// Build a `CallResult`.
    pub fn call_result(unique_id: impl Into<String>, payload: Value) -> Self {
        Message::CallResult(CallResult {
            unique_id: unique_id.into(),
            payload,
        })
    }

    /// Build a `CallError`.
    pub fn call_error(unique_id: impl Into<String>, failure: CallFailure) -> Self {
        Message::CallError(CallError {
            unique_id: unique_id.into(),
            failure,
        })
    }

    /// The unique id this frame carries.
    pub fn unique_id(&self) -> &str {
        match self {
            Message::Call(c) => &c.unique_id,
            Message::CallResult(r) => &r.unique_id,
            Message::CallError(e) => &e.unique_id,
        }
    }

    /// Message type number.
    pub fn message_type(&self) -> u64 {
        match self {
            Message::Call(_) => message_type::CALL,
            Message::CallResult(_) => message_type::CALL_RESULT,
            Message::CallError(_) => message_type::CALL_ERROR,
        }
    }

    /// Encode to a JSON text frame, spelling error codes for `version`.
    pub fn encode(&self, version: ProtocolVersion) -> Result<Bytes> {
        let array = match self {
            Message::Call(c) => json!([message_type::CALL, c.unique_id, c.action, c.payload]),
            Message::CallResult(r) => json!([message_type::CALL_RESULT, r.unique_id, r.payload]),
            Message::CallError(e) => json!([
                message_type::CALL_ERROR,
                e.unique_id,
                e.failure.code.as_wire(version),
                e.failure.description,
                e.failure.details
            ]),
        };
        Ok(Bytes::from(serde_json::to_vec(&array)?))
    }

    /// Decode a JSON text frame.
    pub fn decode(raw: &[u8]) -> std::result::Result<Self, ParseError> {
        let value: Value = serde_json::from_slice(raw)
            .map_err(|e| ParseError::new(None, None, format!("invalid JSON: {}", e)))?;

        let Value::Array(mut items) = value else {
            return Err(ParseError::new(None, None, "frame is not a JSON array"));
        };

        let message_type = items.first().and_then(Value::as_u64);
        let unique_id = items.get(1).and_then(Value::as_str).map(str::to_string);

        let Some(kind) = message_type else {
            return Err(ParseError::new(unique_id, None, "missing message type"));
        };
        let Some(id) = unique_id.clone() else {
            return Err(ParseError::new(None, Some(kind), "missing unique id"));
        };
        let fail = |reason: &str| ParseError::new(unique_id.clone(), Some(kind), reason);

        match kind {
            message_type::CALL => {
                if items.len() != 4 {
                    return Err(fail("Call must have 4 elements"));
                }
                let payload = items.pop().unwrap_or(Value::Null);
                let action = items[2]
                    .as_str()
                    .ok_or_else(|| fail("action is not a string"))?
                    .to_string();
                Ok(Message::call(id, action, payload))
            }
            message_type::CALL_RESULT => {
                if items.len() != 3 {
                    return Err(fail("CallResult must have 3 elements"));
                }
                let payload = items.pop().unwrap_or(Value::Null);
                Ok(Message::call_result(id, payload))
            }
            message_type::CALL_ERROR => {
                // Some peers omit the details object.
                if items.len() != 4 && items.len() != 5 {
                    return Err(fail("CallError must have 5 elements"));
                }
                let details = if items.len() == 5 {
                    items.pop().unwrap_or_else(|| json!({}))
                } else {
                    json!({})
                };
                let code = items[2]
                    .as_str()
                    .ok_or_else(|| fail("error code is not a string"))?;
                let description = items[3]
                    .as_str()
                    .ok_or_else(|| fail("error description is not a string"))?;
                Ok(Message::call_error(
                    id,
                    CallFailure::new(ErrorCode::from_wire(code), description).with_details(details),
                ))
            }
            other => Err(fail(&format!("unknown message type {}", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_call() {
        let raw = br#"[2,"abc","BootNotification",{"chargePointVendor":"V"}]"#;
        let message = Message::decode(raw).unwrap();

        let Message::Call(call) = message else {
            panic!("expected Call");
        };
        assert_eq!(call.unique_id, "abc");
        assert_eq!(call.action, "BootNotification");
        assert_eq!(call.payload["chargePointVendor"], "V");
    }

    #[test]
    fn test_encode_call_error_uses_version_spelling() {
        let message = Message::call_error(
            "1",
            CallFailure::new(ErrorCode::FormationViolation, "bad payload"),
        );

        let v16 = message.encode(ProtocolVersion::Ocpp16).unwrap();
        let v201 = message.encode(ProtocolVersion::Ocpp201).unwrap();

        assert_eq!(&v16[..], br#"[4,"1","FormationViolation","bad payload",{}]"#);
        assert_eq!(&v201[..], br#"[4,"1","FormatViolation","bad payload",{}]"#);
    }

    #[test]
    fn test_decode_call_error_without_details() {
        let message = Message::decode(br#"[4,"7","NotSupported","nope"]"#).unwrap();
        let Message::CallError(error) = message else {
            panic!("expected CallError");
        };
        assert_eq!(error.failure.code, ErrorCode::NotSupported);
        assert_eq!(error.failure.details, json!({}));
    }

    #[test]
    fn test_decode_not_json() {
        let err = Message::decode(b"hello").unwrap_err();
        assert_eq!(err.unique_id, None);
        assert_eq!(err.message_type, None);
    }

    #[test]
    fn test_decode_malformed_call_keeps_id() {
        let err = Message::decode(br#"[2,"42",17,{}]"#).unwrap_err();
        assert_eq!(err.unique_id.as_deref(), Some("42"));
        assert_eq!(err.message_type, Some(message_type::CALL));
    }

    #[test]
    fn test_decode_unknown_type() {
        let err = Message::decode(br#"[6,"42","Notify",{}]"#).unwrap_err();
        assert_eq!(err.message_type, Some(6));
        assert_eq!(err.unique_id.as_deref(), Some("42"));
    }

    #[test]
    fn test_decode_wrong_arity() {
        assert!(Message::decode(br#"[3,"1"]"#).is_err());
        assert!(Message::decode(br#"[2,"1","Heartbeat"]"#).is_err());
    }
}
