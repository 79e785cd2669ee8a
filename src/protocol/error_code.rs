//! CallError codes.
//!
//! OCPP 1.6 and 2.x disagree on the spelling of two codes
//! (`FormationViolation` vs `FormatViolation`, `OccurenceConstraintViolation`
//! vs `OccurrenceConstraintViolation`). [`ErrorCode::as_wire`] picks the
//! spelling of the negotiated version; parsing accepts both.
//!
//! # Example
//!
//! ```
//! use ocpp_rpc::protocol::{ErrorCode, ProtocolVersion};
//!
//! let code = ErrorCode::FormationViolation;
//! assert_eq!(code.as_wire(ProtocolVersion::Ocpp16), "FormationViolation");
//! assert_eq!(code.as_wire(ProtocolVersion::Ocpp201), "FormatViolation");
//! assert_eq!(ErrorCode::from_wire("FormatViolation"), code);
//! ```

use std::fmt;

use super::ProtocolVersion;

/// Error code carried by a `CallError` frame.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Requested action is not known by the receiver.
    NotImplemented,
    /// Requested action is recognized but not supported by the receiver.
    NotSupported,
    /// An internal error occurred while processing the action.
    InternalError,
    /// Payload for the action is incomplete.
    ProtocolError,
    /// Security issue occurred during processing.
    SecurityError,
    /// Payload is syntactically incorrect.
    FormationViolation,
    /// Payload is syntactically correct but a field violates a constraint.
    PropertyConstraintViolation,
    /// A field violates an occurrence constraint.
    OccurenceConstraintViolation,
    /// A field violates a data type constraint.
    TypeConstraintViolation,
    /// Message type number is not supported (2.x only).
    MessageTypeNotSupported,
    /// Frame could not be processed by the RPC framework (2.x only).
    RpcFrameworkError,
    /// Any other error.
    GenericError,
    /// Synthesized locally when a call could not be handed to the transport.
    NotConnected,
    /// Application-defined code returned deliberately by a handler.
    Other(String),
}

impl ErrorCode {
    /// Wire spelling for the given protocol version.
    pub fn as_wire(&self, version: ProtocolVersion) -> &str {
        let v2 = version.is_v2();
        match self {
            ErrorCode::NotImplemented => "NotImplemented",
            ErrorCode::NotSupported => "NotSupported",
            ErrorCode::InternalError => "InternalError",
            ErrorCode::ProtocolError => "ProtocolError",
            ErrorCode::SecurityError => "SecurityError",
            ErrorCode::FormationViolation if v2 => "FormatViolation",
            ErrorCode::FormationViolation => "FormationViolation",
            ErrorCode::PropertyConstraintViolation => "PropertyConstraintViolation",
            ErrorCode::OccurenceConstraintViolation if v2 => "OccurrenceConstraintViolation",
            ErrorCode::OccurenceConstraintViolation => "OccurenceConstraintViolation",
            ErrorCode::TypeConstraintViolation => "TypeConstraintViolation",
            ErrorCode::MessageTypeNotSupported => "MessageTypeNotSupported",
            ErrorCode::RpcFrameworkError => "RpcFrameworkError",
            ErrorCode::GenericError => "GenericError",
            ErrorCode::NotConnected => "NotConnected",
            ErrorCode::Other(code) => code,
        }
    }

    /// Parse a wire code, accepting both 1.6 and 2.x spellings.
    pub fn from_wire(code: &str) -> Self {
        match code {
            "NotImplemented" => ErrorCode::NotImplemented,
            "NotSupported" => ErrorCode::NotSupported,
            "InternalError" => ErrorCode::InternalError,
            "ProtocolError" => ErrorCode::ProtocolError,
            "SecurityError" => ErrorCode::SecurityError,
            "FormationViolation" | "FormatViolation" => ErrorCode::FormationViolation,
            "PropertyConstraintViolation" => ErrorCode::PropertyConstraintViolation,
            "OccurenceConstraintViolation" | "OccurrenceConstraintViolation" => {
                ErrorCode::OccurenceConstraintViolation
            }
            "TypeConstraintViolation" => ErrorCode::TypeConstraintViolation,
            "MessageTypeNotSupported" => ErrorCode::MessageTypeNotSupported,
            "RpcFrameworkError" => ErrorCode::RpcFrameworkError,
            "GenericError" => ErrorCode::GenericError,
            "NotConnected" => ErrorCode::NotConnected,
            other => ErrorCode::Other(other.to_string()),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire(ProtocolVersion::Ocpp16))
    }
}
