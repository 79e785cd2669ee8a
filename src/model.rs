//! Payload contract between application types and the engine.
//!
//! The engine does not ship the OCPP payload catalog. Applications (or a
//! generated catalog crate) implement [`Request`] and [`Confirmation`] for their
//! payload structs; the engine needs only the action name, the confirmation
//! type, the transaction flag and a `validate` hook.
//!
//! # Example
//!
//! ```
//! use ocpp_rpc::model::{require, Confirmation, Request, Validate, ValidationError};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize)]
//! #[serde(rename_all = "camelCase")]
//! struct StopTransactionRequest {
//!     transaction_id: Option<i32>,
//!     meter_stop: i32,
//! }
//!
//! #[derive(Serialize, Deserialize)]
//! struct StopTransactionConfirmation {}
//!
//! impl Validate for StopTransactionRequest {
//!     fn validate(&self) -> Result<(), ValidationError> {
//!         require("transactionId", &self.transaction_id)
//!     }
//! }
//! impl Validate for StopTransactionConfirmation {}
//! impl Confirmation for StopTransactionConfirmation {}
//!
//! impl Request for StopTransactionRequest {
//!     const ACTION: &'static str = "StopTransaction";
//!     type Confirmation = StopTransactionConfirmation;
//!
//!     fn transaction_related(&self) -> bool {
//!         true
//!     }
//! }
//! ```

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// A payload failed its own constraints.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    /// Offending field, in wire (camelCase) spelling.
    pub field: String,
    /// What is wrong with it.
    pub message: String,
}

impl ValidationError {
    /// Create a validation error for `field`.
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Semantic validation beyond what deserialization enforces.
///
/// The default accepts everything.
pub trait Validate {
    /// Check the payload's constraints.
    fn validate(&self) -> Result<(), ValidationError> {
        Ok(())
    }
}

/// An outgoing or incoming request payload.
pub trait Request: Serialize + DeserializeOwned + Validate + Send + 'static {
    /// Action name on the wire, e.g. `"BootNotification"`.
    const ACTION: &'static str;

    /// Payload type of the successful reply.
    type Confirmation: Confirmation;

    /// Whether losing this request while offline would corrupt charging or
    /// billing state. Such requests are queued and retried instead of failing.
    fn transaction_related(&self) -> bool {
        false
    }
}

/// A reply payload.
pub trait Confirmation: Serialize + DeserializeOwned + Validate + Send + 'static {}

/// Fail with "required" when `value` is absent.
pub fn require<T>(field: &str, value: &Option<T>) -> Result<(), ValidationError> {
    match value {
        Some(_) => Ok(()),
        None => Err(ValidationError::new(field, "is required")),
    }
}

/// Fail when `value` is longer than `max` characters.
pub fn max_length(field: &str, value: &str, max: usize) -> Result<(), ValidationError> {
    if value.chars().count() > max {
        return Err(ValidationError::new(
            field,
            format!("exceeds maximum length of {}", max),
        ));
    }
    Ok(())
}

/// Membership test with explicit handling of absent values.
///
/// - an absent `needle` is never among anything, even a haystack made only
///   of absent values;
/// - an empty haystack contains nothing;
/// - absent haystack elements are skipped and never match.
pub fn is_among<T: PartialEq>(needle: Option<&T>, haystack: &[Option<T>]) -> bool {
    let Some(needle) = needle else {
        return false;
    };
    haystack.iter().flatten().any(|candidate| candidate == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_among_present_needle() {
        let haystack = [Some("Accepted"), None, Some("Rejected")];
        assert!(is_among(Some(&"Rejected"), &haystack));
        assert!(!is_among(Some(&"Pending"), &haystack));
    }

    #[test]
    fn test_is_among_absent_needle_is_never_found() {
        let all_absent: [Option<&str>; 2] = [None, None];
        assert!(!is_among(None, &all_absent));
        assert!(!is_among(None, &[Some("Accepted")]));
    }

    #[test]
    fn test_is_among_empty_haystack() {
        let empty: [Option<i32>; 0] = [];
        assert!(!is_among(Some(&1), &empty));
        assert!(!is_among(None, &empty));
    }

    #[test]
    fn test_require() {
        assert!(require("idTag", &Some("A")).is_ok());
        let err = require::<u8>("idTag", &None).unwrap_err();
        assert_eq!(err.field, "idTag");
        assert_eq!(err.to_string(), "idTag: is required");
    }

    #[test]
    fn test_max_length_counts_characters() {
        assert!(max_length("idTag", "ÄÖÜ", 3).is_ok());
        assert!(max_length("idTag", "ABCD", 3).is_err());
    }
}
