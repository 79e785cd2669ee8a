//! JSON payload codec using `serde_json`.
//!
//! OCPP-J payloads are JSON objects with camelCase field names. Payload types
//! carry their own `#[serde(rename_all = "camelCase")]`; this codec only moves
//! them in and out of [`serde_json::Value`], which is what the envelope holds.
//!
//! # Example
//!
//! ```
//! use ocpp_rpc::codec::JsonCodec;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize, PartialEq, Debug)]
//! #[serde(rename_all = "camelCase")]
//! struct Heartbeat {
//!     current_time: String,
//! }
//!
//! let msg = Heartbeat { current_time: "2024-01-01T00:00:00Z".to_string() };
//! let packed = JsonCodec::pack(&msg).unwrap();
//! assert_eq!(packed["currentTime"], "2024-01-01T00:00:00Z");
//! let unpacked: Heartbeat = JsonCodec::unpack(packed).unwrap();
//! assert_eq!(unpacked, msg);
//! ```

use serde_json::Value;

use crate::error::Result;

/// JSON codec for envelope payloads.
pub struct JsonCodec;

impl JsonCodec {
    /// Pack a payload into a JSON value.
    ///
    /// # Errors
    ///
    /// Returns error if the value cannot be serialized.
    #[inline]
    pub fn pack<T: serde::Serialize>(value: &T) -> Result<Value> {
        Ok(serde_json::to_value(value)?)
    }

    /// Unpack a JSON value into a payload type.
    ///
    /// # Errors
    ///
    /// Returns error if the value does not match type T.
    #[inline]
    pub fn unpack<T: serde::de::DeserializeOwned>(value: Value) -> Result<T> {
        Ok(serde_json::from_value(value)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    #[serde(rename_all = "camelCase")]
    struct StartTransaction {
        connector_id: u32,
        id_tag: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        reservation_id: Option<i32>,
    }

    #[test]
    fn test_pack_uses_payload_field_names() {
        let request = StartTransaction {
            connector_id: 1,
            id_tag: "TAG".to_string(),
            reservation_id: None,
        };

        let packed = JsonCodec::pack(&request).unwrap();
        assert_eq!(packed, json!({"connectorId": 1, "idTag": "TAG"}));
    }

    #[test]
    fn test_unpack_missing_field_fails() {
        let result: Result<StartTransaction> = JsonCodec::unpack(json!({"connectorId": 1}));
        assert!(result.is_err());
    }

    #[test]
    fn test_unpack_wrong_type_fails() {
        let result: Result<StartTransaction> =
            JsonCodec::unpack(json!({"connectorId": "one", "idTag": "TAG"}));
        assert!(result.is_err());
    }
}
