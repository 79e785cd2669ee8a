//! Codec module - payload packing for the message envelope.
//!
//! - [`JsonCodec`] - OCPP-J payloads via `serde_json`
//!
//! # Design
//!
//! Codecs are marker structs with static methods rather than trait objects.
//! The envelope itself lives in [`protocol::Message`](crate::protocol::Message);
//! a codec only converts payload types to and from the envelope's value.

mod json;

pub use json::JsonCodec;
