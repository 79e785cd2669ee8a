//! # ocpp-rpc
//!
//! Bidirectional OCPP-J RPC engine for charge points and central systems.
//!
//! Both ends of an OCPP connection send requests and answer the other
//! side's requests over one WebSocket. This crate owns the envelope, the
//! correlation of replies to calls, dispatch to registered handlers,
//! sub-protocol negotiation and the retry of transaction-related calls
//! while offline. Payload types are supplied by the application through
//! the [`Request`] and [`Confirmation`] traits.
//!
//! ## Architecture
//!
//! - **Protocol** ([`protocol`]): `[2,id,action,payload]` / `[3,id,payload]` /
//!   `[4,id,code,description,details]` frames, error codes per version
//! - **Features** ([`feature`]): profiles bundle actions; one registry per version
//! - **Session** ([`session`]): one connection's calls, replies and handlers
//! - **Transport** ([`transport`]): WebSocket, plus an in-memory pair for tests
//! - **Endpoints**: [`Client`] offers versions, [`Server`] negotiates and
//!   tracks sessions by id
//!
//! ## Example
//!
//! ```ignore
//! use ocpp_rpc::{Client, Profile, ProtocolVersion};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::builder()
//!         .install(
//!             ProtocolVersion::Ocpp16,
//!             Profile::new("core")
//!                 .send::<BootNotificationRequest>()
//!                 .handle(|req: ResetRequest, _ctx| async move {
//!                     Ok(ResetConfirmation::accepted())
//!                 }),
//!         )
//!         .build()?;
//!
//!     client.connect("ws://localhost:8887/ocpp/CP001", ()).await?;
//!     let boot = client
//!         .send(BootNotificationRequest::new("VendorX", "ModelY"))?
//!         .await?;
//!     println!("registered, heartbeat every {}s", boot.interval);
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod communicator;
pub mod error;
pub mod feature;
pub mod model;
pub mod negotiator;
pub mod promise;
pub mod protocol;
pub mod session;
pub mod supervisor;
pub mod transport;

mod client;
mod server;

#[cfg(test)]
mod test_support;

pub use client::{Client, ClientBuilder};
pub use error::{OcppError, Result};
pub use feature::{CallContext, Feature, FeatureKey, FeatureRegistry, Profile};
pub use model::{Confirmation, Request, Validate, ValidationError};
pub use negotiator::ProtocolNegotiator;
pub use protocol::{CallFailure, ErrorCode, ProtocolVersion};
pub use server::{Server, ServerBuilder, ServerEvents};
pub use session::{PendingResponse, Session, SessionConfig, SessionControl, SessionEvents};
pub use supervisor::TimeoutSupervisor;
pub use transport::websocket::ConnectionInfo;
pub use uuid::Uuid;
