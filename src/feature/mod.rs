//! Feature module - action registry and handler dispatch.
//!
//! Provides:
//! - [`Feature`] - one RPC operation (action, payload types, optional handler)
//! - [`Profile`] - a named bundle of features
//! - [`FeatureRegistry`] - lookup by action, request type or confirmation type
//! - [`CallContext`] - what a handler knows about the call it serves
//!
//! # Example
//!
//! ```ignore
//! use ocpp_rpc::feature::{FeatureRegistry, Profile};
//!
//! let mut registry = FeatureRegistry::new();
//! registry.install(
//!     Profile::new("core")
//!         .send::<BootNotificationRequest>()
//!         .handle(|req: ResetRequest, ctx| async move {
//!             Ok(ResetConfirmation::accepted())
//!         }),
//! )?;
//! ```

mod context;
mod handler;
mod profile;
mod registry;

pub use context::CallContext;
pub use handler::{AnyConfirmation, BoxFuture, Feature, Handler, HandlerResult, TypedHandler};
pub use profile::Profile;
pub use registry::{FeatureKey, FeatureRegistry};
