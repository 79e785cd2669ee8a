//! Profiles: named bundles of features.
//!
//! A profile groups the features of one capability area (core charging,
//! firmware management, security, ...). Profiles are built independently and
//! installed into a [`FeatureRegistry`](super::FeatureRegistry).
//!
//! # Example
//!
//! ```ignore
//! let core = Profile::new("core")
//!     .send::<BootNotificationRequest>()
//!     .send::<StartTransactionRequest>()
//!     .handle(|req: ResetRequest, ctx| async move {
//!         Ok(ResetConfirmation { status: ResetStatus::Accepted })
//!     });
//! ```

use std::future::Future;

use super::{CallContext, Feature};
use crate::model::Request;
use crate::protocol::CallFailure;

/// A named bundle of features.
#[derive(Debug, Clone)]
pub struct Profile {
    name: String,
    features: Vec<Feature>,
}

impl Profile {
    /// Create an empty profile.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            features: Vec::new(),
        }
    }

    /// Add a feature this side answers.
    pub fn handle<R, F, Fut>(mut self, handler: F) -> Self
    where
        R: Request,
        F: Fn(R, CallContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R::Confirmation, CallFailure>> + Send + 'static,
    {
        self.features.push(Feature::handled(handler));
        self
    }

    /// Add a feature this side only sends.
    pub fn send<R: Request>(mut self) -> Self {
        self.features.push(Feature::outgoing::<R>());
        self
    }

    /// Add a prebuilt feature.
    pub fn feature(mut self, feature: Feature) -> Self {
        self.features.push(feature);
        self
    }

    /// Profile name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Features of this profile.
    pub fn features(&self) -> &[Feature] {
        &self.features
    }
}
