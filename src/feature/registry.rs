//! Feature registry for resolving calls by action or payload type.
//!
//! One table answers three questions: which feature handles an incoming
//! action, which feature an outgoing request belongs to, and which feature a
//! confirmation type belongs to. Every key is unique within a registry, so a
//! lookup has at most one answer and registration order does not matter.
//!
//! # Example
//!
//! ```ignore
//! use ocpp_rpc::feature::{FeatureKey, FeatureRegistry, Profile};
//!
//! let mut registry = FeatureRegistry::new();
//! registry.install(core_profile())?;
//! registry.install(firmware_profile())?;
//!
//! let feature = registry.find(FeatureKey::Action("BootNotification"));
//! ```

use std::any::TypeId;
use std::collections::HashMap;

use super::{Feature, Profile};
use crate::error::{OcppError, Result};

/// Lookup key for [`FeatureRegistry::find`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureKey<'a> {
    /// Wire action name of an incoming call.
    Action(&'a str),
    /// Type of an outgoing request.
    Request(TypeId),
    /// Type of a confirmation.
    Confirmation(TypeId),
}

impl FeatureKey<'static> {
    /// Key for request type `R`.
    pub fn request<R: 'static>() -> Self {
        FeatureKey::Request(TypeId::of::<R>())
    }

    /// Key for confirmation type `C`.
    pub fn confirmation<C: 'static>() -> Self {
        FeatureKey::Confirmation(TypeId::of::<C>())
    }

    /// Key for the type of a request instance.
    pub fn of_request<R: 'static>(_request: &R) -> Self {
        Self::request::<R>()
    }
}

/// Registry mapping actions and payload types to features.
#[derive(Debug, Default)]
pub struct FeatureRegistry {
    /// Registered features.
    features: Vec<Feature>,
    /// Index by action name.
    by_action: HashMap<&'static str, usize>,
    /// Index by request type.
    by_request: HashMap<TypeId, usize>,
    /// Index by confirmation type.
    by_confirmation: HashMap<TypeId, usize>,
}

impl FeatureRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a single feature.
    ///
    /// Fails with [`OcppError::DuplicateAction`] if its action, request type or
    /// confirmation type is already registered.
    pub fn register(&mut self, feature: Feature) -> Result<()> {
        self.check_conflict(&feature)?;

        let index = self.features.len();
        self.by_action.insert(feature.action(), index);
        self.by_request.insert(feature.request_type(), index);
        self.by_confirmation.insert(feature.confirmation_type(), index);
        self.features.push(feature);
        Ok(())
    }

    /// Register every feature of a profile. Nothing is registered if any of
    /// them conflicts.
    pub fn install(&mut self, profile: Profile) -> Result<()> {
        let mut staged = FeatureRegistry::new();
        for feature in profile.features() {
            self.check_conflict(feature)
                .and_then(|_| staged.check_conflict(feature))
                .map_err(|e| match e {
                    OcppError::DuplicateAction(what) => {
                        OcppError::DuplicateAction(format!("{} (profile {})", what, profile.name()))
                    }
                    other => other,
                })?;
            staged.register(feature.clone())?;
        }

        for feature in staged.features {
            self.register(feature)?;
        }
        Ok(())
    }

    /// Find the feature matching `key`.
    pub fn find(&self, key: FeatureKey<'_>) -> Option<&Feature> {
        let index = match key {
            FeatureKey::Action(action) => self.by_action.get(action),
            FeatureKey::Request(type_id) => self.by_request.get(&type_id),
            FeatureKey::Confirmation(type_id) => self.by_confirmation.get(&type_id),
        }?;
        self.features.get(*index)
    }

    /// Find a feature by action name.
    pub fn find_action(&self, action: &str) -> Option<&Feature> {
        self.find(FeatureKey::Action(action))
    }

    /// Find the feature for request type `R`.
    pub fn find_request<R: 'static>(&self) -> Option<&Feature> {
        self.find(FeatureKey::request::<R>())
    }

    /// Find the feature for confirmation type `C`.
    pub fn find_confirmation<C: 'static>(&self) -> Option<&Feature> {
        self.find(FeatureKey::confirmation::<C>())
    }

    /// All registered action names.
    pub fn actions(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.features.iter().map(Feature::action)
    }

    /// Number of registered features.
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// True when no feature is registered.
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    fn check_conflict(&self, feature: &Feature) -> Result<()> {
        if self.by_action.contains_key(feature.action()) {
            return Err(OcppError::DuplicateAction(format!(
                "action {}",
                feature.action()
            )));
        }
        if self.by_request.contains_key(&feature.request_type()) {
            return Err(OcppError::DuplicateAction(format!(
                "request type {}",
                feature.request_name()
            )));
        }
        if self.by_confirmation.contains_key(&feature.confirmation_type()) {
            return Err(OcppError::DuplicateAction(format!(
                "confirmation type {}",
                feature.confirmation_name()
            )));
        }
        Ok(())
    }
}
