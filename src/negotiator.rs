//! Protocol version negotiation.
//!
//! Each supported version gets its own [`FeatureRegistry`], built from the
//! profiles installed for it. The installation order of versions is the
//! priority order: the server picks the first of its versions the client
//! offered, and the client offers its versions in this order.
//!
//! # Example
//!
//! ```ignore
//! let negotiator = ProtocolNegotiator::builder()
//!     .install(ProtocolVersion::Ocpp201, core_v201())
//!     .install(ProtocolVersion::Ocpp16, core_v16())
//!     .build()?;
//!
//! assert_eq!(negotiator.negotiate(&["ocpp1.6", "ocpp2.0.1"])?, ProtocolVersion::Ocpp201);
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{OcppError, Result};
use crate::feature::{FeatureRegistry, Profile};
use crate::protocol::ProtocolVersion;

/// Builder for [`ProtocolNegotiator`].
#[derive(Debug, Default)]
pub struct NegotiatorBuilder {
    priority: Vec<ProtocolVersion>,
    profiles: Vec<(ProtocolVersion, Profile)>,
}

impl NegotiatorBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `profile` for `version`. The first install of a version fixes
    /// its place in the priority order.
    pub fn install(mut self, version: ProtocolVersion, profile: Profile) -> Self {
        if !self.priority.contains(&version) {
            self.priority.push(version);
        }
        self.profiles.push((version, profile));
        self
    }

    /// Build one registry per version.
    ///
    /// Fails with [`OcppError::DuplicateAction`] when two profiles of the
    /// same version claim the same action or payload type, and with
    /// [`OcppError::InvalidState`] when no version was installed.
    pub fn build(self) -> Result<ProtocolNegotiator> {
        if self.priority.is_empty() {
            return Err(OcppError::InvalidState("no protocol version installed"));
        }

        let mut registries: HashMap<ProtocolVersion, FeatureRegistry> = HashMap::new();
        for (version, profile) in self.profiles {
            registries.entry(version).or_default().install(profile)?;
        }

        Ok(ProtocolNegotiator {
            priority: self.priority,
            registries: registries
                .into_iter()
                .map(|(version, registry)| (version, Arc::new(registry)))
                .collect(),
        })
    }
}

/// Supported versions, their priority and their registries.
#[derive(Debug, Clone)]
pub struct ProtocolNegotiator {
    priority: Vec<ProtocolVersion>,
    registries: HashMap<ProtocolVersion, Arc<FeatureRegistry>>,
}

impl ProtocolNegotiator {
    /// Start building a negotiator.
    pub fn builder() -> NegotiatorBuilder {
        NegotiatorBuilder::new()
    }

    /// Supported versions, most preferred first.
    pub fn priority(&self) -> &[ProtocolVersion] {
        &self.priority
    }

    /// Sub-protocol tokens in priority order.
    pub fn offered_subprotocols(&self) -> Vec<&'static str> {
        self.priority.iter().map(|v| v.subprotocol()).collect()
    }

    /// Pick the first supported version the peer offered.
    pub fn negotiate(&self, offered: &[&str]) -> Result<ProtocolVersion> {
        self.priority
            .iter()
            .copied()
            .find(|version| offered.contains(&version.subprotocol()))
            .ok_or_else(|| OcppError::NoCommonProtocol(offered.join(", ")))
    }

    /// Registry for `version`, if supported.
    pub fn registry(&self, version: ProtocolVersion) -> Option<Arc<FeatureRegistry>> {
        self.registries.get(&version).cloned()
    }

    /// Whether `version` is supported.
    pub fn supports(&self, version: ProtocolVersion) -> bool {
        self.registries.contains_key(&version)
    }
}
