//! Protocol versions and their WebSocket sub-protocol tokens.
//!
//! The token table is a constant; nothing mutates it at runtime.

use std::fmt;

/// OCPP-J protocol versions this engine can speak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProtocolVersion {
    /// OCPP 1.6 (JSON).
    Ocpp16,
    /// OCPP 2.0.
    Ocpp20,
    /// OCPP 2.0.1.
    Ocpp201,
    /// OCPP 2.1.
    Ocpp21,
}

/// Sub-protocol token for every supported version.
const SUBPROTOCOLS: &[(ProtocolVersion, &str)] = &[
    (ProtocolVersion::Ocpp16, "ocpp1.6"),
    (ProtocolVersion::Ocpp20, "ocpp2.0"),
    (ProtocolVersion::Ocpp201, "ocpp2.0.1"),
    (ProtocolVersion::Ocpp21, "ocpp2.1"),
];

impl ProtocolVersion {
    /// All versions, oldest first.
    pub const ALL: [ProtocolVersion; 4] = [
        ProtocolVersion::Ocpp16,
        ProtocolVersion::Ocpp20,
        ProtocolVersion::Ocpp201,
        ProtocolVersion::Ocpp21,
    ];

    /// WebSocket sub-protocol token, e.g. `"ocpp1.6"`.
    pub fn subprotocol(self) -> &'static str {
        SUBPROTOCOLS
            .iter()
            .find(|(v, _)| *v == self)
            .map(|(_, token)| *token)
            .unwrap_or("ocpp1.6")
    }

    /// Look up a version by its sub-protocol token.
    pub fn from_subprotocol(token: &str) -> Option<Self> {
        let token = token.trim();
        SUBPROTOCOLS
            .iter()
            .find(|(_, t)| t.eq_ignore_ascii_case(token))
            .map(|(v, _)| *v)
    }

    /// True for the 2.x family.
    #[inline]
    pub fn is_v2(self) -> bool {
        !matches!(self, ProtocolVersion::Ocpp16)
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.subprotocol())
    }
}

/// Split a `Sec-WebSocket-Protocol` header value into tokens.
pub fn parse_subprotocol_header(value: &str) -> Vec<&str> {
    value
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect()
}
