//! Context passed to feature handlers.

use uuid::Uuid;

use crate::protocol::ProtocolVersion;

/// Describes the incoming call a handler is serving.
///
/// Cheap to clone; handlers may move it into spawned tasks.
#[derive(Debug, Clone)]
pub struct CallContext {
    session_id: Uuid,
    unique_id: String,
    action: String,
    version: ProtocolVersion,
}

impl CallContext {
    /// Create a context for one incoming call.
    pub fn new(
        session_id: Uuid,
        unique_id: impl Into<String>,
        action: impl Into<String>,
        version: ProtocolVersion,
    ) -> Self {
        Self {
            session_id,
            unique_id: unique_id.into(),
            action: action.into(),
            version,
        }
    }

    /// Session the call arrived on. On a server this is the id returned by
    /// `new_session` and accepted by `Server::send`.
    #[inline]
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Unique id of the incoming call.
    #[inline]
    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }

    /// Action name of the incoming call.
    #[inline]
    pub fn action(&self) -> &str {
        &self.action
    }

    /// Protocol version negotiated for the session.
    #[inline]
    pub fn version(&self) -> ProtocolVersion {
        self.version
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_accessors() {
        let session_id = Uuid::new_v4();
        let ctx = CallContext::new(session_id, "42", "Reset", ProtocolVersion::Ocpp16);

        assert_eq!(ctx.session_id(), session_id);
        assert_eq!(ctx.unique_id(), "42");
        assert_eq!(ctx.action(), "Reset");
        assert_eq!(ctx.version(), ProtocolVersion::Ocpp16);
    }

    #[test]
    fn test_context_is_clone() {
        let ctx = CallContext::new(Uuid::nil(), "1", "Heartbeat", ProtocolVersion::Ocpp201);
        let ctx2 = ctx.clone();
        assert_eq!(ctx.unique_id(), ctx2.unique_id());
        assert_eq!(ctx.action(), ctx2.action());
    }
}
