//! Session context
//!
//! Read-only facts about a session, passed explicitly to every event
//! handler instead of being captured in closures.

use super::state::{SessionId, SessionRole};

/// Context of one session
#[derive(Debug, Clone)]
pub struct SessionContext {
    /// Unique session ID
    pub session_id: SessionId,

    /// Requested role
    pub role: SessionRole,

    /// Observer wants the raw feed instead of the transformed one
    pub native: bool,

    /// Transform requested in the offer
    pub requested_transform: Option<String>,
}

impl SessionContext {
    pub fn new(session_id: SessionId, role: SessionRole) -> Self {
        Self {
            session_id,
            role,
            native: false,
            requested_transform: None,
        }
    }

    pub fn is_observer(&self) -> bool {
        self.role == SessionRole::Observer
    }
}
