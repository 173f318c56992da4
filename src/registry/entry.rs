//! Registered session entry

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::watch;

use crate::session::{SessionId, SessionPhase, SessionRole};

/// Entry for a single session in the registry
#[derive(Debug)]
pub struct SessionEntry<T> {
    /// Session ID
    pub id: SessionId,

    /// Role requested in the offer
    pub role: SessionRole,

    /// The session's transport, shared with its session task
    pub transport: Arc<T>,

    /// Phase published by the session task
    phase: watch::Receiver<SessionPhase>,

    /// When the session was registered
    pub registered_at: Instant,
}

impl<T> SessionEntry<T> {
    pub fn new(
        id: SessionId,
        role: SessionRole,
        transport: Arc<T>,
        phase: watch::Receiver<SessionPhase>,
    ) -> Self {
        Self {
            id,
            role,
            transport,
            phase,
            registered_at: Instant::now(),
        }
    }

    /// Current phase of the session
    pub fn phase(&self) -> SessionPhase {
        *self.phase.borrow()
    }
}
