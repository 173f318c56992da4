//! Session state machine
//!
//! Tracks a peer session from its offer to its teardown:
//!
//! ```text
//! Negotiating ──answer──► Active ──failed/closed──► Closed
//!      └──────────negotiation error──────────────────┘
//! ```
//!
//! Nothing is reachable after `Closed`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Unique session ID, never reused within a process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub u64);

impl SessionId {
    /// Allocate the next process-unique ID
    pub fn next() -> Self {
        Self(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What the peer asked to do, derived from its offer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionRole {
    /// Contributes a video track
    Producer,
    /// Receives a copy of the current source
    Observer,
}

impl std::fmt::Display for SessionRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionRole::Producer => write!(f, "producer"),
            SessionRole::Observer => write!(f, "observer"),
        }
    }
}

/// Session lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Offer received, answer not produced yet
    Negotiating,
    /// Answer returned, transport events flowing
    Active,
    /// Torn down
    Closed,
}

/// Lifecycle of one session
#[derive(Debug)]
pub struct SessionState {
    /// Unique session ID
    pub id: SessionId,

    /// Requested role
    pub role: SessionRole,

    /// Current phase
    pub phase: SessionPhase,

    /// When the offer arrived
    pub created_at: Instant,

    /// When negotiation completed
    pub activated_at: Option<Instant>,

    /// When the session closed
    pub closed_at: Option<Instant>,
}

impl SessionState {
    /// Create a session in `Negotiating`
    pub fn new(id: SessionId, role: SessionRole) -> Self {
        Self {
            id,
            role,
            phase: SessionPhase::Negotiating,
            created_at: Instant::now(),
            activated_at: None,
            closed_at: None,
        }
    }

    /// Negotiation completed
    ///
    /// Returns false if the session was not negotiating.
    pub fn activate(&mut self) -> bool {
        if self.phase != SessionPhase::Negotiating {
            return false;
        }
        self.phase = SessionPhase::Active;
        self.activated_at = Some(Instant::now());
        true
    }

    /// Close the session
    ///
    /// Returns false if it was already closed.
    pub fn close(&mut self) -> bool {
        if self.phase == SessionPhase::Closed {
            return false;
        }
        self.phase = SessionPhase::Closed;
        self.closed_at = Some(Instant::now());
        true
    }

    pub fn is_active(&self) -> bool {
        self.phase == SessionPhase::Active
    }

    pub fn is_closed(&self) -> bool {
        self.phase == SessionPhase::Closed
    }

    /// Time since the offer arrived (until close, if closed)
    pub fn duration(&self) -> Duration {
        match self.closed_at {
            Some(closed) => closed.duration_since(self.created_at),
            None => self.created_at.elapsed(),
        }
    }
}
