//! Per-peer session state and context

pub mod context;
pub mod state;

pub use context::SessionContext;
pub use state::{SessionId, SessionPhase, SessionRole, SessionState};
