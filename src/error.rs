//! Error types
//!
//! Every fault the orchestrator can report. Only `NegotiationError` and
//! `Error::SessionLimit` ever reach a peer; the rest are recovered or
//! logged where they happen.

use crate::session::SessionId;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type
#[derive(Debug)]
pub enum Error {
    /// The transport could not produce an answer for an offer
    Negotiation(NegotiationError),
    /// Refused a new session because the configured limit is reached
    SessionLimit(usize),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Negotiation(e) => write!(f, "Negotiation failed: {}", e),
            Error::SessionLimit(max) => write!(f, "Session limit reached ({})", max),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Negotiation(e) => Some(e),
            Error::SessionLimit(_) => None,
        }
    }
}

impl From<NegotiationError> for Error {
    fn from(e: NegotiationError) -> Self {
        Error::Negotiation(e)
    }
}

/// Offer/answer exchange failure reported by the transport collaborator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NegotiationError {
    /// The remote description could not be applied
    InvalidOffer(String),
    /// The transport failed to build a local answer
    AnswerFailed(String),
    /// The transport was closed while negotiating
    Closed,
}

impl std::fmt::Display for NegotiationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NegotiationError::InvalidOffer(reason) => write!(f, "invalid offer: {}", reason),
            NegotiationError::AnswerFailed(reason) => {
                write!(f, "could not create answer: {}", reason)
            }
            NegotiationError::Closed => write!(f, "transport closed during negotiation"),
        }
    }
}

impl std::error::Error for NegotiationError {}

/// Transport failure outside of negotiation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// No transceiver can carry a track of this kind
    NoTransceiver(crate::media::MediaKind),
    /// The transport is already closed
    Closed,
    /// Any other collaborator failure
    Other(String),
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::NoTransceiver(kind) => {
                write!(f, "no transceiver available for {} track", kind)
            }
            TransportError::Closed => write!(f, "transport closed"),
            TransportError::Other(reason) => write!(f, "{}", reason),
        }
    }
}

impl std::error::Error for TransportError {}

/// A transform could not process a frame
///
/// Never surfaced to peers; the stage substitutes the original frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformFault {
    /// Key of the transform that failed
    pub transform: String,
    /// What went wrong
    pub reason: String,
}

impl TransformFault {
    /// Create a new fault
    pub fn new(transform: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            transform: transform.into(),
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for TransformFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "transform '{}' failed: {}", self.transform, self.reason)
    }
}

impl std::error::Error for TransformFault {}

/// Closing one session failed during a drain
#[derive(Debug, Clone)]
pub struct SessionTeardownError {
    /// Session that failed to close cleanly
    pub session_id: SessionId,
    /// Underlying failure
    pub reason: String,
}

impl std::fmt::Display for SessionTeardownError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "session {} teardown failed: {}", self.session_id, self.reason)
    }
}

impl std::error::Error for SessionTeardownError {}

/// The peer side of a control channel is gone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelClosed;

impl std::fmt::Display for ChannelClosed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "control channel closed")
    }
}

impl std::error::Error for ChannelClosed {}
