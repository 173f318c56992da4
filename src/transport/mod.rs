//! Transport collaborator
//!
//! The orchestrator never speaks SDP, ICE or DTLS itself. A
//! [`TransportFactory`] creates one [`PeerTransport`] per session; the
//! transport applies the remote offer, carries outbound tracks, produces
//! the local answer and reports lifecycle through [`TransportEvent`]s sent
//! to the session's event queue.
//!
//! Dropping the event sender is equivalent to reporting
//! `ConnectionState::Closed`.

pub mod memory;

use std::future::Future;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::{NegotiationError, TransportError};
use crate::media::{MediaTrack, OutboundTrack, TrackId};
use crate::session::SessionId;

pub use memory::{MemoryChannel, MemoryPeer, MemoryTransport, MemoryTransportFactory};

/// A session description (offer or answer)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    pub sdp: String,
    #[serde(rename = "type")]
    pub sdp_type: String,
}

impl SessionDescription {
    pub fn new(sdp: impl Into<String>, sdp_type: impl Into<String>) -> Self {
        Self {
            sdp: sdp.into(),
            sdp_type: sdp_type.into(),
        }
    }

    pub fn offer(sdp: impl Into<String>) -> Self {
        Self::new(sdp, "offer")
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self::new(sdp, "answer")
    }
}

/// Connection state reported by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ConnectionState::New => "new",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Failed => "failed",
            ConnectionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Lifecycle events of one peer session
#[derive(Debug)]
pub enum TransportEvent {
    /// Connection state changed
    ConnectionState(ConnectionState),
    /// The peer started sending a track
    Track(MediaTrack),
    /// The peer opened its control channel; outbound text goes to `outbound`
    ChannelOpened {
        label: String,
        outbound: mpsc::Sender<String>,
    },
    /// Text received on the control channel
    ChannelMessage(String),
    /// An inbound track ended
    TrackEnded(TrackId),
}

/// One peer's transport session
pub trait PeerTransport: Send + Sync + 'static {
    /// Apply the remote offer
    fn apply_offer(
        &self,
        offer: &SessionDescription,
    ) -> impl Future<Output = Result<(), NegotiationError>> + Send;

    /// Send a track to the peer
    fn add_track(&self, track: OutboundTrack) -> Result<(), TransportError>;

    /// Produce the local answer; tracks added before this are part of it
    fn create_answer(&self) -> impl Future<Output = Result<SessionDescription, NegotiationError>> + Send;

    /// Close the transport; closing twice is not an error
    fn close(&self) -> impl Future<Output = Result<(), TransportError>> + Send;
}

/// Creates the transport of each new session
pub trait TransportFactory: Send + Sync + 'static {
    type Transport: PeerTransport;

    /// Create a transport reporting its lifecycle to `events`
    fn create(&self, session_id: SessionId, events: mpsc::Sender<TransportEvent>) -> Self::Transport;
}
