//! Real-time media session orchestrator
//!
//! Peers open sessions by posting an offer. A peer that sends video becomes
//! a *producer*: its track is fanned out through a relay, run through a
//! selectable frame transform and republished. A peer that asks to observe
//! receives a copy of the current producer's feed, raw or transformed. Any
//! peer's control channel can switch the transform; detection events the
//! transform reports go back out over the bound channel.
//!
//! ```text
//!  producer track ──► TrackRelay (raw) ──► TransformStage ──► TrackRelay (transformed)
//!                          │                     ▲                   │
//!                          ▼                     │ transform:<key>   ▼
//!                  native observers        ControlChannel      observers / preview
//! ```
//!
//! The transport stack (SDP, ICE, DTLS), codecs and the transform
//! algorithms themselves are collaborators behind traits:
//! [`transport::PeerTransport`], [`media::MediaSink`],
//! [`media::PlaybackSource`] and [`transform::FrameTransform`].

pub mod control;
pub mod error;
pub mod media;
pub mod registry;
pub mod relay;
pub mod server;
pub mod session;
pub mod stats;
pub mod transform;
pub mod transport;

pub use error::{Error, Result};
pub use server::{OfferRequest, OrchestratorConfig, SessionOrchestrator};
pub use transform::{TransformCatalog, TransformInfo};
pub use transport::SessionDescription;
