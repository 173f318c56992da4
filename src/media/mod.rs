//! Media handling
//!
//! This module provides:
//! - Frame and time base types
//! - The `FrameSource` pull abstraction and channel-backed tracks
//! - Recording sink and playback source collaborators

pub mod frame;
pub mod sink;
pub mod track;

pub use frame::{Frame, MediaKind, TimeBase};
pub use sink::{BlackholeFactory, MediaBlackhole, MediaSink, NoPlayback, PlaybackSource, SinkFactory};
pub use track::{FrameSource, MediaTrack, OutboundTrack, TrackId};
