//! Fan-out of producer tracks
//!
//! - [`TrackRelay`]: one upstream read loop, any number of independent
//!   subscribers
//! - [`SourceDirectory`]: published producer sources and which one is
//!   current

pub mod directory;
pub mod track;

pub use directory::{PublishedSource, SourceDirectory};
pub use track::{RelaySubscriber, SubscriberHandle, TrackRelay};
