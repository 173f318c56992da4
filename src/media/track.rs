//! Frame sources
//!
//! Everything that yields frames one at a time implements [`FrameSource`]:
//! tracks handed over by the transport, relay subscribers and transform
//! stages. `None` from `recv` is end-of-stream and is final.

use std::future::Future;

use tokio::sync::mpsc;

use super::frame::{Frame, MediaKind};
use crate::relay::RelaySubscriber;

/// A pull-based source of frames
pub trait FrameSource: Send + 'static {
    /// Kind of media this source yields
    fn kind(&self) -> MediaKind;

    /// Wait for the next frame, or `None` once the source has ended
    fn recv(&mut self) -> impl Future<Output = Option<Frame>> + Send;
}

/// Identifier of a track, as announced by the transport
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TrackId(pub String);

impl TrackId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for TrackId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Channel-backed track
///
/// The transport (or a playback collaborator) keeps the sender half and
/// pushes decoded frames into it. Dropping the sender ends the track.
#[derive(Debug)]
pub struct MediaTrack {
    id: TrackId,
    kind: MediaKind,
    frames: mpsc::Receiver<Frame>,
}

impl MediaTrack {
    /// Create a track and the sender that feeds it
    pub fn channel(
        id: impl Into<String>,
        kind: MediaKind,
        capacity: usize,
    ) -> (mpsc::Sender<Frame>, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let track = Self {
            id: TrackId::new(id),
            kind,
            frames: rx,
        };
        (tx, track)
    }

    pub fn id(&self) -> &TrackId {
        &self.id
    }
}

impl FrameSource for MediaTrack {
    fn kind(&self) -> MediaKind {
        self.kind
    }

    async fn recv(&mut self) -> Option<Frame> {
        self.frames.recv().await
    }
}

/// A track handed to a transport or a recording sink
#[derive(Debug)]
pub enum OutboundTrack {
    /// A cursor on a relay (raw or transformed feed)
    Relay(RelaySubscriber),
    /// A standalone track (inbound audio, playback audio)
    Media(MediaTrack),
}

impl FrameSource for OutboundTrack {
    fn kind(&self) -> MediaKind {
        match self {
            OutboundTrack::Relay(sub) => sub.kind(),
            OutboundTrack::Media(track) => track.kind(),
        }
    }

    async fn recv(&mut self) -> Option<Frame> {
        match self {
            OutboundTrack::Relay(sub) => sub.next().await,
            OutboundTrack::Media(track) => track.recv().await,
        }
    }
}

impl From<RelaySubscriber> for OutboundTrack {
    fn from(sub: RelaySubscriber) -> Self {
        OutboundTrack::Relay(sub)
    }
}

impl From<MediaTrack> for OutboundTrack {
    fn from(track: MediaTrack) -> Self {
        OutboundTrack::Media(track)
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    #[tokio::test]
    async fn test_media_track_ends_when_sender_dropped() {
        let (tx, mut track) = MediaTrack::channel("cam0", MediaKind::Video, 4);
        assert_eq!(track.id().to_string(), "cam0");
        assert_eq!(track.kind(), MediaKind::Video);

        tx.send(Frame::video(1, 1, 1, Bytes::from_static(&[0, 0, 0])))
            .await
            .unwrap();
        drop(tx);

        assert_eq!(track.recv().await.map(|f| f.pts), Some(1));
        assert!(track.recv().await.is_none());
    }
}
