//! Recording and playback collaborators
//!
//! The orchestrator never encodes or writes media itself. It hands tracks
//! to a [`MediaSink`] (one per session) and, for producers sending audio,
//! attaches whatever a [`PlaybackSource`] offers.

use tokio::task::JoinHandle;

use super::track::{FrameSource, MediaTrack, OutboundTrack};
use crate::session::SessionId;

/// Consumer of a session's media (recorder)
pub trait MediaSink: Send + Sync {
    /// Start consuming tracks added so far and any added later
    fn start(&mut self);

    /// Hand a track to the sink
    fn add_track(&mut self, track: OutboundTrack);

    /// Stop consuming and release all tracks
    ///
    /// Final: tracks added afterwards are released immediately.
    fn stop(&mut self);
}

/// Creates the sink of each new session
pub trait SinkFactory: Send + Sync + 'static {
    fn create(&self, session_id: SessionId) -> Box<dyn MediaSink>;
}

/// Source of locally generated media sent to producers
pub trait PlaybackSource: Send + Sync + 'static {
    /// Audio track to send back to a producer, if any
    fn audio(&self) -> Option<MediaTrack>;
}

/// Sink that pulls every track to completion and discards the frames
///
/// Pulling matters: an undrained track would hold frames in its channel.
#[derive(Debug, Default)]
pub struct MediaBlackhole {
    pending: Vec<OutboundTrack>,
    tasks: Vec<JoinHandle<()>>,
    started: bool,
    stopped: bool,
}

impl MediaBlackhole {
    pub fn new() -> Self {
        Self::default()
    }

    fn drain(mut track: OutboundTrack) -> JoinHandle<()> {
        tokio::spawn(async move {
            let kind = track.kind();
            let mut frames = 0u64;
            while track.recv().await.is_some() {
                frames += 1;
            }
            tracing::trace!(kind = %kind, frames = frames, "Blackhole track drained");
        })
    }

    /// Number of tracks currently being consumed
    pub fn active_tracks(&self) -> usize {
        self.tasks.iter().filter(|t| !t.is_finished()).count()
    }
}

impl MediaSink for MediaBlackhole {
    fn start(&mut self) {
        if self.stopped {
            return;
        }
        self.started = true;
        for track in self.pending.drain(..) {
            self.tasks.push(Self::drain(track));
        }
    }

    fn add_track(&mut self, track: OutboundTrack) {
        if self.stopped {
            tracing::trace!(kind = %track.kind(), "Track added after stop released");
            return;
        }
        if self.started {
            self.tasks.push(Self::drain(track));
        } else {
            self.pending.push(track);
        }
    }

    fn stop(&mut self) {
        self.started = false;
        self.stopped = true;
        self.pending.clear();
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for MediaBlackhole {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Factory producing a [`MediaBlackhole`] per session
#[derive(Debug, Default, Clone, Copy)]
pub struct BlackholeFactory;

impl SinkFactory for BlackholeFactory {
    fn create(&self, _session_id: SessionId) -> Box<dyn MediaSink> {
        Box::new(MediaBlackhole::new())
    }
}

/// Playback source that never offers anything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPlayback;

impl PlaybackSource for NoPlayback {
    fn audio(&self) -> Option<MediaTrack> {
        None
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::media::{Frame, MediaKind};

    #[tokio::test]
    async fn test_blackhole_drains_after_start() {
        let (tx, track) = MediaTrack::channel("mic", MediaKind::Audio, 1);
        let mut sink = MediaBlackhole::new();
        sink.add_track(track.into());
        assert_eq!(sink.active_tracks(), 0);

        sink.start();
        // Capacity is 1, so these only complete if the sink keeps pulling
        for pts in 0..8 {
            tx.send(Frame::audio(pts, Bytes::from_static(&[0; 4])))
                .await
                .unwrap();
        }
        assert_eq!(sink.active_tracks(), 1);

        sink.stop();
        assert_eq!(sink.active_tracks(), 0);
    }

    #[tokio::test]
    async fn test_track_after_stop_is_released() {
        let (tx, track) = MediaTrack::channel("mic", MediaKind::Audio, 1);
        let mut sink = MediaBlackhole::new();
        sink.start();
        sink.stop();

        sink.add_track(track.into());
        sink.start();
        assert_eq!(sink.active_tracks(), 0);

        // The receiver is gone, so the sender fails instead of stalling
        let frame = Frame::audio(0, Bytes::from_static(&[0; 4]));
        assert!(tx.send(frame).await.is_err());
        assert!(tx.is_closed());
    }
}
