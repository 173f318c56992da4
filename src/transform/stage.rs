//! Transform stage
//!
//! Pulls frames from one upstream source, applies the currently selected
//! transform and yields the result, so a [`TrackRelay`](crate::relay::TrackRelay)
//! can republish it. Detection events go to the bound control channel.
//!
//! The stage itself is the pull loop: it is a [`FrameSource`], and the relay
//! spawned over it drives it one frame at a time. The selection and the
//! channel binding live in [`StageControl`], which sessions clone freely.

use std::sync::Arc;

use tokio::sync::watch;

use super::catalog::{TransformCatalog, PASSTHROUGH};
use crate::control::{ControlChannel, ControlMessage};
use crate::media::{Frame, FrameSource, MediaKind};
use crate::stats::{StageCounters, StageStats};

/// Shared handle on a running stage
///
/// Selection and channel binding are last-writer-wins cells; the stage
/// reads both fresh for every frame.
#[derive(Clone)]
pub struct StageControl {
    selection: Arc<watch::Sender<String>>,
    channel: Arc<watch::Sender<Option<ControlChannel>>>,
    catalog: Arc<TransformCatalog>,
    counters: Arc<StageCounters>,
}

impl StageControl {
    /// Select a transform, effective from the next frame pulled
    ///
    /// Unknown keys leave the current selection unchanged and return false.
    pub fn set_transform(&self, key: &str) -> bool {
        if !self.catalog.contains(key) {
            tracing::debug!(transform = %key, "Unknown transform selection ignored");
            return false;
        }

        let changed = self.selection.send_if_modified(|current| {
            if current.as_str() == key {
                false
            } else {
                *current = key.to_string();
                true
            }
        });
        if changed {
            tracing::info!(transform = %key, "Transform selected");
        }
        true
    }

    /// Key of the currently selected transform
    pub fn current_transform(&self) -> String {
        self.selection.borrow().clone()
    }

    /// Route detection events to `channel`, replacing any previous binding
    pub fn bind_channel(&self, channel: ControlChannel) {
        tracing::info!(
            session_id = %channel.session_id(),
            channel = %channel.label(),
            "Control channel bound to stage"
        );
        self.channel.send_replace(Some(channel));
    }

    /// Remove the binding if it is still `channel_id`
    pub fn unbind_channel(&self, channel_id: u64) -> bool {
        self.channel.send_if_modified(|bound| {
            if bound.as_ref().map(ControlChannel::id) == Some(channel_id) {
                *bound = None;
                true
            } else {
                false
            }
        })
    }

    pub fn bound_channel(&self) -> Option<ControlChannel> {
        self.channel.borrow().clone()
    }

    pub fn stats(&self) -> StageStats {
        self.counters.snapshot(self.current_transform())
    }
}

impl std::fmt::Debug for StageControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageControl")
            .field("transform", &self.current_transform())
            .field("bound", &self.bound_channel().map(|c| c.id()))
            .finish()
    }
}

/// Per-track transform pull loop
pub struct TransformStage<S> {
    upstream: S,
    control: StageControl,
}

impl<S: FrameSource> TransformStage<S> {
    /// Create a stage over `upstream`
    ///
    /// An unknown `initial` key falls back to pass-through.
    pub fn new(upstream: S, catalog: Arc<TransformCatalog>, initial: &str) -> (Self, StageControl) {
        let initial = if catalog.contains(initial) {
            initial
        } else {
            if !initial.is_empty() {
                tracing::debug!(transform = %initial, "Unknown initial transform, using pass-through");
            }
            PASSTHROUGH
        };

        let (selection, _) = watch::channel(initial.to_string());
        let (channel, _) = watch::channel(None);
        let control = StageControl {
            selection: Arc::new(selection),
            channel: Arc::new(channel),
            catalog,
            counters: Arc::new(StageCounters::new()),
        };

        let stage = Self {
            upstream,
            control: control.clone(),
        };
        (stage, control)
    }

    fn process(&self, frame: Frame) -> (Frame, Vec<String>) {
        let key = self.control.current_transform();
        let Some(transform) = self.control.catalog.lookup(&key) else {
            return (frame, Vec::new());
        };

        match transform.apply(&frame) {
            Ok(output) => (output.frame.with_timing_of(&frame), output.events),
            Err(fault) => {
                self.control.counters.on_fault();
                tracing::warn!(
                    error = %fault,
                    pts = frame.pts,
                    "Transform failed, forwarding original frame"
                );
                (frame, Vec::new())
            }
        }
    }
}

/// Deliver one frame's events, in order, to the bound channel
async fn emit(control: &StageControl, events: Vec<String>) {
    if events.is_empty() {
        return;
    }

    let Some(channel) = control.bound_channel() else {
        tracing::trace!(events = events.len(), "No control channel bound, events dropped");
        control.counters.on_events_dropped(events.len());
        return;
    };

    let total = events.len();
    for (sent, event) in events.into_iter().enumerate() {
        tracing::debug!(detected = %event, "Detection event");
        if channel.send(&ControlMessage::DetectionEvent(event)).await.is_err() {
            tracing::debug!(
                session_id = %channel.session_id(),
                "Control channel closed, remaining events dropped"
            );
            control.counters.on_events_dropped(total - sent);
            return;
        }
        control.counters.on_event_sent();
    }
}

impl<S: FrameSource> FrameSource for TransformStage<S> {
    fn kind(&self) -> MediaKind {
        self.upstream.kind()
    }

    async fn recv(&mut self) -> Option<Frame> {
        let frame = self.upstream.recv().await?;
        let (frame, events) = self.process(frame);
        self.control.counters.on_frame();
        emit(&self.control, events).await;
        Some(frame)
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use tokio::sync::mpsc;

    use super::*;
    use crate::error::TransformFault;
    use crate::media::MediaTrack;
    use crate::relay::TrackRelay;
    use crate::session::SessionId;
    use crate::transform::TransformOutput;

    fn frame(pts: i64) -> Frame {
        Frame::video(pts, 1, 1, Bytes::from_static(&[1, 2, 3]))
    }

    /// Replaces the payload with the transform name and reports `name:pts`
    fn tagging(name: &'static str) -> impl Fn(&Frame) -> Result<TransformOutput, TransformFault> {
        move |f: &Frame| -> Result<TransformOutput, TransformFault> {
            let mut out = Frame::video(0, f.width, f.height, Bytes::from_static(name.as_bytes()));
            out.time_base = crate::media::TimeBase::new(1, 1);
            Ok(TransformOutput::with_events(out, vec![format!("{}:{}", name, f.pts)]))
        }
    }

    fn catalog() -> Arc<TransformCatalog> {
        Arc::new(
            TransformCatalog::new()
                .with("edges", "edges", tagging("edges"))
                .with("red", "red", tagging("red"))
                .with("abc", "abc", |f: &Frame| -> Result<TransformOutput, TransformFault> {
                    let events = ["a", "b", "c"].iter().map(|e| format!("{}{}", e, f.pts)).collect();
                    Ok(TransformOutput::with_events(f.clone(), events))
                })
                .with("flaky", "flaky", |f: &Frame| -> Result<TransformOutput, TransformFault> {
                    if f.pts == 3 {
                        Err(TransformFault::new("flaky", "cannot decode"))
                    } else {
                        Ok(TransformOutput::with_events(f.clone(), vec![format!("ok-{}", f.pts)]))
                    }
                }),
        )
    }

    fn stage(initial: &str) -> (mpsc::Sender<Frame>, TransformStage<MediaTrack>, StageControl) {
        let (tx, track) = MediaTrack::channel("cam", MediaKind::Video, 8);
        let (stage, control) = TransformStage::new(track, catalog(), initial);
        (tx, stage, control)
    }

    fn bound(control: &StageControl) -> mpsc::Receiver<String> {
        let (tx, rx) = mpsc::channel(32);
        control.bind_channel(ControlChannel::new(SessionId(1), "chat", tx));
        rx
    }

    #[tokio::test]
    async fn test_timing_preserved_and_events_sent() {
        let (tx, mut stage, control) = stage("edges");
        let mut events = bound(&control);

        tx.send(frame(3000)).await.unwrap();
        let out = stage.recv().await.unwrap();

        assert_eq!(&out.data[..], b"edges");
        assert_eq!(out.pts, 3000);
        assert_eq!(out.time_base, crate::media::TimeBase::VIDEO_90K);
        assert_eq!(events.recv().await.as_deref(), Some("edges:3000"));
    }

    #[tokio::test]
    async fn test_unknown_initial_falls_back() {
        let (_tx, _stage, control) = stage("none");
        assert_eq!(control.current_transform(), PASSTHROUGH);
    }

    #[tokio::test]
    async fn test_selection_applies_from_next_frame() {
        let (tx, mut stage, control) = stage("edges");

        tx.send(frame(1)).await.unwrap();
        tx.send(frame(2)).await.unwrap();
        assert_eq!(&stage.recv().await.unwrap().data[..], b"edges");

        // Frame 2 is already queued upstream; it is processed after the call
        assert!(control.set_transform("red"));
        assert_eq!(&stage.recv().await.unwrap().data[..], b"red");
    }

    #[tokio::test]
    async fn test_unknown_selection_is_noop() {
        let (tx, mut stage, control) = stage(PASSTHROUGH);
        let channel = bound(&control);
        let selector = control.bound_channel().unwrap();

        selector.on_message("transform:edges", Some(&control));
        selector.on_message("transform:doesnotexist", Some(&control));
        assert!(!control.set_transform("doesnotexist"));
        assert_eq!(control.current_transform(), "edges");

        tx.send(frame(5)).await.unwrap();
        assert_eq!(&stage.recv().await.unwrap().data[..], b"edges");
        drop(channel);
    }

    #[tokio::test]
    async fn test_fault_forwards_original_frame() {
        let (tx, stage, control) = stage("flaky");
        let mut events = bound(&control);
        let relay = TrackRelay::spawn("flaky", stage);

        for pts in 1..=5 {
            tx.send(frame(pts)).await.unwrap();
        }
        drop(tx);
        while !relay.is_ended() {
            tokio::task::yield_now().await;
        }

        assert_eq!(relay.stats().frames_published, 5);
        let stats = control.stats();
        assert_eq!(stats.frames_processed, 5);
        assert_eq!(stats.faults, 1);

        let mut received = Vec::new();
        while let Ok(event) = events.try_recv() {
            received.push(event);
        }
        assert_eq!(received, vec!["ok-1", "ok-2", "ok-4", "ok-5"]);
    }

    #[tokio::test]
    async fn test_events_in_order_without_interleaving() {
        let (tx, mut stage, control) = stage("abc");
        let mut events = bound(&control);

        tx.send(frame(1)).await.unwrap();
        tx.send(frame(2)).await.unwrap();
        stage.recv().await.unwrap();
        stage.recv().await.unwrap();

        let mut received = Vec::new();
        while let Ok(event) = events.try_recv() {
            received.push(event);
        }
        assert_eq!(received, vec!["a1", "b1", "c1", "a2", "b2", "c2"]);
    }

    #[tokio::test]
    async fn test_events_dropped_without_channel() {
        let (tx, mut stage, control) = stage("abc");

        tx.send(frame(1)).await.unwrap();
        stage.recv().await.unwrap();
        assert_eq!(control.stats().events_dropped, 3);

        // Binding later does not replay
        let mut events = bound(&control);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unbind_only_matching_channel() {
        let (_tx, _stage, control) = stage(PASSTHROUGH);
        let _first = bound(&control);
        let first_id = control.bound_channel().unwrap().id();
        let _second = bound(&control);
        let second_id = control.bound_channel().unwrap().id();

        assert!(!control.unbind_channel(first_id));
        assert!(control.unbind_channel(second_id));
        assert!(control.bound_channel().is_none());
    }
}
