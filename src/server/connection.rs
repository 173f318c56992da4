//! Per-session event loop
//!
//! Each active session runs one task that consumes its transport's events
//! in order. Handlers receive the session's state explicitly through
//! `PeerSession`; nothing is captured in callbacks.

use std::sync::Arc;

use tokio::sync::{mpsc, watch, OwnedSemaphorePermit};

use super::orchestrator::Shared;
use crate::control::{ControlChannel, ControlMessage};
use crate::media::{FrameSource, MediaKind, MediaSink, MediaTrack, OutboundTrack, PlaybackSource, TrackId};
use crate::relay::{PublishedSource, SubscriberHandle};
use crate::session::{SessionContext, SessionPhase, SessionState};
use crate::transform::StageControl;
use crate::transport::{ConnectionState, PeerTransport, TransportEvent};

/// Why a session loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CloseReason {
    /// The transport reported failure
    Failed,
    /// The transport reported it closed
    Closed,
    /// The transport dropped its event sender
    EventsEnded,
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CloseReason::Failed => write!(f, "failed"),
            CloseReason::Closed => write!(f, "closed"),
            CloseReason::EventsEnded => write!(f, "events ended"),
        }
    }
}

/// One active session
pub(crate) struct PeerSession<T: PeerTransport> {
    ctx: SessionContext,
    state: SessionState,
    phase: watch::Sender<SessionPhase>,
    transport: Arc<T>,
    sink: Box<dyn MediaSink>,
    shared: Arc<Shared<T>>,
    playback: Arc<dyn PlaybackSource>,

    /// Control channel opened by the peer
    channel: Option<ControlChannel>,

    /// Source this session publishes
    produced: Option<Arc<PublishedSource>>,

    /// Source this session was bound to at offer time
    observed: Option<Arc<PublishedSource>>,

    /// Relay cursors handed to the transport or the sink
    subscriptions: Vec<SubscriberHandle>,

    /// Slot under the session limit
    permit: Option<OwnedSemaphorePermit>,
}

impl<T: PeerTransport> PeerSession<T> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        ctx: SessionContext,
        state: SessionState,
        phase: watch::Sender<SessionPhase>,
        transport: Arc<T>,
        sink: Box<dyn MediaSink>,
        shared: Arc<Shared<T>>,
        playback: Arc<dyn PlaybackSource>,
        observed: Option<Arc<PublishedSource>>,
        subscriptions: Vec<SubscriberHandle>,
        permit: Option<OwnedSemaphorePermit>,
    ) -> Self {
        Self {
            ctx,
            state,
            phase,
            transport,
            sink,
            shared,
            playback,
            channel: None,
            produced: None,
            observed,
            subscriptions,
            permit,
        }
    }

    /// Consume transport events until the session closes
    pub(crate) async fn run(mut self, mut events: mpsc::Receiver<TransportEvent>) {
        let mut reason = CloseReason::EventsEnded;

        while let Some(event) = events.recv().await {
            match event {
                TransportEvent::ConnectionState(state) => {
                    if let Some(close) = self.on_connection_state(state) {
                        reason = close;
                        break;
                    }
                }
                TransportEvent::Track(track) => self.on_track(track).await,
                TransportEvent::ChannelOpened { label, outbound } => {
                    self.on_channel_opened(label, outbound)
                }
                TransportEvent::ChannelMessage(text) => self.on_channel_message(&text).await,
                TransportEvent::TrackEnded(id) => self.on_track_ended(&id).await,
            }
        }

        self.close(reason).await;
    }

    fn on_connection_state(&self, state: ConnectionState) -> Option<CloseReason> {
        let session_id = self.ctx.session_id;
        match state {
            ConnectionState::Connected => {
                tracing::info!(session_id = %session_id, "Peer connected");
                None
            }
            ConnectionState::Failed => {
                tracing::info!(session_id = %session_id, "Peer connection failed");
                Some(CloseReason::Failed)
            }
            ConnectionState::Closed => Some(CloseReason::Closed),
            other => {
                tracing::debug!(session_id = %session_id, state = %other, "Connection state changed");
                None
            }
        }
    }

    async fn on_track(&mut self, track: MediaTrack) {
        match track.kind() {
            MediaKind::Audio => {
                tracing::info!(
                    session_id = %self.ctx.session_id,
                    track = %track.id(),
                    "Audio track received"
                );
                if let Some(playback) = self.playback.audio() {
                    self.send_outbound(playback.into(), "playback audio");
                }
                self.sink.add_track(track.into());
            }
            MediaKind::Video => self.publish_video(track).await,
        }
    }

    async fn publish_video(&mut self, track: MediaTrack) {
        let session_id = self.ctx.session_id;

        if let Some(previous) = self.produced.take() {
            self.release_source(previous).await;
        }

        let initial = self
            .ctx
            .requested_transform
            .as_deref()
            .filter(|key| self.shared.catalog.contains(key))
            .unwrap_or(&self.shared.config.default_transform)
            .to_string();

        let source = Arc::new(PublishedSource::build(
            session_id,
            track,
            Arc::clone(&self.shared.catalog),
            &initial,
        ));

        if let Some(channel) = &self.channel {
            if let Some(observed) = &self.observed {
                observed.control.unbind_channel(channel.id());
            }
            source.control.bind_channel(channel.clone());
        }
        self.subscriptions.retain(|cursor| !cursor.is_released());
        if self.shared.config.loopback_transformed {
            let preview = source.transformed.subscribe();
            self.subscriptions.push(preview.handle());
            self.send_outbound(preview.into(), "transformed preview");
        }
        if self.shared.config.record_video {
            let raw = source.raw.subscribe();
            self.subscriptions.push(raw.handle());
            self.sink.add_track(raw.into());
        }

        tracing::info!(
            session_id = %session_id,
            track = %source.track_id,
            transform = %source.control.current_transform(),
            "Session is producing video"
        );

        self.shared.sources.publish(Arc::clone(&source)).await;
        self.produced = Some(source);
    }

    fn on_channel_opened(&mut self, label: String, outbound: mpsc::Sender<String>) {
        let channel = ControlChannel::new(self.ctx.session_id, label, outbound);
        let stage = self.stage_control();

        if let (Some(previous), Some(stage)) = (self.channel.take(), stage.as_ref()) {
            stage.unbind_channel(previous.id());
        }

        match stage {
            Some(stage) => stage.bind_channel(channel.clone()),
            None => tracing::debug!(
                session_id = %self.ctx.session_id,
                channel = %channel.label(),
                "Control channel opened before any stage"
            ),
        }

        self.channel = Some(channel);
    }

    async fn on_channel_message(&mut self, text: &str) {
        let Some(channel) = self.channel.clone() else {
            tracing::debug!(session_id = %self.ctx.session_id, "Message without an open control channel");
            return;
        };

        let stage = self.stage_control();
        if let ControlMessage::ChatText(body) = channel.on_message(text, stage.as_ref()) {
            tracing::info!(session_id = %self.ctx.session_id, text = %body, "Chat message");

            if self.shared.config.echo_chat
                && channel.send(&ControlMessage::ChatEcho(body)).await.is_err()
            {
                tracing::debug!(session_id = %self.ctx.session_id, "Control channel closed, echo dropped");
            }
        }
    }

    async fn on_track_ended(&mut self, id: &TrackId) {
        tracing::info!(session_id = %self.ctx.session_id, track = %id, "Track ended");

        let produced_here = self
            .produced
            .as_ref()
            .is_some_and(|source| &source.track_id == id);
        if produced_here {
            if let Some(source) = self.produced.take() {
                self.release_source(source).await;
            }
        }

        self.sink.stop();
    }

    /// Stage the session's channel binds to: its own, else the observed one
    fn stage_control(&self) -> Option<StageControl> {
        self.produced
            .as_ref()
            .or(self.observed.as_ref())
            .map(|source| source.control.clone())
    }

    fn send_outbound(&self, track: OutboundTrack, what: &'static str) {
        if let Err(e) = self.transport.add_track(track) {
            tracing::warn!(
                session_id = %self.ctx.session_id,
                track = what,
                error = %e,
                "Could not send track to peer"
            );
        }
    }

    async fn release_source(&mut self, source: Arc<PublishedSource>) {
        self.shared.sources.withdraw(&source).await;
        source.release();

        let stats = source.control.stats();
        tracing::info!(
            session_id = %self.ctx.session_id,
            track = %source.track_id,
            frames = stats.frames_processed,
            faults = stats.faults,
            "Source released"
        );
    }

    async fn close(&mut self, reason: CloseReason) {
        if !self.state.close() {
            return;
        }
        self.permit.take();
        self.phase.send_replace(SessionPhase::Closed);

        let session_id = self.ctx.session_id;
        self.shared.registry.remove(session_id).await;

        if let Some(source) = self.produced.take() {
            self.release_source(source).await;
        }
        if let (Some(observed), Some(channel)) = (self.observed.take(), self.channel.as_ref()) {
            observed.control.unbind_channel(channel.id());
        }
        self.channel = None;

        let released = self
            .subscriptions
            .drain(..)
            .filter(|cursor| cursor.release())
            .count();
        if released > 0 {
            tracing::debug!(session_id = %session_id, cursors = released, "Relay cursors released");
        }
        self.sink.stop();

        if reason != CloseReason::Closed {
            if let Err(e) = self.transport.close().await {
                tracing::warn!(session_id = %session_id, error = %e, "Transport did not close cleanly");
            }
        }

        tracing::info!(
            session_id = %session_id,
            role = %self.ctx.role,
            reason = %reason,
            duration_ms = self.state.duration().as_millis() as u64,
            "Session closed"
        );
    }
}
