//! In-process loopback transport
//!
//! [`MemoryTransport`] is the server half handed to the orchestrator;
//! [`MemoryPeer`] plays the remote browser. Every transport created by a
//! [`MemoryTransportFactory`] yields its peer on the factory's receiver, so
//! a test or demo can push tracks, open the control channel and read back
//! whatever the orchestrator sends.
//!
//! SDP handling is deliberately shallow: an offer must have type `offer`
//! and a non-empty body, the answer mirrors the offer's `m=` lines, and a
//! track can only be added if the offer carried a media section of its
//! kind.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use super::{ConnectionState, PeerTransport, SessionDescription, TransportEvent, TransportFactory};
use crate::error::{NegotiationError, TransportError};
use crate::media::{Frame, FrameSource, MediaKind, MediaTrack, OutboundTrack, TrackId};
use crate::session::SessionId;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn offers_media(sdp: &str, kind: MediaKind) -> bool {
    let prefix = format!("m={} ", kind);
    sdp.lines().any(|line| line.starts_with(&prefix))
}

/// State shared by both halves of one loopback session
struct Link {
    session_id: SessionId,
    events: Mutex<Option<mpsc::Sender<TransportEvent>>>,
    outbound: mpsc::UnboundedSender<OutboundTrack>,
    remote: Mutex<Option<SessionDescription>>,
    closed: AtomicBool,
    fail_close: AtomicBool,
}

/// Factory of loopback transports
#[derive(Debug)]
pub struct MemoryTransportFactory {
    peers: mpsc::UnboundedSender<MemoryPeer>,
}

impl MemoryTransportFactory {
    /// Create a factory and the receiver of the remote halves it creates
    pub fn new() -> (Self, mpsc::UnboundedReceiver<MemoryPeer>) {
        let (peers, rx) = mpsc::unbounded_channel();
        (Self { peers }, rx)
    }
}

impl TransportFactory for MemoryTransportFactory {
    type Transport = MemoryTransport;

    fn create(&self, session_id: SessionId, events: mpsc::Sender<TransportEvent>) -> MemoryTransport {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let link = Arc::new(Link {
            session_id,
            events: Mutex::new(Some(events.clone())),
            outbound: outbound_tx,
            remote: Mutex::new(None),
            closed: AtomicBool::new(false),
            fail_close: AtomicBool::new(false),
        });

        let peer = MemoryPeer {
            link: Arc::clone(&link),
            events,
            outbound: outbound_rx,
        };
        if self.peers.send(peer).is_err() {
            tracing::debug!(session_id = %session_id, "Memory peer receiver gone");
        }

        MemoryTransport { link }
    }
}

/// Server half of a loopback session
pub struct MemoryTransport {
    link: Arc<Link>,
}

impl MemoryTransport {
    pub fn is_closed(&self) -> bool {
        self.link.closed.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for MemoryTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryTransport")
            .field("session_id", &self.link.session_id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl PeerTransport for MemoryTransport {
    async fn apply_offer(&self, offer: &SessionDescription) -> Result<(), NegotiationError> {
        if self.is_closed() {
            return Err(NegotiationError::Closed);
        }
        if offer.sdp_type != "offer" {
            return Err(NegotiationError::InvalidOffer(format!(
                "expected an offer, got {:?}",
                offer.sdp_type
            )));
        }
        if offer.sdp.trim().is_empty() {
            return Err(NegotiationError::InvalidOffer("empty SDP".into()));
        }

        *lock(&self.link.remote) = Some(offer.clone());
        Ok(())
    }

    fn add_track(&self, track: OutboundTrack) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }

        let kind = track.kind();
        let offered = lock(&self.link.remote)
            .as_ref()
            .map(|offer| offers_media(&offer.sdp, kind))
            .unwrap_or(false);
        if !offered {
            return Err(TransportError::NoTransceiver(kind));
        }

        self.link
            .outbound
            .send(track)
            .map_err(|_| TransportError::Closed)
    }

    async fn create_answer(&self) -> Result<SessionDescription, NegotiationError> {
        if self.is_closed() {
            return Err(NegotiationError::Closed);
        }

        let Some(offer) = lock(&self.link.remote).clone() else {
            return Err(NegotiationError::AnswerFailed("no remote offer applied".into()));
        };

        let media: Vec<&str> = offer.sdp.lines().filter(|l| l.starts_with("m=")).collect();
        if media.is_empty() {
            return Err(NegotiationError::AnswerFailed(
                "offer has no media sections".into(),
            ));
        }

        let mut sdp = format!(
            "v=0\r\no=- {} 0 IN IP4 127.0.0.1\r\ns=-\r\nt=0 0\r\n",
            self.link.session_id
        );
        for line in media {
            sdp.push_str(line);
            sdp.push_str("\r\n");
        }
        Ok(SessionDescription::answer(sdp))
    }

    async fn close(&self) -> Result<(), TransportError> {
        if self.link.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let events = lock(&self.link.events).take();
        if let Some(events) = events {
            let closed = TransportEvent::ConnectionState(ConnectionState::Closed);
            if let Err(TrySendError::Full(event)) = events.try_send(closed) {
                // The session task may be the caller; never wait on its own queue
                tokio::spawn(async move {
                    let _ = events.send(event).await;
                });
            }
        }

        if self.link.fail_close.load(Ordering::Acquire) {
            return Err(TransportError::Other(format!(
                "session {} did not close cleanly",
                self.link.session_id
            )));
        }
        Ok(())
    }
}

/// Remote half of a loopback session
pub struct MemoryPeer {
    link: Arc<Link>,
    events: mpsc::Sender<TransportEvent>,
    outbound: mpsc::UnboundedReceiver<OutboundTrack>,
}

impl MemoryPeer {
    pub fn session_id(&self) -> SessionId {
        self.link.session_id
    }

    /// Whether the server half has been closed
    pub fn is_closed(&self) -> bool {
        self.link.closed.load(Ordering::Acquire)
    }

    /// Make the server half's next close report a failure
    pub fn fail_close(&self) {
        self.link.fail_close.store(true, Ordering::Release);
    }

    async fn emit(&self, event: TransportEvent) {
        if self.events.send(event).await.is_err() {
            tracing::trace!(session_id = %self.link.session_id, "Session no longer listening");
        }
    }

    /// Report a connection state change
    pub async fn set_state(&self, state: ConnectionState) {
        self.emit(TransportEvent::ConnectionState(state)).await;
    }

    pub async fn connect(&self) {
        self.set_state(ConnectionState::Connected).await;
    }

    pub async fn fail(&self) {
        self.set_state(ConnectionState::Failed).await;
    }

    /// Start sending a track; frames pushed into the returned sender reach
    /// the session
    pub async fn send_track(&self, id: &str, kind: MediaKind, capacity: usize) -> mpsc::Sender<Frame> {
        let (tx, track) = MediaTrack::channel(id, kind, capacity);
        self.emit(TransportEvent::Track(track)).await;
        tx
    }

    /// Report that an inbound track ended
    pub async fn end_track(&self, id: &str) {
        self.emit(TransportEvent::TrackEnded(TrackId::new(id))).await;
    }

    /// Open the control channel
    pub async fn open_channel(&self, label: &str, capacity: usize) -> MemoryChannel {
        let (outbound, incoming) = mpsc::channel(capacity.max(1));
        self.emit(TransportEvent::ChannelOpened {
            label: label.to_string(),
            outbound,
        })
        .await;

        MemoryChannel {
            events: self.events.clone(),
            incoming,
        }
    }

    /// Wait for the next track the server sends to this peer
    pub async fn next_track(&mut self) -> Option<OutboundTrack> {
        self.outbound.recv().await
    }

    pub fn try_next_track(&mut self) -> Option<OutboundTrack> {
        self.outbound.try_recv().ok()
    }
}

impl std::fmt::Debug for MemoryPeer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryPeer")
            .field("session_id", &self.link.session_id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Remote end of the control channel
#[derive(Debug)]
pub struct MemoryChannel {
    events: mpsc::Sender<TransportEvent>,
    incoming: mpsc::Receiver<String>,
}

impl MemoryChannel {
    /// Send text to the server
    pub async fn send(&self, text: &str) {
        let _ = self
            .events
            .send(TransportEvent::ChannelMessage(text.to_string()))
            .await;
    }

    /// Wait for text from the server
    pub async fn recv(&mut self) -> Option<String> {
        self.incoming.recv().await
    }

    pub fn try_recv(&mut self) -> Option<String> {
        self.incoming.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OFFER: &str = "v=0\r\nm=video 9 UDP/TLS/RTP/SAVPF 96\r\n";

    fn setup() -> (MemoryTransport, MemoryPeer, mpsc::Receiver<TransportEvent>) {
        let (factory, mut peers) = MemoryTransportFactory::new();
        let (events_tx, events_rx) = mpsc::channel(8);
        let transport = factory.create(SessionId(9), events_tx);
        let peer = peers.try_recv().unwrap();
        (transport, peer, events_rx)
    }

    #[tokio::test]
    async fn test_answer_mirrors_offer() {
        let (transport, peer, _events) = setup();
        assert_eq!(peer.session_id(), SessionId(9));

        transport
            .apply_offer(&SessionDescription::offer(OFFER))
            .await
            .unwrap();
        let answer = transport.create_answer().await.unwrap();

        assert_eq!(answer.sdp_type, "answer");
        assert!(answer.sdp.contains("m=video 9 UDP/TLS/RTP/SAVPF 96"));
    }

    #[tokio::test]
    async fn test_rejects_bad_offers() {
        let (transport, _peer, _events) = setup();

        let err = transport
            .apply_offer(&SessionDescription::answer(OFFER))
            .await
            .unwrap_err();
        assert!(matches!(err, NegotiationError::InvalidOffer(_)));

        transport
            .apply_offer(&SessionDescription::offer("v=0\r\n"))
            .await
            .unwrap();
        let err = transport.create_answer().await.unwrap_err();
        assert!(matches!(err, NegotiationError::AnswerFailed(_)));
    }

    #[tokio::test]
    async fn test_add_track_requires_offered_kind() {
        let (transport, mut peer, _events) = setup();
        transport
            .apply_offer(&SessionDescription::offer(OFFER))
            .await
            .unwrap();

        let (_atx, audio) = MediaTrack::channel("mic", MediaKind::Audio, 1);
        assert!(matches!(
            transport.add_track(audio.into()),
            Err(TransportError::NoTransceiver(MediaKind::Audio))
        ));

        let (_vtx, video) = MediaTrack::channel("cam", MediaKind::Video, 1);
        transport.add_track(video.into()).unwrap();
        assert_eq!(peer.try_next_track().map(|t| t.kind()), Some(MediaKind::Video));
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_reported() {
        let (transport, peer, mut events) = setup();
        peer.fail_close();

        assert!(transport.close().await.is_err());
        assert!(peer.is_closed());
        assert!(transport.close().await.is_ok());

        assert!(matches!(
            events.recv().await,
            Some(TransportEvent::ConnectionState(ConnectionState::Closed))
        ));
        assert!(events.try_recv().is_err());
    }
}
