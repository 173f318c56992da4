//! Session orchestrator
//!
//! Entry point of the crate. `handle_offer` negotiates a new session with
//! the transport collaborator, binds observers to the current source, arms
//! the session's event loop and returns the answer. Everything after that
//! happens in the session's own task (see `connection`).

use std::sync::Arc;

use tokio::sync::{mpsc, watch, OwnedSemaphorePermit, Semaphore};

use super::config::OrchestratorConfig;
use super::connection::PeerSession;
use super::request::OfferRequest;
use crate::error::{Error, NegotiationError, Result};
use crate::media::{BlackholeFactory, MediaSink, NoPlayback, PlaybackSource, SinkFactory};
use crate::registry::{DrainReport, SessionEntry, SessionRegistry};
use crate::relay::{PublishedSource, SourceDirectory, SubscriberHandle};
use crate::session::{SessionContext, SessionId, SessionState};
use crate::stats::SourceStats;
use crate::transform::{TransformCatalog, TransformInfo};
use crate::transport::{PeerTransport, SessionDescription, TransportFactory};

/// State shared by the orchestrator and every session task
pub(crate) struct Shared<T> {
    pub(crate) config: OrchestratorConfig,
    pub(crate) catalog: Arc<TransformCatalog>,
    pub(crate) registry: SessionRegistry<T>,
    pub(crate) sources: SourceDirectory,
}

/// Source an observer was bound to, and its outbound cursor
type Observed = (Arc<PublishedSource>, SubscriberHandle);

/// Orchestrates peer sessions over one transport factory
///
/// # Example
/// ```no_run
/// use peerlens::server::{OfferRequest, OrchestratorConfig, SessionOrchestrator};
/// use peerlens::transform::TransformCatalog;
/// use peerlens::transport::MemoryTransportFactory;
///
/// # async fn example() -> peerlens::error::Result<()> {
/// let (factory, _peers) = MemoryTransportFactory::new();
/// let orchestrator =
///     SessionOrchestrator::new(OrchestratorConfig::default(), TransformCatalog::new(), factory);
///
/// let offer = "v=0\r\nm=video 9 UDP/TLS/RTP/SAVPF 96\r\n";
/// let answer = orchestrator
///     .handle_offer(OfferRequest::producer(offer, Some("passthrough")))
///     .await?;
/// println!("{}", answer.sdp);
/// # Ok(())
/// # }
/// ```
pub struct SessionOrchestrator<F: TransportFactory> {
    factory: F,
    sinks: Arc<dyn SinkFactory>,
    playback: Arc<dyn PlaybackSource>,
    session_slots: Option<Arc<Semaphore>>,
    shared: Arc<Shared<F::Transport>>,
}

impl<F: TransportFactory> SessionOrchestrator<F> {
    /// Create an orchestrator
    ///
    /// Sessions record into [`MediaBlackhole`](crate::media::MediaBlackhole)s
    /// and get no playback audio until configured otherwise.
    pub fn new(config: OrchestratorConfig, catalog: TransformCatalog, factory: F) -> Self {
        let session_slots = if config.max_sessions > 0 {
            Some(Arc::new(Semaphore::new(config.max_sessions)))
        } else {
            None
        };

        tracing::debug!(
            transforms = catalog.len(),
            max_sessions = config.max_sessions,
            "Orchestrator created"
        );

        Self {
            factory,
            sinks: Arc::new(BlackholeFactory),
            playback: Arc::new(NoPlayback),
            session_slots,
            shared: Arc::new(Shared {
                config,
                catalog: Arc::new(catalog),
                registry: SessionRegistry::new(),
                sources: SourceDirectory::new(),
            }),
        }
    }

    /// Use `sinks` to create each session's recording sink
    pub fn with_sink_factory(mut self, sinks: impl SinkFactory) -> Self {
        self.sinks = Arc::new(sinks);
        self
    }

    /// Send audio from `playback` to producers that send audio
    pub fn with_playback(mut self, playback: impl PlaybackSource) -> Self {
        self.playback = Arc::new(playback);
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.shared.config
    }

    /// The transport factory sessions are created with
    pub fn transports(&self) -> &F {
        &self.factory
    }

    pub fn catalog(&self) -> &Arc<TransformCatalog> {
        &self.shared.catalog
    }

    pub fn registry(&self) -> &SessionRegistry<F::Transport> {
        &self.shared.registry
    }

    pub fn sources(&self) -> &SourceDirectory {
        &self.shared.sources
    }

    /// Registered transforms, pass-through first
    pub fn list_transforms(&self) -> Vec<TransformInfo> {
        self.shared.catalog.list()
    }

    /// Number of active sessions
    pub async fn session_count(&self) -> usize {
        self.shared.registry.len().await
    }

    /// Statistics of every published source
    pub async fn source_stats(&self) -> Vec<SourceStats> {
        self.shared.sources.stats().await
    }

    /// Close every active session
    pub async fn shutdown(&self) -> DrainReport {
        tracing::info!("Orchestrator shutting down");
        self.shared.registry.drain_all().await
    }

    /// Start a session from a peer's offer and return the answer
    ///
    /// The session is registered and its event loop running before this
    /// returns. On a negotiation failure nothing is registered and the
    /// transport is closed.
    pub async fn handle_offer(&self, request: OfferRequest) -> Result<SessionDescription> {
        let permit = self.acquire_slot()?;

        let session_id = SessionId::next();
        let ctx = request.context(session_id);
        let mut state = SessionState::new(session_id, ctx.role);

        tracing::info!(
            session_id = %session_id,
            role = %ctx.role,
            native = ctx.native,
            transform = ctx.requested_transform.as_deref().unwrap_or(""),
            "Session created"
        );

        let (events_tx, events_rx) = mpsc::channel(self.shared.config.event_capacity.max(1));
        let transport = Arc::new(self.factory.create(session_id, events_tx));
        let mut sink = self.sinks.create(session_id);

        let (answer, observed) = match self
            .negotiate(&ctx, transport.as_ref(), &request.offer(), sink.as_mut())
            .await
        {
            Ok(negotiated) => negotiated,
            Err(e) => {
                state.close();
                sink.stop();
                tracing::warn!(session_id = %session_id, error = %e, "Negotiation failed");
                if let Err(close_err) = transport.close().await {
                    tracing::debug!(
                        session_id = %session_id,
                        error = %close_err,
                        "Transport close after failed negotiation"
                    );
                }
                return Err(e.into());
            }
        };

        let (observed, subscriptions) = match observed {
            Some((source, cursor)) => (Some(source), vec![cursor]),
            None => (None, Vec::new()),
        };

        state.activate();
        let (phase_tx, phase_rx) = watch::channel(state.phase);
        self.shared
            .registry
            .add(SessionEntry::new(
                session_id,
                ctx.role,
                Arc::clone(&transport),
                phase_rx,
            ))
            .await;

        let session = PeerSession::new(
            ctx,
            state,
            phase_tx,
            transport,
            sink,
            Arc::clone(&self.shared),
            Arc::clone(&self.playback),
            observed,
            subscriptions,
            permit,
        );
        tokio::spawn(session.run(events_rx));

        tracing::info!(session_id = %session_id, "Session active");
        Ok(answer)
    }

    fn acquire_slot(&self) -> Result<Option<OwnedSemaphorePermit>> {
        let Some(slots) = &self.session_slots else {
            return Ok(None);
        };

        match Arc::clone(slots).try_acquire_owned() {
            Ok(permit) => Ok(Some(permit)),
            Err(_) => {
                let max = self.shared.config.max_sessions;
                tracing::warn!(max_sessions = max, "Offer rejected: session limit reached");
                Err(Error::SessionLimit(max))
            }
        }
    }

    async fn negotiate(
        &self,
        ctx: &SessionContext,
        transport: &F::Transport,
        offer: &SessionDescription,
        sink: &mut dyn MediaSink,
    ) -> std::result::Result<(SessionDescription, Option<Observed>), NegotiationError> {
        transport.apply_offer(offer).await?;
        sink.start();

        let observed = if ctx.is_observer() {
            self.attach_observer(ctx, transport).await
        } else {
            None
        };

        match transport.create_answer().await {
            Ok(answer) => Ok((answer, observed)),
            Err(e) => {
                if let Some((_, cursor)) = &observed {
                    cursor.release();
                }
                Err(e)
            }
        }
    }

    /// Subscribe an observer's outbound track to the current source
    async fn attach_observer(
        &self,
        ctx: &SessionContext,
        transport: &F::Transport,
    ) -> Option<Observed> {
        let Some((source, subscriber)) = self.shared.sources.subscribe(ctx.native).await else {
            tracing::info!(session_id = %ctx.session_id, "No source to observe yet");
            return None;
        };

        let feed = subscriber.source_id().to_string();
        let cursor = subscriber.handle();
        match transport.add_track(subscriber.into()) {
            Ok(()) => {
                tracing::info!(
                    session_id = %ctx.session_id,
                    producer = %source.producer,
                    feed = %feed,
                    "Observer bound to source"
                );
                Some((source, cursor))
            }
            Err(e) => {
                tracing::warn!(
                    session_id = %ctx.session_id,
                    error = %e,
                    "Could not send source to observer"
                );
                None
            }
        }
    }
}
