//! Published source directory
//!
//! Every producer video track becomes a [`PublishedSource`]: a raw relay
//! over the inbound track, a transform stage over that relay, and a second
//! relay over the stage. The directory keeps the published sources in
//! publication order; the most recent one is *current*, and observers bind
//! to it when they arrive.
//!
//! Subscribing happens under the directory's read lock while publishing
//! and withdrawing take the write lock, so an observer never picks a
//! source that is being torn down.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::RwLock;

use super::track::{RelaySubscriber, TrackRelay};
use crate::media::{MediaTrack, TrackId};
use crate::session::SessionId;
use crate::stats::SourceStats;
use crate::transform::{StageControl, TransformCatalog, TransformStage};

/// One producer track with its relays and stage
#[derive(Debug)]
pub struct PublishedSource {
    /// Producing session
    pub producer: SessionId,
    /// Inbound track identity
    pub track_id: TrackId,
    /// Untransformed feed
    pub raw: TrackRelay,
    /// Transformed feed
    pub transformed: TrackRelay,
    /// Selection and channel binding of the stage
    pub control: StageControl,
    /// When the source was built
    pub published_at: Instant,
}

impl PublishedSource {
    /// Build the relay chain for a producer track
    ///
    /// `initial` selects the stage's first transform; unknown keys fall back
    /// to pass-through.
    pub fn build(
        producer: SessionId,
        track: MediaTrack,
        catalog: Arc<TransformCatalog>,
        initial: &str,
    ) -> Self {
        let track_id = track.id().clone();
        let raw = TrackRelay::spawn(format!("{}/{}/raw", producer, track_id), track);
        let (stage, control) = TransformStage::new(raw.subscribe(), catalog, initial);
        let transformed = TrackRelay::spawn(format!("{}/{}/transformed", producer, track_id), stage);

        tracing::debug!(
            session_id = %producer,
            track = %track_id,
            transform = %control.current_transform(),
            "Source relays started"
        );

        Self {
            producer,
            track_id,
            raw,
            transformed,
            control,
            published_at: Instant::now(),
        }
    }

    /// Subscribe to the raw feed when `native`, the transformed one otherwise
    pub fn subscribe(&self, native: bool) -> RelaySubscriber {
        if native {
            self.raw.subscribe()
        } else {
            self.transformed.subscribe()
        }
    }

    /// Stop both relays; every subscriber resolves to end-of-stream
    pub fn release(&self) {
        self.transformed.detach();
        self.raw.detach();
    }

    pub fn is_released(&self) -> bool {
        self.raw.is_ended() && self.transformed.is_ended()
    }

    fn stats(&self, current: bool) -> SourceStats {
        SourceStats {
            producer: self.producer,
            current,
            raw: self.raw.stats(),
            transformed: self.transformed.stats(),
            stage: self.control.stats(),
        }
    }
}

/// Directory of published sources
///
/// Thread-safe via `RwLock`. Observers only ever read; producers write when
/// they publish or go away.
#[derive(Debug, Default)]
pub struct SourceDirectory {
    /// Oldest first; the last entry is current
    sources: RwLock<Vec<Arc<PublishedSource>>>,
}

impl SourceDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a source and make it current
    ///
    /// A previous source of the same producer is removed and released.
    pub async fn publish(&self, source: Arc<PublishedSource>) {
        let replaced = {
            let mut sources = self.sources.write().await;
            let replaced = sources
                .iter()
                .position(|s| s.producer == source.producer)
                .map(|index| sources.remove(index));
            sources.push(Arc::clone(&source));
            replaced
        };

        if let Some(old) = replaced {
            old.release();
            tracing::debug!(
                session_id = %old.producer,
                track = %old.track_id,
                "Previous source of producer released"
            );
        }

        tracing::info!(
            session_id = %source.producer,
            track = %source.track_id,
            "Source published"
        );
    }

    /// Withdraw exactly `source`
    ///
    /// The previous live source, if any, becomes current again. Returns
    /// false if `source` was not published (or already withdrawn).
    pub async fn withdraw(&self, source: &Arc<PublishedSource>) -> bool {
        let removed = {
            let mut sources = self.sources.write().await;
            match sources.iter().position(|s| Arc::ptr_eq(s, source)) {
                Some(index) => {
                    sources.remove(index);
                    true
                }
                None => false,
            }
        };

        if removed {
            tracing::info!(
                session_id = %source.producer,
                track = %source.track_id,
                "Source withdrawn"
            );
        }
        removed
    }

    /// Current source, if any
    pub async fn current(&self) -> Option<Arc<PublishedSource>> {
        self.sources.read().await.last().cloned()
    }

    /// Subscribe to the current source
    ///
    /// Returns the source together with the subscriber so the caller can
    /// bind to its stage.
    pub async fn subscribe(&self, native: bool) -> Option<(Arc<PublishedSource>, RelaySubscriber)> {
        let sources = self.sources.read().await;
        let source = sources.last()?;
        let subscriber = source.subscribe(native);
        Some((Arc::clone(source), subscriber))
    }

    /// Number of published sources
    pub async fn len(&self) -> usize {
        self.sources.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sources.read().await.is_empty()
    }

    /// Statistics of every published source, oldest first
    pub async fn stats(&self) -> Vec<SourceStats> {
        let sources = self.sources.read().await;
        let last = sources.len().saturating_sub(1);
        sources
            .iter()
            .enumerate()
            .map(|(index, source)| source.stats(index == last))
            .collect()
    }
}
