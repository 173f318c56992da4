//! Statistics for relays and transform stages

use std::sync::atomic::{AtomicU64, Ordering};

use crate::session::SessionId;

/// Snapshot of a relay's counters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayStats {
    /// Identity of the upstream source
    pub source_id: String,
    /// Frames published by the upstream read loop
    pub frames_published: u64,
    /// Currently attached subscribers
    pub subscriber_count: u32,
    /// Whether the upstream has ended
    pub ended: bool,
}

/// Live counters of a transform stage
///
/// Updated by the stage's pull loop, read by anyone holding the stage's
/// control handle.
#[derive(Debug, Default)]
pub struct StageCounters {
    frames: AtomicU64,
    faults: AtomicU64,
    events_emitted: AtomicU64,
    events_dropped: AtomicU64,
}

impl StageCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn on_frame(&self) {
        self.frames.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn on_fault(&self) {
        self.faults.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn on_event_sent(&self) {
        self.events_emitted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn on_events_dropped(&self, count: usize) {
        self.events_dropped.fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Take a snapshot
    pub fn snapshot(&self, transform: String) -> StageStats {
        StageStats {
            transform,
            frames_processed: self.frames.load(Ordering::Relaxed),
            faults: self.faults.load(Ordering::Relaxed),
            events_emitted: self.events_emitted.load(Ordering::Relaxed),
            events_dropped: self.events_dropped.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of a stage's counters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageStats {
    /// Currently selected transform
    pub transform: String,
    /// Frames pulled and republished
    pub frames_processed: u64,
    /// Frames forwarded untransformed because the transform failed
    pub faults: u64,
    /// Detection events delivered to a control channel
    pub events_emitted: u64,
    /// Detection events dropped (no channel bound, or channel gone)
    pub events_dropped: u64,
}

/// Statistics of one published producer source
#[derive(Debug, Clone)]
pub struct SourceStats {
    /// Producer session
    pub producer: SessionId,
    /// Whether observers currently bind to this source
    pub current: bool,
    /// Raw feed relay
    pub raw: RelayStats,
    /// Transformed feed relay
    pub transformed: RelayStats,
    /// Transform stage
    pub stage: StageStats,
}
