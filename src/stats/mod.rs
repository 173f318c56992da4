//! Statistics and metrics for relays, stages and sources

pub mod metrics;

pub use metrics::{RelayStats, SourceStats, StageCounters, StageStats};
