//! Orchestrator configuration

use crate::transform::PASSTHROUGH;

/// Orchestrator configuration options
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Transform selected when the offer names none (or an unknown one)
    pub default_transform: String,

    /// Maximum concurrent sessions (0 = unlimited)
    pub max_sessions: usize,

    /// Capacity of each session's transport event queue
    pub event_capacity: usize,

    /// Echo chat text back to its sender
    pub echo_chat: bool,

    /// Send a producer its own transformed feed
    pub loopback_transformed: bool,

    /// Hand the raw producer video to the recording sink
    pub record_video: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            default_transform: PASSTHROUGH.to_string(),
            max_sessions: 0, // Unlimited
            event_capacity: 64,
            echo_chat: true,
            loopback_transformed: true,
            record_video: false,
        }
    }
}

impl OrchestratorConfig {
    /// Set the default transform
    pub fn default_transform(mut self, key: impl Into<String>) -> Self {
        self.default_transform = key.into();
        self
    }

    /// Set maximum sessions
    pub fn max_sessions(mut self, max: usize) -> Self {
        self.max_sessions = max;
        self
    }

    /// Set the transport event queue capacity
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }

    /// Disable chat echo
    pub fn disable_echo(mut self) -> Self {
        self.echo_chat = false;
        self
    }

    /// Disable the producer's transformed preview
    pub fn disable_loopback(mut self) -> Self {
        self.loopback_transformed = false;
        self
    }

    /// Record raw producer video
    pub fn record_video(mut self, enabled: bool) -> Self {
        self.record_video = enabled;
        self
    }
}
