//! Control channel handle
//!
//! A `ControlChannel` wraps the outbound half of one peer's reliable
//! ordered side channel. Sends go through a bounded queue drained by the
//! transport, so `send` suspends when the peer is not keeping up.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;

use super::message::ControlMessage;
use crate::error::ChannelClosed;
use crate::session::SessionId;
use crate::transform::StageControl;

static NEXT_CHANNEL_ID: AtomicU64 = AtomicU64::new(1);

/// Handle on one peer's control channel
///
/// Cheap to clone; all clones refer to the same channel.
#[derive(Debug, Clone)]
pub struct ControlChannel {
    id: u64,
    session_id: SessionId,
    label: String,
    outbound: mpsc::Sender<String>,
}

impl ControlChannel {
    /// Bind to a peer channel whose outbound text is drained from `outbound`
    pub fn new(session_id: SessionId, label: impl Into<String>, outbound: mpsc::Sender<String>) -> Self {
        Self {
            id: NEXT_CHANNEL_ID.fetch_add(1, Ordering::Relaxed),
            session_id,
            label: label.into(),
            outbound,
        }
    }

    /// Process-unique channel identity
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Session owning the peer end
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_closed(&self) -> bool {
        self.outbound.is_closed()
    }

    /// Push one outbound message
    pub async fn send(&self, message: &ControlMessage) -> Result<(), ChannelClosed> {
        self.send_text(message.encode()).await
    }

    /// Push one outbound text message
    pub async fn send_text(&self, text: impl Into<String>) -> Result<(), ChannelClosed> {
        self.outbound.send(text.into()).await.map_err(|_| ChannelClosed)
    }

    /// Decode one inbound message
    ///
    /// A selection command is applied to `stage` when the channel is bound
    /// to one. Chat is returned to the caller untouched; this layer never
    /// echoes.
    pub fn on_message(&self, text: &str, stage: Option<&StageControl>) -> ControlMessage {
        let message = ControlMessage::parse(text);

        if let ControlMessage::SelectTransform(ref key) = message {
            match stage {
                Some(stage) => {
                    stage.set_transform(key);
                }
                None => {
                    tracing::debug!(
                        session_id = %self.session_id,
                        channel = %self.label,
                        transform = %key,
                        "Selection ignored, channel not bound to a stage"
                    );
                }
            }
        }

        message
    }
}
