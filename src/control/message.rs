//! Control channel text protocol
//!
//! Inbound:
//! - `transform:<key>` selects a transform (exact, case-sensitive prefix;
//!   the key is everything after the prefix, unescaped)
//! - anything else is chat
//!
//! Outbound messages are plain text with no envelope, one per detection
//! event or chat echo.

/// Literal prefix of a transform selection command
pub const SELECT_PREFIX: &str = "transform:";

/// A message carried over a control channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlMessage {
    /// Inbound: select the transform with this key
    SelectTransform(String),
    /// Inbound: free-text chat
    ChatText(String),
    /// Outbound: one event reported by a transform
    DetectionEvent(String),
    /// Outbound: chat text sent back to the peer
    ChatEcho(String),
}

impl ControlMessage {
    /// Decode inbound wire text
    pub fn parse(text: &str) -> Self {
        match text.strip_prefix(SELECT_PREFIX) {
            Some(key) => ControlMessage::SelectTransform(key.to_string()),
            None => ControlMessage::ChatText(text.to_string()),
        }
    }

    /// Encode to wire text
    pub fn encode(&self) -> String {
        self.to_string()
    }

    /// Whether this is one of the forms a peer sends to us
    pub fn is_inbound(&self) -> bool {
        matches!(
            self,
            ControlMessage::SelectTransform(_) | ControlMessage::ChatText(_)
        )
    }
}

impl std::fmt::Display for ControlMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ControlMessage::SelectTransform(key) => write!(f, "{}{}", SELECT_PREFIX, key),
            ControlMessage::ChatText(text)
            | ControlMessage::DetectionEvent(text)
            | ControlMessage::ChatEcho(text) => f.write_str(text),
        }
    }
}
