//! Control channel protocol and handle
//!
//! Carries transform-selection commands and chat from peers, detection
//! events and chat echoes to peers.

pub mod channel;
pub mod message;

pub use channel::ControlChannel;
pub use message::{ControlMessage, SELECT_PREFIX};
