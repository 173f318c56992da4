//! Frame types carried through relays and stages
//!
//! A `Frame` is cheap to clone: the pixel/sample payload is a `Bytes`, so
//! every subscriber of a relay shares the same allocation.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Kind of media carried by a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    /// Video track
    Video,
    /// Audio track
    Audio,
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaKind::Video => write!(f, "video"),
            MediaKind::Audio => write!(f, "audio"),
        }
    }
}

/// Rational time base of a frame's presentation timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeBase {
    pub num: u32,
    pub den: u32,
}

impl TimeBase {
    /// 90kHz RTP video clock
    pub const VIDEO_90K: TimeBase = TimeBase { num: 1, den: 90_000 };

    /// 48kHz audio clock
    pub const AUDIO_48K: TimeBase = TimeBase { num: 1, den: 48_000 };

    pub const fn new(num: u32, den: u32) -> Self {
        Self { num, den }
    }

    /// Convert a timestamp in this base to milliseconds
    ///
    /// Saturates at the `i64` range.
    pub fn to_millis(&self, pts: i64) -> i64 {
        if self.den == 0 {
            return 0;
        }
        let millis = pts as i128 * 1000 * self.num as i128 / self.den as i128;
        millis.clamp(i64::MIN as i128, i64::MAX as i128) as i64
    }
}

impl Default for TimeBase {
    fn default() -> Self {
        Self::VIDEO_90K
    }
}

/// A decoded media frame
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Kind of frame
    pub kind: MediaKind,
    /// Presentation timestamp in `time_base` units
    pub pts: i64,
    /// Time base of `pts`
    pub time_base: TimeBase,
    /// Width in pixels (0 for audio)
    pub width: u32,
    /// Height in pixels (0 for audio)
    pub height: u32,
    /// Raw payload (bgr24 pixels for video, interleaved samples for audio)
    pub data: Bytes,
}

impl Frame {
    /// Create a bgr24 video frame
    pub fn video(pts: i64, width: u32, height: u32, data: Bytes) -> Self {
        Self {
            kind: MediaKind::Video,
            pts,
            time_base: TimeBase::VIDEO_90K,
            width,
            height,
            data,
        }
    }

    /// Create an audio frame
    pub fn audio(pts: i64, data: Bytes) -> Self {
        Self {
            kind: MediaKind::Audio,
            pts,
            time_base: TimeBase::AUDIO_48K,
            width: 0,
            height: 0,
            data,
        }
    }

    /// Replace this frame's timing with `other`'s
    pub fn with_timing_of(mut self, other: &Frame) -> Self {
        self.pts = other.pts;
        self.time_base = other.time_base;
        self
    }

    /// Payload size in bytes
    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn is_video(&self) -> bool {
        self.kind == MediaKind::Video
    }
}
