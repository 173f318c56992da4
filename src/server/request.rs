//! Offer request
//!
//! The payload a peer posts to start a session. Field names follow the
//! browser client's JSON (`sdp`, `type`, `video_transform`, `stalker`,
//! `native`); the camelCase spellings are accepted too.

use serde::{Deserialize, Serialize};

use crate::session::{SessionContext, SessionId, SessionRole};
use crate::transport::SessionDescription;

/// A new session request carrying the peer's offer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferRequest {
    /// Offer SDP
    #[serde(alias = "sdpOffer")]
    pub sdp: String,

    /// Description type, normally `offer`
    #[serde(rename = "type", alias = "sdpType")]
    pub sdp_type: String,

    /// Initial transform for a producer's video
    #[serde(default, alias = "videoTransform", skip_serializing_if = "Option::is_none")]
    pub video_transform: Option<String>,

    /// Observer intent
    #[serde(default)]
    pub stalker: bool,

    /// Observer wants the raw feed
    #[serde(default)]
    pub native: bool,
}

impl OfferRequest {
    /// Request to produce, with an optional initial transform
    pub fn producer(sdp: impl Into<String>, video_transform: Option<&str>) -> Self {
        Self {
            sdp: sdp.into(),
            sdp_type: "offer".into(),
            video_transform: video_transform.map(str::to_string),
            stalker: false,
            native: false,
        }
    }

    /// Request to observe the current source, raw when `native`
    pub fn observer(sdp: impl Into<String>, native: bool) -> Self {
        Self {
            sdp: sdp.into(),
            sdp_type: "offer".into(),
            video_transform: None,
            stalker: true,
            native,
        }
    }

    pub fn role(&self) -> SessionRole {
        if self.stalker {
            SessionRole::Observer
        } else {
            SessionRole::Producer
        }
    }

    /// The remote description carried by this request
    pub fn offer(&self) -> SessionDescription {
        SessionDescription::new(self.sdp.clone(), self.sdp_type.clone())
    }

    /// Context of the session this request opens
    pub fn context(&self, session_id: SessionId) -> SessionContext {
        let mut ctx = SessionContext::new(session_id, self.role());
        ctx.native = self.native;
        ctx.requested_transform = self.video_transform.clone().filter(|key| !key.is_empty());
        ctx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_snake_case() {
        let request: OfferRequest = serde_json::from_str(
            r#"{"sdp":"v=0","type":"offer","video_transform":"edges"}"#,
        )
        .unwrap();

        assert_eq!(request.role(), SessionRole::Producer);
        assert_eq!(request.video_transform.as_deref(), Some("edges"));
        assert!(!request.native);
        assert_eq!(request.offer(), SessionDescription::offer("v=0"));
    }

    #[test]
    fn test_parse_camel_case_aliases() {
        let request: OfferRequest = serde_json::from_str(
            r#"{"sdpOffer":"v=0","sdpType":"offer","stalker":true,"native":true}"#,
        )
        .unwrap();

        assert_eq!(request.role(), SessionRole::Observer);
        assert!(request.native);
        assert!(request.video_transform.is_none());
    }

    #[test]
    fn test_context_ignores_empty_transform() {
        let request = OfferRequest::producer("v=0", Some(""));
        let ctx = request.context(SessionId(4));

        assert_eq!(ctx.session_id, SessionId(4));
        assert!(ctx.requested_transform.is_none());
        assert!(!ctx.is_observer());
    }

    #[test]
    fn test_serialize_wire_names() {
        let json = serde_json::to_value(OfferRequest::observer("v=0", true)).unwrap();

        assert_eq!(json["type"], "offer");
        assert_eq!(json["stalker"], true);
        assert!(json.get("video_transform").is_none());
    }
}
