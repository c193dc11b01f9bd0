//! Wire messages exchanged over the matching and chat WebSockets.
//!
//! Every frame is a JSON object with a `type` discriminator. The same enum
//! covers both sockets: the matching socket only ever carries
//! `match_found` and `queue_update`.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SignalMessage {
    // Matching socket
    MatchFound {
        #[serde(deserialize_with = "string_or_number")]
        conversation_id: String,
    },
    QueueUpdate {
        position: u32,
        queue_size: u32,
    },

    // Chat socket
    Init {
        #[serde(deserialize_with = "string_or_number")]
        other_user_id: String,
        #[serde(default)]
        other_user_username: String,
    },
    Message {
        #[serde(default, alias = "message")]
        content: String,
        #[serde(
            default,
            deserialize_with = "optional_string_or_number",
            skip_serializing_if = "Option::is_none"
        )]
        sender_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<String>,
    },
    PartnerConnected {
        #[serde(default)]
        message: String,
    },
    PartnerLeft {
        #[serde(default)]
        message: String,
    },
    ConnectionRequest {
        #[serde(deserialize_with = "string_or_number")]
        request_id: String,
    },
    ConnectionAccepted {
        #[serde(default)]
        message: String,
    },
    ConnectionRejected {
        #[serde(default)]
        message: String,
    },
    Error {
        #[serde(default)]
        message: String,
    },

    // Video signaling, relayed verbatim by the server
    Ready {
        peer_id: String,
    },
    VideoOffer {
        offer: SessionDescription,
    },
    VideoAnswer {
        answer: SessionDescription,
    },
    IceCandidate {
        candidate: IceCandidate,
    },
    VideoToggle {
        enabled: bool,
    },

    #[serde(other)]
    Unknown,
}

impl SignalMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            SignalMessage::MatchFound { .. } => "match_found",
            SignalMessage::QueueUpdate { .. } => "queue_update",
            SignalMessage::Init { .. } => "init",
            SignalMessage::Message { .. } => "message",
            SignalMessage::PartnerConnected { .. } => "partner_connected",
            SignalMessage::PartnerLeft { .. } => "partner_left",
            SignalMessage::ConnectionRequest { .. } => "connection_request",
            SignalMessage::ConnectionAccepted { .. } => "connection_accepted",
            SignalMessage::ConnectionRejected { .. } => "connection_rejected",
            SignalMessage::Error { .. } => "error",
            SignalMessage::Ready { .. } => "ready",
            SignalMessage::VideoOffer { .. } => "video_offer",
            SignalMessage::VideoAnswer { .. } => "video_answer",
            SignalMessage::IceCandidate { .. } => "ice_candidate",
            SignalMessage::VideoToggle { .. } => "video_toggle",
            SignalMessage::Unknown => "unknown",
        }
    }

    /// Outbound chat line.
    pub fn chat(content: &str) -> Self {
        SignalMessage::Message {
            content: content.to_string(),
            sender_id: None,
            timestamp: None,
        }
    }

    pub fn is_video_signal(&self) -> bool {
        matches!(
            self,
            SignalMessage::VideoOffer { .. }
                | SignalMessage::VideoAnswer { .. }
                | SignalMessage::IceCandidate { .. }
                | SignalMessage::VideoToggle { .. }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    Offer,
    Pranswer,
    Answer,
    Rollback,
}

/// Browser-compatible `RTCSessionDescriptionInit`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: SdpKind,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Answer,
            sdp: sdp.into(),
        }
    }
}

/// Browser-compatible `RTCIceCandidateInit`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(rename = "sdpMid", default)]
    pub sdp_mid: Option<String>,
    #[serde(rename = "sdpMLineIndex", default)]
    pub sdp_mline_index: Option<u16>,
    #[serde(rename = "usernameFragment", default, skip_serializing_if = "Option::is_none")]
    pub username_fragment: Option<String>,
}

/// Django primary keys arrive as numbers, other ids as strings.
pub(crate) fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(D::Error::custom(format!("expected id, got {}", other))),
    }
}

pub(crate) fn optional_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Null => Ok(None),
        serde_json::Value::String(s) => Ok(Some(s)),
        serde_json::Value::Number(n) => Ok(Some(n.to_string())),
        other => Err(D::Error::custom(format!("expected id, got {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_matching_messages() {
        let msg: SignalMessage =
            serde_json::from_str(r#"{"type": "match_found", "conversation_id": 17}"#).unwrap();
        assert_eq!(
            msg,
            SignalMessage::MatchFound {
                conversation_id: "17".to_string()
            }
        );

        let msg: SignalMessage =
            serde_json::from_str(r#"{"type": "queue_update", "position": 1, "queue_size": 10}"#)
                .unwrap();
        assert_eq!(
            msg,
            SignalMessage::QueueUpdate {
                position: 1,
                queue_size: 10
            }
        );
    }

    #[test]
    fn test_parse_chat_messages() {
        let msg: SignalMessage = serde_json::from_value(json!({
            "type": "init",
            "other_user_id": 8,
            "other_user_username": "anon_8"
        }))
        .unwrap();
        assert_eq!(
            msg,
            SignalMessage::Init {
                other_user_id: "8".to_string(),
                other_user_username: "anon_8".to_string()
            }
        );

        let msg: SignalMessage = serde_json::from_value(json!({
            "type": "message",
            "message": "hola",
            "sender_id": 8,
            "timestamp": "2024-05-01T10:00:00Z"
        }))
        .unwrap();
        match msg {
            SignalMessage::Message {
                content, sender_id, ..
            } => {
                assert_eq!(content, "hola");
                assert_eq!(sender_id.as_deref(), Some("8"));
            }
            other => panic!("unexpected {:?}", other),
        }

        let msg: SignalMessage =
            serde_json::from_value(json!({"type": "partner_left", "message": "bye"})).unwrap();
        assert_eq!(
            msg,
            SignalMessage::PartnerLeft {
                message: "bye".to_string()
            }
        );
    }

    #[test]
    fn test_unknown_type_is_tolerated() {
        let msg: SignalMessage =
            serde_json::from_value(json!({"type": "typing", "is_typing": true})).unwrap();
        assert_eq!(msg, SignalMessage::Unknown);
    }

    #[test]
    fn test_outbound_shapes_match_browser_peer() {
        let value = serde_json::to_value(SignalMessage::chat("hi")).unwrap();
        assert_eq!(value, json!({"type": "message", "content": "hi"}));

        let value = serde_json::to_value(SignalMessage::IceCandidate {
            candidate: IceCandidate {
                candidate: "candidate:1 1 udp 2122260223 10.0.0.2 54321 typ host".to_string(),
                sdp_mid: Some("0".to_string()),
                sdp_mline_index: Some(0),
                username_fragment: None,
            },
        })
        .unwrap();
        assert_eq!(value["type"], "ice_candidate");
        assert_eq!(value["candidate"]["sdpMid"], "0");
        assert_eq!(value["candidate"]["sdpMLineIndex"], 0);

        let value = serde_json::to_value(SignalMessage::VideoOffer {
            offer: SessionDescription::offer("v=0"),
        })
        .unwrap();
        assert_eq!(value, json!({"type": "video_offer", "offer": {"type": "offer", "sdp": "v=0"}}));
    }
}
