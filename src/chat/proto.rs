//! Wire protocol for the chat socket. Every frame is a JSON object with a
//! `type` discriminator; unknown shapes are rejected before they reach the
//! core.

use serde::{Deserialize, Serialize};

use crate::storage::{Message, User};

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientEvent {
    /// Missing token/fingerprint means a first visit; the server mints them.
    Join {
        #[serde(default)]
        session_token: Option<String>,
        #[serde(default)]
        device_fingerprint: Option<String>,
    },
    FindPartner,
    SendMessage { content: String },
    Disconnect,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    Joined { user: UserSummary },
    Searching,
    PartnerFound { session_id: i64, partner: PartnerSummary },
    Message { message: MessageBody },
    PartnerDisconnected,
    Error { message: String },
}

/// What a user may learn about themselves.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: i64,
    pub is_premium: bool,
    pub email: Option<String>,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            is_premium: user.is_premium,
            email: user.email.clone(),
        }
    }
}

/// What a user may learn about a matched stranger. Never the email or the
/// fingerprint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartnerSummary {
    pub id: i64,
    pub is_anonymous: bool,
}

impl From<&User> for PartnerSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            is_anonymous: user.is_anonymous,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageBody {
    pub id: i64,
    pub content: String,
    pub sender_id: i64,
    pub created_at: i64,
}

impl From<&Message> for MessageBody {
    fn from(message: &Message) -> Self {
        Self {
            id: message.id,
            content: message.content.clone(),
            sender_id: message.sender_id,
            created_at: message.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_tagged_client_events() {
        let event: ClientEvent =
            serde_json::from_str(r#"{"type":"join","sessionToken":"abc","deviceFingerprint":"fp"}"#)
                .unwrap();
        match event {
            ClientEvent::Join { session_token, device_fingerprint } => {
                assert_eq!(session_token.as_deref(), Some("abc"));
                assert_eq!(device_fingerprint.as_deref(), Some("fp"));
            }
            other => panic!("unexpected event: {other:?}"),
        }

        assert!(matches!(
            serde_json::from_str(r#"{"type":"find_partner"}"#).unwrap(),
            ClientEvent::FindPartner
        ));
        assert!(matches!(
            serde_json::from_str(r#"{"type":"send_message","content":"hi"}"#).unwrap(),
            ClientEvent::SendMessage { content } if content == "hi"
        ));
    }

    #[test]
    fn rejects_unknown_or_malformed_events() {
        assert!(serde_json::from_str::<ClientEvent>(r#"{"type":"dance"}"#).is_err());
        assert!(serde_json::from_str::<ClientEvent>(r#"{"content":"hi"}"#).is_err());
        assert!(serde_json::from_str::<ClientEvent>("not json").is_err());
    }

    #[test]
    fn serializes_server_events_with_type_tag() {
        let event = ServerEvent::PartnerFound {
            session_id: 7,
            partner: PartnerSummary { id: 3, is_anonymous: true },
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({
                "type": "partner_found",
                "sessionId": 7,
                "partner": {"id": 3, "isAnonymous": true},
            })
        );

        assert_eq!(
            serde_json::to_value(&ServerEvent::PartnerDisconnected).unwrap(),
            json!({"type": "partner_disconnected"})
        );
    }
}
