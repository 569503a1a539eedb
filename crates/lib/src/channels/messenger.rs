//! Messenger webhook envelope and subscription handshake.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Webhook POST body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub object: Option<String>,
    #[serde(default)]
    pub entry: Vec<WebhookEntry>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhookEntry {
    /// Page id.
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub time: Option<i64>,
    #[serde(default)]
    pub messaging: Option<Vec<MessagingEvent>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessagingEvent {
    #[serde(default)]
    pub sender: Option<Participant>,
    #[serde(default)]
    pub recipient: Option<Participant>,
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub message: Option<EventMessage>,
    #[serde(default)]
    pub postback: Option<Postback>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Participant {
    pub id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventMessage {
    #[serde(default)]
    pub mid: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub quick_reply: Option<QuickReplyEvent>,
    #[serde(default)]
    pub attachments: Option<Vec<EventAttachment>>,
    #[serde(default)]
    pub sticker_id: Option<Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuickReplyEvent {
    #[serde(default)]
    pub payload: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Postback {
    #[serde(default)]
    pub payload: String,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventAttachment {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub payload: Option<AttachmentPayload>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AttachmentPayload {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub coordinates: Option<Value>,
}

impl EventAttachment {
    pub fn payload_url(&self) -> Option<&str> {
        self.payload.as_ref()?.url.as_deref()
    }
}

impl WebhookPayload {
    /// Messaging events of the first entry, the batch one delivery carries.
    pub fn messages(&self) -> &[MessagingEvent] {
        self.entry
            .first()
            .and_then(|e| e.messaging.as_deref())
            .unwrap_or_default()
    }

    pub fn page_id(&self) -> Option<&str> {
        self.entry.first()?.id.as_deref()
    }

    pub fn sender_id(&self) -> Option<&str> {
        self.messages().first()?.sender.as_ref().map(|s| s.id.as_str())
    }

    /// Timestamp of the first event, used as the delivery id for duplicate detection.
    pub fn delivery_id(&self) -> Option<i64> {
        self.messages().first()?.timestamp
    }

    /// Session key for the sending user: `fb-<pageId>-<senderId>`.
    pub fn external_id(&self) -> Option<String> {
        Some(external_id(self.page_id()?, self.sender_id()?))
    }
}

pub fn external_id(page_id: &str, sender_id: &str) -> String {
    format!("fb-{}-{}", page_id, sender_id)
}

/// True when `body` is a page webhook carrying at least one messaging event.
pub fn check_request(body: &Value) -> bool {
    let is_page = body.get("object").and_then(Value::as_str) == Some("page");
    let has_messaging = body
        .get("entry")
        .and_then(|e| e.get(0))
        .and_then(|e| e.get("messaging"))
        .map_or(false, |m| match m {
            Value::Array(a) => !a.is_empty(),
            Value::Object(o) => !o.is_empty(),
            _ => false,
        });
    is_page && has_messaging
}

/// Subscription handshake query (`hub.mode`, `hub.verify_token`, `hub.challenge`).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VerifyQuery {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
}

/// Challenge to echo back when the handshake is a subscribe with the expected token.
pub fn verify_subscription(query: &VerifyQuery, expected_token: Option<&str>) -> Option<String> {
    let expected = expected_token.filter(|t| !t.is_empty())?;
    if query.mode.as_deref() == Some("subscribe") && query.verify_token.as_deref() == Some(expected) {
        query.challenge.clone()
    } else {
        None
    }
}
