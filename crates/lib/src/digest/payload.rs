//! Messenger Send API message bodies produced by the outbound digester.

use serde::{Deserialize, Serialize};

use crate::media::MediaKind;

/// One outgoing Messenger message (the `message` object of a Send API call).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChannelPayload {
    QuickReplies {
        text: String,
        quick_replies: Vec<QuickReply>,
    },
    Text {
        text: String,
    },
    Attachment {
        attachment: Attachment,
    },
}

impl ChannelPayload {
    pub fn text(text: impl Into<String>) -> Self {
        ChannelPayload::Text { text: text.into() }
    }

    /// Non-reusable media attachment pointing at `url`.
    pub fn media(kind: MediaKind, url: &str) -> Self {
        let payload = MediaPayload {
            is_reusable: false,
            url: url.to_string(),
        };
        let attachment = match kind {
            MediaKind::Image => Attachment::Image(payload),
            MediaKind::File => Attachment::File(payload),
            MediaKind::Video => Attachment::Video(payload),
            MediaKind::Audio => Attachment::Audio(payload),
        };
        ChannelPayload::Attachment { attachment }
    }

    /// Button template with `text` above `buttons`.
    pub fn buttons(text: String, buttons: Vec<Button>) -> Self {
        ChannelPayload::Attachment {
            attachment: Attachment::Template(TemplatePayload {
                template_type: "button".to_string(),
                text,
                buttons,
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "lowercase")]
pub enum Attachment {
    Template(TemplatePayload),
    Image(MediaPayload),
    Video(MediaPayload),
    Audio(MediaPayload),
    File(MediaPayload),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplatePayload {
    pub template_type: String,
    pub text: String,
    pub buttons: Vec<Button>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaPayload {
    pub is_reusable: bool,
    pub url: String,
}

/// Persistent template button.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Button {
    Postback {
        title: String,
        payload: String,
    },
    WebUrl {
        url: String,
        title: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        webview_height_ratio: Option<String>,
    },
}

/// Transient quick-reply chip; disappears once the user answers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuickReply {
    pub content_type: String,
    pub title: String,
    pub payload: String,
}
