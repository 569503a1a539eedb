//! Inbound digestion: Messenger events to canonical bot requests.

use futures_util::future::join_all;

use super::request::{ApiRequest, ButtonPayload, PendingOption};
use super::text::remove_accents_to_lower;
use super::{DigestError, Digester};
use crate::channels::{EventAttachment, MessagingEvent, Postback, QuickReplyEvent, WebhookPayload};
use crate::media::{MediaHandle, MediaKind};
use crate::session::Session;

/// Kinds of inbound Messenger event, in classification order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Text,
    Postback,
    QuickReply,
    Sticker,
    Attachment,
}

/// A classified event with the part its digester reads.
#[derive(Debug, Clone, Copy)]
pub enum InboundEvent<'a> {
    Text(&'a str),
    Postback(&'a Postback),
    QuickReply(&'a QuickReplyEvent),
    Sticker(&'a [EventAttachment]),
    Attachment(&'a [EventAttachment]),
}

impl<'a> InboundEvent<'a> {
    /// First matching kind wins; sticker is checked before attachment since both carry attachments.
    pub fn classify(event: &'a MessagingEvent) -> Result<Self, DigestError> {
        let message = event.message.as_ref();
        if let Some(m) = message.filter(|m| m.quick_reply.is_none()) {
            if let Some(text) = m.text.as_deref() {
                return Ok(InboundEvent::Text(text));
            }
        }
        if let Some(postback) = event.postback.as_ref() {
            return Ok(InboundEvent::Postback(postback));
        }
        if let Some(quick_reply) = message.and_then(|m| m.quick_reply.as_ref()) {
            return Ok(InboundEvent::QuickReply(quick_reply));
        }
        if let Some(m) = message {
            if let Some(attachments) = m.attachments.as_deref() {
                return Ok(if m.sticker_id.is_some() {
                    InboundEvent::Sticker(attachments)
                } else {
                    InboundEvent::Attachment(attachments)
                });
            }
        }
        Err(DigestError::UnknownMessageType)
    }

    pub fn kind(&self) -> MessageKind {
        match self {
            InboundEvent::Text(_) => MessageKind::Text,
            InboundEvent::Postback(_) => MessageKind::Postback,
            InboundEvent::QuickReply(_) => MessageKind::QuickReply,
            InboundEvent::Sticker(_) => MessageKind::Sticker,
            InboundEvent::Attachment(_) => MessageKind::Attachment,
        }
    }
}

fn decode_payload(raw: &str, source: &str) -> Option<ApiRequest> {
    match serde_json::from_str::<ButtonPayload>(raw) {
        Ok(payload) => Some(payload.into()),
        Err(e) => {
            log::warn!("digest: ignoring undecodable {} payload: {}", source, e);
            None
        }
    }
}

fn digest_attachments(attachments: &[EventAttachment]) -> Vec<ApiRequest> {
    attachments
        .iter()
        .filter_map(|a| {
            if a.kind == "location" {
                if let (Some(title), Some(url)) = (a.title.as_deref(), a.url.as_deref()) {
                    return Some(ApiRequest::Message(format!("{}: {}", title, url)));
                }
            }
            a.payload_url().map(|url| ApiRequest::Message(url.to_string()))
        })
        .collect()
}

impl Digester {
    /// Turn one webhook delivery into canonical requests.
    ///
    /// Pending options in the session are consumed (and always removed) first; a typed
    /// reply matching one of their labels becomes that option's request. Otherwise, with
    /// a human chat ongoing, attachments of the first event are downloaded as media.
    /// When neither applies, each event is classified and digested in order.
    pub async fn digest_to_api(
        &self,
        payload: &WebhookPayload,
        session: &mut Session,
    ) -> Result<Vec<ApiRequest>, DigestError> {
        let events = payload.messages();
        let first = events.first().and_then(|e| e.message.as_ref());
        let mut output = Vec::new();

        if let Some(options) = session.take_pending_options() {
            if let Some(text) = first.and_then(|m| m.text.as_deref()) {
                output.extend(self.match_pending_option(text, &options));
            }
        } else if let Some(attachments) = first.and_then(|m| m.attachments.as_deref()) {
            if session.chat_on_going().is_some() {
                output = self.fetch_attachments(attachments).await;
            }
        }

        if output.is_empty() {
            for event in events {
                output.extend(self.digest_event(event)?);
            }
        }
        Ok(output)
    }

    /// Canonical requests for one event.
    pub fn digest_event(&self, event: &MessagingEvent) -> Result<Vec<ApiRequest>, DigestError> {
        let classified = InboundEvent::classify(event)?;
        log::debug!("digest: inbound {:?} event", classified.kind());
        let requests = match classified {
            InboundEvent::Text(text) => vec![ApiRequest::Message(text.to_string())],
            InboundEvent::Postback(postback) => decode_payload(&postback.payload, "postback").into_iter().collect(),
            InboundEvent::QuickReply(reply) => decode_payload(&reply.payload, "quick reply").into_iter().collect(),
            InboundEvent::Sticker(attachments) => attachments
                .first()
                .and_then(EventAttachment::payload_url)
                .map(|url| ApiRequest::Message(url.to_string()))
                .into_iter()
                .collect(),
            InboundEvent::Attachment(attachments) => digest_attachments(attachments),
        };
        Ok(requests)
    }

    /// Match a typed reply against offered options by accent- and case-insensitive label.
    fn match_pending_option(&self, reply: &str, options: &[PendingOption]) -> Option<ApiRequest> {
        let reply = remove_accents_to_lower(reply);
        let mut is_escalation = false;
        let mut is_rating = false;
        let mut selected_escalation = None;
        let mut selected_rating = None;
        for option in options {
            if option.escalate.is_some() {
                is_escalation = true;
            } else if option.is_rating {
                is_rating = true;
            }
            if reply == remove_accents_to_lower(&self.lang.label(&option.label)) {
                if is_escalation {
                    selected_escalation = option.escalate;
                } else if is_rating {
                    selected_rating = option.payload.clone();
                }
                break;
            }
        }

        if is_escalation {
            return selected_escalation.map(|escalate| {
                if escalate {
                    ApiRequest::EscalateOption(true)
                } else {
                    ApiRequest::Message("no".to_string())
                }
            });
        }
        if is_rating {
            return selected_rating.map(ApiRequest::Rating);
        }
        None
    }

    /// Download attachments whose URL has an allowed extension for their kind, in order.
    async fn fetch_attachments(&self, attachments: &[EventAttachment]) -> Vec<ApiRequest> {
        let fetches = attachments.iter().filter_map(|attachment| {
            let url = attachment.payload_url()?;
            let kind = MediaKind::from_type(&attachment.kind)?;
            match kind.match_url(url) {
                Some(extension) => Some(self.fetch_media(kind, extension, url)),
                None => {
                    log::debug!("digest: skipping {} attachment with unsupported extension", kind.as_str());
                    None
                }
            }
        });
        join_all(fetches).await.into_iter().flatten().collect()
    }

    async fn fetch_media(&self, kind: MediaKind, extension: &str, url: &str) -> Option<ApiRequest> {
        let bytes = match self.fetcher.fetch(url).await {
            Ok(bytes) => bytes,
            Err(e) => {
                log::warn!("digest: attachment download failed: {}", e);
                return None;
            }
        };
        match MediaHandle::from_bytes(kind, extension, url, &bytes) {
            Ok(handle) => Some(ApiRequest::Media(handle)),
            Err(e) => {
                log::warn!("digest: storing attachment failed: {}", e);
                None
            }
        }
    }
}
