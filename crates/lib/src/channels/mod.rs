//! Messenger channel: webhook wire types, the subscription handshake and the Send API client.

mod client;
mod messenger;

pub use client::{ChannelSender, MessengerClient, MessengerError, UserProfile};
pub use messenger::{
    check_request, external_id, verify_subscription, AttachmentPayload, EventAttachment, EventMessage,
    MessagingEvent, Participant, Postback, QuickReplyEvent, VerifyQuery, WebhookEntry, WebhookPayload,
};
