//! Bidirectional message digestion between Messenger and the conversational bot.
//!
//! Inbound, webhook events become canonical [`ApiRequest`]s; outbound, bot
//! [`ApiMessage`]s become Messenger [`ChannelPayload`]s. Rich answer markup goes through
//! the block parser, and choices are laid out as persistent buttons or quick replies.
//! The caller passes the user's [`Session`](crate::session::Session) to every call.

mod blocks;
mod buttons;
mod inbound;
mod outbound;
mod payload;
mod prompts;
mod request;
mod response;
mod text;

use std::sync::Arc;

pub use blocks::{parse_blocks, ContentBlock};
pub use buttons::{build_link_buttons, build_persistent, build_transient, ButtonOption, LinkOption};
pub use inbound::{InboundEvent, MessageKind};
pub use payload::{Attachment, Button, ChannelPayload, MediaPayload, QuickReply, TemplatePayload};
pub use request::{ApiRequest, ButtonAction, ButtonPayload, PendingOption, RatingData, RatingPayload, RatingValue};
pub use response::{ActionField, ApiMessage, ApiOption, BotResponse, ResponseKind};
pub use text::{clean_html, remove_accents_to_lower, strip_tags};

use crate::config::DigesterConfig;
use crate::lang::Lang;
use crate::media::MediaFetcher;

#[derive(Debug, thiserror::Error)]
pub enum DigestError {
    #[error("unknown Messenger message type")]
    UnknownMessageType,
    #[error("unknown bot API response: {0}")]
    UnknownApiResponse(String),
}

/// Digester for one Messenger page.
pub struct Digester {
    config: DigesterConfig,
    lang: Arc<Lang>,
    fetcher: Arc<dyn MediaFetcher>,
}

impl Digester {
    pub fn new(config: DigesterConfig, lang: Arc<Lang>, fetcher: Arc<dyn MediaFetcher>) -> Self {
        Self { config, lang, fetcher }
    }

    pub fn lang(&self) -> &Lang {
        &self.lang
    }
}
