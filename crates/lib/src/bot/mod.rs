//! Conversational bot backend: the client trait the connector talks to and its HTTP implementation.

mod chatbot_api;

use async_trait::async_trait;
use serde_json::Value;

pub use chatbot_api::ChatbotApiClient;

#[derive(Debug, thiserror::Error)]
pub enum BotError {
    #[error("bot request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("bot api error: {status} {message}")]
    Api { status: u16, message: String },
    #[error("bot session expired")]
    SessionExpired,
    #[error("bot api credentials not configured")]
    MissingCredentials,
}

/// Conversation lifecycle against the bot API.
#[async_trait]
pub trait BotClient: Send + Sync {
    /// Open a conversation and return its session token.
    async fn start_conversation(&self) -> Result<String, BotError>;

    /// Send one canonical request body (e.g. `{"message": "hi"}`) and return the raw reply.
    async fn send_message(&self, session_token: &str, request: &Value) -> Result<Value, BotError>;

    /// Record a tracking event (e.g. a content rating).
    async fn track_event(&self, session_token: &str, event: &Value) -> Result<(), BotError>;
}
