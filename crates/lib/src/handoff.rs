//! Human-agent handoff: the chat backend the connector escalates conversations to.

use async_trait::async_trait;

use crate::media::MediaHandle;

#[derive(Debug, thiserror::Error)]
pub enum HandoffError {
    #[error("handoff request failed: {0}")]
    Request(String),
    #[error("chat {0} not found")]
    ChatNotFound(String),
}

/// User details sent when opening a chat.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatUser {
    pub name: String,
    pub email: String,
    /// Session key of the Messenger user (`fb-<pageId>-<senderId>`).
    pub external_id: String,
}

/// Human-agent chat backend. Implementations own transport and authentication.
#[async_trait]
pub trait HandoffClient: Send + Sync {
    async fn agents_available(&self) -> Result<bool, HandoffError>;

    /// Open a chat for `user` and return its id.
    async fn open_chat(&self, user: &ChatUser) -> Result<String, HandoffError>;

    /// False once the agent or the user has closed the chat.
    async fn is_chat_open(&self, chat_id: &str) -> Result<bool, HandoffError>;

    async fn send_message(&self, chat_id: &str, user: &ChatUser, text: &str) -> Result<(), HandoffError>;

    async fn send_media(&self, chat_id: &str, user: &ChatUser, media: &MediaHandle) -> Result<(), HandoffError>;
}
