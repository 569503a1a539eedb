//! Messenger Send API client.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::digest::ChannelPayload;

#[derive(Debug, thiserror::Error)]
pub enum MessengerError {
    #[error("messenger request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("messenger api error: {0}")]
    Api(String),
    #[error("page access token not configured")]
    MissingToken,
}

/// Public profile fields of a Messenger user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

impl UserProfile {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name).trim().to_string()
    }
}

/// Outgoing side of the channel.
#[async_trait]
pub trait ChannelSender: Send + Sync {
    /// Deliver one payload to the user with page-scoped id `recipient`.
    async fn send(&self, recipient: &str, payload: &ChannelPayload) -> Result<(), MessengerError>;

    async fn send_text(&self, recipient: &str, text: &str) -> Result<(), MessengerError> {
        self.send(recipient, &ChannelPayload::text(text)).await
    }

    /// Profile of `recipient`, when the channel can look it up.
    async fn user_profile(&self, _recipient: &str) -> Option<UserProfile> {
        None
    }
}

/// Graph API client for one page.
#[derive(Clone)]
pub struct MessengerClient {
    graph_api_base: String,
    page_access_token: Option<String>,
    client: reqwest::Client,
}

impl MessengerClient {
    pub fn new(graph_api_base: &str, page_access_token: Option<String>) -> Self {
        Self {
            graph_api_base: graph_api_base.trim_end_matches('/').to_string(),
            page_access_token,
            client: reqwest::Client::new(),
        }
    }

    fn token(&self) -> Result<&str, MessengerError> {
        self.page_access_token.as_deref().ok_or(MessengerError::MissingToken)
    }

    /// POST me/messages with an arbitrary body.
    async fn post_messages(&self, body: &serde_json::Value) -> Result<(), MessengerError> {
        let url = format!("{}/me/messages", self.graph_api_base);
        let res = self
            .client
            .post(&url)
            .query(&[("access_token", self.token()?)])
            .json(body)
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(MessengerError::Api(format!("{} {}", status, body)));
        }
        Ok(())
    }

    /// Show or hide the typing indicator.
    pub async fn show_typing(&self, recipient: &str, on: bool) -> Result<(), MessengerError> {
        let action = if on { "typing_on" } else { "typing_off" };
        self.post_messages(&json!({
            "recipient": { "id": recipient },
            "sender_action": action,
        }))
        .await
    }

    /// Send a message as a RESPONSE, preceded by the typing indicator.
    pub async fn send_message(&self, recipient: &str, payload: &ChannelPayload) -> Result<(), MessengerError> {
        if let Err(e) = self.show_typing(recipient, true).await {
            log::debug!("messenger: typing indicator failed: {}", e);
        }
        self.post_messages(&json!({
            "messaging_type": "RESPONSE",
            "recipient": { "id": recipient },
            "message": payload,
        }))
        .await
    }

    /// GET /<user id>?fields=first_name,last_name
    pub async fn get_user_profile(&self, user_id: &str) -> Result<UserProfile, MessengerError> {
        let url = format!("{}/{}", self.graph_api_base, user_id);
        let res = self
            .client
            .get(&url)
            .query(&[("fields", "first_name,last_name"), ("access_token", self.token()?)])
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(MessengerError::Api(format!("{} {}", status, body)));
        }
        Ok(res.json().await?)
    }
}

#[async_trait]
impl ChannelSender for MessengerClient {
    async fn send(&self, recipient: &str, payload: &ChannelPayload) -> Result<(), MessengerError> {
        self.send_message(recipient, payload).await
    }

    async fn user_profile(&self, recipient: &str) -> Option<UserProfile> {
        match self.get_user_profile(recipient).await {
            Ok(profile) => Some(profile),
            Err(e) => {
                log::warn!("messenger: profile lookup failed: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Query, State};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::Value;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    type Seen = Arc<Mutex<Vec<Value>>>;

    async fn record(
        State(seen): State<Seen>,
        Query(q): Query<HashMap<String, String>>,
        Json(body): Json<Value>,
    ) -> Json<Value> {
        assert_eq!(q.get("access_token").map(String::as_str), Some("page-token"));
        seen.lock().unwrap().push(body);
        Json(serde_json::json!({"recipient_id": "U"}))
    }

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn send_posts_typing_then_message() {
        let seen: Seen = Arc::new(Mutex::new(Vec::new()));
        let router = Router::new()
            .route("/me/messages", post(record))
            .with_state(seen.clone());
        let base = serve(router).await;
        let client = MessengerClient::new(&base, Some("page-token".to_string()));
        client.send_text("U", "hello").await.unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], serde_json::json!({"recipient": {"id": "U"}, "sender_action": "typing_on"}));
        assert_eq!(
            seen[1],
            serde_json::json!({"messaging_type": "RESPONSE", "recipient": {"id": "U"}, "message": {"text": "hello"}})
        );
    }

    #[tokio::test]
    async fn profile_lookup() {
        let router = Router::new().route(
            "/:id",
            get(|| async { Json(serde_json::json!({"first_name": "Ana", "last_name": "Diaz", "id": "U"})) }),
        );
        let base = serve(router).await;
        let client = MessengerClient::new(&base, Some("page-token".to_string()));
        let profile = client.user_profile("U").await.unwrap();
        assert_eq!(profile.full_name(), "Ana Diaz");
    }

    #[tokio::test]
    async fn missing_token_fails_before_sending() {
        let client = MessengerClient::new("http://127.0.0.1:9", None);
        assert!(matches!(
            client.send_text("U", "x").await,
            Err(MessengerError::MissingToken)
        ));
    }
}
