//! Chatbot API client: conversation start, messages and tracking events over HTTPS.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{BotClient, BotError};
use crate::config::BotConfig;

const SESSION_EXPIRED: &str = "Session expired";

/// HTTP client for the Chatbot API.
#[derive(Clone)]
pub struct ChatbotApiClient {
    base_url: String,
    api_key: String,
    api_secret: String,
    user_type: u32,
    environment: String,
    source: Option<String>,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StartConversationRequest<'a> {
    user_type: u32,
    environment: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    source: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartConversationResponse {
    session_token: String,
}

impl ChatbotApiClient {
    pub fn new(base_url: &str, api_key: String, api_secret: String, config: &BotConfig) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            api_secret,
            user_type: config.user_type,
            environment: config.environment.clone(),
            source: config.source.clone(),
            client: reqwest::Client::new(),
        }
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .post(format!("{}{}", self.base_url, path))
            .header("x-inbenta-key", &self.api_key)
            .bearer_auth(&self.api_secret)
    }

    fn with_session(builder: reqwest::RequestBuilder, session_token: &str) -> reqwest::RequestBuilder {
        builder.header("x-inbenta-session", format!("Bearer {}", session_token))
    }

    /// Map a non-success response to an error; a 400 "Session expired" becomes `SessionExpired`.
    async fn check(res: reqwest::Response) -> Result<reqwest::Response, BotError> {
        let status = res.status();
        if status.is_success() {
            return Ok(res);
        }
        let body = res.text().await.unwrap_or_default();
        let message = error_message(&body).unwrap_or(body);
        if status.as_u16() == 400 && message == SESSION_EXPIRED {
            return Err(BotError::SessionExpired);
        }
        Err(BotError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

/// `message` of an API error body, either top-level or the first of `errors`.
fn error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    value
        .get("message")
        .or_else(|| value.get("errors")?.get(0)?.get("message"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[async_trait]
impl BotClient for ChatbotApiClient {
    /// POST /v1/conversation
    async fn start_conversation(&self) -> Result<String, BotError> {
        let body = StartConversationRequest {
            user_type: self.user_type,
            environment: &self.environment,
            source: self.source.as_deref(),
        };
        let res = self.post("/v1/conversation").json(&body).send().await?;
        let data: StartConversationResponse = Self::check(res).await?.json().await?;
        log::info!("bot: conversation started");
        Ok(data.session_token)
    }

    /// POST /v1/conversation/message
    async fn send_message(&self, session_token: &str, request: &Value) -> Result<Value, BotError> {
        let res = Self::with_session(self.post("/v1/conversation/message"), session_token)
            .json(request)
            .send()
            .await?;
        Ok(Self::check(res).await?.json().await?)
    }

    /// POST /v1/tracking/events
    async fn track_event(&self, session_token: &str, event: &Value) -> Result<(), BotError> {
        let res = Self::with_session(self.post("/v1/tracking/events"), session_token)
            .json(event)
            .send()
            .await?;
        Self::check(res).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::json;

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn client(base: &str) -> ChatbotApiClient {
        ChatbotApiClient::new(base, "key".to_string(), "secret".to_string(), &BotConfig::default())
    }

    #[test]
    fn error_message_shapes() {
        assert_eq!(error_message(r#"{"message":"Session expired"}"#).as_deref(), Some("Session expired"));
        assert_eq!(
            error_message(r#"{"errors":[{"message":"Bad input","code":1}]}"#).as_deref(),
            Some("Bad input")
        );
        assert_eq!(error_message("oops"), None);
    }

    #[tokio::test]
    async fn conversation_and_message_round_trip() {
        let router = Router::new()
            .route(
                "/v1/conversation",
                post(|headers: HeaderMap, Json(body): Json<Value>| async move {
                    assert_eq!(headers.get("x-inbenta-key").unwrap(), "key");
                    assert_eq!(headers.get("authorization").unwrap(), "Bearer secret");
                    assert_eq!(body["environment"], "production");
                    Json(json!({"sessionToken": "tok"}))
                }),
            )
            .route(
                "/v1/conversation/message",
                post(|headers: HeaderMap, Json(body): Json<Value>| async move {
                    assert_eq!(headers.get("x-inbenta-session").unwrap(), "Bearer tok");
                    Json(json!({"answers": [{"type": "answer", "message": format!("echo {}", body["message"].as_str().unwrap_or(""))}]}))
                }),
            );
        let base = serve(router).await;
        let bot = client(&base);
        let token = bot.start_conversation().await.unwrap();
        assert_eq!(token, "tok");
        let reply = bot.send_message(&token, &json!({"message": "hi"})).await.unwrap();
        assert_eq!(reply["answers"][0]["message"], "echo hi");
    }

    #[tokio::test]
    async fn expired_session_is_distinguished() {
        let router = Router::new().route(
            "/v1/conversation/message",
            post(|| async { (StatusCode::BAD_REQUEST, Json(json!({"message": "Session expired"}))) }),
        );
        let base = serve(router).await;
        let err = client(&base).send_message("old", &json!({"message": "hi"})).await.unwrap_err();
        assert!(matches!(err, BotError::SessionExpired));
    }

    #[tokio::test]
    async fn other_errors_keep_status() {
        let router = Router::new().route(
            "/v1/tracking/events",
            post(|| async { (StatusCode::UNAUTHORIZED, "denied") }),
        );
        let base = serve(router).await;
        let err = client(&base).track_event("tok", &json!({"type": "rate"})).await.unwrap_err();
        assert!(matches!(err, BotError::Api { status: 401, .. }));
    }
}
