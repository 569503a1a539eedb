//! Per-user conversation state carried between webhook deliveries.
//!
//! A session is a JSON key/value map keyed by the user's external id. The store hands
//! out one mutex per user; holding it for a whole delivery serialises access per user.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use crate::digest::{ApiMessage, PendingOption};

/// Session keys read and written by the digesters and the connector.
pub mod keys {
    pub const OPTIONS: &str = "options";
    pub const CHAT_ON_GOING: &str = "chatOnGoing";
    pub const FEDERATED_SUBANSWERS: &str = "federatedSubanswers";
    pub const LAST_USER_QUESTION: &str = "lastUserQuestion";
    pub const SESSION_TOKEN: &str = "sessionToken";
    pub const NO_RESULTS_COUNT: &str = "noResultsCount";
    pub const NEGATIVE_RATINGS_COUNT: &str = "negativeRatingsCount";
    pub const LAST_MESSAGES_ID: &str = "lastMessagesId";
}

/// Seconds a delivery id is remembered for duplicate detection.
const DELIVERY_MEMORY_SECS: i64 = 120;

/// Key/value state for one user.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    data: Map<String, Value>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Value at `key`, or `default` when absent.
    pub fn get_or(&self, key: &str, default: Value) -> Value {
        self.data.get(key).cloned().unwrap_or(default)
    }

    pub fn set(&mut self, key: &str, value: Value) {
        self.data.insert(key.to_string(), value);
    }

    pub fn has(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    pub fn delete(&mut self, key: &str) -> Option<Value> {
        self.data.remove(key)
    }

    fn get_typed<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.data
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    fn set_typed<T: Serialize>(&mut self, key: &str, value: &T) {
        match serde_json::to_value(value) {
            Ok(v) => self.set(key, v),
            Err(e) => log::warn!("session: failed to store {}: {}", key, e),
        }
    }

    /// Store the choices just offered so a free-text reply can be matched against them.
    pub fn set_pending_options(&mut self, options: &[PendingOption]) {
        self.set_typed(keys::OPTIONS, &options);
    }

    /// Remove and return the pending options. The key is deleted even when its value is unreadable.
    pub fn take_pending_options(&mut self) -> Option<Vec<PendingOption>> {
        let value = self.delete(keys::OPTIONS)?;
        match serde_json::from_value(value) {
            Ok(options) => Some(options),
            Err(e) => {
                log::warn!("session: discarding unreadable pending options: {}", e);
                Some(Vec::new())
            }
        }
    }

    pub fn has_pending_options(&self) -> bool {
        self.has(keys::OPTIONS)
    }

    /// Id of the ongoing human-agent chat, if any. `false`, `null`, `0` and "" mean none.
    pub fn chat_on_going(&self) -> Option<String> {
        match self.get(keys::CHAT_ON_GOING)? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) if n.as_f64() != Some(0.0) => Some(n.to_string()),
            Value::Bool(true) => Some("true".to_string()),
            _ => None,
        }
    }

    pub fn set_chat_on_going(&mut self, chat_id: &str) {
        self.set(keys::CHAT_ON_GOING, Value::String(chat_id.to_string()));
    }

    pub fn clear_chat_on_going(&mut self) {
        self.set(keys::CHAT_ON_GOING, Value::Bool(false));
    }

    pub fn federated_subanswers(&self) -> Vec<ApiMessage> {
        self.get_typed(keys::FEDERATED_SUBANSWERS).unwrap_or_default()
    }

    pub fn set_federated_subanswers(&mut self, sub_answers: &[ApiMessage]) {
        self.set_typed(keys::FEDERATED_SUBANSWERS, &sub_answers);
    }

    pub fn last_user_question(&self) -> String {
        self.get(keys::LAST_USER_QUESTION)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    }

    pub fn set_last_user_question(&mut self, question: &str) {
        self.set(keys::LAST_USER_QUESTION, Value::String(question.to_string()));
    }

    pub fn session_token(&self) -> Option<String> {
        self.get(keys::SESSION_TOKEN)
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    pub fn set_session_token(&mut self, token: &str) {
        self.set(keys::SESSION_TOKEN, Value::String(token.to_string()));
    }

    pub fn counter(&self, key: &str) -> u32 {
        self.get(key)
            .and_then(Value::as_u64)
            .map(|n| n as u32)
            .unwrap_or(0)
    }

    pub fn set_counter(&mut self, key: &str, value: u32) {
        self.set(key, Value::from(value));
    }

    /// Record a delivery id (the first event's timestamp) seen at `now` (unix seconds).
    /// Returns false when the id was already seen within the memory window. Entries
    /// older than the window are pruned.
    pub fn remember_delivery(&mut self, delivery_id: i64, now: i64) -> bool {
        let mut seen: Vec<(i64, i64)> = self.get_typed(keys::LAST_MESSAGES_ID).unwrap_or_default();
        seen.retain(|(at, _)| now - DELIVERY_MEMORY_SECS <= *at);
        if seen.iter().any(|(_, id)| *id == delivery_id) {
            self.set_typed(keys::LAST_MESSAGES_ID, &seen);
            return false;
        }
        seen.push((now, delivery_id));
        self.set_typed(keys::LAST_MESSAGES_ID, &seen);
        true
    }
}

/// In-memory session store: external user id -> session behind a per-user lock.
pub struct SessionStore {
    inner: Arc<RwLock<HashMap<String, Arc<Mutex<Session>>>>>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Return the session for `external_id`, creating an empty one if needed.
    /// Lock the returned mutex for the duration of one delivery.
    pub async fn acquire(&self, external_id: &str) -> Arc<Mutex<Session>> {
        if let Some(session) = self.inner.read().await.get(external_id) {
            return session.clone();
        }
        let mut g = self.inner.write().await;
        g.entry(external_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(Session::new())))
            .clone()
    }

    pub async fn remove(&self, external_id: &str) {
        self.inner.write().await.remove(external_id);
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}
