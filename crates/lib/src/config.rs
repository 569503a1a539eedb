//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.msgbridge/config.json`) and environment.
//! Secrets (page token, bot API credentials) may come from the environment instead of the file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Webhook server settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Messenger page credentials and Graph API endpoint.
    #[serde(default)]
    pub messenger: MessengerConfig,

    /// Conversational bot API credentials.
    #[serde(default)]
    pub bot: BotConfig,

    /// Attribute names the digester reads from bot answers.
    #[serde(default)]
    pub digester: DigesterConfig,

    /// Language and content-rating settings.
    #[serde(default)]
    pub conversation: ConversationConfig,

    /// Human-agent handoff settings.
    #[serde(default)]
    pub chat: ChatConfig,

    /// Per-key overrides for the bundled translation table.
    #[serde(default)]
    pub translations: HashMap<String, String>,
}

/// Webhook server bind and port.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Port for the webhook HTTP server (default 8080).
    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Bind address (default "127.0.0.1").
    #[serde(default = "default_gateway_bind")]
    pub bind: String,
}

fn default_gateway_port() -> u16 {
    8080
}

fn default_gateway_bind() -> String {
    "127.0.0.1".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_gateway_port(),
            bind: default_gateway_bind(),
        }
    }
}

/// Messenger page settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessengerConfig {
    /// Token echoed back during the webhook subscription handshake. Overridden by FB_VERIFY_TOKEN.
    pub verify_token: Option<String>,
    /// Page access token used for the Send API. Overridden by FB_PAGE_ACCESS_TOKEN.
    pub page_access_token: Option<String>,
    /// Graph API base URL.
    #[serde(default = "default_graph_api_base")]
    pub graph_api_base: String,
}

fn default_graph_api_base() -> String {
    "https://graph.facebook.com/v3.1".to_string()
}

impl Default for MessengerConfig {
    fn default() -> Self {
        Self {
            verify_token: None,
            page_access_token: None,
            graph_api_base: default_graph_api_base(),
        }
    }
}

/// Conversational bot API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BotConfig {
    /// Base URL of the bot API (e.g. "https://api.example.com"). Required to serve.
    pub api_base: Option<String>,
    /// API key. Overridden by BOT_API_KEY.
    pub api_key: Option<String>,
    /// API secret. Overridden by BOT_API_SECRET.
    pub api_secret: Option<String>,
    /// User type sent when a conversation starts.
    #[serde(default)]
    pub user_type: u32,
    /// Bot environment name sent when a conversation starts.
    #[serde(default = "default_bot_environment")]
    pub environment: String,
    /// Optional source tag for analytics.
    pub source: Option<String>,
}

fn default_bot_environment() -> String {
    "production".to_string()
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            api_base: None,
            api_key: None,
            api_secret: None,
            user_type: 0,
            environment: default_bot_environment(),
            source: None,
        }
    }
}

/// Attribute names consulted while rendering bot answers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DigesterConfig {
    /// Attribute holding a custom button title for multiple-choice options and sub-answers.
    #[serde(default = "default_button_title")]
    pub button_title: String,
    #[serde(default)]
    pub url_buttons: UrlButtonsConfig,
}

fn default_button_title() -> String {
    "FACEBOOK_BUTTON_TITLE".to_string()
}

impl Default for DigesterConfig {
    fn default() -> Self {
        Self {
            button_title: default_button_title(),
            url_buttons: UrlButtonsConfig::default(),
        }
    }
}

/// Where an answer declares a link-out button (title + URL pair).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UrlButtonsConfig {
    #[serde(default = "default_url_button_attribute")]
    pub attribute_name: String,
    #[serde(default = "default_url_button_title_var")]
    pub button_title_var: String,
    #[serde(default = "default_url_button_url_var")]
    pub button_url_var: String,
}

fn default_url_button_attribute() -> String {
    "FACEBOOK_URL_BUTTON".to_string()
}

fn default_url_button_title_var() -> String {
    "BUTTON_TITLE".to_string()
}

fn default_url_button_url_var() -> String {
    "BUTTON_URL".to_string()
}

impl Default for UrlButtonsConfig {
    fn default() -> Self {
        Self {
            attribute_name: default_url_button_attribute(),
            button_title_var: default_url_button_title_var(),
            button_url_var: default_url_button_url_var(),
        }
    }
}

/// Conversation language and content ratings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationConfig {
    /// Language code of the bundled translation table (default "en").
    #[serde(default = "default_lang")]
    pub lang: String,
    #[serde(default)]
    pub content_ratings: ContentRatingsConfig,
}

fn default_lang() -> String {
    "en".to_string()
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            lang: default_lang(),
            content_ratings: ContentRatingsConfig::default(),
        }
    }
}

/// Content ratings shown after rateable answers. The ratings must exist in the bot instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentRatingsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_ratings")]
    pub ratings: Vec<RatingOption>,
}

impl Default for ContentRatingsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            ratings: default_ratings(),
        }
    }
}

/// One rating choice: `label` is a translation key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingOption {
    pub id: i64,
    pub label: String,
    /// Ask the user for a comment after choosing this rating.
    #[serde(default)]
    pub comment: bool,
    #[serde(default)]
    pub is_negative: bool,
}

fn default_ratings() -> Vec<RatingOption> {
    vec![
        RatingOption {
            id: 1,
            label: "yes".to_string(),
            comment: false,
            is_negative: false,
        },
        RatingOption {
            id: 2,
            label: "no".to_string(),
            comment: true,
            is_negative: true,
        },
    ]
}

/// Human-agent handoff settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Consecutive no-result answers before offering an agent (0 = never).
    #[serde(default)]
    pub tries_before_escalation: u32,
    /// Negative content ratings before offering an agent (0 = never).
    #[serde(default)]
    pub negative_ratings_before_escalation: u32,
}

/// Read a non-empty env var, trimmed.
fn env_non_empty(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(|s| {
        let t = s.trim();
        if t.is_empty() {
            None
        } else {
            Some(t.to_string())
        }
    })
}

fn config_non_empty(value: Option<&String>) -> Option<String> {
    value.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Resolve the webhook verify token: env FB_VERIFY_TOKEN overrides config.
pub fn resolve_verify_token(config: &Config) -> Option<String> {
    env_non_empty("FB_VERIFY_TOKEN").or_else(|| config_non_empty(config.messenger.verify_token.as_ref()))
}

/// Resolve the page access token: env FB_PAGE_ACCESS_TOKEN overrides config.
pub fn resolve_page_access_token(config: &Config) -> Option<String> {
    env_non_empty("FB_PAGE_ACCESS_TOKEN")
        .or_else(|| config_non_empty(config.messenger.page_access_token.as_ref()))
}

/// Resolve bot API key and secret: env BOT_API_KEY / BOT_API_SECRET override config.
pub fn resolve_bot_credentials(config: &Config) -> Option<(String, String)> {
    let key = env_non_empty("BOT_API_KEY").or_else(|| config_non_empty(config.bot.api_key.as_ref()))?;
    let secret =
        env_non_empty("BOT_API_SECRET").or_else(|| config_non_empty(config.bot.api_secret.as_ref()))?;
    Some((key, secret))
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("MSGBRIDGE_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(".msgbridge").join("config.json"))
                .unwrap_or_else(|| PathBuf::from("config.json"))
        })
}

/// Load config from the given path, the default path, or MSGBRIDGE_CONFIG_PATH. Missing file => default config.
/// Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}
