//! Connector: runs one webhook delivery through the digester, the bot and the channel.
//!
//! The user's session is locked for the whole delivery. Deliveries seen in the last two
//! minutes are dropped. With a human chat ongoing, user messages go to the handoff backend
//! instead of the bot.

use anyhow::{Context, Result};
use std::sync::Arc;

use crate::bot::{BotClient, BotError, ChatbotApiClient};
use crate::channels::{ChannelSender, MessengerClient, WebhookPayload};
use crate::config::{self, Config};
use crate::digest::{ApiRequest, BotResponse, ChannelPayload, Digester, RatingPayload, ResponseKind};
use crate::handoff::{ChatUser, HandoffClient, HandoffError};
use crate::lang::Lang;
use crate::media::HttpMediaFetcher;
use crate::session::{keys, Session, SessionStore};

/// Flags the answers emit.
const FLAG_NO_RESULTS: &str = "no-results";
const FLAG_ESCALATE: &str = "escalate";

/// Email domain for the synthetic address handed to the agent backend.
const USER_EMAIL_DOMAIN: &str = "facebook.com";

/// What a delivery still needs once every request has been handled.
#[derive(Debug, Default)]
struct Followup {
    escalate: bool,
    rate_code: Option<String>,
}

pub struct Connector {
    config: Config,
    digester: Digester,
    bot: Arc<dyn BotClient>,
    channel: Arc<dyn ChannelSender>,
    handoff: Option<Arc<dyn HandoffClient>>,
    sessions: SessionStore,
}

impl Connector {
    pub fn new(
        config: Config,
        digester: Digester,
        bot: Arc<dyn BotClient>,
        channel: Arc<dyn ChannelSender>,
        handoff: Option<Arc<dyn HandoffClient>>,
    ) -> Self {
        Self {
            config,
            digester,
            bot,
            channel,
            handoff,
            sessions: SessionStore::new(),
        }
    }

    /// Wire the HTTP collaborators from config. No handoff backend is attached.
    pub fn from_config(config: Config) -> Result<Self> {
        let lang = Lang::load(&config.conversation.lang, &config.translations)
            .with_context(|| format!("loading language '{}'", config.conversation.lang))?;
        log::info!("connector: replying in '{}'", lang.code());
        let api_base = config
            .bot
            .api_base
            .clone()
            .filter(|s| !s.trim().is_empty())
            .context("bot.apiBase is not configured")?;
        let (key, secret) = config::resolve_bot_credentials(&config).ok_or(BotError::MissingCredentials)?;
        let bot = ChatbotApiClient::new(&api_base, key, secret, &config.bot);
        let page_token = config::resolve_page_access_token(&config);
        if page_token.is_none() {
            log::warn!("connector: no page access token; replies will fail");
        }
        let channel = MessengerClient::new(&config.messenger.graph_api_base, page_token);
        let digester = Digester::new(config.digester.clone(), Arc::new(lang), Arc::new(HttpMediaFetcher::new()));
        Ok(Self::new(config, digester, Arc::new(bot), Arc::new(channel), None))
    }

    /// Attach a human-agent backend.
    pub fn with_handoff(mut self, handoff: Arc<dyn HandoffClient>) -> Self {
        self.handoff = Some(handoff);
        self
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn digester(&self) -> &Digester {
        &self.digester
    }

    /// Process one webhook delivery end to end.
    pub async fn handle_webhook(&self, payload: &WebhookPayload) -> Result<()> {
        let (Some(external_id), Some(sender)) = (payload.external_id(), payload.sender_id()) else {
            log::warn!("connector: delivery without page or sender id ignored");
            return Ok(());
        };
        let lock = self.sessions.acquire(&external_id).await;
        let mut session = lock.lock().await;

        if let Some(delivery_id) = payload.delivery_id() {
            if !session.remember_delivery(delivery_id, chrono::Utc::now().timestamp()) {
                log::info!("connector: duplicate delivery {} dropped", delivery_id);
                return Ok(());
            }
        }

        if let Some((handoff, chat_id)) = self.ongoing_chat(&mut session).await {
            return self
                .forward_to_chat(handoff.as_ref(), &chat_id, payload, sender, &external_id, &mut session)
                .await;
        }

        let requests = self.digester.digest_to_api(payload, &mut session).await?;
        let mut followup = Followup::default();
        for request in requests {
            self.handle_request(request, sender, &external_id, &mut session, &mut followup)
                .await?;
        }

        if followup.escalate && session.chat_on_going().is_none() {
            let prompt = self.digester.build_escalation_message(&mut session)?;
            self.send(sender, &prompt).await;
            session.set_counter(keys::NO_RESULTS_COUNT, 0);
        } else if let Some(rate_code) = followup.rate_code {
            if session.chat_on_going().is_none() && !session.has_pending_options() {
                let prompt = self.digester.build_content_ratings_message(
                    &self.config.conversation.content_ratings.ratings,
                    &rate_code,
                    &mut session,
                )?;
                self.send(sender, &prompt).await;
            }
        }
        Ok(())
    }

    async fn handle_request(
        &self,
        request: ApiRequest,
        sender: &str,
        external_id: &str,
        session: &mut Session,
        followup: &mut Followup,
    ) -> Result<()> {
        let response = match request {
            ApiRequest::EscalateOption(true) => return self.escalate(sender, external_id, session).await,
            ApiRequest::EscalateOption(false) => return self.send_translated(sender, "escalation_rejected").await,
            ApiRequest::Rating(rating) => return self.rate(rating, sender, session, followup).await,
            ApiRequest::Media(handle) => {
                log::debug!("connector: no chat ongoing, attachment {} dropped", handle.source_url);
                return Ok(());
            }
            ApiRequest::ExtendedContentAnswer(index) => {
                let Some(mut answer) = session.federated_subanswers().into_iter().nth(index) else {
                    log::warn!("connector: no cached sub-answer at index {}", index);
                    return Ok(());
                };
                answer.kind = Some("answer".to_string());
                BotResponse::single(answer)
            }
            request => {
                if let Some(text) = request.text() {
                    log::debug!("connector: user asked {:?}", text);
                    session.set_last_user_question(text);
                }
                let raw = self.ask_bot(session, &request.to_value()).await?;
                BotResponse::from_value(raw)?
            }
        };

        if self.check_escalation(&response, session) {
            followup.escalate = true;
        }
        if let Some(rate_code) = self.check_content_ratings(&response) {
            followup.rate_code = Some(rate_code);
        }

        let payloads = self
            .digester
            .digest_from_api(&response, &session.last_user_question(), session);
        for payload in &payloads {
            self.send(sender, payload).await;
        }
        Ok(())
    }

    /// Send a request to the bot, starting a conversation when the session has none and
    /// restarting it once when the bot reports it expired.
    async fn ask_bot(&self, session: &mut Session, request: &serde_json::Value) -> Result<serde_json::Value, BotError> {
        let token = match session.session_token() {
            Some(token) => token,
            None => self.start_conversation(session).await?,
        };
        match self.bot.send_message(&token, request).await {
            Err(BotError::SessionExpired) => {
                log::info!("connector: bot session expired, restarting conversation");
                let token = self.start_conversation(session).await?;
                self.bot.send_message(&token, request).await
            }
            other => other,
        }
    }

    async fn start_conversation(&self, session: &mut Session) -> Result<String, BotError> {
        let token = self.bot.start_conversation().await?;
        session.set_session_token(&token);
        Ok(token)
    }

    async fn rate(
        &self,
        rating: RatingPayload,
        sender: &str,
        session: &mut Session,
        followup: &mut Followup,
    ) -> Result<()> {
        let event = serde_json::to_value(&rating.rating_data)?;
        let token = match session.session_token() {
            Some(token) => token,
            None => self.start_conversation(session).await?,
        };
        if let Err(e) = self.bot.track_event(&token, &event).await {
            log::warn!("connector: rating not tracked: {}", e);
        }
        self.send_translated(sender, "thanks").await?;
        if rating.ask_rating_comment {
            self.send_translated(sender, "ask_rating_comment").await?;
        }
        if rating.is_negative_rating {
            let threshold = self.config.chat.negative_ratings_before_escalation;
            let count = session.counter(keys::NEGATIVE_RATINGS_COUNT) + 1;
            if self.config.chat.enabled && threshold > 0 && count >= threshold {
                followup.escalate = true;
                session.set_counter(keys::NEGATIVE_RATINGS_COUNT, 0);
            } else {
                session.set_counter(keys::NEGATIVE_RATINGS_COUNT, count);
            }
        }
        Ok(())
    }

    /// Update the no-results streak; true when the answers ask for an agent.
    fn check_escalation(&self, response: &BotResponse, session: &mut Session) -> bool {
        if !self.config.chat.enabled {
            return false;
        }
        let tries = self.config.chat.tries_before_escalation;
        let mut escalate = false;
        for message in &response.answers {
            let count = if message.has_flag(FLAG_NO_RESULTS) {
                session.counter(keys::NO_RESULTS_COUNT) + 1
            } else {
                0
            };
            session.set_counter(keys::NO_RESULTS_COUNT, count);
            if message.has_flag(FLAG_ESCALATE) || (tries > 0 && count >= tries) {
                escalate = true;
            }
        }
        escalate
    }

    /// Rate code to offer ratings for: every message must be a rateable answer.
    fn check_content_ratings(&self, response: &BotResponse) -> Option<String> {
        if !self.config.conversation.content_ratings.enabled || response.answers.is_empty() {
            return None;
        }
        let mut rate_code = None;
        for message in &response.answers {
            if ResponseKind::classify(message) != Some(ResponseKind::Answer) {
                return None;
            }
            rate_code = Some(message.rate_code()?);
        }
        rate_code
    }

    /// Hand the user to a human agent when one is available.
    async fn escalate(&self, sender: &str, external_id: &str, session: &mut Session) -> Result<()> {
        let handoff = self.handoff.as_ref().filter(|_| self.config.chat.enabled);
        let available = match handoff {
            Some(h) => h.agents_available().await.unwrap_or_else(|e| {
                log::warn!("connector: agent availability check failed: {}", e);
                false
            }),
            None => false,
        };
        let Some(handoff) = handoff.filter(|_| available) else {
            log::info!("connector: escalation for {} found no agents", external_id);
            return self.send_translated(sender, "no_agents").await;
        };

        self.send_translated(sender, "creating_chat").await?;
        let user = self.chat_user(sender, external_id).await;
        match handoff.open_chat(&user).await {
            Ok(chat_id) => {
                log::info!("connector: chat {} opened for {}", chat_id, external_id);
                session.set_chat_on_going(&chat_id);
                Ok(())
            }
            Err(e) => {
                log::warn!("connector: opening chat failed: {}", e);
                self.send_translated(sender, "error_creating_chat").await
            }
        }
    }

    async fn chat_user(&self, sender: &str, external_id: &str) -> ChatUser {
        let name = self
            .channel
            .user_profile(sender)
            .await
            .map(|p| p.full_name())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| external_id.to_string());
        ChatUser {
            name,
            email: format!("{}@{}", external_id, USER_EMAIL_DOMAIN),
            external_id: external_id.to_string(),
        }
    }

    /// Handoff backend and chat id while a chat is open. A closed chat is cleared.
    async fn ongoing_chat(&self, session: &mut Session) -> Option<(Arc<dyn HandoffClient>, String)> {
        let handoff = self.handoff.as_ref().filter(|_| self.config.chat.enabled)?;
        let chat_id = session.chat_on_going()?;
        match handoff.is_chat_open(&chat_id).await {
            Ok(true) => Some((handoff.clone(), chat_id)),
            Ok(false) | Err(HandoffError::ChatNotFound(_)) => {
                log::info!("connector: chat {} closed, back to the bot", chat_id);
                session.clear_chat_on_going();
                None
            }
            Err(e) => {
                log::warn!("connector: chat {} status unknown: {}", chat_id, e);
                Some((handoff.clone(), chat_id))
            }
        }
    }

    async fn forward_to_chat(
        &self,
        handoff: &dyn HandoffClient,
        chat_id: &str,
        payload: &WebhookPayload,
        sender: &str,
        external_id: &str,
        session: &mut Session,
    ) -> Result<()> {
        let requests = self.digester.digest_to_api(payload, session).await?;
        let user = ChatUser {
            name: external_id.to_string(),
            email: format!("{}@{}", external_id, USER_EMAIL_DOMAIN),
            external_id: external_id.to_string(),
        };
        log::debug!("connector: forwarding {} message(s) from {} to chat {}", requests.len(), sender, chat_id);
        for request in requests {
            let sent = match &request {
                ApiRequest::Media(handle) => handoff.send_media(chat_id, &user, handle).await,
                ApiRequest::Message(text) => handoff.send_message(chat_id, &user, text).await,
                other => {
                    log::debug!("connector: {:?} not forwarded to chat", other);
                    Ok(())
                }
            };
            if let Err(e) = sent {
                log::warn!("connector: forwarding to chat {} failed: {}", chat_id, e);
            }
        }
        Ok(())
    }

    async fn send_translated(&self, recipient: &str, key: &str) -> Result<()> {
        let text = self.digester.lang().translate(key, &[])?;
        if let Err(e) = self.channel.send_text(recipient, &text).await {
            log::warn!("connector: send to {} failed: {}", recipient, e);
        }
        Ok(())
    }

    async fn send(&self, recipient: &str, payload: &ChannelPayload) {
        if let Err(e) = self.channel.send(recipient, payload).await {
            log::warn!("connector: send to {} failed: {}", recipient, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::{MessengerError, UserProfile};
    use crate::digest::tests::digester;
    use crate::media::MediaHandle;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::Mutex;

    /// Bot answering from a closure and recording requests.
    struct FakeBot {
        reply: Box<dyn Fn(&Value) -> Value + Send + Sync>,
        expire_first: Mutex<bool>,
        requests: Mutex<Vec<(String, Value)>>,
        events: Mutex<Vec<Value>>,
        starts: Mutex<u32>,
    }

    impl FakeBot {
        fn new(reply: impl Fn(&Value) -> Value + Send + Sync + 'static) -> Arc<Self> {
            Arc::new(Self {
                reply: Box::new(reply),
                expire_first: Mutex::new(false),
                requests: Mutex::new(Vec::new()),
                events: Mutex::new(Vec::new()),
                starts: Mutex::new(0),
            })
        }

        fn answering(text: &'static str) -> Arc<Self> {
            Self::new(move |_| json!({"answers": [{"type": "answer", "message": text}]}))
        }
    }

    #[async_trait]
    impl BotClient for FakeBot {
        async fn start_conversation(&self) -> Result<String, BotError> {
            let mut starts = self.starts.lock().unwrap();
            *starts += 1;
            Ok(format!("token-{}", starts))
        }

        async fn send_message(&self, session_token: &str, request: &Value) -> Result<Value, BotError> {
            {
                let mut expire = self.expire_first.lock().unwrap();
                if *expire {
                    *expire = false;
                    return Err(BotError::SessionExpired);
                }
            }
            self.requests
                .lock()
                .unwrap()
                .push((session_token.to_string(), request.clone()));
            Ok((self.reply)(request))
        }

        async fn track_event(&self, _session_token: &str, event: &Value) -> Result<(), BotError> {
            self.events.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingChannel {
        sent: Mutex<Vec<(String, Value)>>,
    }

    impl RecordingChannel {
        fn payloads(&self) -> Vec<Value> {
            self.sent.lock().unwrap().iter().map(|(_, p)| p.clone()).collect()
        }

        fn texts(&self) -> Vec<String> {
            self.payloads()
                .iter()
                .filter_map(|p| p["text"].as_str().map(str::to_string))
                .collect()
        }
    }

    #[async_trait]
    impl ChannelSender for RecordingChannel {
        async fn send(&self, recipient: &str, payload: &ChannelPayload) -> Result<(), MessengerError> {
            self.sent
                .lock()
                .unwrap()
                .push((recipient.to_string(), serde_json::to_value(payload).unwrap()));
            Ok(())
        }

        async fn user_profile(&self, _recipient: &str) -> Option<UserProfile> {
            Some(UserProfile {
                first_name: "Ana".to_string(),
                last_name: "Diaz".to_string(),
            })
        }
    }

    struct FakeHandoff {
        agents: bool,
        open: Mutex<bool>,
        opened: Mutex<Vec<ChatUser>>,
        messages: Mutex<Vec<String>>,
    }

    impl FakeHandoff {
        fn new(agents: bool) -> Arc<Self> {
            Arc::new(Self {
                agents,
                open: Mutex::new(true),
                opened: Mutex::new(Vec::new()),
                messages: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl HandoffClient for FakeHandoff {
        async fn agents_available(&self) -> Result<bool, HandoffError> {
            Ok(self.agents)
        }

        async fn open_chat(&self, user: &ChatUser) -> Result<String, HandoffError> {
            self.opened.lock().unwrap().push(user.clone());
            Ok("chat-1".to_string())
        }

        async fn is_chat_open(&self, _chat_id: &str) -> Result<bool, HandoffError> {
            Ok(*self.open.lock().unwrap())
        }

        async fn send_message(&self, _chat_id: &str, _user: &ChatUser, text: &str) -> Result<(), HandoffError> {
            self.messages.lock().unwrap().push(text.to_string());
            Ok(())
        }

        async fn send_media(&self, _chat_id: &str, _user: &ChatUser, media: &MediaHandle) -> Result<(), HandoffError> {
            self.messages.lock().unwrap().push(media.source_url.clone());
            Ok(())
        }
    }

    fn connector(config: Config, bot: Arc<FakeBot>, channel: Arc<RecordingChannel>) -> Connector {
        Connector::new(config, digester(), bot, channel, None)
    }

    fn webhook(timestamp: i64, message: Value) -> WebhookPayload {
        serde_json::from_value(json!({
            "object": "page",
            "entry": [{
                "id": "PAGE",
                "time": timestamp,
                "messaging": [{
                    "sender": {"id": "USER"},
                    "recipient": {"id": "PAGE"},
                    "timestamp": timestamp,
                    "message": message
                }]
            }]
        }))
        .unwrap()
    }

    fn text(timestamp: i64, text: &str) -> WebhookPayload {
        webhook(timestamp, json!({"mid": "m", "text": text}))
    }

    fn quick_reply(timestamp: i64, payload: &str) -> WebhookPayload {
        webhook(timestamp, json!({"mid": "m", "text": "x", "quick_reply": {"payload": payload}}))
    }

    fn chat_config() -> Config {
        let mut config = Config::default();
        config.chat.enabled = true;
        config
    }

    #[tokio::test]
    async fn text_goes_to_bot_and_answer_to_user() {
        let bot = FakeBot::answering("Hello there");
        let channel = Arc::new(RecordingChannel::default());
        let c = connector(Config::default(), bot.clone(), channel.clone());
        c.handle_webhook(&text(1, "hi")).await.unwrap();

        let requests = bot.requests.lock().unwrap().clone();
        assert_eq!(requests, vec![("token-1".to_string(), json!({"message": "hi"}))]);
        assert_eq!(channel.texts(), vec!["Hello there"]);
        assert_eq!(channel.sent.lock().unwrap()[0].0, "USER");

        let session = c.sessions().acquire("fb-PAGE-USER").await;
        assert_eq!(session.lock().await.last_user_question(), "hi");
    }

    #[tokio::test]
    async fn duplicate_delivery_is_dropped() {
        let bot = FakeBot::answering("once");
        let channel = Arc::new(RecordingChannel::default());
        let c = connector(Config::default(), bot.clone(), channel.clone());
        c.handle_webhook(&text(42, "hi")).await.unwrap();
        c.handle_webhook(&text(42, "hi")).await.unwrap();
        assert_eq!(bot.requests.lock().unwrap().len(), 1);
        assert_eq!(channel.texts(), vec!["once"]);
    }

    #[tokio::test]
    async fn expired_bot_session_is_restarted_once() {
        let bot = FakeBot::answering("fresh");
        let channel = Arc::new(RecordingChannel::default());
        let c = connector(Config::default(), bot.clone(), channel.clone());
        c.handle_webhook(&text(1, "first")).await.unwrap();
        *bot.expire_first.lock().unwrap() = true;
        c.handle_webhook(&text(2, "second")).await.unwrap();

        assert_eq!(*bot.starts.lock().unwrap(), 2);
        let requests = bot.requests.lock().unwrap().clone();
        assert_eq!(requests[1].0, "token-2");
        assert_eq!(channel.texts(), vec!["fresh", "fresh"]);
    }

    #[tokio::test]
    async fn rateable_answer_is_followed_by_ratings_prompt() {
        let bot = FakeBot::new(|_| {
            json!({"answers": [{
                "type": "answer",
                "message": "Open 9 to 5",
                "parameters": {"contents": {"trackingCode": {"rateCode": "RC1"}}}
            }]})
        });
        let channel = Arc::new(RecordingChannel::default());
        let mut config = Config::default();
        config.conversation.content_ratings.enabled = true;
        let c = connector(config, bot, channel.clone());
        c.handle_webhook(&text(1, "hours")).await.unwrap();

        let payloads = channel.payloads();
        assert_eq!(payloads.len(), 2);
        assert_eq!(payloads[1]["text"], "Was this answer helpful?");
        assert_eq!(payloads[1]["quick_replies"].as_array().unwrap().len(), 2);
        let session = c.sessions().acquire("fb-PAGE-USER").await;
        assert!(session.lock().await.has_pending_options());
    }

    #[tokio::test]
    async fn later_unrateable_event_keeps_earlier_rate_code() {
        let bot = FakeBot::new(|request| {
            if request["message"] == "hours" {
                json!({"answers": [{
                    "type": "answer",
                    "message": "Open 9 to 5",
                    "parameters": {"contents": {"trackingCode": {"rateCode": "RC1"}}}
                }]})
            } else {
                json!({"answers": [{"type": "answer", "message": "You're welcome"}]})
            }
        });
        let channel = Arc::new(RecordingChannel::default());
        let mut config = Config::default();
        config.conversation.content_ratings.enabled = true;
        let c = connector(config, bot.clone(), channel.clone());
        let batch: WebhookPayload = serde_json::from_value(json!({
            "object": "page",
            "entry": [{
                "id": "PAGE",
                "time": 1,
                "messaging": [
                    {"sender": {"id": "USER"}, "recipient": {"id": "PAGE"}, "timestamp": 1,
                     "message": {"mid": "m1", "text": "hours"}},
                    {"sender": {"id": "USER"}, "recipient": {"id": "PAGE"}, "timestamp": 2,
                     "message": {"mid": "m2", "text": "thanks"}}
                ]
            }]
        }))
        .unwrap();
        c.handle_webhook(&batch).await.unwrap();

        assert_eq!(bot.requests.lock().unwrap().len(), 2);
        assert_eq!(
            channel.texts(),
            vec!["Open 9 to 5", "You're welcome", "Was this answer helpful?"]
        );
    }

    #[tokio::test]
    async fn typed_rating_is_tracked_and_thanked() {
        let bot = FakeBot::answering("unused");
        let channel = Arc::new(RecordingChannel::default());
        let mut config = Config::default();
        config.conversation.content_ratings.enabled = true;
        let c = connector(config.clone(), bot.clone(), channel.clone());
        {
            let session = c.sessions().acquire("fb-PAGE-USER").await;
            let mut session = session.lock().await;
            c.digester()
                .build_content_ratings_message(&config.conversation.content_ratings.ratings, "RC1", &mut session)
                .unwrap();
        }
        c.handle_webhook(&text(1, "no")).await.unwrap();

        assert!(bot.requests.lock().unwrap().is_empty());
        assert_eq!(
            bot.events.lock().unwrap().clone(),
            vec![json!({"type": "rate", "data": {"code": "RC1", "value": 2, "comment": null}})]
        );
        assert_eq!(channel.texts(), vec!["Thanks!", "Please tell us why"]);
    }

    #[tokio::test]
    async fn no_results_streak_asks_to_escalate() {
        let bot = FakeBot::new(|_| json!({"answers": [{"type": "answer", "message": "Sorry", "flags": ["no-results"]}]}));
        let channel = Arc::new(RecordingChannel::default());
        let mut config = chat_config();
        config.chat.tries_before_escalation = 2;
        let c = connector(config, bot, channel.clone());

        c.handle_webhook(&text(1, "a")).await.unwrap();
        assert_eq!(channel.texts(), vec!["Sorry"]);
        c.handle_webhook(&text(2, "b")).await.unwrap();
        assert_eq!(
            channel.texts(),
            vec!["Sorry", "Sorry", "Do you want to start a chat with a human agent?"]
        );
        let session = c.sessions().acquire("fb-PAGE-USER").await;
        assert_eq!(session.lock().await.counter(keys::NO_RESULTS_COUNT), 0);
    }

    #[tokio::test]
    async fn escalation_without_agents_says_so() {
        let bot = FakeBot::answering("unused");
        let channel = Arc::new(RecordingChannel::default());
        let c = Connector::new(chat_config(), digester(), bot, channel.clone(), Some(FakeHandoff::new(false) as Arc<dyn HandoffClient>));
        c.handle_webhook(&quick_reply(1, r#"{"escalateOption":true}"#)).await.unwrap();
        let lang = c.digester().lang();
        assert_eq!(channel.texts(), vec![lang.translate("no_agents", &[]).unwrap()]);
    }

    #[tokio::test]
    async fn escalation_opens_chat_and_forwards_messages() {
        let bot = FakeBot::answering("unused");
        let channel = Arc::new(RecordingChannel::default());
        let handoff = FakeHandoff::new(true);
        let c = Connector::new(chat_config(), digester(), bot.clone(), channel.clone(), Some(handoff.clone() as Arc<dyn HandoffClient>));

        c.handle_webhook(&quick_reply(1, r#"{"escalateOption":true}"#)).await.unwrap();
        let lang = c.digester().lang();
        assert_eq!(channel.texts(), vec![lang.translate("creating_chat", &[]).unwrap()]);
        let opened = handoff.opened.lock().unwrap().clone();
        assert_eq!(
            opened,
            vec![ChatUser {
                name: "Ana Diaz".to_string(),
                email: "fb-PAGE-USER@facebook.com".to_string(),
                external_id: "fb-PAGE-USER".to_string(),
            }]
        );

        c.handle_webhook(&text(2, "is anyone there?")).await.unwrap();
        assert_eq!(handoff.messages.lock().unwrap().clone(), vec!["is anyone there?"]);
        assert!(bot.requests.lock().unwrap().is_empty());

        *handoff.open.lock().unwrap() = false;
        c.handle_webhook(&text(3, "back to bot")).await.unwrap();
        assert_eq!(bot.requests.lock().unwrap().len(), 1);
        let session = c.sessions().acquire("fb-PAGE-USER").await;
        assert_eq!(session.lock().await.chat_on_going(), None);
    }

    #[tokio::test]
    async fn declined_escalation_is_acknowledged() {
        let bot = FakeBot::answering("unused");
        let channel = Arc::new(RecordingChannel::default());
        let c = connector(chat_config(), bot.clone(), channel.clone());
        c.handle_webhook(&quick_reply(1, r#"{"escalateOption":false}"#)).await.unwrap();
        assert!(bot.requests.lock().unwrap().is_empty());
        assert_eq!(channel.texts(), vec!["I'll be waiting for your answers."]);
    }

    #[tokio::test]
    async fn extended_content_answer_uses_cached_sub_answer() {
        let bot = FakeBot::new(|_| {
            json!({"answers": [{
                "type": "extendedContentsAnswer",
                "message": "Pick one",
                "subAnswers": [
                    {"type": "answer", "message": "First detail", "attributes": {"title": "First"}},
                    {"type": "answer", "message": "Second detail", "attributes": {"title": "Second"}}
                ]
            }]})
        });
        let channel = Arc::new(RecordingChannel::default());
        let c = connector(Config::default(), bot.clone(), channel.clone());
        c.handle_webhook(&text(1, "details")).await.unwrap();
        c.handle_webhook(&quick_reply(2, r#"{"extendedContentAnswer":1}"#)).await.unwrap();

        assert_eq!(bot.requests.lock().unwrap().len(), 1);
        assert_eq!(channel.texts().last().map(String::as_str), Some("Second detail"));
    }
}
