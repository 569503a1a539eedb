//! Outbound digestion: bot response messages to Messenger payloads.

use serde_json::Value;

use super::blocks::{parse_blocks, ContentBlock};
use super::buttons::{build_link_buttons, build_persistent, build_transient, ButtonOption, LinkOption};
use super::payload::{Button, ChannelPayload};
use super::request::ButtonAction;
use super::response::{is_truthy, value_text, ActionField, ApiMessage, BotResponse, ResponseKind};
use super::text::{clean_html, strip_tags, truncate_chars};
use super::Digester;
use crate::session::Session;

/// Button sets and lists are capped at what a Messenger template shows.
const MAX_BUTTONS: usize = 3;
/// Button template text limit.
const TEMPLATE_TEXT_LIMIT: usize = 640;
const SIDE_BUBBLE_ATTRIBUTE: &str = "SIDEBUBBLE_TEXT";
const DATE_FORMAT_HINT: &str = " (date format: mm/dd/YYYY)";

/// Output of one answer-list entry before merging.
enum Rendered {
    Text(String),
    Payload(ChannelPayload),
}

impl Digester {
    /// Render a bot response as Messenger payloads, in message order. Messages with no
    /// text or an unknown type are skipped.
    pub fn digest_from_api(
        &self,
        response: &BotResponse,
        last_user_question: &str,
        session: &mut Session,
    ) -> Vec<ChannelPayload> {
        log::debug!(
            "digest: rendering {} bot message(s) for question {:?}",
            response.answers.len(),
            last_user_question
        );
        let mut output = Vec::new();
        for message in &response.answers {
            if message.message.as_deref().map_or(true, str::is_empty) {
                continue;
            }
            let Some(kind) = ResponseKind::classify(message) else {
                log::warn!("digest: skipping bot message of unknown type {:?}", message.kind);
                continue;
            };
            let payloads = match kind {
                ResponseKind::Answer => self.digest_answer(message),
                ResponseKind::PolarQuestion => vec![self.digest_polar_question(message)],
                ResponseKind::MultipleChoiceQuestion => vec![self.digest_multiple_choice(message)],
                ResponseKind::ExtendedContentsAnswer => vec![self.digest_extended_contents(message, session)],
            };
            output.extend(payloads);
        }
        output
    }

    fn digest_answer(&self, message: &ApiMessage) -> Vec<ChannelPayload> {
        let text = message.message.as_deref().unwrap_or_default();
        let url_attribute = &self.config.url_buttons.attribute_name;
        if let Some(url_button) = message.attribute(url_attribute).filter(|v| is_truthy(v)) {
            return vec![self.build_url_button_message(text, url_button)];
        }
        if let Some(field) = message.action_field.as_ref().filter(|f| f.field_type != "default") {
            if let Some(payload) = digest_action_field(text, field) {
                return vec![payload];
            }
        }

        let mut entries: Vec<String> = match &message.message_list {
            Some(list) if !list.is_empty() => list.clone(),
            None if !text.trim().is_empty() => vec![text.to_string()],
            _ => vec![String::new()],
        };
        if let Some(side) = message.attribute_text(SIDE_BUBBLE_ATTRIBUTE).filter(|s| !s.trim().is_empty()) {
            entries.push(side);
        }

        let mut output: Vec<ChannelPayload> = Vec::new();
        for entry in &entries {
            let rendered: Vec<Rendered> = parse_blocks(entry)
                .into_iter()
                .filter_map(|block| match block {
                    ContentBlock::Media { kind, url } if !url.is_empty() => {
                        Some(Rendered::Payload(ChannelPayload::media(kind, &url)))
                    }
                    ContentBlock::Media { .. } => None,
                    ContentBlock::Text(markup) => {
                        let text = clean_html(&markup);
                        (!text.trim().is_empty()).then_some(Rendered::Text(text))
                    }
                })
                .collect();
            merge_rendered(&mut output, rendered);
        }

        if output.is_empty() {
            return output;
        }
        if let Some(related) = related_content_buttons(message) {
            output.push(related);
        }
        output
    }

    /// Link-out button template, or the cleaned text when any button lacks a URL or title.
    fn build_url_button_message(&self, text: &str, url_button: &Value) -> ChannelPayload {
        let title_var = &self.config.url_buttons.button_title_var;
        let url_var = &self.config.url_buttons.button_url_var;
        let entries: Vec<&Value> = match url_button {
            Value::Array(items) => items.iter().collect(),
            other => vec![other],
        };
        let mut buttons = Vec::with_capacity(entries.len());
        for entry in entries {
            let url = entry.get(url_var.as_str()).and_then(value_text).filter(|s| !s.is_empty());
            let title = entry.get(title_var.as_str()).and_then(value_text).filter(|s| !s.is_empty());
            let (Some(url), Some(title)) = (url, title) else {
                return ChannelPayload::text(clean_html(text));
            };
            buttons.push(Button::WebUrl {
                url,
                title,
                webview_height_ratio: Some("full".to_string()),
            });
        }
        ChannelPayload::buttons(truncate_chars(&strip_tags(text), TEMPLATE_TEXT_LIMIT), buttons)
    }

    fn digest_polar_question(&self, message: &ApiMessage) -> ChannelPayload {
        let options: Vec<ButtonOption> = message
            .options
            .iter()
            .map(|o| ButtonOption::new(self.lang.label(&o.label), ButtonAction::Choice(o.value.clone())))
            .collect();
        build_transient(message.message.as_deref().unwrap_or_default(), &options)
    }

    /// Persistent buttons only when every option is a direct call; otherwise quick replies.
    fn digest_multiple_choice(&self, message: &ApiMessage) -> ChannelPayload {
        let is_multiple = message.has_flag("multiple-options");
        let title_attribute = &self.config.button_title;
        let mut all_direct = true;
        let options: Vec<ButtonOption> = message
            .options
            .iter()
            .take(MAX_BUTTONS)
            .map(|o| {
                let action = match o.link() {
                    Some(link) => ButtonAction::DirectCall(link.clone()),
                    None => {
                        all_direct = false;
                        ButtonAction::Choice(o.value.clone())
                    }
                };
                let custom_title = if is_multiple {
                    o.attributes.get(title_attribute.as_str()).and_then(value_text)
                } else {
                    None
                };
                ButtonOption::new(custom_title.unwrap_or_else(|| o.label.clone()), action)
            })
            .collect();
        let text = message.message.as_deref().unwrap_or_default();
        if all_direct {
            build_persistent(text, &options)
        } else {
            build_transient(text, &options)
        }
    }

    /// Caches the sub-answers for a later `extendedContentAnswer` selection, then offers
    /// the first ones as buttons. Any sub-answer with a URL turns the set into link buttons.
    fn digest_extended_contents(&self, message: &ApiMessage, session: &mut Session) -> ChannelPayload {
        session.set_federated_subanswers(&message.sub_answers);
        let title_attribute = &self.config.button_title;
        let mut has_link = false;
        let options: Vec<LinkOption> = message
            .sub_answers
            .iter()
            .take(MAX_BUTTONS)
            .enumerate()
            .map(|(index, sub)| {
                let generic_title = sub.attribute_text("title").unwrap_or_default();
                match sub.content_url() {
                    Some(url) => {
                        has_link = true;
                        LinkOption::Link {
                            title: generic_title,
                            url: url.to_string(),
                        }
                    }
                    None => {
                        let title = sub.attribute_text(title_attribute).unwrap_or(generic_title);
                        LinkOption::Postback(ButtonOption::new(title, ButtonAction::ExtendedContentAnswer(index)))
                    }
                }
            })
            .collect();
        let text = message.message.as_deref().unwrap_or_default();
        if has_link {
            return build_link_buttons(text, &options);
        }
        let postbacks: Vec<ButtonOption> = options
            .into_iter()
            .filter_map(|o| match o {
                LinkOption::Postback(option) => Some(option),
                LinkOption::Link { .. } => None,
            })
            .collect();
        build_persistent(text, &postbacks)
    }
}

/// Append one entry's rendered output. A text that is not the entry's first output joins the
/// previous payload when that payload is text (newline-separated unless it starts with one).
fn merge_rendered(output: &mut Vec<ChannelPayload>, rendered: Vec<Rendered>) {
    for (index, item) in rendered.into_iter().enumerate() {
        match item {
            Rendered::Payload(payload) => output.push(payload),
            Rendered::Text(text) => {
                if index > 0 {
                    if let Some(ChannelPayload::Text { text: previous }) = output.last_mut() {
                        if !text.starts_with('\n') {
                            previous.push('\n');
                        }
                        previous.push_str(&text);
                        continue;
                    }
                }
                output.push(ChannelPayload::text(text));
            }
        }
    }
}

fn digest_action_field(text: &str, field: &ActionField) -> Option<ChannelPayload> {
    match field.field_type.as_str() {
        "list" => {
            let options: Vec<ButtonOption> = field
                .list_values
                .as_ref()?
                .values
                .iter()
                .take(MAX_BUTTONS)
                .filter_map(|v| v.label.first())
                .map(|label| ButtonOption::new(label.clone(), ButtonAction::Message(label.clone())))
                .collect();
            (!options.is_empty()).then(|| build_persistent(text, &options))
        }
        "datePicker" => Some(ChannelPayload::text(clean_html(&format!("{}{}", text, DATE_FORMAT_HINT)))),
        _ => None,
    }
}

fn related_content_buttons(message: &ApiMessage) -> Option<ChannelPayload> {
    let related = message.related()?;
    let options: Vec<ButtonOption> = related
        .related_contents
        .iter()
        .take(MAX_BUTTONS)
        .map(|c| ButtonOption::new(c.title.clone(), ButtonAction::Message(c.title.clone())))
        .collect();
    (!options.is_empty()).then(|| build_persistent(&related.related_title, &options))
}
