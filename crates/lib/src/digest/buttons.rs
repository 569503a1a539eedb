//! Persistent buttons and transient quick replies built from a uniform option list.

use super::payload::{Button, ChannelPayload, QuickReply};
use super::request::ButtonPayload;
use super::text::strip_tags;

/// One selectable choice: the visible title and the payload echoed back on selection.
#[derive(Debug, Clone, PartialEq)]
pub struct ButtonOption {
    pub title: String,
    pub payload: ButtonPayload,
}

impl ButtonOption {
    pub fn new(title: impl Into<String>, payload: impl Into<ButtonPayload>) -> Self {
        Self {
            title: title.into(),
            payload: payload.into(),
        }
    }
}

/// A button in a mixed set: an external link or a postback option.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkOption {
    Link { title: String, url: String },
    Postback(ButtonOption),
}

fn postback(option: &ButtonOption) -> Button {
    Button::Postback {
        title: option.title.clone(),
        payload: option.payload.to_json(),
    }
}

/// Button template whose buttons stay on the conversation.
pub fn build_persistent(text: &str, options: &[ButtonOption]) -> ChannelPayload {
    ChannelPayload::buttons(strip_tags(text), options.iter().map(postback).collect())
}

/// Text with quick replies that disappear once one is picked.
pub fn build_transient(text: &str, options: &[ButtonOption]) -> ChannelPayload {
    ChannelPayload::QuickReplies {
        text: strip_tags(text),
        quick_replies: options
            .iter()
            .map(|o| QuickReply {
                content_type: "text".to_string(),
                title: o.title.clone(),
                payload: o.payload.to_json(),
            })
            .collect(),
    }
}

/// Button template mixing link-out buttons with postback buttons.
pub fn build_link_buttons(text: &str, options: &[LinkOption]) -> ChannelPayload {
    let buttons = options
        .iter()
        .map(|o| match o {
            LinkOption::Link { title, url } => Button::WebUrl {
                url: url.clone(),
                title: title.clone(),
                webview_height_ratio: None,
            },
            LinkOption::Postback(option) => postback(option),
        })
        .collect();
    ChannelPayload::buttons(strip_tags(text), buttons)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::payload::Attachment;
    use crate::digest::request::ButtonAction;
    use serde_json::json;

    fn options() -> Vec<ButtonOption> {
        vec![
            ButtonOption::new("One", ButtonAction::Choice(json!(1))),
            ButtonOption::new("Two", ButtonAction::Choice(json!(2))),
        ]
    }

    #[test]
    fn persistent_buttons_are_postbacks() {
        let p = build_persistent("<p>Choose</p>", &options());
        assert_eq!(
            serde_json::to_value(&p).unwrap(),
            json!({"attachment": {"type": "template", "payload": {
                "template_type": "button",
                "text": "Choose",
                "buttons": [
                    {"type": "postback", "title": "One", "payload": "{\"option\":1}"},
                    {"type": "postback", "title": "Two", "payload": "{\"option\":2}"}
                ]
            }}})
        );
    }

    #[test]
    fn transient_buttons_are_quick_replies() {
        let p = build_transient("Choose <b>one</b>", &options());
        assert_eq!(
            serde_json::to_value(&p).unwrap(),
            json!({
                "text": "Choose one",
                "quick_replies": [
                    {"content_type": "text", "title": "One", "payload": "{\"option\":1}"},
                    {"content_type": "text", "title": "Two", "payload": "{\"option\":2}"}
                ]
            })
        );
    }

    #[test]
    fn payload_serialization_is_stable() {
        let a = build_transient("x", &options());
        let b = build_transient("x", &options());
        assert_eq!(serde_json::to_string(&a).unwrap(), serde_json::to_string(&b).unwrap());
    }

    #[test]
    fn link_buttons_mix_urls_and_postbacks() {
        let p = build_link_buttons(
            "Read more",
            &[
                LinkOption::Link {
                    title: "Docs".to_string(),
                    url: "https://x/docs".to_string(),
                },
                LinkOption::Postback(ButtonOption::new("Other", ButtonAction::ExtendedContentAnswer(1))),
            ],
        );
        let ChannelPayload::Attachment {
            attachment: Attachment::Template(template),
        } = p
        else {
            panic!("expected template");
        };
        assert_eq!(
            template.buttons,
            vec![
                Button::WebUrl {
                    url: "https://x/docs".to_string(),
                    title: "Docs".to_string(),
                    webview_height_ratio: None,
                },
                Button::Postback {
                    title: "Other".to_string(),
                    payload: r#"{"extendedContentAnswer":1}"#.to_string(),
                },
            ]
        );
    }
}
