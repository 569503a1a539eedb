//! Canonical bot requests and the opaque payloads carried by channel buttons.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::media::MediaHandle;

/// What a button or quick reply asks the bot to do when selected.
/// Serialized as a single-key object, e.g. `{"option": 1}` or `{"escalateOption": true}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ButtonAction {
    /// Send this text to the bot as if the user typed it.
    Message(String),
    /// Answer a question option by value.
    #[serde(rename = "option")]
    Choice(Value),
    /// Follow a revisitable content link.
    DirectCall(Value),
    /// Index into the cached `federatedSubanswers`.
    ExtendedContentAnswer(usize),
    EscalateOption(bool),
}

/// Rating choice payload, echoed back verbatim when the user picks a rating.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingPayload {
    pub ask_rating_comment: bool,
    pub is_negative_rating: bool,
    pub rating_data: RatingData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingData {
    /// Tracking event type, always "rate".
    #[serde(rename = "type")]
    pub kind: String,
    pub data: RatingValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingValue {
    pub code: String,
    pub value: i64,
    pub comment: Option<String>,
}

impl RatingPayload {
    pub fn new(rate_code: &str, rating_id: i64, ask_comment: bool, is_negative: bool) -> Self {
        Self {
            ask_rating_comment: ask_comment,
            is_negative_rating: is_negative,
            rating_data: RatingData {
                kind: "rate".to_string(),
                data: RatingValue {
                    code: rate_code.to_string(),
                    value: rating_id,
                    comment: None,
                },
            },
        }
    }
}

/// Anything a button can carry. Ratings are tried first since an action is a single-key object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ButtonPayload {
    Rating(RatingPayload),
    Action(ButtonAction),
}

impl ButtonPayload {
    /// Stable JSON text sent as the channel button payload.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            log::warn!("digest: failed to serialize button payload: {}", e);
            String::new()
        })
    }
}

impl From<ButtonAction> for ButtonPayload {
    fn from(action: ButtonAction) -> Self {
        ButtonPayload::Action(action)
    }
}

impl From<RatingPayload> for ButtonPayload {
    fn from(rating: RatingPayload) -> Self {
        ButtonPayload::Rating(rating)
    }
}

/// One canonical request for the bot side, produced from inbound channel events.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiRequest {
    Message(String),
    Choice(Value),
    DirectCall(Value),
    ExtendedContentAnswer(usize),
    EscalateOption(bool),
    Rating(RatingPayload),
    /// Downloaded attachment for an ongoing human-agent chat.
    Media(MediaHandle),
}

impl ApiRequest {
    /// Plain user text, if this request is one.
    pub fn text(&self) -> Option<&str> {
        match self {
            ApiRequest::Message(text) => Some(text),
            _ => None,
        }
    }

    /// JSON form; media handles render as their temporary file path.
    pub fn to_value(&self) -> Value {
        match self {
            ApiRequest::Message(text) => json!({ "message": text }),
            ApiRequest::Choice(value) => json!({ "option": value }),
            ApiRequest::DirectCall(value) => json!({ "directCall": value }),
            ApiRequest::ExtendedContentAnswer(index) => json!({ "extendedContentAnswer": index }),
            ApiRequest::EscalateOption(escalate) => json!({ "escalateOption": escalate }),
            ApiRequest::Rating(rating) => serde_json::to_value(rating).unwrap_or(Value::Null),
            ApiRequest::Media(handle) => json!({
                "media": handle.path().display().to_string(),
                "type": handle.kind,
            }),
        }
    }
}

impl From<ButtonAction> for ApiRequest {
    fn from(action: ButtonAction) -> Self {
        match action {
            ButtonAction::Message(text) => ApiRequest::Message(text),
            ButtonAction::Choice(value) => ApiRequest::Choice(value),
            ButtonAction::DirectCall(value) => ApiRequest::DirectCall(value),
            ButtonAction::ExtendedContentAnswer(index) => ApiRequest::ExtendedContentAnswer(index),
            ButtonAction::EscalateOption(escalate) => ApiRequest::EscalateOption(escalate),
        }
    }
}

impl From<ButtonPayload> for ApiRequest {
    fn from(payload: ButtonPayload) -> Self {
        match payload {
            ButtonPayload::Rating(rating) => ApiRequest::Rating(rating),
            ButtonPayload::Action(action) => action.into(),
        }
    }
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// A choice offered to the user that a typed reply may select, kept in the session
/// until the next inbound delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingOption {
    /// Translation key or display text compared against the reply.
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalate: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<RatingPayload>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_rating: bool,
}

impl PendingOption {
    pub fn escalation(label: &str, escalate: bool) -> Self {
        Self {
            label: label.to_string(),
            escalate: Some(escalate),
            payload: None,
            is_rating: false,
        }
    }

    pub fn rating(label: &str, payload: RatingPayload) -> Self {
        Self {
            label: label.to_string(),
            escalate: None,
            payload: Some(payload),
            is_rating: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actions_serialize_as_single_key_objects() {
        let p: ButtonPayload = ButtonAction::Choice(json!(3)).into();
        assert_eq!(p.to_json(), r#"{"option":3}"#);
        let p: ButtonPayload = ButtonAction::EscalateOption(true).into();
        assert_eq!(p.to_json(), r#"{"escalateOption":true}"#);
        let p: ButtonPayload = ButtonAction::ExtendedContentAnswer(1).into();
        assert_eq!(p.to_json(), r#"{"extendedContentAnswer":1}"#);
        let p: ButtonPayload = ButtonAction::Message("Hours".to_string()).into();
        assert_eq!(p.to_json(), r#"{"message":"Hours"}"#);
    }

    #[test]
    fn rating_payload_wire_shape() {
        let p: ButtonPayload = RatingPayload::new("abc", 2, true, true).into();
        assert_eq!(
            p.to_json(),
            r#"{"askRatingComment":true,"isNegativeRating":true,"ratingData":{"type":"rate","data":{"code":"abc","value":2,"comment":null}}}"#
        );
    }

    #[test]
    fn payloads_decode_back_to_requests() {
        let rating = RatingPayload::new("abc", 1, false, false);
        let text = ButtonPayload::from(rating.clone()).to_json();
        let decoded: ButtonPayload = serde_json::from_str(&text).unwrap();
        assert_eq!(ApiRequest::from(decoded), ApiRequest::Rating(rating));

        let decoded: ButtonPayload = serde_json::from_str(r#"{"directCall":"sys-welcome"}"#).unwrap();
        assert_eq!(ApiRequest::from(decoded), ApiRequest::DirectCall(json!("sys-welcome")));

        assert!(serde_json::from_str::<ButtonPayload>(r#"{"bogus":1}"#).is_err());
    }

    #[test]
    fn pending_option_omits_unused_fields() {
        let v = serde_json::to_value(PendingOption::escalation("yes", true)).unwrap();
        assert_eq!(v, json!({ "label": "yes", "escalate": true }));
        let back: PendingOption = serde_json::from_value(v).unwrap();
        assert_eq!(back.escalate, Some(true));
        assert!(!back.is_rating);
    }

    #[test]
    fn request_json_form() {
        assert_eq!(ApiRequest::Message("hi".into()).to_value(), json!({ "message": "hi" }));
        assert_eq!(ApiRequest::Choice(json!(1)).to_value(), json!({ "option": 1 }));
        assert_eq!(ApiRequest::Message("hi".into()).text(), Some("hi"));
        assert_eq!(ApiRequest::EscalateOption(true).text(), None);
    }
}
