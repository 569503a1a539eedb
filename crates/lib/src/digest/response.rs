//! Canonical bot response messages.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::DigestError;

/// Kinds of bot message the outbound digester renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    Answer,
    PolarQuestion,
    MultipleChoiceQuestion,
    ExtendedContentsAnswer,
}

impl ResponseKind {
    pub fn from_type(kind: &str) -> Option<Self> {
        match kind {
            "answer" => Some(ResponseKind::Answer),
            "polarQuestion" => Some(ResponseKind::PolarQuestion),
            "multipleChoiceQuestion" => Some(ResponseKind::MultipleChoiceQuestion),
            "extendedContentsAnswer" => Some(ResponseKind::ExtendedContentsAnswer),
            _ => None,
        }
    }

    /// Kind of `message` by its declared type tag.
    pub fn classify(message: &ApiMessage) -> Option<Self> {
        message.kind.as_deref().and_then(Self::from_type)
    }
}

/// One bot message. Unknown fields are kept so cached sub-answers round-trip intact.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiMessage {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_list: Option<Vec<String>>,
    /// Free-form key/value attributes; anything but an object reads as empty.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub attributes: Value,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<ApiOption>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sub_answers: Vec<ApiMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_field: Option<ActionField>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Parameters>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ApiMessage {
    /// Plain answer with the given text, used for connector-generated messages.
    pub fn answer(text: &str) -> Self {
        Self {
            kind: Some("answer".to_string()),
            message: Some(text.to_string()),
            ..Default::default()
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    /// Attribute as text; strings as-is, other scalars via their JSON form.
    pub fn attribute_text(&self, name: &str) -> Option<String> {
        self.attribute(name).and_then(value_text)
    }

    pub fn has_flag(&self, flag: &str) -> bool {
        self.flags.iter().any(|f| f == flag)
    }

    fn contents(&self) -> Option<&Contents> {
        self.parameters.as_ref()?.contents.as_ref()
    }

    /// External URL of a federated content, if any.
    pub fn content_url(&self) -> Option<&str> {
        self.contents()?.url.as_ref().map(|u| u.value.as_str())
    }

    pub fn related(&self) -> Option<&Related> {
        self.contents()?.related.as_ref()
    }

    /// Rate code when the message carries a tracking code.
    pub fn rate_code(&self) -> Option<String> {
        self.contents()?.tracking_code.as_ref().map(|t| t.rate_code.clone().unwrap_or_default())
    }
}

/// Text of a scalar JSON value; null, arrays and objects yield None.
pub(crate) fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiOption {
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revisitable_link: Option<Value>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub attributes: Value,
}

impl ApiOption {
    /// Revisitable link when present and truthy.
    pub fn link(&self) -> Option<&Value> {
        self.revisitable_link.as_ref().filter(|v| is_truthy(v))
    }
}

/// Loose truthiness of a JSON value: null, false, 0, "", "0", [] and {} are false.
pub(crate) fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64() != Some(0.0),
        Value::String(s) => !s.is_empty() && s != "0",
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionField {
    #[serde(default)]
    pub field_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list_values: Option<ListValues>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListValues {
    #[serde(default)]
    pub values: Vec<ListValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListValue {
    #[serde(default)]
    pub label: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Parameters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contents: Option<Contents>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contents {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<UrlValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related: Option<Related>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracking_code: Option<TrackingCode>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UrlValue {
    #[serde(default)]
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Related {
    #[serde(default)]
    pub related_title: String,
    #[serde(default)]
    pub related_contents: Vec<RelatedContent>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelatedContent {
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingCode {
    #[serde(default)]
    pub rate_code: Option<String>,
}

/// A bot reply: either an `answers` batch or one message.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BotResponse {
    pub answers: Vec<ApiMessage>,
}

impl BotResponse {
    pub fn single(message: ApiMessage) -> Self {
        Self {
            answers: vec![message],
        }
    }

    /// Read a raw bot reply. Batch entries that fail to decode are dropped with a warning;
    /// a reply that is neither a batch nor a recognised single message is an error.
    pub fn from_value(value: Value) -> Result<Self, DigestError> {
        if let Some(Value::Array(items)) = value.get("answers") {
            let answers = items
                .iter()
                .filter_map(|item| match serde_json::from_value::<ApiMessage>(item.clone()) {
                    Ok(m) => Some(m),
                    Err(e) => {
                        log::warn!("digest: skipping unreadable bot message: {}", e);
                        None
                    }
                })
                .collect();
            return Ok(Self { answers });
        }
        let recognised = value
            .get("type")
            .and_then(Value::as_str)
            .and_then(ResponseKind::from_type)
            .is_some();
        if recognised {
            if let Ok(message) = serde_json::from_value::<ApiMessage>(value.clone()) {
                return Ok(Self::single(message));
            }
        }
        Err(DigestError::UnknownApiResponse(value.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn classify_by_type_tag() {
        let m: ApiMessage = serde_json::from_value(json!({"type": "polarQuestion", "message": "?"})).unwrap();
        assert_eq!(ResponseKind::classify(&m), Some(ResponseKind::PolarQuestion));
        let m: ApiMessage = serde_json::from_value(json!({"type": "survey", "message": "?"})).unwrap();
        assert_eq!(ResponseKind::classify(&m), None);
        assert_eq!(ResponseKind::classify(&ApiMessage::default()), None);
    }

    #[test]
    fn batch_and_single_replies() {
        let batch = BotResponse::from_value(json!({
            "answers": [
                {"type": "answer", "message": "a"},
                {"type": "answer", "message": 5},
                {"type": "answer", "message": "b"}
            ]
        }))
        .unwrap();
        assert_eq!(batch.answers.len(), 2);

        let single = BotResponse::from_value(json!({"type": "answer", "message": "x"})).unwrap();
        assert_eq!(single.answers[0].message.as_deref(), Some("x"));

        assert!(matches!(
            BotResponse::from_value(json!({"foo": 1})),
            Err(DigestError::UnknownApiResponse(_))
        ));
    }

    #[test]
    fn nested_parameters_are_read() {
        let m: ApiMessage = serde_json::from_value(json!({
            "type": "answer",
            "message": "m",
            "flags": ["no-results"],
            "parameters": {"contents": {
                "url": {"value": "https://x"},
                "trackingCode": {"rateCode": "rc"},
                "related": {"relatedTitle": "See also", "relatedContents": [{"id": 1, "title": "A"}]}
            }},
            "attributes": {"title": "T", "N": 3}
        }))
        .unwrap();
        assert_eq!(m.content_url(), Some("https://x"));
        assert_eq!(m.rate_code().as_deref(), Some("rc"));
        assert_eq!(m.related().map(|r| r.related_contents.len()), Some(1));
        assert!(m.has_flag("no-results"));
        assert_eq!(m.attribute_text("title").as_deref(), Some("T"));
        assert_eq!(m.attribute_text("N").as_deref(), Some("3"));
        assert_eq!(m.attribute_text("missing"), None);
    }

    #[test]
    fn unknown_fields_survive_round_trip() {
        let raw = json!({"type": "answer", "message": "m", "id": 12, "score": 0.5});
        let m: ApiMessage = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(serde_json::to_value(&m).unwrap(), raw);
    }

    #[test]
    fn truthiness() {
        assert!(!is_truthy(&json!(null)));
        assert!(!is_truthy(&json!("")));
        assert!(!is_truthy(&json!("0")));
        assert!(!is_truthy(&json!(0)));
        assert!(is_truthy(&json!("sys-1")));
        assert!(is_truthy(&json!(7)));
    }
}
