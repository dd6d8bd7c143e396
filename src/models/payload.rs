//! Log and API-response payloads submitted for PHI evaluation.
//!
//! Every section is optional and every field is kept as a raw JSON value so
//! that an unexpected shape makes a check not apply rather than failing the
//! whole request.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The `log` section of a payload.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct LogRecord {
    /// Source language of the emitting application (`log.language`).
    pub language: Value,
    /// Log message; may be any JSON value (`log.message`).
    pub message: Value,
    /// Structured fields attached to the log line (`log.fields`).
    pub fields: Value,
}

/// The `response` section of a payload.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct ResponseRecord {
    /// Structured response fields (`response.fields`).
    pub fields: Value,
    /// Response body; a mapping contributes field names, anything is scanned as text.
    pub body: Value,
}

/// Log line and/or API response content to be checked.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(from = "Value")]
pub struct LogPayload {
    /// Log section, if supplied.
    pub log: Option<LogRecord>,
    /// Response section, if supplied.
    pub response: Option<ResponseRecord>,
}

impl LogPayload {
    /// Build a payload from a raw request body.
    ///
    /// A body carrying a `log` or `response` key is taken as-is. Any other
    /// object is treated as the `log` section itself, so `{"message": "x"}`
    /// and `{"log": {"message": "x"}}` are equivalent.
    #[must_use]
    pub fn from_request(raw: &Value) -> Self {
        let Value::Object(map) = raw else {
            return Self::default();
        };

        if map.contains_key("log") || map.contains_key("response") {
            Self {
                log: map.get("log").and_then(LogRecord::from_value),
                response: map.get("response").and_then(ResponseRecord::from_value),
            }
        } else {
            Self {
                log: LogRecord::from_value(raw),
                response: None,
            }
        }
    }
}

impl From<Value> for LogPayload {
    fn from(raw: Value) -> Self {
        Self::from_request(&raw)
    }
}

impl LogRecord {
    fn from_value(value: &Value) -> Option<Self> {
        let map = value.as_object()?;
        let field = |key: &str| map.get(key).cloned().unwrap_or(Value::Null);
        Some(Self {
            language: field("language"),
            message: field("message"),
            fields: field("fields"),
        })
    }

    /// Language name, if it is a string.
    #[must_use]
    pub fn language(&self) -> Option<&str> {
        self.language.as_str()
    }

    /// Message text, stringifying non-string messages as JSON.
    #[must_use]
    pub fn message_text(&self) -> Option<Cow<'_, str>> {
        stringify(&self.message)
    }
}

impl ResponseRecord {
    fn from_value(value: &Value) -> Option<Self> {
        let map = value.as_object()?;
        let field = |key: &str| map.get(key).cloned().unwrap_or(Value::Null);
        Some(Self {
            fields: field("fields"),
            body: field("body"),
        })
    }

    /// Body text, stringifying non-string bodies as JSON.
    #[must_use]
    pub fn body_text(&self) -> Option<Cow<'_, str>> {
        stringify(&self.body)
    }
}

/// Field names carried by a `fields`-like value.
///
/// Mappings contribute their keys; sequences contribute their string items.
#[must_use]
pub fn field_names(value: &Value) -> Vec<&str> {
    match value {
        Value::Object(map) => map.keys().map(String::as_str).collect(),
        Value::Array(items) => items.iter().filter_map(Value::as_str).collect(),
        _ => Vec::new(),
    }
}

fn stringify(value: &Value) -> Option<Cow<'_, str>> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(Cow::Borrowed(s.as_str())),
        other => serde_json::to_string(other).ok().map(Cow::Owned),
    }
}
