//! Deployment artifact submitted for gatekeeper evaluation.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::walk_path;

/// One infrastructure/deployment unit (Terraform resource set,
/// Kubernetes/Helm manifest, container image descriptor).
///
/// Read-only to the engine; `content` and `metadata` are arbitrary nested
/// mappings whose shape is only interpreted by the checks that apply.
/// Deserialization never fails on shape: a missing or null `type`/`name`
/// becomes empty, and any other non-string is kept as its JSON text.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(from = "Value")]
pub struct Artifact {
    /// Artifact type (`terraform`, `kubernetes`, `helm`, `container_image`).
    #[serde(rename = "type")]
    pub kind: String,
    /// Artifact name used when reporting violations.
    pub name: String,
    /// Type-specific body.
    pub content: Value,
    /// Free-form metadata; `metadata.annotations` carries annotations.
    pub metadata: Value,
}

impl From<Value> for Artifact {
    fn from(raw: Value) -> Self {
        let Value::Object(mut map) = raw else {
            return Self::default();
        };
        let mut take = |key: &str| map.remove(key).unwrap_or(Value::Null);
        Self {
            kind: text(take("type")),
            name: text(take("name")),
            content: take("content"),
            metadata: take("metadata"),
        }
    }
}

fn text(value: Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s,
        other => other.to_string(),
    }
}

impl Artifact {
    /// Resolve a dotted path rooted at `content`, `metadata`, `name`, or `type`.
    #[must_use]
    pub fn lookup(&self, path: &str) -> Option<Cow<'_, Value>> {
        let mut segments = path.split('.');
        let root = segments.next()?;
        match root {
            "content" => walk_path(&self.content, segments).map(Cow::Borrowed),
            "metadata" => walk_path(&self.metadata, segments).map(Cow::Borrowed),
            "name" if segments.next().is_none() => Some(Cow::Owned(Value::String(self.name.clone()))),
            "type" if segments.next().is_none() => Some(Cow::Owned(Value::String(self.kind.clone()))),
            _ => None,
        }
    }
}

/// Path roots an artifact lookup understands.
pub const LOOKUP_ROOTS: &[&str] = &["content", "metadata", "name", "type"];
