//! On-disk rule document format.
//!
//! A document is JSON or TOML; every section is optional. Unknown keys are
//! rejected so that a misspelled section fails loudly instead of silently
//! contributing nothing.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;

/// One rule-definition file.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct RuleDocument {
    /// Language name → disallowed substring.
    #[serde(default, alias = "debugPatterns")]
    pub debug_patterns: BTreeMap<String, String>,
    /// Substrings tested against field names.
    #[serde(default, alias = "phiFieldKeywords")]
    pub phi_field_keywords: Vec<String>,
    /// Patterns tested against message-like content.
    #[serde(default, alias = "phiRegexes")]
    pub phi_regexes: Vec<RegexDefinition>,
    /// Declarative artifact requirements.
    #[serde(default, alias = "gatekeeperChecks")]
    pub gatekeeper_checks: Vec<CheckDefinition>,
}

/// `{name, pattern, message}` PHI pattern definition.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RegexDefinition {
    /// Pattern name.
    pub name: String,
    /// Regular expression source; compiled case-insensitively.
    pub pattern: String,
    /// Message reported on match.
    pub message: String,
}

fn default_artifact_type() -> String {
    "*".into()
}

fn default_message_template() -> String {
    "{type} '{name}' violates {rule_id}".into()
}

/// `{appliesWhen, requiresWhen, ruleId, messageTemplate}` requirement definition.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct CheckDefinition {
    /// Rule id reported in violations.
    #[serde(alias = "ruleId")]
    pub rule_id: String,
    /// Artifact type the check is dispatched to (`*` for all).
    #[serde(default = "default_artifact_type", alias = "artifactType")]
    pub artifact_type: String,
    /// Gate condition.
    #[serde(alias = "appliesWhen")]
    pub applies_when: ConditionDefinition,
    /// Condition required once gated in.
    #[serde(alias = "requiresWhen")]
    pub requires_when: ConditionDefinition,
    /// Violation message template.
    #[serde(default = "default_message_template", alias = "messageTemplate")]
    pub message_template: String,
}

/// Test on the value at a dotted artifact path.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct ConditionDefinition {
    /// Dotted path, e.g. `metadata.annotations.cms_guidance_version`.
    pub path: String,
    /// Exact value required at `path`.
    #[serde(default)]
    pub equals: Option<Value>,
    /// Require a truthy / non-empty value at `path`.
    #[serde(default, alias = "nonEmpty")]
    pub non_empty: bool,
}
