//! Evaluation results.

use serde::{Deserialize, Serialize};

/// One reported instance of an input failing one rule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Violation {
    /// Artifact name, or the payload location (`log.message`, `response.fields`, ...).
    pub source_name: String,
    /// Artifact type, or `log` / `response`.
    pub source_type: String,
    /// Stable identifier of the rule that fired.
    pub rule_id: String,
    /// Human-readable explanation.
    pub message: String,
}

/// Allow/deny decision with the violations that produced it.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    /// `true` iff no violation was produced.
    pub allow: bool,
    /// Ordered violations.
    pub violations: Vec<Violation>,
}

impl Decision {
    /// Derive a decision from an ordered violation list.
    #[must_use]
    pub fn from_violations(violations: Vec<Violation>) -> Self {
        Self {
            allow: violations.is_empty(),
            violations,
        }
    }

    /// Rule ids in violation order.
    #[must_use]
    pub fn rule_ids(&self) -> Vec<&str> {
        self.violations.iter().map(|v| v.rule_id.as_str()).collect()
    }
}
