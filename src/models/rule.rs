//! Compiled rule representation held by a [`super::snapshot::RuleSnapshot`].

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use regex::Regex;
use serde_json::Value;

use super::artifact::Artifact;
use super::is_truthy;

/// Rule id of the built-in open-ingress check.
pub const RULE_OPEN_INGRESS: &str = "sg-no-open-ingress";
/// Rule id of the built-in non-root pod check.
pub const RULE_RUN_AS_NON_ROOT: &str = "pods-must-run-as-non-root";
/// Rule id of the built-in signed-image check.
pub const RULE_SIGNED_IMAGE: &str = "image-must-be-signed";

/// One active rule.
#[derive(Debug, Clone)]
pub enum Rule {
    /// Substring that must not appear in messages logged from `language`.
    DebugPattern {
        /// Lower-cased language key.
        language: String,
        /// Lower-cased disallowed substring.
        substring: String,
    },
    /// Case-insensitive substring tested against field names.
    PhiFieldKeyword {
        /// Lower-cased keyword.
        keyword: String,
    },
    /// Case-insensitive pattern tested against message-like content.
    PhiRegex {
        /// Pattern name, used in the rule id.
        name: String,
        /// Compiled pattern.
        regex: Regex,
        /// Message reported on match.
        message: String,
    },
    /// Predicate over a single artifact.
    GatekeeperCheck(GatekeeperCheck),
}

impl Rule {
    /// Stable identifier used in violations.
    #[must_use]
    pub fn id(&self) -> String {
        match self {
            Self::DebugPattern { language, .. } => format!("debug-pattern:{language}"),
            Self::PhiFieldKeyword { keyword } => format!("phi-field:{keyword}"),
            Self::PhiRegex { name, .. } => format!("phi-regex:{name}"),
            Self::GatekeeperCheck(check) => check.rule_id.clone(),
        }
    }
}

/// Which artifact types a gatekeeper check is dispatched to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactTypeMatch {
    /// Every artifact regardless of type.
    Any,
    /// `terraform`
    Terraform,
    /// `kubernetes` or `helm`
    Workload,
    /// `container_image`
    ContainerImage,
}

impl ArtifactTypeMatch {
    /// Case-insensitive match against an artifact's type.
    #[must_use]
    pub fn matches(self, kind: &str) -> bool {
        let kind = kind.trim().to_lowercase();
        match self {
            Self::Any => true,
            Self::Terraform => kind == "terraform",
            Self::Workload => kind == "kubernetes" || kind == "helm",
            Self::ContainerImage => kind == "container_image",
        }
    }
}

impl FromStr for ArtifactTypeMatch {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "*" | "any" => Ok(Self::Any),
            "terraform" => Ok(Self::Terraform),
            "kubernetes" | "helm" => Ok(Self::Workload),
            "container_image" => Ok(Self::ContainerImage),
            other => Err(format!("unrecognized artifact type match '{other}'")),
        }
    }
}

impl Display for ArtifactTypeMatch {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Any => "*",
            Self::Terraform => "terraform",
            Self::Workload => "kubernetes",
            Self::ContainerImage => "container_image",
        };
        f.write_str(name)
    }
}

/// Named predicate over one artifact.
#[derive(Debug, Clone)]
pub struct GatekeeperCheck {
    /// Artifact types the check is dispatched to.
    pub artifact_type: ArtifactTypeMatch,
    /// The predicate.
    pub check: CheckFunction,
    /// Stable rule id reported in violations.
    pub rule_id: String,
}

/// Gatekeeper predicate implementation.
#[derive(Debug, Clone)]
pub enum CheckFunction {
    /// Security group rules open to `0.0.0.0/0`.
    OpenIngress,
    /// Pods without a non-root security context.
    RunAsNonRoot,
    /// Container images not verified by cosign.
    SignedImage,
    /// Rule-source contributed requirement.
    Requirement(Requirement),
}

/// Declarative check contributed by a rule document.
///
/// Fires when `applies_when` holds and `requires_when` does not.
#[derive(Debug, Clone, PartialEq)]
pub struct Requirement {
    /// Gate deciding whether the requirement is relevant to an artifact.
    pub applies_when: FieldCondition,
    /// Condition the artifact must satisfy once gated in.
    pub requires_when: FieldCondition,
    /// Message with `{name}`, `{type}` and `{rule_id}` placeholders.
    pub message_template: String,
}

impl Requirement {
    /// Whether `artifact` violates this requirement.
    #[must_use]
    pub fn violated_by(&self, artifact: &Artifact) -> bool {
        self.applies_when.holds(artifact) && !self.requires_when.holds(artifact)
    }

    /// Render the message template for `artifact`.
    #[must_use]
    pub fn render(&self, artifact: &Artifact, rule_id: &str) -> String {
        self.message_template
            .replace("{name}", &artifact.name)
            .replace("{type}", &artifact.kind)
            .replace("{rule_id}", rule_id)
    }
}

/// Test applied to the value found at `path`.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldCondition {
    /// Dotted path rooted at `content`, `metadata`, `name`, or `type`.
    pub path: String,
    /// Required exact value, if any.
    pub equals: Option<Value>,
    /// Require a truthy / non-empty value.
    pub non_empty: bool,
}

impl FieldCondition {
    /// A missing value never satisfies a condition.
    #[must_use]
    pub fn holds(&self, artifact: &Artifact) -> bool {
        let Some(value) = artifact.lookup(&self.path) else {
            return false;
        };
        if let Some(expected) = &self.equals {
            if value.as_ref() != expected {
                return false;
            }
        }
        !self.non_empty || is_truthy(&value)
    }
}
