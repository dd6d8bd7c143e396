//! Immutable, versioned rule bundle.

use std::fmt::{Display, Formatter};
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;

use super::rule::{GatekeeperCheck, Rule};

/// Whether a rule source belongs to the required base set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Required; any failure fails the whole load.
    Base,
    /// Optional; failures are isolated to the offending file.
    Dynamic,
}

impl Display for SourceKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Base => f.write_str("base"),
            Self::Dynamic => f.write_str("dynamic"),
        }
    }
}

/// One rule-definition location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceRef {
    /// Base or dynamic.
    pub kind: SourceKind,
    /// Path of the rule document.
    pub path: PathBuf,
}

impl SourceRef {
    /// Construct a source reference.
    pub fn new(kind: SourceKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }

    /// `<kind>:<file stem>`, e.g. `dynamic:cms`.
    #[must_use]
    pub fn id(&self) -> String {
        let stem = self
            .path
            .file_stem()
            .map_or_else(|| self.path.display().to_string(), |s| s.to_string_lossy().into_owned());
        format!("{}:{stem}", self.kind)
    }
}

/// A dynamic source whose contribution was dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectedSource {
    /// Source id.
    pub source: String,
    /// Rejection reason.
    pub reason: String,
}

/// Fully-resolved rule set used by one evaluation.
///
/// Built by the loader, versioned and published by the synchronizer, and
/// never mutated afterwards. Readers hold it through an `Arc`.
#[derive(Debug, Clone)]
pub struct RuleSnapshot {
    version: u64,
    digest: String,
    created_at: DateTime<Utc>,
    sources: Vec<SourceRef>,
    rejected: Vec<RejectedSource>,
    rules: Vec<Rule>,
}

impl RuleSnapshot {
    /// Assemble an unpublished snapshot (version 0).
    #[must_use]
    pub fn new(
        digest: String,
        sources: Vec<SourceRef>,
        rejected: Vec<RejectedSource>,
        rules: Vec<Rule>,
    ) -> Self {
        Self {
            version: 0,
            digest,
            created_at: Utc::now(),
            sources,
            rejected,
            rules,
        }
    }

    /// Stamp the publish version. Only called before the snapshot is shared.
    #[must_use]
    pub(crate) fn with_version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    /// Monotonic publish counter; `0` means never published.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// SHA-256 over the ordered source ids and contents.
    #[must_use]
    pub fn digest(&self) -> &str {
        &self.digest
    }

    /// Build time.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Sources that contributed rules, in load order.
    #[must_use]
    pub fn sources(&self) -> &[SourceRef] {
        &self.sources
    }

    /// Dynamic sources that were dropped during the build.
    #[must_use]
    pub fn rejected(&self) -> &[RejectedSource] {
        &self.rejected
    }

    /// All rules, in application order.
    #[must_use]
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// `(language, substring)` debug patterns.
    pub fn debug_patterns(&self) -> impl Iterator<Item = (&str, &str)> {
        self.rules.iter().filter_map(|rule| match rule {
            Rule::DebugPattern {
                language,
                substring,
            } => Some((language.as_str(), substring.as_str())),
            _ => None,
        })
    }

    /// Lower-cased PHI field keywords.
    pub fn phi_keywords(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().filter_map(|rule| match rule {
            Rule::PhiFieldKeyword { keyword } => Some(keyword.as_str()),
            _ => None,
        })
    }

    /// `(name, regex, message)` PHI patterns.
    pub fn phi_regexes(&self) -> impl Iterator<Item = (&str, &Regex, &str)> {
        self.rules.iter().filter_map(|rule| match rule {
            Rule::PhiRegex {
                name,
                regex,
                message,
            } => Some((name.as_str(), regex, message.as_str())),
            _ => None,
        })
    }

    /// Gatekeeper checks in application order.
    pub fn gatekeeper_checks(&self) -> impl Iterator<Item = &GatekeeperCheck> {
        self.rules.iter().filter_map(|rule| match rule {
            Rule::GatekeeperCheck(check) => Some(check),
            _ => None,
        })
    }

    /// Number of sources of the given kind.
    #[must_use]
    pub fn source_count(&self, kind: SourceKind) -> usize {
        self.sources.iter().filter(|s| s.kind == kind).count()
    }
}
