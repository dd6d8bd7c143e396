//! Rule document loader.
//!
//! Turns an ordered list of [`SourceRef`]s into an unpublished
//! [`RuleSnapshot`]. Pure with respect to engine state: it reads files,
//! parses and validates them, and returns a value. It is safe to call
//! concurrently and speculatively.
//!
//! # Failure isolation
//!
//! - A base document that cannot be read, parsed, or validated fails the
//!   whole load.
//! - A dynamic document that fails is recorded in
//!   [`RuleSnapshot::rejected`] and contributes no rules.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use regex::RegexBuilder;
use sha2::{Digest, Sha256};
use tracing::{debug, info, info_span, warn};

use crate::models::artifact::LOOKUP_ROOTS;
use crate::models::rule::{
    ArtifactTypeMatch, CheckFunction, FieldCondition, GatekeeperCheck, Requirement, Rule,
    RULE_OPEN_INGRESS, RULE_RUN_AS_NON_ROOT, RULE_SIGNED_IMAGE,
};
use crate::models::snapshot::{RejectedSource, RuleSnapshot, SourceKind, SourceRef};
use crate::policy::document::{CheckDefinition, ConditionDefinition, RuleDocument};
use crate::{AppError, Result};

/// File extensions recognized as rule documents.
const DOCUMENT_EXTENSIONS: &[&str] = &["json", "toml"];

/// Parses and validates rule documents.
pub struct PolicyLoader;

impl PolicyLoader {
    /// List rule documents under `base_dir` then `dynamic_dir`, each in
    /// lexical order. Dotfiles and unrecognized extensions are skipped.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Load` if `base_dir` cannot be listed. A missing
    /// `dynamic_dir` simply contributes no sources.
    pub fn discover(base_dir: &Path, dynamic_dir: &Path) -> Result<Vec<SourceRef>> {
        if !base_dir.is_dir() {
            return Err(AppError::load(
                "base",
                format!("base directory not found: {}", base_dir.display()),
            ));
        }

        let mut sources = list_documents(base_dir, SourceKind::Base)?;
        if dynamic_dir.is_dir() {
            sources.extend(list_documents(dynamic_dir, SourceKind::Dynamic)?);
        }
        Ok(sources)
    }

    /// Build a snapshot from `sources`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Load` when no base source is given or when any
    /// base source fails to load.
    pub fn load(sources: &[SourceRef]) -> Result<RuleSnapshot> {
        let _span = info_span!("policy_load", sources = sources.len()).entered();

        if !sources.iter().any(|s| s.kind == SourceKind::Base) {
            return Err(AppError::load("base", "no base rule definitions found"));
        }

        let mut registry = RuleRegistry::default();
        for rule in builtin_checks() {
            registry.insert(rule);
        }

        let mut hasher = Sha256::new();
        let mut accepted = Vec::new();
        let mut rejected = Vec::new();

        for source in sources {
            let id = source.id();
            match load_source(source, &registry) {
                Ok((raw, rules)) => {
                    hasher.update(id.as_bytes());
                    hasher.update([0u8]);
                    hasher.update(raw.as_bytes());
                    hasher.update([0u8]);
                    for rule in rules {
                        registry.insert(rule);
                    }
                    debug!(source = %id, "rule document accepted");
                    accepted.push(source.clone());
                }
                Err(err) if source.kind == SourceKind::Base => {
                    warn!(source = %id, %err, "base rule document rejected, failing load");
                    return Err(err);
                }
                Err(err) => {
                    warn!(source = %id, %err, "dynamic rule document rejected");
                    rejected.push(RejectedSource {
                        source: id,
                        reason: err.to_string(),
                    });
                }
            }
        }

        let digest = format!("{:x}", hasher.finalize());
        info!(
            accepted = accepted.len(),
            rejected = rejected.len(),
            rules = registry.rules.len(),
            "rule snapshot built"
        );

        Ok(RuleSnapshot::new(digest, accepted, rejected, registry.rules))
    }

    /// Parse a document body according to the source's file extension.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Load` on malformed JSON/TOML or unknown keys.
    pub fn parse_document(source: &SourceRef, raw: &str) -> Result<RuleDocument> {
        let id = source.id();
        let is_toml = source
            .path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));

        if is_toml {
            toml::from_str(raw).map_err(|err| AppError::load(id, format!("invalid toml: {err}")))
        } else {
            serde_json::from_str(raw)
                .map_err(|err| AppError::load(id, format!("invalid json: {err}")))
        }
    }

    /// Validate and compile a parsed document in isolation.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Load` describing the first invalid definition.
    pub fn compile(source_id: &str, document: RuleDocument) -> Result<Vec<Rule>> {
        let mut rules = Vec::new();
        let fail = |reason: String| AppError::load(source_id, reason);

        for (language, substring) in document.debug_patterns {
            let language = language.trim().to_lowercase();
            let substring = substring.trim().to_lowercase();
            if language.is_empty() {
                return Err(fail("debug pattern language must not be empty".into()));
            }
            if substring.is_empty() {
                return Err(fail(format!(
                    "debug pattern for '{language}' must not be empty"
                )));
            }
            rules.push(Rule::DebugPattern {
                language,
                substring,
            });
        }

        for keyword in document.phi_field_keywords {
            let keyword = keyword.trim().to_lowercase();
            if keyword.is_empty() {
                return Err(fail("phi field keywords must be non-empty strings".into()));
            }
            rules.push(Rule::PhiFieldKeyword { keyword });
        }

        for def in document.phi_regexes {
            let name = def.name.trim().to_owned();
            if name.is_empty() {
                return Err(fail("phi regex name must not be empty".into()));
            }
            let regex = RegexBuilder::new(&def.pattern)
                .case_insensitive(true)
                .build()
                .map_err(|err| fail(format!("phi regex '{name}' does not compile: {err}")))?;
            rules.push(Rule::PhiRegex {
                name,
                regex,
                message: def.message,
            });
        }

        for def in document.gatekeeper_checks {
            rules.push(Rule::GatekeeperCheck(compile_check(def).map_err(fail)?));
        }

        Ok(rules)
    }
}

/// The checks every snapshot carries, one per artifact type.
fn builtin_checks() -> Vec<Rule> {
    [
        (ArtifactTypeMatch::Terraform, CheckFunction::OpenIngress, RULE_OPEN_INGRESS),
        (ArtifactTypeMatch::Workload, CheckFunction::RunAsNonRoot, RULE_RUN_AS_NON_ROOT),
        (ArtifactTypeMatch::ContainerImage, CheckFunction::SignedImage, RULE_SIGNED_IMAGE),
    ]
    .into_iter()
    .map(|(artifact_type, check, rule_id)| {
        Rule::GatekeeperCheck(GatekeeperCheck {
            artifact_type,
            check,
            rule_id: rule_id.to_owned(),
        })
    })
    .collect()
}

fn compile_check(def: CheckDefinition) -> std::result::Result<GatekeeperCheck, String> {
    let rule_id = def.rule_id.trim().to_owned();
    if rule_id.is_empty() {
        return Err("gatekeeper check rule_id must not be empty".into());
    }
    let artifact_type: ArtifactTypeMatch = def
        .artifact_type
        .parse()
        .map_err(|err| format!("gatekeeper check '{rule_id}': {err}"))?;
    let applies_when = compile_condition(def.applies_when)
        .map_err(|err| format!("gatekeeper check '{rule_id}' applies_when: {err}"))?;
    let requires_when = compile_condition(def.requires_when)
        .map_err(|err| format!("gatekeeper check '{rule_id}' requires_when: {err}"))?;

    Ok(GatekeeperCheck {
        artifact_type,
        check: CheckFunction::Requirement(Requirement {
            applies_when,
            requires_when,
            message_template: def.message_template,
        }),
        rule_id,
    })
}

fn compile_condition(def: ConditionDefinition) -> std::result::Result<FieldCondition, String> {
    let path = def.path.trim().to_owned();
    let root = path.split('.').next().unwrap_or_default();
    if path.is_empty() || path.split('.').any(str::is_empty) {
        return Err(format!("invalid path '{path}'"));
    }
    if !LOOKUP_ROOTS.contains(&root) {
        return Err(format!(
            "path '{path}' must start with one of {}",
            LOOKUP_ROOTS.join(", ")
        ));
    }
    Ok(FieldCondition {
        path,
        equals: def.equals,
        non_empty: def.non_empty,
    })
}

/// Read, parse, compile, and check one source against rules accepted so far.
fn load_source(source: &SourceRef, registry: &RuleRegistry) -> Result<(String, Vec<Rule>)> {
    let id = source.id();
    let raw = fs::read_to_string(&source.path)
        .map_err(|err| AppError::load(&id, format!("unreadable: {err}")))?;
    if raw.trim().is_empty() {
        return Err(AppError::load(&id, "rule document is empty"));
    }

    let document = PolicyLoader::parse_document(source, &raw)?;
    let rules = PolicyLoader::compile(&id, document)?;

    let mut local = HashMap::new();
    let mut unique = Vec::with_capacity(rules.len());
    for rule in rules {
        let rule_id = rule.id();
        let signature = signature(&rule);
        let existing = registry
            .signatures
            .get(&rule_id)
            .or_else(|| local.get(&rule_id));
        match existing {
            Some(sig) if *sig == signature && !matches!(rule, Rule::GatekeeperCheck(_)) => {
                debug!(source = %id, rule_id = %rule_id, "duplicate rule definition skipped");
            }
            Some(_) => {
                return Err(AppError::load(
                    &id,
                    format!("rule id '{rule_id}' conflicts with an existing definition"),
                ));
            }
            None => {
                local.insert(rule_id, signature);
                unique.push(rule);
            }
        }
    }

    Ok((raw, unique))
}

/// Definition fingerprint used to tell an identical duplicate from a conflict.
fn signature(rule: &Rule) -> String {
    match rule {
        Rule::DebugPattern { substring, .. } => substring.clone(),
        Rule::PhiFieldKeyword { keyword } => keyword.clone(),
        Rule::PhiRegex { regex, message, .. } => format!("{}\u{0}{message}", regex.as_str()),
        Rule::GatekeeperCheck(check) => check.rule_id.clone(),
    }
}

/// Accumulates rules in application order and tracks claimed rule ids.
#[derive(Default)]
struct RuleRegistry {
    rules: Vec<Rule>,
    signatures: HashMap<String, String>,
}

impl RuleRegistry {
    fn insert(&mut self, rule: Rule) {
        self.signatures.insert(rule.id(), signature(&rule));
        self.rules.push(rule);
    }
}

fn list_documents(dir: &Path, kind: SourceKind) -> Result<Vec<SourceRef>> {
    let pattern = format!("{}/*", glob::Pattern::escape(&dir.to_string_lossy()));
    let options = glob::MatchOptions {
        require_literal_leading_dot: true,
        ..glob::MatchOptions::new()
    };
    let entries = glob::glob_with(&pattern, options)
        .map_err(|err| AppError::load(kind.to_string(), format!("invalid directory pattern: {err}")))?;

    let mut paths: Vec<_> = entries
        .filter_map(|entry| match entry {
            Ok(path) => Some(path),
            Err(err) => {
                warn!(%err, "unreadable rule directory entry, skipping");
                None
            }
        })
        .filter(|path| path.is_file())
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| DOCUMENT_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        })
        .collect();
    paths.sort();

    Ok(paths
        .into_iter()
        .map(|path| SourceRef::new(kind, path))
        .collect())
}
