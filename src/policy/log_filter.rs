//! Log / PHI evaluator.
//!
//! Three independent checks whose violations are concatenated in this
//! order: debug patterns, PHI field keywords, PHI regexes.

use std::borrow::Cow;

use tracing::{debug, info_span};

use crate::models::payload::{field_names, LogPayload};
use crate::models::snapshot::RuleSnapshot;
use crate::models::violation::Violation;

/// Evaluate `payload` against the log rules of `snapshot`.
#[must_use]
pub fn evaluate(snapshot: &RuleSnapshot, payload: &LogPayload) -> Vec<Violation> {
    let _span = info_span!("log_evaluate", version = snapshot.version()).entered();

    let mut violations = Vec::new();
    check_debug_patterns(snapshot, payload, &mut violations);
    check_field_keywords(snapshot, payload, &mut violations);
    check_regexes(snapshot, payload, &mut violations);

    debug!(violations = violations.len(), "log evaluation complete");
    violations
}

fn check_debug_patterns(snapshot: &RuleSnapshot, payload: &LogPayload, out: &mut Vec<Violation>) {
    let Some(log) = &payload.log else {
        return;
    };
    let (Some(language), Some(message)) = (log.language(), log.message_text()) else {
        return;
    };
    let language = language.trim().to_lowercase();
    let message = message.to_lowercase();

    for (pattern_language, substring) in snapshot.debug_patterns() {
        if pattern_language == language && message.contains(substring) {
            out.push(Violation {
                source_name: "log.message".into(),
                source_type: "log".into(),
                rule_id: format!("debug-pattern:{pattern_language}"),
                message: format!(
                    "debug statement '{substring}' is not allowed in {language} logs"
                ),
            });
        }
    }
}

fn check_field_keywords(snapshot: &RuleSnapshot, payload: &LogPayload, out: &mut Vec<Violation>) {
    let keywords: Vec<&str> = snapshot.phi_keywords().collect();
    if keywords.is_empty() {
        return;
    }

    let mut sources = Vec::new();
    if let Some(log) = &payload.log {
        sources.push(("log.fields", "log", field_names(&log.fields)));
    }
    if let Some(response) = &payload.response {
        sources.push(("response.fields", "response", field_names(&response.fields)));
        if response.body.is_object() {
            sources.push(("response.body", "response", field_names(&response.body)));
        }
    }

    for (source_name, source_type, fields) in sources {
        for field in fields {
            let folded = field.to_lowercase();
            if let Some(keyword) = keywords.iter().find(|k| folded.contains(**k)) {
                out.push(Violation {
                    source_name: source_name.into(),
                    source_type: source_type.into(),
                    rule_id: format!("phi-field:{keyword}"),
                    message: format!("field '{field}' may contain PHI (matches '{keyword}')"),
                });
            }
        }
    }
}

fn check_regexes(snapshot: &RuleSnapshot, payload: &LogPayload, out: &mut Vec<Violation>) {
    let mut sources: Vec<(&str, &str, Cow<'_, str>)> = Vec::new();
    if let Some(text) = payload.log.as_ref().and_then(|log| log.message_text()) {
        sources.push(("log.message", "log", text));
    }
    if let Some(text) = payload.response.as_ref().and_then(|r| r.body_text()) {
        sources.push(("response.body", "response", text));
    }
    if sources.is_empty() {
        return;
    }

    for (name, regex, message) in snapshot.phi_regexes() {
        for (source_name, source_type, text) in &sources {
            if regex.is_match(text) {
                out.push(Violation {
                    source_name: (*source_name).into(),
                    source_type: (*source_type).into(),
                    rule_id: format!("phi-regex:{name}"),
                    message: message.to_owned(),
                });
            }
        }
    }
}
