//! Log / PHI evaluation.

use serde_json::json;

use compliance_gate::models::payload::LogPayload;
use compliance_gate::policy::log_filter;

use super::support::{default_snapshot, snapshot, BASE_RULES};

fn rule_ids(raw: &serde_json::Value) -> Vec<String> {
    log_filter::evaluate(&default_snapshot(), &LogPayload::from_request(raw))
        .into_iter()
        .map(|v| v.rule_id)
        .collect()
}

// ─── Debug patterns ───────────────────────────────────────────────────

#[test]
fn python_print_matches_in_any_case() {
    for message in ["print(x)", "PRINT debug", "calling Print here"] {
        let raw = json!({ "log": { "language": "Python", "message": message } });
        assert_eq!(rule_ids(&raw), vec!["debug-pattern:python"], "{message}");
    }
}

#[test]
fn debug_pattern_needs_matching_language() {
    let raw = json!({ "log": { "language": "go", "message": "print(x)" } });
    assert!(rule_ids(&raw).is_empty());

    let raw = json!({ "log": { "message": "print(x)" } });
    assert!(rule_ids(&raw).is_empty());
}

#[test]
fn java_println_and_patient_field() {
    let raw = json!({
        "log": {
            "language": "java",
            "message": "System.out.println(\"hello\")",
            "fields": { "patientName": "x" }
        }
    });

    let violations = log_filter::evaluate(&default_snapshot(), &LogPayload::from_request(&raw));
    let ids: Vec<&str> = violations.iter().map(|v| v.rule_id.as_str()).collect();
    assert_eq!(ids, vec!["debug-pattern:java", "phi-field:patient"]);
    assert_eq!(violations[0].source_name, "log.message");
    assert_eq!(violations[1].source_name, "log.fields");
    assert!(violations[1].message.contains("patientName"));
}

// ─── PHI field keywords ───────────────────────────────────────────────

#[test]
fn one_violation_per_field_using_first_keyword() {
    let raw = json!({ "log": { "fields": ["patient_ssn", "ssnLast4", "status"] } });
    assert_eq!(rule_ids(&raw), vec!["phi-field:patient", "phi-field:ssn"]);
}

#[test]
fn response_body_mapping_supplies_field_names() {
    let raw = json!({
        "response": {
            "fields": ["requestId"],
            "body": { "Patient": { "id": 1 }, "ok": true }
        }
    });

    let violations = log_filter::evaluate(&default_snapshot(), &LogPayload::from_request(&raw));
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].rule_id, "phi-field:patient");
    assert_eq!(violations[0].source_name, "response.body");
    assert_eq!(violations[0].source_type, "response");
}

#[test]
fn scalar_fields_are_ignored() {
    let raw = json!({ "log": { "fields": "patient" } });
    assert!(rule_ids(&raw).is_empty());
}

// ─── PHI regexes ──────────────────────────────────────────────────────

#[test]
fn regex_matches_message_case_insensitively() {
    let raw = json!({ "log": { "message": "lookup PATIENT ID: 1234 done" } });
    assert_eq!(rule_ids(&raw), vec!["phi-regex:patient-id"]);
}

#[test]
fn non_string_message_is_scanned_like_its_json_text() {
    let structured = json!({ "log": { "message": { "detail": "ssn 123-45-6789" } } });
    let plain = json!({ "log": { "message": "{\"detail\":\"ssn 123-45-6789\"}" } });

    assert_eq!(rule_ids(&structured), vec!["phi-regex:ssn"]);
    assert_eq!(rule_ids(&structured), rule_ids(&plain));
}

#[test]
fn regex_scans_log_message_then_response_body() {
    let raw = json!({
        "log": { "message": "ssn 123-45-6789" },
        "response": { "body": "echo 987-65-4321" }
    });

    let violations = log_filter::evaluate(&default_snapshot(), &LogPayload::from_request(&raw));
    let sources: Vec<&str> = violations.iter().map(|v| v.source_name.as_str()).collect();
    assert_eq!(sources, vec!["log.message", "response.body"]);
    assert!(violations.iter().all(|v| v.message == "SSN detected"));
}

// ─── Shape tolerance ──────────────────────────────────────────────────

#[test]
fn empty_payload_is_allowed() {
    assert!(rule_ids(&json!({})).is_empty());
    assert!(rule_ids(&json!(null)).is_empty());
    assert!(rule_ids(&json!({ "response": null })).is_empty());
}

#[test]
fn checks_run_in_fixed_order() {
    let raw = json!({
        "log": {
            "language": "python",
            "message": "print ssn 123-45-6789",
            "fields": ["ssn"]
        }
    });
    assert_eq!(
        rule_ids(&raw),
        vec!["debug-pattern:python", "phi-field:ssn", "phi-regex:ssn"]
    );
}

#[test]
fn snapshot_without_log_rules_allows_everything() {
    let bare = snapshot(&[("empty.json", r#"{ "phi_field_keywords": [] }"#)], &[]);
    let raw = json!({ "log": { "language": "python", "message": "print 123-45-6789", "fields": ["patient"] } });
    assert!(log_filter::evaluate(&bare, &LogPayload::from_request(&raw)).is_empty());

    let full = snapshot(&[("logfilter.json", BASE_RULES)], &[]);
    assert_eq!(log_filter::evaluate(&full, &LogPayload::from_request(&raw)).len(), 3);
}
