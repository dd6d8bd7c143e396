//! End-to-end engine scenarios over real rule directories.

use compliance_gate::models::artifact::Artifact;
use compliance_gate::models::payload::LogPayload;
use compliance_gate::models::snapshot::SourceKind;
use compliance_gate::policy::sync::SyncOutcome;
use compliance_gate::ComplianceEngine;
use serde_json::json;

use super::test_helpers::{RuleDirs, CMS_RULES};

fn deployment() -> Vec<Artifact> {
    serde_json::from_value(json!([
        {
            "type": "terraform",
            "name": "edge-network",
            "content": {
                "security_groups": [
                    { "name": "public", "rules": [ { "name": "https", "cidr": "0.0.0.0/0" } ] }
                ]
            }
        },
        {
            "type": "kubernetes",
            "name": "api",
            "content": {
                "pods": [ {
                    "name": "api-0",
                    "containers": [
                        { "name": "app", "securityContext": { "runAsNonRoot": false } }
                    ]
                } ]
            },
            "metadata": { "cms_guidance_required": true, "annotations": {} }
        },
        {
            "type": "container_image",
            "name": "api-image",
            "content": { "cosign_verified": true }
        }
    ]))
    .expect("artifacts")
}

#[tokio::test]
async fn deployment_scenario_reports_each_failure_in_order() {
    let dirs = RuleDirs::seeded();
    dirs.write_dynamic("cms.json", CMS_RULES);
    let engine = dirs.engine().await;

    let decision = engine.evaluate_artifacts(&deployment());

    assert!(!decision.allow);
    assert_eq!(
        decision.rule_ids(),
        vec![
            "sg-no-open-ingress",
            "pods-must-run-as-non-root",
            "cms-guidance-version-required"
        ]
    );
    let names: Vec<&str> = decision
        .violations
        .iter()
        .map(|v| v.source_name.as_str())
        .collect();
    assert_eq!(names, vec!["edge-network", "api", "api"]);
}

#[tokio::test]
async fn compliant_deployment_is_allowed() {
    let dirs = RuleDirs::seeded();
    let engine = dirs.engine().await;

    let artifacts: Vec<Artifact> = serde_json::from_value(json!([
        { "type": "container_image", "name": "img", "content": { "cosign_verified": true } }
    ]))
    .expect("artifacts");

    let decision = engine.evaluate_artifacts(&artifacts);
    assert!(decision.allow);
    assert!(decision.violations.is_empty());
    assert!(engine.evaluate_artifacts(&[]).allow);
}

#[tokio::test]
async fn java_log_scenario() {
    let dirs = RuleDirs::seeded();
    let engine = dirs.engine().await;

    let payload = LogPayload::from_request(&json!({
        "log": {
            "language": "Java",
            "message": "System.out.println(\"user 123-45-6789\")",
            "fields": { "patient_dob": "1970-01-01", "requestId": "r1" }
        }
    }));

    let decision = engine.evaluate_log(&payload);

    assert!(!decision.allow);
    assert_eq!(
        decision.rule_ids(),
        vec!["debug-pattern:java", "phi-field:patient", "phi-regex:ssn"]
    );
}

#[tokio::test]
async fn clean_log_is_allowed() {
    let dirs = RuleDirs::seeded();
    let engine = dirs.engine().await;

    let payload = LogPayload::from_request(&json!({
        "language": "python",
        "message": "request served",
        "fields": ["requestId", "latencyMs"]
    }));

    assert!(engine.evaluate_log(&payload).allow);
}

#[tokio::test]
async fn status_reports_published_snapshot() {
    let dirs = RuleDirs::seeded();
    dirs.write_dynamic("cms.json", CMS_RULES);
    let engine = dirs.engine().await;

    let status = engine.status();

    assert_eq!(status.version, 1);
    assert_eq!(status.policy_count, 2);
    assert_eq!(status.dynamic_policy_count, 1);
    assert!(status.rejected.is_empty());
    assert_eq!(status.last_sync.outcome, SyncOutcome::Published);
    assert_eq!(status.sources[0].kind, SourceKind::Base);
    assert_eq!(status.sources[0].id, "base:logfilter");
    // 2 debug patterns, 3 keywords, 1 regex, 3 built-ins, 1 dynamic check
    assert_eq!(status.rule_count, 10);
}

#[tokio::test]
async fn engine_clones_share_snapshot() {
    let dirs = RuleDirs::seeded();
    let engine = dirs.engine().await;
    let other = ComplianceEngine::from_synchronizer(std::sync::Arc::clone(engine.synchronizer()));

    dirs.write_dynamic("cms.json", CMS_RULES);
    assert!(engine.reload().await.success);

    assert_eq!(other.status().version, 2);
    assert_eq!(engine.clone().status().digest, other.status().digest);
}
