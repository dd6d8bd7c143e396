//! Integration tests for snapshot synchronization.
//!
//! Validates bootstrap, publish-on-change, unchanged detection, fail-closed
//! rollback, cancellation, and the background trigger loop.

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use compliance_gate::models::artifact::Artifact;
use compliance_gate::policy::gatekeeper;
use compliance_gate::policy::sync::{spawn_sync_task, SyncOutcome, SyncState, Synchronizer};
use compliance_gate::AppError;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use super::test_helpers::{RuleDirs, CMS_RULES};

fn cms_artifact() -> Artifact {
    serde_json::from_value(json!({
        "type": "helm",
        "name": "chart",
        "content": { "pods": [ { "name": "p", "securityContext": { "runAsNonRoot": true } } ] },
        "metadata": { "cms_guidance_required": true }
    }))
    .expect("artifact")
}

fn cms_violations(sync: &Synchronizer) -> usize {
    gatekeeper::evaluate(&sync.current(), &[cms_artifact()]).len()
}

// ─── Bootstrap ────────────────────────────────────────────────────────

#[tokio::test]
async fn bootstrap_publishes_version_one() {
    let dirs = RuleDirs::seeded();
    let sync = dirs.synchronizer().await;

    let snapshot = sync.current();
    assert_eq!(snapshot.version(), 1);
    assert!(!snapshot.digest().is_empty());
    assert_eq!(sync.state(), SyncState::Idle);
    assert_eq!(sync.last_sync().outcome, SyncOutcome::Published);
}

#[tokio::test]
async fn bootstrap_with_rejected_dynamic_source_is_degraded() {
    let dirs = RuleDirs::seeded();
    dirs.write_dynamic("broken.json", "{ not json");
    dirs.write_dynamic("cms.json", CMS_RULES);

    let sync = dirs.synchronizer().await;

    let record = sync.last_sync();
    assert_eq!(record.outcome, SyncOutcome::Degraded);
    assert_eq!(record.rejected.len(), 1);
    assert_eq!(record.rejected[0].source, "dynamic:broken");
    assert_eq!(sync.current().version(), 1);
    assert_eq!(cms_violations(&sync), 1);
}

#[tokio::test]
async fn bootstrap_without_base_rules_fails() {
    let dirs = RuleDirs::seeded();
    fs::remove_file(dirs.base.join("logfilter.json")).expect("remove base");

    assert!(Synchronizer::bootstrap(dirs.settings()).await.is_err());
}

// ─── Reload ───────────────────────────────────────────────────────────

#[tokio::test]
async fn added_dynamic_rule_is_published_with_next_version() {
    let dirs = RuleDirs::seeded();
    let sync = dirs.synchronizer().await;
    assert_eq!(cms_violations(&sync), 0);

    dirs.write_dynamic("cms.json", CMS_RULES);
    let result = sync.reload().await;

    assert!(result.success);
    assert_eq!(result.version, 2);
    assert_eq!(sync.current().version(), 2);
    assert_eq!(cms_violations(&sync), 1);
    assert_eq!(sync.last_sync().outcome, SyncOutcome::Published);
}

#[tokio::test]
async fn unchanged_sources_keep_version() {
    let dirs = RuleDirs::seeded();
    dirs.write_dynamic("cms.json", CMS_RULES);
    let sync = dirs.synchronizer().await;
    let before = sync.current();

    let result = sync.reload().await;

    assert!(result.success);
    assert_eq!(result.version, 1);
    assert!(Arc::ptr_eq(&before, &sync.current()));
    assert_eq!(sync.last_sync().outcome, SyncOutcome::Unchanged);
    assert_eq!(cms_violations(&sync), 1);
}

#[tokio::test]
async fn removed_dynamic_rule_is_retired() {
    let dirs = RuleDirs::seeded();
    let path = dirs.write_dynamic("cms.json", CMS_RULES);
    let sync = dirs.synchronizer().await;
    assert_eq!(cms_violations(&sync), 1);

    fs::remove_file(path).expect("remove dynamic rule");
    let result = sync.reload().await;

    assert!(result.success);
    assert_eq!(result.version, 2);
    assert_eq!(cms_violations(&sync), 0);
}

#[tokio::test]
async fn malformed_dynamic_rule_keeps_last_good_snapshot() {
    let dirs = RuleDirs::seeded();
    dirs.write_dynamic("cms.json", CMS_RULES);
    let sync = dirs.synchronizer().await;

    dirs.write_dynamic("extra.json", r#"{ "phi_field_keywords": [42] }"#);
    let result = sync.reload().await;

    assert!(!result.success);
    assert_eq!(result.version, 1);
    assert!(result.error.as_deref().is_some_and(|e| e.contains("dynamic:extra")));
    assert_eq!(sync.current().version(), 1);
    assert_eq!(cms_violations(&sync), 1);

    let record = sync.last_sync();
    assert_eq!(record.outcome, SyncOutcome::Failed);
    assert_eq!(record.rejected.len(), 1);
    assert_eq!(sync.state(), SyncState::Idle);
}

#[tokio::test]
async fn fixed_rule_recovers_after_failure() {
    let dirs = RuleDirs::seeded();
    let sync = dirs.synchronizer().await;

    dirs.write_dynamic("cms.json", "{ broken");
    assert!(!sync.reload().await.success);

    dirs.write_dynamic("cms.json", CMS_RULES);
    let result = sync.reload().await;
    assert!(result.success);
    assert_eq!(result.version, 2);
    assert_eq!(cms_violations(&sync), 1);
}

#[tokio::test]
async fn broken_base_rule_fails_reload() {
    let dirs = RuleDirs::seeded();
    let sync = dirs.synchronizer().await;

    dirs.write_base("logfilter.json", r#"{ "phi_regexes": [ { "name": "x", "pattern": "(" } ] }"#);
    let result = sync.reload().await;

    assert!(!result.success);
    assert_eq!(sync.current().version(), 1);
    assert_eq!(sync.last_sync().outcome, SyncOutcome::Failed);
}

#[tokio::test]
async fn bootstrap_over_budget_times_out() {
    let dirs = RuleDirs::seeded();
    let mut settings = dirs.settings();
    settings.load_timeout = Duration::ZERO;

    let err = Synchronizer::bootstrap(settings).await.err().expect("bootstrap times out");
    assert!(matches!(err, AppError::Timeout(_)), "{err}");
}

#[tokio::test]
async fn reload_over_budget_rolls_back() {
    let dirs = RuleDirs::seeded();
    let sync = dirs.synchronizer().await;
    dirs.write_dynamic("cms.json", CMS_RULES);

    sync.set_load_timeout(Duration::ZERO);
    let result = sync.reload().await;

    assert!(!result.success);
    assert_eq!(result.version, 1);
    assert_eq!(sync.current().version(), 1);
    assert_eq!(cms_violations(&sync), 0);
    let record = sync.last_sync();
    assert_eq!(record.outcome, SyncOutcome::Failed);
    assert!(record.error.as_deref().is_some_and(|e| e.starts_with("timeout:")));
    assert_eq!(sync.state(), SyncState::Idle);

    sync.set_load_timeout(Duration::from_secs(5));
    assert_eq!(sync.reload().await.version, 2);
}

#[tokio::test]
async fn cancelled_reload_does_not_publish() {
    let dirs = RuleDirs::seeded();
    let sync = dirs.synchronizer().await;
    dirs.write_dynamic("cms.json", CMS_RULES);

    let cancel = CancellationToken::new();
    cancel.cancel();
    let result = sync.reload_with_cancel(&cancel).await;

    assert!(!result.success);
    assert_eq!(sync.current().version(), 1);
    assert_eq!(sync.last_sync().outcome, SyncOutcome::Cancelled);
    assert_eq!(cms_violations(&sync), 0);

    assert_eq!(sync.reload().await.version, 2);
}

#[tokio::test]
async fn held_snapshot_is_unaffected_by_publish() {
    let dirs = RuleDirs::seeded();
    let sync = dirs.synchronizer().await;
    let held = sync.current();
    let held_digest = held.digest().to_owned();

    dirs.write_dynamic("cms.json", CMS_RULES);
    assert!(sync.reload().await.success);

    assert_eq!(held.version(), 1);
    assert_eq!(held.digest(), held_digest);
    assert_eq!(gatekeeper::evaluate(&held, &[cms_artifact()]).len(), 0);
    assert_ne!(sync.current().digest(), held_digest);
}

#[tokio::test]
async fn concurrent_reloads_assign_distinct_versions() {
    let dirs = RuleDirs::seeded();
    let sync = dirs.synchronizer().await;
    dirs.write_dynamic("cms.json", CMS_RULES);

    let (a, b) = tokio::join!(sync.reload(), sync.reload());

    assert!(a.success && b.success);
    assert_eq!(a.version.max(b.version), 2);
    assert_eq!(sync.current().version(), 2);
}

// ─── Background task ──────────────────────────────────────────────────

#[tokio::test]
async fn trigger_runs_background_sync() {
    let dirs = RuleDirs::seeded();
    let sync = dirs.synchronizer().await;
    let cancel = CancellationToken::new();
    let handle = spawn_sync_task(Arc::clone(&sync), None, cancel.clone());

    dirs.write_dynamic("cms.json", CMS_RULES);
    sync.trigger();

    let published = tokio::time::timeout(Duration::from_secs(10), async {
        while sync.current().version() < 2 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    assert!(published.is_ok(), "background sync did not publish");

    cancel.cancel();
    handle.await.expect("sync task joins");
}

#[tokio::test]
async fn poll_interval_picks_up_changes() {
    let dirs = RuleDirs::seeded();
    let sync = dirs.synchronizer().await;
    let cancel = CancellationToken::new();
    let handle = spawn_sync_task(
        Arc::clone(&sync),
        Some(Duration::from_millis(50)),
        cancel.clone(),
    );

    dirs.write_dynamic("cms.json", CMS_RULES);

    let published = tokio::time::timeout(Duration::from_secs(10), async {
        while cms_violations(&sync) == 0 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    assert!(published.is_ok(), "poll did not publish");

    cancel.cancel();
    handle.await.expect("sync task joins");
}
