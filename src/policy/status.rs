//! Read-only status of the published snapshot and the last sync attempt.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::snapshot::{RejectedSource, SourceKind};
use crate::policy::sync::{SyncRecord, SyncState, Synchronizer};

/// One source of the published snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceStatus {
    /// `<kind>:<stem>` id.
    pub id: String,
    /// Base or dynamic.
    pub kind: SourceKind,
    /// Location of the rule document.
    pub path: String,
}

/// Snapshot of engine status for `Status()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    /// Published snapshot version.
    pub version: u64,
    /// Published snapshot content digest.
    pub digest: String,
    /// Published snapshot build time.
    pub created_at: DateTime<Utc>,
    /// Sources of the published snapshot.
    pub sources: Vec<SourceStatus>,
    /// Number of contributing sources.
    pub policy_count: usize,
    /// Number of contributing dynamic sources.
    pub dynamic_policy_count: usize,
    /// Number of active rules, built-ins included.
    pub rule_count: usize,
    /// Dynamic sources dropped when the published snapshot was built.
    pub rejected: Vec<RejectedSource>,
    /// Current synchronizer state.
    pub state: SyncState,
    /// Most recent synchronization attempt, including failures.
    pub last_sync: SyncRecord,
}

/// Collect the status report. Never triggers a sync.
#[must_use]
pub fn report(sync: &Synchronizer) -> StatusReport {
    let snapshot = sync.current();
    StatusReport {
        version: snapshot.version(),
        digest: snapshot.digest().to_owned(),
        created_at: snapshot.created_at(),
        sources: snapshot
            .sources()
            .iter()
            .map(|source| SourceStatus {
                id: source.id(),
                kind: source.kind,
                path: source.path.display().to_string(),
            })
            .collect(),
        policy_count: snapshot.sources().len(),
        dynamic_policy_count: snapshot.source_count(SourceKind::Dynamic),
        rule_count: snapshot.rules().len(),
        rejected: snapshot.rejected().to_vec(),
        state: sync.state(),
        last_sync: sync.last_sync(),
    }
}
