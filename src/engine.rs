//! Transport-agnostic entry points: `EvaluateLog`, `EvaluateArtifacts`,
//! `Reload`, and `Status`.
//!
//! Evaluation reads whatever snapshot is published at call time and holds
//! it for the whole call; it never waits on a running sync.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::models::artifact::Artifact;
use crate::models::payload::LogPayload;
use crate::models::violation::Decision;
use crate::policy::status::{self, StatusReport};
use crate::policy::sync::{ReloadResult, SyncSettings, Synchronizer};
use crate::policy::{gatekeeper, log_filter};
use crate::Result;

/// Compliance engine handle. Cheap to clone.
#[derive(Clone)]
pub struct ComplianceEngine {
    sync: Arc<Synchronizer>,
}

impl ComplianceEngine {
    /// Load the initial rule set and return a ready engine.
    ///
    /// # Errors
    ///
    /// Returns the loader error if the base rule set cannot be loaded.
    pub async fn start(settings: SyncSettings) -> Result<Self> {
        Ok(Self {
            sync: Synchronizer::bootstrap(settings).await?,
        })
    }

    /// Wrap an existing synchronizer.
    #[must_use]
    pub fn from_synchronizer(sync: Arc<Synchronizer>) -> Self {
        Self { sync }
    }

    /// The underlying synchronizer.
    #[must_use]
    pub fn synchronizer(&self) -> &Arc<Synchronizer> {
        &self.sync
    }

    /// `EvaluateLog(payload) → {allow, violations}`.
    #[must_use]
    pub fn evaluate_log(&self, payload: &LogPayload) -> Decision {
        let snapshot = self.sync.current();
        Decision::from_violations(log_filter::evaluate(&snapshot, payload))
    }

    /// `EvaluateArtifacts(artifacts) → {allow, violations}`.
    #[must_use]
    pub fn evaluate_artifacts(&self, artifacts: &[Artifact]) -> Decision {
        let snapshot = self.sync.current();
        Decision::from_violations(gatekeeper::evaluate(&snapshot, artifacts))
    }

    /// `Reload() → {success, version, error?}`.
    pub async fn reload(&self) -> ReloadResult {
        self.sync.reload().await
    }

    /// Reload that is abandoned if `cancel` fires before publish.
    pub async fn reload_with_cancel(&self, cancel: &CancellationToken) -> ReloadResult {
        self.sync.reload_with_cancel(cancel).await
    }

    /// `Status()`.
    #[must_use]
    pub fn status(&self) -> StatusReport {
        status::report(&self.sync)
    }
}
