//! Snapshot synchronizer.
//!
//! Owns the "currently published snapshot" pointer and the only code path
//! that replaces it. Builds run through [`PolicyLoader`] on a blocking
//! thread under a time budget; a successful build is published with one
//! pointer assignment, anything else leaves the published snapshot alone
//! and is recorded for the status reporter.
//!
//! ## State machine
//!
//! `Idle → Building → (Publishing | RolledBack) → Idle`
//!
//! At most one build runs at a time (`build_gate`). Background triggers
//! from the timer and the file watcher are coalesced through a single
//! [`Notify`] permit; explicit reloads queue on the gate.

use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};

use crate::models::snapshot::{RejectedSource, RuleSnapshot};
use crate::policy::loader::PolicyLoader;
use crate::{AppError, Result};

/// Where rules come from and how long a build may take.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    /// Required base rule directory.
    pub base_dir: PathBuf,
    /// Watched dynamic rule directory.
    pub dynamic_dir: PathBuf,
    /// Loader time budget.
    pub load_timeout: Duration,
}

impl SyncSettings {
    /// Derive settings from the global configuration.
    #[must_use]
    pub fn from_config(config: &crate::GlobalConfig) -> Self {
        Self {
            base_dir: config.base_dir.clone(),
            dynamic_dir: config.dynamic_dir.clone(),
            load_timeout: config.load_timeout(),
        }
    }
}

/// Synchronizer lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    /// Waiting for a trigger.
    Idle,
    /// Loader running.
    Building,
    /// Swapping the published pointer.
    Publishing,
    /// Build failed; previous snapshot kept.
    RolledBack,
}

/// Result of one synchronization attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOutcome {
    /// A new snapshot was published.
    Published,
    /// Published at bootstrap with some dynamic sources rejected.
    Degraded,
    /// Content identical to the published snapshot; nothing swapped.
    Unchanged,
    /// Build failed or was rejected; previous snapshot kept.
    Failed,
    /// Explicitly cancelled before publish.
    Cancelled,
}

/// Record of the most recent synchronization attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRecord {
    /// What happened.
    pub outcome: SyncOutcome,
    /// When it finished.
    pub timestamp: DateTime<Utc>,
    /// Version published after the attempt.
    pub version: u64,
    /// Failure reason, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Dynamic sources rejected during the attempt.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rejected: Vec<RejectedSource>,
}

/// Reply to an explicit reload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReloadResult {
    /// `true` when the published snapshot reflects the current sources.
    pub success: bool,
    /// Published version after the attempt.
    pub version: u64,
    /// Failure reason, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Builds, validates, and atomically publishes rule snapshots.
pub struct Synchronizer {
    settings: SyncSettings,
    /// Loader budget; starts at `settings.load_timeout`.
    load_timeout: RwLock<Duration>,
    /// Published snapshot; replaced wholesale, never mutated.
    published: RwLock<Arc<RuleSnapshot>>,
    /// Serializes builds and holds the last assigned version.
    build_gate: Mutex<u64>,
    state: RwLock<SyncState>,
    last_sync: RwLock<SyncRecord>,
    wake: Notify,
}

impl Synchronizer {
    /// Perform the initial load and publish version 1.
    ///
    /// Rejected dynamic sources do not block startup; the result is
    /// recorded as [`SyncOutcome::Degraded`].
    ///
    /// # Errors
    ///
    /// Returns the loader error when the base rule set cannot be loaded or
    /// the build exceeds its time budget.
    pub async fn bootstrap(settings: SyncSettings) -> Result<Arc<Self>> {
        let snapshot = build(&settings, settings.load_timeout).await?;
        let snapshot = Arc::new(snapshot.with_version(1));

        let outcome = if snapshot.rejected().is_empty() {
            SyncOutcome::Published
        } else {
            SyncOutcome::Degraded
        };
        info!(
            version = 1,
            digest = %snapshot.digest(),
            ?outcome,
            "initial rule snapshot published"
        );

        let record = SyncRecord {
            outcome,
            timestamp: Utc::now(),
            version: 1,
            error: None,
            rejected: snapshot.rejected().to_vec(),
        };

        Ok(Arc::new(Self {
            load_timeout: RwLock::new(settings.load_timeout),
            settings,
            published: RwLock::new(snapshot),
            build_gate: Mutex::new(1),
            state: RwLock::new(SyncState::Idle),
            last_sync: RwLock::new(record),
            wake: Notify::new(),
        }))
    }

    /// The currently published snapshot.
    ///
    /// The returned `Arc` stays valid and consistent for as long as the
    /// caller holds it, regardless of later publishes.
    #[must_use]
    pub fn current(&self) -> Arc<RuleSnapshot> {
        Arc::clone(&self.published.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Lifecycle state.
    #[must_use]
    pub fn state(&self) -> SyncState {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Most recent synchronization attempt.
    #[must_use]
    pub fn last_sync(&self) -> SyncRecord {
        self.last_sync
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Build settings as given at bootstrap.
    #[must_use]
    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// Time budget applied to the next build.
    #[must_use]
    pub fn load_timeout(&self) -> Duration {
        *self.load_timeout.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Change the time budget for subsequent builds.
    pub fn set_load_timeout(&self, timeout: Duration) {
        *self.load_timeout.write().unwrap_or_else(PoisonError::into_inner) = timeout;
        info!(timeout_ms = timeout.as_millis(), "rule load budget changed");
    }

    /// Request a background sync. Repeated triggers before the background
    /// task picks one up collapse into a single run.
    pub fn trigger(&self) {
        self.wake.notify_one();
    }

    /// Synchronize now and report the result.
    pub async fn reload(&self) -> ReloadResult {
        self.reload_with_cancel(&CancellationToken::new()).await
    }

    /// Synchronize now; abandon the build if `cancel` fires before publish.
    pub async fn reload_with_cancel(&self, cancel: &CancellationToken) -> ReloadResult {
        self.sync_once(cancel)
            .instrument(info_span!("policy_sync"))
            .await
    }

    async fn sync_once(&self, cancel: &CancellationToken) -> ReloadResult {
        let mut version = self.build_gate.lock().await;
        self.set_state(SyncState::Building);

        let built = tokio::select! {
            () = cancel.cancelled() => Err(AppError::Cancelled("reload cancelled before publish".into())),
            result = build(&self.settings, self.load_timeout()) => result,
        };

        let built = match built {
            Ok(_) if cancel.is_cancelled() => Err((
                AppError::Cancelled("reload cancelled before publish".into()),
                Vec::new(),
            )),
            Ok(snapshot) if !snapshot.rejected().is_empty() => {
                let reasons: Vec<String> = snapshot
                    .rejected()
                    .iter()
                    .map(|r| format!("{}: {}", r.source, r.reason))
                    .collect();
                Err((
                    AppError::Sync(format!("rejected rule definitions: {}", reasons.join("; "))),
                    snapshot.rejected().to_vec(),
                ))
            }
            other => other.map_err(|err| (err, Vec::new())),
        };

        let result = match built {
            Ok(snapshot) => self.publish(snapshot, &mut version),
            Err((err, rejected)) => self.roll_back(&err, rejected, *version),
        };

        self.set_state(SyncState::Idle);
        result
    }

    fn publish(&self, snapshot: RuleSnapshot, version: &mut u64) -> ReloadResult {
        let current = self.current();
        if snapshot.digest() == current.digest() && current.rejected().is_empty() {
            info!(version = *version, "rule sources unchanged");
            self.record(SyncOutcome::Unchanged, *version, None, Vec::new());
            return ReloadResult {
                success: true,
                version: *version,
                error: None,
            };
        }

        self.set_state(SyncState::Publishing);
        let next = *version + 1;
        let snapshot = Arc::new(snapshot.with_version(next));
        *self.published.write().unwrap_or_else(PoisonError::into_inner) = Arc::clone(&snapshot);
        *version = next;

        info!(
            version = next,
            digest = %snapshot.digest(),
            rules = snapshot.rules().len(),
            "rule snapshot published"
        );
        self.record(SyncOutcome::Published, next, None, Vec::new());
        ReloadResult {
            success: true,
            version: next,
            error: None,
        }
    }

    fn roll_back(&self, err: &AppError, rejected: Vec<RejectedSource>, version: u64) -> ReloadResult {
        self.set_state(SyncState::RolledBack);
        let outcome = if matches!(err, AppError::Cancelled(_)) {
            warn!(%err, version, "reload cancelled, keeping published snapshot");
            SyncOutcome::Cancelled
        } else {
            error!(%err, version, "rule sync failed, keeping last good snapshot");
            SyncOutcome::Failed
        };
        self.record(outcome, version, Some(err.to_string()), rejected);
        ReloadResult {
            success: false,
            version,
            error: Some(err.to_string()),
        }
    }

    fn set_state(&self, state: SyncState) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = state;
    }

    fn record(
        &self,
        outcome: SyncOutcome,
        version: u64,
        error: Option<String>,
        rejected: Vec<RejectedSource>,
    ) {
        *self.last_sync.write().unwrap_or_else(PoisonError::into_inner) = SyncRecord {
            outcome,
            timestamp: Utc::now(),
            version,
            error,
            rejected,
        };
    }
}

/// Run the loader on a blocking thread under the configured time budget.
async fn build(settings: &SyncSettings, budget: Duration) -> Result<RuleSnapshot> {
    let base = settings.base_dir.clone();
    let dynamic = settings.dynamic_dir.clone();
    let task = tokio::task::spawn_blocking(move || {
        let sources = PolicyLoader::discover(&base, &dynamic)?;
        PolicyLoader::load(&sources)
    });

    match tokio::time::timeout(budget, task).await {
        Ok(Ok(result)) => result,
        Ok(Err(err)) => Err(AppError::Sync(format!("loader task failed: {err}"))),
        Err(_) => Err(AppError::Timeout(format!(
            "rule load exceeded {}ms",
            budget.as_millis()
        ))),
    }
}

/// Spawn the background sync loop.
///
/// Runs a sync on every timer tick (when `poll_interval` is set) and on
/// every coalesced [`Synchronizer::trigger`], until `cancel` fires.
#[must_use]
pub fn spawn_sync_task(
    sync: Arc<Synchronizer>,
    poll_interval: Option<Duration>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = poll_interval.map(|period| {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            interval
        });

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    info!("policy sync task shutting down");
                    break;
                }
                () = sync.wake.notified() => {}
                () = next_tick(&mut timer) => {}
            }

            let result = sync.reload_with_cancel(&cancel).await;
            if !result.success && !cancel.is_cancelled() {
                warn!(version = result.version, "background rule sync did not publish");
            }
        }
    })
}

async fn next_tick(timer: &mut Option<Interval>) {
    match timer {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
