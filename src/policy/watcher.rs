//! Filesystem change notifications for rule directories.
//!
//! Watches the base and dynamic rule directories with the `notify` crate
//! and turns relevant events into [`Synchronizer::trigger`] calls. The
//! watcher never loads rules itself; the synchronizer's background task
//! picks up the (coalesced) trigger and performs the build.

use std::path::Path;
use std::sync::Arc;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, info, warn};

use crate::policy::sync::Synchronizer;
use crate::{AppError, Result};

/// Extensions whose changes are relevant to the rule set.
const WATCHED_EXTENSIONS: &[&str] = &["json", "toml"];

/// Keeps the OS watch alive for its own lifetime.
///
/// Dropping a `PolicyWatcher` stops delivering change notifications.
pub struct PolicyWatcher {
    _watcher: RecommendedWatcher,
}

impl PolicyWatcher {
    /// Start watching the synchronizer's rule directories.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Sync` if the watcher cannot be created or a
    /// directory cannot be watched.
    pub fn start(sync: Arc<Synchronizer>) -> Result<Self> {
        let settings = sync.settings().clone();
        let callback_sync = Arc::clone(&sync);

        let mut watcher = notify::recommended_watcher(
            move |result: std::result::Result<Event, notify::Error>| match result {
                Ok(event) if is_rule_event(&event) => {
                    debug!(paths = ?event.paths, "rule source changed, triggering sync");
                    callback_sync.trigger();
                }
                Ok(_) => {}
                Err(err) => {
                    warn!(%err, "rule directory watcher error");
                }
            },
        )
        .map_err(|err| AppError::Sync(format!("failed to create watcher: {err}")))?;

        for dir in [&settings.base_dir, &settings.dynamic_dir] {
            watch_dir(&mut watcher, dir)?;
        }

        Ok(Self { _watcher: watcher })
    }
}

fn watch_dir(watcher: &mut RecommendedWatcher, dir: &Path) -> Result<()> {
    watcher
        .watch(dir, RecursiveMode::NonRecursive)
        .map_err(|err| {
            AppError::Sync(format!("failed to watch '{}': {err}", dir.display()))
        })?;
    info!(dir = %dir.display(), "watching rule directory");
    Ok(())
}

/// Create, modify, or remove of a visible rule document.
fn is_rule_event(event: &Event) -> bool {
    matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    ) && event.paths.iter().any(|path| {
        let visible = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| !name.starts_with('.'));
        let relevant = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| WATCHED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()));
        visible && relevant
    })
}
