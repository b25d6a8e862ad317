//! Picks up ignore-file edits made while `ft track` is running.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use ft_core::{IgnoreChanges, IgnoreList, Tracker};
use tracing::{info, warn};

/// Modification time and length, or `None` when the file is missing.
type Stamp = Option<(Option<SystemTime>, u64)>;

fn stamp(path: &Path) -> Stamp {
    std::fs::metadata(path)
        .ok()
        .map(|meta| (meta.modified().ok(), meta.len()))
}

/// Reloads the ignore file whenever its metadata changes.
#[derive(Debug)]
pub struct IgnoreWatcher {
    path: PathBuf,
    last: Stamp,
}

impl IgnoreWatcher {
    /// Starts watching `path` from its current state.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let last = stamp(&path);
        Self { path, last }
    }

    /// Applies any change to `tracker`. Returns `None` when the file is
    /// untouched or could not be read.
    pub fn sync(&mut self, tracker: &Tracker) -> Option<IgnoreChanges> {
        let current = stamp(&self.path);
        if current == self.last {
            return None;
        }
        let latest = match IgnoreList::load(&self.path) {
            Ok(latest) => latest,
            Err(err) => {
                warn!(error = %err, "failed to reload ignore list");
                return None;
            }
        };
        self.last = current;

        let changes = tracker.sync_ignored(latest);
        for app in &changes.added {
            info!(application_id = %app, "application ignored");
        }
        for app in &changes.removed {
            info!(application_id = %app, "application no longer ignored");
        }
        Some(changes)
    }
}
