//! File watcher for shared roots.
//!
//! Watches the configured system roots recursively and publishes
//! add/change/delete events onto the [`EventBus`].

use std::path::PathBuf;

use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, warn};

use crate::events::{ChangeKind, EventBus, FileChangeEvent};

/// Handle to a running file watcher.
///
/// Watching stops when the handle is dropped.
pub struct FileWatcher {
    /// The watcher itself (kept alive to continue watching).
    _watcher: RecommendedWatcher,
    watched: Vec<PathBuf>,
}

impl FileWatcher {
    /// Start watching `watch_paths`, publishing changes onto `bus`.
    ///
    /// Paths that do not exist yet are skipped with a warning.
    pub fn new(watch_paths: Vec<PathBuf>, bus: EventBus) -> Result<Self, notify::Error> {
        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            match res {
                Ok(event) => {
                    for change in translate_event(event) {
                        debug!(kind = ?change.kind, path = %change.path.display(), "File change");
                        bus.publish(change);
                    }
                }
                Err(e) => warn!(error = %e, "File watcher error"),
            }
        })?;

        let mut watched = Vec::new();
        for path in watch_paths {
            if path.exists() {
                watcher.watch(&path, RecursiveMode::Recursive)?;
                watched.push(path);
            } else {
                warn!(path = %path.display(), "Not watching missing root");
            }
        }

        Ok(Self {
            _watcher: watcher,
            watched,
        })
    }

    /// Roots actually being watched.
    pub fn watched(&self) -> &[PathBuf] {
        &self.watched
    }
}

/// Map a notify event onto zero or more change events.
///
/// A rename away from a path is reported as a delete of that path; there is
/// no way to tell it apart from a real deletion at this level.
pub fn translate_event(event: Event) -> Vec<FileChangeEvent> {
    let kind = match event.kind {
        EventKind::Create(_) => ChangeKind::Add,
        EventKind::Remove(_) => ChangeKind::Delete,
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => ChangeKind::Delete,
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => ChangeKind::Add,
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            // Paths are [from, to]
            let mut paths = event.paths.into_iter();
            let mut changes = Vec::new();
            if let Some(from) = paths.next() {
                changes.push(FileChangeEvent::new(ChangeKind::Delete, from));
            }
            if let Some(to) = paths.next() {
                changes.push(FileChangeEvent::new(ChangeKind::Add, to));
            }
            return changes;
        }
        EventKind::Modify(_) => ChangeKind::Change,
        _ => return Vec::new(),
    };

    event
        .paths
        .into_iter()
        .map(|path| FileChangeEvent::new(kind, path))
        .collect()
}
