//! In-process event bus for filesystem change notifications.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::broadcast;

/// Default number of buffered events per subscriber.
const DEFAULT_CAPACITY: usize = 256;

/// Kind of filesystem change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Add,
    Change,
    Delete,
}

/// A change to a real filesystem path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChangeEvent {
    #[serde(rename = "type")]
    pub kind: ChangeKind,
    pub path: PathBuf,
}

impl FileChangeEvent {
    pub fn new(kind: ChangeKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }

    pub fn delete(path: impl Into<PathBuf>) -> Self {
        Self::new(ChangeKind::Delete, path)
    }
}

/// Broadcast bus for [`FileChangeEvent`]s.
///
/// Cloning the bus yields another handle onto the same channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<FileChangeEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Receive every event published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<FileChangeEvent> {
        self.tx.subscribe()
    }

    /// Publish an event, returning how many subscribers will see it.
    pub fn publish(&self, event: FileChangeEvent) -> usize {
        // No subscribers is not an error
        self.tx.send(event).unwrap_or(0)
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
