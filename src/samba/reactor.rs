//! Removes shares whose directory was deleted

use std::sync::Weak;

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use super::Samba;
use crate::events::FileChangeEvent;

/// Subscription to filesystem events
///
/// Dropping the handle or calling [`ReactorHandle::unsubscribe`] stops the
/// listener.
pub struct ReactorHandle {
    task: JoinHandle<()>,
}

impl ReactorHandle {
    pub fn unsubscribe(self) {
        // Drop aborts the task
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for ReactorHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Listen on `events` and hand each change to `samba`
///
/// Holds only a weak reference so the listener never keeps the service
/// alive on its own.
pub fn spawn(samba: Weak<Samba>, mut events: broadcast::Receiver<FileChangeEvent>) -> ReactorHandle {
    let task = tokio::spawn(async move {
        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(missed)) => {
                    warn!(missed, "File change listener lagged, events dropped");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };

            let Some(samba) = samba.upgrade() else {
                break;
            };

            if let Err(e) = samba.handle_file_change(&event).await {
                error!(
                    path = %event.path.display(),
                    error = %e,
                    "Failed to handle file change"
                );
            }
        }
        debug!("File change listener stopped");
    });

    ReactorHandle { task }
}
