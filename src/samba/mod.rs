//! Samba share management
//!
//! [`Samba`] owns the share registry and keeps smbd in line with it: every
//! add or remove regenerates smb.conf from scratch and starts, reloads or
//! stops the daemon. It also listens for deleted directories and drops the
//! shares that pointed at them.

pub mod controller;
pub mod credential;
pub mod reactor;
pub mod render;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::events::{ChangeKind, EventBus, FileChangeEvent};
use crate::host::{
    is_same_or_nested, normalize_virtual_path, EntryKind, Files, FilesError, Operation, Users,
};
use crate::process::{CommandRunner, ProcessError};
use crate::shares::{allocate_name, ShareError, ShareRecord, ShareRegistry};
use crate::store::{Store, StoreError};

pub use controller::{ServiceAction, ServiceController, DISCOVERY_UNIT, SAMBA_UNIT};
pub use credential::{CredentialError, ShareCredential};
pub use reactor::ReactorHandle;
pub use render::{render_config, RenderError};

/// Errors that can occur in the samba service
#[derive(Debug, Error)]
pub enum SambaError {
    #[error(transparent)]
    Share(#[from] ShareError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Path error: {0}")]
    Files(#[from] FilesError),

    #[error("Failed to render samba config: {0}")]
    Render(#[from] RenderError),

    #[error("Failed to write samba config: {0}")]
    WriteConfig(std::io::Error),

    #[error("Service command failed: {0}")]
    Process(#[from] ProcessError),

    #[error("Credential error: {0}")]
    Credential(#[from] CredentialError),
}

/// Result type for samba operations
pub type SambaResult<T> = Result<T, SambaError>;

/// Fixed settings for rendering and applying samba configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SambaSettings {
    /// smb.conf location read by smbd
    pub config_path: PathBuf,
    /// Saved share password
    pub share_password_path: PathBuf,
    /// Product name: server string and share name suffix
    pub product_name: String,
    /// Virtual path of the owner's home directory
    pub home_path: String,
    /// The only account allowed to connect
    pub service_account: String,
    /// Owner forced on files written through samba
    pub force_user: String,
    /// Group forced on files written through samba
    pub force_group: String,
}

/// Share registry plus smbd synchronization
pub struct Samba {
    registry: ShareRegistry,
    files: Arc<dyn Files>,
    users: Arc<dyn Users>,
    runner: Arc<dyn CommandRunner>,
    events: EventBus,
    controller: ServiceController,
    credential: ShareCredential,
    settings: SambaSettings,
    /// Serializes render + write + service commands
    sync_lock: tokio::sync::Mutex<()>,
    reactor: Mutex<Option<ReactorHandle>>,
}

impl Samba {
    pub fn new(
        store: Arc<Store>,
        files: Arc<dyn Files>,
        users: Arc<dyn Users>,
        runner: Arc<dyn CommandRunner>,
        events: EventBus,
        settings: SambaSettings,
    ) -> Self {
        Self {
            registry: ShareRegistry::new(store),
            files,
            users,
            controller: ServiceController::new(Arc::clone(&runner)),
            credential: ShareCredential::new(
                settings.share_password_path.clone(),
                settings.service_account.clone(),
            ),
            runner,
            events,
            settings,
            sync_lock: tokio::sync::Mutex::new(()),
            reactor: Mutex::new(None),
        }
    }

    pub fn settings(&self) -> &SambaSettings {
        &self.settings
    }

    pub fn registry(&self) -> &ShareRegistry {
        &self.registry
    }

    pub fn credential(&self) -> &ShareCredential {
        &self.credential
    }

    /// Apply the share password, sync shares, and start listening for
    /// deleted directories
    ///
    /// Password and sync failures are logged and startup continues; the
    /// host process keeps running without working shares.
    pub async fn start(self: &Arc<Self>) {
        info!("Starting samba");

        if let Err(e) = self.apply_share_password().await {
            error!(error = %e, "Failed to apply share password");
        }

        if let Err(e) = self.apply_shares().await {
            error!(error = %e, "Failed to apply shares");
        }

        let handle = reactor::spawn(Arc::downgrade(self), self.events.subscribe());
        match self.reactor.lock() {
            Ok(mut reactor) => {
                // Replacing an earlier handle drops and stops it
                *reactor = Some(handle);
            }
            Err(_) => error!("Failed to store file change listener"),
        }
    }

    /// Stop listening for changes, then stop smbd and wsdd2
    ///
    /// Failures are logged, never returned.
    pub async fn stop(&self) {
        info!("Stopping samba");

        let handle = match self.reactor.lock() {
            Ok(mut reactor) => reactor.take(),
            Err(_) => {
                error!("Failed to take file change listener");
                None
            }
        };
        if let Some(handle) = handle {
            handle.unsubscribe();
        }

        if let Err(e) = self.controller.stop(SAMBA_UNIT).await {
            error!(error = %e, "Failed to stop samba");
        }
        if let Err(e) = self.controller.stop(DISCOVERY_UNIT).await {
            error!(error = %e, "Failed to stop wsdd2");
        }
    }

    /// Whether the deleted-directory listener is running
    pub fn is_listening(&self) -> bool {
        self.reactor
            .lock()
            .map(|reactor| reactor.as_ref().is_some_and(|h| !h.is_finished()))
            .unwrap_or(false)
    }

    /// Make sure the share password exists and set it for the share account
    pub async fn apply_share_password(&self) -> SambaResult<()> {
        self.credential.apply(self.runner.as_ref()).await?;
        Ok(())
    }

    /// Regenerate smb.conf from the registry and bring smbd in line
    ///
    /// On a render error nothing is written and the previous configuration
    /// stays in place.
    pub async fn apply_shares(&self) -> SambaResult<ServiceAction> {
        let _sync = self.sync_lock.lock().await;

        let shares = self.registry.list()?;
        let username = self.users.username().await;
        let config =
            render_config(&shares, self.files.as_ref(), username.as_deref(), &self.settings)
                .await?;

        controller::write_config(&self.settings.config_path, &config)
            .await
            .map_err(SambaError::WriteConfig)?;
        debug!(path = %self.settings.config_path.display(), "Wrote samba config");

        let action = self.controller.sync(!shares.is_empty()).await?;
        info!(shares = shares.len(), action = ?action, "Applied shares");
        Ok(action)
    }

    /// Shares whose path is currently an existing directory
    ///
    /// Stale records are filtered out here, not removed.
    pub async fn list_shares(&self) -> SambaResult<Vec<ShareRecord>> {
        let shares = self.registry.list()?;

        let mut existing = Vec::with_capacity(shares.len());
        for share in shares {
            if self.is_directory(&share.path).await {
                existing.push(share);
            }
        }
        Ok(existing)
    }

    /// Share the directory at `virtual_path`
    ///
    /// Fails without touching the registry if sharing is not allowed, the
    /// path is not a directory, it is already shared, or no free name is
    /// found. The returned record carries the allocated display name.
    pub async fn add_share(&self, virtual_path: &str) -> SambaResult<ShareRecord> {
        let path = normalize_virtual_path(virtual_path)
            .map_err(|_| ShareError::OperationNotAllowed(virtual_path.to_string()))?;

        let allowed = self.files.allowed_operations(&path).await?;
        if !allowed.contains(&Operation::Share) {
            return Err(ShareError::OperationNotAllowed(path).into());
        }
        if !self.is_directory(&path).await {
            return Err(ShareError::NotADirectory(path).into());
        }

        info!(path = %path, "Adding share");

        let record = self
            .registry
            .mutate(|shares, pending| {
                if shares.iter().any(|share| share.path == path) {
                    return Err(ShareError::AlreadyExists(path.clone()));
                }

                let record = ShareRecord::new(allocate_name(&path, shares)?, path.clone());
                let mut next = shares.to_vec();
                next.push(record.clone());
                pending.set(next);
                Ok(record)
            })
            .await?;

        self.apply_shares().await?;
        Ok(record)
    }

    /// Stop sharing `virtual_path`
    ///
    /// Returns `false` and changes nothing if it was not shared. Clients
    /// already connected to the share stay connected until they disconnect.
    pub async fn remove_share(&self, virtual_path: &str) -> SambaResult<bool> {
        info!(path = %virtual_path, "Removing share");

        let path = normalize_virtual_path(virtual_path).unwrap_or_else(|_| virtual_path.to_string());
        let removed = self.remove_where(|share| share.path == path).await?;
        Ok(!removed.is_empty())
    }

    /// Stop sharing `virtual_path` and everything nested below it
    pub async fn remove_shares_under(&self, virtual_path: &str) -> SambaResult<Vec<ShareRecord>> {
        self.remove_where(|share| is_same_or_nested(&share.path, virtual_path))
            .await
    }

    /// React to a filesystem change; deletes drop the affected shares
    ///
    /// A moved directory looks the same as a deleted one, so moving a shared
    /// directory also drops its share.
    pub async fn handle_file_change(&self, event: &FileChangeEvent) -> SambaResult<Vec<ShareRecord>> {
        if event.kind != ChangeKind::Delete {
            return Ok(Vec::new());
        }

        let virtual_path = match self.files.system_to_virtual(&event.path).await {
            Ok(path) => path,
            Err(e) => {
                debug!(path = %event.path.display(), error = %e, "Ignoring change outside shared roots");
                return Ok(Vec::new());
            }
        };

        let removed = self.remove_shares_under(&virtual_path).await?;
        for share in &removed {
            info!(path = %share.path, "Removed share for deleted directory");
        }
        Ok(removed)
    }

    /// Remove every record matching `predicate` in one registry write, then
    /// sync once if anything was removed
    async fn remove_where<P>(&self, predicate: P) -> SambaResult<Vec<ShareRecord>>
    where
        P: Fn(&ShareRecord) -> bool + Send + Sync,
    {
        let removed = self
            .registry
            .mutate(|shares, pending| {
                let (removed, kept): (Vec<ShareRecord>, Vec<ShareRecord>) =
                    shares.iter().cloned().partition(|share| predicate(share));
                if !removed.is_empty() {
                    pending.set(kept);
                }
                Ok::<_, ShareError>(removed)
            })
            .await?;

        if !removed.is_empty() {
            self.apply_shares().await?;
        }
        Ok(removed)
    }

    async fn is_directory(&self, virtual_path: &str) -> bool {
        let system_path = match self.files.virtual_to_system(virtual_path).await {
            Ok(path) => path,
            Err(e) => {
                warn!(path = %virtual_path, error = %e, "Cannot translate share path");
                return false;
            }
        };

        matches!(
            self.files.status(&system_path).await,
            Ok(Some(EntryKind::Directory))
        )
    }
}
