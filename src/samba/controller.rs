//! Samba and wsdd2 service control

use std::io;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};

use crate::process::{CommandRunner, CommandSpec, ProcessResult};

/// systemd unit of the SMB daemon
pub const SAMBA_UNIT: &str = "smbd";

/// systemd unit of the WS-Discovery daemon advertising shares to Windows
pub const DISCOVERY_UNIT: &str = "wsdd2";

/// What a sync did to the SMB daemon
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceAction {
    /// No shares; the daemon was stopped
    Stopped,
    /// The daemon was not running and was started
    Started,
    /// The daemon was running and re-read its configuration
    Reloaded,
}

/// Drives smbd and wsdd2 through systemctl and smbcontrol
#[derive(Clone)]
pub struct ServiceController {
    runner: Arc<dyn CommandRunner>,
}

impl ServiceController {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    pub async fn is_active(&self, unit: &str) -> ProcessResult<bool> {
        let output = self
            .runner
            .output(&CommandSpec::new("systemctl").args(["is-active", "--quiet", unit]))
            .await?;
        Ok(output.success)
    }

    pub async fn start(&self, unit: &str) -> ProcessResult<()> {
        debug!(unit, "Starting unit");
        self.runner
            .run(&CommandSpec::new("systemctl").args(["start", unit]))
            .await?;
        Ok(())
    }

    pub async fn stop(&self, unit: &str) -> ProcessResult<()> {
        debug!(unit, "Stopping unit");
        self.runner
            .run(&CommandSpec::new("systemctl").args(["stop", unit]))
            .await?;
        Ok(())
    }

    /// Ask a running smbd to re-read smb.conf without dropping clients
    pub async fn reload(&self) -> ProcessResult<()> {
        debug!("Reloading samba configuration");
        self.runner
            .run(&CommandSpec::new("smbcontrol").args([SAMBA_UNIT, "reload-config"]))
            .await?;
        Ok(())
    }

    /// Bring services in line with a freshly written configuration
    ///
    /// With no shares smbd is stopped. Otherwise smbd is started if needed or
    /// reloaded if already running, and wsdd2 is started afterwards every
    /// time: it exits when smbd is absent at its own startup and does not
    /// come back on its own.
    pub async fn sync(&self, has_shares: bool) -> ProcessResult<ServiceAction> {
        if !has_shares {
            self.stop(SAMBA_UNIT).await?;
            info!("No shares, samba stopped");
            return Ok(ServiceAction::Stopped);
        }

        let action = if self.is_active(SAMBA_UNIT).await? {
            self.reload().await?;
            ServiceAction::Reloaded
        } else {
            self.start(SAMBA_UNIT).await?;
            ServiceAction::Started
        };

        self.start(DISCOVERY_UNIT).await?;
        Ok(action)
    }
}

/// Replace the file at `path` with `contents` via a sibling temp file and rename
pub async fn write_config(path: &Path, contents: &str) -> io::Result<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    tokio::fs::create_dir_all(parent).await?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "smb.conf".to_string());
    let temp_path = parent.join(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4()));

    if let Err(e) = tokio::fs::write(&temp_path, contents).await {
        let _ = tokio::fs::remove_file(&temp_path).await;
        return Err(e);
    }
    if let Err(e) = tokio::fs::rename(&temp_path, path).await {
        let _ = tokio::fs::remove_file(&temp_path).await;
        return Err(e);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::mock::MockRunner;
    use tempfile::TempDir;

    fn controller(runner: &MockRunner) -> ServiceController {
        ServiceController::new(Arc::new(runner.clone()))
    }

    #[tokio::test]
    async fn test_sync_starts_stopped_samba() {
        let runner = MockRunner::new();
        let action = controller(&runner).sync(true).await.unwrap();

        assert_eq!(action, ServiceAction::Started);
        assert_eq!(
            runner.command_lines(),
            vec![
                "systemctl is-active --quiet smbd",
                "systemctl start smbd",
                "systemctl start wsdd2",
            ]
        );
    }

    #[tokio::test]
    async fn test_sync_reloads_running_samba() {
        let runner = MockRunner::new().with_active_unit("smbd");
        let action = controller(&runner).sync(true).await.unwrap();

        assert_eq!(action, ServiceAction::Reloaded);
        assert_eq!(
            runner.command_lines(),
            vec![
                "systemctl is-active --quiet smbd",
                "smbcontrol smbd reload-config",
                "systemctl start wsdd2",
            ]
        );
    }

    #[tokio::test]
    async fn test_sync_without_shares_stops_samba() {
        let runner = MockRunner::new().with_active_unit("smbd");
        let action = controller(&runner).sync(false).await.unwrap();

        assert_eq!(action, ServiceAction::Stopped);
        assert_eq!(runner.command_lines(), vec!["systemctl stop smbd"]);
        assert!(!runner.is_unit_active("smbd"));
    }

    #[tokio::test]
    async fn test_sync_propagates_failures() {
        let runner = MockRunner::new().fail_on("systemctl start smbd");
        assert!(controller(&runner).sync(true).await.is_err());
        // wsdd2 is not started without smbd
        assert!(!runner
            .command_lines()
            .contains(&"systemctl start wsdd2".to_string()));
    }

    #[tokio::test]
    async fn test_write_config_replaces_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("samba").join("smb.conf");

        write_config(&path, "first").await.unwrap();
        write_config(&path, "second").await.unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "second");

        // No temp files left behind
        let entries: Vec<_> = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .collect();
        assert_eq!(entries.len(), 1);
    }
}
