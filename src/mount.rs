//! Mounting remote SMB shares locally
//!
//! The reverse direction of the rest of the crate: a share published by
//! another machine is mounted onto a local directory with `mount -t cifs`.

use std::io;
use std::path::Path;
use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::process::{CommandRunner, CommandSpec, ProcessError};

/// Error types for mount operations
#[derive(Debug, Error)]
pub enum MountError {
    #[error("Invalid {0}: contains characters mount cannot accept")]
    InvalidCredential(&'static str),

    #[error("Failed to create mount point: {0}")]
    Io(#[from] io::Error),

    #[error("Mount failed: {0}")]
    Process(#[from] ProcessError),
}

/// Result type for mount operations
pub type MountResult<T> = Result<T, MountError>;

/// Ownership given to files on a mounted share
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MountOptions {
    pub uid: u32,
    pub gid: u32,
}

impl Default for MountOptions {
    fn default() -> Self {
        Self {
            uid: 1000,
            gid: 1000,
        }
    }
}

/// Mounts remote shares through the system `mount` command
#[derive(Clone)]
pub struct ExternalMounts {
    runner: Arc<dyn CommandRunner>,
    options: MountOptions,
}

impl ExternalMounts {
    pub fn new(runner: Arc<dyn CommandRunner>, options: MountOptions) -> Self {
        Self { runner, options }
    }

    /// Mount `remote` (e.g. `//nas.local/Media`) at `local_path`, creating
    /// the directory first
    ///
    /// The username travels in `-o`. The password is handed to `mount.cifs`
    /// through the `PASSWD` environment variable, so it never shows up in
    /// the process list. Neither is logged.
    pub async fn mount(
        &self,
        remote: &str,
        local_path: &Path,
        username: &str,
        password: &str,
    ) -> MountResult<()> {
        if username.contains(&[',', '\n', '\r', '\0'][..]) {
            return Err(MountError::InvalidCredential("username"));
        }
        if password.contains('\0') {
            return Err(MountError::InvalidCredential("password"));
        }

        tokio::fs::create_dir_all(local_path).await?;

        let options = format!(
            "username={},uid={},gid={}",
            username, self.options.uid, self.options.gid
        );
        let command = CommandSpec::new("mount")
            .args(["-t", "cifs", remote])
            .arg(local_path.to_string_lossy())
            .args(["-o", options.as_str()])
            .env("PASSWD", password);

        self.runner.run(&command).await?;

        info!(remote = %remote, path = %local_path.display(), "Mounted remote share");
        Ok(())
    }
}
