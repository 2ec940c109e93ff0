//! Share account password
//!
//! A random password is generated on first use, saved under the data
//! directory's `secrets/`, and fed to `smbpasswd` for the share account. It
//! is never rotated here.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::process::{CommandRunner, CommandSpec, ProcessError};

/// Random bytes in a generated password (128 bits)
pub const TOKEN_BYTES: usize = 16;

/// Errors that can occur while provisioning the share password
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to generate random password: {0}")]
    Random(String),

    #[error("Failed to set share password: {0}")]
    Process(#[from] ProcessError),
}

/// Result type for credential operations
pub type CredentialResult<T> = Result<T, CredentialError>;

/// Generate a random hex token of [`TOKEN_BYTES`] bytes
pub fn generate_token() -> CredentialResult<String> {
    let mut bytes = [0u8; TOKEN_BYTES];
    getrandom::getrandom(&mut bytes).map_err(|e| CredentialError::Random(e.to_string()))?;
    Ok(hex::encode(bytes))
}

/// The persisted password for the share account
#[derive(Debug, Clone)]
pub struct ShareCredential {
    path: PathBuf,
    account: String,
}

impl ShareCredential {
    pub fn new(path: impl Into<PathBuf>, account: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            account: account.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the saved password, creating it on first use
    ///
    /// The token is written to a private temp file and linked into place, so
    /// the password file is never observed half written. An empty file left
    /// by an earlier failed run is replaced.
    pub async fn get_or_create(&self) -> CredentialResult<String> {
        if let Some(token) = self.read().await? {
            return Ok(token);
        }

        info!("Creating share password on first run");
        let parent = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        tokio::fs::create_dir_all(parent).await?;

        let token = generate_token()?;
        let temp_path = parent.join(format!(".share-password.{}.tmp", uuid::Uuid::new_v4()));
        let result = match write_private(&temp_path, &token).await {
            Ok(()) => self.install(&temp_path, token).await,
            Err(e) => Err(e.into()),
        };
        let _ = tokio::fs::remove_file(&temp_path).await;
        result
    }

    /// Move the token at `temp_path` into place unless a usable password
    /// already exists
    async fn install(&self, temp_path: &Path, token: String) -> CredentialResult<String> {
        match tokio::fs::hard_link(temp_path, &self.path).await {
            Ok(()) => Ok(token),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => match self.read().await? {
                // Someone else created it first; theirs wins
                Some(existing) => Ok(existing),
                None => {
                    warn!(path = %self.path.display(), "Replacing empty share password file");
                    tokio::fs::rename(temp_path, &self.path).await?;
                    Ok(token)
                }
            },
            Err(e) => Err(e.into()),
        }
    }

    /// Set the share account's samba password to the saved token
    ///
    /// Safe to repeat; the same password is applied each time.
    pub async fn apply(&self, runner: &dyn CommandRunner) -> CredentialResult<()> {
        let token = self.get_or_create().await?;

        let command = CommandSpec::new("smbpasswd")
            .args(["-s", "-a", self.account.as_str()])
            .stdin(format!("{}\n{}\n", token, token));
        runner.run(&command).await?;

        debug!(account = %self.account, "Applied share password");
        Ok(())
    }

    async fn read(&self) -> CredentialResult<Option<String>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => {
                let token = contents.trim();
                Ok((!token.is_empty()).then(|| token.to_string()))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

async fn write_private(path: &Path, contents: &str) -> io::Result<()> {
    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    options.mode(0o600);

    let mut file = options.open(path).await?;
    file.write_all(contents.as_bytes()).await?;
    file.sync_all().await?;
    Ok(())
}
