//! Configuration management for smbshare
//!
//! Handles loading and saving configuration from ~/.config/smbshare/config.toml

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::host::RootMapping;
use crate::mount::MountOptions;
use crate::samba::SambaSettings;

/// Configuration file name
const CONFIG_FILE: &str = "config.toml";

/// Application name for config and data directories
const APP_NAME: &str = "smbshare";

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Could not determine data directory")]
    NoDataDir,
}

/// Result type for config operations
pub type ConfigResult<T> = Result<T, ConfigError>;

fn default_samba_config_path() -> PathBuf {
    PathBuf::from("/etc/samba/smb.conf")
}

fn default_product_name() -> String {
    "Homeserver".to_string()
}

fn default_home_path() -> String {
    "/Home".to_string()
}

fn default_service_account() -> String {
    APP_NAME.to_string()
}

fn default_force_user() -> String {
    "root".to_string()
}

fn default_mount_id() -> u32 {
    1000
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Directory holding the registry database and secrets
    /// (defaults to ~/.local/share/smbshare)
    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    /// Where smbd reads its configuration
    #[serde(default = "default_samba_config_path")]
    pub samba_config_path: PathBuf,

    /// Shown as the server string and appended to share names
    #[serde(default = "default_product_name")]
    pub product_name: String,

    /// Owner's display name, used to label the home share
    #[serde(default)]
    pub username: Option<String>,

    /// Virtual path of the owner's home directory
    #[serde(default = "default_home_path")]
    pub home_path: String,

    /// Samba account allowed to connect to shares
    #[serde(default = "default_service_account")]
    pub service_account: String,

    /// Owner forced on files written over SMB
    #[serde(default = "default_force_user")]
    pub force_user: String,

    /// Group forced on files written over SMB (defaults to the service account)
    #[serde(default)]
    pub force_group: Option<String>,

    /// Owner uid for remote shares mounted locally
    #[serde(default = "default_mount_id")]
    pub mount_uid: u32,

    /// Owner gid for remote shares mounted locally
    #[serde(default = "default_mount_id")]
    pub mount_gid: u32,

    /// Virtual roots and the directories backing them
    #[serde(default)]
    pub roots: Vec<RootMapping>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: None,
            samba_config_path: default_samba_config_path(),
            product_name: default_product_name(),
            username: None,
            home_path: default_home_path(),
            service_account: default_service_account(),
            force_user: default_force_user(),
            force_group: None,
            mount_uid: default_mount_id(),
            mount_gid: default_mount_id(),
            roots: Vec::new(),
        }
    }
}

impl Config {
    /// Create a new default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the config file path
    ///
    /// Returns ~/.config/smbshare/config.toml on Linux
    pub fn config_path() -> ConfigResult<PathBuf> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Load configuration from the default location
    ///
    /// Returns default config if file doesn't exist
    pub fn load() -> ConfigResult<Self> {
        let path = Self::config_path()?;
        Self::load_from(&path)
    }

    /// Load configuration from `path`
    ///
    /// Returns default config if file doesn't exist
    pub fn load_from(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to `path`
    ///
    /// Creates the parent directory if it doesn't exist
    pub fn save_to(&self, path: &Path) -> ConfigResult<()> {
        if let Some(dir) = path.parent() {
            if !dir.exists() {
                fs::create_dir_all(dir)?;
            }
        }

        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Effective data directory
    pub fn data_dir(&self) -> ConfigResult<PathBuf> {
        match &self.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(dirs::data_local_dir()
                .ok_or(ConfigError::NoDataDir)?
                .join(APP_NAME)),
        }
    }

    /// SQLite database holding the share registry
    pub fn db_path(&self) -> ConfigResult<PathBuf> {
        Ok(self.data_dir()?.join("store.db"))
    }

    /// File holding the generated share password
    pub fn share_password_path(&self) -> ConfigResult<PathBuf> {
        Ok(self.data_dir()?.join("secrets").join("share-password"))
    }

    /// Effective group forced on shared files
    pub fn effective_force_group(&self) -> &str {
        self.force_group
            .as_deref()
            .unwrap_or(self.service_account.as_str())
    }

    /// Settings for the samba service
    pub fn samba_settings(&self) -> ConfigResult<SambaSettings> {
        Ok(SambaSettings {
            config_path: self.samba_config_path.clone(),
            share_password_path: self.share_password_path()?,
            product_name: self.product_name.clone(),
            home_path: self.home_path.clone(),
            service_account: self.service_account.clone(),
            force_user: self.force_user.clone(),
            force_group: self.effective_force_group().to_string(),
        })
    }

    /// Ownership for locally mounted remote shares
    pub fn mount_options(&self) -> MountOptions {
        MountOptions {
            uid: self.mount_uid,
            gid: self.mount_gid,
        }
    }

    /// System directories of all configured roots
    pub fn watch_paths(&self) -> Vec<PathBuf> {
        self.roots
            .iter()
            .map(|root| root.system_root.clone())
            .collect()
    }
}

/// Format the configuration for display
pub fn format_config(config: &Config) -> String {
    let mut lines = Vec::new();

    lines.push("Current configuration:".to_string());
    lines.push(String::new());

    match config.data_dir() {
        Ok(dir) => lines.push(format!("  data_dir = \"{}\"", dir.display())),
        Err(_) => lines.push("  data_dir = (unknown)".to_string()),
    }
    lines.push(format!(
        "  samba_config_path = \"{}\"",
        config.samba_config_path.display()
    ));
    lines.push(format!("  product_name = \"{}\"", config.product_name));

    if let Some(ref username) = config.username {
        lines.push(format!("  username = \"{}\"", username));
    } else {
        lines.push("  username = (not set)".to_string());
    }

    lines.push(format!("  home_path = \"{}\"", config.home_path));
    lines.push(format!("  service_account = \"{}\"", config.service_account));
    lines.push(format!("  force_user = \"{}\"", config.force_user));
    lines.push(format!(
        "  force_group = \"{}\"",
        config.effective_force_group()
    ));
    lines.push(format!(
        "  mount_uid/mount_gid = {}/{}",
        config.mount_uid, config.mount_gid
    ));

    if config.roots.is_empty() {
        lines.push("  roots = (none)".to_string());
    } else {
        lines.push("  roots:".to_string());
        for root in &config.roots {
            lines.push(format!(
                "    {} -> {}",
                root.virtual_root,
                root.system_root.display()
            ));
        }
    }

    lines.join("\n")
}
