//! smb.conf generation
//!
//! The whole file is regenerated from the registry on every sync. Output is
//! deterministic for the same share list and collaborator answers.

use std::collections::HashSet;
use std::fmt::Write as _;

use thiserror::Error;

use super::SambaSettings;
use crate::host::{Files, FilesError};
use crate::shares::{clean_name, ShareRecord};

/// Errors that can occur while rendering the configuration
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Failed to translate {path}: {source}")]
    Translate {
        path: String,
        #[source]
        source: FilesError,
    },

    #[error("Path cannot be written to smb.conf: {0}")]
    InvalidPath(String),
}

/// Result type for rendering
pub type RenderResult<T> = Result<T, RenderError>;

/// Render the global section followed by one section per share, in order
///
/// A share that cannot be translated fails the whole render; nothing is
/// silently skipped.
pub async fn render_config(
    shares: &[ShareRecord],
    files: &dyn Files,
    username: Option<&str>,
    settings: &SambaSettings,
) -> RenderResult<String> {
    let mut config = global_section(settings);
    let mut sections = HashSet::new();

    for share in shares {
        let name = unique_section(display_name(share, username, settings), &mut sections);

        let system_path =
            files
                .virtual_to_system(&share.path)
                .await
                .map_err(|source| RenderError::Translate {
                    path: share.path.clone(),
                    source,
                })?;
        let system_path = system_path.to_string_lossy();
        // smbd expands %-macros in `path`
        if system_path.chars().any(|c| c.is_control() || c == '%') {
            return Err(RenderError::InvalidPath(share.path.clone()));
        }

        config.push_str(&share_section(&name, &system_path, settings));
    }

    Ok(config)
}

/// Name shown to clients for `share`
///
/// Managed shares carry a product suffix. The home directory is shown as
/// `<username>'s <product>` when a username is known.
pub fn display_name(share: &ShareRecord, username: Option<&str>, settings: &SambaSettings) -> String {
    let is_home = share.path.trim_end_matches('/') == settings.home_path.trim_end_matches('/');

    let name = match username.filter(|name| !name.trim().is_empty()) {
        Some(username) if is_home => format!("{}'s {}", username, settings.product_name),
        _ => format!("{} ({})", share.name, settings.product_name),
    };

    clean_name(&name)
}

/// Number `name` if an earlier section already took it
///
/// Only records stored before names were cleaned at allocation can collide.
fn unique_section(name: String, sections: &mut HashSet<String>) -> String {
    let mut candidate = name.clone();
    let mut counter = 2;
    while !sections.insert(candidate.to_lowercase()) {
        candidate = format!("{} ({})", name, counter);
        counter += 1;
    }
    candidate
}

fn single_line(value: &str) -> String {
    value
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect::<String>()
        .trim()
        .to_string()
}

fn global_section(settings: &SambaSettings) -> String {
    let mut config = String::new();
    let _ = write!(
        config,
        r#"# Generated by smbshare. Changes made here are overwritten.

[global]
# Standalone server: clients log on with accounts local to this machine.
server role = standalone
server string = {server_string}

# Discovery goes through mDNS instead of a NetBIOS name.
mdns name = mdns

# Log to the journal only.
logging = systemd
log file = /dev/null

# No guest or anonymous access, and hide shares a user cannot open.
access based share enum = yes
restrict anonymous = 2
map to guest = never

# macOS client compatibility.
vfs objects = catia fruit streams_xattr
fruit:metadata = stream
fruit:model = MacSamba
fruit:veto_appledouble = no
fruit:nfs_aces = no
fruit:wipe_intentionally_left_blank_rfork = yes
fruit:delete_empty_adfiles = yes
fruit:posix_rename = yes

# No printing.
load printers = no
disable spoolss = yes
"#,
        server_string = single_line(&settings.product_name),
    );
    config
}

fn share_section(name: &str, path: &str, settings: &SambaSettings) -> String {
    let mut section = String::new();
    let _ = write!(
        section,
        r#"
[{name}]
path = {path}
writeable = yes

# Only the share account may connect.
valid users = {account}

# Files are created as {force_user}:{force_group} so content written by any
# local process stays readable. Owners of existing directories are inherited.
force user = {force_user}
force group = {force_group}
inherit owner = yes

# Time Machine target.
fruit:time machine = yes
"#,
        name = name,
        path = path,
        account = single_line(&settings.service_account),
        force_user = single_line(&settings.force_user),
        force_group = single_line(&settings.force_group),
    );
    section
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{RootMapFiles, RootMapping};
    use std::path::PathBuf;

    fn settings() -> SambaSettings {
        SambaSettings {
            config_path: PathBuf::from("/etc/samba/smb.conf"),
            share_password_path: PathBuf::from("/tmp/secrets/share-password"),
            product_name: "Homeserver".to_string(),
            home_path: "/Home".to_string(),
            service_account: "smbshare".to_string(),
            force_user: "root".to_string(),
            force_group: "smbshare".to_string(),
        }
    }

    fn files() -> RootMapFiles {
        RootMapFiles::new(vec![
            RootMapping::new("/Home", "/srv/home"),
            RootMapping::new("/Data", "/srv/data"),
        ])
    }

    #[tokio::test]
    async fn test_empty_registry_renders_global_only() {
        let config = render_config(&[], &files(), None, &settings()).await.unwrap();

        assert!(config.starts_with("# Generated by smbshare"));
        assert!(config.contains("[global]"));
        assert!(config.contains("server string = Homeserver"));
        assert!(config.contains("map to guest = never"));
        assert!(config.contains("load printers = no"));
        assert_eq!(config.matches('[').count(), 1);
    }

    #[tokio::test]
    async fn test_share_sections() {
        let shares = vec![
            ShareRecord::new("Photos", "/Data/Photos"),
            ShareRecord::new("Movies", "/Data/Movies"),
        ];
        let config = render_config(&shares, &files(), None, &settings())
            .await
            .unwrap();

        assert!(config.contains("[Photos (Homeserver)]\npath = /srv/data/Photos\n"));
        assert!(config.contains("[Movies (Homeserver)]\npath = /srv/data/Movies\n"));
        assert!(config.contains("valid users = smbshare"));
        assert!(config.contains("force user = root"));
        assert!(config.contains("force group = smbshare"));
        assert!(config.contains("inherit owner = yes"));
        assert!(config.contains("fruit:time machine = yes"));

        // Order follows the registry
        let photos = config.find("[Photos").unwrap();
        let movies = config.find("[Movies").unwrap();
        assert!(photos < movies);
    }

    #[tokio::test]
    async fn test_home_share_uses_username() {
        let shares = vec![ShareRecord::new("Home", "/Home")];

        let config = render_config(&shares, &files(), Some("alice"), &settings())
            .await
            .unwrap();
        assert!(config.contains("[alice's Homeserver]\npath = /srv/home\n"));

        let config = render_config(&shares, &files(), None, &settings())
            .await
            .unwrap();
        assert!(config.contains("[Home (Homeserver)]"));
    }

    #[tokio::test]
    async fn test_home_subdirectory_keeps_generic_name() {
        let shares = vec![ShareRecord::new("Documents", "/Home/Documents")];
        let config = render_config(&shares, &files(), Some("alice"), &settings())
            .await
            .unwrap();
        assert!(config.contains("[Documents (Homeserver)]"));
    }

    #[tokio::test]
    async fn test_translation_failure_fails_render() {
        let shares = vec![
            ShareRecord::new("Photos", "/Data/Photos"),
            ShareRecord::new("Lost", "/Unmapped/Lost"),
        ];
        let result = render_config(&shares, &files(), None, &settings()).await;
        assert!(matches!(result, Err(RenderError::Translate { ref path, .. }) if path == "/Unmapped/Lost"));
    }

    #[tokio::test]
    async fn test_rendering_is_deterministic() {
        let shares = vec![
            ShareRecord::new("Photos", "/Data/Photos"),
            ShareRecord::new("Home", "/Home"),
        ];
        let first = render_config(&shares, &files(), Some("alice"), &settings())
            .await
            .unwrap();
        let second = render_config(&shares, &files(), Some("alice"), &settings())
            .await
            .unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_newline_in_path_is_rejected() {
        let shares = vec![ShareRecord::new("Bad", "/Data/bad\nname")];
        let result = render_config(&shares, &files(), None, &settings()).await;
        assert!(matches!(result, Err(RenderError::InvalidPath(_))));
    }

    #[tokio::test]
    async fn test_percent_in_path_is_rejected() {
        let shares = vec![ShareRecord::new("Macro", "/Data/x%U")];
        let result = render_config(&shares, &files(), None, &settings()).await;
        assert!(matches!(result, Err(RenderError::InvalidPath(ref path)) if path == "/Data/x%U"));
    }

    #[tokio::test]
    async fn test_stored_names_that_clean_alike_get_distinct_sections() {
        let shares = vec![
            ShareRecord::new("a[b", "/Data/a[b"),
            ShareRecord::new("a]b", "/Data/a]b"),
            ShareRecord::new("A_B", "/Data/other"),
        ];
        let config = render_config(&shares, &files(), None, &settings())
            .await
            .unwrap();

        assert_eq!(config.matches("[a_b (Homeserver)]").count(), 1);
        assert!(config.contains("[a_b (Homeserver) (2)]\npath = /srv/data/a]b\n"));
        assert!(config.contains("[A_B (Homeserver) (3)]\npath = /srv/data/other\n"));
    }

    #[test]
    fn test_display_name_is_cleaned() {
        let share = ShareRecord::new("a[b]", "/Data/x");
        assert_eq!(display_name(&share, None, &settings()), "a_b_ (Homeserver)");
    }
}
