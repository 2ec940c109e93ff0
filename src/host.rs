//! Host collaborators: virtual path translation, directory status, and users
//!
//! Shares are addressed by virtual paths such as `/Home/Photos`. The host
//! decides how those map onto the real filesystem. [`RootMapFiles`] is the
//! built-in mapping driven by configured `{virtual, system}` root pairs.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Errors reported by the host filesystem collaborator
#[derive(Debug, Error)]
pub enum FilesError {
    #[error("Invalid virtual path: {0}")]
    InvalidPath(String),

    #[error("Path is not inside any configured root: {0}")]
    Unmapped(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Result type for host filesystem operations
pub type FilesResult<T> = Result<T, FilesError>;

/// Type of a filesystem entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Directory,
    File,
    Symlink,
    Other,
}

/// Operations the host may allow on a virtual path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Read,
    Write,
    Delete,
    Share,
}

/// Filesystem collaborator consumed by the share subsystem
#[async_trait]
pub trait Files: Send + Sync {
    /// Translate a virtual path into a real filesystem path
    async fn virtual_to_system(&self, virtual_path: &str) -> FilesResult<PathBuf>;

    /// Translate a real filesystem path back into its virtual form
    async fn system_to_virtual(&self, system_path: &Path) -> FilesResult<String>;

    /// Entry type at `system_path`, or `None` if nothing exists there
    async fn status(&self, system_path: &Path) -> FilesResult<Option<EntryKind>>;

    /// Operations permitted on `virtual_path`
    async fn allowed_operations(&self, virtual_path: &str) -> FilesResult<Vec<Operation>>;
}

/// User collaborator, used to label the home share
#[async_trait]
pub trait Users: Send + Sync {
    /// Display name of the server owner, if one is set
    async fn username(&self) -> Option<String>;
}

/// [`Users`] implementation returning a fixed name
#[derive(Debug, Clone, Default)]
pub struct StaticUsers {
    name: Option<String>,
}

impl StaticUsers {
    pub fn new(name: Option<String>) -> Self {
        Self { name }
    }
}

#[async_trait]
impl Users for StaticUsers {
    async fn username(&self) -> Option<String> {
        self.name.clone()
    }
}

/// Mapping of a virtual root onto a real directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootMapping {
    /// Virtual root, e.g. `/Home`
    #[serde(rename = "virtual")]
    pub virtual_root: String,
    /// Real directory backing the root
    #[serde(rename = "system")]
    pub system_root: PathBuf,
}

impl RootMapping {
    pub fn new(virtual_root: impl Into<String>, system_root: impl Into<PathBuf>) -> Self {
        Self {
            virtual_root: virtual_root.into(),
            system_root: system_root.into(),
        }
    }
}

/// Normalize a virtual path: absolute, `/`-separated, no trailing slash,
/// no `.` or `..` components
pub fn normalize_virtual_path(path: &str) -> FilesResult<String> {
    if !path.starts_with('/') {
        return Err(FilesError::InvalidPath(path.to_string()));
    }

    let mut parts = Vec::new();
    for part in path.split('/').filter(|p| !p.is_empty()) {
        if part == "." || part == ".." {
            return Err(FilesError::InvalidPath(path.to_string()));
        }
        parts.push(part);
    }

    Ok(format!("/{}", parts.join("/")))
}

/// Whether `path` is `ancestor` itself or nested below it, compared by
/// whole path components (`/Data/FooBar` is not under `/Data/Foo`)
pub fn is_same_or_nested(path: &str, ancestor: &str) -> bool {
    let ancestor = ancestor.trim_end_matches('/');
    if ancestor.is_empty() {
        return path.starts_with('/');
    }

    match path.strip_prefix(ancestor) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// [`Files`] implementation over a fixed set of root mappings
#[derive(Debug, Clone, Default)]
pub struct RootMapFiles {
    roots: Vec<RootMapping>,
}

impl RootMapFiles {
    pub fn new(roots: Vec<RootMapping>) -> Self {
        Self { roots }
    }

    pub fn roots(&self) -> &[RootMapping] {
        &self.roots
    }

    /// Most specific root containing `virtual_path`
    fn root_for_virtual(&self, virtual_path: &str) -> Option<&RootMapping> {
        self.roots
            .iter()
            .filter(|root| is_same_or_nested(virtual_path, &root.virtual_root))
            .max_by_key(|root| root.virtual_root.len())
    }

    fn is_root(&self, virtual_path: &str) -> bool {
        self.roots
            .iter()
            .any(|root| root.virtual_root.trim_end_matches('/') == virtual_path)
    }
}

#[async_trait]
impl Files for RootMapFiles {
    async fn virtual_to_system(&self, virtual_path: &str) -> FilesResult<PathBuf> {
        let normalized = normalize_virtual_path(virtual_path)?;
        let root = self
            .root_for_virtual(&normalized)
            .ok_or_else(|| FilesError::Unmapped(normalized.clone()))?;

        let rest = normalized[root.virtual_root.trim_end_matches('/').len()..]
            .trim_start_matches('/');

        let mut system_path = root.system_root.clone();
        if !rest.is_empty() {
            system_path.push(rest);
        }
        Ok(system_path)
    }

    async fn system_to_virtual(&self, system_path: &Path) -> FilesResult<String> {
        let unmapped = || FilesError::Unmapped(system_path.display().to_string());

        let (root, rest) = self
            .roots
            .iter()
            .filter_map(|root| {
                system_path
                    .strip_prefix(&root.system_root)
                    .ok()
                    .map(|rest| (root, rest))
            })
            .max_by_key(|(root, _)| root.system_root.components().count())
            .ok_or_else(unmapped)?;

        let mut virtual_path = root.virtual_root.trim_end_matches('/').to_string();
        for component in rest.components() {
            match component {
                Component::Normal(part) => {
                    virtual_path.push('/');
                    virtual_path.push_str(&part.to_string_lossy());
                }
                Component::CurDir => {}
                _ => return Err(unmapped()),
            }
        }

        if virtual_path.is_empty() {
            virtual_path.push('/');
        }
        Ok(virtual_path)
    }

    async fn status(&self, system_path: &Path) -> FilesResult<Option<EntryKind>> {
        match tokio::fs::symlink_metadata(system_path).await {
            Ok(metadata) => {
                let file_type = metadata.file_type();
                let kind = if file_type.is_dir() {
                    EntryKind::Directory
                } else if file_type.is_file() {
                    EntryKind::File
                } else if file_type.is_symlink() {
                    EntryKind::Symlink
                } else {
                    EntryKind::Other
                };
                Ok(Some(kind))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn allowed_operations(&self, virtual_path: &str) -> FilesResult<Vec<Operation>> {
        let normalized = normalize_virtual_path(virtual_path)?;
        if normalized == "/" || self.root_for_virtual(&normalized).is_none() {
            return Ok(Vec::new());
        }

        let system_path = self.virtual_to_system(&normalized).await?;
        let operations = match self.status(&system_path).await? {
            // Roots themselves can be shared but never removed
            Some(EntryKind::Directory) if self.is_root(&normalized) => {
                vec![Operation::Read, Operation::Share]
            }
            Some(EntryKind::Directory) => vec![
                Operation::Read,
                Operation::Write,
                Operation::Delete,
                Operation::Share,
            ],
            Some(_) => vec![Operation::Read, Operation::Write, Operation::Delete],
            None => Vec::new(),
        };
        Ok(operations)
    }
}
