//! Share records and the persisted share registry

pub mod naming;
pub mod registry;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::StoreError;

pub use naming::{allocate_name, base_name, clean_name, names_collide, MAX_NAME_ATTEMPTS};
pub use registry::{PendingWrite, ShareRegistry, SHARES_KEY};

/// A directory exposed over SMB
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareRecord {
    /// Display name, unique among records when the share was created
    pub name: String,
    /// Virtual path of the shared directory
    pub path: String,
}

impl ShareRecord {
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }
}

/// Errors from share registry operations
///
/// Policy errors leave the registry unmodified.
#[derive(Debug, Error)]
pub enum ShareError {
    #[error("Operation not allowed: {0}")]
    OperationNotAllowed(String),

    #[error("Share already exists: {0}")]
    AlreadyExists(String),

    #[error("Could not generate a unique share name for {0}")]
    NameGenerationFailed(String),

    #[error("Not a directory: {0}")]
    NotADirectory(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl ShareError {
    /// Stable machine-readable code for policy errors
    pub fn code(&self) -> &'static str {
        match self {
            ShareError::OperationNotAllowed(_) => "operation-not-allowed",
            ShareError::AlreadyExists(_) => "share-already-exists",
            ShareError::NameGenerationFailed(_) => "share-name-generation-failed",
            ShareError::NotADirectory(_) => "not-a-directory",
            ShareError::Store(_) => "store-error",
        }
    }
}

/// Result type for share registry operations
pub type ShareResult<T> = Result<T, ShareError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_share_record_json_shape() {
        let record = ShareRecord::new("Photos", "/Home/Photos");
        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(json, r#"{"name":"Photos","path":"/Home/Photos"}"#);
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            ShareError::OperationNotAllowed("/x".into()).code(),
            "operation-not-allowed"
        );
        assert_eq!(
            ShareError::AlreadyExists("/x".into()).code(),
            "share-already-exists"
        );
        assert_eq!(
            ShareError::NameGenerationFailed("x".into()).code(),
            "share-name-generation-failed"
        );
    }
}
