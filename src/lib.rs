//! smbshare - publish server directories as SMB shares.
//!
//! A small registry of shared directories is persisted in SQLite and turned
//! into a Samba configuration on every change. smbd is started, reloaded or
//! stopped to match, and shares whose directory disappears are dropped.

pub mod config;
pub mod events;
pub mod host;
pub mod logging;
pub mod mount;
pub mod process;
pub mod samba;
pub mod shares;
pub mod store;
pub mod watcher;

pub use samba::{Samba, SambaError, SambaResult, SambaSettings};
pub use shares::{ShareError, ShareRecord};
