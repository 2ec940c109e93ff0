//! Display name allocation for new shares

use super::{ShareError, ShareRecord, ShareResult};

/// Candidates tried before giving up: `<base>`, then `<base> (2)` .. `<base> (10)`
pub const MAX_NAME_ATTEMPTS: u32 = 10;

/// Name used for a share of the filesystem root
const ROOT_NAME: &str = "Share";

/// Final component of a virtual path, cleaned with [`clean_name`]
pub fn base_name(virtual_path: &str) -> String {
    let name = virtual_path
        .rsplit('/')
        .find(|part| !part.is_empty())
        .map(clean_name)
        .unwrap_or_default();

    if name.is_empty() {
        ROOT_NAME.to_string()
    } else {
        name
    }
}

/// Make `name` usable as an smb.conf section name
///
/// `[` and `]` become `_`, control characters become spaces, and the result
/// is trimmed.
pub fn clean_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '[' | ']' => '_',
            c if c.is_control() => ' ',
            c => c,
        })
        .collect::<String>()
        .trim()
        .to_string()
}

/// Whether two share names end up as the same smb.conf section
///
/// Samba compares section names case-insensitively.
pub fn names_collide(a: &str, b: &str) -> bool {
    clean_name(a).to_lowercase() == clean_name(b).to_lowercase()
}

/// Pick a display name for a share of `virtual_path` that no record in
/// `shares` already uses
///
/// Only race-free when `shares` is the snapshot read inside the same
/// registry write section that inserts the new record.
pub fn allocate_name(virtual_path: &str, shares: &[ShareRecord]) -> ShareResult<String> {
    let base = base_name(virtual_path);
    let taken = |candidate: &str| shares.iter().any(|share| names_collide(&share.name, candidate));

    let mut name = base.clone();
    let mut attempt = 1;
    while taken(&name) {
        attempt += 1;
        if attempt > MAX_NAME_ATTEMPTS {
            return Err(ShareError::NameGenerationFailed(base));
        }
        name = format!("{} ({})", base, attempt);
    }

    Ok(name)
}
