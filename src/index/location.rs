// SPDX-License-Identifier: MIT OR Apache-2.0

//! On-disk namespace for a vault's collection.
//!
//! Layout: `<base>/<vault key>/<collection>.sqlite`, where the vault key is a
//! blake3 digest of the canonical vault path.

use std::path::{Path, PathBuf};

/// Collection name used when none is configured.
pub const DEFAULT_COLLECTION: &str = "obsidian_notes";

const APP_DIR: &str = "vault-rag";
const KEY_LEN: usize = 32;

/// Resolved storage paths for one vault and collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageLocation {
    pub vault_key: String,
    pub dir: PathBuf,
    pub db_path: PathBuf,
}

impl StorageLocation {
    pub fn resolve(base_dir: &Path, vault_path: &Path, collection: &str) -> Self {
        let key = vault_key(vault_path);
        let dir = base_dir.join(&key);
        let db_path = dir.join(format!("{}.sqlite", sanitize(collection)));
        Self {
            vault_key: key,
            dir,
            db_path,
        }
    }
}

/// Default base directory: the platform data dir, or `./.vault-rag` if there is none.
pub fn default_base_dir() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from(format!(".{}", APP_DIR)))
}

/// Stable identifier for a vault path. Different spellings of the same
/// existing directory resolve to the same key.
pub fn vault_key(vault_path: &Path) -> String {
    let canonical = vault_path
        .canonicalize()
        .unwrap_or_else(|_| vault_path.to_path_buf());
    let digest = blake3::hash(canonical.to_string_lossy().as_bytes());
    digest.to_hex()[..KEY_LEN].to_string()
}

fn sanitize(collection: &str) -> String {
    let name: String = collection
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if name.is_empty() {
        DEFAULT_COLLECTION.to_string()
    } else {
        name
    }
}
