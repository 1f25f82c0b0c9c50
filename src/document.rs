// SPDX-License-Identifier: MIT OR Apache-2.0

//! Loading notes from the vault.

use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

use crate::errors::{Result, VaultError};

/// Suffix of files that belong to the index.
pub const NOTE_EXTENSION: &str = "md";

/// A note read from disk.
#[derive(Debug, Clone)]
pub struct Document {
    /// Absolute (or vault-joined) location on disk.
    pub path: PathBuf,
    /// Path relative to the vault root, `/`-separated.
    pub relative_path: String,
    /// Modification time in seconds since the Unix epoch.
    pub modified: i64,
    pub content: String,
}

impl Document {
    /// Reads the note at `path` and resolves its identity against `vault_root`.
    pub fn load(vault_root: &Path, path: &Path) -> Result<Self> {
        let relative_path = relative_path(vault_root, path)?;

        let bytes = std::fs::read(path).map_err(|e| VaultError::load(path, e))?;
        if bytes.contains(&0) {
            return Err(VaultError::load(path, "binary content"));
        }
        let content = String::from_utf8(bytes).map_err(|e| VaultError::load(path, e))?;

        let modified = std::fs::metadata(path)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|t| t.duration_since(SystemTime::UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);

        Ok(Self {
            path: path.to_path_buf(),
            relative_path,
            modified,
            content,
        })
    }

    /// blake3 digest of the raw content, used to skip unchanged notes.
    pub fn content_hash(&self) -> String {
        blake3::hash(self.content.as_bytes()).to_hex().to_string()
    }
}

/// Returns true for paths with the `.md` suffix.
pub fn is_note(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| ext.eq_ignore_ascii_case(NOTE_EXTENSION))
        .unwrap_or(false)
}

/// Computes the `/`-separated path of `path` under `vault_root`.
///
/// Both sides are canonicalized when possible so that watcher events, which
/// report absolute paths, agree with the initial scan.
pub fn relative_path(vault_root: &Path, path: &Path) -> Result<String> {
    let root = vault_root
        .canonicalize()
        .unwrap_or_else(|_| vault_root.to_path_buf());
    let full = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());

    let relative = full
        .strip_prefix(&root)
        .or_else(|_| path.strip_prefix(vault_root))
        .map_err(|_| VaultError::load(path, format!("not inside vault {}", vault_root.display())))?;

    let parts: Vec<String> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();

    if parts.is_empty() {
        return Err(VaultError::load(path, "path is the vault root"));
    }
    Ok(parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn load_reads_content_and_relative_path() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("notes")).unwrap();
        let file = dir.path().join("notes").join("a.md");
        fs::write(&file, "hello").unwrap();

        let doc = Document::load(dir.path(), &file).unwrap();
        assert_eq!(doc.relative_path, "notes/a.md");
        assert_eq!(doc.content, "hello");
        assert!(doc.modified > 0);
    }

    #[test]
    fn load_missing_file_is_load_failure() {
        let dir = TempDir::new().unwrap();
        let err = Document::load(dir.path(), &dir.path().join("gone.md")).unwrap_err();
        assert!(matches!(err, VaultError::LoadFailure { .. }));
    }

    #[test]
    fn load_binary_file_is_load_failure() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("bin.md");
        fs::write(&file, b"hello\0world").unwrap();
        let err = Document::load(dir.path(), &file).unwrap_err();
        assert!(matches!(err, VaultError::LoadFailure { .. }));
    }

    #[test]
    fn path_outside_vault_is_rejected() {
        let vault = TempDir::new().unwrap();
        let other = TempDir::new().unwrap();
        let file = other.path().join("x.md");
        fs::write(&file, "x").unwrap();
        assert!(relative_path(vault.path(), &file).is_err());
    }

    #[test]
    fn is_note_checks_suffix() {
        assert!(is_note(Path::new("a/b.md")));
        assert!(is_note(Path::new("B.MD")));
        assert!(!is_note(Path::new("a/b.png")));
        assert!(!is_note(Path::new("a/md")));
    }

    #[test]
    fn content_hash_is_stable() {
        let doc = Document {
            path: PathBuf::from("a.md"),
            relative_path: "a.md".into(),
            modified: 0,
            content: "same".into(),
        };
        assert_eq!(doc.content_hash(), doc.clone().content_hash());
    }
}
