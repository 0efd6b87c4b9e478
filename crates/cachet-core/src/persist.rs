// ── Persistent store collaborators ──
//
// A store maps a key (the entity type name) to an opaque byte blob. The
// cache decides what goes in the blob; stores only move bytes.

use std::fmt::Write as _;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use dashmap::DashMap;
use tracing::debug;

use crate::error::StoreError;

/// Keyed byte storage that survives the in-memory cache.
pub trait PersistentStore: Send + Sync {
    fn write(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError>;

    /// `Ok(None)` when nothing has been written under `key`.
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;
}

// ── MemoryStore ─────────────────────────────────────────────────────

/// Process-local store, mainly for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl PersistentStore for MemoryStore {
    fn write(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError> {
        self.entries.insert(key.to_owned(), bytes.to_vec());
        Ok(())
    }

    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.entries.get(key).map(|v| v.value().clone()))
    }
}

// ── FileStore ───────────────────────────────────────────────────────

/// One file per key under a directory.
///
/// Writes go to a temporary sibling first and are renamed into place, so a
/// crash mid-write leaves the previous partition intact.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Open (and create if needed) a store rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File backing `key`.
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", encode_key(key)))
    }
}

impl PersistentStore for FileStore {
    fn write(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &path)?;
        debug!(key, path = %path.display(), bytes = bytes.len(), "partition written");
        Ok(())
    }

    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        match fs::read(self.path_for(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Make a type name safe as a file stem: ASCII alphanumerics, `-` and `_`
/// pass through, every other byte becomes `%XX`.
fn encode_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for byte in key.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            out.push(char::from(byte));
        } else {
            let _ = write!(out, "%{byte:02X}");
        }
    }
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_escaped() {
        assert_eq!(encode_key("articles"), "articles");
        assert_eq!(encode_key("Test Model"), "Test%20Model");
        assert_eq!(encode_key("a/b"), "a%2Fb");
    }

    #[test]
    fn file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path().join("nested")).unwrap();

        assert!(store.read("articles").unwrap().is_none());
        store.write("articles", b"{}").unwrap();
        assert_eq!(store.read("articles").unwrap().as_deref(), Some(&b"{}"[..]));

        store.write("articles", b"{\"1\":{}}").unwrap();
        assert_eq!(
            store.read("articles").unwrap().as_deref(),
            Some(&b"{\"1\":{}}"[..])
        );
        assert!(!store.path_for("articles").with_extension("json.tmp").exists());
    }

    #[test]
    fn memory_store_round_trip() {
        let store = MemoryStore::new();
        assert!(store.is_empty());
        store.write("people", &[1, 2, 3]).unwrap();
        assert_eq!(store.read("people").unwrap(), Some(vec![1, 2, 3]));
        assert_eq!(store.len(), 1);
    }
}
