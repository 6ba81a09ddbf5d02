//! Persistence collaborator: a small key-value interface
//!
//! Fingerprints, cached results and run records are all kept in a
//! [`KeyValueStore`] keyed by strings such as `fingerprint/<target>`.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use tracing::{debug, trace};

/// Errors from the persistence collaborator
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backing store cannot be reached; fatal to a run
    #[error("Store unavailable at {location}: {source}")]
    Unavailable {
        location: String,
        #[source]
        source: std::io::Error,
    },

    /// A stored value could not be decoded
    #[error("Stored entry '{key}' is corrupt: {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// A value could not be encoded
    #[error("Failed to encode entry '{key}': {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Get/put/delete over byte values keyed by string
pub trait KeyValueStore: fmt::Debug + Send + Sync {
    /// Read a value
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Write a value, replacing any previous one
    fn put(&self, key: &str, value: &[u8]) -> Result<(), StoreError>;

    /// Delete a value; returns whether it existed
    fn delete(&self, key: &str) -> Result<bool, StoreError>;

    /// Keys starting with `prefix`, sorted
    fn keys(&self, prefix: &str) -> Result<Vec<String>, StoreError>;

    /// Make prior writes durable
    fn flush(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// In-memory store, used for embedding and tests
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        Ok(entries.get(key).cloned())
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        Ok(entries.remove(key).is_some())
    }

    fn keys(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        Ok(entries
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}

const ENTRY_EXTENSION: &str = "entry";
const TEMP_EXTENSION: &str = "tmp";

/// One file per key under a directory.
///
/// Writes go to a temporary file that is renamed into place, so a reader
/// never observes a half-written entry and disjoint keys never contend.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Open (creating if needed) a store rooted at `dir`
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| unavailable(&dir, source))?;
        debug!(dir = %dir.display(), "opened file store");
        Ok(Self { dir })
    }

    /// Directory holding the entries
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir
            .join(format!("{}.{}", escape_key(key), ENTRY_EXTENSION))
    }
}

fn unavailable(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Unavailable {
        location: path.display().to_string(),
        source,
    }
}

/// Encode a key as a portable file name: ASCII alphanumerics, `-` and `_`
/// pass through, every other byte becomes `%XX`.
pub fn escape_key(key: &str) -> String {
    let mut escaped = String::with_capacity(key.len());
    for byte in key.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            escaped.push(byte as char);
        } else {
            escaped.push_str(&format!("%{:02X}", byte));
        }
    }
    escaped
}

/// Inverse of [`escape_key`]
pub fn unescape_key(escaped: &str) -> Option<String> {
    let bytes = escaped.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = escaped.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let path = self.entry_path(key);
        match fs::read(&path) {
            Ok(bytes) => {
                trace!(key, "store hit");
                Ok(Some(bytes))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(unavailable(&path, e)),
        }
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        let path = self.entry_path(key);
        let temp = path.with_extension(TEMP_EXTENSION);
        fs::write(&temp, value).map_err(|e| unavailable(&temp, e))?;
        fs::rename(&temp, &path).map_err(|e| unavailable(&path, e))?;
        trace!(key, bytes = value.len(), "store write");
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let path = self.entry_path(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(unavailable(&path, e)),
        }
    }

    fn keys(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let mut keys = Vec::new();
        let entries = fs::read_dir(&self.dir).map_err(|e| unavailable(&self.dir, e))?;

        for entry in entries {
            let entry = entry.map_err(|e| unavailable(&self.dir, e))?;
            let path = entry.path();
            if path.extension().map_or(true, |ext| ext != ENTRY_EXTENSION) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if let Some(key) = unescape_key(stem) {
                if key.starts_with(prefix) {
                    keys.push(key);
                }
            }
        }

        keys.sort();
        Ok(keys)
    }

    fn flush(&self) -> Result<(), StoreError> {
        // Entries are renamed into place on write; nothing is buffered.
        if self.dir.is_dir() {
            Ok(())
        } else {
            Err(unavailable(
                &self.dir,
                std::io::Error::new(std::io::ErrorKind::NotFound, "store directory removed"),
            ))
        }
    }
}
