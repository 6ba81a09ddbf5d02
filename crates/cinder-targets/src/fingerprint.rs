//! Fingerprint store and content identities
//!
//! A fingerprint is the (code identity, input identities) pair recorded when a
//! target last executed successfully. Identities are SHA-256 digests:
//! - code: the command kind plus its JSON definition
//! - upstream input: the upstream target's result value
//! - file input: the file's bytes (a missing file has its own identity)

use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::command::Command;
use crate::store::{KeyValueStore, StoreError};

const FINGERPRINT_PREFIX: &str = "fingerprint/";

/// Identity of a file that does not exist
pub const MISSING_FILE: &str = "missing";

/// Identity of a command definition
pub fn code_identity(command: &dyn Command) -> String {
    let mut hasher = Sha256::new();
    hasher.update(command.kind().as_bytes());
    hasher.update(b"\0");
    hasher.update(command.definition().to_string().as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Identity of a result value
pub fn result_identity(value: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.to_string().as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Identity of a file's contents
pub fn file_identity(path: &Path) -> String {
    match fs::read(path) {
        Ok(contents) => {
            let mut hasher = Sha256::new();
            hasher.update(&contents);
            format!("{:x}", hasher.finalize())
        }
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %path.display(), error = %e, "declared file unreadable, treating as missing");
            }
            MISSING_FILE.to_string()
        }
    }
}

/// Input id contributed by an upstream target's result
pub fn upstream_input_id(name: &str, result_id: &str) -> String {
    format!("target:{}={}", name, result_id)
}

/// Input id contributed by a declared file
pub fn file_input_id(display: &str, file_id: &str) -> String {
    format!("file:{}={}", display, file_id)
}

/// A recorded fingerprint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    /// Identity of the command definition
    pub code_id: String,
    /// Identities of upstream results and declared files
    pub input_ids: BTreeSet<String>,
    /// When this fingerprint was recorded (RFC 3339)
    pub recorded_at: String,
}

/// Why a target must be (re)executed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StaleReason {
    /// Never executed successfully
    NeverBuilt,
    /// Command definition changed
    CodeChanged,
    /// An upstream result or declared file changed
    InputsChanged,
    /// An upstream target executed in this run
    UpstreamChanged,
    /// Fingerprint matches but the cached result is gone
    ResultMissing,
    /// Trigger policy `always`
    Always,
    /// Requested explicitly by the caller
    Forced,
}

impl fmt::Display for StaleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NeverBuilt => write!(f, "never built"),
            Self::CodeChanged => write!(f, "command changed"),
            Self::InputsChanged => write!(f, "inputs changed"),
            Self::UpstreamChanged => write!(f, "upstream rebuilt"),
            Self::ResultMissing => write!(f, "cached result missing"),
            Self::Always => write!(f, "trigger: always"),
            Self::Forced => write!(f, "forced"),
        }
    }
}

/// Fingerprint history, keyed by target name
#[derive(Debug, Clone)]
pub struct FingerprintStore {
    store: Arc<dyn KeyValueStore>,
}

impl FingerprintStore {
    /// Create a fingerprint store over a persistence collaborator
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    fn key(name: &str) -> String {
        format!("{}{}", FINGERPRINT_PREFIX, name)
    }

    /// Persist the fingerprint for `name`, overwriting any prior entry
    pub fn record_fingerprint(
        &self,
        name: &str,
        code_id: &str,
        input_ids: &[String],
    ) -> Result<Fingerprint, StoreError> {
        let fingerprint = Fingerprint {
            code_id: code_id.to_string(),
            input_ids: input_ids.iter().cloned().collect(),
            recorded_at: chrono::Utc::now().to_rfc3339(),
        };
        let key = Self::key(name);
        let bytes = serde_json::to_vec(&fingerprint).map_err(|source| StoreError::Encode {
            key: key.clone(),
            source,
        })?;
        self.store.put(&key, &bytes)?;
        debug!(target_name = name, inputs = fingerprint.input_ids.len(), "fingerprint recorded");
        Ok(fingerprint)
    }

    /// Whether `name` must be re-executed given its current identities.
    ///
    /// Input ids are compared as a set.
    pub fn is_stale(
        &self,
        name: &str,
        code_id: &str,
        input_ids: &[String],
    ) -> Result<bool, StoreError> {
        Ok(self.staleness(name, code_id, input_ids)?.is_some())
    }

    /// Like [`is_stale`](Self::is_stale) but says why
    pub fn staleness(
        &self,
        name: &str,
        code_id: &str,
        input_ids: &[String],
    ) -> Result<Option<StaleReason>, StoreError> {
        let Some(previous) = self.get(name)? else {
            return Ok(Some(StaleReason::NeverBuilt));
        };

        if previous.code_id != code_id {
            return Ok(Some(StaleReason::CodeChanged));
        }

        let current: BTreeSet<&str> = input_ids.iter().map(String::as_str).collect();
        let recorded: BTreeSet<&str> = previous.input_ids.iter().map(String::as_str).collect();
        if current != recorded {
            return Ok(Some(StaleReason::InputsChanged));
        }

        Ok(None)
    }

    /// Read the fingerprint for `name`; a corrupt entry reads as absent
    pub fn get(&self, name: &str) -> Result<Option<Fingerprint>, StoreError> {
        let key = Self::key(name);
        let Some(bytes) = self.store.get(&key)? else {
            return Ok(None);
        };

        match serde_json::from_slice(&bytes) {
            Ok(fingerprint) => Ok(Some(fingerprint)),
            Err(e) => {
                warn!(target_name = name, error = %e, "ignoring corrupt fingerprint");
                Ok(None)
            }
        }
    }

    /// Forget the fingerprint for `name`
    pub fn remove(&self, name: &str) -> Result<bool, StoreError> {
        self.store.delete(&Self::key(name))
    }

    /// Names of all targets with a recorded fingerprint
    pub fn names(&self) -> Result<Vec<String>, StoreError> {
        Ok(self
            .store
            .keys(FINGERPRINT_PREFIX)?
            .into_iter()
            .filter_map(|k| k.strip_prefix(FINGERPRINT_PREFIX).map(str::to_string))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{ShellCommand, ValueCommand};
    use crate::store::MemoryStore;
    use serde_json::json;
    use tempfile::TempDir;

    fn store() -> FingerprintStore {
        FingerprintStore::new(Arc::new(MemoryStore::new()))
    }

    fn ids(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_stale_without_history() {
        let fingerprints = store();
        assert!(fingerprints.is_stale("fit", "c1", &ids(&["x"])).unwrap());
        assert_eq!(
            fingerprints.staleness("fit", "c1", &ids(&["x"])).unwrap(),
            Some(StaleReason::NeverBuilt)
        );
    }

    #[test]
    fn test_fresh_after_record_order_insensitive() {
        let fingerprints = store();
        fingerprints
            .record_fingerprint("fit", "c1", &ids(&["a", "b"]))
            .unwrap();

        assert!(!fingerprints.is_stale("fit", "c1", &ids(&["b", "a"])).unwrap());
        assert!(!fingerprints.is_stale("fit", "c1", &ids(&["a", "b", "a"])).unwrap());
    }

    #[test]
    fn test_stale_on_code_or_input_change() {
        let fingerprints = store();
        fingerprints
            .record_fingerprint("fit", "c1", &ids(&["a", "b"]))
            .unwrap();

        assert_eq!(
            fingerprints.staleness("fit", "c2", &ids(&["a", "b"])).unwrap(),
            Some(StaleReason::CodeChanged)
        );
        assert_eq!(
            fingerprints.staleness("fit", "c1", &ids(&["a", "c"])).unwrap(),
            Some(StaleReason::InputsChanged)
        );
        assert_eq!(
            fingerprints.staleness("fit", "c1", &ids(&["a"])).unwrap(),
            Some(StaleReason::InputsChanged)
        );
    }

    #[test]
    fn test_record_overwrites() {
        let fingerprints = store();
        fingerprints.record_fingerprint("fit", "c1", &ids(&["a"])).unwrap();
        fingerprints.record_fingerprint("fit", "c2", &ids(&["b"])).unwrap();

        let fp = fingerprints.get("fit").unwrap().unwrap();
        assert_eq!(fp.code_id, "c2");
        assert_eq!(fp.input_ids.into_iter().collect::<Vec<_>>(), vec!["b"]);
    }

    #[test]
    fn test_remove_and_names() {
        let fingerprints = store();
        fingerprints.record_fingerprint("a", "c", &[]).unwrap();
        fingerprints.record_fingerprint("b", "c", &[]).unwrap();

        assert_eq!(fingerprints.names().unwrap(), vec!["a", "b"]);
        assert!(fingerprints.remove("a").unwrap());
        assert_eq!(fingerprints.names().unwrap(), vec!["b"]);
    }

    #[test]
    fn test_corrupt_entry_reads_as_absent() {
        let backing = Arc::new(MemoryStore::new());
        backing.put("fingerprint/fit", b"not json").unwrap();
        let fingerprints = FingerprintStore::new(backing);

        assert!(fingerprints.get("fit").unwrap().is_none());
        assert!(fingerprints.is_stale("fit", "c", &[]).unwrap());
    }

    #[test]
    fn test_code_identity_tracks_definition() {
        let a = code_identity(&ShellCommand::new("python fit.py --epochs 35"));
        let b = code_identity(&ShellCommand::new("python fit.py --epochs 35"));
        let c = code_identity(&ShellCommand::new("python fit.py --epochs 50"));
        let d = code_identity(&ValueCommand::new(json!("python fit.py --epochs 35")));

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
    }

    #[test]
    fn test_result_identity_ignores_key_order() {
        let a: Value = serde_json::from_str(r#"{"acc": 0.8, "loss": 0.4}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"loss": 0.4, "acc": 0.8}"#).unwrap();
        assert_eq!(result_identity(&a), result_identity(&b));
        assert_ne!(result_identity(&a), result_identity(&json!({"acc": 0.9})));
    }

    #[test]
    fn test_file_identity() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("churn.csv");

        assert_eq!(file_identity(&path), MISSING_FILE);
        std::fs::write(&path, "a").unwrap();
        let first = file_identity(&path);
        std::fs::write(&path, "b").unwrap();
        let second = file_identity(&path);

        assert_ne!(first, MISSING_FILE);
        assert_ne!(first, second);
    }
}
