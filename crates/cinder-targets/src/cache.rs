//! Result cache and the build cache handle

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::fingerprint::{result_identity, FingerprintStore};
use crate::record::RunRecord;
use crate::store::{FileStore, KeyValueStore, MemoryStore, StoreError};

const RESULT_PREFIX: &str = "result/";
const LAST_RUN_KEY: &str = "run/last";

/// A cached target result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Target name
    pub target: String,
    /// The result value
    pub value: Value,
    /// Identity of `value`
    pub result_id: String,
    /// How long the producing execution took
    pub duration_ms: u64,
    /// When this entry was created (RFC 3339)
    pub created_at: String,
}

impl CacheEntry {
    /// How long the producing execution took
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }
}

/// Cached results, keyed by target name
#[derive(Debug, Clone)]
pub struct ResultCache {
    store: Arc<dyn KeyValueStore>,
}

impl ResultCache {
    /// Create a result cache over a persistence collaborator
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    fn key(name: &str) -> String {
        format!("{}{}", RESULT_PREFIX, name)
    }

    /// Look up a cached result; a corrupt entry reads as a miss
    pub fn get(&self, name: &str) -> Result<Option<CacheEntry>, StoreError> {
        let Some(bytes) = self.store.get(&Self::key(name))? else {
            debug!(target_name = name, "result cache miss");
            return Ok(None);
        };

        match serde_json::from_slice(&bytes) {
            Ok(entry) => {
                debug!(target_name = name, "result cache hit");
                Ok(Some(entry))
            }
            Err(e) => {
                warn!(target_name = name, error = %e, "ignoring corrupt cached result");
                Ok(None)
            }
        }
    }

    /// Store a result
    pub fn put(
        &self,
        name: &str,
        value: Value,
        duration: Duration,
    ) -> Result<CacheEntry, StoreError> {
        let entry = CacheEntry {
            target: name.to_string(),
            result_id: result_identity(&value),
            value,
            duration_ms: duration.as_millis() as u64,
            created_at: chrono::Utc::now().to_rfc3339(),
        };

        let key = Self::key(name);
        let bytes = serde_json::to_vec(&entry).map_err(|source| StoreError::Encode {
            key: key.clone(),
            source,
        })?;
        self.store.put(&key, &bytes)?;
        debug!(target_name = name, "result stored in cache");
        Ok(entry)
    }

    /// Drop a cached result
    pub fn remove(&self, name: &str) -> Result<bool, StoreError> {
        self.store.delete(&Self::key(name))
    }

    /// Names of all targets with a cached result
    pub fn names(&self) -> Result<Vec<String>, StoreError> {
        Ok(self
            .store
            .keys(RESULT_PREFIX)?
            .into_iter()
            .filter_map(|k| k.strip_prefix(RESULT_PREFIX).map(str::to_string))
            .collect())
    }

    /// Remove results older than `max_age`
    pub fn prune(&self, max_age: Duration) -> Result<PruneStats, StoreError> {
        info!(max_age_secs = max_age.as_secs(), "pruning result cache");
        let mut stats = PruneStats::default();
        let cutoff = chrono::Utc::now() - chrono::Duration::from_std(max_age).unwrap_or_default();

        for name in self.names()? {
            stats.total += 1;

            let expired = self
                .get(&name)?
                .and_then(|entry| chrono::DateTime::parse_from_rfc3339(&entry.created_at).ok())
                .map_or(false, |created| created < cutoff);

            if expired && self.remove(&name)? {
                stats.removed.push(name);
                continue;
            }

            stats.kept += 1;
        }

        info!(
            total = stats.total,
            removed = stats.removed.len(),
            kept = stats.kept,
            "cache prune complete"
        );
        Ok(stats)
    }

    /// Count cached results and their encoded size
    pub fn status(&self) -> Result<CacheStats, StoreError> {
        let mut stats = CacheStats::default();

        for key in self.store.keys(RESULT_PREFIX)? {
            if let Some(bytes) = self.store.get(&key)? {
                stats.entries += 1;
                stats.total_size += bytes.len() as u64;
            }
        }

        Ok(stats)
    }
}

/// Statistics from a prune operation
#[derive(Debug, Default)]
pub struct PruneStats {
    /// Total entries found
    pub total: usize,
    /// Names of targets whose results were removed
    pub removed: Vec<String>,
    /// Entries kept
    pub kept: usize,
}

/// Cache statistics
#[derive(Debug, Default)]
pub struct CacheStats {
    /// Number of cached results
    pub entries: usize,
    /// Total size in bytes
    pub total_size: u64,
}

impl CacheStats {
    /// Format total size in human-readable form
    pub fn formatted_size(&self) -> String {
        if self.total_size < 1024 {
            format!("{} B", self.total_size)
        } else if self.total_size < 1024 * 1024 {
            format!("{:.1} KB", self.total_size as f64 / 1024.0)
        } else if self.total_size < 1024 * 1024 * 1024 {
            format!("{:.1} MB", self.total_size as f64 / (1024.0 * 1024.0))
        } else {
            format!(
                "{:.1} GB",
                self.total_size as f64 / (1024.0 * 1024.0 * 1024.0)
            )
        }
    }
}

/// Handle over everything a build persists: fingerprints, cached results and
/// the last run record.
///
/// Opened at the start of a run and flushed at the end; passed explicitly to
/// the scheduler instead of living in process-wide state.
#[derive(Debug, Clone)]
pub struct BuildCache {
    store: Arc<dyn KeyValueStore>,
    fingerprints: FingerprintStore,
    results: ResultCache,
}

impl BuildCache {
    /// Wrap a persistence collaborator
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            fingerprints: FingerprintStore::new(store.clone()),
            results: ResultCache::new(store.clone()),
            store,
        }
    }

    /// Open a file-backed cache in `dir`
    pub fn open(dir: &Path) -> Result<Self, StoreError> {
        Ok(Self::new(Arc::new(FileStore::open(dir)?)))
    }

    /// A cache that lives only as long as the process
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    /// Fingerprint history
    pub fn fingerprints(&self) -> &FingerprintStore {
        &self.fingerprints
    }

    /// Cached results
    pub fn results(&self) -> &ResultCache {
        &self.results
    }

    /// Forget a target's fingerprint and result so the next run rebuilds it
    pub fn invalidate(&self, name: &str) -> Result<bool, StoreError> {
        let had_fingerprint = self.fingerprints.remove(name)?;
        let had_result = self.results.remove(name)?;
        Ok(had_fingerprint || had_result)
    }

    /// Forget every target; returns the names that were cached
    pub fn invalidate_all(&self) -> Result<Vec<String>, StoreError> {
        let mut names = self.fingerprints.names()?;
        for name in self.results.names()? {
            if !names.contains(&name) {
                names.push(name);
            }
        }
        names.sort();

        for name in &names {
            self.invalidate(name)?;
        }
        Ok(names)
    }

    /// Persist a run record for later inspection
    pub fn save_run_record(&self, record: &RunRecord) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(record).map_err(|source| StoreError::Encode {
            key: LAST_RUN_KEY.to_string(),
            source,
        })?;
        self.store.put(LAST_RUN_KEY, &bytes)
    }

    /// The most recently persisted run record
    pub fn last_run_record(&self) -> Result<Option<RunRecord>, StoreError> {
        let Some(bytes) = self.store.get(LAST_RUN_KEY)? else {
            return Ok(None);
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| StoreError::Corrupt {
                key: LAST_RUN_KEY.to_string(),
                source,
            })
    }

    /// Make all writes durable
    pub fn flush(&self) -> Result<(), StoreError> {
        self.store.flush()
    }
}
