//! LMDB-backed cache implementation.
//!
//! Uses the heed crate (Rust bindings for LMDB) to provide a memory-mapped
//! key-value store for cached row sets. Several processes opening the same
//! directory share one cache, which is what makes the dependency check in
//! [`super::DependencyCache`] matter: any of them may write to storage.
//!
//! # Thread Safety
//!
//! Every operation runs in its own LMDB transaction:
//! - Read transactions for `get` and `stats`
//! - Write transactions for `put`, `delete`, `evict` and `clear`
//! - Hit/miss/eviction counters are process-local

use std::path::Path;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};
use rheostat_core::{CacheError, CacheResult};

use super::key::CacheKey;
use super::traits::{CacheBackend, CacheStats, CachedEntry};

/// Length of the `cached_at` header in front of every stored value.
const HEADER_LEN: usize = 8;

/// Failures of the LMDB backend, folded into [`CacheError`] at the trait boundary.
#[derive(Debug, thiserror::Error)]
pub enum LmdbCacheError {
    /// Environment directory could not be opened or mapped.
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    /// The unnamed database could not be created.
    #[error("Failed to open database: {0}")]
    DbOpen(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Stored bytes are not a valid entry.
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<LmdbCacheError> for CacheError {
    fn from(e: LmdbCacheError) -> Self {
        match e {
            LmdbCacheError::Serialization(reason) => CacheError::Serialization { reason },
            LmdbCacheError::Deserialization(reason) => CacheError::Deserialization { reason },
            other => CacheError::Backend {
                reason: other.to_string(),
            },
        }
    }
}

fn txn_error(e: heed::Error) -> LmdbCacheError {
    LmdbCacheError::Transaction(e.to_string())
}

/// LMDB-backed cache of row sets.
///
/// # Example
///
/// ```ignore
/// use rheostat_storage::cache::{CacheBackend, CacheKey, LmdbCacheBackend};
///
/// let backend = LmdbCacheBackend::new("/var/cache/rheostat", 64)?;
/// let key = CacheKey::new("engine_params:users")?;
/// backend.put(&key, &entry)?;
/// let cached = backend.get(&key)?;
/// ```
pub struct LmdbCacheBackend {
    env: Env,
    /// Key: encoded [`CacheKey`]. Value: `cached_at` header + JSON entry.
    db: Database<Bytes, Bytes>,
    /// Process-local counters; `entry_count` is read from LMDB on demand.
    stats: RwLock<CacheStats>,
}

impl LmdbCacheBackend {
    /// Open (or create) the cache in directory `path`, mapping at most
    /// `max_size_mb` megabytes.
    ///
    /// Fails with [`LmdbCacheError::Io`] when the directory can't be created
    /// and with `EnvOpen`/`DbOpen` when LMDB refuses it.
    pub fn new<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, LmdbCacheError> {
        std::fs::create_dir_all(&path)?;

        // SAFETY: the environment is opened once per backend and never
        // opened twice from the same process for the same path.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(max_size_mb * 1024 * 1024)
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(|e| LmdbCacheError::EnvOpen(e.to_string()))?;

        let mut wtxn = env.write_txn().map_err(txn_error)?;
        let db: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| LmdbCacheError::DbOpen(e.to_string()))?;
        wtxn.commit().map_err(txn_error)?;

        tracing::debug!(path = %path.as_ref().display(), max_size_mb, "Opened LMDB cache");

        Ok(Self {
            env,
            db,
            stats: RwLock::new(CacheStats::default()),
        })
    }

    fn record(&self, update: impl FnOnce(&mut CacheStats)) {
        if let Ok(mut stats) = self.stats.write() {
            update(&mut stats);
        }
    }

    /// Format: [cached_at millis: 8 bytes LE][json entry]
    fn encode_entry(entry: &CachedEntry) -> Result<Vec<u8>, LmdbCacheError> {
        let timestamp_bytes = entry.cached_at.timestamp_millis().to_le_bytes();
        let value_bytes = serde_json::to_vec(entry)
            .map_err(|e| LmdbCacheError::Serialization(e.to_string()))?;

        let mut full_bytes = Vec::with_capacity(HEADER_LEN + value_bytes.len());
        full_bytes.extend_from_slice(&timestamp_bytes);
        full_bytes.extend_from_slice(&value_bytes);
        Ok(full_bytes)
    }

    fn decode_entry(bytes: &[u8]) -> Result<CachedEntry, LmdbCacheError> {
        if bytes.len() < HEADER_LEN {
            return Err(LmdbCacheError::Deserialization(
                "Entry shorter than header".into(),
            ));
        }
        let timestamp_bytes: [u8; HEADER_LEN] = bytes[..HEADER_LEN]
            .try_into()
            .map_err(|_| LmdbCacheError::Deserialization("Invalid timestamp".into()))?;
        let cached_at = DateTime::from_timestamp_millis(i64::from_le_bytes(timestamp_bytes))
            .unwrap_or_else(Utc::now);

        let entry: CachedEntry = serde_json::from_slice(&bytes[HEADER_LEN..])
            .map_err(|e| LmdbCacheError::Deserialization(e.to_string()))?;
        Ok(entry.with_cached_at(cached_at))
    }

    fn remove(&self, key: &CacheKey) -> Result<bool, LmdbCacheError> {
        let encoded_key = key.encode();
        let mut wtxn = self.env.write_txn().map_err(txn_error)?;
        let deleted = self
            .db
            .delete(&mut wtxn, encoded_key.as_slice())
            .map_err(txn_error)?;
        wtxn.commit().map_err(txn_error)?;
        Ok(deleted)
    }
}

impl CacheBackend for LmdbCacheBackend {
    fn get(&self, key: &CacheKey) -> CacheResult<Option<CachedEntry>> {
        let encoded_key = key.encode();
        let rtxn = self.env.read_txn().map_err(txn_error)?;

        match self.db.get(&rtxn, encoded_key.as_slice()) {
            Ok(Some(bytes)) => {
                self.record(|s| s.hits += 1);
                let entry = Self::decode_entry(bytes)?;
                Ok(Some(entry))
            }
            Ok(None) => {
                self.record(|s| s.misses += 1);
                Ok(None)
            }
            Err(e) => {
                self.record(|s| s.misses += 1);
                Err(txn_error(e).into())
            }
        }
    }

    fn put(&self, key: &CacheKey, entry: &CachedEntry) -> CacheResult<()> {
        let encoded_key = key.encode();
        let full_bytes = Self::encode_entry(entry)?;

        let mut wtxn = self.env.write_txn().map_err(txn_error)?;
        self.db
            .put(&mut wtxn, encoded_key.as_slice(), full_bytes.as_slice())
            .map_err(txn_error)?;
        wtxn.commit().map_err(txn_error)?;

        self.record(|s| s.memory_bytes += full_bytes.len() as u64);
        Ok(())
    }

    fn delete(&self, key: &CacheKey) -> CacheResult<bool> {
        Ok(self.remove(key)?)
    }

    fn evict(&self, key: &CacheKey) -> CacheResult<bool> {
        let removed = self.remove(key)?;
        if removed {
            self.record(|s| s.evictions += 1);
        }
        Ok(removed)
    }

    fn clear(&self) -> CacheResult<u64> {
        let mut wtxn = self.env.write_txn().map_err(txn_error)?;
        let removed = self.db.len(&wtxn).map_err(txn_error)?;
        self.db.clear(&mut wtxn).map_err(txn_error)?;
        wtxn.commit().map_err(txn_error)?;

        self.record(|s| s.memory_bytes = 0);
        Ok(removed)
    }

    fn stats(&self) -> CacheResult<CacheStats> {
        let rtxn = self.env.read_txn().map_err(txn_error)?;
        let entry_count = self.db.len(&rtxn).map_err(txn_error)?;

        let mut stats = self
            .stats
            .read()
            .map(|s| s.clone())
            .map_err(|_| CacheError::LockPoisoned)?;
        stats.entry_count = entry_count;
        Ok(stats)
    }
}
