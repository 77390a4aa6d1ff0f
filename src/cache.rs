//! Content-addressed result cache on the local filesystem.
//!
//! ## Layout
//!
//! ```text
//! {cache_root}/{tenant_id}/{key}.json
//! ```
//!
//! `key = sha256(file_sha256_hex || json(config_fields))` where the config
//! fields are the settings that change the result (`max_pages`,
//! `output_mode`, `extract_financial_tables`, `strategy_version`),
//! serialised with sorted keys. The same bytes under the same settings
//! always map to the same entry regardless of the file name.
//!
//! ## Policy
//!
//! * Entries older than the TTL (wall-clock age) are misses and are deleted.
//! * Unreadable or undeserialisable entries are misses.
//! * Writes go to a temp file in the same directory and are renamed over
//!   the target, so readers never see a partial entry.

use crate::config::ProcessingConfig;
use crate::output::MergedResult;
use crate::pipeline::strategy::STRATEGY_VERSION;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Cache failures. Never fatal to a pipeline run.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt cache entry '{path}': {detail}")]
    Corrupt { path: PathBuf, detail: String },

    #[error("cache task failed: {0}")]
    Task(String),
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> CacheError + '_ {
    move |source| CacheError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// One stored result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub cached_at: DateTime<Utc>,
    pub key: String,
    pub result: MergedResult,
}

impl CacheEntry {
    fn is_expired(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.cached_at)
            .to_std()
            .is_ok_and(|age| age > ttl)
    }
}

/// SHA-256 of `bytes` as lowercase hex.
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Hash a file's contents.
pub async fn hash_file(path: &Path) -> Result<String, CacheError> {
    let bytes = tokio::fs::read(path).await.map_err(io_error(path))?;
    Ok(sha256_hex(&bytes))
}

/// Filesystem cache for one tenant.
#[derive(Debug, Clone)]
pub struct ResultCache {
    dir: PathBuf,
    ttl: Duration,
}

impl ResultCache {
    pub fn new(root: impl Into<PathBuf>, tenant_id: &str, ttl: Duration) -> Self {
        Self {
            dir: root.into().join(tenant_id),
            ttl,
        }
    }

    pub fn from_config(config: &ProcessingConfig) -> Self {
        Self::new(config.cache_root(), &config.tenant_id, config.cache_ttl())
    }

    /// Directory holding this tenant's entries.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Cache key for a file hash under `config`.
    pub fn key_for(file_hash: &str, config: &ProcessingConfig) -> String {
        let mut fields: BTreeMap<&str, serde_json::Value> = BTreeMap::new();
        fields.insert(
            "extract_financial_tables",
            config.extract_financial_tables.into(),
        );
        fields.insert("max_pages", config.max_pages.into());
        fields.insert("output_mode", config.output_mode.as_str().into());
        fields.insert("strategy_version", STRATEGY_VERSION.into());
        // A BTreeMap of JSON values always serialises.
        let json = serde_json::to_string(&fields).unwrap_or_default();

        let mut hasher = Sha256::new();
        hasher.update(file_hash.as_bytes());
        hasher.update(json.as_bytes());
        hex::encode(hasher.finalize())
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    async fn read_entry(&self, path: &Path) -> Result<Option<CacheEntry>, CacheError> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error(path)(e)),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| CacheError::Corrupt {
                path: path.to_path_buf(),
                detail: e.to_string(),
            })
    }

    /// Look up a result. Hits come back with `cache_hit = true` and
    /// `cached_at` set.
    pub async fn get(&self, key: &str) -> Option<MergedResult> {
        let path = self.entry_path(key);
        let entry = match self.read_entry(&path).await {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                debug!("Cache miss: {}", key);
                return None;
            }
            Err(e) => {
                warn!("Treating cache entry as a miss: {}", e);
                return None;
            }
        };

        if entry.is_expired(self.ttl, Utc::now()) {
            info!("Cache entry {} expired (cached at {})", key, entry.cached_at);
            if let Err(e) = tokio::fs::remove_file(&path).await {
                warn!("Failed to delete expired cache entry {}: {}", path.display(), e);
            }
            return None;
        }

        debug!("Cache hit: {}", key);
        let mut result = entry.result;
        result.cache_hit = true;
        result.cached_at = Some(entry.cached_at);
        Some(result)
    }

    /// Store a result under `key`, replacing any previous entry atomically.
    pub async fn put(&self, key: &str, result: &MergedResult) -> Result<DateTime<Utc>, CacheError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(io_error(&self.dir))?;

        let cached_at = Utc::now();
        let mut stored = result.clone();
        stored.cache_hit = false;
        stored.cached_at = None;
        let entry = CacheEntry {
            cached_at,
            key: key.to_string(),
            result: stored,
        };
        let bytes = serde_json::to_vec(&entry).map_err(|e| CacheError::Corrupt {
            path: self.entry_path(key),
            detail: e.to_string(),
        })?;

        let dir = self.dir.clone();
        let target = self.entry_path(key);
        let prefix = format!("{key}.");
        tokio::task::spawn_blocking(move || -> Result<(), CacheError> {
            let mut tmp = tempfile::Builder::new()
                .prefix(&prefix)
                .suffix(".tmp")
                .tempfile_in(&dir)
                .map_err(io_error(&dir))?;
            tmp.write_all(&bytes).map_err(io_error(tmp.path()))?;
            tmp.as_file().sync_all().map_err(io_error(&target))?;
            tmp.persist(&target)
                .map_err(|e| io_error(&target)(e.error))?;
            Ok(())
        })
        .await
        .map_err(|e| CacheError::Task(e.to_string()))??;

        debug!("Cached result under {}", key);
        Ok(cached_at)
    }

    /// Remove an entry. Returns whether one existed.
    pub async fn evict(&self, key: &str) -> Result<bool, CacheError> {
        let path = self.entry_path(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(io_error(&path)(e)),
        }
    }

    /// Delete expired and corrupt entries of this tenant. Returns how many
    /// were removed.
    pub async fn purge_expired(&self) -> Result<usize, CacheError> {
        let mut dir = match tokio::fs::read_dir(&self.dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(io_error(&self.dir)(e)),
        };

        let now = Utc::now();
        let mut removed = 0;
        while let Some(item) = dir.next_entry().await.map_err(io_error(&self.dir))? {
            let path = item.path();
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            let stale = match self.read_entry(&path).await {
                Ok(Some(entry)) => entry.is_expired(self.ttl, now),
                Ok(None) => false,
                Err(CacheError::Corrupt { .. }) => true,
                Err(e) => return Err(e),
            };
            if stale {
                tokio::fs::remove_file(&path).await.map_err(io_error(&path))?;
                removed += 1;
            }
        }
        if removed > 0 {
            info!("Purged {} cache entries from {}", removed, self.dir.display());
        }
        Ok(removed)
    }
}
