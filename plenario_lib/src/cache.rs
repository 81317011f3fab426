//! Content-addressed TTL cache for fetched payloads, plus the remote
//! object-storage contract.
//!
//! Entries live on disk as a gzip-compressed payload next to a JSON metadata
//! sidecar carrying creation and expiry timestamps. Expired entries are
//! treated as absent and lazily evicted on access; [`DiskCache::sweep`]
//! removes the rest. A `DashMap` index keeps lookups concurrent across
//! workers without locking the directory.

use std::io::{Read, Write};
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::PipelineError;

/// Creation/expiry metadata stored next to each payload.
///
/// Invariant: `expires_at > created_at`; `put` clamps zero TTLs.
#[derive(Serialize, Deserialize, Clone, Copy)]
struct EntryMeta {
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl EntryMeta {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Aggregate cache statistics for operator display.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub expired: usize,
    pub total_bytes: u64,
}

/// Disk-backed TTL cache, content-addressed by SHA-256 of the request key.
pub struct DiskCache {
    dir: PathBuf,
    index: DashMap<String, EntryMeta>,
    default_ttl: Duration,
}

impl DiskCache {
    /// Opens (or creates) a cache directory and loads existing entry
    /// metadata into the index.
    pub fn open(dir: impl Into<PathBuf>, default_ttl: Duration) -> Result<Self, PipelineError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;

        let index = DashMap::new();
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("meta") {
                continue;
            }
            let Some(key) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match std::fs::read_to_string(&path)
                .ok()
                .and_then(|raw| serde_json::from_str::<EntryMeta>(&raw).ok())
            {
                Some(meta) => {
                    index.insert(key.to_string(), meta);
                }
                None => {
                    tracing::warn!("discarding unreadable cache metadata: {}", path.display());
                    let _ = std::fs::remove_file(&path);
                }
            }
        }

        Ok(Self {
            dir,
            index,
            default_ttl,
        })
    }

    /// Derives the cache key for a request: SHA-256 over the URL and the
    /// query pairs in sorted order, so parameter order never splits entries.
    pub fn key_for(url: &str, params: &[(String, String)]) -> String {
        let mut sorted: Vec<&(String, String)> = params.iter().collect();
        sorted.sort();

        let mut hasher = Sha256::new();
        hasher.update(url.as_bytes());
        for (k, v) in sorted {
            hasher.update(b"&");
            hasher.update(k.as_bytes());
            hasher.update(b"=");
            hasher.update(v.as_bytes());
        }
        format!("{:x}", hasher.finalize())
    }

    /// Returns the cached payload for `key`, or `None` if missing or
    /// expired. Expired entries are evicted on the way out.
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        let meta = *self.index.get(key)?;
        if meta.is_expired(Utc::now()) {
            self.remove(key);
            return None;
        }
        match std::fs::read(self.payload_path(key))
            .ok()
            .and_then(|raw| gunzip(&raw).ok())
        {
            Some(bytes) => Some(bytes),
            None => {
                // Sidecar without a readable payload: drop the entry.
                self.remove(key);
                None
            }
        }
    }

    /// Inserts or overwrites an entry. `ttl` falls back to the cache
    /// default; zero TTLs are clamped to one second so expiry always
    /// follows creation.
    pub fn put(&self, key: &str, payload: &[u8], ttl: Option<Duration>) -> Result<(), PipelineError> {
        let ttl = ttl.unwrap_or(self.default_ttl).max(Duration::from_secs(1));
        let created_at = Utc::now();
        let expires_at = created_at
            + chrono::Duration::from_std(ttl)
                .map_err(|e| PipelineError::Cache(format!("ttl out of range: {}", e)))?;
        let meta = EntryMeta {
            created_at,
            expires_at,
        };

        std::fs::write(self.payload_path(key), gzip(payload)?)?;
        std::fs::write(
            self.meta_path(key),
            serde_json::to_string(&meta).map_err(|e| PipelineError::Cache(e.to_string()))?,
        )?;
        self.index.insert(key.to_string(), meta);
        Ok(())
    }

    /// Removes one entry and its files.
    pub fn remove(&self, key: &str) {
        self.index.remove(key);
        let _ = std::fs::remove_file(self.payload_path(key));
        let _ = std::fs::remove_file(self.meta_path(key));
    }

    /// Evicts every expired entry. Returns the number removed.
    pub fn sweep(&self) -> usize {
        let now = Utc::now();
        let expired: Vec<String> = self
            .index
            .iter()
            .filter(|entry| entry.value().is_expired(now))
            .map(|entry| entry.key().clone())
            .collect();
        for key in &expired {
            self.remove(key);
        }
        expired.len()
    }

    /// Removes every entry. Returns the number removed.
    pub fn clear(&self) -> usize {
        let keys: Vec<String> = self.index.iter().map(|e| e.key().clone()).collect();
        for key in &keys {
            self.remove(key);
        }
        keys.len()
    }

    pub fn stats(&self) -> CacheStats {
        let now = Utc::now();
        let mut stats = CacheStats {
            entries: 0,
            expired: 0,
            total_bytes: 0,
        };
        for entry in self.index.iter() {
            stats.entries += 1;
            if entry.value().is_expired(now) {
                stats.expired += 1;
            }
            if let Ok(md) = std::fs::metadata(self.payload_path(entry.key())) {
                stats.total_bytes += md.len();
            }
        }
        stats
    }

    fn payload_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.gz", key))
    }

    fn meta_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.meta", key))
    }
}

/// Remote object-storage collaborator. Payload mirroring for bulk pulls
/// writes through this; the pipeline never depends on it for reads.
pub trait ObjectStore: Send + Sync {
    /// Stores `bytes` at `path`, returning the resulting object URL.
    fn put(
        &self,
        path: &str,
        bytes: &[u8],
        content_type: &str,
        compressed: bool,
    ) -> Result<String, PipelineError>;

    /// Fetches the object at `path`, or `None` when absent.
    fn get(&self, path: &str, compressed: bool) -> Result<Option<Vec<u8>>, PipelineError>;
}

/// Builds the hierarchical object path `{record_type}/{year}/{sub_type}/{filename}`.
pub fn object_path(record_type: &str, year: i32, sub_type: &str, filename: &str) -> String {
    let mut parts = vec![record_type.to_string(), year.to_string()];
    if !sub_type.is_empty() {
        parts.push(sub_type.to_string());
    }
    parts.push(filename.to_string());
    parts.join("/")
}

/// Filesystem-backed [`ObjectStore`], used for local runs and tests.
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ObjectStore for LocalObjectStore {
    fn put(
        &self,
        path: &str,
        bytes: &[u8],
        _content_type: &str,
        compressed: bool,
    ) -> Result<String, PipelineError> {
        let full = self.root.join(path);
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent)?;
        }
        if compressed {
            std::fs::write(&full, gzip(bytes)?)?;
        } else {
            std::fs::write(&full, bytes)?;
        }
        Ok(format!("file://{}", full.display()))
    }

    fn get(&self, path: &str, compressed: bool) -> Result<Option<Vec<u8>>, PipelineError> {
        let full = self.root.join(path);
        if !full.exists() {
            return Ok(None);
        }
        let raw = std::fs::read(&full)?;
        if compressed {
            Ok(Some(gunzip(&raw)?))
        } else {
            Ok(Some(raw))
        }
    }
}

fn gzip(bytes: &[u8]) -> Result<Vec<u8>, PipelineError> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(bytes)
        .and_then(|_| encoder.finish())
        .map_err(|e| PipelineError::Cache(format!("gzip failed: {}", e)))
}

fn gunzip(bytes: &[u8]) -> Result<Vec<u8>, PipelineError> {
    let mut decoder = GzDecoder::new(bytes);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| PipelineError::Cache(format!("gunzip failed: {}", e)))?;
    Ok(out)
}
