//! On-disk installation cache.
//!
//! Successful install results are persisted per fingerprint so repeated
//! provisioning runs can skip work that is already done. Entries are single
//! JSON files named by fingerprint; writes go through a temp file plus
//! rename so a crash mid-write never leaves a half-written entry visible.
//!
//! Expiration is lazy: entries are validated against their TTL when read.
//! The only proactive maintenance is oldest-first eviction once the store
//! grows past `max_entries`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::fingerprint::Fingerprint;
use crate::types::CommandOutput;

/// Bumped when the entry format changes; older entries read as misses.
const SCHEMA_VERSION: u32 = 1;

/// Default cap on stored entries before oldest-first eviction kicks in.
const DEFAULT_MAX_ENTRIES: usize = 512;

/// Cached outcome of a successfully installed unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedResult {
    /// Output captured from the original run
    pub output: CommandOutput,
    /// How long the original install took, in seconds.
    ///
    /// Feeds the monitor's estimated-time-saved figure on later hits.
    pub duration_secs: f64,
}

/// One entry file on disk.
#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry {
    schema_version: u32,
    fingerprint: String,
    result: CachedResult,
    timestamp: DateTime<Utc>,
    ttl_secs: u64,
}

impl CacheEntry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        let age = now.signed_duration_since(self.timestamp);
        age.num_seconds() < 0 || age.num_seconds() as u64 >= self.ttl_secs
    }
}

/// Cache statistics for reporting and optimizer input.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    /// Lookups answered from the store this run
    pub hits: u64,
    /// Lookups that found nothing usable this run
    pub misses: u64,
    /// Entries currently on disk
    pub entries: usize,
    /// Total size of entry files on disk
    pub size_bytes: u64,
}

impl CacheStats {
    /// Fraction of lookups served from cache (0.0 when no lookups happened).
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Persistent store of install outcomes, keyed by fingerprint.
///
/// One instance is shared by all scheduler workers: reads are concurrent,
/// writes serialize through an internal lock, and every write is an atomic
/// replace. A store that cannot be opened degrades to an always-miss cache
/// rather than failing the run.
pub struct InstallationCache {
    dir: PathBuf,
    max_entries: usize,
    /// Set when the store directory could not be created; all lookups miss
    disabled: bool,
    hits: AtomicU64,
    misses: AtomicU64,
    write_lock: Mutex<()>,
}

impl InstallationCache {
    /// Open (or create) a cache store at `dir`.
    ///
    /// Never fails: an unusable directory logs a warning and yields a cache
    /// that misses every lookup and drops every write.
    pub fn open(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let disabled = match fs::create_dir_all(&dir) {
            Ok(()) => false,
            Err(e) => {
                log::warn!(
                    "cache store at {} unusable ({}), continuing without cache",
                    dir.display(),
                    e
                );
                true
            }
        };

        Self {
            dir,
            max_entries: DEFAULT_MAX_ENTRIES,
            disabled,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            write_lock: Mutex::new(()),
        }
    }

    /// Set the entry cap for proactive eviction.
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries.max(1);
        self
    }

    /// Path of the entry file for a fingerprint.
    fn entry_path(&self, fingerprint: &Fingerprint) -> PathBuf {
        self.dir.join(format!("{fingerprint}.json"))
    }

    /// Look up a fingerprint.
    ///
    /// Returns `None` on a miss, an expired entry (pruned on the spot), or
    /// a corrupted entry (removed, logged, scoped to that fingerprint only).
    pub fn get(&self, fingerprint: &Fingerprint) -> Option<CachedResult> {
        if self.disabled {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        let path = self.entry_path(fingerprint);
        if !path.exists() {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        match self.read_entry(&path, fingerprint) {
            Ok(entry) if entry.is_expired(Utc::now()) => {
                log::debug!("cache entry expired for {fingerprint}");
                let _ = fs::remove_file(&path);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            Ok(entry) => {
                log::debug!("cache hit for {fingerprint}");
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.result)
            }
            Err(e) => {
                // Corruption is scoped to this one entry; drop it and move on
                log::warn!("{e}");
                let _ = fs::remove_file(&path);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    fn read_entry(&self, path: &Path, fingerprint: &Fingerprint) -> Result<CacheEntry> {
        let corrupt = |message: String| Error::CacheCorrupt {
            fingerprint: fingerprint.to_string(),
            message,
        };

        let content = fs::read_to_string(path).map_err(|e| corrupt(e.to_string()))?;
        let entry: CacheEntry =
            serde_json::from_str(&content).map_err(|e| corrupt(e.to_string()))?;

        if entry.schema_version != SCHEMA_VERSION {
            return Err(corrupt(format!(
                "schema version {} (expected {})",
                entry.schema_version, SCHEMA_VERSION
            )));
        }
        Ok(entry)
    }

    /// Store a result under a fingerprint.
    ///
    /// The write is atomic (temp file + rename). Failures are logged and
    /// swallowed: a broken cache must never fail an install that succeeded.
    pub fn put(&self, fingerprint: &Fingerprint, result: CachedResult, ttl: Duration) {
        if self.disabled {
            return;
        }
        if let Err(e) = self.try_put(fingerprint, result, ttl) {
            log::warn!("failed to cache {fingerprint}: {e}");
        }
    }

    fn try_put(&self, fingerprint: &Fingerprint, result: CachedResult, ttl: Duration) -> Result<()> {
        let entry = CacheEntry {
            schema_version: SCHEMA_VERSION,
            fingerprint: fingerprint.to_string(),
            result,
            timestamp: Utc::now(),
            ttl_secs: ttl.as_secs(),
        };
        let content = serde_json::to_string(&entry)?;

        let _guard = match self.write_lock.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        // Same-directory temp file so the rename stays on one filesystem
        let tmp = self.dir.join(format!(".{fingerprint}.tmp"));
        fs::write(&tmp, &content)?;
        fs::rename(&tmp, self.entry_path(fingerprint))?;

        log::debug!("cached {fingerprint} for {}s", ttl.as_secs());

        self.evict_past_limit();
        Ok(())
    }

    /// Remove entries beyond `max_entries`, oldest write timestamp first.
    fn evict_past_limit(&self) {
        let Ok(mut stamped) = self.stamped_entries() else {
            return;
        };
        if stamped.len() <= self.max_entries {
            return;
        }

        stamped.sort_by_key(|(_, timestamp)| *timestamp);
        let excess = stamped.len() - self.max_entries;
        for (path, _) in stamped.into_iter().take(excess) {
            log::debug!("evicting cache entry {}", path.display());
            let _ = fs::remove_file(path);
        }
    }

    /// Entry files paired with their write timestamps.
    ///
    /// Unparseable files sort first (epoch timestamp) so eviction clears
    /// them before anything valid.
    fn stamped_entries(&self) -> Result<Vec<(PathBuf, DateTime<Utc>)>> {
        let mut stamped = Vec::new();
        for dir_entry in fs::read_dir(&self.dir)? {
            let path = dir_entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let timestamp = fs::read_to_string(&path)
                .ok()
                .and_then(|c| serde_json::from_str::<CacheEntry>(&c).ok())
                .map(|e| e.timestamp)
                .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
            stamped.push((path, timestamp));
        }
        Ok(stamped)
    }

    /// Remove a single entry.
    pub fn invalidate(&self, fingerprint: &Fingerprint) {
        let path = self.entry_path(fingerprint);
        if path.exists() {
            if let Err(e) = fs::remove_file(&path) {
                log::warn!("failed to invalidate cache for {fingerprint}: {e}");
            } else {
                log::debug!("invalidated cache for {fingerprint}");
            }
        }
    }

    /// Remove every entry in the store.
    pub fn clear(&self) -> Result<usize> {
        let _guard = match self.write_lock.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let mut removed = 0;
        if let Ok(entries) = fs::read_dir(&self.dir) {
            for dir_entry in entries.flatten() {
                let path = dir_entry.path();
                if path.extension().and_then(|e| e.to_str()) == Some("json") {
                    fs::remove_file(&path)?;
                    removed += 1;
                }
            }
        }
        log::info!("cleared {removed} cache entries");
        Ok(removed)
    }

    /// Current statistics: this run's hit/miss counters plus on-disk totals.
    pub fn stats(&self) -> CacheStats {
        let mut entries = 0;
        let mut size_bytes = 0;
        if let Ok(dir_entries) = fs::read_dir(&self.dir) {
            for dir_entry in dir_entries.flatten() {
                let path = dir_entry.path();
                if path.extension().and_then(|e| e.to_str()) == Some("json") {
                    entries += 1;
                    size_bytes += dir_entry.metadata().map(|m| m.len()).unwrap_or(0);
                }
            }
        }

        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries,
            size_bytes,
        }
    }

    /// Directory backing this store.
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}
