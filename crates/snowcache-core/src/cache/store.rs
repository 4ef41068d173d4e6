use std::collections::HashMap;
use std::fmt::Write as _;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::entry::{CacheEntry, CachedView, SCHEMA_VERSION};
use super::policy::{Category, StalenessPolicy};
use crate::clock::{Clock, SystemClock};

const ENTRY_EXTENSION: &str = "json";
const TEMP_EXTENSION: &str = "tmp";

/// Just enough of an entry to age it without decoding the payload.
#[derive(Debug, Deserialize)]
struct EntryHeader {
    cached_at: DateTime<Utc>,
}

/// Counters for failures the store swallows instead of surfacing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreDiagnostics {
    /// Entries that existed on disk but could not be decoded
    pub decode_failures: u64,
    /// Writes that failed and were only logged
    pub write_failures: u64,
}

/// Durable key-value store of cache entries, one JSON file per entry,
/// one directory per category.
pub struct PersistentStore {
    root: PathBuf,
    policy: StalenessPolicy,
    clock: Arc<dyn Clock>,
    /// Serializes put/delete/cleanup so the cleanup age check and the delete
    /// it guards see the same file.
    write_guard: Mutex<()>,
    decode_failures: AtomicU64,
    write_failures: AtomicU64,
}

impl PersistentStore {
    pub fn new(root: PathBuf) -> Result<Self> {
        fs::create_dir_all(&root)
            .with_context(|| format!("Failed to create cache directory: {}", root.display()))?;
        Ok(Self {
            root,
            policy: StalenessPolicy::default(),
            clock: Arc::new(SystemClock),
            write_guard: Mutex::new(()),
            decode_failures: AtomicU64::new(0),
            write_failures: AtomicU64::new(0),
        })
    }

    pub fn with_policy(mut self, policy: StalenessPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn policy(&self) -> &StalenessPolicy {
        &self.policy
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn diagnostics(&self) -> StoreDiagnostics {
        StoreDiagnostics {
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
        }
    }

    // ===== Paths =====

    fn table_dir(&self, category: Category) -> PathBuf {
        self.root.join(category.table_name())
    }

    fn entry_path(&self, category: Category, key: &str) -> PathBuf {
        self.table_dir(category)
            .join(format!("{}.{}", escape_key(key), ENTRY_EXTENSION))
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        // The guarded data is (), so a poisoned lock carries no broken state
        self.write_guard.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ===== Raw entry IO =====

    fn decode_file<T: DeserializeOwned>(&self, category: Category, path: &Path) -> Option<CacheEntry<T>> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                debug!(category = %category, path = %path.display(), error = %e, "Failed to read cache entry");
                return None;
            }
        };

        match serde_json::from_str::<CacheEntry<T>>(&contents) {
            Ok(entry) if entry.schema_version == SCHEMA_VERSION => Some(entry),
            Ok(entry) => {
                self.record_decode_failure(category, path, &format!(
                    "schema version {} (expected {})",
                    entry.schema_version, SCHEMA_VERSION
                ));
                None
            }
            Err(e) => {
                self.record_decode_failure(category, path, &e.to_string());
                None
            }
        }
    }

    fn record_decode_failure(&self, category: Category, path: &Path, reason: &str) {
        self.decode_failures.fetch_add(1, Ordering::Relaxed);
        warn!(
            category = %category,
            path = %path.display(),
            reason = reason,
            "Undecodable cache entry treated as a miss"
        );
    }

    fn write_entry<T: Serialize>(&self, category: Category, entry: &CacheEntry<&T>) -> Result<()> {
        let dir = self.table_dir(category);
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create cache table: {}", category))?;

        let path = self.entry_path(category, &entry.key);
        let temp = path.with_extension(TEMP_EXTENSION);
        let contents = serde_json::to_string(entry)?;
        fs::write(&temp, contents)
            .with_context(|| format!("Failed to write cache entry: {}/{}", category, entry.key))?;
        fs::rename(&temp, &path)
            .with_context(|| format!("Failed to commit cache entry: {}/{}", category, entry.key))?;
        Ok(())
    }

    fn view<T>(&self, category: Category, entry: CacheEntry<T>, now: DateTime<Utc>) -> CachedView<T> {
        CachedView {
            is_stale: self.policy.is_stale(category, now - entry.cached_at),
            cached_at: entry.cached_at,
            data: entry.payload,
        }
    }

    // ===== Writes =====

    /// Upsert an entry stamped with the current time. Failures are logged,
    /// never returned.
    pub fn put<T: Serialize>(&self, category: Category, key: &str, payload: &T) {
        let now = self.now();
        self.put_at(category, key, payload, now);
    }

    /// Upsert an entry with an explicit write timestamp.
    pub fn put_at<T: Serialize>(&self, category: Category, key: &str, payload: &T, cached_at: DateTime<Utc>) {
        let entry = CacheEntry::new(key, payload, cached_at);
        let _guard = self.lock();
        if let Err(e) = self.write_entry(category, &entry) {
            self.write_failures.fetch_add(1, Ordering::Relaxed);
            warn!(category = %category, key = key, error = %e, "Failed to persist cache entry");
        }
    }

    /// Upsert several entries sharing one timestamp. Returns how many were written.
    pub fn put_many<'a, T, I>(&self, category: Category, items: I, cached_at: DateTime<Utc>) -> usize
    where
        T: Serialize + 'a,
        I: IntoIterator<Item = (&'a str, &'a T)>,
    {
        let _guard = self.lock();
        let mut written = 0;
        for (key, payload) in items {
            let entry = CacheEntry::new(key, payload, cached_at);
            match self.write_entry(category, &entry) {
                Ok(()) => written += 1,
                Err(e) => {
                    self.write_failures.fetch_add(1, Ordering::Relaxed);
                    warn!(category = %category, key = key, error = %e, "Failed to persist cache entry");
                }
            }
        }
        debug!(category = %category, written, "Cache entries written");
        written
    }

    /// Delete one entry. Returns whether anything was removed.
    pub fn delete(&self, category: Category, key: &str) -> bool {
        let _guard = self.lock();
        match fs::remove_file(self.entry_path(category, key)) {
            Ok(()) => true,
            Err(e) if e.kind() == ErrorKind::NotFound => false,
            Err(e) => {
                warn!(category = %category, key = key, error = %e, "Failed to delete cache entry");
                false
            }
        }
    }

    // ===== Reads =====

    /// Read one entry. Missing and undecodable entries both read as `None`.
    pub fn get<T: DeserializeOwned>(&self, category: Category, key: &str) -> Option<CachedView<T>> {
        let entry = self.decode_file(category, &self.entry_path(category, key))?;
        Some(self.view(category, entry, self.now()))
    }

    /// Read the entries that exist among `keys`.
    pub fn get_many<T: DeserializeOwned>(
        &self,
        category: Category,
        keys: &[String],
    ) -> HashMap<String, CachedView<T>> {
        let now = self.now();
        keys.iter()
            .filter_map(|key| {
                let entry = self.decode_file(category, &self.entry_path(category, key))?;
                Some((key.clone(), self.view(category, entry, now)))
            })
            .collect()
    }

    /// Every decodable entry in a category, in no particular order.
    pub fn entries<T: DeserializeOwned>(&self, category: Category) -> Vec<CacheEntry<T>> {
        self.entry_files(category)
            .iter()
            .filter_map(|path| self.decode_file(category, path))
            .collect()
    }

    /// Read a whole category as one collection. The collection is as old as
    /// its oldest member.
    pub fn get_all<T: DeserializeOwned>(&self, category: Category) -> Option<CachedView<Vec<T>>> {
        let entries = self.entries::<T>(category);
        let oldest = entries.iter().map(|entry| entry.cached_at).min()?;
        let now = self.now();
        Some(CachedView {
            data: entries.into_iter().map(|entry| entry.payload).collect(),
            cached_at: oldest,
            is_stale: self.policy.is_stale(category, now - oldest),
        })
    }

    fn entry_files(&self, category: Category) -> Vec<PathBuf> {
        let dir = self.table_dir(category);
        let read_dir = match fs::read_dir(&dir) {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                warn!(category = %category, error = %e, "Failed to list cache table");
                return Vec::new();
            }
        };

        read_dir
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.extension().and_then(|ext| ext.to_str()) == Some(ENTRY_EXTENSION))
            .collect()
    }

    // ===== Maintenance =====

    /// Delete every entry whose `cached_at` is older than `older_than`.
    /// Returns the number of entries removed.
    pub fn cleanup(&self, older_than: Duration) -> usize {
        Category::ALL
            .iter()
            .map(|&category| self.cleanup_category(category, older_than))
            .sum()
    }

    /// Apply each category's hard-expiry window.
    pub fn cleanup_expired(&self) -> usize {
        let removed: usize = Category::ALL
            .iter()
            .map(|&category| {
                self.cleanup_category(category, self.policy.hard_expiry_window(category))
            })
            .sum();
        info!(removed, "Cache cleanup finished");
        removed
    }

    fn cleanup_category(&self, category: Category, older_than: Duration) -> usize {
        let cutoff = self.now() - older_than;
        let mut removed = 0;

        for path in self.entry_files(category) {
            // Age check and delete happen under one guard so a concurrent
            // rewrite either lands before the check (and survives) or after
            // the delete (and is kept with its own timestamp).
            let _guard = self.lock();
            let Some(written_at) = self.entry_age_stamp(&path) else {
                continue;
            };
            if written_at >= cutoff {
                continue;
            }
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(category = %category, path = %path.display(), error = %e, "Failed to remove expired entry");
                }
            }
        }

        if removed > 0 {
            debug!(category = %category, removed, "Expired cache entries removed");
        }
        removed
    }

    /// The entry's `cached_at`, or the file modification time for entries
    /// too damaged to carry one.
    fn entry_age_stamp(&self, path: &Path) -> Option<DateTime<Utc>> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(_) => return modified_at(path),
        };
        match serde_json::from_str::<EntryHeader>(&contents) {
            Ok(header) => Some(header.cached_at),
            Err(_) => modified_at(path),
        }
    }

    /// Remove every cached entry in every category.
    pub fn clear_all(&self) -> Result<()> {
        let _guard = self.lock();
        for category in Category::ALL {
            let dir = self.table_dir(category);
            match fs::remove_dir_all(&dir) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(e).with_context(|| format!("Failed to clear cache table: {}", category));
                }
            }
        }
        info!("Cache cleared");
        Ok(())
    }
}

fn modified_at(path: &Path) -> Option<DateTime<Utc>> {
    fs::metadata(path)
        .and_then(|meta| meta.modified())
        .ok()
        .map(DateTime::<Utc>::from)
}

/// Map a key to a file stem. Alphanumerics, `-` and `_` pass through; every
/// other byte becomes `%XX`, so distinct keys never share a file.
fn escape_key(key: &str) -> String {
    let mut escaped = String::with_capacity(key.len());
    for byte in key.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            escaped.push(byte as char);
        } else {
            let _ = write!(escaped, "%{:02X}", byte);
        }
    }
    escaped
}
