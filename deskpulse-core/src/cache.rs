//! Dataset cache
//!
//! TTL-keyed store of resolved datasets. The cache is an optimization only:
//! every method returns a `Result`, and callers treat an `Err` as a miss.

use crate::error::{Error, Result};
use crate::types::{Dataset, Domain, TimeWindow};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

const UNBOUNDED: &str = "unbounded";
const LIVE_END: &str = "now";

/// Deterministic cache key for a dataset request.
///
/// Composed of the domain, the range token and both window bounds. A live
/// `end=now` bound is written as `now` so that two requests for the same
/// token within the TTL share one entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(domain: Domain, range_token: &str, window: &TimeWindow) -> Self {
        let start = window
            .start_utc()
            .map(|s| s.to_rfc3339())
            .unwrap_or_else(|| UNBOUNDED.to_string());
        let end = if window.live_end {
            LIVE_END.to_string()
        } else {
            window
                .end_utc()
                .map(|e| e.to_rfc3339())
                .unwrap_or_else(|| UNBOUNDED.to_string())
        };
        let token = range_token.trim().to_ascii_lowercase();
        Self(format!("{}:{}:{}:{}", domain.as_str(), token, start, end))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn domain(&self) -> Option<Domain> {
        self.0.split(':').next().and_then(|d| d.parse().ok())
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Storage for resolved datasets.
pub trait DatasetCache: Send + Sync {
    /// Cached dataset for `key`, if present and unexpired.
    fn get(&self, key: &CacheKey) -> Result<Option<Arc<Dataset>>>;

    /// Store a dataset with the given time-to-live.
    fn set(&self, key: CacheKey, dataset: Arc<Dataset>, ttl: Duration) -> Result<()>;

    /// Remove one entry.
    fn invalidate(&self, key: &CacheKey) -> Result<()>;

    /// Remove every entry.
    fn clear(&self) -> Result<()>;
}

/// Hit/miss counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

#[derive(Debug)]
struct Entry {
    dataset: Arc<Dataset>,
    inserted: Instant,
    expires: Instant,
}

/// In-process cache with lazy TTL expiry.
///
/// Expired entries are ignored on read and only purged when the cache is
/// full. When `max_entries` is reached the oldest entry is evicted.
#[derive(Debug)]
pub struct MemoryCache {
    entries: RwLock<HashMap<CacheKey, Entry>>,
    max_entries: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl MemoryCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            max_entries: max_entries.max(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn stats(&self) -> CacheStats {
        let entries = self.entries.read().map(|e| e.len()).unwrap_or(0);
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries,
        }
    }

    /// Drop every entry for one domain, e.g. after a sync.
    pub fn invalidate_domain(&self, domain: Domain) -> Result<usize> {
        let mut entries = self.write()?;
        let before = entries.len();
        entries.retain(|key, _| key.domain() != Some(domain));
        let removed = before - entries.len();
        tracing::debug!(domain = %domain, removed, "Invalidated cached datasets");
        Ok(removed)
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<CacheKey, Entry>>> {
        self.entries
            .write()
            .map_err(|e| Error::Cache(format!("lock poisoned: {e}")))
    }

    fn make_room(entries: &mut HashMap<CacheKey, Entry>, max_entries: usize, now: Instant) {
        entries.retain(|_, entry| entry.expires > now);
        while entries.len() >= max_entries {
            let oldest = entries
                .iter()
                .min_by_key(|(_, entry)| entry.inserted)
                .map(|(key, _)| key.clone());
            match oldest {
                Some(key) => {
                    entries.remove(&key);
                }
                None => break,
            }
        }
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new(crate::config::CacheConfig::default().max_entries)
    }
}

impl DatasetCache for MemoryCache {
    fn get(&self, key: &CacheKey) -> Result<Option<Arc<Dataset>>> {
        let entries = self
            .entries
            .read()
            .map_err(|e| Error::Cache(format!("lock poisoned: {e}")))?;
        let found = entries
            .get(key)
            .filter(|entry| entry.expires > Instant::now())
            .map(|entry| Arc::clone(&entry.dataset));
        let counter = if found.is_some() { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
        Ok(found)
    }

    fn set(&self, key: CacheKey, dataset: Arc<Dataset>, ttl: Duration) -> Result<()> {
        let now = Instant::now();
        let mut entries = self.write()?;
        if !entries.contains_key(&key) && entries.len() >= self.max_entries {
            Self::make_room(&mut entries, self.max_entries, now);
        }
        entries.insert(
            key,
            Entry {
                dataset,
                inserted: now,
                expires: now + ttl,
            },
        );
        Ok(())
    }

    fn invalidate(&self, key: &CacheKey) -> Result<()> {
        self.write()?.remove(key);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.write()?.clear();
        Ok(())
    }
}
