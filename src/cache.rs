//! In-process key/value cache with per-entry expiry.
//!
//! The cache never propagates its own failures: a poisoned lock is logged and
//! treated as a miss (reads) or a no-op (writes), so callers always fall back
//! to fetching fresh data.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// TTL applied by [`Cache::set`] unless the cache was built with another one.
pub const DEFAULT_TTL: Duration = Duration::from_secs(3_600);

/// Internal cache failure. Never returned to callers; only logged.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache lock poisoned by a panicking writer")]
    Poisoned,
}

enum Lookup<V> {
    Hit(V),
    Miss,
    Expired,
}

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    created_at: Instant,
    expires_at: Instant,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now > self.expires_at
    }
}

/// Snapshot of cache occupancy, computed under a single lock.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CacheStats {
    pub total_entries: usize,
    pub expired_entries: usize,
    pub valid_entries: usize,
    /// Mean age of every physically present entry, rounded to 2 decimals.
    pub average_age_seconds: f64,
}

/// Thread-safe TTL cache keyed by string.
///
/// Values are cloned out on [`get`](Cache::get); store `Arc`s for large values.
#[derive(Debug)]
pub struct Cache<V> {
    entries: Mutex<HashMap<String, CacheEntry<V>>>,
    default_ttl: Duration,
}

impl<V: Clone> Default for Cache<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone> Cache<V> {
    pub fn new() -> Self {
        Self::with_default_ttl(DEFAULT_TTL)
    }

    pub fn with_default_ttl(default_ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            default_ttl,
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    fn entries(&self) -> Result<MutexGuard<'_, HashMap<String, CacheEntry<V>>>, CacheError> {
        self.entries.lock().map_err(|_| CacheError::Poisoned)
    }

    /// Store `value` under `key` with the default TTL, replacing any previous
    /// entry.
    pub fn set(&self, key: impl Into<String>, value: V) {
        self.set_with_ttl(key, value, self.default_ttl);
    }

    pub fn set_with_ttl(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let key = key.into();
        let now = Instant::now();
        // Saturate absurd TTLs instead of overflowing Instant.
        let expires_at = now
            .checked_add(ttl)
            .unwrap_or_else(|| now + Duration::from_secs(10 * 365 * 24 * 3_600));
        let stored = self.entries().map(|mut entries| {
            entries.insert(
                key.clone(),
                CacheEntry {
                    value,
                    created_at: now,
                    expires_at,
                },
            );
        });
        match stored {
            Ok(()) => debug!(%key, ttl_secs = ttl.as_secs(), "Cached value"),
            Err(e) => error!(%key, error = %e, "Cache set failed"),
        }
    }

    /// Return the value under `key` if present and not expired. An expired
    /// entry is removed on the way out.
    pub fn get(&self, key: &str) -> Option<V> {
        let lookup = self.entries().map(|mut entries| {
            let now = Instant::now();
            match entries.get(key) {
                Some(entry) if !entry.is_expired(now) => return Lookup::Hit(entry.value.clone()),
                Some(_) => {}
                None => return Lookup::Miss,
            }
            entries.remove(key);
            Lookup::Expired
        });
        // the lock is released before anything is logged
        match lookup {
            Ok(Lookup::Hit(value)) => {
                debug!(%key, "Cache hit");
                Some(value)
            }
            Ok(Lookup::Miss) => {
                debug!(%key, "Cache miss");
                None
            }
            Ok(Lookup::Expired) => {
                debug!(%key, "Cache entry expired");
                None
            }
            Err(e) => {
                error!(%key, error = %e, "Cache get failed; treating as miss");
                None
            }
        }
    }

    /// Same as `get(key).is_some()` without cloning the value.
    pub fn exists(&self, key: &str) -> bool {
        let mut entries = match self.entries() {
            Ok(entries) => entries,
            Err(e) => {
                error!(%key, error = %e, "Cache exists check failed; treating as miss");
                return false;
            }
        };
        let now = Instant::now();
        match entries.get(key).map(|entry| entry.is_expired(now)) {
            Some(false) => true,
            Some(true) => {
                entries.remove(key);
                false
            }
            None => false,
        }
    }

    /// Remove `key`. Returns whether an entry was present.
    pub fn delete(&self, key: &str) -> bool {
        match self.entries() {
            Ok(mut entries) => entries.remove(key).is_some(),
            Err(e) => {
                error!(%key, error = %e, "Cache delete failed");
                false
            }
        }
    }

    pub fn clear(&self) {
        let cleared = self.entries().map(|mut entries| {
            let count = entries.len();
            entries.clear();
            count
        });
        match cleared {
            Ok(count) => info!(count, "Cache cleared"),
            Err(e) => error!(error = %e, "Cache clear failed"),
        }
    }

    /// Drop every expired entry and return how many were removed.
    pub fn clear_expired(&self) -> usize {
        let swept = self.entries().map(|mut entries| {
            let now = Instant::now();
            let before = entries.len();
            entries.retain(|_, entry| !entry.is_expired(now));
            before - entries.len()
        });
        match swept {
            Ok(removed) => {
                if removed > 0 {
                    debug!(removed, "Removed expired cache entries");
                }
                removed
            }
            Err(e) => {
                error!(error = %e, "Cache sweep failed");
                0
            }
        }
    }

    /// Whole seconds of life left for `key`; `None` if missing or expired.
    pub fn ttl(&self, key: &str) -> Option<u64> {
        let entries = match self.entries() {
            Ok(entries) => entries,
            Err(e) => {
                error!(%key, error = %e, "Cache ttl lookup failed");
                return None;
            }
        };
        let now = Instant::now();
        entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.expires_at.saturating_duration_since(now).as_secs())
    }

    pub fn stats(&self) -> CacheStats {
        let entries = match self.entries() {
            Ok(entries) => entries,
            Err(e) => {
                error!(error = %e, "Cache stats failed");
                return CacheStats {
                    total_entries: 0,
                    expired_entries: 0,
                    valid_entries: 0,
                    average_age_seconds: 0.0,
                };
            }
        };
        let now = Instant::now();
        let total_entries = entries.len();
        let expired_entries = entries.values().filter(|e| e.is_expired(now)).count();
        let average_age_seconds = if total_entries == 0 {
            0.0
        } else {
            let total_age: f64 = entries
                .values()
                .map(|e| now.saturating_duration_since(e.created_at).as_secs_f64())
                .sum();
            (total_age / total_entries as f64 * 100.0).round() / 100.0
        };
        CacheStats {
            total_entries,
            expired_entries,
            valid_entries: total_entries - expired_entries,
            average_age_seconds,
        }
    }
}

/// Run [`Cache::clear_expired`] every `every` on a background task.
///
/// The first sweep happens one full interval after spawning. Abort the
/// returned handle to stop sweeping. Panics if `every` is zero.
pub fn spawn_sweeper<V>(cache: Arc<Cache<V>>, every: Duration) -> JoinHandle<()>
where
    V: Clone + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = cache.clear_expired();
            info!(removed, "Cache sweep finished");
        }
    })
}
