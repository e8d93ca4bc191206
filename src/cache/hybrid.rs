//! Hybrid (memory + disk) cache
//!
//! Reads check memory first and fall back to disk, promoting disk hits into
//! memory. Writes go to both tiers. Memory evictions leave the disk copy in place.

use std::collections::HashSet;
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use parking_lot::Mutex;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;

use super::disk::DiskStore;
use super::memory::{Lookup, MemoryStore};
use super::EvictionStrategy;
use crate::config::Config;
use crate::error::{CacheError, Result};

/// Construction options for [`HybridCache`]
#[derive(Debug, Clone)]
pub struct CacheOptions {
    /// Disk tier directory; `None` keeps the cache memory-only
    pub dir: Option<PathBuf>,
    pub ttl: Duration,
    pub max_size: u64,
    pub memory_max_entries: usize,
    pub eviction_strategy: EvictionStrategy,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            dir: None,
            ttl: Duration::from_secs(crate::config::defaults::CACHE_TTL_SECS),
            max_size: crate::config::defaults::CACHE_MAX_SIZE,
            memory_max_entries: crate::config::defaults::MEMORY_CACHE_SIZE,
            eviction_strategy: EvictionStrategy::Lru,
        }
    }
}

impl From<&Config> for CacheOptions {
    fn from(config: &Config) -> Self {
        Self {
            dir: config.disk_cache.then(|| config.cache_dir.clone()),
            ttl: config.cache_ttl,
            max_size: config.cache_max_size,
            memory_max_entries: config.memory_cache_size,
            eviction_strategy: config.eviction_strategy,
        }
    }
}

#[derive(Debug, Default, Clone)]
struct Metrics {
    memory_hits: u64,
    memory_misses: u64,
    disk_hits: u64,
    disk_misses: u64,
    sets: u64,
    invalidations: u64,
    evictions: u64,
}

/// Snapshot of cache statistics
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub memory_hits: u64,
    pub memory_misses: u64,
    pub disk_hits: u64,
    pub disk_misses: u64,
    pub sets: u64,
    pub invalidations: u64,
    pub evictions: u64,
    pub memory_entries: usize,
    pub memory_max_entries: usize,
    pub disk_enabled: bool,
    pub disk_entries: usize,
    pub disk_size_bytes: u64,
    pub eviction_strategy: EvictionStrategy,
    pub memory_hit_ratio: f64,
    pub disk_hit_ratio: f64,
    pub overall_hit_ratio: f64,
}

struct Inner {
    memory: MemoryStore,
    metrics: Metrics,
}

/// Thread-safe hybrid cache
pub struct HybridCache {
    inner: Mutex<Inner>,
    disk: Option<DiskStore>,
    ttl: Duration,
}

impl HybridCache {
    /// Create a cache; the disk tier is opened if a directory is given
    pub fn new(options: CacheOptions) -> Result<Self> {
        let disk = match &options.dir {
            Some(dir) => Some(DiskStore::open(dir, options.max_size)?),
            None => None,
        };

        Ok(Self {
            inner: Mutex::new(Inner {
                memory: MemoryStore::new(options.memory_max_entries, options.eviction_strategy),
                metrics: Metrics::default(),
            }),
            disk,
            ttl: options.ttl,
        })
    }

    /// Memory-only cache with default bounds
    pub fn in_memory(ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                memory: MemoryStore::new(
                    crate::config::defaults::MEMORY_CACHE_SIZE,
                    EvictionStrategy::Lru,
                ),
                metrics: Metrics::default(),
            }),
            disk: None,
            ttl,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(CacheOptions::from(config))
    }

    pub fn default_ttl(&self) -> Duration {
        self.ttl
    }

    pub fn set_eviction_strategy(&self, strategy: EvictionStrategy) {
        self.inner.lock().memory.set_strategy(strategy);
    }

    pub fn set_memory_max_entries(&self, max_entries: usize) {
        let mut inner = self.inner.lock();
        let evicted = inner.memory.set_max_entries(max_entries);
        inner.metrics.evictions += evicted as u64;
    }

    /// True if the key currently lives in the memory tier
    pub fn in_memory_tier(&self, key: &str) -> bool {
        self.inner.lock().memory.contains(key)
    }

    /// Drop a key from memory only, leaving the disk copy
    pub fn evict_from_memory(&self, key: &str) -> bool {
        self.inner.lock().memory.remove(key)
    }

    /// Retrieve a value
    pub fn get(&self, key: &str) -> Option<Value> {
        {
            let mut inner = self.inner.lock();
            if let Lookup::Hit(value) = inner.memory.get(key) {
                inner.metrics.memory_hits += 1;
                return Some(value);
            }
            inner.metrics.memory_misses += 1;
        }

        let disk = self.disk.as_ref()?;
        let found = disk.read(key);

        let mut inner = self.inner.lock();
        match found {
            Some(entry) => {
                inner.metrics.disk_hits += 1;
                let evicted = inner
                    .memory
                    .insert_until(key, entry.value.clone(), entry.expires_at);
                inner.metrics.evictions += evicted as u64;
                tracing::trace!(key, "disk cache hit promoted to memory");
                Some(entry.value)
            }
            None => {
                inner.metrics.disk_misses += 1;
                None
            }
        }
    }

    /// Store a value in both tiers. Returns false if the disk write failed.
    pub fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> bool {
        let ttl = ttl.unwrap_or(self.ttl);

        let stored = match &self.disk {
            Some(disk) => match disk.write(key, &value, ttl) {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!("Failed to cache data for {}: {}", key, e);
                    false
                }
            },
            None => true,
        };

        let mut inner = self.inner.lock();
        inner.metrics.sets += 1;
        let evicted = inner.memory.insert(key, value, ttl);
        inner.metrics.evictions += evicted as u64;
        stored
    }

    /// Remove one key from both tiers
    pub fn invalidate(&self, key: &str) -> bool {
        let in_memory = {
            let mut inner = self.inner.lock();
            inner.metrics.invalidations += 1;
            inner.memory.remove(key)
        };
        let on_disk = self.disk.as_ref().map(|d| d.remove(key)).unwrap_or(false);
        in_memory || on_disk
    }

    /// Remove every key matching a regular expression; returns the number of
    /// distinct keys removed from either tier
    pub fn invalidate_pattern(&self, pattern: &str) -> Result<usize> {
        let regex = Regex::new(pattern).map_err(|e| CacheError::InvalidPattern {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })?;

        let mut removed: HashSet<String> = {
            let mut inner = self.inner.lock();
            let keys: Vec<String> = inner
                .memory
                .keys()
                .filter(|k| regex.is_match(k))
                .cloned()
                .collect();
            for key in &keys {
                inner.memory.remove(key);
            }
            keys.into_iter().collect()
        };

        if let Some(disk) = &self.disk {
            removed.extend(disk.remove_matching(&regex));
        }

        self.inner.lock().metrics.invalidations += removed.len() as u64;
        Ok(removed.len())
    }

    /// Remove everything from both tiers
    pub fn clear(&self) {
        self.inner.lock().memory.clear();
        if let Some(disk) = &self.disk {
            disk.clear();
        }
        tracing::info!("Cache cleared");
    }

    /// Return the cached value, or run the producer and cache its result.
    /// Errors are returned uncached.
    pub async fn get_or_insert_with<F, Fut>(
        &self,
        key: &str,
        ttl: Option<Duration>,
        producer: F,
    ) -> Result<Value>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value>>,
    {
        if let Some(value) = self.get(key) {
            return Ok(value);
        }

        let value = producer().await?;
        self.set(key, value.clone(), ttl);
        Ok(value)
    }

    /// Statistics snapshot
    pub fn stats(&self) -> CacheStats {
        let (disk_entries, disk_size_bytes) =
            self.disk.as_ref().map(|d| d.usage()).unwrap_or((0, 0));
        let inner = self.inner.lock();
        let m = inner.metrics.clone();

        let ratio = |hits: u64, misses: u64| {
            let total = hits + misses;
            if total == 0 {
                0.0
            } else {
                hits as f64 / total as f64
            }
        };

        let lookups = m.memory_hits + m.memory_misses;
        let overall_hits = m.memory_hits + m.disk_hits;

        CacheStats {
            memory_hits: m.memory_hits,
            memory_misses: m.memory_misses,
            disk_hits: m.disk_hits,
            disk_misses: m.disk_misses,
            sets: m.sets,
            invalidations: m.invalidations,
            evictions: m.evictions,
            memory_entries: inner.memory.len(),
            memory_max_entries: inner.memory.max_entries(),
            disk_enabled: self.disk.is_some(),
            disk_entries,
            disk_size_bytes,
            eviction_strategy: inner.memory.strategy(),
            memory_hit_ratio: ratio(m.memory_hits, m.memory_misses),
            disk_hit_ratio: ratio(m.disk_hits, m.disk_misses),
            overall_hit_ratio: ratio(overall_hits, lookups.saturating_sub(overall_hits)),
        }
    }
}
