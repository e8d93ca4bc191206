//! In-memory cache tier
//!
//! Bounded map with LRU, LFU and TTL eviction. Not synchronized; the hybrid
//! cache owns it behind a lock.

use std::collections::HashMap;
use std::time::Duration;

use serde_json::Value;

use super::{now_secs, EvictionStrategy};

/// A single memory entry
#[derive(Debug, Clone)]
pub struct MemoryEntry {
    pub value: Value,
    pub expires_at: f64,
    /// Logical clock value of the last get or set
    pub last_access: u64,
    /// Hits since the last set
    pub access_count: u64,
}

impl MemoryEntry {
    fn is_expired(&self, now: f64) -> bool {
        self.expires_at <= now
    }
}

/// Outcome of a memory lookup
#[derive(Debug, PartialEq)]
pub enum Lookup {
    Hit(Value),
    Expired,
    Missing,
}

/// Bounded in-memory store
#[derive(Debug)]
pub struct MemoryStore {
    entries: HashMap<String, MemoryEntry>,
    max_entries: usize,
    strategy: EvictionStrategy,
    clock: u64,
}

impl MemoryStore {
    pub fn new(max_entries: usize, strategy: EvictionStrategy) -> Self {
        Self {
            entries: HashMap::new(),
            max_entries: max_entries.max(1),
            strategy,
            clock: 0,
        }
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    pub fn strategy(&self) -> EvictionStrategy {
        self.strategy
    }

    pub fn set_strategy(&mut self, strategy: EvictionStrategy) {
        self.strategy = strategy;
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Change the bound; evicts immediately if the store is over it.
    /// Returns the number of evicted entries.
    pub fn set_max_entries(&mut self, max_entries: usize) -> usize {
        self.max_entries = max_entries.max(1);
        let mut evicted = 0;
        while self.entries.len() > self.max_entries && self.evict_one() {
            evicted += 1;
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }

    /// Look up a key, updating recency and frequency on a hit
    pub fn get(&mut self, key: &str) -> Lookup {
        let now = now_secs();
        let expired = match self.entries.get(key) {
            None => return Lookup::Missing,
            Some(entry) => entry.is_expired(now),
        };

        if expired {
            self.entries.remove(key);
            return Lookup::Expired;
        }

        let tick = self.tick();
        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.last_access = tick;
                entry.access_count += 1;
                Lookup::Hit(entry.value.clone())
            }
            None => Lookup::Missing,
        }
    }

    /// Insert with an absolute expiry; returns the number of evicted entries
    pub fn insert_until(&mut self, key: &str, value: Value, expires_at: f64) -> usize {
        let tick = self.tick();
        self.entries.insert(
            key.to_string(),
            MemoryEntry {
                value,
                expires_at,
                last_access: tick,
                access_count: 1,
            },
        );

        let mut evicted = 0;
        while self.entries.len() > self.max_entries && self.evict_one() {
            evicted += 1;
        }
        evicted
    }

    /// Insert with a relative TTL; returns the number of evicted entries
    pub fn insert(&mut self, key: &str, value: Value, ttl: Duration) -> usize {
        self.insert_until(key, value, now_secs() + ttl.as_secs_f64())
    }

    pub fn remove(&mut self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn retain<F>(&mut self, mut keep: F) -> usize
    where
        F: FnMut(&str) -> bool,
    {
        let before = self.entries.len();
        self.entries.retain(|key, _| keep(key));
        before - self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Evict a single entry. Expired entries go first, then the strategy's victim.
    fn evict_one(&mut self) -> bool {
        let now = now_secs();

        let expired = self
            .entries
            .iter()
            .filter(|(_, e)| e.is_expired(now))
            .min_by(|a, b| a.1.expires_at.total_cmp(&b.1.expires_at))
            .map(|(k, _)| k.clone());

        let victim = expired.or_else(|| match self.strategy {
            EvictionStrategy::Lru => self.least_recent(),
            EvictionStrategy::Lfu => self
                .entries
                .iter()
                .min_by_key(|(_, e)| (e.access_count, e.last_access))
                .map(|(k, _)| k.clone()),
            EvictionStrategy::Ttl => self
                .entries
                .iter()
                .min_by(|a, b| a.1.expires_at.total_cmp(&b.1.expires_at))
                .map(|(k, _)| k.clone())
                .or_else(|| self.least_recent()),
        });

        match victim {
            Some(key) => {
                tracing::trace!(key = %key, strategy = %self.strategy, "evicting memory cache entry");
                self.entries.remove(&key);
                true
            }
            None => false,
        }
    }

    fn least_recent(&self) -> Option<String> {
        self.entries
            .iter()
            .min_by_key(|(_, e)| e.last_access)
            .map(|(k, _)| k.clone())
    }
}
