//! Response cache
//!
//! A hybrid key/value cache: a bounded in-memory tier with pluggable eviction
//! in front of an optional on-disk tier. Values are JSON documents.

pub mod disk;
pub mod hybrid;
pub mod memory;

use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub use hybrid::{CacheOptions, CacheStats, HybridCache};

/// Memory eviction strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EvictionStrategy {
    /// Least recently used
    #[default]
    Lru,
    /// Least frequently used
    Lfu,
    /// Closest to expiry
    Ttl,
}

impl EvictionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvictionStrategy::Lru => "lru",
            EvictionStrategy::Lfu => "lfu",
            EvictionStrategy::Ttl => "ttl",
        }
    }
}

impl fmt::Display for EvictionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EvictionStrategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lru" => Ok(EvictionStrategy::Lru),
            "lfu" => Ok(EvictionStrategy::Lfu),
            "ttl" => Ok(EvictionStrategy::Ttl),
            _ => Err(ConfigError::UnknownEvictionStrategy {
                name: s.to_string(),
            }),
        }
    }
}

/// Wall-clock time in fractional seconds since the Unix epoch
pub(crate) fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_parse() {
        assert_eq!("LRU".parse::<EvictionStrategy>().unwrap(), EvictionStrategy::Lru);
        assert_eq!(" lfu ".parse::<EvictionStrategy>().unwrap(), EvictionStrategy::Lfu);
        assert_eq!("ttl".parse::<EvictionStrategy>().unwrap(), EvictionStrategy::Ttl);
        assert!("random".parse::<EvictionStrategy>().is_err());
    }

    #[test]
    fn test_strategy_display() {
        assert_eq!(EvictionStrategy::Lfu.to_string(), "lfu");
        assert_eq!(
            serde_json::to_value(EvictionStrategy::Ttl).unwrap(),
            serde_json::json!("ttl")
        );
    }
}
