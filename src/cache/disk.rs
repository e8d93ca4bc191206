//! On-disk cache tier
//!
//! One JSON file per key, named by the SHA-256 of the key. Writes go through a
//! temporary file and a rename so readers never see a partial entry.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use parking_lot::Mutex;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use super::now_secs;
use crate::error::{CacheError, Result};

const ENTRY_EXTENSION: &str = "json";

/// Disk usage is pruned down to this fraction of the limit
const PRUNE_TARGET_RATIO: f64 = 0.8;

/// A persisted cache entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiskEntry {
    pub key: String,
    pub value: Value,
    pub created_at: f64,
    pub expires_at: f64,
}

impl DiskEntry {
    pub fn is_expired(&self) -> bool {
        self.expires_at <= now_secs()
    }
}

/// Entry count and bytes currently on disk
#[derive(Debug, Default, Clone, Copy)]
struct Usage {
    entries: usize,
    bytes: u64,
}

/// On-disk store rooted at one directory.
///
/// Usage is counted once on open and then tracked per write and remove, so
/// the directory is only scanned again when the size limit is exceeded.
#[derive(Debug)]
pub struct DiskStore {
    dir: PathBuf,
    max_size: u64,
    usage: Mutex<Usage>,
}

impl DiskStore {
    /// Open (and create if needed) a disk store
    pub fn open(dir: impl Into<PathBuf>, max_size: u64) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;

        let files = entry_files(&dir);
        let usage = Usage {
            entries: files.len(),
            bytes: files.iter().map(|(_, size, _)| size).sum(),
        };
        tracing::debug!(
            "Opened disk cache at {} with {} entries",
            dir.display(),
            usage.entries
        );

        Ok(Self {
            dir,
            max_size,
            usage: Mutex::new(usage),
        })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let digest = Sha256::digest(key.as_bytes());
        self.dir
            .join(format!("{}.{}", hex::encode(digest), ENTRY_EXTENSION))
    }

    /// Read a live entry. Expired and corrupt files are deleted.
    pub fn read(&self, key: &str) -> Option<DiskEntry> {
        let path = self.path_for(key);
        let bytes = fs::read(&path).ok()?;

        match serde_json::from_slice::<DiskEntry>(&bytes) {
            Ok(entry) if entry.key != key => None,
            Ok(entry) if entry.is_expired() => {
                self.delete(&path);
                None
            }
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!("Discarding corrupt cache file {}: {}", path.display(), e);
                self.delete(&path);
                None
            }
        }
    }

    /// Persist an entry
    pub fn write(&self, key: &str, value: &Value, ttl: Duration) -> Result<()> {
        let now = now_secs();
        let entry = DiskEntry {
            key: key.to_string(),
            value: value.clone(),
            created_at: now,
            expires_at: now + ttl.as_secs_f64(),
        };

        let path = self.path_for(key);
        let tmp = path.with_extension("tmp");
        let bytes = serde_json::to_vec(&entry)?;

        if let Err(e) = fs::write(&tmp, &bytes) {
            let _ = fs::remove_file(&tmp);
            return Err(write_failed(&path, e));
        }

        let over_limit = {
            let mut usage = self.usage.lock();
            let replaced = fs::metadata(&path).ok().map(|m| m.len());
            if let Err(e) = fs::rename(&tmp, &path) {
                let _ = fs::remove_file(&tmp);
                return Err(write_failed(&path, e));
            }
            match replaced {
                Some(old) => usage.bytes = usage.bytes.saturating_sub(old),
                None => usage.entries += 1,
            }
            usage.bytes += bytes.len() as u64;
            usage.bytes > self.max_size
        };

        if over_limit {
            self.prune();
        }
        Ok(())
    }

    pub fn remove(&self, key: &str) -> bool {
        self.delete(&self.path_for(key))
    }

    /// Remove every entry whose stored key matches the pattern; returns the
    /// removed keys
    pub fn remove_matching(&self, pattern: &Regex) -> Vec<String> {
        entry_files(&self.dir)
            .into_iter()
            .filter_map(|(path, _, _)| {
                let entry = fs::read(&path)
                    .ok()
                    .and_then(|bytes| serde_json::from_slice::<DiskEntry>(&bytes).ok())?;
                (pattern.is_match(&entry.key) && self.delete(&path)).then_some(entry.key)
            })
            .collect()
    }

    pub fn clear(&self) {
        let mut usage = self.usage.lock();
        for (path, _, _) in entry_files(&self.dir) {
            let _ = fs::remove_file(path);
        }
        *usage = Usage::default();
    }

    /// Entry count and total bytes on disk
    pub fn usage(&self) -> (usize, u64) {
        let usage = self.usage.lock();
        (usage.entries, usage.bytes)
    }

    /// Remove the oldest files until usage drops below the prune target
    fn prune(&self) -> usize {
        let mut usage = self.usage.lock();
        let mut files = entry_files(&self.dir);
        usage.entries = files.len();
        usage.bytes = files.iter().map(|(_, size, _)| size).sum();
        if usage.bytes <= self.max_size {
            return 0;
        }

        files.sort_by_key(|(_, _, modified)| *modified);
        let target = (self.max_size as f64 * PRUNE_TARGET_RATIO) as u64;
        let mut removed = 0;

        for (path, size, _) in files {
            if usage.bytes < target {
                break;
            }
            if fs::remove_file(&path).is_ok() {
                usage.bytes = usage.bytes.saturating_sub(size);
                usage.entries = usage.entries.saturating_sub(1);
                removed += 1;
            }
        }

        tracing::info!(
            "Pruned {} cache files, disk cache now {:.2} MB",
            removed,
            usage.bytes as f64 / 1024.0 / 1024.0
        );
        removed
    }

    /// Delete one entry file and update usage
    fn delete(&self, path: &Path) -> bool {
        let mut usage = self.usage.lock();
        let size = fs::metadata(path).map(|m| m.len()).unwrap_or(0);
        if fs::remove_file(path).is_err() {
            return false;
        }
        usage.entries = usage.entries.saturating_sub(1);
        usage.bytes = usage.bytes.saturating_sub(size);
        true
    }
}

fn write_failed(path: &Path, e: std::io::Error) -> crate::error::PypiMcpError {
    CacheError::WriteFailed {
        path: path.display().to_string(),
        message: e.to_string(),
    }
    .into()
}

fn entry_files(dir: &Path) -> Vec<(PathBuf, u64, SystemTime)> {
    let Ok(read_dir) = fs::read_dir(dir) else {
        return Vec::new();
    };

    read_dir
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().extension().and_then(|e| e.to_str()) == Some(ENTRY_EXTENSION))
        .filter_map(|entry| {
            let meta = entry.metadata().ok()?;
            if !meta.is_file() {
                return None;
            }
            let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            Some((entry.path(), meta.len(), modified))
        })
        .collect()
}
