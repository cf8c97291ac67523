//! Memoizing caches shared across overlay components.
//!
//! Both caches are created at mount time, injected into the components
//! that consult them, and keep entries for the process lifetime; there is
//! no eviction. Two callers racing to fill the same key is benign: the
//! value is a deterministic function of on-disk state observed at query
//! time, so the second store writes an equal value.

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::HashMap;
use std::fs;
use std::hash::Hash;
use std::path::PathBuf;
use std::sync::RwLock;

/// A concurrency-safe memoizing key-value map.
#[derive(Debug)]
pub struct MemoCache<K, V> {
    map: RwLock<HashMap<K, V>>,
}

impl<K: Eq + Hash + Clone, V: Clone> MemoCache<K, V> {
    pub fn new() -> Self {
        Self {
            map: RwLock::new(HashMap::new()),
        }
    }

    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.map
            .read()
            .expect("cache lock poisoned")
            .get(key)
            .cloned()
    }

    pub fn insert(&self, key: K, value: V) {
        self.map
            .write()
            .expect("cache lock poisoned")
            .insert(key, value);
    }

    pub fn len(&self) -> usize {
        self.map.read().expect("cache lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of all entries, in no particular order.
    pub fn entries(&self) -> Vec<(K, V)> {
        self.map
            .read()
            .expect("cache lock poisoned")
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

impl<K: Eq + Hash + Clone, V: Clone> Default for MemoCache<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

/// One persisted size-cache entry.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedSize {
    stem: String,
    compressed_size: u64,
    uncompressed_size: u64,
}

/// Cached uncompressed lengths, keyed by (stem, compressed byte size) so a
/// changed compressed file naturally invalidates its entry.
///
/// With a persistence path set, entries survive restarts: the file is read
/// once at construction and rewritten after each computed entry. All
/// persistence failures are logged and otherwise ignored; the cache keeps
/// working in memory.
#[derive(Debug)]
pub struct SizeCache {
    map: MemoCache<(String, u64), u64>,
    persist_path: Option<PathBuf>,
}

impl SizeCache {
    /// A purely in-memory size cache.
    pub fn new_in_memory() -> Self {
        Self {
            map: MemoCache::new(),
            persist_path: None,
        }
    }

    /// A size cache backed by a JSON file, pre-populated from it when the
    /// file already exists and parses.
    pub fn with_persistence<P: Into<PathBuf>>(path: P) -> Self {
        let path = path.into();
        let map = MemoCache::new();

        match fs::read(&path) {
            Ok(bytes) => match serde_json::from_slice::<Vec<PersistedSize>>(&bytes) {
                Ok(entries) => {
                    debug!(
                        "loaded {} size cache entries from {}",
                        entries.len(),
                        path.display()
                    );
                    for entry in entries {
                        map.insert(
                            (entry.stem, entry.compressed_size),
                            entry.uncompressed_size,
                        );
                    }
                }
                Err(e) => {
                    warn!("ignoring unreadable size cache {}: {}", path.display(), e);
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!("ignoring unreadable size cache {}: {}", path.display(), e);
            }
        }

        Self {
            map,
            persist_path: Some(path),
        }
    }

    pub fn get(&self, stem: &str, compressed_size: u64) -> Option<u64> {
        self.map.get(&(stem.to_string(), compressed_size))
    }

    pub fn insert(&self, stem: &str, compressed_size: u64, uncompressed_size: u64) {
        self.map
            .insert((stem.to_string(), compressed_size), uncompressed_size);
        self.persist();
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    fn persist(&self) {
        let Some(path) = &self.persist_path else {
            return;
        };

        let entries: Vec<PersistedSize> = self
            .map
            .entries()
            .into_iter()
            .map(|((stem, compressed_size), uncompressed_size)| PersistedSize {
                stem,
                compressed_size,
                uncompressed_size,
            })
            .collect();

        let result = serde_json::to_vec_pretty(&entries)
            .map_err(std::io::Error::other)
            .and_then(|bytes| {
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::write(path, bytes)
            });
        if let Err(e) = result {
            warn!("failed to persist size cache to {}: {}", path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn memo_cache_returns_inserted_values() {
        let cache: MemoCache<String, u32> = MemoCache::new();
        assert!(cache.get("k").is_none());

        cache.insert("k".to_string(), 7);
        assert_eq!(cache.get("k"), Some(7));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn size_cache_distinguishes_compressed_sizes() {
        let cache = SizeCache::new_in_memory();
        cache.insert("a.bin", 100, 1234);

        assert_eq!(cache.get("a.bin", 100), Some(1234));
        assert_eq!(cache.get("a.bin", 101), None);
    }

    #[test]
    fn size_cache_round_trips_through_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sizes.json");

        let cache = SizeCache::with_persistence(&path);
        cache.insert("data/a.bin", 100, 1234);
        cache.insert("b.bin", 50, 999);
        drop(cache);

        let reloaded = SizeCache::with_persistence(&path);
        assert_eq!(reloaded.get("data/a.bin", 100), Some(1234));
        assert_eq!(reloaded.get("b.bin", 50), Some(999));
        assert_eq!(reloaded.len(), 2);
    }

    #[test]
    fn corrupt_persistence_file_is_ignored() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sizes.json");
        fs::write(&path, b"not json").unwrap();

        let cache = SizeCache::with_persistence(&path);
        assert!(cache.is_empty());

        // Still usable, and the next insert repairs the file.
        cache.insert("a", 1, 2);
        let reloaded = SizeCache::with_persistence(&path);
        assert_eq!(reloaded.get("a", 1), Some(2));
    }
}
