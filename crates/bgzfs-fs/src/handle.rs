//! Per-open file handles and their lifecycle.

use bgzfs_format::BgzfReader;
use std::collections::HashMap;
use std::fs::File;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// An open file, owned by one request lifecycle at a time. Dropping the
/// handle closes the underlying descriptor or stream.
pub enum FileHandle {
    /// Raw descriptor served directly from the underlying store.
    Passthrough(File),
    /// Indexed compressed stream, decoded on each read.
    Virtual(BgzfReader<File>),
}

/// Issues handle ids and maps them to live handles.
///
/// The table lock covers only insertion, lookup and removal; I/O happens
/// under the per-handle mutex, so distinct handles operate concurrently.
/// The dispatcher contract says no concurrent calls hit one handle, which
/// makes that inner mutex uncontended in practice.
pub struct HandleTable {
    next_id: AtomicU64,
    handles: Mutex<HashMap<u64, Arc<Mutex<FileHandle>>>>,
}

impl HandleTable {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            handles: Mutex::new(HashMap::new()),
        }
    }

    /// Register a handle and return its id.
    pub fn insert(&self, handle: FileHandle) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.handles
            .lock()
            .expect("handle table lock poisoned")
            .insert(id, Arc::new(Mutex::new(handle)));
        id
    }

    /// Look up a live handle by id.
    pub fn get(&self, id: u64) -> Option<Arc<Mutex<FileHandle>>> {
        self.handles
            .lock()
            .expect("handle table lock poisoned")
            .get(&id)
            .cloned()
    }

    /// Remove a handle by id; the returned value closes on drop. Returns
    /// `None` when the id was never issued or was already released.
    pub fn remove(&self, id: u64) -> Option<Arc<Mutex<FileHandle>>> {
        self.handles
            .lock()
            .expect("handle table lock poisoned")
            .remove(&id)
    }

    pub fn len(&self) -> usize {
        self.handles
            .lock()
            .expect("handle table lock poisoned")
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for HandleTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempfile;

    #[test]
    fn ids_are_unique_and_removal_is_single_shot() {
        let table = HandleTable::new();
        let a = table.insert(FileHandle::Passthrough(tempfile().unwrap()));
        let b = table.insert(FileHandle::Passthrough(tempfile().unwrap()));
        assert_ne!(a, b);
        assert_eq!(table.len(), 2);

        assert!(table.remove(a).is_some());
        assert!(table.remove(a).is_none());
        assert!(table.get(a).is_none());
        assert!(table.get(b).is_some());

        assert!(table.remove(b).is_some());
        assert!(table.is_empty());
    }
}
