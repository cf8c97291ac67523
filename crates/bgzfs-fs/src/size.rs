//! Uncompressed-length resolution for virtual files.

use crate::cache::SizeCache;
use crate::classify::{GZ_SUFFIX, INDEX_SUFFIX};
use crate::error::Result;
use crate::store::Store;
use bgzfs_format::{BgzfReader, GziIndex};
use log::{debug, trace, warn};
use std::io::Read;
use std::sync::Arc;

/// Buffer size for the forward scan past the last index checkpoint.
const SCAN_BUF_SIZE: usize = 4096;

/// Computes the exact uncompressed length of a virtual file.
///
/// The compressed file only has to be decoded from its final index
/// checkpoint to the end of stream, so the cost is bounded by the size of
/// the unindexed tail rather than by the size of the file.
pub struct SizeResolver {
    store: Arc<Store>,
    cache: SizeCache,
}

impl SizeResolver {
    pub fn new(store: Arc<Store>, cache: SizeCache) -> Self {
        Self { store, cache }
    }

    /// Resolve the uncompressed length for `stem`, consulting the cache
    /// keyed by the compressed sibling's current byte size.
    ///
    /// Returns `None` when the length cannot be determined; the caller is
    /// expected to degrade rather than fail the whole query.
    pub fn resolve(&self, stem: &str) -> Option<u64> {
        let gz_path = format!("{}{}", stem, GZ_SUFFIX);
        let compressed_size = match self.store.metadata(&gz_path) {
            Ok(md) => md.len(),
            Err(e) => {
                debug!("resolve [{}]: cannot stat compressed member: {}", stem, e);
                return None;
            }
        };

        if let Some(hit) = self.cache.get(stem, compressed_size) {
            return Some(hit);
        }

        trace!(
            "resolve slow path [{}] compressed_size={}",
            stem,
            compressed_size
        );
        match self.scan(stem, &gz_path) {
            Ok(size) => {
                debug!("resolve [{}] = {}", stem, size);
                self.cache.insert(stem, compressed_size, size);
                Some(size)
            }
            Err(e) => {
                warn!("resolve [{}]: size unknown: {}", stem, e);
                None
            }
        }
    }

    /// Seek to the final checkpoint and stream the unindexed tail,
    /// accumulating consumed bytes until end of stream.
    fn scan(&self, stem: &str, gz_path: &str) -> Result<u64> {
        let index_bytes = self.store.read(&format!("{}{}", stem, INDEX_SUFFIX))?;
        let index = GziIndex::from_bytes(&index_bytes)?;
        let start = index.last_uncompressed_offset();

        let file = self.store.open(gz_path)?;
        let mut reader = BgzfReader::new(file, index)?;
        let mut total = reader.seek_uncompressed(start)?;

        let mut buf = [0u8; SCAN_BUF_SIZE];
        loop {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break;
            }
            total += n as u64;
        }
        Ok(total)
    }
}
