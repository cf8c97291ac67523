//! Per-path classification: virtual (synthesized) vs passthrough.
//!
//! A path `stem` is served virtually when `stem` itself is absent while
//! both `stem.gz` and `stem.gz.gzi` exist. Every other combination is
//! passthrough, including "nothing exists" (resolved later by the real
//! open or stat) and the ambiguous case where all three names exist.

use crate::cache::MemoCache;
use crate::store::Store;
use log::{trace, warn};
use std::io;
use std::sync::Arc;

/// Suffix of the compressed member of a virtual triple.
pub const GZ_SUFFIX: &str = ".gz";
/// Suffix of the index member relative to the compressed member.
pub const GZI_SUFFIX: &str = ".gzi";
/// Suffix of the index member relative to the stem.
pub const INDEX_SUFFIX: &str = ".gz.gzi";

/// How a path is served by the overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Synthesized from a compressed-plus-index pair.
    Virtual,
    /// Served unchanged from the underlying store.
    Passthrough,
}

/// Strip the virtual-triple suffixes from a path: a trailing `.gzi`, then
/// a trailing `.gz`, at most one of each, in that order.
pub fn stem(path: &str) -> &str {
    let path = path.strip_suffix(GZI_SUFFIX).unwrap_or(path);
    path.strip_suffix(GZ_SUFFIX).unwrap_or(path)
}

/// Decides whether a path denotes a virtual or a passthrough file.
///
/// Results are memoized per exact queried path for the process lifetime,
/// so the stem and both suffixed siblings of one triple hold independent
/// cache entries. A cache miss costs at most three existence probes.
pub struct Classifier {
    store: Arc<Store>,
    cache: MemoCache<String, Classification>,
}

impl Classifier {
    pub fn new(store: Arc<Store>) -> Self {
        Self {
            store,
            cache: MemoCache::new(),
        }
    }

    /// Classify a path, consulting and populating the cache.
    ///
    /// Probe failures never propagate: an underlying-store error makes the
    /// path passthrough, and the real open or stat surfaces the problem.
    pub fn classify(&self, path: &str) -> Classification {
        if let Some(hit) = self.cache.get(path) {
            return hit;
        }

        trace!("classify slow path [{}]", path);
        let classification = self.probe(path).unwrap_or_else(|e| {
            warn!("classify [{}]: probe failed, treating as passthrough: {}", path, e);
            Classification::Passthrough
        });
        self.cache.insert(path.to_string(), classification);
        classification
    }

    fn probe(&self, path: &str) -> io::Result<Classification> {
        let stem = stem(path);
        if self.store.exists(stem)? {
            return Ok(Classification::Passthrough);
        }
        if !self.store.exists(&format!("{}{}", stem, GZ_SUFFIX))? {
            return Ok(Classification::Passthrough);
        }
        if !self.store.exists(&format!("{}{}", stem, INDEX_SUFFIX))? {
            return Ok(Classification::Passthrough);
        }
        Ok(Classification::Virtual)
    }
}
