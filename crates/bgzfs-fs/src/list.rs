//! Directory listing with virtual-triple rewriting.

use crate::classify::{Classification, Classifier, INDEX_SUFFIX};
use crate::overlay::EntryKind;
use log::trace;
use std::ffi::OsString;
use std::fs;
use std::io;

/// One logical entry produced by an overlay directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlayDirEntry {
    /// Exposed name: the raw store name, or the stem of a virtual triple.
    pub name: OsString,
    /// Kind hint taken from the raw entry; virtual entries are files.
    pub kind: EntryKind,
}

/// Lazy iterator over one directory pass.
///
/// Raw entries come out in store-native order. Each recognized virtual
/// triple yields exactly one entry, carried by its index member with the
/// suffix stripped; the compressed member of the same triple is
/// suppressed. Passthrough entries come through unchanged, so the
/// ambiguous all-three-exist case lists all three raw names.
pub struct OverlayReadDir<'a> {
    classifier: &'a Classifier,
    dir_path: String,
    inner: fs::ReadDir,
}

impl<'a> OverlayReadDir<'a> {
    pub(crate) fn new(classifier: &'a Classifier, dir_path: String, inner: fs::ReadDir) -> Self {
        Self {
            classifier,
            dir_path,
            inner,
        }
    }
}

impl Iterator for OverlayReadDir<'_> {
    type Item = io::Result<OverlayDirEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = match self.inner.next()? {
                Ok(entry) => entry,
                Err(e) => return Some(Err(e)),
            };

            let raw_name = entry.file_name();
            let kind = entry
                .file_type()
                .map(EntryKind::from)
                .unwrap_or(EntryKind::Other);

            // Names that are not valid UTF-8 can never match a suffix rule;
            // they pass through untouched.
            let Some(name) = raw_name.to_str() else {
                return Some(Ok(OverlayDirEntry {
                    name: raw_name,
                    kind,
                }));
            };

            let full_path = if self.dir_path.is_empty() {
                name.to_string()
            } else {
                format!("{}/{}", self.dir_path, name)
            };

            if self.classifier.classify(&full_path) == Classification::Virtual {
                if let Some(stripped) = name.strip_suffix(INDEX_SUFFIX) {
                    trace!("list [{}]: exposing {} as {}", self.dir_path, name, stripped);
                    return Some(Ok(OverlayDirEntry {
                        name: OsString::from(stripped),
                        kind: EntryKind::File,
                    }));
                }
                // The compressed member of the triple; its index sibling
                // carries the exposed name.
                continue;
            }

            return Some(Ok(OverlayDirEntry {
                name: raw_name,
                kind,
            }));
        }
    }
}
