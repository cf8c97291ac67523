use crate::error::{Error, Result};
use std::io::Read;

/// One checkpoint in a `.gzi` seek index: a compressed offset that starts
/// a gzip member, paired with the uncompressed offset it decodes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexRecord {
    /// Byte offset into the compressed stream.
    pub compressed: u64,
    /// Byte offset into the uncompressed data.
    pub uncompressed: u64,
}

/// A parsed `.gzi` seek index.
///
/// The on-disk layout is an 8-byte little-endian record count `N` followed
/// by `N + 1` fixed 16-byte records of (compressed offset, uncompressed
/// offset). Offsets are non-decreasing in both fields.
#[derive(Debug, Clone)]
pub struct GziIndex {
    records: Vec<IndexRecord>,
}

impl GziIndex {
    /// Parse an index from raw bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::from_reader(bytes)
    }

    /// Parse an index from a reader.
    pub fn from_reader<R: Read>(mut reader: R) -> Result<Self> {
        let count = read_u64(&mut reader)
            .map_err(|_| Error::Truncated("missing record count".to_string()))?;

        // count + 1 records follow; reject counts that cannot possibly fit
        // in memory before trying to allocate for them.
        if count >= u32::MAX as u64 {
            return Err(Error::Truncated(format!(
                "implausible record count {}",
                count
            )));
        }

        let mut records: Vec<IndexRecord> = Vec::with_capacity(count as usize + 1);
        for i in 0..=count {
            let compressed = read_u64(&mut reader)
                .map_err(|_| Error::Truncated(format!("record {} incomplete", i)))?;
            let uncompressed = read_u64(&mut reader)
                .map_err(|_| Error::Truncated(format!("record {} incomplete", i)))?;

            if let Some(prev) = records.last() {
                if compressed < prev.compressed || uncompressed < prev.uncompressed {
                    return Err(Error::NonMonotonic(i as usize));
                }
            }
            records.push(IndexRecord {
                compressed,
                uncompressed,
            });
        }

        Ok(Self { records })
    }

    /// Serialize the index back to its on-disk layout.
    pub fn to_bytes(&self) -> Vec<u8> {
        let count = self.records.len().saturating_sub(1) as u64;
        let mut out = Vec::with_capacity(8 + self.records.len() * 16);
        out.extend_from_slice(&count.to_le_bytes());
        for record in &self.records {
            out.extend_from_slice(&record.compressed.to_le_bytes());
            out.extend_from_slice(&record.uncompressed.to_le_bytes());
        }
        out
    }

    /// Build an index directly from checkpoint records.
    ///
    /// Records must be non-decreasing in both fields and non-empty.
    pub fn from_records(records: Vec<IndexRecord>) -> Result<Self> {
        if records.is_empty() {
            return Err(Error::Truncated("no records".to_string()));
        }
        for (i, pair) in records.windows(2).enumerate() {
            if pair[1].compressed < pair[0].compressed
                || pair[1].uncompressed < pair[0].uncompressed
            {
                return Err(Error::NonMonotonic(i + 1));
            }
        }
        Ok(Self { records })
    }

    /// All checkpoint records in offset order.
    pub fn records(&self) -> &[IndexRecord] {
        &self.records
    }

    /// Uncompressed offset of the final checkpoint.
    ///
    /// This is guaranteed to land on a member boundary the decoder can
    /// resume from, so scanning for the true end of the stream only has to
    /// decode the tail past the last checkpoint.
    pub fn last_uncompressed_offset(&self) -> u64 {
        self.records.last().map(|r| r.uncompressed).unwrap_or(0)
    }

    /// The latest checkpoint at or before `uncompressed_offset`.
    ///
    /// Falls back to the implicit start-of-stream checkpoint (0, 0) when the
    /// first record starts past the requested offset; offset 0 is always a
    /// valid member boundary.
    pub fn checkpoint_at(&self, uncompressed_offset: u64) -> IndexRecord {
        let pos = self
            .records
            .partition_point(|r| r.uncompressed <= uncompressed_offset);
        if pos == 0 {
            IndexRecord {
                compressed: 0,
                uncompressed: 0,
            }
        } else {
            self.records[pos - 1]
        }
    }
}

fn read_u64<R: Read>(reader: &mut R) -> std::io::Result<u64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}
