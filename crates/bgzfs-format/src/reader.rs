use crate::index::{GziIndex, IndexRecord};
use flate2::read::MultiGzDecoder;
use log::trace;
use std::io::{self, BufReader, Read, Seek, SeekFrom};

/// Buffer size for discarding bytes while repositioning inside a member.
const SKIP_BUF_SIZE: usize = 4096;

/// Random-access reader over a BGZF-style stream of concatenated gzip
/// members, positioned by uncompressed offset via a [`GziIndex`].
///
/// A seek resumes decoding at the latest checkpoint at or before the target
/// offset and discards the partial member in front of it, so repositioning
/// cost is bounded by member size rather than by the absolute offset.
pub struct BgzfReader<R: Read + Seek> {
    // Vacated only while restarting at a checkpoint, and restored before
    // restart_at returns.
    decoder: Option<MultiGzDecoder<BufReader<R>>>,
    index: GziIndex,
    pos: u64,
    // Set when positioned at or past the end of the compressed stream,
    // where the decoder has no member header left to parse.
    exhausted: bool,
}

impl<R: Read + Seek> BgzfReader<R> {
    /// Create a reader over `inner` using a pre-loaded seek index.
    pub fn new(mut inner: R, index: GziIndex) -> io::Result<Self> {
        let compressed_len = inner.seek(SeekFrom::End(0))?;
        inner.seek(SeekFrom::Start(0))?;
        Ok(Self {
            decoder: Some(MultiGzDecoder::new(BufReader::new(inner))),
            index,
            pos: 0,
            exhausted: compressed_len == 0,
        })
    }

    /// The seek index this reader was opened with.
    pub fn index(&self) -> &GziIndex {
        &self.index
    }

    /// Current logical (uncompressed) position.
    pub fn position(&self) -> u64 {
        self.pos
    }

    /// Reposition to an uncompressed offset.
    ///
    /// Returns the position actually reached: a target past the end of the
    /// stream clamps to the stream length, and subsequent reads return 0.
    pub fn seek_uncompressed(&mut self, offset: u64) -> io::Result<u64> {
        if offset == self.pos {
            return Ok(self.pos);
        }

        let checkpoint = self.index.checkpoint_at(offset);
        trace!(
            "seek_uncompressed(offset={}) pos={} checkpoint=({}, {})",
            offset,
            self.pos,
            checkpoint.compressed,
            checkpoint.uncompressed
        );

        // Already decoding inside the right stretch: skip forward in place
        // instead of rewinding to the checkpoint.
        if !(offset >= self.pos && self.pos >= checkpoint.uncompressed) {
            self.restart_at(checkpoint)?;
        }
        self.skip(offset - self.pos)?;
        Ok(self.pos)
    }

    fn restart_at(&mut self, checkpoint: IndexRecord) -> io::Result<()> {
        let mut inner = match self.decoder.take() {
            Some(decoder) => decoder.into_inner().into_inner(),
            None => return Err(io::Error::other("decoder state lost")),
        };
        let seeked = inner
            .seek(SeekFrom::End(0))
            .and_then(|len| inner.seek(SeekFrom::Start(checkpoint.compressed)).map(|_| len));
        self.decoder = Some(MultiGzDecoder::new(BufReader::new(inner)));
        let compressed_len = seeked?;
        self.exhausted = checkpoint.compressed >= compressed_len;
        self.pos = checkpoint.uncompressed;
        Ok(())
    }

    /// Decode and discard `count` bytes, stopping early at end of stream.
    fn skip(&mut self, count: u64) -> io::Result<()> {
        let mut remaining = count;
        let mut buf = [0u8; SKIP_BUF_SIZE];
        while remaining > 0 {
            let want = remaining.min(SKIP_BUF_SIZE as u64) as usize;
            let n = self.read(&mut buf[..want])?;
            if n == 0 {
                break;
            }
            remaining -= n as u64;
        }
        Ok(())
    }
}

impl<R: Read + Seek> Read for BgzfReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.exhausted {
            return Ok(0);
        }
        let decoder = match self.decoder.as_mut() {
            Some(decoder) => decoder,
            None => return Err(io::Error::other("decoder state lost")),
        };
        let n = decoder.read(buf)?;
        self.pos += n as u64;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::{Cursor, Write};

    /// Compress each chunk into its own gzip member and build the matching
    /// checkpoint index, one record per member boundary.
    fn build_bgzf(chunks: &[&[u8]]) -> (Vec<u8>, GziIndex) {
        let mut data = Vec::new();
        let mut records = vec![IndexRecord {
            compressed: 0,
            uncompressed: 0,
        }];
        let mut upos = 0u64;
        for chunk in chunks {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(chunk).unwrap();
            data.extend_from_slice(&encoder.finish().unwrap());
            upos += chunk.len() as u64;
            records.push(IndexRecord {
                compressed: data.len() as u64,
                uncompressed: upos,
            });
        }
        (data, GziIndex::from_records(records).unwrap())
    }

    fn payload() -> (Vec<u8>, Vec<u8>, GziIndex) {
        let a: Vec<u8> = (0..5000u32).map(|i| (i % 251) as u8).collect();
        let b: Vec<u8> = (0..3000u32).map(|i| (i % 13) as u8).collect();
        let c = b"tail bytes past the last full block".to_vec();
        let (data, index) = build_bgzf(&[&a, &b, &c]);
        let mut plain = a;
        plain.extend_from_slice(&b);
        plain.extend_from_slice(&c);
        (data, plain, index)
    }

    #[test]
    fn sequential_read_decodes_all_members() {
        let (data, plain, index) = payload();
        let mut reader = BgzfReader::new(Cursor::new(data), index).unwrap();

        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, plain);
        assert_eq!(reader.position(), plain.len() as u64);
    }

    #[test]
    fn seek_into_middle_member_reads_across_boundary() {
        let (data, plain, index) = payload();
        let mut reader = BgzfReader::new(Cursor::new(data), index).unwrap();

        // Starts inside the second member, spans into the third.
        let offset = 6000u64;
        reader.seek_uncompressed(offset).unwrap();
        let mut out = vec![0u8; 2500];
        reader.read_exact(&mut out).unwrap();
        assert_eq!(out, plain[6000..8500]);
    }

    #[test]
    fn seek_backwards_rewinds_to_checkpoint() {
        let (data, plain, index) = payload();
        let mut reader = BgzfReader::new(Cursor::new(data), index).unwrap();

        reader.seek_uncompressed(7000).unwrap();
        reader.seek_uncompressed(100).unwrap();
        let mut out = vec![0u8; 64];
        reader.read_exact(&mut out).unwrap();
        assert_eq!(out, plain[100..164]);
    }

    #[test]
    fn short_forward_seek_skips_in_place() {
        let (data, plain, index) = payload();
        let mut reader = BgzfReader::new(Cursor::new(data), index).unwrap();

        let mut out = vec![0u8; 10];
        reader.read_exact(&mut out).unwrap();
        reader.seek_uncompressed(200).unwrap();
        reader.read_exact(&mut out).unwrap();
        assert_eq!(out, plain[200..210]);
    }

    #[test]
    fn seek_past_end_clamps_and_reads_return_zero() {
        let (data, plain, index) = payload();
        let mut reader = BgzfReader::new(Cursor::new(data), index).unwrap();

        let reached = reader
            .seek_uncompressed(plain.len() as u64 + 10_000)
            .unwrap();
        assert_eq!(reached, plain.len() as u64);

        let mut buf = [0u8; 16];
        assert_eq!(reader.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn empty_stream_reads_zero_bytes() {
        let index = GziIndex::from_records(vec![IndexRecord {
            compressed: 0,
            uncompressed: 0,
        }])
        .unwrap();
        let mut reader = BgzfReader::new(Cursor::new(Vec::new()), index).unwrap();

        let mut buf = [0u8; 8];
        assert_eq!(reader.read(&mut buf).unwrap(), 0);
        assert_eq!(reader.seek_uncompressed(100).unwrap(), 0);
    }

    #[test]
    fn two_readers_over_same_bytes_agree() {
        let (data, plain, index) = payload();
        let mut r1 = BgzfReader::new(Cursor::new(data.clone()), index.clone()).unwrap();
        let mut r2 = BgzfReader::new(Cursor::new(data), index).unwrap();

        r1.seek_uncompressed(4500).unwrap();
        r2.seek_uncompressed(4500).unwrap();
        let mut b1 = vec![0u8; 1000];
        let mut b2 = vec![0u8; 1000];
        r1.read_exact(&mut b1).unwrap();
        r2.read_exact(&mut b2).unwrap();
        assert_eq!(b1, b2);
        assert_eq!(b1, plain[4500..5500]);
    }
}
