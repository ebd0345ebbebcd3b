use crate::error::{Result, SnapshotError};
use crate::format::{
    align_block_len, BlockTag, BLOCK_HEADER_LEN, HEADER_LEN, STATE_MAGIC, STATE_VERSION_V1,
};

/// Bounds-checked little-endian writer over a caller-provided state buffer.
pub struct BlockWriter<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> BlockWriter<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    fn reserve(&mut self, len: usize) -> Result<core::ops::Range<usize>> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.buf.len())
            .ok_or(SnapshotError::BufferTooSmall {
                needed: self.pos.saturating_add(len),
                available: self.buf.len(),
            })?;
        let range = self.pos..end;
        self.pos = end;
        Ok(range)
    }

    /// Leave `len` bytes in place, to be filled by a later writer.
    pub fn skip(&mut self, len: usize) -> Result<()> {
        self.reserve(len).map(|_| ())
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        let range = self.reserve(bytes.len())?;
        self.buf[range].copy_from_slice(bytes);
        Ok(())
    }

    pub fn write_u32_le(&mut self, v: u32) -> Result<()> {
        self.write_bytes(&v.to_le_bytes())
    }

    pub fn write_file_header(&mut self) -> Result<()> {
        self.write_bytes(STATE_MAGIC)?;
        self.write_bytes(&[STATE_VERSION_V1])
    }

    /// Write a block header and hand back the `len`-byte payload window. The padding that follows
    /// the payload is zeroed here so callers only ever fill the payload itself.
    pub fn begin_block(&mut self, tag: BlockTag, len: usize) -> Result<&mut [u8]> {
        let declared: u32 = len
            .try_into()
            .map_err(|_| SnapshotError::Corrupt("block length does not fit in u32"))?;
        self.write_bytes(&tag.0)?;
        self.write_u32_le(declared)?;

        let padded = self.reserve(align_block_len(len))?;
        let payload_end = padded.start + len;
        self.buf[payload_end..padded.end].fill(0);
        Ok(&mut self.buf[padded.start..payload_end])
    }

    pub fn write_terminator(&mut self) -> Result<()> {
        self.begin_block(BlockTag::END, 0).map(|_| ())
    }
}

/// One block located inside a blob. `offset` is the payload's offset from the blob start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block<'a> {
    pub tag: BlockTag,
    pub offset: usize,
    pub payload: &'a [u8],
}

/// Walks the blocks of a non-legacy blob, stopping at the terminator or the end of the buffer.
pub struct BlockReader<'a> {
    buf: &'a [u8],
    pos: usize,
    terminated: bool,
}

impl<'a> BlockReader<'a> {
    /// `buf` must start with the file header; the caller checks the magic.
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            pos: HEADER_LEN.min(buf.len()),
            terminated: false,
        }
    }

    /// Whether the walk stopped on an `END` block rather than the end of the buffer.
    pub fn terminated(&self) -> bool {
        self.terminated
    }

    fn read_u32_le(&self, at: usize) -> u32 {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(&self.buf[at..at + 4]);
        u32::from_le_bytes(raw)
    }

    pub fn next_block(&mut self) -> Result<Option<Block<'a>>> {
        if self.terminated || self.buf.len() - self.pos < BLOCK_HEADER_LEN {
            return Ok(None);
        }

        let mut tag = [0u8; 4];
        tag.copy_from_slice(&self.buf[self.pos..self.pos + 4]);
        let tag = BlockTag(tag);
        let len = self.read_u32_le(self.pos + 4) as usize;

        let start = self.pos + BLOCK_HEADER_LEN;
        let end = start
            .checked_add(len)
            .filter(|&end| end <= self.buf.len())
            .ok_or(SnapshotError::Corrupt("block length overruns buffer"))?;

        // The final block's padding may be missing from hand-trimmed files; tolerate that.
        self.pos = start.saturating_add(align_block_len(len)).min(self.buf.len());

        if tag == BlockTag::END {
            self.terminated = true;
            return Ok(None);
        }

        Ok(Some(Block {
            tag,
            offset: start,
            payload: &self.buf[start..end],
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_block_zeroes_padding_and_reports_short_buffers() {
        let mut buf = [0xffu8; 24];
        let mut w = BlockWriter::new(&mut buf);
        let payload = w.begin_block(BlockTag::MEM, 3).unwrap();
        payload.copy_from_slice(b"abc");
        assert_eq!(w.position(), 16);
        assert_eq!(&buf[..16], b"MEM \x03\0\0\0abc\0\0\0\0\0");

        let mut small = [0u8; 12];
        let err = BlockWriter::new(&mut small)
            .begin_block(BlockTag::MEM, 5)
            .unwrap_err();
        assert_eq!(
            err,
            SnapshotError::BufferTooSmall {
                needed: 16,
                available: 12
            }
        );
    }

    #[test]
    fn reader_rejects_overrunning_length() {
        let mut blob = Vec::new();
        blob.extend_from_slice(STATE_MAGIC);
        blob.push(STATE_VERSION_V1);
        blob.extend_from_slice(b"MEM ");
        blob.extend_from_slice(&64u32.to_le_bytes());
        blob.extend_from_slice(&[0u8; 8]);

        let mut r = BlockReader::new(&blob);
        assert_eq!(
            r.next_block().unwrap_err(),
            SnapshotError::Corrupt("block length overruns buffer")
        );
    }
}
