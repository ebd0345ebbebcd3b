//! State file streams. Writers can wrap the file in an LZ4 frame; readers detect the frame and
//! decode transparently. Lengths and cursors always count uncompressed bytes.
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use lz4_flex::frame::{FrameDecoder, FrameEncoder, FrameInfo};
use tracing::debug;

use crate::error::{Result, StateError};

/// LZ4 frame magic number, little-endian on disk.
const LZ4_FRAME_MAGIC: [u8; 4] = [0x04, 0x22, 0x4d, 0x18];
/// FLG bit announcing an 8-byte content size after the BD byte.
const LZ4_FLG_CONTENT_SIZE: u8 = 0x08;
/// Magic + FLG + BD + content size.
const LZ4_HEADER_WITH_SIZE_LEN: usize = 14;

/// Sibling path a save is staged in until it is complete.
pub fn staging_path(path: &Path) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

enum Sink {
    Raw(BufWriter<File>),
    Lz4(FrameEncoder<BufWriter<File>>),
}

impl Sink {
    fn finish(self) -> io::Result<File> {
        let buffered = match self {
            Sink::Raw(w) => w,
            Sink::Lz4(w) => w.finish().map_err(io::Error::other)?,
        };
        buffered.into_inner().map_err(|err| err.into_error())
    }
}

/// Writes a state file through its staging path. Dropping an uncommitted writer removes the
/// staging file, leaving the destination as it was.
pub struct StateWriter {
    sink: Option<Sink>,
    staging: PathBuf,
    path: PathBuf,
    committed: bool,
}

impl StateWriter {
    pub fn create(path: &Path, compress: bool, content_len: usize) -> Result<Self> {
        let staging = staging_path(path);
        let file = BufWriter::new(File::create(&staging)?);
        let sink = if compress {
            let info = FrameInfo::new()
                .content_size(Some(content_len as u64))
                .content_checksum(true);
            Sink::Lz4(FrameEncoder::with_frame_info(info, file))
        } else {
            Sink::Raw(file)
        };
        Ok(Self {
            sink: Some(sink),
            staging,
            path: path.to_path_buf(),
            committed: false,
        })
    }

    pub fn write_chunk(&mut self, chunk: &[u8]) -> Result<()> {
        let sink = self
            .sink
            .as_mut()
            .ok_or_else(|| io::Error::other("state writer already closed"))?;
        let res = match sink {
            Sink::Raw(w) => w.write_all(chunk),
            Sink::Lz4(w) => w.write_all(chunk),
        };
        res.map_err(|err| match err.kind() {
            io::ErrorKind::WriteZero => StateError::ShortTransfer {
                expected: chunk.len(),
                actual: 0,
            },
            _ => StateError::Io(err),
        })
    }

    /// Flush, sync and move the staging file over the destination.
    pub fn commit(mut self) -> Result<()> {
        let sink = self
            .sink
            .take()
            .ok_or_else(|| io::Error::other("state writer already closed"))?;
        let file = sink.finish()?;
        file.sync_all()?;
        drop(file);
        fs::rename(&self.staging, &self.path)?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for StateWriter {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        drop(self.sink.take());
        if let Err(err) = fs::remove_file(&self.staging) {
            if err.kind() != io::ErrorKind::NotFound {
                debug!(path = %self.staging.display(), %err, "failed to remove staged state file");
            }
        }
    }
}

enum Source {
    Raw(BufReader<File>),
    Lz4(FrameDecoder<BufReader<File>>),
}

/// Reads a state file, raw or LZ4-framed.
pub struct StateReader {
    source: Source,
    len: usize,
    consumed: usize,
    compressed: bool,
}

impl StateReader {
    pub fn open(path: &Path) -> Result<Self> {
        let mut file = File::open(path)?;
        let file_len = file.metadata()?.len();

        let mut head = Vec::with_capacity(LZ4_HEADER_WITH_SIZE_LEN);
        (&mut file)
            .take(LZ4_HEADER_WITH_SIZE_LEN as u64)
            .read_to_end(&mut head)?;
        file.seek(SeekFrom::Start(0))?;

        let (source, len, compressed) = match lz4_content_size(&head)? {
            Some(len) => (Source::Lz4(FrameDecoder::new(BufReader::new(file))), len, true),
            None => (Source::Raw(BufReader::new(file)), file_len, false),
        };
        let len = usize::try_from(len).map_err(|_| StateError::OutOfMemory { len: usize::MAX })?;
        Ok(Self {
            source,
            len,
            consumed: 0,
            compressed,
        })
    }

    /// Uncompressed length of the state.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_compressed(&self) -> bool {
        self.compressed
    }

    /// Fill `buf` completely or fail with [`StateError::ShortTransfer`]. The chunk that reaches the
    /// end of an LZ4 frame also checks the frame's end mark and content checksum.
    pub fn read_chunk(&mut self, buf: &mut [u8]) -> Result<()> {
        let mut filled = 0;
        while filled < buf.len() {
            let res = match &mut self.source {
                Source::Raw(r) => r.read(&mut buf[filled..]),
                Source::Lz4(r) => r.read(&mut buf[filled..]),
            };
            match res {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            }
        }
        if filled != buf.len() {
            return Err(StateError::ShortTransfer {
                expected: buf.len(),
                actual: filled,
            });
        }
        self.consumed += filled;
        if self.consumed == self.len {
            self.verify_end()?;
        }
        Ok(())
    }

    /// The decoder only validates the end mark and checksum once it is read past the content, and
    /// anything it yields there is surplus.
    fn verify_end(&mut self) -> Result<()> {
        let Source::Lz4(decoder) = &mut self.source else {
            return Ok(());
        };
        let mut extra = [0u8; 1];
        loop {
            match decoder.read(&mut extra) {
                Ok(0) => return Ok(()),
                Ok(_) => {
                    return Err(invalid_data(
                        "compressed state is longer than its recorded content size",
                    ))
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(io::Error::new(io::ErrorKind::InvalidData, err).into()),
            }
        }
    }
}

fn invalid_data(msg: &'static str) -> StateError {
    io::Error::new(io::ErrorKind::InvalidData, msg).into()
}

/// `Some(len)` for an LZ4 frame header, `None` for anything else.
fn lz4_content_size(head: &[u8]) -> Result<Option<u64>> {
    if head.len() < LZ4_FRAME_MAGIC.len() || head[..4] != LZ4_FRAME_MAGIC {
        return Ok(None);
    }
    if head.len() < LZ4_HEADER_WITH_SIZE_LEN || head[4] & LZ4_FLG_CONTENT_SIZE == 0 {
        return Err(invalid_data(
            "compressed state file does not record its content size",
        ));
    }
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&head[6..LZ4_HEADER_WITH_SIZE_LEN]);
    Ok(Some(u64::from_le_bytes(raw)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_file(path: &Path, data: &[u8], compress: bool) {
        let mut w = StateWriter::create(path, compress, data.len()).unwrap();
        for chunk in data.chunks(7) {
            w.write_chunk(chunk).unwrap();
        }
        w.commit().unwrap();
    }

    fn read_file(path: &Path) -> (Vec<u8>, bool) {
        let mut r = StateReader::open(path).unwrap();
        let mut buf = vec![0u8; r.len()];
        for chunk in buf.chunks_mut(5) {
            r.read_chunk(chunk).unwrap();
        }
        (buf, r.is_compressed())
    }

    #[test]
    fn compressed_files_report_uncompressed_length() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("game.state");
        let data: Vec<u8> = (0..300u32).map(|i| (i % 13) as u8).collect();

        write_file(&path, &data, true);
        assert_ne!(fs::read(&path).unwrap(), data);
        assert_eq!(read_file(&path), (data.clone(), true));

        write_file(&path, &data, false);
        assert_eq!(fs::read(&path).unwrap(), data);
        assert_eq!(read_file(&path), (data, false));
        assert!(!staging_path(&path).exists());
    }

    #[test]
    fn dropped_writer_leaves_destination_alone() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("game.state");
        fs::write(&path, b"previous").unwrap();

        let mut w = StateWriter::create(&path, false, 16).unwrap();
        w.write_chunk(b"half").unwrap();
        assert!(staging_path(&path).exists());
        drop(w);

        assert!(!staging_path(&path).exists());
        assert_eq!(fs::read(&path).unwrap(), b"previous");
    }

    fn read_all(path: &Path) -> Result<Vec<u8>> {
        let mut r = StateReader::open(path)?;
        let mut buf = vec![0u8; r.len()];
        for chunk in buf.chunks_mut(64) {
            r.read_chunk(chunk)?;
        }
        Ok(buf)
    }

    fn assert_invalid_data(res: Result<Vec<u8>>) {
        match res {
            Err(StateError::Io(err)) => assert_eq!(err.kind(), io::ErrorKind::InvalidData),
            other => panic!("expected invalid data, got {other:?}"),
        }
    }

    #[test]
    fn corrupted_checksum_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("game.state");
        let data: Vec<u8> = (0..2000u32).map(|i| (i / 9) as u8).collect();
        write_file(&path, &data, true);
        assert_eq!(read_all(&path).unwrap(), data);

        let mut raw = fs::read(&path).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0xff;
        fs::write(&path, &raw).unwrap();
        assert_invalid_data(read_all(&path));
    }

    #[test]
    fn bytes_after_the_frame_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("game.state");
        let data: Vec<u8> = (0..500u32).map(|i| (i % 3) as u8).collect();
        write_file(&path, &data, true);

        let mut raw = fs::read(&path).unwrap();
        raw.extend_from_slice(b"GARBAGE-TRAILING");
        fs::write(&path, &raw).unwrap();
        assert_invalid_data(read_all(&path));
    }

    #[test]
    fn truncated_file_is_a_short_transfer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("game.state");
        fs::write(&path, b"abc").unwrap();

        let mut r = StateReader::open(&path).unwrap();
        let mut buf = [0u8; 8];
        let err = r.read_chunk(&mut buf).unwrap_err();
        assert!(matches!(
            err,
            StateError::ShortTransfer {
                expected: 8,
                actual: 3
            }
        ));
    }
}
