//! Versioned save-state container.
//!
//! A blob is the 8-byte header (`RASTATE` + version byte) followed by tagged blocks, each a 4CC,
//! a little-endian `u32` payload length and the payload zero-padded to 8 bytes. A zero-length
//! `END` block terminates the blob. Buffers that do not start with the magic are legacy blobs:
//! every byte is core memory.
mod error;
mod format;
mod host;
mod io;

pub use crate::error::{Result, SnapshotError};
pub use crate::format::{
    align_block_len, block_footprint, BlockTag, MemoryRegion, BLOCK_ALIGN, BLOCK_HEADER_LEN,
    HEADER_LEN, STATE_MAGIC, STATE_VERSION_V1,
};
pub use crate::host::{AchievementState, ReplayState, SnapshotCore, StateHost};
pub use crate::io::{Block, BlockReader, BlockWriter};

use tracing::{debug, warn};

/// Whether `buf` carries the container header. Anything else is a legacy blob.
pub fn has_state_header(buf: &[u8]) -> bool {
    buf.len() >= STATE_MAGIC.len() && &buf[..STATE_MAGIC.len()] == STATE_MAGIC
}

fn replay_len<H: StateHost + ?Sized>(host: &mut H, include_replay: bool) -> usize {
    if !include_replay {
        return 0;
    }
    match host.replay() {
        Some(replay) if !replay.is_rewinding() => replay.serialized_size(),
        _ => 0,
    }
}

fn achievements_len<H: StateHost + ?Sized>(host: &mut H) -> usize {
    host.achievements()
        .map(|cheevos| cheevos.serialized_size())
        .unwrap_or(0)
}

/// Size of the blob [`serialize`] would produce right now, or `None` when the core cannot
/// capture state at all or the size does not fit in `usize`.
///
/// `include_replay = false` leaves the replay block out, which is what fixed-capacity rewind
/// snapshots use.
pub fn compute_size<H: StateHost + ?Sized>(host: &mut H, include_replay: bool) -> Option<usize> {
    required_size(host, include_replay).ok()
}

const SIZE_OVERFLOW: SnapshotError = SnapshotError::OutOfMemory { len: usize::MAX };

fn required_size<H: StateHost + ?Sized>(host: &mut H, include_replay: bool) -> Result<usize> {
    let core_len = host.core().serialize_size();
    if core_len == 0 {
        return Err(SnapshotError::Unsupported);
    }
    let replay = replay_len(host, include_replay);
    let cheevos = achievements_len(host);

    let mut size = block_footprint(core_len)
        .and_then(|len| len.checked_add(HEADER_LEN + BLOCK_HEADER_LEN))
        .ok_or(SIZE_OVERFLOW)?;
    for len in [replay, cheevos] {
        if len > 0 {
            size = block_footprint(len)
                .and_then(|len| size.checked_add(len))
                .ok_or(SIZE_OVERFLOW)?;
        }
    }
    Ok(size)
}

/// Write a complete blob, replay block included, into the front of `out`.
pub fn serialize<H: StateHost + ?Sized>(host: &mut H, out: &mut [u8]) -> Result<()> {
    serialize_with(host, out, true).map(|_| ())
}

/// Like [`serialize`], returning the number of bytes written.
///
/// The file header goes in last. If any block fails, the header bytes are zeroed instead, so a
/// partially written buffer never passes for a blob.
pub fn serialize_with<H: StateHost + ?Sized>(
    host: &mut H,
    out: &mut [u8],
    include_replay: bool,
) -> Result<usize> {
    let needed = required_size(host, include_replay)?;
    if out.len() < needed {
        return Err(SnapshotError::BufferTooSmall {
            needed,
            available: out.len(),
        });
    }

    match write_blocks(host, out, include_replay) {
        Ok(len) => {
            BlockWriter::new(out).write_file_header()?;
            Ok(len)
        }
        Err(err) => {
            out[..HEADER_LEN].fill(0);
            Err(err)
        }
    }
}

fn write_blocks<H: StateHost + ?Sized>(
    host: &mut H,
    out: &mut [u8],
    include_replay: bool,
) -> Result<usize> {
    let mut w = BlockWriter::new(out);
    w.skip(HEADER_LEN)?;

    let replay = replay_len(host, include_replay);
    if replay > 0 {
        let payload = w.begin_block(BlockTag::RPLY, replay)?;
        if let Some(replay_state) = host.replay() {
            if !replay_state.write_serialized(payload) {
                return Err(SnapshotError::ReplayIncompatible("replay state could not be written"));
            }
        }
    }

    let core_len = host.core().serialize_size();
    let payload = w.begin_block(BlockTag::MEM, core_len)?;
    host.core().serialize(payload)?;

    let cheevos = achievements_len(host);
    if cheevos > 0 {
        let payload = w.begin_block(BlockTag::ACHV, cheevos)?;
        if let Some(state) = host.achievements() {
            if !state.write_serialized(payload) {
                // MEM is already written; the save goes ahead with a zeroed ACHV payload.
                warn!("achievement state could not be serialized; block left zeroed");
            }
        }
    }

    w.write_terminator()?;
    Ok(w.position())
}

/// Fixed-capacity, replay-less snapshot for per-frame rewind.
///
/// Never allocates. Returns `false`, leaving `out` untouched, when the state does not fit or the
/// core cannot capture state. A collaborator failing mid-write also yields `false`; the buffer
/// then carries no header.
pub fn serialize_rewind<H: StateHost + ?Sized>(host: &mut H, out: &mut [u8]) -> bool {
    match compute_size(host, false) {
        Some(needed) if needed <= out.len() => serialize_with(host, out, false).is_ok(),
        _ => false,
    }
}

/// Blocks of a parsed blob, indexed by the tags the codec cares about.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlobIndex<'a> {
    /// `true` for headerless buffers, where [`BlobIndex::memory`] is the whole buffer.
    pub legacy: bool,
    pub version: Option<u8>,
    pub memory: Option<Block<'a>>,
    pub achievements: Option<Block<'a>>,
    pub replay: Option<Block<'a>>,
    pub unknown: Vec<Block<'a>>,
    pub terminated: bool,
}

/// Walk a blob without touching any collaborator.
pub fn inspect_blob(buf: &[u8]) -> Result<BlobIndex<'_>> {
    if !has_state_header(buf) {
        return Ok(BlobIndex {
            legacy: true,
            memory: Some(Block {
                tag: BlockTag::MEM,
                offset: 0,
                payload: buf,
            }),
            ..BlobIndex::default()
        });
    }

    let mut index = BlobIndex {
        version: buf.get(STATE_MAGIC.len()).copied(),
        ..BlobIndex::default()
    };
    if let Some(version) = index.version.filter(|&v| v > STATE_VERSION_V1) {
        debug!(version, "state written by a newer format version; reading known blocks only");
    }

    let mut reader = BlockReader::new(buf);
    while let Some(block) = reader.next_block()? {
        let slot = match block.tag {
            BlockTag::MEM => &mut index.memory,
            BlockTag::ACHV => &mut index.achievements,
            BlockTag::RPLY => &mut index.replay,
            _ => {
                debug!(tag = %block.tag, len = block.payload.len(), "skipping unknown state block");
                index.unknown.push(block);
                continue;
            }
        };
        if slot.is_some() {
            return Err(SnapshotError::Corrupt("duplicate state block"));
        }
        *slot = Some(block);
    }
    index.terminated = reader.terminated();
    Ok(index)
}

/// Restore a blob into the host's collaborators.
///
/// Structural problems and replay incompatibility are detected before the core is touched. The
/// replay block is resolved ahead of core memory regardless of where it sits in the blob.
pub fn deserialize<H: StateHost + ?Sized>(host: &mut H, buf: &[u8]) -> Result<()> {
    let index = inspect_blob(buf)?;

    if index.legacy {
        host.core().unserialize(buf)?;
        if let Some(cheevos) = host.achievements() {
            cheevos.clear_restored();
        }
        if let Some(replay) = host.replay() {
            replay.clear_restored();
        }
        return Ok(());
    }

    let memory = index
        .memory
        .ok_or(SnapshotError::Corrupt("missing MEM block"))?;

    if let Some(replay) = host.replay() {
        match index.replay {
            Some(block) => {
                if !replay.load_serialized(block.payload) {
                    return Err(SnapshotError::ReplayIncompatible(
                        "replay rejected the RPLY block",
                    ));
                }
            }
            None if replay.is_active() => {
                return Err(SnapshotError::ReplayIncompatible(
                    "replay in progress but state has no RPLY block",
                ));
            }
            None => replay.clear_restored(),
        }
    }

    host.core().unserialize(memory.payload)?;

    if let Some(cheevos) = host.achievements() {
        match index.achievements {
            Some(block) => {
                if !cheevos.load_serialized(block.payload) {
                    warn!("achievement state in blob was rejected");
                }
            }
            None => cheevos.clear_restored(),
        }
    }

    Ok(())
}
