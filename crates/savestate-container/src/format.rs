pub const STATE_MAGIC: &[u8; 7] = b"RASTATE";
pub const STATE_VERSION_V1: u8 = 1;

/// Magic tag plus the one-byte format version.
pub const HEADER_LEN: usize = STATE_MAGIC.len() + 1;
/// 4CC tag plus the little-endian `u32` payload length.
pub const BLOCK_HEADER_LEN: usize = 8;
/// Block payloads are zero-padded to this boundary when written.
pub const BLOCK_ALIGN: usize = 8;

/// Round `len` up to the next multiple of [`BLOCK_ALIGN`].
pub const fn align_block_len(len: usize) -> usize {
    (len + (BLOCK_ALIGN - 1)) & !(BLOCK_ALIGN - 1)
}

/// Number of bytes one block occupies on the wire, header and padding included. `None` when that
/// does not fit in `usize`.
pub fn block_footprint(payload_len: usize) -> Option<usize> {
    payload_len
        .checked_add(BLOCK_ALIGN - 1)
        .map(|len| len & !(BLOCK_ALIGN - 1))?
        .checked_add(BLOCK_HEADER_LEN)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockTag(pub [u8; 4]);

impl BlockTag {
    /// Opaque core memory. Mandatory, exactly one per blob.
    pub const MEM: BlockTag = BlockTag(*b"MEM ");
    /// Achievement runtime state. Optional.
    pub const ACHV: BlockTag = BlockTag(*b"ACHV");
    /// Input replay (movie) state. Optional; written ahead of `MEM`.
    pub const RPLY: BlockTag = BlockTag(*b"RPLY");
    /// Zero-length terminator.
    pub const END: BlockTag = BlockTag(*b"END ");

    pub fn name(self) -> Option<&'static str> {
        match self {
            BlockTag::MEM => Some("MEM"),
            BlockTag::ACHV => Some("ACHV"),
            BlockTag::RPLY => Some("RPLY"),
            BlockTag::END => Some("END"),
            _ => None,
        }
    }

    pub fn is_known(self) -> bool {
        self.name().is_some()
    }
}

impl core::fmt::Display for BlockTag {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "BlockTag({:02x?})", self.0),
        }
    }
}

/// Battery-backed (or otherwise persistent) memory region exposed by a core.
///
/// Numbering follows the conventional core memory ids so hosts can pass them straight through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MemoryRegion(pub u32);

impl MemoryRegion {
    pub const SAVE_RAM: MemoryRegion = MemoryRegion(0);
    pub const RTC: MemoryRegion = MemoryRegion(1);
    pub const SYSTEM_RAM: MemoryRegion = MemoryRegion(2);
    pub const VIDEO_RAM: MemoryRegion = MemoryRegion(3);

    pub fn name(self) -> Option<&'static str> {
        match self {
            MemoryRegion::SAVE_RAM => Some("SAVE_RAM"),
            MemoryRegion::RTC => Some("RTC"),
            MemoryRegion::SYSTEM_RAM => Some("SYSTEM_RAM"),
            MemoryRegion::VIDEO_RAM => Some("VIDEO_RAM"),
            _ => None,
        }
    }
}

impl core::fmt::Display for MemoryRegion {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        if let Some(name) = self.name() {
            write!(f, "{name}({})", self.0)
        } else {
            write!(f, "MemoryRegion({})", self.0)
        }
    }
}
