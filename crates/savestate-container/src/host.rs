use crate::error::Result;
use crate::format::MemoryRegion;

/// The emulated core whose memory is captured and restored. Its payload is opaque.
pub trait SnapshotCore {
    /// Bytes the core needs for one serialized payload. Zero means state capture is unsupported.
    fn serialize_size(&self) -> usize;

    /// Serialize into `buf`, which is exactly [`SnapshotCore::serialize_size`] bytes long.
    fn serialize(&mut self, buf: &mut [u8]) -> Result<()>;

    fn unserialize(&mut self, buf: &[u8]) -> Result<()>;

    /// Live view of a persistent memory region. The slice may move or change length between
    /// calls (a core is free to reallocate on restore), so callers must not hold on to it.
    fn memory(&mut self, _region: MemoryRegion) -> Option<&mut [u8]> {
        None
    }
}

/// Achievement runtime state carried in the optional `ACHV` block.
pub trait AchievementState {
    fn serialized_size(&self) -> usize;
    fn write_serialized(&mut self, buf: &mut [u8]) -> bool;
    fn load_serialized(&mut self, buf: &[u8]) -> bool;

    /// Forget any state restored from an earlier blob. Called when a blob has no `ACHV` block.
    fn clear_restored(&mut self) {}
}

/// Input replay (movie) state carried in the optional `RPLY` block.
pub trait ReplayState {
    fn serialized_size(&self) -> usize;
    fn write_serialized(&mut self, buf: &mut [u8]) -> bool;
    fn load_serialized(&mut self, buf: &[u8]) -> bool;

    /// Recording or playback in progress. A blob restored while this is set must carry `RPLY`.
    fn is_active(&self) -> bool;

    /// The replay is itself being rewound; its block is left out of new blobs.
    fn is_rewinding(&self) -> bool {
        false
    }

    fn clear_restored(&mut self) {}
}

/// Everything the codec talks to while capturing or restoring one session.
pub trait StateHost {
    fn core(&mut self) -> &mut dyn SnapshotCore;

    fn achievements(&mut self) -> Option<&mut dyn AchievementState> {
        None
    }

    fn replay(&mut self) -> Option<&mut dyn ReplayState> {
        None
    }
}
