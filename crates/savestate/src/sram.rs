//! Keeps battery-backed memory intact across a state load.
//!
//! Loading a state rewrites the whole core, including save RAM. With the guard active, each
//! protected region is copied out before the load and copied back afterwards, so in-game saves
//! made after the state was captured survive the load.
use std::collections::BTreeMap;

use savestate_container::{deserialize, MemoryRegion, SnapshotCore, StateHost};
use tracing::{debug, warn};

/// Per-region backups keyed by region id. Restoration looks the live region up again by id, since
/// the core may have reallocated it during the load.
#[derive(Debug, Default)]
pub struct SramGuard {
    backups: BTreeMap<MemoryRegion, Vec<u8>>,
}

impl SramGuard {
    pub fn backup(
        core: &mut dyn SnapshotCore,
        regions: impl IntoIterator<Item = MemoryRegion>,
    ) -> Self {
        Self::backup_with(core, regions, |len| {
            let mut buf = Vec::new();
            buf.try_reserve_exact(len).ok()?;
            Some(buf)
        })
    }

    fn backup_with(
        core: &mut dyn SnapshotCore,
        regions: impl IntoIterator<Item = MemoryRegion>,
        mut alloc: impl FnMut(usize) -> Option<Vec<u8>>,
    ) -> Self {
        let mut backups = BTreeMap::new();
        for region in regions {
            if backups.contains_key(&region) {
                continue;
            }
            let Some(live) = core.memory(region) else {
                continue;
            };
            if live.is_empty() {
                continue;
            }
            // Allocation failure leaves this region unprotected; the load itself still goes ahead.
            let Some(mut copy) = alloc(live.len()) else {
                warn!(%region, len = live.len(), "cannot back up memory region; it will not be protected");
                continue;
            };
            copy.extend_from_slice(live);
            debug!(%region, len = copy.len(), "backed up memory region");
            backups.insert(region, copy);
        }
        Self { backups }
    }

    pub fn is_protecting(&self, region: MemoryRegion) -> bool {
        self.backups.contains_key(&region)
    }

    pub fn protected_regions(&self) -> impl Iterator<Item = MemoryRegion> + '_ {
        self.backups.keys().copied()
    }

    pub fn restore(self, core: &mut dyn SnapshotCore) {
        for (region, saved) in self.backups {
            let Some(live) = core.memory(region) else {
                warn!(%region, "memory region disappeared during load; backup dropped");
                continue;
            };
            if live.len() != saved.len() {
                warn!(
                    %region,
                    before = saved.len(),
                    after = live.len(),
                    "memory region changed size during load; restoring common prefix"
                );
            }
            let len = live.len().min(saved.len());
            live[..len].copy_from_slice(&saved[..len]);
        }
    }
}

/// [`deserialize`] with the protected regions preserved across it. `regions = None` disables the
/// guard. The regions are restored whether or not the load succeeded.
pub fn guarded_deserialize<H: StateHost + ?Sized>(
    host: &mut H,
    buf: &[u8],
    regions: Option<&[MemoryRegion]>,
) -> savestate_container::Result<()> {
    let guard = regions.map(|regions| SramGuard::backup(host.core(), regions.iter().copied()));
    let result = deserialize(host, buf);
    if let Some(guard) = guard {
        guard.restore(host.core());
    }
    result
}
