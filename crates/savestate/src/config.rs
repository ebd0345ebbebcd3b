use savestate_container::MemoryRegion;
use serde::Deserialize;

use crate::error::{Result, StateError};

/// Bytes moved per task poll unless configured otherwise.
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SnapshotConfig {
    /// Upper bound on the bytes a single task poll reads or writes.
    pub chunk_size: usize,
    /// Keep battery-backed memory intact across state loads.
    pub block_sram_overwrite: bool,
    /// Write save files as LZ4 frames.
    pub compression: bool,
    /// Ask the host for a screenshot after each completed, non-automatic save.
    pub thumbnail: bool,
    /// Write `<state>.auto` when the session ends.
    pub auto_save: bool,
    /// Load `<state>.auto`, if present, when the session begins.
    pub auto_load: bool,
    /// Resume at the highest numbered slot found next to the state path.
    pub auto_index: bool,
    /// Region ids covered by the SRAM guard.
    pub protected_regions: Vec<u32>,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            block_sram_overwrite: false,
            compression: false,
            thumbnail: false,
            auto_save: false,
            auto_load: false,
            auto_index: false,
            protected_regions: vec![MemoryRegion::SAVE_RAM.0, MemoryRegion::RTC.0],
        }
    }
}

impl SnapshotConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(StateError::Config("chunk_size must be non-zero".into()));
        }
        Ok(())
    }

    pub fn protected_regions(&self) -> impl Iterator<Item = MemoryRegion> + '_ {
        self.protected_regions.iter().copied().map(MemoryRegion)
    }
}
