#![allow(dead_code)]

use std::sync::Once;

use savestate::container::{
    AchievementState, MemoryRegion, Result, SnapshotCore, SnapshotError, StateHost,
};

pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    });
}

/// Core whose whole state is `mem` followed by `sram`.
pub struct FakeCore {
    pub mem: Vec<u8>,
    pub sram: Vec<u8>,
    pub unserialize_calls: usize,
    pub supported: bool,
}

impl FakeCore {
    pub fn new(mem: Vec<u8>, sram: Vec<u8>) -> Self {
        Self {
            mem,
            sram,
            unserialize_calls: 0,
            supported: true,
        }
    }
}

impl SnapshotCore for FakeCore {
    fn serialize_size(&self) -> usize {
        if !self.supported {
            return 0;
        }
        self.mem.len() + self.sram.len()
    }

    fn serialize(&mut self, buf: &mut [u8]) -> Result<()> {
        let (mem, sram) = buf.split_at_mut(self.mem.len());
        mem.copy_from_slice(&self.mem);
        sram.copy_from_slice(&self.sram);
        Ok(())
    }

    fn unserialize(&mut self, buf: &[u8]) -> Result<()> {
        self.unserialize_calls += 1;
        if buf.len() != self.mem.len() + self.sram.len() {
            return Err(SnapshotError::CoreRejected);
        }
        let (mem, sram) = buf.split_at(self.mem.len());
        self.mem.copy_from_slice(mem);
        self.sram.copy_from_slice(sram);
        Ok(())
    }

    fn memory(&mut self, region: MemoryRegion) -> Option<&mut [u8]> {
        match region {
            MemoryRegion::SAVE_RAM => Some(&mut self.sram),
            _ => None,
        }
    }
}

#[derive(Default)]
pub struct FakeCheevos {
    pub data: Vec<u8>,
    pub restored: Option<Vec<u8>>,
}

impl AchievementState for FakeCheevos {
    fn serialized_size(&self) -> usize {
        self.data.len()
    }

    fn write_serialized(&mut self, buf: &mut [u8]) -> bool {
        buf.copy_from_slice(&self.data);
        true
    }

    fn load_serialized(&mut self, buf: &[u8]) -> bool {
        self.restored = Some(buf.to_vec());
        true
    }

    fn clear_restored(&mut self) {
        self.restored = None;
    }
}

pub struct Host {
    pub core: FakeCore,
    pub cheevos: Option<FakeCheevos>,
}

impl Host {
    pub fn new(mem: Vec<u8>) -> Self {
        Self {
            core: FakeCore::new(mem, Vec::new()),
            cheevos: None,
        }
    }

    pub fn with_sram(mem: Vec<u8>, sram: Vec<u8>) -> Self {
        Self {
            core: FakeCore::new(mem, sram),
            cheevos: None,
        }
    }
}

impl StateHost for Host {
    fn core(&mut self) -> &mut dyn SnapshotCore {
        &mut self.core
    }

    fn achievements(&mut self) -> Option<&mut dyn AchievementState> {
        self.cheevos
            .as_mut()
            .map(|cheevos| cheevos as &mut dyn AchievementState)
    }
}

/// Deterministic, mildly compressible filler.
pub fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| ((i / 7) as u8).wrapping_mul(31).wrapping_add(seed))
        .collect()
}
