#![no_main]

use libfuzzer_sys::fuzz_target;
use savestate_container::{
    deserialize, inspect_blob, AchievementState, ReplayState, SnapshotCore, SnapshotError,
    StateHost,
};

struct DummyCore {
    mem: Vec<u8>,
}

impl SnapshotCore for DummyCore {
    fn serialize_size(&self) -> usize {
        self.mem.len()
    }

    fn serialize(&mut self, buf: &mut [u8]) -> savestate_container::Result<()> {
        buf.copy_from_slice(&self.mem);
        Ok(())
    }

    fn unserialize(&mut self, buf: &[u8]) -> savestate_container::Result<()> {
        if buf.len() != self.mem.len() {
            return Err(SnapshotError::CoreRejected);
        }
        self.mem.copy_from_slice(buf);
        Ok(())
    }
}

struct DummyCheevos;

impl AchievementState for DummyCheevos {
    fn serialized_size(&self) -> usize {
        0
    }

    fn write_serialized(&mut self, _buf: &mut [u8]) -> bool {
        true
    }

    fn load_serialized(&mut self, buf: &[u8]) -> bool {
        !buf.is_empty()
    }
}

struct DummyReplay {
    active: bool,
}

impl ReplayState for DummyReplay {
    fn serialized_size(&self) -> usize {
        0
    }

    fn write_serialized(&mut self, _buf: &mut [u8]) -> bool {
        true
    }

    fn load_serialized(&mut self, buf: &[u8]) -> bool {
        buf.len() % 2 == 0
    }

    fn is_active(&self) -> bool {
        self.active
    }
}

struct DummyHost {
    core: DummyCore,
    cheevos: DummyCheevos,
    replay: DummyReplay,
}

impl StateHost for DummyHost {
    fn core(&mut self) -> &mut dyn SnapshotCore {
        &mut self.core
    }

    fn achievements(&mut self) -> Option<&mut dyn AchievementState> {
        Some(&mut self.cheevos)
    }

    fn replay(&mut self) -> Option<&mut dyn ReplayState> {
        Some(&mut self.replay)
    }
}

fuzz_target!(|data: &[u8]| {
    let _ = inspect_blob(data);

    let mut host = DummyHost {
        core: DummyCore { mem: vec![0u8; 4096] },
        cheevos: DummyCheevos,
        replay: DummyReplay {
            active: data.first().is_some_and(|b| b & 1 == 1),
        },
    };
    let _ = deserialize(&mut host, data);
});
