use std::path::{Path, PathBuf};

/// One captured blob together with the path it came from (or is destined for).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateBuffer {
    pub data: Vec<u8>,
    pub path: PathBuf,
}

impl StateBuffer {
    pub fn new(data: Vec<u8>, path: impl Into<PathBuf>) -> Self {
        Self {
            data,
            path: path.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Holds at most one generation. Storing a new buffer drops the previous one.
#[derive(Debug, Default)]
pub struct BufferSlot {
    contents: Option<StateBuffer>,
}

impl BufferSlot {
    pub fn get(&self) -> Option<&StateBuffer> {
        self.contents.as_ref()
    }

    pub fn set(&mut self, buffer: StateBuffer) {
        self.contents = Some(buffer);
    }

    pub fn take(&mut self) -> Option<StateBuffer> {
        self.contents.take()
    }

    pub fn clear(&mut self) {
        self.contents = None;
    }

    pub fn is_empty(&self) -> bool {
        self.contents.is_none()
    }

    pub fn path(&self) -> Option<&Path> {
        self.contents.as_ref().map(|buf| buf.path.as_path())
    }
}

/// The RAM-resident state plus its "not yet on disk" marker.
#[derive(Debug, Default)]
pub struct RamSlot {
    slot: BufferSlot,
    pending_write: bool,
}

impl RamSlot {
    pub fn get(&self) -> Option<&StateBuffer> {
        self.slot.get()
    }

    pub fn store(&mut self, buffer: StateBuffer) {
        self.slot.set(buffer);
        self.pending_write = true;
    }

    pub fn is_pending(&self) -> bool {
        self.pending_write && !self.slot.is_empty()
    }

    pub fn mark_written(&mut self) {
        self.pending_write = false;
    }

    pub fn clear(&mut self) {
        self.slot.clear();
        self.pending_write = false;
    }
}

/// The three session-wide snapshot holders.
#[derive(Debug, Default)]
pub struct BufferSlots {
    /// Bytes a save overwrote on disk; consumed by undo-save.
    pub undo_save: BufferSlot,
    /// Core state captured right before the last load; consumed by undo-load.
    pub undo_load: BufferSlot,
    pub ram: RamSlot,
}

impl BufferSlots {
    pub fn reset(&mut self) {
        self.undo_save.clear();
        self.undo_load.clear();
        self.ram.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_keeps_a_single_generation() {
        let mut slot = BufferSlot::default();
        slot.set(StateBuffer::new(vec![1, 2, 3], "a.state"));
        slot.set(StateBuffer::new(vec![4], "b.state"));
        assert_eq!(slot.get().unwrap().data, vec![4]);
        assert_eq!(slot.path(), Some(Path::new("b.state")));
        assert_eq!(slot.take().unwrap().len(), 1);
        assert!(slot.take().is_none());
    }

    #[test]
    fn ram_slot_tracks_pending_writes() {
        let mut ram = RamSlot::default();
        assert!(!ram.is_pending());
        ram.store(StateBuffer::new(vec![0; 8], "game.state"));
        assert!(ram.is_pending());
        ram.mark_written();
        assert!(!ram.is_pending());
        assert!(ram.get().is_some());
    }
}
