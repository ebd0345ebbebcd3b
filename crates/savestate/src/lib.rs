//! Save-state engine: incremental, cancellable save and load tasks on top of
//! [`savestate_container`], plus the undo buffers, RAM-resident state and SRAM guard a frontend
//! needs around them.
//!
//! Everything here is driven from the host's main loop. [`SnapshotManager::poll`] advances the
//! single active task by at most [`SnapshotConfig::chunk_size`] bytes.
pub mod config;
pub mod error;
pub mod manager;
pub mod messages;
pub mod paths;
pub mod slots;
pub mod sram;
pub mod stream;
pub mod task;

pub use savestate_container as container;

pub use crate::config::{SnapshotConfig, DEFAULT_CHUNK_SIZE};
pub use crate::error::{Result, StateError};
pub use crate::manager::{
    SessionStart, SnapshotManager, TaskEvent, UndoOutcome, RAM_STATE_PATH,
};
pub use crate::messages::Message;
pub use crate::paths::StatePaths;
pub use crate::slots::{BufferSlot, BufferSlots, RamSlot, StateBuffer};
pub use crate::sram::{guarded_deserialize, SramGuard};
pub use crate::stream::{staging_path, StateReader, StateWriter};
pub use crate::task::{
    capture_state, LoadPurpose, SaveSource, Task, TaskFlags, TaskKind, TaskOutcome, TaskPoll,
};
