use thiserror::Error;

pub type Result<T> = std::result::Result<T, SnapshotError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SnapshotError {
    #[error("core does not support save states")]
    Unsupported,

    #[error("out of memory allocating {len} bytes")]
    OutOfMemory { len: usize },

    #[error("state buffer too small (needed {needed} bytes, have {available} bytes)")]
    BufferTooSmall { needed: usize, available: usize },

    #[error("core rejected the state payload")]
    CoreRejected,

    #[error("corrupt state: {0}")]
    Corrupt(&'static str),

    #[error("replay state incompatible: {0}")]
    ReplayIncompatible(&'static str),
}
