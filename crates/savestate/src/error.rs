use std::io;

use savestate_container::SnapshotError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, StateError>;

#[derive(Debug, Error)]
pub enum StateError {
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("short transfer (expected {expected} bytes, moved {actual} bytes)")]
    ShortTransfer { expected: usize, actual: usize },

    #[error("out of memory allocating {len} bytes")]
    OutOfMemory { len: usize },

    #[error("another save or load is already in progress")]
    Busy,

    #[error("operation cancelled")]
    Cancelled,

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl From<serde_json::Error> for StateError {
    fn from(value: serde_json::Error) -> Self {
        Self::Config(value.to_string())
    }
}

/// Zero-filled buffer of exactly `len` bytes, or an error if the allocation cannot be made.
pub(crate) fn try_alloc_zeroed(len: usize) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|_| StateError::OutOfMemory { len })?;
    buf.resize(len, 0);
    Ok(buf)
}
