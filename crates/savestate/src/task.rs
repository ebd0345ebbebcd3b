//! Save and load as bounded steps.
//!
//! A [`Task`] is polled from the host's main loop. Every poll moves at most `chunk_size` bytes
//! between the in-memory blob and the state file, so no single poll stalls a frame. Terminal
//! states all go through [`Task::finish`], which drops the stream and buffer exactly once.
use std::mem;
use std::path::{Path, PathBuf};

use savestate_container::{compute_size, serialize, SnapshotError, StateHost};
use tracing::{debug, info, warn};

use crate::error::{try_alloc_zeroed, Result, StateError};
use crate::stream::{StateReader, StateWriter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    Save,
    Load,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TaskFlags {
    /// No user-visible notification on completion.
    pub mute: bool,
    /// Write the file as an LZ4 frame.
    pub compress: bool,
    /// Session-end automatic save, driven to completion inline.
    pub autosave: bool,
    /// Ask the host for a screenshot once the save is on disk.
    pub thumbnail: bool,
    /// The save restores bytes an earlier save overwrote.
    pub undo: bool,
    pub cancel_requested: bool,
}

/// Where a save task's blob comes from.
#[derive(Debug, Default)]
pub enum SaveSource {
    /// Serialize the live core on the first poll.
    #[default]
    Capture,
    /// Write bytes captured earlier.
    Bytes(Vec<u8>),
}

/// What happens to the bytes once a load task has read the whole file.
#[derive(Debug, Default)]
pub enum LoadPurpose {
    /// Apply to the live core.
    #[default]
    Apply,
    /// Keep the bytes in the undo-save slot; the core is not touched.
    StageUndoSave,
    /// The file is about to be overwritten: keep its bytes for undo-save, then save `data` over
    /// it.
    BackupThenSave { data: Vec<u8>, flags: TaskFlags },
}

#[derive(Debug)]
pub enum TaskOutcome {
    Saved,
    Loaded { data: Vec<u8>, purpose: LoadPurpose },
    Failed(StateError),
    Cancelled,
}

#[derive(Debug)]
pub enum TaskPoll {
    Pending { percent: u8 },
    Done(TaskOutcome),
}

enum Phase {
    Created,
    Writing {
        stream: StateWriter,
        blob: Vec<u8>,
        cursor: usize,
    },
    Reading {
        stream: StateReader,
        buf: Vec<u8>,
        cursor: usize,
    },
    Finished,
}

pub struct Task {
    kind: TaskKind,
    path: PathBuf,
    flags: TaskFlags,
    chunk_size: usize,
    source: SaveSource,
    purpose: LoadPurpose,
    phase: Phase,
}

fn percent(cursor: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    ((cursor as u128 * 100) / total as u128) as u8
}

impl Task {
    pub fn save(
        path: impl Into<PathBuf>,
        source: SaveSource,
        flags: TaskFlags,
        chunk_size: usize,
    ) -> Self {
        Self::new(TaskKind::Save, path.into(), flags, chunk_size, source, LoadPurpose::Apply)
    }

    pub fn load(
        path: impl Into<PathBuf>,
        purpose: LoadPurpose,
        flags: TaskFlags,
        chunk_size: usize,
    ) -> Self {
        Self::new(TaskKind::Load, path.into(), flags, chunk_size, SaveSource::Capture, purpose)
    }

    fn new(
        kind: TaskKind,
        path: PathBuf,
        flags: TaskFlags,
        chunk_size: usize,
        source: SaveSource,
        purpose: LoadPurpose,
    ) -> Self {
        Self {
            kind,
            path,
            flags,
            chunk_size: chunk_size.max(1),
            source,
            purpose,
            phase: Phase::Created,
        }
    }

    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn flags(&self) -> TaskFlags {
        self.flags
    }

    pub fn purpose(&self) -> &LoadPurpose {
        &self.purpose
    }

    /// Hand back the load purpose, e.g. to run a pending save after a failed backup load.
    pub fn into_purpose(self) -> LoadPurpose {
        self.purpose
    }

    pub fn cancel(&mut self) {
        self.flags.cancel_requested = true;
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.phase, Phase::Finished)
    }

    /// Advance by one step. The host is only consulted by a save that captures the live core.
    /// Polling a finished task reports [`StateError::Cancelled`].
    pub fn poll<H: StateHost + ?Sized>(&mut self, host: &mut H) -> TaskPoll {
        if self.is_finished() {
            return TaskPoll::Done(TaskOutcome::Failed(StateError::Cancelled));
        }
        if self.flags.cancel_requested {
            return self.finish(TaskOutcome::Cancelled);
        }

        let phase = match mem::replace(&mut self.phase, Phase::Finished) {
            Phase::Created => self.start(host),
            phase => Ok(phase),
        };
        match phase.and_then(|phase| self.step(phase)) {
            Ok(poll) => poll,
            Err(err) => self.finish(TaskOutcome::Failed(err)),
        }
    }

    fn start<H: StateHost + ?Sized>(&mut self, host: &mut H) -> Result<Phase> {
        debug!(kind = ?self.kind, path = %self.path.display(), "starting state task");
        match self.kind {
            TaskKind::Save => {
                // The blob is complete in memory before the destination is opened, so a capture
                // failure never touches the disk.
                let blob = match mem::take(&mut self.source) {
                    SaveSource::Bytes(bytes) => bytes,
                    SaveSource::Capture => capture_state(host)?,
                };
                let stream = StateWriter::create(&self.path, self.flags.compress, blob.len())?;
                Ok(Phase::Writing {
                    stream,
                    blob,
                    cursor: 0,
                })
            }
            TaskKind::Load => {
                let stream = StateReader::open(&self.path)?;
                if stream.is_empty() {
                    return Err(SnapshotError::Corrupt("empty state file").into());
                }
                let buf = try_alloc_zeroed(stream.len())?;
                Ok(Phase::Reading {
                    stream,
                    buf,
                    cursor: 0,
                })
            }
        }
    }

    fn step(&mut self, phase: Phase) -> Result<TaskPoll> {
        match phase {
            Phase::Writing {
                mut stream,
                blob,
                cursor,
            } => {
                let total = blob.len();
                let end = total.min(cursor + self.chunk_size);
                stream.write_chunk(&blob[cursor..end])?;
                if end == total {
                    stream.commit()?;
                    return Ok(self.finish(TaskOutcome::Saved));
                }
                self.phase = Phase::Writing {
                    stream,
                    blob,
                    cursor: end,
                };
                Ok(TaskPoll::Pending {
                    percent: percent(end, total),
                })
            }
            Phase::Reading {
                mut stream,
                mut buf,
                cursor,
            } => {
                let end = buf.len().min(cursor + self.chunk_size);
                stream.read_chunk(&mut buf[cursor..end])?;
                let total = buf.len();
                if end == total {
                    drop(stream);
                    let purpose = mem::take(&mut self.purpose);
                    return Ok(self.finish(TaskOutcome::Loaded { data: buf, purpose }));
                }
                self.phase = Phase::Reading {
                    stream,
                    buf,
                    cursor: end,
                };
                Ok(TaskPoll::Pending {
                    percent: percent(end, total),
                })
            }
            Phase::Created | Phase::Finished => Err(StateError::Cancelled),
        }
    }

    /// Single exit point: releases whatever the phase still owns. An unfinished save's staging
    /// file is removed when its writer drops here.
    fn finish(&mut self, outcome: TaskOutcome) -> TaskPoll {
        drop(mem::replace(&mut self.phase, Phase::Finished));
        match &outcome {
            TaskOutcome::Saved | TaskOutcome::Loaded { .. } => {
                info!(kind = ?self.kind, path = %self.path.display(), "state task finished")
            }
            TaskOutcome::Failed(err) => {
                warn!(kind = ?self.kind, path = %self.path.display(), %err, "state task failed")
            }
            TaskOutcome::Cancelled => {
                info!(kind = ?self.kind, path = %self.path.display(), "state task cancelled")
            }
        }
        TaskPoll::Done(outcome)
    }

    /// Poll until done. Used for automatic saves and loads that must complete synchronously.
    pub fn run_to_completion<H: StateHost + ?Sized>(mut self, host: &mut H) -> (Self, TaskOutcome) {
        loop {
            if let TaskPoll::Done(outcome) = self.poll(host) {
                return (self, outcome);
            }
        }
    }
}

/// Serialize the live core into a freshly allocated, exactly sized blob.
pub fn capture_state<H: StateHost + ?Sized>(host: &mut H) -> Result<Vec<u8>> {
    let size = compute_size(host, true).ok_or(SnapshotError::Unsupported)?;
    let mut blob = try_alloc_zeroed(size)?;
    serialize(host, &mut blob)?;
    Ok(blob)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_rounds_down() {
        assert_eq!(percent(1000, 2500), 40);
        assert_eq!(percent(2000, 2500), 80);
        assert_eq!(percent(2500, 2500), 100);
        assert_eq!(percent(1, 3), 33);
    }
}
