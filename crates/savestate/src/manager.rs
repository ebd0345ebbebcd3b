use std::path::{Path, PathBuf};

use savestate_container::{compute_size, serialize_rewind, MemoryRegion, SnapshotError, StateHost};
use tracing::{debug, info, warn};

use crate::config::SnapshotConfig;
use crate::error::{Result, StateError};
use crate::messages::Message;
use crate::paths::StatePaths;
use crate::slots::{BufferSlot, BufferSlots, StateBuffer};
use crate::sram::guarded_deserialize;
use crate::task::{
    capture_state, LoadPurpose, SaveSource, Task, TaskFlags, TaskKind, TaskOutcome, TaskPoll,
};

/// Origin recorded for states captured from the live core rather than read from a file.
pub const RAM_STATE_PATH: &str = "RAM";

/// What one [`SnapshotManager::poll`] produced.
#[derive(Debug)]
pub enum TaskEvent {
    Progress {
        kind: TaskKind,
        percent: u8,
    },
    Completed {
        kind: TaskKind,
        path: PathBuf,
        message: Option<String>,
        request_thumbnail: bool,
    },
    Failed {
        kind: TaskKind,
        path: PathBuf,
        error: StateError,
        message: Option<String>,
    },
    Cancelled {
        kind: TaskKind,
        path: PathBuf,
        message: Option<String>,
    },
}

impl TaskEvent {
    /// Progress through the task, 100 once it completed.
    pub fn percent(&self) -> Option<u8> {
        match self {
            TaskEvent::Progress { percent, .. } => Some(*percent),
            TaskEvent::Completed { .. } => Some(100),
            TaskEvent::Failed { .. } | TaskEvent::Cancelled { .. } => None,
        }
    }
}

/// Result of [`SnapshotManager::undo_save`] and [`SnapshotManager::undo_load`].
#[derive(Debug)]
pub enum UndoOutcome {
    /// The previous state is back in the core.
    Applied { message: String },
    /// The overwritten bytes are being written back; the task's [`TaskEvent`] carries the
    /// notification.
    Queued,
    NothingToUndo { message: String },
    Failed { error: StateError, message: String },
}

impl UndoOutcome {
    fn nothing() -> Self {
        UndoOutcome::NothingToUndo {
            message: Message::NoStateToUndo.as_str().to_string(),
        }
    }

    fn failed(error: StateError, message: Message) -> Self {
        UndoOutcome::Failed {
            error,
            message: message.as_str().to_string(),
        }
    }

    /// Whether the undo was applied or queued.
    pub fn performed(&self) -> bool {
        matches!(self, UndoOutcome::Applied { .. } | UndoOutcome::Queued)
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            UndoOutcome::Applied { message }
            | UndoOutcome::NothingToUndo { message }
            | UndoOutcome::Failed { message, .. } => Some(message),
            UndoOutcome::Queued => None,
        }
    }
}

/// Result of [`SnapshotManager::begin_session`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStart {
    /// Highest numbered slot found on disk, when auto-index is on.
    pub state_slot: Option<u32>,
    /// Whether the auto state was loaded, when auto-load is on and the file exists.
    pub auto_loaded: Option<bool>,
    pub message: Option<String>,
}

/// Session-wide save-state orchestration: the three buffer slots plus the single active task.
///
/// All methods run on the host's main thread. At most one save or load task is active; further
/// requests fail with [`StateError::Busy`] rather than queueing.
pub struct SnapshotManager {
    config: SnapshotConfig,
    guarded_regions: Option<Vec<MemoryRegion>>,
    paths: Option<StatePaths>,
    slots: BufferSlots,
    active: Option<Task>,
}

impl SnapshotManager {
    pub fn new(config: SnapshotConfig) -> Result<Self> {
        config.validate()?;
        let guarded_regions = config
            .block_sram_overwrite
            .then(|| config.protected_regions().collect());
        Ok(Self {
            config,
            guarded_regions,
            paths: None,
            slots: BufferSlots::default(),
            active: None,
        })
    }

    pub fn with_paths(config: SnapshotConfig, paths: StatePaths) -> Result<Self> {
        let mut manager = Self::new(config)?;
        manager.paths = Some(paths);
        Ok(manager)
    }

    pub fn config(&self) -> &SnapshotConfig {
        &self.config
    }

    pub fn paths(&self) -> Option<&StatePaths> {
        self.paths.as_ref()
    }

    pub fn slots(&self) -> &BufferSlots {
        &self.slots
    }

    pub fn serialized_size<H: StateHost + ?Sized>(&self, host: &mut H) -> Option<usize> {
        compute_size(host, true)
    }

    pub fn rewind_size<H: StateHost + ?Sized>(&self, host: &mut H) -> Option<usize> {
        compute_size(host, false)
    }

    /// Per-frame rewind capture into a preallocated buffer. See
    /// [`savestate_container::serialize_rewind`].
    pub fn rewind_snapshot<H: StateHost + ?Sized>(&self, host: &mut H, out: &mut [u8]) -> bool {
        serialize_rewind(host, out)
    }

    pub fn is_save_in_progress(&self) -> bool {
        self.active.as_ref().is_some_and(|task| {
            task.kind() == TaskKind::Save
                || matches!(task.purpose(), LoadPurpose::BackupThenSave { .. })
        })
    }

    pub fn is_load_in_progress(&self) -> bool {
        self.active.as_ref().is_some_and(|task| {
            task.kind() == TaskKind::Load
                && !matches!(task.purpose(), LoadPurpose::BackupThenSave { .. })
        })
    }

    /// Drop every buffered undo generation and the RAM-resident state.
    pub fn reset_undo_history(&mut self) {
        debug!("resetting save-state undo history");
        self.slots.reset();
    }

    /// Ask the active task to stop at its next poll.
    pub fn cancel(&mut self) -> bool {
        match self.active.as_mut() {
            Some(task) => {
                task.cancel();
                true
            }
            None => false,
        }
    }

    fn ensure_idle(&self) -> Result<()> {
        if self.active.is_some() {
            return Err(StateError::Busy);
        }
        Ok(())
    }

    fn push(&mut self, task: Task) -> Result<()> {
        self.ensure_idle()?;
        info!(kind = ?task.kind(), path = %task.path().display(), "queued state task");
        self.active = Some(task);
        Ok(())
    }

    fn save_flags(&self) -> TaskFlags {
        TaskFlags {
            compress: self.config.compression,
            thumbnail: self.config.thumbnail,
            ..TaskFlags::default()
        }
    }

    fn muted_flags(&self) -> TaskFlags {
        TaskFlags {
            mute: true,
            compress: self.config.compression,
            ..TaskFlags::default()
        }
    }

    /// Save the live state.
    ///
    /// With `to_disk`, the state goes to `path`; if `path` already exists its bytes are first read
    /// into the undo-save slot. Without `to_disk`, the state is captured straight into the
    /// undo-load slot and `path` is ignored.
    pub fn save<H: StateHost + ?Sized>(
        &mut self,
        host: &mut H,
        path: impl AsRef<Path>,
        to_disk: bool,
    ) -> Result<()> {
        if !to_disk {
            let data = capture_state(host)?;
            self.slots
                .undo_load
                .set(StateBuffer::new(data, RAM_STATE_PATH));
            return Ok(());
        }

        self.ensure_idle()?;
        if compute_size(host, true).is_none() {
            return Err(SnapshotError::Unsupported.into());
        }

        let path = path.as_ref();
        let flags = self.save_flags();
        let task = if path.exists() {
            // Capture now: the save must reflect the moment it was requested, not the moment the
            // backup read finishes.
            let data = capture_state(host)?;
            debug!(path = %path.display(), "backing up existing state before overwriting it");
            Task::load(
                path,
                LoadPurpose::BackupThenSave { data, flags },
                self.muted_flags(),
                self.config.chunk_size,
            )
        } else {
            Task::save(path, SaveSource::Capture, flags, self.config.chunk_size)
        };
        self.push(task)
    }

    /// Write the undo-save slot back to where it came from.
    pub fn undo_save(&mut self) -> UndoOutcome {
        if self.slots.undo_save.is_empty() {
            debug!("no overwritten state to restore");
            return UndoOutcome::nothing();
        }
        if let Err(error) = self.ensure_idle() {
            return UndoOutcome::failed(error, Message::FailedToUndoSaveState);
        }
        let Some(buffer) = self.slots.undo_save.take() else {
            return UndoOutcome::nothing();
        };
        let flags = TaskFlags {
            undo: true,
            compress: self.config.compression,
            ..TaskFlags::default()
        };
        let task = Task::save(
            buffer.path,
            SaveSource::Bytes(buffer.data),
            flags,
            self.config.chunk_size,
        );
        match self.push(task) {
            Ok(()) => UndoOutcome::Queued,
            Err(error) => UndoOutcome::failed(error, Message::FailedToUndoSaveState),
        }
    }

    /// Read `path`. With `stage_to_undo_buffer` the bytes only land in the undo-save slot;
    /// otherwise they are applied to the core once fully read.
    pub fn load(&mut self, path: impl AsRef<Path>, stage_to_undo_buffer: bool) -> Result<()> {
        self.ensure_idle()?;
        let (purpose, flags) = if stage_to_undo_buffer {
            (
                LoadPurpose::StageUndoSave,
                TaskFlags {
                    mute: true,
                    ..TaskFlags::default()
                },
            )
        } else {
            (LoadPurpose::Apply, TaskFlags::default())
        };
        self.push(Task::load(
            path.as_ref(),
            purpose,
            flags,
            self.config.chunk_size,
        ))
    }

    /// Return to the state captured before the last load. The state being left is captured in
    /// turn, so undoing twice returns to where the first undo started.
    pub fn undo_load<H: StateHost + ?Sized>(&mut self, host: &mut H) -> UndoOutcome {
        if let Err(error) = self.ensure_idle() {
            return UndoOutcome::failed(error, Message::FailedToUndoLoadState);
        }
        let Some(previous) = self.slots.undo_load.get().cloned() else {
            debug!("no loaded state to undo");
            return UndoOutcome::nothing();
        };

        match capture_state(host) {
            Ok(current) => self
                .slots
                .undo_load
                .set(StateBuffer::new(current, RAM_STATE_PATH)),
            Err(err) => warn!(%err, "could not capture state before undoing load"),
        }

        if let Err(err) = guarded_deserialize(host, &previous.data, self.guarded_regions.as_deref())
        {
            self.slots.undo_load.set(previous);
            warn!(%err, "undo load failed");
            return UndoOutcome::failed(err.into(), Message::FailedToUndoLoadState);
        }
        info!("undid load state");
        UndoOutcome::Applied {
            message: Message::UndidLoadState.as_str().to_string(),
        }
    }

    /// Capture the live state into the RAM-resident slot. It reaches disk on the next
    /// [`SnapshotManager::flush_ram_state`].
    pub fn ram_save<H: StateHost + ?Sized>(
        &mut self,
        host: &mut H,
        path: impl Into<PathBuf>,
    ) -> Result<()> {
        let data = capture_state(host)?;
        self.slots.ram.store(StateBuffer::new(data, path));
        Ok(())
    }

    /// Apply the RAM-resident state. Returns `false` when the slot is empty.
    pub fn ram_load<H: StateHost + ?Sized>(&mut self, host: &mut H) -> Result<bool> {
        self.ensure_idle()?;
        let Some(buffer) = self.slots.ram.get() else {
            return Ok(false);
        };
        apply_state(
            host,
            &buffer.data,
            &mut self.slots.undo_load,
            self.guarded_regions.as_deref(),
        )?;
        Ok(true)
    }

    /// Start writing the RAM-resident state to its path if it has not been written yet. Returns
    /// `false` when nothing is pending or another task is active (the flush stays pending).
    pub fn flush_ram_state(&mut self) -> Result<bool> {
        if !self.slots.ram.is_pending() {
            return Ok(false);
        }
        if self.active.is_some() {
            debug!("state task active; RAM state flush deferred");
            return Ok(false);
        }
        let Some(buffer) = self.slots.ram.get() else {
            return Ok(false);
        };
        let task = Task::save(
            buffer.path.clone(),
            SaveSource::Bytes(buffer.data.clone()),
            self.muted_flags(),
            self.config.chunk_size,
        );
        self.push(task)?;
        self.slots.ram.mark_written();
        Ok(true)
    }

    /// Synchronous, silent save of the live state. Used at session end, where nothing will poll.
    pub fn autosave<H: StateHost + ?Sized>(
        &mut self,
        host: &mut H,
        path: impl AsRef<Path>,
    ) -> Result<()> {
        self.ensure_idle()?;
        let flags = TaskFlags {
            autosave: true,
            ..self.muted_flags()
        };
        let task = Task::save(
            path.as_ref(),
            SaveSource::Capture,
            flags,
            self.config.chunk_size,
        );
        let (_, outcome) = task.run_to_completion(host);
        match outcome {
            TaskOutcome::Saved => Ok(()),
            TaskOutcome::Failed(err) => Err(err),
            TaskOutcome::Loaded { .. } | TaskOutcome::Cancelled => Err(StateError::Cancelled),
        }
    }

    /// Synchronous load-and-apply, with the same undo capture and SRAM guard as [`Self::load`].
    pub fn load_now<H: StateHost + ?Sized>(
        &mut self,
        host: &mut H,
        path: impl AsRef<Path>,
    ) -> Result<()> {
        self.ensure_idle()?;
        let task = Task::load(
            path.as_ref(),
            LoadPurpose::Apply,
            self.muted_flags(),
            self.config.chunk_size,
        );
        let (_, outcome) = task.run_to_completion(host);
        match outcome {
            TaskOutcome::Loaded { data, .. } => apply_state(
                host,
                &data,
                &mut self.slots.undo_load,
                self.guarded_regions.as_deref(),
            ),
            TaskOutcome::Failed(err) => Err(err),
            TaskOutcome::Saved | TaskOutcome::Cancelled => Err(StateError::Cancelled),
        }
    }

    /// Session start: pick up the last used slot and the auto state, as configured.
    pub fn begin_session<H: StateHost + ?Sized>(&mut self, host: &mut H) -> SessionStart {
        let mut start = SessionStart::default();
        let Some(paths) = self.paths.clone() else {
            return start;
        };

        if self.config.auto_index {
            match paths.last_used_slot() {
                Ok(slot) => {
                    info!(slot, "found last state slot");
                    start.state_slot = Some(slot);
                }
                Err(err) => warn!(%err, "could not scan state directory for slots"),
            }
        }

        if self.config.auto_load {
            let auto = paths.auto_path();
            if auto.exists() {
                let loaded = match self.load_now(host, &auto) {
                    Ok(()) => true,
                    Err(err) => {
                        warn!(path = %auto.display(), %err, "auto-load failed");
                        false
                    }
                };
                let message = if loaded {
                    Message::AutoLoadSucceeded
                } else {
                    Message::AutoLoadFailed
                };
                start.auto_loaded = Some(loaded);
                start.message = Some(message.with_path(&auto));
            }
        }

        start
    }

    /// Session end: finish the active task, write a pending RAM-resident state, write the auto
    /// state if configured, and drop all buffered undo generations.
    pub fn end_session<H: StateHost + ?Sized>(&mut self, host: &mut H) -> Result<()> {
        while self.active.is_some() {
            if let Some(TaskEvent::Failed { path, error, .. }) = self.poll(host) {
                warn!(path = %path.display(), %error, "state task failed during shutdown");
            }
        }

        if self.flush_ram_state()? {
            while self.active.is_some() {
                self.poll(host);
            }
        }

        let mut result = Ok(());
        if self.config.auto_save {
            if let Some(path) = self.paths.as_ref().map(StatePaths::auto_path) {
                result = self.autosave(host, &path);
                match &result {
                    Ok(()) => info!(path = %path.display(), "auto save succeeded"),
                    Err(err) => warn!(path = %path.display(), %err, "auto save failed"),
                }
            }
        }

        self.slots.reset();
        result
    }

    /// Advance the active task by one bounded step. `None` when idle.
    pub fn poll<H: StateHost + ?Sized>(&mut self, host: &mut H) -> Option<TaskEvent> {
        let task = self.active.as_mut()?;
        let kind = task.kind();
        match task.poll(host) {
            TaskPoll::Pending { percent } => Some(TaskEvent::Progress { kind, percent }),
            TaskPoll::Done(outcome) => {
                let task = self.active.take()?;
                Some(self.complete(host, task, outcome))
            }
        }
    }

    fn complete<H: StateHost + ?Sized>(
        &mut self,
        host: &mut H,
        task: Task,
        outcome: TaskOutcome,
    ) -> TaskEvent {
        let kind = task.kind();
        let flags = task.flags();
        let path = task.path().to_path_buf();

        match outcome {
            TaskOutcome::Saved => {
                let message = (!flags.mute).then(|| {
                    let msg = if flags.undo {
                        Message::UndoingSaveState
                    } else {
                        Message::SavedState
                    };
                    msg.with_path(&path)
                });
                TaskEvent::Completed {
                    kind,
                    path,
                    message,
                    request_thumbnail: flags.thumbnail && !flags.autosave,
                }
            }
            TaskOutcome::Loaded { data, purpose } => {
                self.finish_load(host, path, flags, data, purpose)
            }
            TaskOutcome::Failed(error) => {
                if let LoadPurpose::BackupThenSave {
                    data,
                    flags: save_flags,
                } = task.into_purpose()
                {
                    warn!(path = %path.display(), %error, "could not back up existing state; saving without undo");
                    return self.push_followup_save(path, data, save_flags);
                }
                let message = (!flags.mute).then(|| failure_message(kind, flags, &error, &path));
                TaskEvent::Failed {
                    kind,
                    path,
                    error,
                    message,
                }
            }
            TaskOutcome::Cancelled => {
                // An overwrite is cancelled while still reading its backup.
                let (kind, mute) = match task.purpose() {
                    LoadPurpose::BackupThenSave {
                        flags: save_flags, ..
                    } => (TaskKind::Save, save_flags.mute),
                    _ => (kind, flags.mute),
                };
                let message = match kind {
                    TaskKind::Save => Message::StateSaveCancelled,
                    TaskKind::Load => Message::StateLoadCancelled,
                };
                TaskEvent::Cancelled {
                    kind,
                    path,
                    message: (!mute).then(|| message.as_str().to_string()),
                }
            }
        }
    }

    fn finish_load<H: StateHost + ?Sized>(
        &mut self,
        host: &mut H,
        path: PathBuf,
        flags: TaskFlags,
        data: Vec<u8>,
        purpose: LoadPurpose,
    ) -> TaskEvent {
        match purpose {
            LoadPurpose::Apply => {
                match apply_state(
                    host,
                    &data,
                    &mut self.slots.undo_load,
                    self.guarded_regions.as_deref(),
                ) {
                    Ok(()) => TaskEvent::Completed {
                        kind: TaskKind::Load,
                        message: (!flags.mute).then(|| Message::LoadedState.with_path(&path)),
                        path,
                        request_thumbnail: false,
                    },
                    Err(error) => TaskEvent::Failed {
                        kind: TaskKind::Load,
                        message: (!flags.mute)
                            .then(|| failure_message(TaskKind::Load, flags, &error, &path)),
                        path,
                        error,
                    },
                }
            }
            LoadPurpose::StageUndoSave => {
                self.slots.undo_save.set(StateBuffer::new(data, path.clone()));
                TaskEvent::Completed {
                    kind: TaskKind::Load,
                    path,
                    message: None,
                    request_thumbnail: false,
                }
            }
            LoadPurpose::BackupThenSave {
                data: pending,
                flags: save_flags,
            } => {
                self.slots.undo_save.set(StateBuffer::new(data, path.clone()));
                self.push_followup_save(path, pending, save_flags)
            }
        }
    }

    fn push_followup_save(&mut self, path: PathBuf, data: Vec<u8>, flags: TaskFlags) -> TaskEvent {
        let task = Task::save(
            path.clone(),
            SaveSource::Bytes(data),
            flags,
            self.config.chunk_size,
        );
        match self.push(task) {
            Ok(()) => TaskEvent::Progress {
                kind: TaskKind::Save,
                percent: 0,
            },
            Err(error) => TaskEvent::Failed {
                kind: TaskKind::Save,
                message: (!flags.mute)
                    .then(|| failure_message(TaskKind::Save, flags, &error, &path)),
                path,
                error,
            },
        }
    }
}

/// Capture the pre-load state into `undo_load`, then apply `data` through the SRAM guard.
///
/// The previous undo-load generation is only replaced once the new capture has succeeded.
fn apply_state<H: StateHost + ?Sized>(
    host: &mut H,
    data: &[u8],
    undo_load: &mut BufferSlot,
    regions: Option<&[MemoryRegion]>,
) -> Result<()> {
    match capture_state(host) {
        Ok(current) => undo_load.set(StateBuffer::new(current, RAM_STATE_PATH)),
        Err(StateError::Snapshot(SnapshotError::Unsupported)) => {
            return Err(SnapshotError::Unsupported.into());
        }
        Err(err) => warn!(%err, "could not capture state before load; previous undo state kept"),
    }
    guarded_deserialize(host, data, regions)?;
    Ok(())
}

fn failure_message(kind: TaskKind, flags: TaskFlags, error: &StateError, path: &Path) -> String {
    if matches!(error, StateError::Snapshot(SnapshotError::Unsupported)) {
        return Message::CoreDoesNotSupportStates.as_str().to_string();
    }
    match (kind, flags.undo) {
        (TaskKind::Save, true) => Message::FailedToUndoSaveState.as_str().to_string(),
        (TaskKind::Save, false) => Message::FailedToSaveState.with_path(path),
        (TaskKind::Load, _) => Message::FailedToLoadState.with_path(path),
    }
}
