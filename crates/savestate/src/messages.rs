use std::path::Path;

/// User-visible notification keys. Hosts localize by key; [`Message::as_str`] is the English
/// table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Message {
    SavedState,
    LoadedState,
    FailedToSaveState,
    FailedToLoadState,
    UndoingSaveState,
    FailedToUndoSaveState,
    UndidLoadState,
    FailedToUndoLoadState,
    NoStateToUndo,
    CoreDoesNotSupportStates,
    AutoLoadSucceeded,
    AutoLoadFailed,
    StateSaveCancelled,
    StateLoadCancelled,
}

impl Message {
    pub fn as_str(self) -> &'static str {
        match self {
            Message::SavedState => "Saved state to",
            Message::LoadedState => "Loaded state from",
            Message::FailedToSaveState => "Failed to save state to",
            Message::FailedToLoadState => "Failed to load state from",
            Message::UndoingSaveState => "Restored save state",
            Message::FailedToUndoSaveState => "Failed to undo save state.",
            Message::UndidLoadState => "Undid load state.",
            Message::FailedToUndoLoadState => "Failed to undo load state.",
            Message::NoStateToUndo => "No state to undo.",
            Message::CoreDoesNotSupportStates => "Core does not support save states.",
            Message::AutoLoadSucceeded => "Auto-loaded state from",
            Message::AutoLoadFailed => "Failed to auto-load state from",
            Message::StateSaveCancelled => "Save state cancelled.",
            Message::StateLoadCancelled => "Load state cancelled.",
        }
    }

    /// `<text> "<path>".`, the shape used for every path-bearing notification.
    pub fn with_path(self, path: &Path) -> String {
        format!("{} \"{}\".", self.as_str(), path.display())
    }
}

impl core::fmt::Display for Message {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}
