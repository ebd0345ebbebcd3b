use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Slot file naming around one base state path (e.g. `saves/game.state`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatePaths {
    base: PathBuf,
}

impl StatePaths {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    fn with_suffix(&self, suffix: &str) -> PathBuf {
        let mut name: OsString = self.base.clone().into_os_string();
        name.push(suffix);
        PathBuf::from(name)
    }

    /// Slot 0 is the base path, positive slots append the number, negative slots mean auto.
    pub fn slot_path(&self, slot: i32) -> PathBuf {
        match slot {
            0 => self.base.clone(),
            n if n > 0 => self.with_suffix(&n.to_string()),
            _ => self.auto_path(),
        }
    }

    pub fn auto_path(&self) -> PathBuf {
        self.with_suffix(".auto")
    }

    /// Highest numbered slot present next to the base path, or 0 when there is none.
    pub fn last_used_slot(&self) -> io::Result<u32> {
        let dir = match self.base.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        let Some(stem) = self.base.file_name().and_then(|name| name.to_str()) else {
            return Ok(0);
        };

        let mut max_slot = 0;
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            let Some(rest) = name.strip_prefix(stem) else {
                continue;
            };
            let digits_start = rest
                .rfind(|c: char| !c.is_ascii_digit())
                .map_or(0, |idx| idx + 1);
            if let Ok(slot) = rest[digits_start..].parse::<u32>() {
                max_slot = max_slot.max(slot);
            }
        }
        Ok(max_slot)
    }
}
