//! Buffers raw add/modify/remove notifications until the holdback window
//! closes, so that one physical change yields one classification.

use std::path::{Path, PathBuf};

/// One flushed holdback window. A path appears in at most one list.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FileBatch {
    pub added: Vec<PathBuf>,
    pub modified: Vec<PathBuf>,
    pub removed: Vec<PathBuf>,
}

impl FileBatch {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.removed.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct Coalescer {
    pending: FileBatch,
}

impl Coalescer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn file_added(&mut self, path: &Path) {
        self.pending.modified.retain(|p| p != path);
        if let Some(pos) = self.pending.removed.iter().position(|p| p == path) {
            // vanished and re-appeared within the window
            self.pending.removed.remove(pos);
        } else if !self.pending.added.iter().any(|p| p == path) {
            self.pending.added.push(path.to_path_buf());
        }
    }

    pub fn file_removed(&mut self, path: &Path) {
        self.pending.modified.retain(|p| p != path);
        if let Some(pos) = self.pending.added.iter().position(|p| p == path) {
            // appeared and vanished within the window
            self.pending.added.remove(pos);
        } else if !self.pending.removed.iter().any(|p| p == path) {
            self.pending.removed.push(path.to_path_buf());
        }
    }

    pub fn file_modified(&mut self, path: &Path) {
        if !self.pending.modified.iter().any(|p| p == path) {
            self.pending.modified.push(path.to_path_buf());
        }
    }

    pub fn is_idle(&self) -> bool {
        self.pending.is_empty()
    }

    /// Closes the window. Modifications superseded by an add or remove of
    /// the same path are dropped; `None` when nothing is left to report.
    pub fn flush(&mut self) -> Option<FileBatch> {
        let FileBatch { added, modified, removed } = &mut self.pending;
        modified.retain(|p| !added.contains(p) && !removed.contains(p));

        if self.pending.is_empty() {
            return None;
        }
        Some(std::mem::take(&mut self.pending))
    }
}
