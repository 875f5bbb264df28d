//! Directory watcher feeding the coalescer.
//!
//! The OS only reports future changes, so every newly watched directory is
//! scanned right away as if it had just changed; that scan is what discovers
//! pre-existing descriptors and icons.

use crate::coalescer::{Coalescer, FileBatch};
use crate::watcher::{ChangeKind, PathWatcher};
use log::debug;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub struct Monitor<W> {
    watcher: W,
    coalescer: Coalescer,
    known_files: HashMap<PathBuf, BTreeSet<String>>,
    directories: Vec<PathBuf>,
    icon_directories: Vec<PathBuf>,
}

#[derive(Clone, Copy)]
enum DirectoryKind {
    Descriptors,
    Icons,
}

impl<W: PathWatcher> Monitor<W> {
    pub fn new(watcher: W) -> Self {
        Self {
            watcher,
            coalescer: Coalescer::new(),
            known_files: HashMap::new(),
            directories: Vec::new(),
            icon_directories: Vec::new(),
        }
    }

    pub fn watcher(&self) -> &W {
        &self.watcher
    }

    pub fn watcher_mut(&mut self) -> &mut W {
        &mut self.watcher
    }

    pub fn directories(&self) -> &[PathBuf] {
        &self.directories
    }

    pub fn icon_directories(&self) -> &[PathBuf] {
        &self.icon_directories
    }

    pub fn set_directories(&mut self, dirs: Vec<PathBuf>) {
        self.replace_directories(dirs, DirectoryKind::Descriptors);
    }

    pub fn set_icon_directories(&mut self, dirs: Vec<PathBuf>) {
        self.replace_directories(dirs, DirectoryKind::Icons);
    }

    fn replace_directories(&mut self, new_dirs: Vec<PathBuf>, kind: DirectoryKind) {
        let current = match kind {
            DirectoryKind::Descriptors => &self.directories,
            DirectoryKind::Icons => &self.icon_directories,
        };
        let dropped: Vec<PathBuf> = current
            .iter()
            .filter(|dir| !new_dirs.contains(dir))
            .cloned()
            .collect();
        let added: Vec<PathBuf> = new_dirs
            .iter()
            .filter(|dir| !current.contains(dir))
            .cloned()
            .collect();

        match kind {
            DirectoryKind::Descriptors => self.directories = new_dirs,
            DirectoryKind::Icons => self.icon_directories = new_dirs,
        }

        for dir in dropped {
            self.watcher.unwatch(&dir);
            if !self.is_watched_directory(&dir) {
                self.forget_directory(&dir);
            }
        }

        for dir in added {
            self.watcher.watch(&dir);
            self.on_directory_changed(&dir);
        }
    }

    /// Reports everything known below `dir` as removed.
    fn forget_directory(&mut self, dir: &Path) {
        let Some(known) = self.known_files.remove(dir) else {
            return;
        };
        for name in known {
            let path = dir.join(name);
            self.watcher.unwatch(&path);
            self.coalescer.file_removed(&path);
        }
    }

    pub fn is_watched_directory(&self, path: &Path) -> bool {
        self.directories.iter().any(|d| d == path) || self.icon_directories.iter().any(|d| d == path)
    }

    /// Files currently known to exist in the descriptor directories.
    pub fn descriptor_files(&self) -> Vec<PathBuf> {
        self.directories
            .iter()
            .flat_map(|dir| {
                self.known_files
                    .get(dir)
                    .into_iter()
                    .flatten()
                    .map(move |name| dir.join(name))
            })
            .collect()
    }

    pub fn on_directory_changed(&mut self, dir: &Path) {
        let seen = list_directory(dir);
        let known = self.known_files.remove(dir).unwrap_or_default();

        let removed: Vec<PathBuf> = known.difference(&seen).map(|name| dir.join(name)).collect();
        let added: Vec<PathBuf> = seen.difference(&known).map(|name| dir.join(name)).collect();

        for path in &removed {
            self.watcher.unwatch(path);
            self.coalescer.file_removed(path);
        }
        for path in &added {
            self.watcher.watch(path);
            self.coalescer.file_added(path);
        }

        self.known_files.insert(dir.to_path_buf(), seen);
    }

    pub fn on_file_changed(&mut self, path: &Path) {
        self.coalescer.file_modified(path);
    }

    /// Routes a raw notification; returns whether it concerned a watched path.
    pub fn on_path_event(&mut self, path: &Path, kind: ChangeKind) -> bool {
        if self.is_watched_directory(path) {
            self.on_directory_changed(path);
            return true;
        }

        let Some(parent) = path.parent().filter(|p| self.is_watched_directory(p)) else {
            return false;
        };
        match kind {
            ChangeKind::Structure => {
                let parent = parent.to_path_buf();
                self.on_directory_changed(&parent);
            }
            ChangeKind::Content => {
                if self.is_known_file(path) {
                    self.on_file_changed(path);
                } else {
                    // a write can race ahead of the directory notification
                    let parent = parent.to_path_buf();
                    self.on_directory_changed(&parent);
                }
            }
        }
        true
    }

    fn is_known_file(&self, path: &Path) -> bool {
        let (Some(parent), Some(name)) = (path.parent(), path.file_name()) else {
            return false;
        };
        self.known_files
            .get(parent)
            .is_some_and(|names| names.contains(name.to_string_lossy().as_ref()))
    }

    /// Closes the holdback window.
    pub fn flush(&mut self) -> Option<FileBatch> {
        let batch = self.coalescer.flush()?;
        debug!("=========");
        debug!("Added: {:?}", batch.added);
        debug!("Modified: {:?}", batch.modified);
        debug!("Removed: {:?}", batch.removed);
        debug!("=========");
        Some(batch)
    }
}

/// Non-hidden entry names directly inside `dir`; empty when it is missing.
fn list_directory(dir: &Path) -> BTreeSet<String> {
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|name| !name.starts_with('.'))
        .collect()
}
