//! Explicitly assigned list of launchers, independent of directory scanning.

use crate::model::Entry;
use crate::sources::DescriptorSource;
use log::debug;
use std::path::{Path, PathBuf};

#[derive(Default)]
pub struct WatchedLaunchers {
    entries: Vec<Entry>,
}

impl WatchedLaunchers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn file_paths(&self) -> Vec<PathBuf> {
        self.entries
            .iter()
            .filter_map(|e| e.path().map(Path::to_path_buf))
            .collect()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.position(path).is_some()
    }

    fn position(&self, path: &Path) -> Option<usize> {
        self.entries.iter().position(|e| e.path() == Some(path))
    }

    /// Makes the list follow `paths` (duplicates and invalid descriptors
    /// skipped), reusing existing entries. Returns whether the list changed.
    pub fn set_file_paths(&mut self, paths: &[PathBuf], source: &dyn DescriptorSource) -> bool {
        let before = self.file_paths();
        let mut next = 0;

        for path in paths {
            if self.entries[..next].iter().any(|e| e.path() == Some(path.as_path())) {
                continue;
            }

            match self.entries[next..]
                .iter()
                .position(|e| e.path() == Some(path.as_path()))
            {
                Some(offset) => {
                    let entry = self.entries.remove(next + offset);
                    self.entries.insert(next, entry);
                    next += 1;
                }
                None => {
                    let entry = Entry::from_descriptor(path, source);
                    if entry.is_valid() {
                        self.entries.insert(next, entry);
                        next += 1;
                    } else {
                        debug!("Skipping invalid watched launcher {:?}", path);
                    }
                }
            }
        }

        self.entries.truncate(next);
        self.file_paths() != before
    }

    /// Drops a launcher whose file went away.
    pub fn file_removed(&mut self, path: &Path) -> bool {
        match self.position(path) {
            Some(index) => {
                self.entries.remove(index);
                true
            }
            None => false,
        }
    }

    /// Reloads a launcher; one that became invalid is dropped.
    pub fn file_changed(&mut self, path: &Path, source: &dyn DescriptorSource) -> bool {
        let Some(index) = self.position(path) else {
            return false;
        };
        if !self.entries[index].is_still_valid(source) {
            self.entries.remove(index);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::DesktopFileParser;
    use std::fs;

    fn write(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(format!("{}.desktop", name));
        fs::write(
            &path,
            format!("[Desktop Entry]\nType=Application\nName={}\nExec={}\n", name, name),
        )
        .unwrap();
        path
    }

    #[test]
    fn follows_assigned_paths() {
        let dir = tempfile::tempdir().unwrap();
        let source = DesktopFileParser::default();
        let a = write(dir.path(), "a");
        let b = write(dir.path(), "b");
        let missing = dir.path().join("missing.desktop");

        let mut list = WatchedLaunchers::new();
        assert!(list.set_file_paths(&[a.clone(), b.clone(), a.clone(), missing], &source));
        assert_eq!(list.file_paths(), vec![a.clone(), b.clone()]);

        assert!(!list.set_file_paths(&[a.clone(), b.clone()], &source));
        assert!(list.set_file_paths(&[b.clone()], &source));
        assert_eq!(list.file_paths(), vec![b]);
    }

    #[test]
    fn removed_or_broken_files_leave_the_list() {
        let dir = tempfile::tempdir().unwrap();
        let source = DesktopFileParser::default();
        let a = write(dir.path(), "a");
        let b = write(dir.path(), "b");
        let mut list = WatchedLaunchers::new();
        list.set_file_paths(&[a.clone(), b.clone()], &source);

        fs::write(&b, "[Desktop Entry]\nType=Application\n").unwrap();
        assert!(list.file_changed(&b, &source));
        assert!(list.file_removed(&a));
        assert!(list.is_empty());
        assert!(!list.file_removed(&a));
    }
}
