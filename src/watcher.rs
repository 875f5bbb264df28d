use crate::error::Result;
use log::{debug, warn};
use notify::event::ModifyKind;
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// OS-level registration of paths for change notification.
pub trait PathWatcher {
    fn watch(&mut self, path: &Path);
    fn unwatch(&mut self, path: &Path);
}

/// How a raw notification affects the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// Directory listing may have changed (create, delete, rename).
    Structure,
    /// File content or metadata changed in place.
    Content,
}

pub fn classify(kind: &EventKind) -> Option<ChangeKind> {
    match kind {
        EventKind::Create(_) | EventKind::Remove(_) => Some(ChangeKind::Structure),
        EventKind::Modify(ModifyKind::Name(_)) => Some(ChangeKind::Structure),
        EventKind::Modify(_) => Some(ChangeKind::Content),
        _ => None,
    }
}

/// `notify` backend; events are forwarded into the event loop's channel.
pub struct NotifyWatcher {
    inner: RecommendedWatcher,
}

impl NotifyWatcher {
    pub fn new(tx: calloop::channel::Sender<notify::Event>) -> Result<Self> {
        let inner = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            match res {
                Ok(event) => {
                    let _ = tx.send(event);
                }
                Err(e) => warn!("Filesystem watcher error: {}", e),
            }
        })?;
        Ok(Self { inner })
    }
}

impl PathWatcher for NotifyWatcher {
    fn watch(&mut self, path: &Path) {
        if let Err(e) = self.inner.watch(path, RecursiveMode::NonRecursive) {
            debug!("Cannot watch {:?}: {}", path, e);
        }
    }

    fn unwatch(&mut self, path: &Path) {
        if let Err(e) = self.inner.unwatch(path) {
            debug!("Cannot unwatch {:?}: {}", path, e);
        }
    }
}

/// Bookkeeping-only watcher: remembers what would be watched, delivers
/// nothing. Used for one-shot scans and tests.
#[derive(Debug, Default)]
pub struct WatchList {
    paths: BTreeSet<PathBuf>,
}

impl WatchList {
    pub fn is_watched(&self, path: &Path) -> bool {
        self.paths.contains(path)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

impl PathWatcher for WatchList {
    fn watch(&mut self, path: &Path) {
        self.paths.insert(path.to_path_buf());
    }

    fn unwatch(&mut self, path: &Path) {
        self.paths.remove(path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, RemoveKind, RenameMode};

    #[test]
    fn classifies_listing_and_content_changes() {
        assert_eq!(classify(&EventKind::Create(CreateKind::File)), Some(ChangeKind::Structure));
        assert_eq!(classify(&EventKind::Remove(RemoveKind::Any)), Some(ChangeKind::Structure));
        assert_eq!(
            classify(&EventKind::Modify(ModifyKind::Name(RenameMode::To))),
            Some(ChangeKind::Structure)
        );
        assert_eq!(
            classify(&EventKind::Modify(ModifyKind::Data(DataChange::Content))),
            Some(ChangeKind::Content)
        );
        assert_eq!(classify(&EventKind::Any), None);
    }

    #[test]
    fn watch_list_tracks_registrations() {
        let mut list = WatchList::default();
        list.watch(Path::new("/a"));
        list.watch(Path::new("/a"));
        assert_eq!(list.len(), 1);
        list.unwatch(Path::new("/a"));
        assert!(list.is_empty());
    }
}
