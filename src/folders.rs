//! User-organised folder tree over the flat catalog.
//!
//! Folders live in an arena keyed by [`FolderId`]; a folder's `parent` is a
//! plain id used for lookups only. Entries are referenced by [`EntryId`] and
//! owned by the [`Catalog`].

use crate::catalog::Catalog;
use crate::error::{Error, Result};
use crate::list_model::{ListEvent, ListModel};
use crate::model::{EntryId, NOT_UPDATING};
use crate::positions::write_atomically;
use crate::sources::desktop::{DESKTOP_ENTRY_GROUP, parse_group};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_FOLDER_ICON: &str = "icon-launcher-folder-01";
const DEFAULT_DOCUMENT: &str = "applications.json";
const ROOT_TITLE: &str = "Applications";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FolderId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FolderItem {
    Entry(EntryId),
    Folder(FolderId),
}

#[derive(Debug)]
pub struct Folder {
    title: String,
    icon_id: String,
    directory_file: Option<PathBuf>,
    parent: Option<FolderId>,
    items: ListModel<FolderItem>,
}

impl Folder {
    fn new(title: &str, parent: Option<FolderId>) -> Self {
        Self {
            title: title.to_string(),
            icon_id: DEFAULT_FOLDER_ICON.to_string(),
            directory_file: None,
            parent,
            items: ListModel::new(),
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn icon_id(&self) -> &str {
        &self.icon_id
    }

    pub fn directory_file(&self) -> Option<&Path> {
        self.directory_file.as_deref()
    }

    pub fn parent(&self) -> Option<FolderId> {
        self.parent
    }

    pub fn items(&self) -> &[FolderItem] {
        self.items.as_slice()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// On-disk form of one folder.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FolderDocument {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<String>,
    #[serde(default)]
    pub items: Vec<DocumentItem>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum DocumentItem {
    Filename(String),
    Menu(FolderDocument),
}

pub fn read_document(path: &Path) -> Result<Option<FolderDocument>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(Error::io(path, e)),
    };
    serde_json::from_str(&content)
        .map(Some)
        .map_err(|source| Error::Json {
            path: path.to_path_buf(),
            source,
        })
}

pub struct FolderTree {
    folders: HashMap<FolderId, Folder>,
    root: FolderId,
    next_id: u64,
    state_dir: PathBuf,
    scope: Option<String>,
    save_needed: bool,
}

impl FolderTree {
    pub fn new(state_dir: &Path, scope: Option<String>) -> Self {
        let root = FolderId(0);
        let mut folders = HashMap::new();
        folders.insert(root, Folder::new(ROOT_TITLE, None));
        Self {
            folders,
            root,
            next_id: 1,
            state_dir: state_dir.to_path_buf(),
            scope,
            save_needed: false,
        }
    }

    pub fn root(&self) -> FolderId {
        self.root
    }

    pub fn folder(&self, id: FolderId) -> Option<&Folder> {
        self.folders.get(&id)
    }

    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    /// `<scope>.json`, or `applications.json` without a scope.
    pub fn document_path(&self) -> PathBuf {
        match &self.scope {
            Some(scope) => self.state_dir.join(format!("{}.json", scope)),
            None => self.state_dir.join(DEFAULT_DOCUMENT),
        }
    }

    pub fn request_save(&mut self) {
        self.save_needed = true;
    }

    /// Whether a structural change happened since last asked.
    pub fn take_save_needed(&mut self) -> bool {
        std::mem::take(&mut self.save_needed)
    }

    /// Drains pending change events of every folder.
    pub fn take_events(&mut self) -> Vec<(FolderId, ListEvent<FolderItem>)> {
        let mut events = Vec::new();
        for (id, folder) in &mut self.folders {
            events.extend(folder.items.take_events().into_iter().map(|e| (*id, e)));
        }
        events
    }

    fn alloc(&mut self, title: &str, parent: FolderId) -> FolderId {
        let id = FolderId(self.next_id);
        self.next_id += 1;
        self.folders.insert(id, Folder::new(title, Some(parent)));
        id
    }

    /// Wraps the item at `index` of `folder` into a new sub-folder placed at
    /// the same index. `index == len` creates an empty folder at the end.
    pub fn create_folder(&mut self, folder: FolderId, index: usize, name: &str) -> Option<FolderId> {
        let len = self.folders.get(&folder)?.len();
        if index > len {
            return None;
        }

        let child = self.alloc(name, folder);
        let parent = self.folders.get_mut(&folder)?;
        let item = parent.items.get(index).copied();
        parent.items.insert(index, FolderItem::Folder(child));
        if let Some(item) = item {
            parent.items.remove(&item);
            if let FolderItem::Folder(moved) = item {
                self.set_parent(moved, child);
            }
            if let Some(child_folder) = self.folders.get_mut(&child) {
                child_folder.items.push(item);
            }
        }

        debug!("Created folder {:?} {:?}", child, name);
        self.save_needed = true;
        Some(child)
    }

    fn set_parent(&mut self, folder: FolderId, parent: FolderId) {
        if let Some(f) = self.folders.get_mut(&folder) {
            f.parent = Some(parent);
        }
    }

    fn is_ancestor(&self, ancestor: FolderId, mut folder: FolderId) -> bool {
        loop {
            if folder == ancestor {
                return true;
            }
            match self.folders.get(&folder).and_then(|f| f.parent) {
                Some(parent) => folder = parent,
                None => return false,
            }
        }
    }

    /// Moves `item` into `folder` at `index`; a negative index appends.
    pub fn move_to_folder(&mut self, item: FolderItem, folder: FolderId, index: i32) -> bool {
        if !self.folders.contains_key(&folder) {
            return false;
        }
        if let FolderItem::Folder(moved) = item {
            if self.is_ancestor(moved, folder) {
                warn!("Cannot move folder {:?} into itself", moved);
                return false;
            }
        }

        if let Some(container) = self.find_container(item) {
            if let Some(source) = self.folders.get_mut(&container) {
                source.items.remove(&item);
            }
        }
        if let FolderItem::Folder(moved) = item {
            self.set_parent(moved, folder);
        }

        let Some(target) = self.folders.get_mut(&folder) else {
            return false;
        };
        match usize::try_from(index) {
            Ok(index) => target.items.insert(index, item),
            Err(_) => target.items.push(item),
        }
        self.save_needed = true;
        true
    }

    /// Removes `folder` from the tree. Children of a non-empty folder are
    /// handed to its parent.
    pub fn destroy_folder(&mut self, folder: FolderId) {
        if folder == self.root {
            warn!("Refusing to destroy the root folder");
            return;
        }
        let Some(removed) = self.folders.remove(&folder) else {
            return;
        };

        if !removed.is_empty() {
            warn!("Removing a folder that is not empty: {:?}", removed.title);
        }

        if let Some(parent) = removed.parent {
            let at = self
                .folders
                .get_mut(&parent)
                .and_then(|p| p.items.remove(&FolderItem::Folder(folder)));
            for (offset, item) in removed.items.iter().enumerate() {
                if let FolderItem::Folder(child) = item {
                    self.set_parent(*child, parent);
                }
                if let Some(p) = self.folders.get_mut(&parent) {
                    match at {
                        Some(at) => p.items.insert(at + offset, *item),
                        None => p.items.push(*item),
                    }
                }
            }
        }

        if let Some(path) = &removed.directory_file {
            if let Err(e) = fs::remove_file(path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("Cannot remove {:?}: {}", path, e);
                }
            }
        }
        self.save_needed = true;
    }

    /// The folder directly holding `item`, searched from the root down.
    pub fn find_container(&self, item: FolderItem) -> Option<FolderId> {
        let mut pending = vec![self.root];
        while let Some(id) = pending.pop() {
            let folder = self.folders.get(&id)?;
            for child in folder.items.iter() {
                if *child == item {
                    return Some(id);
                }
                if let FolderItem::Folder(sub) = child {
                    pending.push(*sub);
                }
            }
        }
        None
    }

    pub fn is_updating(&self, folder: FolderId, catalog: &Catalog) -> bool {
        self.folders.get(&folder).is_some_and(|f| {
            f.items.iter().any(|item| self.item_is_updating(*item, catalog))
        })
    }

    fn item_is_updating(&self, item: FolderItem, catalog: &Catalog) -> bool {
        match item {
            FolderItem::Entry(id) => catalog.get(id).is_some_and(|e| e.is_updating()),
            FolderItem::Folder(id) => self.is_updating(id, catalog),
        }
    }

    /// Mean progress of updating children. A child value outside `0..=100`
    /// is returned as is.
    pub fn updating_progress(&self, folder: FolderId, catalog: &Catalog) -> i32 {
        let Some(f) = self.folders.get(&folder) else {
            return NOT_UPDATING;
        };

        let mut count = 0;
        let mut total = 0;
        for item in f.items.iter().filter(|item| self.item_is_updating(**item, catalog)) {
            let progress = match *item {
                FolderItem::Entry(id) => catalog.get(id).map_or(NOT_UPDATING, |e| e.updating_progress()),
                FolderItem::Folder(id) => self.updating_progress(id, catalog),
            };
            if !(0..=100).contains(&progress) {
                return progress;
            }
            count += 1;
            total += progress;
        }

        if count == 0 { 0 } else { total / count }
    }

    pub fn set_title(&mut self, folder: FolderId, title: &str) {
        if let Some(f) = self.folders.get_mut(&folder) {
            if f.title != title {
                f.title = title.to_string();
                self.save_needed = true;
            }
        }
    }

    /// Sets the folder icon and records it in the folder's `.directory`
    /// file, creating one in the state directory when needed.
    pub fn set_icon_id(&mut self, folder: FolderId, icon: &str) -> Result<()> {
        let Some(f) = self.folders.get_mut(&folder) else {
            return Ok(());
        };
        if f.icon_id == icon {
            return Ok(());
        }
        f.icon_id = icon.to_string();
        self.save_directory_file(folder)
    }

    fn save_directory_file(&mut self, folder: FolderId) -> Result<()> {
        let existing = self.folders.get(&folder).and_then(|f| f.directory_file.clone());
        let path = match existing {
            Some(path) => path,
            None => {
                fs::create_dir_all(&self.state_dir).map_err(|e| Error::io(&self.state_dir, e))?;
                let file = tempfile::Builder::new()
                    .prefix("Folder")
                    .suffix(".directory")
                    .rand_bytes(6)
                    .tempfile_in(&self.state_dir)
                    .map_err(|e| Error::io(&self.state_dir, e))?;
                let (_, path) = file.keep().map_err(|source| Error::Persist {
                    path: self.state_dir.clone(),
                    source,
                })?;
                if let Some(f) = self.folders.get_mut(&folder) {
                    f.directory_file = Some(path.clone());
                }
                self.save_needed = true;
                path
            }
        };

        let mut values: BTreeMap<String, String> = fs::read_to_string(&path)
            .map(|content| parse_group(&content, DESKTOP_ENTRY_GROUP).into_iter().collect())
            .unwrap_or_default();
        if let Some(f) = self.folders.get(&folder) {
            values.insert("Icon".to_string(), f.icon_id.clone());
        }

        let mut content = format!("[{}]\n", DESKTOP_ENTRY_GROUP);
        for (key, value) in &values {
            let _ = writeln!(content, "{}={}", key, value);
        }
        write_atomically(&path, content.as_bytes())
    }

    /// Binds a `.directory` file (relative names live in the state
    /// directory) and takes the folder icon from it.
    pub fn load_directory_file(&mut self, folder: FolderId, filename: &str) {
        let path = if Path::new(filename).is_absolute() {
            PathBuf::from(filename)
        } else {
            self.state_dir.join(filename)
        };

        let icon = match fs::read_to_string(&path) {
            Ok(content) => parse_group(&content, DESKTOP_ENTRY_GROUP).remove("Icon"),
            Err(e) => {
                warn!("Failed to load .directory file {:?}: {}", path, e);
                None
            }
        };

        if let Some(f) = self.folders.get_mut(&folder) {
            f.directory_file = Some(path);
            if let Some(icon) = icon {
                f.icon_id = icon;
            }
        }
    }

    pub fn app_added(&mut self, id: EntryId) {
        let item = FolderItem::Entry(id);
        if self.find_container(item).is_some() {
            return;
        }
        if let Some(root) = self.folders.get_mut(&self.root) {
            root.items.push(item);
            self.save_needed = true;
        }
    }

    pub fn app_removed(&mut self, id: EntryId) {
        let item = FolderItem::Entry(id);
        if let Some(container) = self.find_container(item) {
            if let Some(folder) = self.folders.get_mut(&container) {
                folder.items.remove(&item);
                self.save_needed = true;
            }
        }
    }

    /// Mirrors catalog insertions and removals.
    pub fn sync(&mut self, events: &[ListEvent<EntryId>], catalog: &Catalog) {
        for event in events {
            match event {
                ListEvent::Inserted { item, .. } => self.app_added(*item),
                ListEvent::Removed { item, .. } => self.app_removed(*item),
                ListEvent::Moved { .. } => {}
                ListEvent::Reset => self.resync(catalog),
            }
        }
    }

    fn resync(&mut self, catalog: &Catalog) {
        let stale: Vec<EntryId> = self
            .entries()
            .into_iter()
            .filter(|id| !catalog.contains(*id))
            .collect();
        for id in stale {
            self.app_removed(id);
        }
        for id in catalog.ids().to_vec() {
            self.app_added(id);
        }
    }

    /// Every entry in the tree, depth first.
    pub fn entries(&self) -> Vec<EntryId> {
        let mut found = Vec::new();
        let mut pending = vec![self.root];
        while let Some(id) = pending.pop() {
            let Some(folder) = self.folders.get(&id) else {
                continue;
            };
            // reversed so sub-folders are visited in display order
            for item in folder.items.iter().rev() {
                match item {
                    FolderItem::Entry(entry) => found.push(*entry),
                    FolderItem::Folder(sub) => pending.push(*sub),
                }
            }
        }
        found
    }

    fn directory_reference(&self, path: &Path) -> String {
        match path.strip_prefix(&self.state_dir) {
            Ok(relative) => relative.to_string_lossy().into_owned(),
            Err(_) => path.to_string_lossy().into_owned(),
        }
    }

    pub fn to_document(&self, catalog: &Catalog) -> FolderDocument {
        self.folder_document(self.root, catalog)
    }

    fn folder_document(&self, id: FolderId, catalog: &Catalog) -> FolderDocument {
        let Some(folder) = self.folders.get(&id) else {
            return FolderDocument {
                name: String::new(),
                directory: None,
                items: Vec::new(),
            };
        };

        let items = folder
            .items
            .iter()
            .filter_map(|item| match item {
                FolderItem::Entry(entry) => catalog
                    .get(*entry)
                    .filter(|e| !e.is_temporary())
                    .map(|e| e.filename())
                    .filter(|name| !name.is_empty())
                    .map(DocumentItem::Filename),
                FolderItem::Folder(sub) => Some(DocumentItem::Menu(self.folder_document(*sub, catalog))),
            })
            .collect();

        FolderDocument {
            name: folder.title.clone(),
            directory: folder.directory_file.as_deref().map(|p| self.directory_reference(p)),
            items,
        }
    }

    pub fn save(&mut self, catalog: &Catalog) -> Result<()> {
        let path = self.document_path();
        let content = serde_json::to_string_pretty(&self.to_document(catalog))?;
        write_atomically(&path, content.as_bytes())?;
        info!("Saved folder document {:?}", path);
        Ok(())
    }

    fn reset(&mut self) {
        self.folders.clear();
        self.folders.insert(self.root, Folder::new(ROOT_TITLE, None));
    }

    /// Rebuilds the tree from the scope's document. Entries the document
    /// does not mention are appended to the root; a missing or unreadable
    /// document imports the whole catalog.
    pub fn load(&mut self, catalog: &Catalog) {
        self.reset();
        let path = self.document_path();
        let document = match read_document(&path) {
            Ok(document) => document,
            Err(e) => {
                warn!("Ignoring folder document: {}", e);
                None
            }
        };

        let mut loaded = HashSet::new();
        if let Some(document) = &document {
            self.build(document, catalog, &mut loaded);
            info!("Loaded folder document {:?}", path);
        } else {
            info!("No folder document at {:?}, importing catalog", path);
        }

        let mut imported = false;
        for id in catalog.ids() {
            if !loaded.contains(id) {
                if let Some(root) = self.folders.get_mut(&self.root) {
                    root.items.push(FolderItem::Entry(*id));
                    imported = true;
                }
            }
        }
        self.save_needed = imported;
    }

    fn build(&mut self, document: &FolderDocument, catalog: &Catalog, loaded: &mut HashSet<EntryId>) {
        if let Some(root) = self.folders.get_mut(&self.root) {
            root.title = document.name.clone();
        }
        if let Some(directory) = &document.directory {
            self.load_directory_file(self.root, directory);
        }

        let mut stack = vec![(self.root, document.items.iter())];
        loop {
            let Some((folder, items)) = stack.last_mut() else {
                break;
            };
            let folder = *folder;
            let Some(item) = items.next() else {
                stack.pop();
                continue;
            };

            match item {
                DocumentItem::Filename(name) => match catalog.find_by_path(name) {
                    Some(id) => {
                        if !loaded.insert(id) {
                            debug!("Duplicate folder reference {:?}", name);
                        } else if let Some(f) = self.folders.get_mut(&folder) {
                            f.items.push(FolderItem::Entry(id));
                        }
                    }
                    None => debug!("Folder references unknown entry {:?}", name),
                },
                DocumentItem::Menu(sub) => {
                    let child = self.alloc(&sub.name, folder);
                    if let Some(f) = self.folders.get_mut(&folder) {
                        f.items.push(FolderItem::Folder(child));
                    }
                    if let Some(directory) = &sub.directory {
                        self.load_directory_file(child, directory);
                    }
                    stack.push((child, sub.items.iter()));
                }
            }
        }
    }

    /// Switches to another scope's document.
    pub fn set_scope(&mut self, scope: Option<String>, catalog: &Catalog) {
        if self.scope == scope {
            return;
        }
        self.scope = scope;
        self.load(catalog);
    }

    /// Indented outline of the tree.
    pub fn dump(&self, catalog: &Catalog) -> String {
        let mut out = String::new();
        self.dump_folder(self.root, catalog, 0, &mut out);
        out
    }

    fn dump_folder(&self, id: FolderId, catalog: &Catalog, depth: usize, out: &mut String) {
        let Some(folder) = self.folders.get(&id) else {
            return;
        };
        let _ = writeln!(out, "{:indent$}[{}]", "", folder.title, indent = depth * 2);
        for item in folder.items.iter() {
            match item {
                FolderItem::Entry(entry) => {
                    if let Some(e) = catalog.get(*entry) {
                        let _ = writeln!(
                            out,
                            "{:indent$}{}  ({})",
                            "",
                            e.title(),
                            e.path_string(),
                            indent = (depth + 1) * 2
                        );
                    }
                }
                FolderItem::Folder(sub) => self.dump_folder(*sub, catalog, depth + 1, out),
            }
        }
    }
}
