//! The flat launcher catalog and the reconciliation of filesystem batches
//! into catalog mutations.

use crate::catalog::Catalog;
use crate::coalescer::FileBatch;
use crate::config::SYSTEM_APPLICATIONS_DIR;
use crate::list_model::ListEvent;
use crate::model::{Entry, EntryId, NOT_UPDATING};
use crate::ordering::{self, OrderKey};
use crate::positions::PositionStore;
use crate::sources::DescriptorSource;
use log::{debug, info, warn};
use std::path::{Path, PathBuf};

const DESKTOP_SUFFIX: &str = "desktop";
const ICON_SUFFIX: &str = "png";

/// Symbolic icon id of an icon file: its name without directory and extension.
pub fn icon_id_from_filename(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

pub struct Launcher {
    catalog: Catalog,
    positions: PositionStore,
    source: Box<dyn DescriptorSource>,
    directories: Vec<PathBuf>,
    icon_directories: Vec<PathBuf>,
    categories: Vec<String>,
    temporaries: Vec<EntryId>,
    temporary_changed: bool,
}

impl Launcher {
    pub fn new(source: Box<dyn DescriptorSource>, positions: PositionStore) -> Self {
        Self {
            catalog: Catalog::new(),
            positions,
            source,
            directories: Vec::new(),
            icon_directories: Vec::new(),
            categories: Vec::new(),
            temporaries: Vec::new(),
            temporary_changed: false,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn entry(&self, id: EntryId) -> Option<&Entry> {
        self.catalog.get(id)
    }

    /// Category filter applied from the first scan on.
    pub fn with_categories(mut self, categories: Vec<String>) -> Self {
        self.categories = categories;
        self
    }

    pub fn source(&self) -> &dyn DescriptorSource {
        self.source.as_ref()
    }

    pub fn positions(&self) -> &PositionStore {
        &self.positions
    }

    pub fn directories(&self) -> &[PathBuf] {
        &self.directories
    }

    pub fn set_directories(&mut self, dirs: Vec<PathBuf>) {
        self.directories = dirs;
    }

    pub fn icon_directories(&self) -> &[PathBuf] {
        &self.icon_directories
    }

    pub fn set_icon_directories(&mut self, dirs: Vec<PathBuf>) {
        self.icon_directories = dirs;
    }

    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    /// Applies a new category filter by reprocessing every descriptor:
    /// existing entries are dropped and `descriptors` are re-added.
    pub fn set_categories(&mut self, categories: Vec<String>, descriptors: Vec<PathBuf>) {
        if self.categories == categories {
            return;
        }
        self.categories = categories;

        let removed = self
            .catalog
            .iter()
            .filter(|(_, entry)| !entry.is_temporary())
            .filter_map(|(_, entry)| entry.path().map(Path::to_path_buf))
            .collect();
        self.apply(&FileBatch {
            added: descriptors,
            modified: Vec::new(),
            removed,
        });
    }

    pub fn take_events(&mut self) -> Vec<ListEvent<EntryId>> {
        self.catalog.take_events()
    }

    /// Whether any entry gained or lost its temporary flag since last asked.
    pub fn take_temporary_changed(&mut self) -> bool {
        std::mem::take(&mut self.temporary_changed)
    }

    fn is_desktop_file(&self, path: &Path) -> bool {
        path.extension().is_some_and(|ext| ext == DESKTOP_SUFFIX)
            && self.directories.iter().any(|dir| path.starts_with(dir))
    }

    fn is_icon_file(&self, path: &Path) -> bool {
        path.is_absolute()
            && path.extension().is_some_and(|ext| ext == ICON_SUFFIX)
            && self.icon_directories.iter().any(|dir| path.starts_with(dir))
    }

    fn find_by_path(&self, path: &Path) -> Option<EntryId> {
        self.catalog.find_by_path(&path.to_string_lossy())
    }

    /// Processes one coalesced batch: removals, then additions, then
    /// modifications, then restores the persisted order.
    pub fn apply(&mut self, batch: &FileBatch) {
        let mut modified = batch.modified.clone();

        for path in &batch.removed {
            if self.is_desktop_file(path) {
                if let Some(id) = self.find_by_path(path) {
                    debug!("Removing launcher item: {:?}", path);
                    self.unset_temporary(id);
                    self.catalog.remove(id);
                }
            } else if self.is_icon_file(path) {
                self.update_items_with_icon(path, false);
            }
        }

        for path in &batch.added {
            if self.is_desktop_file(path) {
                self.descriptor_added(path, &mut modified);
            } else if self.is_icon_file(path) {
                self.update_items_with_icon(path, true);
            }
        }

        for path in &modified {
            if self.is_desktop_file(path) {
                self.descriptor_modified(path);
            } else if self.is_icon_file(path) {
                self.update_items_with_icon(path, true);
            }
        }

        self.reorder_items();
        self.save_positions();
    }

    fn descriptor_added(&mut self, path: &Path, modified: &mut Vec<PathBuf>) {
        let mut existing = self.find_by_path(path);

        // A freshly installed descriptor whose name does not follow the package
        // name still belongs to the one placeholder waiting for it.
        if existing.is_none() {
            if let Some(temp) = self.temporary_item_to_replace() {
                if self.is_visible_desktop_file(path) {
                    if let Some(entry) = self.catalog.get_mut(temp) {
                        warn!(
                            "Applying heuristics: {:?} is the launcher item for {}",
                            path,
                            entry.package_name()
                        );
                        entry.set_icon_filename(None);
                        entry.set_file_path(path, self.source.as_ref());
                        existing = Some(temp);
                    }
                }
            }
        }

        match existing {
            None => {
                debug!("Trying to add launcher item: {:?}", path);
                if let Some(id) = self.add_item_if_valid(path) {
                    self.bind_installed_icon(id);
                }
            }
            Some(id) => {
                warn!("Expected file arrives: {:?}", path);
                self.unset_temporary(id);
                // reload it in the modified pass
                modified.push(path.to_path_buf());
            }
        }
    }

    fn descriptor_modified(&mut self, path: &Path) {
        let Some(id) = self.find_by_path(path) else {
            // might have been hidden before
            if let Some(id) = self.add_item_if_valid(path) {
                self.bind_installed_icon(id);
            }
            return;
        };

        let source = self.source.as_ref();
        let Some(entry) = self.catalog.get_mut(id) else {
            return;
        };
        let is_valid = entry.is_still_valid(source);
        let needs_icon = entry.icon_filename().is_none();
        let still_visible = is_valid && self.passes_filter(id);

        if !still_visible {
            debug!("Launcher item no longer visible: {:?}", path);
            self.unset_temporary(id);
            self.catalog.remove(id);
        } else if needs_icon {
            self.bind_installed_icon(id);
        }
    }

    fn is_visible_desktop_file(&self, path: &Path) -> bool {
        let entry = Entry::from_descriptor(path, self.source.as_ref());
        entry.is_valid() && self.should_display(&entry)
    }

    /// With a category filter, membership alone decides visibility and
    /// overrides `NoDisplay`/`Hidden`.
    fn should_display(&self, entry: &Entry) -> bool {
        if self.categories.is_empty() {
            entry.should_display()
        } else {
            entry.categories().iter().any(|c| self.categories.contains(c))
        }
    }

    fn passes_filter(&self, id: EntryId) -> bool {
        self.catalog
            .get(id)
            .is_some_and(|e| e.is_temporary() || self.should_display(e))
    }

    fn add_item_if_valid(&mut self, path: &Path) -> Option<EntryId> {
        let entry = Entry::from_descriptor(path, self.source.as_ref());

        let is_valid = entry.is_valid();
        let should_display = self.should_display(&entry);

        if is_valid && should_display {
            Some(self.catalog.add(entry))
        } else {
            debug!(
                "Item {:?} {}",
                path,
                if !is_valid { "is not valid" } else { "should not be displayed" }
            );
            None
        }
    }

    /// Looks for `<icon dir>/<icon id>.png` and binds it when present.
    fn bind_installed_icon(&mut self, id: EntryId) {
        let Some(icon_id) = self.catalog.get(id).map(|e| e.original_icon_id().to_string()) else {
            return;
        };
        if icon_id.is_empty() || icon_id.contains('/') {
            return;
        }

        let found = self
            .icon_directories
            .iter()
            .map(|dir| dir.join(format!("{}.{}", icon_id, ICON_SUFFIX)))
            .find(|candidate| candidate.exists());
        if let Some(icon) = found {
            debug!("Loading existing icon: {:?}", icon);
            self.update_items_with_icon(&icon, true);
        }
    }

    /// Binds (`existing`) or unbinds an icon file on every entry it belongs to.
    fn update_items_with_icon(&mut self, path: &Path, existing: bool) {
        let icon_id = icon_id_from_filename(path);
        let path_text = path.to_string_lossy();
        debug!("update_items_with_icon: {:?} existing={} id={}", path, existing, icon_id);

        let ids = self.catalog.ids().to_vec();
        for id in ids {
            let Some(entry) = self.catalog.get_mut(id) else {
                continue;
            };
            if !existing {
                if entry.icon_filename() == Some(path) {
                    debug!("Icon vanished, removing: {:?}", path);
                    entry.set_icon_filename(None);
                }
                continue;
            }

            let current = entry.original_icon_id();
            if !current.is_empty() && (current == path_text || current == icon_id) {
                debug!("Icon was added or updated: {:?}", path);
                entry.set_icon_filename(Some(path.to_path_buf()));
            }
        }
    }

    fn set_temporary(&mut self, id: EntryId) {
        if let Some(entry) = self.catalog.get_mut(id) {
            if !entry.is_temporary() {
                entry.set_is_temporary(true);
                self.temporaries.push(id);
                self.temporary_changed = true;
            }
        }
    }

    fn unset_temporary(&mut self, id: EntryId) {
        if let Some(entry) = self.catalog.get_mut(id) {
            if entry.is_temporary() {
                entry.set_is_temporary(false);
                self.temporaries.retain(|t| *t != id);
                self.temporary_changed = true;
            }
        }
    }

    /// The single placeholder a new descriptor may stand in for: the only
    /// one, or else the only one that finished updating. Ambiguity yields
    /// `None`.
    fn temporary_item_to_replace(&self) -> Option<EntryId> {
        let candidates: Vec<EntryId> = self
            .temporaries
            .iter()
            .copied()
            .filter(|id| self.catalog.get(*id).is_some_and(|e| e.descriptor().is_none()))
            .collect();

        if let [only] = candidates.as_slice() {
            return Some(*only);
        }

        let mut finished = candidates
            .iter()
            .filter(|id| self.catalog.get(**id).is_some_and(|e| !e.is_updating()));
        match (finished.next(), finished.next()) {
            (Some(id), None) => Some(*id),
            _ => None,
        }
    }

    pub fn temporaries(&self) -> &[EntryId] {
        &self.temporaries
    }

    /// Applies the persisted order; returns how many moves it took.
    pub fn reorder_items(&mut self) -> usize {
        let keys = self
            .catalog
            .iter()
            .map(|(id, entry)| OrderKey {
                item: id,
                position: self.positions.position(&entry.path_string(), &entry.filename()),
                title: entry.title(),
            })
            .collect();
        let target = ordering::plan(keys);
        ordering::apply(self.catalog.order_mut(), &target)
    }

    pub fn save_positions(&mut self) {
        let keys: Vec<String> = self.catalog.iter().map(|(_, e)| e.path_string()).collect();
        if let Err(e) = self.positions.rewrite(keys) {
            warn!("Failed to save launcher positions: {}", e);
        }
    }

    /// Picks up an out-of-process edit of the position file.
    pub fn reload_positions(&mut self) {
        match self.positions.reload() {
            Ok(true) => {
                info!("Launcher positions changed on disk, reordering");
                if self.reorder_items() > 0 {
                    self.save_positions();
                }
            }
            Ok(false) => {}
            Err(e) => warn!("Failed to reload launcher positions: {}", e),
        }
    }

    pub fn set_scope(&mut self, scope: Option<String>) {
        if self.positions.scope() == scope.as_deref() {
            return;
        }
        self.positions.set_scope(scope);
        if self.reorder_items() > 0 {
            self.save_positions();
        }
    }

    /// User-driven reordering of the flat catalog.
    pub fn move_entry(&mut self, from: usize, to: usize) -> bool {
        if !self.catalog.move_entry(from, to) {
            return false;
        }
        self.save_positions();
        true
    }

    /// Conventional descriptor path for a package: `<dir>/<package>.desktop`
    /// in the first directory where it exists, else in the primary directory.
    pub fn descriptor_for_package(&self, package_name: &str) -> PathBuf {
        let file_name = format!("{}.{}", package_name, DESKTOP_SUFFIX);
        if let Some(found) = self
            .directories
            .iter()
            .map(|dir| dir.join(&file_name))
            .find(|path| path.exists())
        {
            return found;
        }

        let primary = self
            .directories
            .first()
            .cloned()
            .unwrap_or_else(|| PathBuf::from(SYSTEM_APPLICATIONS_DIR));
        primary.join(file_name)
    }

    pub fn package_in_model(&self, package_name: &str) -> Option<EntryId> {
        self.catalog.find_by_package(package_name).or_else(|| {
            let path = self.descriptor_for_package(package_name);
            self.find_by_path(&path)
        })
    }

    pub fn updating_started(
        &mut self,
        package_name: &str,
        label: &str,
        icon_path: &str,
        descriptor_path: &str,
        service_name: &str,
    ) -> Option<EntryId> {
        debug!(
            "Update started: {} {:?} {:?} {:?} via {}",
            package_name, label, icon_path, descriptor_path, service_name
        );

        let descriptor = if descriptor_path.is_empty() {
            self.descriptor_for_package(package_name)
        } else {
            PathBuf::from(descriptor_path)
        };

        let mut item = self.find_by_path(&descriptor).or_else(|| {
            self.temporaries.iter().copied().find(|id| {
                self.catalog
                    .get(*id)
                    .is_some_and(|e| e.package_name() == package_name)
            })
        });

        if let Some(id) = item.filter(|id| self.catalog.get(*id).is_some_and(Entry::is_temporary)) {
            let watched = self.is_desktop_file(&descriptor);
            let source = self.source.as_ref();
            if let Some(entry) = self.catalog.get_mut(id) {
                if !label.is_empty() {
                    entry.set_custom_title(label);
                }
                if !icon_path.is_empty() {
                    entry.set_icon_filename(Some(PathBuf::from(icon_path)));
                }
                // only follow descriptor paths the monitor will report on
                if watched {
                    entry.set_file_path(&descriptor, source);
                }
            }
            if descriptor.exists() {
                self.unset_temporary(id);
            }
        }

        if item.is_none() && self.is_desktop_file(&descriptor) && !descriptor.exists() {
            let entry = Entry::placeholder(
                package_name,
                label,
                icon_path,
                Some(&descriptor),
                self.source.as_ref(),
            );
            let id = self.catalog.add(entry);
            self.set_temporary(id);
            item = Some(id);
        }

        let id = item?;
        if let Some(entry) = self.catalog.get_mut(id) {
            entry.set_updating_progress(NOT_UPDATING);
            entry.set_is_updating(true);
            entry.set_package_name(package_name);
        }
        Some(id)
    }

    pub fn updating_progress(&mut self, package_name: &str, progress: i32) -> bool {
        debug!("Update progress: {} {}", package_name, progress);
        let Some(entry) = self
            .package_in_model(package_name)
            .and_then(|id| self.catalog.get_mut(id))
        else {
            warn!("Package not found in model: {}", package_name);
            return false;
        };
        entry.set_updating_progress(progress);
        entry.set_is_updating(true);
        true
    }

    /// Returns whether a temporary entry finished, i.e. whether
    /// [`Launcher::remove_temporary_launchers`] should be scheduled.
    pub fn updating_finished(&mut self, package_name: &str) -> bool {
        debug!("Update finished: {}", package_name);
        let Some(entry) = self
            .package_in_model(package_name)
            .and_then(|id| self.catalog.get_mut(id))
        else {
            warn!("Package not found in model: {}", package_name);
            return false;
        };
        entry.set_is_updating(false);
        entry.set_updating_progress(NOT_UPDATING);
        entry.set_package_name("");
        entry.is_temporary()
    }

    /// Drops every temporary entry that is not updating right now.
    pub fn remove_temporary_launchers(&mut self) -> usize {
        let idle: Vec<EntryId> = self
            .temporaries
            .iter()
            .copied()
            .filter(|id| self.catalog.get(*id).is_some_and(|e| !e.is_updating()))
            .collect();

        for id in &idle {
            debug!("Removing temporary launcher {}", id);
            self.unset_temporary(*id);
            self.catalog.remove(*id);
        }
        idle.len()
    }

    pub fn notify_launching(&mut self, path: &str) -> Option<EntryId> {
        let id = self.catalog.find_by_path(path);
        match id.and_then(|id| self.catalog.get_mut(id)) {
            Some(entry) => entry.set_is_launching(true),
            None => warn!("No launcher item found for {:?}", path),
        }
        id
    }

    pub fn set_launching(&mut self, id: EntryId, value: bool) {
        if let Some(entry) = self.catalog.get_mut(id) {
            entry.set_is_launching(value);
        }
    }
}
