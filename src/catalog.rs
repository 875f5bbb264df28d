use crate::list_model::{ListEvent, ListModel};
use crate::model::{Entry, EntryId};
use std::collections::HashMap;

/// Ordered set of live entries; list order is the display order.
#[derive(Debug, Default)]
pub struct Catalog {
    order: ListModel<EntryId>,
    entries: HashMap<EntryId, Entry>,
    next_id: u64,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn add(&mut self, entry: Entry) -> EntryId {
        let id = EntryId(self.next_id);
        self.next_id += 1;
        self.entries.insert(id, entry);
        self.order.push(id);
        id
    }

    /// Takes the entry out of the catalog; dropping the result destroys it.
    pub fn remove(&mut self, id: EntryId) -> Option<Entry> {
        self.order.remove(&id)?;
        self.entries.remove(&id)
    }

    pub fn get(&self, id: EntryId) -> Option<&Entry> {
        self.entries.get(&id)
    }

    pub fn get_mut(&mut self, id: EntryId) -> Option<&mut Entry> {
        self.entries.get_mut(&id)
    }

    pub fn contains(&self, id: EntryId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn ids(&self) -> &[EntryId] {
        self.order.as_slice()
    }

    pub fn id_at(&self, index: usize) -> Option<EntryId> {
        self.order.get(index).copied()
    }

    pub fn index_of(&self, id: EntryId) -> Option<usize> {
        self.order.index_of(&id)
    }

    /// Entries in display order.
    pub fn iter(&self) -> impl Iterator<Item = (EntryId, &Entry)> + '_ {
        self.order
            .iter()
            .filter_map(move |id| self.entries.get(id).map(|entry| (*id, entry)))
    }

    /// First entry whose descriptor path or file name equals `path`.
    pub fn find_by_path(&self, path: &str) -> Option<EntryId> {
        self.iter()
            .find(|(_, entry)| entry.matches_path(path))
            .map(|(id, _)| id)
    }

    pub fn index_of_path(&self, path: &str) -> Option<usize> {
        self.find_by_path(path).and_then(|id| self.index_of(id))
    }

    /// Most recently added entry carrying `package_name`.
    pub fn find_by_package(&self, package_name: &str) -> Option<EntryId> {
        if package_name.is_empty() {
            return None;
        }
        self.order
            .iter()
            .rev()
            .find(|id| {
                self.entries
                    .get(id)
                    .is_some_and(|entry| entry.package_name() == package_name)
            })
            .copied()
    }

    pub fn move_entry(&mut self, from: usize, to: usize) -> bool {
        self.order.move_item(from, to)
    }

    pub(crate) fn order_mut(&mut self) -> &mut ListModel<EntryId> {
        &mut self.order
    }

    pub fn take_events(&mut self) -> Vec<ListEvent<EntryId>> {
        self.order.take_events()
    }
}
