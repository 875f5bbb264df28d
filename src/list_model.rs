//! Ordered collection that records every structural change.
//!
//! Owners drain the recorded [`ListEvent`]s after a mutation pass and forward
//! them to whoever mirrors the list (folder tree, UI layer).

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListEvent<T> {
    Inserted { index: usize, item: T },
    Removed { index: usize, item: T },
    Moved { from: usize, to: usize, item: T },
    Reset,
}

#[derive(Debug, Clone)]
pub struct ListModel<T> {
    items: Vec<T>,
    events: Vec<ListEvent<T>>,
}

impl<T> Default for ListModel<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            events: Vec::new(),
        }
    }
}

impl<T: Clone + PartialEq> ListModel<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    pub fn contains(&self, item: &T) -> bool {
        self.items.contains(item)
    }

    pub fn index_of(&self, item: &T) -> Option<usize> {
        self.items.iter().position(|i| i == item)
    }

    pub fn push(&mut self, item: T) {
        let index = self.items.len();
        self.insert(index, item);
    }

    /// Inserts at `index`, clamped to the end of the list.
    pub fn insert(&mut self, index: usize, item: T) {
        let index = index.min(self.items.len());
        self.items.insert(index, item.clone());
        self.events.push(ListEvent::Inserted { index, item });
    }

    pub fn remove_at(&mut self, index: usize) -> Option<T> {
        if index >= self.items.len() {
            return None;
        }
        let item = self.items.remove(index);
        self.events.push(ListEvent::Removed {
            index,
            item: item.clone(),
        });
        Some(item)
    }

    /// Removes the first occurrence of `item`, returning where it was.
    pub fn remove(&mut self, item: &T) -> Option<usize> {
        let index = self.index_of(item)?;
        self.remove_at(index);
        Some(index)
    }

    /// Moves the element at `from` so that it ends up at index `to`.
    pub fn move_item(&mut self, from: usize, to: usize) -> bool {
        if from >= self.items.len() || to >= self.items.len() {
            return false;
        }
        if from == to {
            return true;
        }
        let item = self.items.remove(from);
        self.items.insert(to, item.clone());
        self.events.push(ListEvent::Moved { from, to, item });
        true
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.events.push(ListEvent::Reset);
    }

    pub fn take_events(&mut self) -> Vec<ListEvent<T>> {
        std::mem::take(&mut self.events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_structural_changes_in_order() {
        let mut list = ListModel::new();
        list.push('a');
        list.push('b');
        list.insert(0, 'c');
        assert_eq!(list.as_slice(), &['c', 'a', 'b']);

        assert!(list.move_item(0, 2));
        assert_eq!(list.as_slice(), &['a', 'b', 'c']);
        assert_eq!(list.remove(&'b'), Some(1));

        let events = list.take_events();
        assert_eq!(
            events,
            vec![
                ListEvent::Inserted { index: 0, item: 'a' },
                ListEvent::Inserted { index: 1, item: 'b' },
                ListEvent::Inserted { index: 0, item: 'c' },
                ListEvent::Moved { from: 0, to: 2, item: 'c' },
                ListEvent::Removed { index: 1, item: 'b' },
            ]
        );
        assert!(list.take_events().is_empty());
    }

    #[test]
    fn out_of_range_operations_are_rejected() {
        let mut list = ListModel::new();
        list.push(1);
        assert!(!list.move_item(0, 3));
        assert_eq!(list.remove_at(5), None);
        assert_eq!(list.remove(&9), None);

        list.insert(10, 2);
        assert_eq!(list.as_slice(), &[1, 2]);
    }

    #[test]
    fn same_index_move_emits_nothing() {
        let mut list = ListModel::new();
        list.push(1);
        list.take_events();
        assert!(list.move_item(0, 0));
        assert!(list.take_events().is_empty());
    }
}
