//! Display-order planning for the flat catalog.

use crate::list_model::ListModel;
use log::debug;

/// What the planner needs to know about one item.
#[derive(Debug, Clone)]
pub struct OrderKey<T> {
    pub item: T,
    pub position: Option<i64>,
    pub title: String,
}

/// Positioned items by ascending position, then unpositioned items by
/// title (ordinal, case-sensitive). Both sorts are stable, so ties keep the
/// order the keys were given in.
pub fn plan<T>(keys: Vec<OrderKey<T>>) -> Vec<T> {
    let (mut positioned, mut unpositioned): (Vec<_>, Vec<_>) =
        keys.into_iter().partition(|key| key.position.is_some());

    positioned.sort_by_key(|key| key.position);
    unpositioned.sort_by(|a, b| a.title.cmp(&b.title));

    positioned
        .into_iter()
        .chain(unpositioned)
        .map(|key| key.item)
        .collect()
}

/// Moves items of `list` into the order of `target`, one element at a time,
/// left to right, skipping slots that already hold the right item.
/// Returns the number of moves performed.
pub fn apply<T: Clone + PartialEq + std::fmt::Debug>(list: &mut ListModel<T>, target: &[T]) -> usize {
    let mut moves = 0;
    for (slot, item) in target.iter().enumerate() {
        if slot >= list.len() {
            debug!("Invalid planned position {} for {:?}", slot, item);
            continue;
        }
        let Some(current) = list.index_of(item) else {
            continue;
        };
        if current == slot {
            continue;
        }
        debug!("Moving {:?} from {} to {}", item, current, slot);
        list.move_item(current, slot);
        moves += 1;
    }
    moves
}
