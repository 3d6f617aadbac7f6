//! Optimistic edits to an in-memory collection.
//!
//! Each operation keys on the entity's primary identifier and leaves
//! `pagination` alone: the visible list is corrected immediately, the total
//! count is corrected by the next authoritative fetch. Updates and deletes
//! of ids that are not present are no-ops, since a concurrent refetch may
//! already have removed or replaced the entity.

use std::collections::BTreeSet;

use crate::models::{Identified, ResourceCollection};

/// Ids currently selected for a bulk action.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    ids: BTreeSet<String>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select(&mut self, id: impl Into<String>) -> bool {
        self.ids.insert(id.into())
    }

    pub fn deselect(&mut self, id: &str) -> bool {
        self.ids.remove(id)
    }

    pub fn toggle(&mut self, id: &str) -> bool {
        if self.ids.remove(id) {
            false
        } else {
            self.ids.insert(id.to_string());
            true
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> Vec<String> {
        self.ids.iter().cloned().collect()
    }

    /// Drop selected ids that are no longer in `collection`.
    pub fn retain_present<T: Identified>(&mut self, collection: &ResourceCollection<T>) {
        self.ids.retain(|id| collection.contains(id));
    }
}

/// Insert `item` at the top of the list. An item whose id is already
/// present replaces the existing entry instead of duplicating it.
pub fn apply_create<T: Identified>(collection: &mut ResourceCollection<T>, item: T) {
    match collection.position(item.id()) {
        Some(pos) => collection.items[pos] = item,
        None => collection.items.insert(0, item),
    }
}

/// Replace the entry with `item`'s id in place. Returns whether it was present.
pub fn apply_update<T: Identified>(collection: &mut ResourceCollection<T>, item: T) -> bool {
    match collection.position(item.id()) {
        Some(pos) => {
            collection.items[pos] = item;
            true
        }
        None => false,
    }
}

/// Remove the entry with `id`, and drop `id` from `selection`. Returns
/// whether the entry was present.
pub fn apply_delete<T: Identified>(
    collection: &mut ResourceCollection<T>,
    id: &str,
    selection: Option<&mut Selection>,
) -> bool {
    if let Some(selection) = selection {
        selection.deselect(id);
    }
    match collection.position(id) {
        Some(pos) => {
            collection.items.remove(pos);
            true
        }
        None => false,
    }
}

/// Remove every entry in `ids`. Returns how many were present.
pub fn apply_bulk_delete<T: Identified>(
    collection: &mut ResourceCollection<T>,
    ids: &[String],
    mut selection: Option<&mut Selection>,
) -> usize {
    ids.iter()
        .filter(|id| apply_delete(collection, id, selection.as_deref_mut()))
        .count()
}
