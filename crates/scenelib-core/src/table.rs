//! Generic ID-indexed entity table with a monotonic allocator.

use crate::error::{Result, StoreError};
use crate::graph::EntityGraph;
use crate::kind::{EntityKind, Id};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Debug;

/// Callback used to rewrite outgoing references: `(target kind, old id) -> new id`.
pub type RemapFn<'a> = dyn FnMut(EntityKind, Id) -> Result<Id> + 'a;

/// A row type stored in an [`EntityTable`].
///
/// Equality is structural (`PartialEq`) and covers reference fields by id.
pub trait Entity: Clone + PartialEq + Debug {
    const KIND: EntityKind;

    fn id(&self) -> Id;
    fn set_id(&mut self, id: Id);

    /// Visit every outgoing reference as `(target kind, target id)`.
    fn for_each_ref(&self, f: &mut dyn FnMut(EntityKind, Id));

    /// Rewrite every outgoing reference through `f`. Stops at the first error.
    fn remap_refs(&mut self, f: &mut RemapFn<'_>) -> Result<()>;

    /// Drop every reference to `(kind, id)`: list entries are removed and
    /// optional references are cleared.
    fn detach(&mut self, kind: EntityKind, id: Id);

    /// Fold an incoming duplicate (already re-keyed) into this row.
    /// Only called by the business-key merge. Default keeps `self` unchanged.
    fn absorb(&mut self, _incoming: &Self) {}

    fn table(graph: &EntityGraph) -> &EntityTable<Self>;
    fn table_mut(graph: &mut EntityGraph) -> &mut EntityTable<Self>;
}

/// ID-indexed collection for one entity kind.
///
/// Invariants: every row is stored under its own `id`, and `next_id` is
/// strictly greater than every id ever stored (ids are never reused).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityTable<T> {
    #[serde(default = "BTreeMap::new")]
    rows: BTreeMap<Id, T>,
    #[serde(default = "first_id")]
    next_id: Id,
}

fn first_id() -> Id {
    1
}

fn successor<T: Entity>(id: Id) -> Result<Id> {
    id.checked_add(1)
        .ok_or(StoreError::IdOutOfRange { kind: T::KIND, id })
}

impl<T> Default for EntityTable<T> {
    fn default() -> Self {
        Self {
            rows: BTreeMap::new(),
            next_id: first_id(),
        }
    }
}

impl<T: Entity> EntityTable<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// The id the next `allocate` will hand out.
    pub fn next_id(&self) -> Id {
        self.next_id
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn contains(&self, id: Id) -> bool {
        self.rows.contains_key(&id)
    }

    /// Rows in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.rows.values()
    }

    pub fn ids(&self) -> Vec<Id> {
        self.rows.keys().copied().collect()
    }

    pub fn get(&self, id: Id) -> Result<&T> {
        self.rows
            .get(&id)
            .ok_or_else(|| StoreError::not_found(T::KIND, id))
    }

    /// Mutate a row in place. The row keeps its id whatever `f` does.
    pub fn update<R>(&mut self, id: Id, f: impl FnOnce(&mut T) -> R) -> Result<R> {
        let row = self
            .rows
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found(T::KIND, id))?;
        let out = f(row);
        row.set_id(id);
        Ok(out)
    }

    /// Upsert. Returns the replaced row, if any.
    pub fn set(&mut self, entity: T) -> Result<Option<T>> {
        let id = entity.id();
        self.reserve(id)?;
        Ok(self.rows.insert(id, entity))
    }

    /// Insert under the entity's own id; fails if the id is occupied.
    pub fn create(&mut self, entity: T) -> Result<Id> {
        let id = entity.id();
        if self.rows.contains_key(&id) {
            return Err(StoreError::AlreadyExists { kind: T::KIND, id });
        }
        self.set(entity)?;
        Ok(id)
    }

    /// Insert under a freshly allocated id, overwriting whatever id `entity` carried.
    pub fn insert_new(&mut self, mut entity: T) -> Result<Id> {
        let id = self.allocate()?;
        entity.set_id(id);
        self.rows.insert(id, entity);
        Ok(id)
    }

    /// Remove a row. Inbound references are the caller's responsibility.
    pub fn delete(&mut self, id: Id) -> Result<T> {
        self.rows
            .remove(&id)
            .ok_or_else(|| StoreError::not_found(T::KIND, id))
    }

    /// Hand out the next id without inserting anything.
    pub fn allocate(&mut self) -> Result<Id> {
        let id = self.next_id;
        self.next_id = successor::<T>(id)?;
        Ok(id)
    }

    /// Make sure `id` will never be allocated.
    ///
    /// `Id::MAX` cannot be stored: the allocator must stay strictly above it.
    pub fn reserve(&mut self, id: Id) -> Result<()> {
        if id >= self.next_id {
            self.next_id = successor::<T>(id)?;
        }
        Ok(())
    }

    pub(crate) fn rows(&self) -> &BTreeMap<Id, T> {
        &self.rows
    }

    pub(crate) fn rows_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.rows.values_mut()
    }

    /// Raise `next_id` above every stored id. Returns true if it had to move.
    pub(crate) fn repair_next_id(&mut self) -> bool {
        let floor = self
            .rows
            .keys()
            .next_back()
            .map_or(1, |max| max.saturating_add(1));
        if self.next_id < floor {
            self.next_id = floor;
            true
        } else {
            false
        }
    }
}

// ---------------------------------------------------------------------------
// Reference field helpers shared by the row types
// ---------------------------------------------------------------------------

pub(crate) fn visit_ids(kind: EntityKind, ids: &[Id], f: &mut dyn FnMut(EntityKind, Id)) {
    for &id in ids {
        f(kind, id);
    }
}

pub(crate) fn visit_opt(kind: EntityKind, id: Option<Id>, f: &mut dyn FnMut(EntityKind, Id)) {
    if let Some(id) = id {
        f(kind, id);
    }
}

pub(crate) fn remap_ids(kind: EntityKind, ids: &mut [Id], f: &mut RemapFn<'_>) -> Result<()> {
    for id in ids {
        *id = f(kind, *id)?;
    }
    Ok(())
}

pub(crate) fn remap_opt(kind: EntityKind, id: &mut Option<Id>, f: &mut RemapFn<'_>) -> Result<()> {
    if let Some(id) = id {
        *id = f(kind, *id)?;
    }
    Ok(())
}

pub(crate) fn detach_ids(ids: &mut Vec<Id>, field_kind: EntityKind, kind: EntityKind, id: Id) {
    if field_kind == kind {
        ids.retain(|&x| x != id);
    }
}

pub(crate) fn detach_opt(slot: &mut Option<Id>, field_kind: EntityKind, kind: EntityKind, id: Id) {
    if field_kind == kind && *slot == Some(id) {
        *slot = None;
    }
}

/// Append the elements of `incoming` missing from `target`, keeping `target` order.
pub(crate) fn union_into<T: PartialEq + Clone>(target: &mut Vec<T>, incoming: &[T]) {
    for item in incoming {
        if !target.contains(item) {
            target.push(item.clone());
        }
    }
}
