//! The entity graph: one [`EntityTable`] per entity kind.

use crate::error::{Result, StoreError};
use crate::kind::{EntityKind, Id};
use crate::model::{
    Audio, CaptionScript, Clip, LibrarySource, Overlay, Playlist, Scene, SceneGrid, SceneGroup,
    Tag,
};
use crate::table::{Entity, EntityTable};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// All tables of a project. Several graphs can coexist (e.g. a scratch copy
/// used while merging); each table owns its own allocator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EntityGraph {
    pub tags: EntityTable<Tag>,
    pub clips: EntityTable<Clip>,
    pub library: EntityTable<LibrarySource>,
    pub audios: EntityTable<Audio>,
    pub scripts: EntityTable<CaptionScript>,
    pub playlists: EntityTable<Playlist>,
    pub scenes: EntityTable<Scene>,
    pub grids: EntityTable<SceneGrid>,
    pub overlays: EntityTable<Overlay>,
    pub scene_groups: EntityTable<SceneGroup>,
}

/// Row counts per kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GraphStats {
    pub counts: BTreeMap<EntityKind, usize>,
    pub total: usize,
}

/// Visits every table of a graph with the concrete row type in scope.
pub trait TableVisitor {
    fn visit<T: Entity>(&mut self, table: &EntityTable<T>);
}

/// Mutable counterpart of [`TableVisitor`].
pub trait TableVisitorMut {
    fn visit<T: Entity>(&mut self, table: &mut EntityTable<T>);
}

/// Kind-erased view of a table, for callers that only hold an [`EntityKind`].
pub(crate) trait ErasedTable {
    fn contains(&self, id: Id) -> bool;
    fn next_id(&self) -> Id;
    fn len(&self) -> usize;
    fn ids(&self) -> Vec<Id>;
    fn refs_of(&self, id: Id) -> Option<Vec<(EntityKind, Id)>>;
    fn allocate(&mut self) -> Result<Id>;
    fn delete_row(&mut self, id: Id) -> Result<()>;
}

impl<T: Entity> ErasedTable for EntityTable<T> {
    fn contains(&self, id: Id) -> bool {
        EntityTable::contains(self, id)
    }

    fn next_id(&self) -> Id {
        EntityTable::next_id(self)
    }

    fn len(&self) -> usize {
        EntityTable::len(self)
    }

    fn ids(&self) -> Vec<Id> {
        EntityTable::ids(self)
    }

    fn refs_of(&self, id: Id) -> Option<Vec<(EntityKind, Id)>> {
        let row = self.get(id).ok()?;
        let mut refs = Vec::new();
        row.for_each_ref(&mut |kind, id| refs.push((kind, id)));
        Some(refs)
    }

    fn allocate(&mut self) -> Result<Id> {
        EntityTable::allocate(self)
    }

    fn delete_row(&mut self, id: Id) -> Result<()> {
        self.delete(id).map(|_| ())
    }
}

impl EntityGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table<T: Entity>(&self) -> &EntityTable<T> {
        T::table(self)
    }

    pub fn table_mut<T: Entity>(&mut self) -> &mut EntityTable<T> {
        T::table_mut(self)
    }

    /// Visit all tables in dependency order.
    pub fn visit_tables(&self, visitor: &mut impl TableVisitor) {
        visitor.visit(&self.tags);
        visitor.visit(&self.clips);
        visitor.visit(&self.library);
        visitor.visit(&self.audios);
        visitor.visit(&self.scripts);
        visitor.visit(&self.playlists);
        visitor.visit(&self.scenes);
        visitor.visit(&self.grids);
        visitor.visit(&self.overlays);
        visitor.visit(&self.scene_groups);
    }

    pub fn visit_tables_mut(&mut self, visitor: &mut impl TableVisitorMut) {
        visitor.visit(&mut self.tags);
        visitor.visit(&mut self.clips);
        visitor.visit(&mut self.library);
        visitor.visit(&mut self.audios);
        visitor.visit(&mut self.scripts);
        visitor.visit(&mut self.playlists);
        visitor.visit(&mut self.scenes);
        visitor.visit(&mut self.grids);
        visitor.visit(&mut self.overlays);
        visitor.visit(&mut self.scene_groups);
    }

    pub(crate) fn erased(&self, kind: EntityKind) -> &dyn ErasedTable {
        match kind {
            EntityKind::Tag => &self.tags,
            EntityKind::Clip => &self.clips,
            EntityKind::LibrarySource => &self.library,
            EntityKind::Audio => &self.audios,
            EntityKind::CaptionScript => &self.scripts,
            EntityKind::Playlist => &self.playlists,
            EntityKind::Scene => &self.scenes,
            EntityKind::SceneGrid => &self.grids,
            EntityKind::Overlay => &self.overlays,
            EntityKind::SceneGroup => &self.scene_groups,
        }
    }

    pub(crate) fn erased_mut(&mut self, kind: EntityKind) -> &mut dyn ErasedTable {
        match kind {
            EntityKind::Tag => &mut self.tags,
            EntityKind::Clip => &mut self.clips,
            EntityKind::LibrarySource => &mut self.library,
            EntityKind::Audio => &mut self.audios,
            EntityKind::CaptionScript => &mut self.scripts,
            EntityKind::Playlist => &mut self.playlists,
            EntityKind::Scene => &mut self.scenes,
            EntityKind::SceneGrid => &mut self.grids,
            EntityKind::Overlay => &mut self.overlays,
            EntityKind::SceneGroup => &mut self.scene_groups,
        }
    }

    pub fn contains(&self, kind: EntityKind, id: Id) -> bool {
        self.erased(kind).contains(id)
    }

    pub fn next_id(&self, kind: EntityKind) -> Id {
        self.erased(kind).next_id()
    }

    pub fn len(&self, kind: EntityKind) -> usize {
        self.erased(kind).len()
    }

    pub fn ids(&self, kind: EntityKind) -> Vec<Id> {
        self.erased(kind).ids()
    }

    pub fn is_empty(&self) -> bool {
        EntityKind::ALL.iter().all(|&k| self.len(k) == 0)
    }

    /// Outgoing references of one row, or `None` if the row does not exist.
    pub fn refs_of(&self, kind: EntityKind, id: Id) -> Option<Vec<(EntityKind, Id)>> {
        self.erased(kind).refs_of(id)
    }

    pub fn stats(&self) -> GraphStats {
        let counts: BTreeMap<EntityKind, usize> =
            EntityKind::ALL.iter().map(|&k| (k, self.len(k))).collect();
        let total = counts.values().sum();
        GraphStats { counts, total }
    }

    /// Every row that references `(kind, id)`, as `(referrer kind, referrer id)`.
    pub fn referrers(&self, kind: EntityKind, id: Id) -> Vec<(EntityKind, Id)> {
        struct Collect {
            kind: EntityKind,
            id: Id,
            found: Vec<(EntityKind, Id)>,
        }
        impl TableVisitor for Collect {
            fn visit<T: Entity>(&mut self, table: &EntityTable<T>) {
                for row in table.iter() {
                    let mut hit = false;
                    row.for_each_ref(&mut |k, r| hit |= k == self.kind && r == self.id);
                    if hit {
                        self.found.push((T::KIND, row.id()));
                    }
                }
            }
        }
        let mut collect = Collect {
            kind,
            id,
            found: Vec::new(),
        };
        self.visit_tables(&mut collect);
        collect.found
    }

    /// Delete a row after clearing every inbound reference to it.
    pub fn delete_cascade(&mut self, kind: EntityKind, id: Id) -> Result<()> {
        if !self.contains(kind, id) {
            return Err(StoreError::not_found(kind, id));
        }
        struct Detach {
            kind: EntityKind,
            id: Id,
        }
        impl TableVisitorMut for Detach {
            fn visit<T: Entity>(&mut self, table: &mut EntityTable<T>) {
                for row in table.rows_mut() {
                    row.detach(self.kind, self.id);
                }
            }
        }
        self.visit_tables_mut(&mut Detach { kind, id });
        self.erased_mut(kind).delete_row(id)?;
        tracing::debug!("deleted {} {} and detached inbound references", kind, id);
        Ok(())
    }

    /// Raise every table's allocator above its highest id.
    /// Returns the kinds that needed repair.
    pub fn repair_allocators(&mut self) -> Vec<EntityKind> {
        struct Repair(Vec<EntityKind>);
        impl TableVisitorMut for Repair {
            fn visit<T: Entity>(&mut self, table: &mut EntityTable<T>) {
                if table.repair_next_id() {
                    self.0.push(T::KIND);
                }
            }
        }
        let mut repair = Repair(Vec::new());
        self.visit_tables_mut(&mut repair);
        repair.0
    }
}
