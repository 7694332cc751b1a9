//! Row types for every entity kind, with their reference fields.
//!
//! Reference fields hold ids into other tables. An absent optional reference
//! (`None`) is the only sentinel; every present id must resolve.

use crate::error::Result;
use crate::graph::EntityGraph;
use crate::kind::{EntityKind, Id, TargetRef};
use crate::table::{
    Entity, EntityTable, RemapFn, detach_ids, detach_opt, remap_ids, remap_opt, union_into,
    visit_ids, visit_opt,
};
use serde::{Deserialize, Serialize};

/// A user-defined label. Business key: `name`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    pub id: Id,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phrase: Option<String>,
}

/// A time range inside a library source. Business key: `(start, end)`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Clip {
    pub id: Id,
    pub start: f64,
    pub end: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<u8>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<Id>,
}

impl Clip {
    /// Bitwise `(start, end)` so the key can be hashed.
    pub fn business_key(&self) -> (u64, u64) {
        (self.start.to_bits(), self.end.to_bits())
    }
}

/// A media-library entry (file, directory, or remote feed). Business key: `url`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibrarySource {
    pub id: Id,
    pub url: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<Id>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub clips: Vec<Id>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub disabled_clips: Vec<Id>,
    /// Urls of items excluded from this source.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blacklist: Vec<String>,
    #[serde(default)]
    pub marked: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
}

/// An audio track. Business key: `url`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Audio {
    pub id: Id,
    pub url: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<Id>,
}

/// A caption script. Business key: `url`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptionScript {
    pub id: Id,
    pub url: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub stop_at_end: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<Id>,
}

/// A standalone audio playlist.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Playlist {
    pub id: Id,
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub audios: Vec<Id>,
    #[serde(default)]
    pub shuffle: bool,
    #[serde(default)]
    pub repeat: bool,
}

/// Audio tracks a scene plays, in order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioPlaylist {
    #[serde(default)]
    pub audios: Vec<Id>,
    #[serde(default)]
    pub shuffle: bool,
    #[serde(default)]
    pub repeat: bool,
}

/// Caption scripts a scene plays, in order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptPlaylist {
    #[serde(default)]
    pub scripts: Vec<Id>,
    #[serde(default)]
    pub shuffle: bool,
    #[serde(default)]
    pub repeat: bool,
}

/// A playable scene.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scene {
    pub id: Id,
    pub name: String,
    #[serde(default)]
    pub timing_ms: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<Id>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub overlays: Vec<Id>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub audio_playlists: Vec<AudioPlaylist>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub script_playlists: Vec<ScriptPlaylist>,
    /// Scene to continue with when this one ends.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_scene: Option<Id>,
    /// Candidates for a random next scene.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub next_scene_randoms: Vec<Id>,
    /// Library source this scene was generated from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub library_source: Option<Id>,
}

/// One cell of a scene grid.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridCell {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scene: Option<Id>,
    #[serde(default)]
    pub mirror: bool,
}

/// A 2-D arrangement of scenes played side by side.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneGrid {
    pub id: Id,
    pub name: String,
    /// Rows of cells.
    #[serde(default)]
    pub grid: Vec<Vec<GridCell>>,
}

/// A scene or grid drawn on top of a scene.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Overlay {
    pub id: Id,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<TargetRef>,
    #[serde(default)]
    pub opacity: u8,
}

/// A named folder of scenes and grids.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneGroup {
    pub id: Id,
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub members: Vec<TargetRef>,
}

// ---------------------------------------------------------------------------
// Entity impls
// ---------------------------------------------------------------------------

impl Entity for Tag {
    const KIND: EntityKind = EntityKind::Tag;

    fn id(&self) -> Id {
        self.id
    }

    fn set_id(&mut self, id: Id) {
        self.id = id;
    }

    fn for_each_ref(&self, _f: &mut dyn FnMut(EntityKind, Id)) {}

    fn remap_refs(&mut self, _f: &mut RemapFn<'_>) -> Result<()> {
        Ok(())
    }

    fn detach(&mut self, _kind: EntityKind, _id: Id) {}

    fn table(graph: &EntityGraph) -> &EntityTable<Self> {
        &graph.tags
    }

    fn table_mut(graph: &mut EntityGraph) -> &mut EntityTable<Self> {
        &mut graph.tags
    }
}

impl Entity for Clip {
    const KIND: EntityKind = EntityKind::Clip;

    fn id(&self) -> Id {
        self.id
    }

    fn set_id(&mut self, id: Id) {
        self.id = id;
    }

    fn for_each_ref(&self, f: &mut dyn FnMut(EntityKind, Id)) {
        visit_ids(EntityKind::Tag, &self.tags, f);
    }

    fn remap_refs(&mut self, f: &mut RemapFn<'_>) -> Result<()> {
        remap_ids(EntityKind::Tag, &mut self.tags, f)
    }

    fn detach(&mut self, kind: EntityKind, id: Id) {
        detach_ids(&mut self.tags, EntityKind::Tag, kind, id);
    }

    fn table(graph: &EntityGraph) -> &EntityTable<Self> {
        &graph.clips
    }

    fn table_mut(graph: &mut EntityGraph) -> &mut EntityTable<Self> {
        &mut graph.clips
    }
}

impl Entity for LibrarySource {
    const KIND: EntityKind = EntityKind::LibrarySource;

    fn id(&self) -> Id {
        self.id
    }

    fn set_id(&mut self, id: Id) {
        self.id = id;
    }

    fn for_each_ref(&self, f: &mut dyn FnMut(EntityKind, Id)) {
        visit_ids(EntityKind::Tag, &self.tags, f);
        visit_ids(EntityKind::Clip, &self.clips, f);
        visit_ids(EntityKind::Clip, &self.disabled_clips, f);
    }

    fn remap_refs(&mut self, f: &mut RemapFn<'_>) -> Result<()> {
        remap_ids(EntityKind::Tag, &mut self.tags, f)?;
        remap_ids(EntityKind::Clip, &mut self.clips, f)?;
        remap_ids(EntityKind::Clip, &mut self.disabled_clips, f)
    }

    fn detach(&mut self, kind: EntityKind, id: Id) {
        detach_ids(&mut self.tags, EntityKind::Tag, kind, id);
        detach_ids(&mut self.clips, EntityKind::Clip, kind, id);
        detach_ids(&mut self.disabled_clips, EntityKind::Clip, kind, id);
    }

    /// Monotonic union: tags are adopted only when this source has none;
    /// clips, disabled clips, and blacklist gain the incoming entries.
    fn absorb(&mut self, incoming: &Self) {
        if self.tags.is_empty() {
            self.tags = incoming.tags.clone();
        }
        union_into(&mut self.clips, &incoming.clips);
        union_into(&mut self.disabled_clips, &incoming.disabled_clips);
        union_into(&mut self.blacklist, &incoming.blacklist);
    }

    fn table(graph: &EntityGraph) -> &EntityTable<Self> {
        &graph.library
    }

    fn table_mut(graph: &mut EntityGraph) -> &mut EntityTable<Self> {
        &mut graph.library
    }
}

impl Entity for Audio {
    const KIND: EntityKind = EntityKind::Audio;

    fn id(&self) -> Id {
        self.id
    }

    fn set_id(&mut self, id: Id) {
        self.id = id;
    }

    fn for_each_ref(&self, f: &mut dyn FnMut(EntityKind, Id)) {
        visit_ids(EntityKind::Tag, &self.tags, f);
    }

    fn remap_refs(&mut self, f: &mut RemapFn<'_>) -> Result<()> {
        remap_ids(EntityKind::Tag, &mut self.tags, f)
    }

    fn detach(&mut self, kind: EntityKind, id: Id) {
        detach_ids(&mut self.tags, EntityKind::Tag, kind, id);
    }

    fn table(graph: &EntityGraph) -> &EntityTable<Self> {
        &graph.audios
    }

    fn table_mut(graph: &mut EntityGraph) -> &mut EntityTable<Self> {
        &mut graph.audios
    }
}

impl Entity for CaptionScript {
    const KIND: EntityKind = EntityKind::CaptionScript;

    fn id(&self) -> Id {
        self.id
    }

    fn set_id(&mut self, id: Id) {
        self.id = id;
    }

    fn for_each_ref(&self, f: &mut dyn FnMut(EntityKind, Id)) {
        visit_ids(EntityKind::Tag, &self.tags, f);
    }

    fn remap_refs(&mut self, f: &mut RemapFn<'_>) -> Result<()> {
        remap_ids(EntityKind::Tag, &mut self.tags, f)
    }

    fn detach(&mut self, kind: EntityKind, id: Id) {
        detach_ids(&mut self.tags, EntityKind::Tag, kind, id);
    }

    fn table(graph: &EntityGraph) -> &EntityTable<Self> {
        &graph.scripts
    }

    fn table_mut(graph: &mut EntityGraph) -> &mut EntityTable<Self> {
        &mut graph.scripts
    }
}

impl Entity for Playlist {
    const KIND: EntityKind = EntityKind::Playlist;

    fn id(&self) -> Id {
        self.id
    }

    fn set_id(&mut self, id: Id) {
        self.id = id;
    }

    fn for_each_ref(&self, f: &mut dyn FnMut(EntityKind, Id)) {
        visit_ids(EntityKind::Audio, &self.audios, f);
    }

    fn remap_refs(&mut self, f: &mut RemapFn<'_>) -> Result<()> {
        remap_ids(EntityKind::Audio, &mut self.audios, f)
    }

    fn detach(&mut self, kind: EntityKind, id: Id) {
        detach_ids(&mut self.audios, EntityKind::Audio, kind, id);
    }

    fn table(graph: &EntityGraph) -> &EntityTable<Self> {
        &graph.playlists
    }

    fn table_mut(graph: &mut EntityGraph) -> &mut EntityTable<Self> {
        &mut graph.playlists
    }
}

impl Entity for Scene {
    const KIND: EntityKind = EntityKind::Scene;

    fn id(&self) -> Id {
        self.id
    }

    fn set_id(&mut self, id: Id) {
        self.id = id;
    }

    fn for_each_ref(&self, f: &mut dyn FnMut(EntityKind, Id)) {
        visit_ids(EntityKind::LibrarySource, &self.sources, f);
        visit_ids(EntityKind::Overlay, &self.overlays, f);
        for playlist in &self.audio_playlists {
            visit_ids(EntityKind::Audio, &playlist.audios, f);
        }
        for playlist in &self.script_playlists {
            visit_ids(EntityKind::CaptionScript, &playlist.scripts, f);
        }
        visit_opt(EntityKind::Scene, self.next_scene, f);
        visit_ids(EntityKind::Scene, &self.next_scene_randoms, f);
        visit_opt(EntityKind::LibrarySource, self.library_source, f);
    }

    fn remap_refs(&mut self, f: &mut RemapFn<'_>) -> Result<()> {
        remap_ids(EntityKind::LibrarySource, &mut self.sources, f)?;
        remap_ids(EntityKind::Overlay, &mut self.overlays, f)?;
        for playlist in &mut self.audio_playlists {
            remap_ids(EntityKind::Audio, &mut playlist.audios, f)?;
        }
        for playlist in &mut self.script_playlists {
            remap_ids(EntityKind::CaptionScript, &mut playlist.scripts, f)?;
        }
        remap_opt(EntityKind::Scene, &mut self.next_scene, f)?;
        remap_ids(EntityKind::Scene, &mut self.next_scene_randoms, f)?;
        remap_opt(EntityKind::LibrarySource, &mut self.library_source, f)
    }

    fn detach(&mut self, kind: EntityKind, id: Id) {
        detach_ids(&mut self.sources, EntityKind::LibrarySource, kind, id);
        detach_ids(&mut self.overlays, EntityKind::Overlay, kind, id);
        for playlist in &mut self.audio_playlists {
            detach_ids(&mut playlist.audios, EntityKind::Audio, kind, id);
        }
        for playlist in &mut self.script_playlists {
            detach_ids(&mut playlist.scripts, EntityKind::CaptionScript, kind, id);
        }
        detach_opt(&mut self.next_scene, EntityKind::Scene, kind, id);
        detach_ids(&mut self.next_scene_randoms, EntityKind::Scene, kind, id);
        detach_opt(&mut self.library_source, EntityKind::LibrarySource, kind, id);
    }

    fn table(graph: &EntityGraph) -> &EntityTable<Self> {
        &graph.scenes
    }

    fn table_mut(graph: &mut EntityGraph) -> &mut EntityTable<Self> {
        &mut graph.scenes
    }
}

impl Entity for SceneGrid {
    const KIND: EntityKind = EntityKind::SceneGrid;

    fn id(&self) -> Id {
        self.id
    }

    fn set_id(&mut self, id: Id) {
        self.id = id;
    }

    fn for_each_ref(&self, f: &mut dyn FnMut(EntityKind, Id)) {
        for cell in self.grid.iter().flatten() {
            visit_opt(EntityKind::Scene, cell.scene, f);
        }
    }

    fn remap_refs(&mut self, f: &mut RemapFn<'_>) -> Result<()> {
        for cell in self.grid.iter_mut().flatten() {
            remap_opt(EntityKind::Scene, &mut cell.scene, f)?;
        }
        Ok(())
    }

    /// Cells keep their position; only the scene is cleared.
    fn detach(&mut self, kind: EntityKind, id: Id) {
        for cell in self.grid.iter_mut().flatten() {
            detach_opt(&mut cell.scene, EntityKind::Scene, kind, id);
        }
    }

    fn table(graph: &EntityGraph) -> &EntityTable<Self> {
        &graph.grids
    }

    fn table_mut(graph: &mut EntityGraph) -> &mut EntityTable<Self> {
        &mut graph.grids
    }
}

impl Entity for Overlay {
    const KIND: EntityKind = EntityKind::Overlay;

    fn id(&self) -> Id {
        self.id
    }

    fn set_id(&mut self, id: Id) {
        self.id = id;
    }

    fn for_each_ref(&self, f: &mut dyn FnMut(EntityKind, Id)) {
        if let Some(target) = self.target {
            f(target.kind(), target.id());
        }
    }

    fn remap_refs(&mut self, f: &mut RemapFn<'_>) -> Result<()> {
        if let Some(target) = self.target {
            self.target = Some(target.with_id(f(target.kind(), target.id())?));
        }
        Ok(())
    }

    fn detach(&mut self, kind: EntityKind, id: Id) {
        if self
            .target
            .is_some_and(|t| t.kind() == kind && t.id() == id)
        {
            self.target = None;
        }
    }

    fn table(graph: &EntityGraph) -> &EntityTable<Self> {
        &graph.overlays
    }

    fn table_mut(graph: &mut EntityGraph) -> &mut EntityTable<Self> {
        &mut graph.overlays
    }
}

impl Entity for SceneGroup {
    const KIND: EntityKind = EntityKind::SceneGroup;

    fn id(&self) -> Id {
        self.id
    }

    fn set_id(&mut self, id: Id) {
        self.id = id;
    }

    fn for_each_ref(&self, f: &mut dyn FnMut(EntityKind, Id)) {
        for member in &self.members {
            f(member.kind(), member.id());
        }
    }

    fn remap_refs(&mut self, f: &mut RemapFn<'_>) -> Result<()> {
        for member in &mut self.members {
            *member = member.with_id(f(member.kind(), member.id())?);
        }
        Ok(())
    }

    fn detach(&mut self, kind: EntityKind, id: Id) {
        self.members
            .retain(|m| !(m.kind() == kind && m.id() == id));
    }

    fn table(graph: &EntityGraph) -> &EntityTable<Self> {
        &graph.scene_groups
    }

    fn table_mut(graph: &mut EntityGraph) -> &mut EntityTable<Self> {
        &mut graph.scene_groups
    }
}
