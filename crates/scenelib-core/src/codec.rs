//! Conversion between a normalized [`EntityGraph`] and a nested [`Document`].
//!
//! Export inlines every reference. Scenes and grids can reach themselves
//! through overlays, grid cells, and next-scene links, so the exporter keeps
//! the chain of scenes/grids currently being inlined and emits a bare
//! [`Nested::Ref`] instead of descending into one already on that chain.
//! [`export_shared`] instead lists every reachable scene and grid once at the
//! top level and refers to them by id wherever they are nested.
//!
//! Normalization is the inverse walk into a fresh graph. Top-level scenes and
//! grids claim their literal ids first, so references to them resolve from
//! anywhere in the document. The first occurrence of a literal id claims it.
//! A later occurrence with the same literal id and the same subtree (see
//! [`DocEq`]) collapses onto the first; a different subtree is a different
//! entity and gets a freshly allocated id. Bare references resolve to the
//! matching scene/grid on the current chain, or else to the most recent claim
//! of that literal id; anything else is a dangling reference.

use crate::document::{
    AudioDoc, AudioPlaylistDoc, CaptionScriptDoc, ClipDoc, DocEq, Document, GridCellDoc,
    LibrarySourceDoc, Nested, OverlayDoc, PlaylistDoc, SceneDoc, SceneGridDoc, SceneGroupDoc,
    ScriptPlaylistDoc, TargetDoc,
};
use crate::error::{Result, StoreError};
use crate::graph::EntityGraph;
use crate::kind::{EntityKind, Id, TargetRef};
use crate::model::{
    Audio, AudioPlaylist, CaptionScript, Clip, GridCell, LibrarySource, Overlay, Playlist, Scene,
    SceneGrid, SceneGroup, ScriptPlaylist, Tag,
};
use crate::table::Entity;
use std::collections::{BTreeSet, HashMap, HashSet};

/// Default bound on nested entity depth.
pub const DEFAULT_MAX_DEPTH: usize = 32;

/// Tracks nesting depth for both walkers.
///
/// A chain never inlines the same scene or grid twice, so a walk over `span`
/// distinct scenes and grids nests at most `2 * span + 2` levels: each one
/// may sit behind an overlay, and a library source ends the chain. The
/// configured limit is a floor under that bound.
#[derive(Debug)]
struct DepthGuard {
    depth: usize,
    floor: usize,
    span: usize,
}

impl DepthGuard {
    fn new(floor: usize) -> Self {
        Self {
            depth: 0,
            floor,
            span: 0,
        }
    }

    fn limit(&self) -> usize {
        self.floor.max(self.span.saturating_mul(2).saturating_add(2))
    }

    fn widen(&mut self, span: usize) {
        self.span = self.span.saturating_add(span);
    }

    fn enter(&mut self) -> Result<()> {
        self.depth += 1;
        let limit = self.limit();
        if self.depth > limit {
            return Err(StoreError::CycleDepthExceeded { limit });
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }
}

// ---------------------------------------------------------------------------
// Export
// ---------------------------------------------------------------------------

/// Export the given roots into a document. Each root lands under its kind's
/// top-level field, in the order given.
///
/// Sharing is only recorded along one chain: a scene reached along two
/// different chains is inlined twice, so wide `next_scene_randoms` fan-out
/// grows the document quickly. Whole-graph exports use [`export_shared`].
pub fn export(
    graph: &EntityGraph,
    roots: &[(EntityKind, Id)],
    max_depth: usize,
) -> Result<Document> {
    export_with(Exporter::new(graph, max_depth), roots)
}

/// Export the given roots plus every scene and grid they reach, each once.
///
/// Scenes and grids are never inlined below the top level; nested
/// references to them are bare ids. Document size stays linear in the
/// number of rows and nesting stays shallow however long the scene chains.
pub fn export_shared(
    graph: &EntityGraph,
    roots: &[(EntityKind, Id)],
    max_depth: usize,
) -> Result<Document> {
    let mut all = roots.to_vec();
    all.extend(reachable_scenes_and_grids(graph, roots));
    export_with(Exporter::shared(graph, max_depth), &all)
}

/// Scenes and grids reachable from `roots` that are not roots themselves,
/// scenes first, each in ascending id order.
fn reachable_scenes_and_grids(
    graph: &EntityGraph,
    roots: &[(EntityKind, Id)],
) -> Vec<(EntityKind, Id)> {
    let mut seen: HashSet<(EntityKind, Id)> = roots.iter().copied().collect();
    let mut stack = roots.to_vec();
    let mut found = BTreeSet::new();
    while let Some((kind, id)) = stack.pop() {
        for next in graph.refs_of(kind, id).unwrap_or_default() {
            if seen.insert(next) {
                if matches!(next.0, EntityKind::Scene | EntityKind::SceneGrid) {
                    found.insert(next);
                }
                stack.push(next);
            }
        }
    }
    // EntityKind orders Scene before SceneGrid.
    found.into_iter().collect()
}

fn export_with(mut exporter: Exporter<'_>, roots: &[(EntityKind, Id)]) -> Result<Document> {
    let mut doc = Document::default();
    for &(kind, id) in roots {
        match kind {
            EntityKind::Tag => doc.tags.push(exporter.tag(id)?),
            EntityKind::Clip => doc.clips.push(exporter.clip(id)?),
            EntityKind::LibrarySource => doc.library.push(exporter.library_source(id)?),
            EntityKind::Audio => doc.audios.push(exporter.audio(id)?),
            EntityKind::CaptionScript => doc.scripts.push(exporter.script(id)?),
            EntityKind::Playlist => doc.playlists.push(exporter.playlist(id)?),
            EntityKind::Scene => doc.scenes.push(exporter.scene(id)?),
            EntityKind::SceneGrid => doc.grids.push(exporter.grid(id)?),
            EntityKind::Overlay => doc.overlays.push(exporter.overlay(id)?),
            EntityKind::SceneGroup => doc.scene_groups.push(exporter.scene_group(id)?),
        }
    }
    Ok(doc)
}

/// Graph-to-document walker.
pub struct Exporter<'g> {
    graph: &'g EntityGraph,
    guard: DepthGuard,
    /// Emit every nested scene/grid as a bare id.
    shared: bool,
    scene_path: Vec<Id>,
    grid_path: Vec<Id>,
}

impl<'g> Exporter<'g> {
    pub fn new(graph: &'g EntityGraph, max_depth: usize) -> Self {
        let mut guard = DepthGuard::new(max_depth);
        guard.widen(graph.scenes.len() + graph.grids.len());
        Self {
            graph,
            guard,
            shared: false,
            scene_path: Vec::new(),
            grid_path: Vec::new(),
        }
    }

    /// Walker whose output lists scenes and grids only at the top level.
    /// The caller must export every scene and grid it references as a root.
    pub fn shared(graph: &'g EntityGraph, max_depth: usize) -> Self {
        Self {
            shared: true,
            ..Self::new(graph, max_depth)
        }
    }

    pub fn tag(&self, id: Id) -> Result<Tag> {
        self.graph.tags.get(id).cloned()
    }

    fn tags(&self, ids: &[Id]) -> Result<Vec<Tag>> {
        ids.iter().map(|&id| self.tag(id)).collect()
    }

    pub fn clip(&self, id: Id) -> Result<ClipDoc> {
        let graph = self.graph;
        let clip = graph.clips.get(id)?;
        Ok(ClipDoc {
            id: clip.id,
            start: clip.start,
            end: clip.end,
            volume: clip.volume,
            tags: self.tags(&clip.tags)?,
        })
    }

    fn clips(&self, ids: &[Id]) -> Result<Vec<ClipDoc>> {
        ids.iter().map(|&id| self.clip(id)).collect()
    }

    pub fn library_source(&mut self, id: Id) -> Result<LibrarySourceDoc> {
        let graph = self.graph;
        let source = graph.library.get(id)?;
        self.guard.enter()?;
        let doc = LibrarySourceDoc {
            id: source.id,
            url: source.url.clone(),
            tags: self.tags(&source.tags)?,
            clips: self.clips(&source.clips)?,
            disabled_clips: self.clips(&source.disabled_clips)?,
            blacklist: source.blacklist.clone(),
            marked: source.marked,
            count: source.count,
        };
        self.guard.leave();
        Ok(doc)
    }

    pub fn audio(&self, id: Id) -> Result<AudioDoc> {
        let graph = self.graph;
        let audio = graph.audios.get(id)?;
        Ok(AudioDoc {
            id: audio.id,
            url: audio.url.clone(),
            name: audio.name.clone(),
            artist: audio.artist.clone(),
            duration: audio.duration,
            tags: self.tags(&audio.tags)?,
        })
    }

    fn audios(&self, ids: &[Id]) -> Result<Vec<AudioDoc>> {
        ids.iter().map(|&id| self.audio(id)).collect()
    }

    pub fn script(&self, id: Id) -> Result<CaptionScriptDoc> {
        let graph = self.graph;
        let script = graph.scripts.get(id)?;
        Ok(CaptionScriptDoc {
            id: script.id,
            url: script.url.clone(),
            name: script.name.clone(),
            stop_at_end: script.stop_at_end,
            tags: self.tags(&script.tags)?,
        })
    }

    pub fn playlist(&self, id: Id) -> Result<PlaylistDoc> {
        let graph = self.graph;
        let playlist = graph.playlists.get(id)?;
        Ok(PlaylistDoc {
            id: playlist.id,
            name: playlist.name.clone(),
            audios: self.audios(&playlist.audios)?,
            shuffle: playlist.shuffle,
            repeat: playlist.repeat,
        })
    }

    pub fn overlay(&mut self, id: Id) -> Result<OverlayDoc> {
        let graph = self.graph;
        let overlay = graph.overlays.get(id)?;
        self.guard.enter()?;
        let target = match overlay.target {
            Some(target) => Some(self.target(target)?),
            None => None,
        };
        self.guard.leave();
        Ok(OverlayDoc {
            id: overlay.id,
            target,
            opacity: overlay.opacity,
        })
    }

    fn target(&mut self, target: TargetRef) -> Result<TargetDoc> {
        Ok(match target {
            TargetRef::Scene(id) => TargetDoc::Scene(self.scene_ref(id)?),
            TargetRef::Grid(id) => TargetDoc::Grid(self.grid_ref(id)?),
        })
    }

    fn scene_ref(&mut self, id: Id) -> Result<Nested<SceneDoc>> {
        if self.shared {
            self.graph.scenes.get(id)?;
            return Ok(Nested::Ref(id));
        }
        if self.scene_path.contains(&id) {
            return Ok(Nested::Ref(id));
        }
        Ok(Nested::inline(self.scene(id)?))
    }

    fn grid_ref(&mut self, id: Id) -> Result<Nested<SceneGridDoc>> {
        if self.shared {
            self.graph.grids.get(id)?;
            return Ok(Nested::Ref(id));
        }
        if self.grid_path.contains(&id) {
            return Ok(Nested::Ref(id));
        }
        Ok(Nested::inline(self.grid(id)?))
    }

    pub fn scene(&mut self, id: Id) -> Result<SceneDoc> {
        let graph = self.graph;
        let scene = graph.scenes.get(id)?;
        self.guard.enter()?;
        self.scene_path.push(id);

        let sources = scene
            .sources
            .iter()
            .map(|&s| self.library_source(s))
            .collect::<Result<Vec<_>>>()?;
        let overlays = scene
            .overlays
            .iter()
            .map(|&o| self.overlay(o))
            .collect::<Result<Vec<_>>>()?;
        let mut audio_playlists = Vec::with_capacity(scene.audio_playlists.len());
        for playlist in &scene.audio_playlists {
            audio_playlists.push(AudioPlaylistDoc {
                audios: self.audios(&playlist.audios)?,
                shuffle: playlist.shuffle,
                repeat: playlist.repeat,
            });
        }
        let mut script_playlists = Vec::with_capacity(scene.script_playlists.len());
        for playlist in &scene.script_playlists {
            script_playlists.push(ScriptPlaylistDoc {
                scripts: playlist
                    .scripts
                    .iter()
                    .map(|&s| self.script(s))
                    .collect::<Result<Vec<_>>>()?,
                shuffle: playlist.shuffle,
                repeat: playlist.repeat,
            });
        }
        let next_scene = match scene.next_scene {
            Some(next) => Some(self.scene_ref(next)?),
            None => None,
        };
        let next_scene_randoms = scene
            .next_scene_randoms
            .iter()
            .map(|&s| self.scene_ref(s))
            .collect::<Result<Vec<_>>>()?;
        let library_source = match scene.library_source {
            Some(source) => Some(self.library_source(source)?),
            None => None,
        };

        self.scene_path.pop();
        self.guard.leave();
        Ok(SceneDoc {
            id: scene.id,
            name: scene.name.clone(),
            timing_ms: scene.timing_ms,
            sources,
            overlays,
            audio_playlists,
            script_playlists,
            next_scene,
            next_scene_randoms,
            library_source,
        })
    }

    pub fn grid(&mut self, id: Id) -> Result<SceneGridDoc> {
        let graph = self.graph;
        let grid = graph.grids.get(id)?;
        self.guard.enter()?;
        self.grid_path.push(id);
        let mut rows = Vec::with_capacity(grid.grid.len());
        for row in &grid.grid {
            let mut cells = Vec::with_capacity(row.len());
            for cell in row {
                cells.push(GridCellDoc {
                    scene: match cell.scene {
                        Some(scene) => Some(self.scene_ref(scene)?),
                        None => None,
                    },
                    mirror: cell.mirror,
                });
            }
            rows.push(cells);
        }
        self.grid_path.pop();
        self.guard.leave();
        Ok(SceneGridDoc {
            id: grid.id,
            name: grid.name.clone(),
            grid: rows,
        })
    }

    pub fn scene_group(&mut self, id: Id) -> Result<SceneGroupDoc> {
        let graph = self.graph;
        let group = graph.scene_groups.get(id)?;
        let members = group
            .members
            .iter()
            .map(|&m| self.target(m))
            .collect::<Result<Vec<_>>>()?;
        Ok(SceneGroupDoc {
            id: group.id,
            name: group.name.clone(),
            members,
        })
    }
}

// ---------------------------------------------------------------------------
// Normalize
// ---------------------------------------------------------------------------

/// Inflate a document into a fresh graph.
pub fn normalize(doc: &Document, max_depth: usize) -> Result<EntityGraph> {
    let mut normalizer = Normalizer::new(max_depth);
    normalizer.reserve_roots(doc)?;
    for tag in &doc.tags {
        normalizer.tag(tag)?;
    }
    for clip in &doc.clips {
        normalizer.clip(clip)?;
    }
    for source in &doc.library {
        normalizer.library_source(source)?;
    }
    for audio in &doc.audios {
        normalizer.audio(audio)?;
    }
    for script in &doc.scripts {
        normalizer.script(script)?;
    }
    for playlist in &doc.playlists {
        normalizer.playlist(playlist)?;
    }
    for scene in &doc.scenes {
        normalizer.scene(scene)?;
    }
    for grid in &doc.grids {
        normalizer.grid(grid)?;
    }
    for overlay in &doc.overlays {
        normalizer.overlay(overlay)?;
    }
    for group in &doc.scene_groups {
        normalizer.scene_group(group)?;
    }
    Ok(normalizer.finish())
}

/// Occurrences of one document type, grouped by literal id.
struct Occurrences<'d, D> {
    by_literal: HashMap<Id, Vec<(&'d D, Id)>>,
    /// Claimed ahead of the walk, row not written yet.
    reserved: HashMap<Id, Vec<(&'d D, Id)>>,
}

impl<D> Default for Occurrences<'_, D> {
    fn default() -> Self {
        Self {
            by_literal: HashMap::new(),
            reserved: HashMap::new(),
        }
    }
}

impl<'d, D: DocEq> Occurrences<'d, D> {
    /// Local id of an earlier occurrence with the same literal id and subtree.
    fn find(&self, literal: Id, doc: &D) -> Option<Id> {
        self.by_literal
            .get(&literal)?
            .iter()
            .find(|(seen, _)| seen.same_as(doc))
            .map(|&(_, local)| local)
    }

    fn record(&mut self, literal: Id, doc: &'d D, local: Id) {
        self.by_literal.entry(literal).or_default().push((doc, local));
    }

    fn find_reserved(&self, literal: Id, doc: &D) -> Option<Id> {
        self.reserved
            .get(&literal)?
            .iter()
            .find(|(seen, _)| seen.same_as(doc))
            .map(|&(_, local)| local)
    }

    fn reserve(&mut self, literal: Id, doc: &'d D, local: Id) {
        self.reserved.entry(literal).or_default().push((doc, local));
    }

    /// Remove and return a reservation matching `doc`.
    fn take_reserved(&mut self, literal: Id, doc: &D) -> Option<Id> {
        let slots = self.reserved.get_mut(&literal)?;
        let at = slots.iter().position(|(seen, _)| seen.same_as(doc))?;
        Some(slots.swap_remove(at).1)
    }
}

/// Document-to-graph walker.
pub struct Normalizer<'d> {
    graph: EntityGraph,
    guard: DepthGuard,
    /// Every `(kind, id)` handed out so far, inserted or still in progress.
    claimed: HashSet<(EntityKind, Id)>,
    /// Most recent local id for each literal id.
    latest: HashMap<(EntityKind, Id), Id>,
    /// Distinct scene/grid literal ids met so far.
    literals: HashSet<(EntityKind, Id)>,
    /// Scenes/grids being inlined: `(kind, literal, local)`.
    path: Vec<(EntityKind, Id, Id)>,
    tags: Occurrences<'d, Tag>,
    clips: Occurrences<'d, ClipDoc>,
    library: Occurrences<'d, LibrarySourceDoc>,
    audios: Occurrences<'d, AudioDoc>,
    scripts: Occurrences<'d, CaptionScriptDoc>,
    playlists: Occurrences<'d, PlaylistDoc>,
    scenes: Occurrences<'d, SceneDoc>,
    grids: Occurrences<'d, SceneGridDoc>,
    overlays: Occurrences<'d, OverlayDoc>,
    groups: Occurrences<'d, SceneGroupDoc>,
}

impl<'d> Normalizer<'d> {
    pub fn new(max_depth: usize) -> Self {
        Self {
            graph: EntityGraph::new(),
            guard: DepthGuard::new(max_depth),
            claimed: HashSet::new(),
            latest: HashMap::new(),
            literals: HashSet::new(),
            path: Vec::new(),
            tags: Occurrences::default(),
            clips: Occurrences::default(),
            library: Occurrences::default(),
            audios: Occurrences::default(),
            scripts: Occurrences::default(),
            playlists: Occurrences::default(),
            scenes: Occurrences::default(),
            grids: Occurrences::default(),
            overlays: Occurrences::default(),
            groups: Occurrences::default(),
        }
    }

    pub fn finish(self) -> EntityGraph {
        self.graph
    }

    /// Claim ids for the document's top-level scenes and grids before
    /// walking anything, so bare references to them resolve even when they
    /// precede the root in the document.
    pub fn reserve_roots(&mut self, doc: &'d Document) -> Result<()> {
        for scene in &doc.scenes {
            if self.scenes.find_reserved(scene.id, scene).is_none() {
                let local = self.claim::<Scene>(scene.id)?;
                self.scenes.reserve(scene.id, scene, local);
                self.note_literal(EntityKind::Scene, scene.id);
            }
        }
        for grid in &doc.grids {
            if self.grids.find_reserved(grid.id, grid).is_none() {
                let local = self.claim::<SceneGrid>(grid.id)?;
                self.grids.reserve(grid.id, grid, local);
                self.note_literal(EntityKind::SceneGrid, grid.id);
            }
        }
        Ok(())
    }

    fn note_literal(&mut self, kind: EntityKind, literal: Id) {
        if self.literals.insert((kind, literal)) {
            self.guard.widen(1);
        }
    }

    /// Pick the local id for a new occurrence of `literal`.
    fn claim<T: Entity>(&mut self, literal: Id) -> Result<Id> {
        let table = T::table_mut(&mut self.graph);
        let local = if self.claimed.contains(&(T::KIND, literal)) {
            let fresh = table.allocate()?;
            tracing::debug!(
                "{} {} collides with a different entity; re-keyed to {}",
                T::KIND,
                literal,
                fresh
            );
            fresh
        } else {
            table.reserve(literal)?;
            literal
        };
        self.claimed.insert((T::KIND, local));
        self.latest.insert((T::KIND, literal), local);
        Ok(local)
    }

    /// Local id for a bare reference from `owner` (kind and literal id).
    fn resolve(&self, owner: (EntityKind, Id), kind: EntityKind, literal: Id) -> Result<Id> {
        self.path
            .iter()
            .rev()
            .find(|&&(k, lit, _)| k == kind && lit == literal)
            .map(|&(_, _, local)| local)
            .or_else(|| self.latest.get(&(kind, literal)).copied())
            .ok_or(StoreError::DanglingReference {
                kind: owner.0,
                id: owner.1,
                target_kind: kind,
                target_id: literal,
            })
    }

    pub fn tag(&mut self, doc: &'d Tag) -> Result<Id> {
        if let Some(local) = self.tags.find(doc.id, doc) {
            return Ok(local);
        }
        let local = self.claim::<Tag>(doc.id)?;
        self.tags.record(doc.id, doc, local);
        let mut tag = doc.clone();
        tag.id = local;
        self.graph.tags.set(tag)?;
        Ok(local)
    }

    fn tag_ids(&mut self, docs: &'d [Tag]) -> Result<Vec<Id>> {
        docs.iter().map(|t| self.tag(t)).collect()
    }

    pub fn clip(&mut self, doc: &'d ClipDoc) -> Result<Id> {
        if let Some(local) = self.clips.find(doc.id, doc) {
            return Ok(local);
        }
        let local = self.claim::<Clip>(doc.id)?;
        self.clips.record(doc.id, doc, local);
        let tags = self.tag_ids(&doc.tags)?;
        self.graph.clips.set(Clip {
            id: local,
            start: doc.start,
            end: doc.end,
            volume: doc.volume,
            tags,
        })?;
        Ok(local)
    }

    fn clip_ids(&mut self, docs: &'d [ClipDoc]) -> Result<Vec<Id>> {
        docs.iter().map(|c| self.clip(c)).collect()
    }

    pub fn library_source(&mut self, doc: &'d LibrarySourceDoc) -> Result<Id> {
        if let Some(local) = self.library.find(doc.id, doc) {
            return Ok(local);
        }
        self.guard.enter()?;
        let local = self.claim::<LibrarySource>(doc.id)?;
        self.library.record(doc.id, doc, local);
        let tags = self.tag_ids(&doc.tags)?;
        let clips = self.clip_ids(&doc.clips)?;
        let disabled_clips = self.clip_ids(&doc.disabled_clips)?;
        self.graph.library.set(LibrarySource {
            id: local,
            url: doc.url.clone(),
            tags,
            clips,
            disabled_clips,
            blacklist: doc.blacklist.clone(),
            marked: doc.marked,
            count: doc.count,
        })?;
        self.guard.leave();
        Ok(local)
    }

    pub fn audio(&mut self, doc: &'d AudioDoc) -> Result<Id> {
        if let Some(local) = self.audios.find(doc.id, doc) {
            return Ok(local);
        }
        let local = self.claim::<Audio>(doc.id)?;
        self.audios.record(doc.id, doc, local);
        let tags = self.tag_ids(&doc.tags)?;
        self.graph.audios.set(Audio {
            id: local,
            url: doc.url.clone(),
            name: doc.name.clone(),
            artist: doc.artist.clone(),
            duration: doc.duration,
            tags,
        })?;
        Ok(local)
    }

    fn audio_ids(&mut self, docs: &'d [AudioDoc]) -> Result<Vec<Id>> {
        docs.iter().map(|a| self.audio(a)).collect()
    }

    pub fn script(&mut self, doc: &'d CaptionScriptDoc) -> Result<Id> {
        if let Some(local) = self.scripts.find(doc.id, doc) {
            return Ok(local);
        }
        let local = self.claim::<CaptionScript>(doc.id)?;
        self.scripts.record(doc.id, doc, local);
        let tags = self.tag_ids(&doc.tags)?;
        self.graph.scripts.set(CaptionScript {
            id: local,
            url: doc.url.clone(),
            name: doc.name.clone(),
            stop_at_end: doc.stop_at_end,
            tags,
        })?;
        Ok(local)
    }

    pub fn playlist(&mut self, doc: &'d PlaylistDoc) -> Result<Id> {
        if let Some(local) = self.playlists.find(doc.id, doc) {
            return Ok(local);
        }
        let local = self.claim::<Playlist>(doc.id)?;
        self.playlists.record(doc.id, doc, local);
        let audios = self.audio_ids(&doc.audios)?;
        self.graph.playlists.set(Playlist {
            id: local,
            name: doc.name.clone(),
            audios,
            shuffle: doc.shuffle,
            repeat: doc.repeat,
        })?;
        Ok(local)
    }

    fn scene_ref(
        &mut self,
        owner: (EntityKind, Id),
        nested: &'d Nested<SceneDoc>,
    ) -> Result<Id> {
        match nested {
            Nested::Ref(literal) => self.resolve(owner, EntityKind::Scene, *literal),
            Nested::Inline(doc) => self.scene(doc),
        }
    }

    fn grid_ref(
        &mut self,
        owner: (EntityKind, Id),
        nested: &'d Nested<SceneGridDoc>,
    ) -> Result<Id> {
        match nested {
            Nested::Ref(literal) => self.resolve(owner, EntityKind::SceneGrid, *literal),
            Nested::Inline(doc) => self.grid(doc),
        }
    }

    fn target(&mut self, owner: (EntityKind, Id), doc: &'d TargetDoc) -> Result<TargetRef> {
        Ok(match doc {
            TargetDoc::Scene(nested) => TargetRef::Scene(self.scene_ref(owner, nested)?),
            TargetDoc::Grid(nested) => TargetRef::Grid(self.grid_ref(owner, nested)?),
        })
    }

    pub fn scene(&mut self, doc: &'d SceneDoc) -> Result<Id> {
        if let Some(local) = self.scenes.find(doc.id, doc) {
            return Ok(local);
        }
        self.note_literal(EntityKind::Scene, doc.id);
        self.guard.enter()?;
        let local = match self.scenes.take_reserved(doc.id, doc) {
            Some(local) => {
                self.latest.insert((EntityKind::Scene, doc.id), local);
                local
            }
            None => self.claim::<Scene>(doc.id)?,
        };
        self.scenes.record(doc.id, doc, local);
        self.path.push((EntityKind::Scene, doc.id, local));
        let owner = (EntityKind::Scene, doc.id);

        let sources = doc
            .sources
            .iter()
            .map(|s| self.library_source(s))
            .collect::<Result<Vec<_>>>()?;
        let overlays = doc
            .overlays
            .iter()
            .map(|o| self.overlay(o))
            .collect::<Result<Vec<_>>>()?;
        let mut audio_playlists = Vec::with_capacity(doc.audio_playlists.len());
        for playlist in &doc.audio_playlists {
            audio_playlists.push(AudioPlaylist {
                audios: self.audio_ids(&playlist.audios)?,
                shuffle: playlist.shuffle,
                repeat: playlist.repeat,
            });
        }
        let mut script_playlists = Vec::with_capacity(doc.script_playlists.len());
        for playlist in &doc.script_playlists {
            script_playlists.push(ScriptPlaylist {
                scripts: playlist
                    .scripts
                    .iter()
                    .map(|s| self.script(s))
                    .collect::<Result<Vec<_>>>()?,
                shuffle: playlist.shuffle,
                repeat: playlist.repeat,
            });
        }
        let next_scene = match &doc.next_scene {
            Some(next) => Some(self.scene_ref(owner, next)?),
            None => None,
        };
        let next_scene_randoms = doc
            .next_scene_randoms
            .iter()
            .map(|s| self.scene_ref(owner, s))
            .collect::<Result<Vec<_>>>()?;
        let library_source = match &doc.library_source {
            Some(source) => Some(self.library_source(source)?),
            None => None,
        };

        self.graph.scenes.set(Scene {
            id: local,
            name: doc.name.clone(),
            timing_ms: doc.timing_ms,
            sources,
            overlays,
            audio_playlists,
            script_playlists,
            next_scene,
            next_scene_randoms,
            library_source,
        })?;
        self.path.pop();
        self.guard.leave();
        Ok(local)
    }

    pub fn grid(&mut self, doc: &'d SceneGridDoc) -> Result<Id> {
        if let Some(local) = self.grids.find(doc.id, doc) {
            return Ok(local);
        }
        self.note_literal(EntityKind::SceneGrid, doc.id);
        self.guard.enter()?;
        let local = match self.grids.take_reserved(doc.id, doc) {
            Some(local) => {
                self.latest.insert((EntityKind::SceneGrid, doc.id), local);
                local
            }
            None => self.claim::<SceneGrid>(doc.id)?,
        };
        self.grids.record(doc.id, doc, local);
        self.path.push((EntityKind::SceneGrid, doc.id, local));
        let owner = (EntityKind::SceneGrid, doc.id);
        let mut rows = Vec::with_capacity(doc.grid.len());
        for row in &doc.grid {
            let mut cells = Vec::with_capacity(row.len());
            for cell in row {
                cells.push(GridCell {
                    scene: match &cell.scene {
                        Some(scene) => Some(self.scene_ref(owner, scene)?),
                        None => None,
                    },
                    mirror: cell.mirror,
                });
            }
            rows.push(cells);
        }
        self.graph.grids.set(SceneGrid {
            id: local,
            name: doc.name.clone(),
            grid: rows,
        })?;
        self.path.pop();
        self.guard.leave();
        Ok(local)
    }

    pub fn overlay(&mut self, doc: &'d OverlayDoc) -> Result<Id> {
        if let Some(local) = self.overlays.find(doc.id, doc) {
            return Ok(local);
        }
        self.guard.enter()?;
        let local = self.claim::<Overlay>(doc.id)?;
        self.overlays.record(doc.id, doc, local);
        let target = match &doc.target {
            Some(target) => Some(self.target((EntityKind::Overlay, doc.id), target)?),
            None => None,
        };
        self.graph.overlays.set(Overlay {
            id: local,
            target,
            opacity: doc.opacity,
        })?;
        self.guard.leave();
        Ok(local)
    }

    pub fn scene_group(&mut self, doc: &'d SceneGroupDoc) -> Result<Id> {
        if let Some(local) = self.groups.find(doc.id, doc) {
            return Ok(local);
        }
        let local = self.claim::<SceneGroup>(doc.id)?;
        self.groups.record(doc.id, doc, local);
        let owner = (EntityKind::SceneGroup, doc.id);
        let members = doc
            .members
            .iter()
            .map(|m| self.target(owner, m))
            .collect::<Result<Vec<_>>>()?;
        self.graph.scene_groups.set(SceneGroup {
            id: local,
            name: doc.name.clone(),
            members,
        })?;
        Ok(local)
    }
}
