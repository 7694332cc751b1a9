//! Denormalized, self-contained document form of a graph subset.
//!
//! Every reference is replaced by the referenced entity, inlined recursively
//! down to tags. The same entity may appear several times. The only place a
//! bare id survives is [`Nested::Ref`], which the exporter emits when a scene
//! or grid is already being inlined further up the same path.

use crate::kind::Id;
use crate::model::Tag;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A scene or grid reference inside a document: inlined, or a bare id naming
/// an ancestor on the current path or a top-level scene/grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Nested<T> {
    Ref(Id),
    Inline(Box<T>),
}

impl<T> Nested<T> {
    pub fn inline(value: T) -> Self {
        Self::Inline(Box::new(value))
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClipDoc {
    pub id: Id,
    pub start: f64,
    pub end: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<u8>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibrarySourceDoc {
    pub id: Id,
    pub url: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<Tag>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub clips: Vec<ClipDoc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub disabled_clips: Vec<ClipDoc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blacklist: Vec<String>,
    #[serde(default)]
    pub marked: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioDoc {
    pub id: Id,
    pub url: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptionScriptDoc {
    pub id: Id,
    pub url: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub stop_at_end: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistDoc {
    pub id: Id,
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub audios: Vec<AudioDoc>,
    #[serde(default)]
    pub shuffle: bool,
    #[serde(default)]
    pub repeat: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioPlaylistDoc {
    #[serde(default)]
    pub audios: Vec<AudioDoc>,
    #[serde(default)]
    pub shuffle: bool,
    #[serde(default)]
    pub repeat: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptPlaylistDoc {
    #[serde(default)]
    pub scripts: Vec<CaptionScriptDoc>,
    #[serde(default)]
    pub shuffle: bool,
    #[serde(default)]
    pub repeat: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneDoc {
    pub id: Id,
    pub name: String,
    #[serde(default)]
    pub timing_ms: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<LibrarySourceDoc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub overlays: Vec<OverlayDoc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub audio_playlists: Vec<AudioPlaylistDoc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub script_playlists: Vec<ScriptPlaylistDoc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_scene: Option<Nested<SceneDoc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub next_scene_randoms: Vec<Nested<SceneDoc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub library_source: Option<LibrarySourceDoc>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridCellDoc {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scene: Option<Nested<SceneDoc>>,
    #[serde(default)]
    pub mirror: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneGridDoc {
    pub id: Id,
    pub name: String,
    #[serde(default)]
    pub grid: Vec<Vec<GridCellDoc>>,
}

/// Inline form of [`TargetRef`](crate::kind::TargetRef).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TargetDoc {
    Scene(Nested<SceneDoc>),
    Grid(Nested<SceneGridDoc>),
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlayDoc {
    pub id: Id,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<TargetDoc>,
    #[serde(default)]
    pub opacity: u8,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneGroupDoc {
    pub id: Id,
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub members: Vec<TargetDoc>,
}

/// A portable document. Top-level fields hold the root entities by kind.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Document {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exported_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub scenes: Vec<SceneDoc>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub library: Vec<LibrarySourceDoc>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<Tag>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub clips: Vec<ClipDoc>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub audios: Vec<AudioDoc>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub scripts: Vec<CaptionScriptDoc>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub grids: Vec<SceneGridDoc>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub overlays: Vec<OverlayDoc>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub playlists: Vec<PlaylistDoc>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub scene_groups: Vec<SceneGroupDoc>,
}

impl Document {
    /// Number of root entities across all kinds.
    pub fn root_count(&self) -> usize {
        self.scenes.len()
            + self.library.len()
            + self.tags.len()
            + self.clips.len()
            + self.audios.len()
            + self.scripts.len()
            + self.grids.len()
            + self.overlays.len()
            + self.playlists.len()
            + self.scene_groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.root_count() == 0
    }
}

/// Occurrence equality used while normalizing.
///
/// Same as `PartialEq`, except that a [`Nested::Ref`] equals any nested
/// entity carrying the same id: a back-reference and an inline copy of the
/// same scene or grid describe the same entity.
pub trait DocEq {
    fn same_as(&self, other: &Self) -> bool;
}

fn all_same<T: DocEq>(a: &[T], b: &[T]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.same_as(y))
}

impl<T: DocEq> DocEq for Option<T> {
    fn same_as(&self, other: &Self) -> bool {
        match (self, other) {
            (Some(a), Some(b)) => a.same_as(b),
            (None, None) => true,
            _ => false,
        }
    }
}

impl DocEq for Nested<SceneDoc> {
    fn same_as(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Inline(a), Self::Inline(b)) => a.same_as(b),
            (Self::Ref(a), Self::Ref(b)) => a == b,
            (Self::Ref(id), Self::Inline(doc)) | (Self::Inline(doc), Self::Ref(id)) => doc.id == *id,
        }
    }
}

impl DocEq for Nested<SceneGridDoc> {
    fn same_as(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Inline(a), Self::Inline(b)) => a.same_as(b),
            (Self::Ref(a), Self::Ref(b)) => a == b,
            (Self::Ref(id), Self::Inline(doc)) | (Self::Inline(doc), Self::Ref(id)) => doc.id == *id,
        }
    }
}

impl DocEq for TargetDoc {
    fn same_as(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Scene(a), Self::Scene(b)) => a.same_as(b),
            (Self::Grid(a), Self::Grid(b)) => a.same_as(b),
            _ => false,
        }
    }
}

impl DocEq for OverlayDoc {
    fn same_as(&self, other: &Self) -> bool {
        self.id == other.id && self.opacity == other.opacity && self.target.same_as(&other.target)
    }
}

impl DocEq for GridCellDoc {
    fn same_as(&self, other: &Self) -> bool {
        self.mirror == other.mirror && self.scene.same_as(&other.scene)
    }
}

impl DocEq for Vec<GridCellDoc> {
    fn same_as(&self, other: &Self) -> bool {
        all_same(self, other)
    }
}

impl DocEq for SceneGridDoc {
    fn same_as(&self, other: &Self) -> bool {
        self.id == other.id && self.name == other.name && all_same(&self.grid, &other.grid)
    }
}

impl DocEq for SceneDoc {
    fn same_as(&self, other: &Self) -> bool {
        self.id == other.id
            && self.name == other.name
            && self.timing_ms == other.timing_ms
            && self.sources == other.sources
            && all_same(&self.overlays, &other.overlays)
            && self.audio_playlists == other.audio_playlists
            && self.script_playlists == other.script_playlists
            && self.next_scene.same_as(&other.next_scene)
            && all_same(&self.next_scene_randoms, &other.next_scene_randoms)
            && self.library_source == other.library_source
    }
}

impl DocEq for SceneGroupDoc {
    fn same_as(&self, other: &Self) -> bool {
        self.id == other.id && self.name == other.name && all_same(&self.members, &other.members)
    }
}

// Kinds that never contain back-references compare exactly.
impl DocEq for Tag {
    fn same_as(&self, other: &Self) -> bool {
        self == other
    }
}

impl DocEq for ClipDoc {
    fn same_as(&self, other: &Self) -> bool {
        self == other
    }
}

impl DocEq for LibrarySourceDoc {
    fn same_as(&self, other: &Self) -> bool {
        self == other
    }
}

impl DocEq for AudioDoc {
    fn same_as(&self, other: &Self) -> bool {
        self == other
    }
}

impl DocEq for CaptionScriptDoc {
    fn same_as(&self, other: &Self) -> bool {
        self == other
    }
}

impl DocEq for PlaylistDoc {
    fn same_as(&self, other: &Self) -> bool {
        self == other
    }
}
