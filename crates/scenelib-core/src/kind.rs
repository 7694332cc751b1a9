//! Identifiers, entity kinds, and scene-or-grid target references.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Table-issued entity identifier. Allocators start at 1.
pub type Id = u64;

/// The row types stored in an [`EntityGraph`](crate::graph::EntityGraph).
///
/// Variants are declared in merge dependency order: every kind only refers
/// to kinds declared before it, except the Scene/SceneGrid/Overlay cluster
/// which may refer to each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntityKind {
    Tag,
    Clip,
    LibrarySource,
    Audio,
    CaptionScript,
    Playlist,
    Scene,
    SceneGrid,
    Overlay,
    SceneGroup,
}

impl EntityKind {
    /// All kinds in dependency order.
    pub const ALL: [EntityKind; 10] = [
        EntityKind::Tag,
        EntityKind::Clip,
        EntityKind::LibrarySource,
        EntityKind::Audio,
        EntityKind::CaptionScript,
        EntityKind::Playlist,
        EntityKind::Scene,
        EntityKind::SceneGrid,
        EntityKind::Overlay,
        EntityKind::SceneGroup,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tag => "tag",
            Self::Clip => "clip",
            Self::LibrarySource => "library_source",
            Self::Audio => "audio",
            Self::CaptionScript => "caption_script",
            Self::Playlist => "playlist",
            Self::Scene => "scene",
            Self::SceneGrid => "scene_grid",
            Self::Overlay => "overlay",
            Self::SceneGroup => "scene_group",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == normalized)
            .or(match normalized.as_str() {
                "source" | "library" => Some(Self::LibrarySource),
                "script" => Some(Self::CaptionScript),
                "grid" => Some(Self::SceneGrid),
                "group" => Some(Self::SceneGroup),
                _ => None,
            })
            .ok_or_else(|| format!("unknown entity kind: {}", s))
    }
}

/// Reference to either a Scene or a SceneGrid.
///
/// Overlays and scene groups can point at both; the variant decides which
/// table the id resolves against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TargetRef {
    Scene(Id),
    Grid(Id),
}

impl TargetRef {
    pub fn kind(self) -> EntityKind {
        match self {
            Self::Scene(_) => EntityKind::Scene,
            Self::Grid(_) => EntityKind::SceneGrid,
        }
    }

    pub fn id(self) -> Id {
        match self {
            Self::Scene(id) | Self::Grid(id) => id,
        }
    }

    /// Same variant, different id.
    #[must_use]
    pub fn with_id(self, id: Id) -> Self {
        match self {
            Self::Scene(_) => Self::Scene(id),
            Self::Grid(_) => Self::Grid(id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_order_is_dependency_order() {
        let mut sorted = EntityKind::ALL;
        sorted.sort();
        assert_eq!(sorted, EntityKind::ALL);
        assert!(EntityKind::Tag < EntityKind::Scene);
    }

    #[test]
    fn test_kind_from_str_aliases() {
        assert_eq!("scene".parse::<EntityKind>(), Ok(EntityKind::Scene));
        assert_eq!("grid".parse::<EntityKind>(), Ok(EntityKind::SceneGrid));
        assert_eq!(
            "library-source".parse::<EntityKind>(),
            Ok(EntityKind::LibrarySource)
        );
        assert!("widget".parse::<EntityKind>().is_err());
    }

    #[test]
    fn test_target_ref_serializes_tagged() {
        let json = serde_json::to_string(&TargetRef::Grid(4)).unwrap();
        assert_eq!(json, r#"{"grid":4}"#);
        let back: TargetRef = serde_json::from_str(r#"{"scene":7}"#).unwrap();
        assert_eq!(back, TargetRef::Scene(7));
        assert_eq!(back.with_id(9), TargetRef::Scene(9));
        assert_eq!(TargetRef::Grid(1).kind(), EntityKind::SceneGrid);
    }
}
