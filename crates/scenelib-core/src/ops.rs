//! Export, import, backup, and restore: the operations a UI dispatcher calls.

use crate::codec;
use crate::config::StoreConfig;
use crate::document::Document;
use crate::error::Result;
use crate::graph::EntityGraph;
use crate::kind::{EntityKind, Id};
use crate::merge::{IdMapping, MergeEngine, MergePolicy};
use chrono::Utc;

/// Export the given roots, stamped with the current time.
pub fn export_document(
    graph: &EntityGraph,
    roots: &[(EntityKind, Id)],
    config: &StoreConfig,
) -> Result<Document> {
    let mut doc = codec::export(graph, roots, config.codec.max_depth)?;
    doc.exported_at = Some(Utc::now());
    tracing::debug!("exported {} root(s)", doc.root_count());
    Ok(doc)
}

/// Export one scene with everything it reaches.
pub fn export_scene(graph: &EntityGraph, scene_id: Id, config: &StoreConfig) -> Result<Document> {
    export_document(graph, &[(EntityKind::Scene, scene_id)], config)
}

/// Export every library source with its tags and clips.
pub fn export_library(graph: &EntityGraph, config: &StoreConfig) -> Result<Document> {
    let roots: Vec<_> = graph
        .library
        .ids()
        .into_iter()
        .map(|id| (EntityKind::LibrarySource, id))
        .collect();
    export_document(graph, &roots, config)
}

/// Export every row of every kind as a root.
///
/// Scenes and grids are nested by id only, so long scene chains and wide
/// random fan-out keep the backup shallow and linear in size.
pub fn backup(graph: &EntityGraph, config: &StoreConfig) -> Result<Document> {
    let roots: Vec<_> = EntityKind::ALL
        .iter()
        .flat_map(|&kind| graph.ids(kind).into_iter().map(move |id| (kind, id)))
        .collect();
    let mut doc = codec::export_shared(graph, &roots, config.codec.max_depth)?;
    doc.exported_at = Some(Utc::now());
    tracing::debug!("backed up {} row(s)", doc.root_count());
    Ok(doc)
}

/// Normalize `doc` and merge it into `graph`.
///
/// On error `graph` is unchanged.
pub fn import_document(
    graph: &mut EntityGraph,
    doc: &Document,
    policy: MergePolicy,
    config: &StoreConfig,
) -> Result<IdMapping> {
    let source = codec::normalize(doc, config.codec.max_depth)?;
    tracing::info!(
        "importing {} root(s) normalized to {} row(s)",
        doc.root_count(),
        source.stats().total
    );
    MergeEngine::new(policy).merge(graph, &source)
}

/// Rebuild a graph from a backup document.
pub fn restore_backup(doc: &Document, config: &StoreConfig) -> Result<(EntityGraph, IdMapping)> {
    let mut graph = EntityGraph::new();
    let mapping = import_document(&mut graph, doc, MergePolicy::ExactEquality, config)?;
    Ok((graph, mapping))
}
