//! JSON (de)serialization of project graphs and documents.

use crate::document::Document;
use crate::graph::EntityGraph;
use crate::validate::validate;
use anyhow::{Context, Result};

/// Serialize a graph to JSON.
pub fn graph_to_json(graph: &EntityGraph, pretty: bool) -> Result<String> {
    let json = if pretty {
        serde_json::to_string_pretty(graph)
    } else {
        serde_json::to_string(graph)
    };
    json.context("failed to serialize project graph to JSON")
}

/// Deserialize a graph from JSON.
///
/// Allocators that lag behind their table's ids are raised with a warning;
/// any remaining integrity violation rejects the graph.
pub fn graph_from_json(json: &str) -> Result<EntityGraph> {
    let mut graph = graph_from_json_unchecked(json)?;

    for kind in graph.repair_allocators() {
        tracing::warn!(
            "{} allocator was behind its ids; raised to {}",
            kind,
            graph.next_id(kind)
        );
    }

    let violations = validate(&graph);
    if let Some(first) = violations.first() {
        anyhow::bail!(
            "project graph is inconsistent ({} violation(s)); first: {}",
            violations.len(),
            first
        );
    }
    Ok(graph)
}

/// Deserialize a graph from JSON without repairing or validating it.
pub fn graph_from_json_unchecked(json: &str) -> Result<EntityGraph> {
    serde_json::from_str(json).context("failed to deserialize project graph from JSON")
}

/// Serialize a document to JSON.
pub fn document_to_json(doc: &Document, pretty: bool) -> Result<String> {
    let json = if pretty {
        serde_json::to_string_pretty(doc)
    } else {
        serde_json::to_string(doc)
    };
    json.context("failed to serialize document to JSON")
}

/// Deserialize a document from JSON.
pub fn document_from_json(json: &str) -> Result<Document> {
    serde_json::from_str(json).context("failed to deserialize document from JSON")
}
