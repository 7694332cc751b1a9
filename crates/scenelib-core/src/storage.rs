//! On-disk layout: the project graph lives at `<root>/.scenelib/project.json`;
//! documents are standalone JSON files anywhere.
//!
//! Every write goes to a sibling `*.tmp` file first and is renamed into
//! place, so an interrupted save never leaves a half-written project.

use crate::document::Document;
use crate::graph::EntityGraph;
use crate::schema;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

const PROJECT_DIR: &str = ".scenelib";
const PROJECT_FILE: &str = "project.json";

/// `.scenelib` under `project_root`.
pub fn project_dir(project_root: &Path) -> PathBuf {
    project_root.join(PROJECT_DIR)
}

/// The normalized graph file under `project_root`.
pub fn project_file(project_root: &Path) -> PathBuf {
    project_dir(project_root).join(PROJECT_FILE)
}

pub fn project_exists(project_root: &Path) -> bool {
    project_file(project_root).exists()
}

/// Load the project graph, repairing lagging allocators and refusing a
/// graph that fails validation.
pub fn load(project_root: &Path) -> Result<EntityGraph> {
    let path = project_file(project_root);
    let json = read_file(&path, "project")?;
    schema::graph_from_json(&json).with_context(|| format!("invalid project {}", path.display()))
}

/// Load the project graph exactly as stored.
pub fn load_unchecked(project_root: &Path) -> Result<EntityGraph> {
    let json = read_file(&project_file(project_root), "project")?;
    schema::graph_from_json_unchecked(&json)
}

pub fn save(project_root: &Path, graph: &EntityGraph, pretty: bool) -> Result<()> {
    let json = schema::graph_to_json(graph, pretty)?;
    write_file(&project_file(project_root), &json, "project")
}

pub fn read_document(path: &Path) -> Result<Document> {
    let json = read_file(path, "document")?;
    schema::document_from_json(&json)
        .with_context(|| format!("invalid document {}", path.display()))
}

pub fn write_document(path: &Path, doc: &Document, pretty: bool) -> Result<()> {
    let json = schema::document_to_json(doc, pretty)?;
    write_file(path, &json, "document")
}

fn read_file(path: &Path, what: &str) -> Result<String> {
    fs::read_to_string(path)
        .with_context(|| format!("failed to read {} from {}", what, path.display()))
}

fn write_file(path: &Path, contents: &str, what: &str) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }

    let tmp = path.with_extension("tmp");
    fs::write(&tmp, contents)
        .with_context(|| format!("failed to write {} to {}", what, tmp.display()))?;
    fs::rename(&tmp, path)
        .with_context(|| format!("failed to move {} into {}", what, path.display()))?;
    tracing::debug!("wrote {} ({} bytes)", path.display(), contents.len());
    Ok(())
}
