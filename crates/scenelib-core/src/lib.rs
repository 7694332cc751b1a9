//! Core types and storage for scene-library projects.
//!
//! Entities live in flat ID-indexed tables ([`table::EntityTable`]) grouped in
//! an [`graph::EntityGraph`]. Subsets of a graph are exported to nested,
//! self-contained [`document::Document`]s and imported back through the
//! normalizing codec and the [`merge::MergeEngine`], which validates the
//! result before committing it.

pub mod codec;
pub mod config;
pub mod document;
pub mod error;
pub mod graph;
pub mod kind;
pub mod merge;
pub mod model;
pub mod ops;
pub mod schema;
pub mod storage;
pub mod table;
pub mod validate;
