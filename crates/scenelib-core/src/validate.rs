//! Whole-graph integrity checks.
//!
//! A graph is consistent when every reference resolves within the graph,
//! every row sits under its own id, and every allocator is ahead of the ids
//! its table has stored.

use crate::graph::{EntityGraph, TableVisitor};
use crate::kind::{EntityKind, Id};
use crate::table::{Entity, EntityTable};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Category of a [`Violation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    /// A reference names a row that does not exist.
    DanglingReference,
    /// A row is stored under a key different from its own id.
    IdMismatch,
    /// The allocator would hand out an id already used in the table.
    StaleNextId,
}

/// One integrity problem found by [`validate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub kind: ViolationKind,
    pub entity_kind: EntityKind,
    pub entity_id: Id,
    pub message: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.entity_kind, self.entity_id, self.message)
    }
}

struct Checker<'g> {
    graph: &'g EntityGraph,
    violations: Vec<Violation>,
}

impl Checker<'_> {
    fn push(
        &mut self,
        kind: ViolationKind,
        entity_kind: EntityKind,
        entity_id: Id,
        message: String,
    ) {
        self.violations.push(Violation {
            kind,
            entity_kind,
            entity_id,
            message,
        });
    }
}

impl TableVisitor for Checker<'_> {
    fn visit<T: Entity>(&mut self, table: &EntityTable<T>) {
        for (&key, row) in table.rows() {
            if row.id() != key {
                self.push(
                    ViolationKind::IdMismatch,
                    T::KIND,
                    key,
                    format!("row stored under {} carries id {}", key, row.id()),
                );
            }

            let mut missing = Vec::new();
            row.for_each_ref(&mut |kind, id| {
                if !self.graph.contains(kind, id) {
                    missing.push((kind, id));
                }
            });
            for (kind, id) in missing {
                self.push(
                    ViolationKind::DanglingReference,
                    T::KIND,
                    key,
                    format!("references missing {} {}", kind, id),
                );
            }
        }

        if let Some(&max) = table.rows().keys().next_back()
            && table.next_id() <= max
        {
            self.push(
                ViolationKind::StaleNextId,
                T::KIND,
                max,
                format!("next id {} is not above highest id {}", table.next_id(), max),
            );
        }
    }
}

/// Check referential integrity and allocator consistency of `graph`.
///
/// Returns every problem found, in table dependency order; an empty list
/// means the graph is consistent.
pub fn validate(graph: &EntityGraph) -> Vec<Violation> {
    let mut checker = Checker {
        graph,
        violations: Vec::new(),
    };
    graph.visit_tables(&mut checker);
    checker.violations
}
