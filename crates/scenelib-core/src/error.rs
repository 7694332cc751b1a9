//! Error taxonomy for table, codec, merge, and validation failures.

use crate::kind::{EntityKind, Id};
use crate::validate::Violation;
use thiserror::Error;

/// Errors raised by the data layer.
///
/// File and JSON failures belong to the persistence layer and are reported
/// through `anyhow` there; they never reach this type.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    /// Lookup or delete of an id the table does not hold.
    #[error("{kind} {id} not found")]
    NotFound { kind: EntityKind, id: Id },

    /// `create` with an id that is already occupied.
    #[error("{kind} {id} already exists")]
    AlreadyExists { kind: EntityKind, id: Id },

    /// The id leaves no room above it for the table allocator.
    #[error("{kind} id {id} is out of range")]
    IdOutOfRange { kind: EntityKind, id: Id },

    /// A reference in an incoming document resolves to nothing.
    #[error("{kind} {id} references missing {target_kind} {target_id}")]
    DanglingReference {
        kind: EntityKind,
        id: Id,
        target_kind: EntityKind,
        target_id: Id,
    },

    /// Nested entity depth exceeded the configured limit.
    #[error("document nesting exceeds depth limit of {limit}")]
    CycleDepthExceeded { limit: usize },

    /// The merged graph failed the integrity check; nothing was committed.
    #[error("graph validation failed with {} violation(s)", .0.len())]
    ValidationFailure(Vec<Violation>),
}

impl StoreError {
    pub(crate) fn not_found(kind: EntityKind, id: Id) -> Self {
        Self::NotFound { kind, id }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
