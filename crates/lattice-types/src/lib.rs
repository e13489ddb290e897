//! # Lattice Types
//!
//! Shared type definitions for the LatticeDB storage core.
//!
//! This crate provides the domain types used across the LatticeDB ecosystem,
//! ensuring a single source of truth and preventing circular dependencies:
//! relation tuples, revisions, change records, namespace definitions, and the
//! stable error taxonomy.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod namespace;
pub mod tuple;

pub use namespace::{AllowedSubject, NamespaceDefinition, RelationDef, UsersetRewrite};
pub use tuple::{
    ObjectAndRelation, RelationTuple, RevisionChanges, SubjectFilter, TupleFilter, TupleUpdate,
    UpdateOperation, ELLIPSIS, MAX_FIELD_LENGTH,
};

// ============================================================================
// Revisions
// ============================================================================

/// An opaque revision token denoting a consistent snapshot of the datastore.
///
/// Internally a monotone `u64` transaction counter. Revisions are totally
/// ordered and never decrease across the lifetime of a datastore. On the wire
/// a revision is transported as its decimal string form, which is also its
/// serde representation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Revision(pub u64);

impl Revision {
    /// The revision of an empty datastore, before any transaction.
    pub fn zero() -> Self {
        Self(0)
    }

    /// The next revision in sequence.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// The underlying transaction counter value.
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Revision {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u64>().map(Revision)
    }
}

impl Serialize for Revision {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Revision {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        encoded.parse().map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// Error Taxonomy
// ============================================================================

/// The stable error surface of the storage core.
///
/// Compile, validation, and precondition errors are final and must not be
/// retried. Transient storage failures surface as [`StoreError::Internal`]
/// and may be retried at the caller's discretion. Watch subscriptions never
/// retry internally; they terminate and require re-subscription.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A namespace was read by a name that has no live definition.
    #[error("object definition `{0}` not found")]
    NamespaceNotFound(String),

    /// Malformed input: DSL compile error, type-system validation error,
    /// malformed filter, or an empty required field.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A write precondition tuple was not alive at the write's snapshot.
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    /// A schema write would leave live relationships without a defined
    /// relation.
    #[error("schema invariant violation: {0}")]
    SchemaInvariantViolation(String),

    /// A read was attempted at a revision older than the earliest retained
    /// transaction.
    #[error("revision {0} is older than the earliest retained revision")]
    RevisionExpired(Revision),

    /// The caller cancelled the operation. For watch subscriptions this is
    /// part of the normal shutdown path.
    #[error("watch canceled by caller")]
    WatchCanceled,

    /// Backpressure forced a watch subscription to terminate. The consumer
    /// should re-subscribe from its last received revision.
    #[error("watch disconnected: emission buffer full")]
    WatchDisconnected,

    /// A mutation was attempted against a read-only datastore.
    #[error("datastore is read-only")]
    ServiceReadOnly,

    /// Any other storage or encoding failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Internal(format!("serialization error: {}", err))
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;
