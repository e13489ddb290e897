//! # Lattice Store - Revisioned Tuple Storage
//!
//! The storage core of LatticeDB: an MVCC-style tuple store in which every
//! row carries a creation and deletion transaction, enabling consistent reads
//! at any retained revision, plus the query builder and the watch engine that
//! streams per-revision change sets to subscribers.

use async_trait::async_trait;
use lattice_types::{
    NamespaceDefinition, ObjectAndRelation, RelationTuple, Revision, StoreResult, SubjectFilter,
    TupleFilter, TupleUpdate,
};

pub mod factory;
pub mod memory;
pub mod metrics;
pub mod query;
pub mod readonly;
pub mod watch;

pub use factory::{BackendType, StorageConfig, StorageFactory};
pub use memory::MemoryBackend;
pub use metrics::{MetricsSnapshot, OpTimer, StoreMetrics};
pub use query::{QuerySegment, ReverseTupleQuery, TupleQuery};
pub use readonly::ReadOnlyDatastore;
pub use watch::{WatchEngine, WatchSubscription};

type Result<T> = StoreResult<T>;

/// A stored row as surfaced to the change feed: the tuple plus the
/// transactions bounding its lifetime. `deleted` is `None` while the row is
/// live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangedTuple {
    pub tuple: RelationTuple,
    pub created: Revision,
    pub deleted: Option<Revision>,
}

/// The abstract revisioned datastore interface.
///
/// All reads are point-in-time: they observe exactly the rows alive at the
/// given revision. A successful write is linearizable against reads: any
/// read at or after the returned revision observes it, any read strictly
/// before does not.
#[async_trait]
pub trait TupleDatastore: Send + Sync {
    /// The current head revision (the latest allocated transaction).
    ///
    /// The counter never decreases across the lifetime of a datastore;
    /// persistent backends resume it from the stored maximum on startup.
    async fn head_revision(&self) -> Result<Revision>;

    /// Return all tuples alive at `revision` matching the resource filter.
    ///
    /// When `usersets` is non-empty, only tuples whose subject is one of the
    /// given usersets are returned. Most callers should go through
    /// [`TupleQuery`], which handles size-based splitting of the userset
    /// list.
    async fn query_tuples(
        &self,
        filter: &TupleFilter,
        usersets: &[ObjectAndRelation],
        revision: Revision,
    ) -> Result<Vec<RelationTuple>>;

    /// Return all tuples alive at `revision` whose subject matches.
    async fn reverse_query_tuples(
        &self,
        subject: &SubjectFilter,
        revision: Revision,
    ) -> Result<Vec<RelationTuple>>;

    /// Atomically apply a batch of tuple updates, allocating one new
    /// transaction.
    ///
    /// Every precondition tuple must be alive at the write's snapshot or the
    /// whole write fails with `PreconditionFailed`. CREATE inserts a tuple
    /// that must not already be live; TOUCH asserts existence idempotently;
    /// DELETE retires the currently-alive row.
    async fn write_tuples(
        &self,
        preconditions: &[RelationTuple],
        updates: &[TupleUpdate],
    ) -> Result<Revision>;

    /// Atomically persist a batch of namespace definitions in one
    /// transaction, replacing any live definitions of the same names.
    async fn write_namespaces(&self, definitions: &[NamespaceDefinition]) -> Result<Revision>;

    /// Persist a single namespace definition.
    async fn write_namespace(&self, definition: &NamespaceDefinition) -> Result<Revision> {
        self.write_namespaces(std::slice::from_ref(definition)).await
    }

    /// Read the namespace definition alive at `revision`, returning it with
    /// the revision at which it was written.
    async fn read_namespace(
        &self,
        name: &str,
        revision: Revision,
    ) -> Result<(NamespaceDefinition, Revision)>;

    /// All namespace definitions alive at `revision`.
    async fn list_namespaces(&self, revision: Revision) -> Result<Vec<NamespaceDefinition>>;

    /// Every stored row whose creation or deletion transaction falls in
    /// `(after, until]`. This is the raw feed the watch engine groups and
    /// collapses.
    async fn changed_tuples(&self, after: Revision, until: Revision) -> Result<Vec<ChangedTuple>>;

    /// Snapshot of in-process operation metrics, when the backend keeps
    /// them.
    fn metrics(&self) -> Option<MetricsSnapshot> {
        None
    }
}
