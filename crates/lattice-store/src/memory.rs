//! In-memory MVCC storage backend for testing and development.
//!
//! Every tuple row carries the transaction that created it and, once
//! retired, the transaction that deleted it. A row is alive at revision `R`
//! iff `created <= R` and it was not deleted at or before `R`. At most one
//! live row exists per distinct tuple.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use lattice_types::{
    NamespaceDefinition, ObjectAndRelation, RelationTuple, Revision, StoreError, SubjectFilter,
    TupleFilter, TupleUpdate, UpdateOperation,
};
use tokio::sync::RwLock;

use crate::{ChangedTuple, MetricsSnapshot, OpTimer, Result, StoreMetrics, TupleDatastore};

/// A versioned tuple row.
#[derive(Debug, Clone, PartialEq, Eq)]
struct TupleRow {
    tuple: RelationTuple,
    created: Revision,
    deleted: Option<Revision>,
}

impl TupleRow {
    fn alive_at(&self, revision: Revision) -> bool {
        if self.created > revision {
            return false;
        }
        match self.deleted {
            None => true,
            Some(deleted) => deleted > revision,
        }
    }
}

/// A versioned namespace definition row, stored in serialized form.
#[derive(Debug, Clone)]
struct NamespaceRow {
    name: String,
    serialized_config: String,
    created: Revision,
    deleted: Option<Revision>,
}

impl NamespaceRow {
    fn alive_at(&self, revision: Revision) -> bool {
        if self.created > revision {
            return false;
        }
        match self.deleted {
            None => true,
            Some(deleted) => deleted > revision,
        }
    }
}

struct StoreInner {
    /// All tuple rows, including retired versions.
    rows: Vec<TupleRow>,

    /// Canonical tuple string of each live row, pointing at its index.
    live: HashMap<String, usize>,

    /// All namespace definition rows, including retired versions.
    namespaces: Vec<NamespaceRow>,

    /// Name of each live namespace row, pointing at its index.
    live_namespaces: HashMap<String, usize>,

    /// The last allocated transaction.
    counter: u64,

    /// Revisions below this value have been garbage collected.
    oldest_retained: u64,
}

impl StoreInner {
    fn new() -> Self {
        Self {
            rows: Vec::new(),
            live: HashMap::new(),
            namespaces: Vec::new(),
            live_namespaces: HashMap::new(),
            counter: 0,
            oldest_retained: 0,
        }
    }

    fn check_revision(&self, revision: Revision) -> Result<()> {
        if revision.value() < self.oldest_retained {
            return Err(StoreError::RevisionExpired(revision));
        }
        if revision.value() > self.counter {
            return Err(StoreError::InvalidArgument(format!(
                "revision {} is ahead of the datastore head {}",
                revision, self.counter
            )));
        }
        Ok(())
    }

    fn insert_live_row(&mut self, tuple: RelationTuple, created: Revision) {
        let key = tuple.to_string();
        let index = self.rows.len();
        self.rows.push(TupleRow {
            tuple,
            created,
            deleted: None,
        });
        self.live.insert(key, index);
    }

    fn retire_live_row(&mut self, key: &str, deleted: Revision) {
        if let Some(index) = self.live.remove(key) {
            self.rows[index].deleted = Some(deleted);
        }
    }

    fn rebuild_indexes(&mut self) {
        self.live = self
            .rows
            .iter()
            .enumerate()
            .filter(|(_, row)| row.deleted.is_none())
            .map(|(index, row)| (row.tuple.to_string(), index))
            .collect();
        self.live_namespaces = self
            .namespaces
            .iter()
            .enumerate()
            .filter(|(_, row)| row.deleted.is_none())
            .map(|(index, row)| (row.name.clone(), index))
            .collect();
    }
}

/// In-memory datastore with full MVCC revision support.
pub struct MemoryBackend {
    inner: Arc<RwLock<StoreInner>>,
    metrics: Arc<StoreMetrics>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(StoreInner::new())),
            metrics: Arc::new(StoreMetrics::new()),
        }
    }

    /// Drop rows whose deletion transaction is at or below `before` and
    /// advance the retained horizon. Reads below the horizon fail with
    /// `RevisionExpired`.
    ///
    /// Returns the number of rows removed.
    pub async fn gc_before(&self, before: Revision) -> Result<usize> {
        let mut inner = self.inner.write().await;
        let horizon = before.value().min(inner.counter);

        let rows_before = inner.rows.len();
        inner
            .rows
            .retain(|row| !matches!(row.deleted, Some(deleted) if deleted.value() <= horizon));
        let namespaces_before = inner.namespaces.len();
        inner
            .namespaces
            .retain(|row| !matches!(row.deleted, Some(deleted) if deleted.value() <= horizon));

        let removed =
            rows_before - inner.rows.len() + (namespaces_before - inner.namespaces.len());
        if removed > 0 {
            inner.rebuild_indexes();
        }
        inner.oldest_retained = inner.oldest_retained.max(horizon);

        Ok(removed)
    }

    /// Check that a CREATE/TOUCH/DELETE batch is applicable, without
    /// mutating anything. The live set is simulated through the batch so a
    /// CREATE after a same-batch DELETE of the same tuple is legal.
    fn check_updates(inner: &StoreInner, updates: &[TupleUpdate]) -> Result<()> {
        let mut added: HashSet<String> = HashSet::new();
        let mut removed: HashSet<String> = HashSet::new();

        for update in updates {
            let key = update.tuple.to_string();
            let currently_live =
                added.contains(&key) || (inner.live.contains_key(&key) && !removed.contains(&key));

            match update.operation {
                UpdateOperation::Create => {
                    if currently_live {
                        return Err(StoreError::PreconditionFailed(format!(
                            "cannot create tuple `{}`: it already exists",
                            key
                        )));
                    }
                    added.insert(key);
                }
                UpdateOperation::Touch => {
                    removed.remove(&key);
                    added.insert(key);
                }
                UpdateOperation::Delete => {
                    added.remove(&key);
                    removed.insert(key);
                }
            }
        }

        Ok(())
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TupleDatastore for MemoryBackend {
    async fn head_revision(&self) -> Result<Revision> {
        let inner = self.inner.read().await;
        Ok(Revision(inner.counter))
    }

    async fn query_tuples(
        &self,
        filter: &TupleFilter,
        usersets: &[ObjectAndRelation],
        revision: Revision,
    ) -> Result<Vec<RelationTuple>> {
        let timer = OpTimer::new();
        filter.validate().map_err(StoreError::InvalidArgument)?;

        let inner = self.inner.read().await;
        if let Err(e) = inner.check_revision(revision) {
            self.metrics.record_query(timer.elapsed(), true);
            return Err(e);
        }

        let tuples = inner
            .rows
            .iter()
            .filter(|row| {
                row.alive_at(revision)
                    && filter.matches(&row.tuple)
                    && (usersets.is_empty() || usersets.contains(&row.tuple.subject))
            })
            .map(|row| row.tuple.clone())
            .collect();

        self.metrics.record_query(timer.elapsed(), false);
        Ok(tuples)
    }

    async fn reverse_query_tuples(
        &self,
        subject: &SubjectFilter,
        revision: Revision,
    ) -> Result<Vec<RelationTuple>> {
        let timer = OpTimer::new();
        subject.validate().map_err(StoreError::InvalidArgument)?;

        let inner = self.inner.read().await;
        if let Err(e) = inner.check_revision(revision) {
            self.metrics.record_query(timer.elapsed(), true);
            return Err(e);
        }

        let tuples = inner
            .rows
            .iter()
            .filter(|row| row.alive_at(revision) && subject.matches(&row.tuple))
            .map(|row| row.tuple.clone())
            .collect();

        self.metrics.record_query(timer.elapsed(), false);
        Ok(tuples)
    }

    async fn write_tuples(
        &self,
        preconditions: &[RelationTuple],
        updates: &[TupleUpdate],
    ) -> Result<Revision> {
        let timer = OpTimer::new();

        for update in updates {
            update
                .tuple
                .validate()
                .map_err(StoreError::InvalidArgument)?;
        }

        let mut inner = self.inner.write().await;

        for precondition in preconditions {
            let key = precondition.to_string();
            if !inner.live.contains_key(&key) {
                self.metrics.record_write(timer.elapsed(), true);
                return Err(StoreError::PreconditionFailed(format!(
                    "tuple `{}` is not alive",
                    key
                )));
            }
        }

        if let Err(e) = Self::check_updates(&inner, updates) {
            self.metrics.record_write(timer.elapsed(), true);
            return Err(e);
        }

        let txn = Revision(inner.counter + 1);

        for update in updates {
            let key = update.tuple.to_string();
            match update.operation {
                UpdateOperation::Create => {
                    inner.insert_live_row(update.tuple.clone(), txn);
                }
                UpdateOperation::Touch => {
                    // Retire any existing live row and insert a fresh one at
                    // this transaction. The watch collapsing rule keeps the
                    // feed free of the resulting same-revision delete.
                    inner.retire_live_row(&key, txn);
                    inner.insert_live_row(update.tuple.clone(), txn);
                }
                UpdateOperation::Delete => {
                    inner.retire_live_row(&key, txn);
                }
            }
        }

        inner.counter = txn.value();
        self.metrics.record_write(timer.elapsed(), false);
        Ok(txn)
    }

    async fn write_namespaces(&self, definitions: &[NamespaceDefinition]) -> Result<Revision> {
        let timer = OpTimer::new();

        if definitions.is_empty() {
            return Err(StoreError::InvalidArgument(
                "at least one namespace definition is required".to_string(),
            ));
        }
        for definition in definitions {
            if definition.name.is_empty() {
                return Err(StoreError::InvalidArgument(
                    "namespace name must not be empty".to_string(),
                ));
            }
        }

        let mut inner = self.inner.write().await;
        let txn = Revision(inner.counter + 1);

        for definition in definitions {
            let serialized_config = serde_json::to_string(definition)?;

            if let Some(index) = inner.live_namespaces.remove(&definition.name) {
                inner.namespaces[index].deleted = Some(txn);
            }

            let index = inner.namespaces.len();
            inner.namespaces.push(NamespaceRow {
                name: definition.name.clone(),
                serialized_config,
                created: txn,
                deleted: None,
            });
            inner.live_namespaces.insert(definition.name.clone(), index);
        }

        inner.counter = txn.value();
        self.metrics.record_namespace(timer.elapsed(), false);
        Ok(txn)
    }

    async fn read_namespace(
        &self,
        name: &str,
        revision: Revision,
    ) -> Result<(NamespaceDefinition, Revision)> {
        let timer = OpTimer::new();
        let inner = self.inner.read().await;
        if let Err(e) = inner.check_revision(revision) {
            self.metrics.record_namespace(timer.elapsed(), true);
            return Err(e);
        }

        let row = inner
            .namespaces
            .iter()
            .find(|row| row.name == name && row.alive_at(revision));

        match row {
            Some(row) => {
                let definition: NamespaceDefinition =
                    serde_json::from_str(&row.serialized_config)?;
                self.metrics.record_namespace(timer.elapsed(), false);
                Ok((definition, row.created))
            }
            None => {
                self.metrics.record_namespace(timer.elapsed(), true);
                Err(StoreError::NamespaceNotFound(name.to_string()))
            }
        }
    }

    async fn list_namespaces(&self, revision: Revision) -> Result<Vec<NamespaceDefinition>> {
        let inner = self.inner.read().await;
        inner.check_revision(revision)?;

        inner
            .namespaces
            .iter()
            .filter(|row| row.alive_at(revision))
            .map(|row| serde_json::from_str(&row.serialized_config).map_err(StoreError::from))
            .collect()
    }

    async fn changed_tuples(&self, after: Revision, until: Revision) -> Result<Vec<ChangedTuple>> {
        let inner = self.inner.read().await;

        let changed = inner
            .rows
            .iter()
            .filter(|row| {
                let created_in_range = row.created > after && row.created <= until;
                let deleted_in_range = matches!(
                    row.deleted,
                    Some(deleted) if deleted > after && deleted <= until
                );
                created_in_range || deleted_in_range
            })
            .map(|row| ChangedTuple {
                tuple: row.tuple.clone(),
                created: row.created,
                deleted: row.deleted,
            })
            .collect();

        Ok(changed)
    }

    fn metrics(&self) -> Option<MetricsSnapshot> {
        Some(self.metrics.snapshot())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tuple(s: &str) -> RelationTuple {
        s.parse().unwrap()
    }

    // =========================================================================
    // WRITE / QUERY TESTS
    // =========================================================================

    #[tokio::test]
    async fn test_write_then_query() {
        let store = MemoryBackend::new();
        let t = tuple("document:doc1#viewer@user:alice#...");

        let rev = store
            .write_tuples(&[], &[TupleUpdate::create(t.clone())])
            .await
            .unwrap();
        assert_eq!(rev, Revision(1));

        let filter = TupleFilter::namespace("document").with_object_id("doc1");
        let results = store.query_tuples(&filter, &[], rev).await.unwrap();
        assert_eq!(results, vec![t]);
    }

    #[tokio::test]
    async fn test_query_before_write_is_empty() {
        let store = MemoryBackend::new();
        let t = tuple("document:doc1#viewer@user:alice#...");
        store
            .write_tuples(&[], &[TupleUpdate::create(t)])
            .await
            .unwrap();

        let filter = TupleFilter::namespace("document");
        let results = store.query_tuples(&filter, &[], Revision::zero()).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_query_above_head_is_rejected() {
        let store = MemoryBackend::new();
        let filter = TupleFilter::namespace("document");
        let result = store.query_tuples(&filter, &[], Revision(7)).await;
        assert!(matches!(result, Err(StoreError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_delete_retires_row_at_new_revision() {
        let store = MemoryBackend::new();
        let t = tuple("document:doc1#viewer@user:alice#...");

        let r1 = store
            .write_tuples(&[], &[TupleUpdate::create(t.clone())])
            .await
            .unwrap();
        let r2 = store
            .write_tuples(&[], &[TupleUpdate::delete(t.clone())])
            .await
            .unwrap();
        assert_eq!(r2, Revision(2));

        let filter = TupleFilter::namespace("document");
        assert_eq!(store.query_tuples(&filter, &[], r1).await.unwrap().len(), 1);
        assert!(store.query_tuples(&filter, &[], r2).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_touch_is_idempotent() {
        let store = MemoryBackend::new();
        let t = tuple("document:doc1#viewer@user:alice#...");

        store
            .write_tuples(&[], &[TupleUpdate::touch(t.clone())])
            .await
            .unwrap();
        let rev = store
            .write_tuples(&[], &[TupleUpdate::touch(t.clone())])
            .await
            .unwrap();

        let filter = TupleFilter::namespace("document");
        let results = store.query_tuples(&filter, &[], rev).await.unwrap();
        assert_eq!(results, vec![t]);
    }

    #[tokio::test]
    async fn test_create_duplicate_fails() {
        let store = MemoryBackend::new();
        let t = tuple("document:doc1#viewer@user:alice#...");

        store
            .write_tuples(&[], &[TupleUpdate::create(t.clone())])
            .await
            .unwrap();
        let result = store.write_tuples(&[], &[TupleUpdate::create(t)]).await;
        assert!(matches!(result, Err(StoreError::PreconditionFailed(_))));
    }

    #[tokio::test]
    async fn test_create_after_delete_in_same_batch() {
        let store = MemoryBackend::new();
        let t = tuple("document:doc1#viewer@user:alice#...");
        store
            .write_tuples(&[], &[TupleUpdate::create(t.clone())])
            .await
            .unwrap();

        let rev = store
            .write_tuples(
                &[],
                &[TupleUpdate::delete(t.clone()), TupleUpdate::create(t.clone())],
            )
            .await
            .unwrap();

        let filter = TupleFilter::namespace("document");
        assert_eq!(store.query_tuples(&filter, &[], rev).await.unwrap(), vec![t]);
    }

    #[tokio::test]
    async fn test_delete_without_live_row_is_noop() {
        let store = MemoryBackend::new();
        let t = tuple("document:doc1#viewer@user:alice#...");

        let rev = store
            .write_tuples(&[], &[TupleUpdate::delete(t)])
            .await
            .unwrap();
        assert_eq!(rev, Revision(1));
    }

    #[tokio::test]
    async fn test_write_rejects_empty_fields() {
        let store = MemoryBackend::new();
        let mut t = tuple("document:doc1#viewer@user:alice#...");
        t.subject.object_id = String::new();

        let result = store.write_tuples(&[], &[TupleUpdate::create(t)]).await;
        assert!(matches!(result, Err(StoreError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_failed_write_allocates_no_revision() {
        let store = MemoryBackend::new();
        let t = tuple("document:doc1#viewer@user:alice#...");

        let result = store
            .write_tuples(&[t.clone()], &[TupleUpdate::create(t)])
            .await;
        assert!(matches!(result, Err(StoreError::PreconditionFailed(_))));
        assert_eq!(store.head_revision().await.unwrap(), Revision::zero());
    }

    // =========================================================================
    // PRECONDITION TESTS
    // =========================================================================

    #[tokio::test]
    async fn test_precondition_satisfied() {
        let store = MemoryBackend::new();
        let t1 = tuple("document:doc1#viewer@user:alice#...");
        let t2 = tuple("document:doc1#editor@user:bob#...");

        store
            .write_tuples(&[], &[TupleUpdate::create(t1.clone())])
            .await
            .unwrap();
        let result = store
            .write_tuples(&[t1], &[TupleUpdate::create(t2)])
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_precondition_on_deleted_tuple_fails() {
        let store = MemoryBackend::new();
        let t1 = tuple("document:doc1#viewer@user:alice#...");
        let t2 = tuple("document:doc1#editor@user:bob#...");

        store
            .write_tuples(&[], &[TupleUpdate::create(t1.clone())])
            .await
            .unwrap();
        store
            .write_tuples(&[], &[TupleUpdate::delete(t1.clone())])
            .await
            .unwrap();

        let result = store
            .write_tuples(&[t1], &[TupleUpdate::create(t2)])
            .await;
        assert!(matches!(result, Err(StoreError::PreconditionFailed(_))));
    }

    // =========================================================================
    // REVERSE QUERY TESTS
    // =========================================================================

    #[tokio::test]
    async fn test_reverse_query_flavors() {
        let store = MemoryBackend::new();
        let t1 = tuple("document:doc1#viewer@user:alice#...");
        let t2 = tuple("document:doc2#viewer@group:eng#member");
        let rev = store
            .write_tuples(
                &[],
                &[TupleUpdate::create(t1.clone()), TupleUpdate::create(t2.clone())],
            )
            .await
            .unwrap();

        let by_subject = SubjectFilter::subject(&ObjectAndRelation::new("user", "alice", "..."));
        assert_eq!(
            store.reverse_query_tuples(&by_subject, rev).await.unwrap(),
            vec![t1]
        );

        let by_relation = SubjectFilter::subject_relation("group", "member");
        assert_eq!(
            store.reverse_query_tuples(&by_relation, rev).await.unwrap(),
            vec![t2.clone()]
        );

        let by_namespace = SubjectFilter::subject_namespace("group");
        assert_eq!(
            store.reverse_query_tuples(&by_namespace, rev).await.unwrap(),
            vec![t2]
        );
    }

    // =========================================================================
    // GARBAGE COLLECTION TESTS
    // =========================================================================

    #[tokio::test]
    async fn test_gc_expires_old_revisions() {
        let store = MemoryBackend::new();
        let t = tuple("document:doc1#viewer@user:alice#...");

        store
            .write_tuples(&[], &[TupleUpdate::create(t.clone())])
            .await
            .unwrap();
        store
            .write_tuples(&[], &[TupleUpdate::delete(t)])
            .await
            .unwrap();

        let removed = store.gc_before(Revision(2)).await.unwrap();
        assert_eq!(removed, 1);

        let filter = TupleFilter::namespace("document");
        let result = store.query_tuples(&filter, &[], Revision(1)).await;
        assert!(matches!(result, Err(StoreError::RevisionExpired(_))));

        // The horizon itself stays readable.
        assert!(store.query_tuples(&filter, &[], Revision(2)).await.is_ok());
    }

    #[tokio::test]
    async fn test_gc_keeps_live_rows() {
        let store = MemoryBackend::new();
        let t = tuple("document:doc1#viewer@user:alice#...");
        let rev = store
            .write_tuples(&[], &[TupleUpdate::create(t.clone())])
            .await
            .unwrap();

        store.gc_before(rev).await.unwrap();

        let filter = TupleFilter::namespace("document");
        assert_eq!(store.query_tuples(&filter, &[], rev).await.unwrap(), vec![t]);
    }

    // =========================================================================
    // NAMESPACE TESTS
    // =========================================================================

    fn simple_def(name: &str) -> NamespaceDefinition {
        use lattice_types::{AllowedSubject, RelationDef};
        NamespaceDefinition::new(
            name,
            vec![RelationDef::relation(
                "viewer",
                vec![AllowedSubject::namespace("user")],
            )],
        )
    }

    #[tokio::test]
    async fn test_namespace_write_and_read() {
        let store = MemoryBackend::new();
        let def = simple_def("document");

        let rev = store.write_namespace(&def).await.unwrap();
        let (read, written_at) = store.read_namespace("document", rev).await.unwrap();
        assert_eq!(read, def);
        assert_eq!(written_at, rev);
    }

    #[tokio::test]
    async fn test_namespace_read_unknown_name() {
        let store = MemoryBackend::new();
        let rev = store.head_revision().await.unwrap();
        let result = store.read_namespace("missing", rev).await;
        assert!(matches!(result, Err(StoreError::NamespaceNotFound(_))));
    }

    #[tokio::test]
    async fn test_namespace_replacement_is_versioned() {
        let store = MemoryBackend::new();
        let v1 = simple_def("document");
        let mut v2 = simple_def("document");
        v2.relations[0].name = "reader".to_string();

        let r1 = store.write_namespace(&v1).await.unwrap();
        let r2 = store.write_namespace(&v2).await.unwrap();

        let (at_r1, _) = store.read_namespace("document", r1).await.unwrap();
        assert_eq!(at_r1, v1);
        let (at_r2, _) = store.read_namespace("document", r2).await.unwrap();
        assert_eq!(at_r2, v2);
    }

    #[tokio::test]
    async fn test_namespace_batch_write_is_one_transaction() {
        let store = MemoryBackend::new();
        let defs = vec![simple_def("document"), simple_def("folder")];

        let rev = store.write_namespaces(&defs).await.unwrap();
        assert_eq!(rev, Revision(1));

        let listed = store.list_namespaces(rev).await.unwrap();
        assert_eq!(listed.len(), 2);
    }

    // =========================================================================
    // CHANGE FEED TESTS
    // =========================================================================

    #[tokio::test]
    async fn test_changed_tuples_interval() {
        let store = MemoryBackend::new();
        let t1 = tuple("document:doc1#viewer@user:alice#...");
        let t2 = tuple("document:doc2#viewer@user:bob#...");

        store
            .write_tuples(&[], &[TupleUpdate::create(t1.clone())])
            .await
            .unwrap();
        store
            .write_tuples(&[], &[TupleUpdate::create(t2)])
            .await
            .unwrap();
        store
            .write_tuples(&[], &[TupleUpdate::delete(t1)])
            .await
            .unwrap();

        // Only revision 2 and 3 activity falls in (1, 3].
        let changed = store
            .changed_tuples(Revision(1), Revision(3))
            .await
            .unwrap();
        assert_eq!(changed.len(), 2);

        let created_in_range: Vec<_> = changed
            .iter()
            .filter(|c| c.created > Revision(1))
            .collect();
        assert_eq!(created_in_range.len(), 1);
    }

    #[tokio::test]
    async fn test_metrics_are_recorded() {
        let store = MemoryBackend::new();
        let t = tuple("document:doc1#viewer@user:alice#...");
        let rev = store
            .write_tuples(&[], &[TupleUpdate::create(t)])
            .await
            .unwrap();
        let filter = TupleFilter::namespace("document");
        store.query_tuples(&filter, &[], rev).await.unwrap();

        let snapshot = TupleDatastore::metrics(&store).unwrap();
        assert_eq!(snapshot.write_count, 1);
        assert_eq!(snapshot.query_count, 1);
    }
}
