//! A proxy datastore that rejects every mutation.
//!
//! Wrapping a datastore in [`ReadOnlyDatastore`] is how a read-only
//! deployment is expressed: reads and the change feed delegate untouched,
//! while writes fail with `ServiceReadOnly`.

use std::sync::Arc;

use async_trait::async_trait;
use lattice_types::{
    NamespaceDefinition, ObjectAndRelation, RelationTuple, Revision, StoreError, SubjectFilter,
    TupleFilter, TupleUpdate,
};

use crate::{ChangedTuple, MetricsSnapshot, Result, TupleDatastore};

pub struct ReadOnlyDatastore {
    inner: Arc<dyn TupleDatastore>,
}

impl ReadOnlyDatastore {
    pub fn new(inner: Arc<dyn TupleDatastore>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl TupleDatastore for ReadOnlyDatastore {
    async fn head_revision(&self) -> Result<Revision> {
        self.inner.head_revision().await
    }

    async fn query_tuples(
        &self,
        filter: &TupleFilter,
        usersets: &[ObjectAndRelation],
        revision: Revision,
    ) -> Result<Vec<RelationTuple>> {
        self.inner.query_tuples(filter, usersets, revision).await
    }

    async fn reverse_query_tuples(
        &self,
        subject: &SubjectFilter,
        revision: Revision,
    ) -> Result<Vec<RelationTuple>> {
        self.inner.reverse_query_tuples(subject, revision).await
    }

    async fn write_tuples(
        &self,
        _preconditions: &[RelationTuple],
        _updates: &[TupleUpdate],
    ) -> Result<Revision> {
        Err(StoreError::ServiceReadOnly)
    }

    async fn write_namespaces(&self, _definitions: &[NamespaceDefinition]) -> Result<Revision> {
        Err(StoreError::ServiceReadOnly)
    }

    async fn read_namespace(
        &self,
        name: &str,
        revision: Revision,
    ) -> Result<(NamespaceDefinition, Revision)> {
        self.inner.read_namespace(name, revision).await
    }

    async fn list_namespaces(&self, revision: Revision) -> Result<Vec<NamespaceDefinition>> {
        self.inner.list_namespaces(revision).await
    }

    async fn changed_tuples(&self, after: Revision, until: Revision) -> Result<Vec<ChangedTuple>> {
        self.inner.changed_tuples(after, until).await
    }

    fn metrics(&self) -> Option<MetricsSnapshot> {
        self.inner.metrics()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBackend;

    fn tuple(s: &str) -> RelationTuple {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn test_reads_delegate() {
        let backing = Arc::new(MemoryBackend::new());
        let t = tuple("document:doc1#viewer@user:alice#...");
        let rev = backing
            .write_tuples(&[], &[TupleUpdate::create(t.clone())])
            .await
            .unwrap();

        let readonly = ReadOnlyDatastore::new(backing);
        let filter = TupleFilter::namespace("document");
        assert_eq!(readonly.query_tuples(&filter, &[], rev).await.unwrap(), vec![t]);
        assert_eq!(readonly.head_revision().await.unwrap(), rev);
    }

    #[tokio::test]
    async fn test_mutations_are_rejected() {
        let readonly = ReadOnlyDatastore::new(Arc::new(MemoryBackend::new()));
        let t = tuple("document:doc1#viewer@user:alice#...");

        let result = readonly.write_tuples(&[], &[TupleUpdate::create(t)]).await;
        assert!(matches!(result, Err(StoreError::ServiceReadOnly)));

        let def = NamespaceDefinition::new("document", vec![]);
        let result = readonly.write_namespace(&def).await;
        assert!(matches!(result, Err(StoreError::ServiceReadOnly)));
    }
}
