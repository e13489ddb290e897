//! Query builder: turns a filter and a revision into executable storage
//! queries.
//!
//! A query whose estimated predicate size exceeds the configured threshold is
//! split into a sequence of smaller segments whose concatenated results equal
//! the un-split result as a multiset. Splitting only ever shards the userset
//! IN-list; the base filter is indivisible.

use lattice_observe::{query_span, record_query_result};
use lattice_types::{
    ObjectAndRelation, RelationTuple, Revision, StoreError, SubjectFilter, TupleFilter,
};
use tokio_util::sync::CancellationToken;

use crate::{Result, TupleDatastore};

/// Default predicate-size threshold, in bytes, above which a query is split.
pub const DEFAULT_SPLIT_AT_ESTIMATED_QUERY_SIZE: usize = 65536;

/// One executable slice of a (possibly split) query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuerySegment {
    pub filter: TupleFilter,
    pub usersets: Vec<ObjectAndRelation>,
    pub revision: Revision,
}

/// A forward tuple query under construction.
#[derive(Debug, Clone)]
pub struct TupleQuery {
    filter: TupleFilter,
    usersets: Vec<ObjectAndRelation>,
    revision: Revision,
    limit: Option<usize>,
    split_at_estimated_query_size: usize,
}

impl TupleQuery {
    pub fn new(filter: TupleFilter, revision: Revision) -> Self {
        Self {
            filter,
            usersets: Vec::new(),
            revision,
            limit: None,
            split_at_estimated_query_size: DEFAULT_SPLIT_AT_ESTIMATED_QUERY_SIZE,
        }
    }

    /// Restrict results to tuples whose subject is one of the given
    /// usersets. This is the only part of the predicate that splitting
    /// shards.
    pub fn with_usersets(mut self, usersets: Vec<ObjectAndRelation>) -> Self {
        self.usersets = usersets;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Override the split threshold, normally sourced from
    /// `query.split_at_estimated_query_size` in the configuration.
    pub fn with_split_threshold(mut self, split_at_estimated_query_size: usize) -> Self {
        self.split_at_estimated_query_size = split_at_estimated_query_size.max(1);
        self
    }

    fn base_size(&self) -> usize {
        self.filter.namespace.len()
            + self.filter.object_id.as_deref().map_or(0, str::len)
            + self.filter.relation.as_deref().map_or(0, str::len)
    }

    /// Estimated predicate size: a pure function of the filter string
    /// lengths plus the userset IN-list cardinality.
    pub fn estimated_size(&self) -> usize {
        self.base_size() + self.usersets.iter().map(userset_size).sum::<usize>()
    }

    /// The trace attributes derived from the filter shape.
    pub fn trace_attributes(&self) -> Vec<(&'static str, String)> {
        let mut attributes = vec![("namespace", self.filter.namespace.clone())];
        if let Some(object_id) = &self.filter.object_id {
            attributes.push(("object_id", object_id.clone()));
        }
        if let Some(relation) = &self.filter.relation {
            attributes.push(("relation", relation.clone()));
        }
        attributes
    }

    /// Plan the query as one or more segments. A query with no userset list,
    /// or one under the size threshold, is a single segment.
    pub fn segments(&self) -> Vec<QuerySegment> {
        if self.usersets.is_empty()
            || self.estimated_size() <= self.split_at_estimated_query_size
        {
            return vec![QuerySegment {
                filter: self.filter.clone(),
                usersets: self.usersets.clone(),
                revision: self.revision,
            }];
        }

        let base = self.base_size();
        let mut segments = Vec::new();
        let mut chunk: Vec<ObjectAndRelation> = Vec::new();
        let mut chunk_size = base;

        for userset in &self.usersets {
            let size = userset_size(userset);
            if !chunk.is_empty() && chunk_size + size > self.split_at_estimated_query_size {
                segments.push(QuerySegment {
                    filter: self.filter.clone(),
                    usersets: std::mem::take(&mut chunk),
                    revision: self.revision,
                });
                chunk_size = base;
            }
            chunk.push(userset.clone());
            chunk_size += size;
        }

        if !chunk.is_empty() {
            segments.push(QuerySegment {
                filter: self.filter.clone(),
                usersets: chunk,
                revision: self.revision,
            });
        }

        segments
    }

    /// Execute against the datastore, concatenating segment results.
    ///
    /// Cancellation is checked between segments and races any in-flight
    /// fetch.
    pub async fn execute(
        &self,
        store: &dyn TupleDatastore,
        cancel: &CancellationToken,
    ) -> Result<Vec<RelationTuple>> {
        let span = query_span(
            "query_tuples",
            &self.filter.namespace,
            self.filter.object_id.as_deref(),
            self.filter.relation.as_deref(),
        );

        let segments = self.segments();
        let mut results = Vec::new();

        for segment in &segments {
            if cancel.is_cancelled() {
                return Err(StoreError::WatchCanceled);
            }

            let mut batch = tokio::select! {
                _ = cancel.cancelled() => return Err(StoreError::WatchCanceled),
                fetched = store.query_tuples(&segment.filter, &segment.usersets, segment.revision) => fetched?,
            };
            results.append(&mut batch);

            if let Some(limit) = self.limit {
                if results.len() >= limit {
                    results.truncate(limit);
                    break;
                }
            }
        }

        record_query_result(&span, segments.len(), results.len());
        Ok(results)
    }
}

/// A reverse tuple query, matching on the subject side.
///
/// Reverse queries carry no IN-list and therefore never split, but they
/// share the cancellation and tracing discipline of forward queries.
#[derive(Debug, Clone)]
pub struct ReverseTupleQuery {
    subject: SubjectFilter,
    revision: Revision,
    limit: Option<usize>,
}

impl ReverseTupleQuery {
    pub fn new(subject: SubjectFilter, revision: Revision) -> Self {
        Self {
            subject,
            revision,
            limit: None,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub async fn execute(
        &self,
        store: &dyn TupleDatastore,
        cancel: &CancellationToken,
    ) -> Result<Vec<RelationTuple>> {
        let span = query_span(
            "reverse_query_tuples",
            &self.subject.namespace,
            self.subject.object_id.as_deref(),
            self.subject.relation.as_deref(),
        );

        let mut results = tokio::select! {
            _ = cancel.cancelled() => return Err(StoreError::WatchCanceled),
            fetched = store.reverse_query_tuples(&self.subject, self.revision) => fetched?,
        };

        if let Some(limit) = self.limit {
            results.truncate(limit);
        }

        record_query_result(&span, 1, results.len());
        Ok(results)
    }
}

fn userset_size(userset: &ObjectAndRelation) -> usize {
    userset.namespace.len() + userset.object_id.len() + userset.relation.len()
}
