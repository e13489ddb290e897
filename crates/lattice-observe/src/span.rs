//! Span helpers carrying the trace attributes of datastore operations.
//!
//! Query spans expose the filter shape (namespace, and optionally object id
//! and relation) so observers can attribute latency per query shape.

use tracing::Span;

/// Span for a forward or reverse tuple query.
pub fn query_span(
    operation: &str,
    namespace: &str,
    object_id: Option<&str>,
    relation: Option<&str>,
) -> Span {
    tracing::debug_span!(
        "tuple_query",
        operation = operation,
        namespace = namespace,
        object_id = object_id.unwrap_or_default(),
        relation = relation.unwrap_or_default(),
        segments = tracing::field::Empty,
        result_count = tracing::field::Empty,
    )
}

/// Record the outcome of a query span.
pub fn record_query_result(span: &Span, segments: usize, result_count: usize) {
    span.record("segments", segments);
    span.record("result_count", result_count);
}

/// Span for a tuple write transaction.
pub fn write_span(precondition_count: usize, update_count: usize) -> Span {
    tracing::debug_span!(
        "tuple_write",
        preconditions = precondition_count,
        updates = update_count,
        revision = tracing::field::Empty,
    )
}

/// Span for a schema service operation.
pub fn schema_span(operation: &str) -> Span {
    tracing::info_span!(
        "schema",
        operation = operation,
        definitions = tracing::field::Empty,
    )
}
