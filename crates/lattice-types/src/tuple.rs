//! Relation tuples, filters, and change records.
//!
//! A relation tuple asserts that a resource stands in a named relation to a
//! subject, where the subject may itself be a userset. The canonical text
//! form `ns:id#rel@sns:sid#srel` is used as a map key by the change feed and
//! as the human-readable rendering everywhere else.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Revision;

/// The reserved subject-relation denoting "the subject itself, not a userset".
pub const ELLIPSIS: &str = "...";

/// Upper bound, in bytes, on every tuple field.
pub const MAX_FIELD_LENGTH: usize = 128;

/// A (namespace, object id, relation) triple.
///
/// Used both as the resource side of a tuple and, as a userset, the subject
/// side.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectAndRelation {
    pub namespace: String,
    pub object_id: String,
    pub relation: String,
}

impl ObjectAndRelation {
    pub fn new(
        namespace: impl Into<String>,
        object_id: impl Into<String>,
        relation: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            object_id: object_id.into(),
            relation: relation.into(),
        }
    }
}

impl fmt::Display for ObjectAndRelation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}#{}", self.namespace, self.object_id, self.relation)
    }
}

/// A stored authorization fact: `resource` stands in `resource.relation` to
/// `subject`.
///
/// The subject's relation may be [`ELLIPSIS`], meaning the subject is the
/// object itself rather than a userset.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RelationTuple {
    pub resource: ObjectAndRelation,
    pub subject: ObjectAndRelation,
}

impl RelationTuple {
    pub fn new(resource: ObjectAndRelation, subject: ObjectAndRelation) -> Self {
        Self { resource, subject }
    }

    /// True if the subject is a plain object rather than a userset.
    pub fn has_ellipsis_subject(&self) -> bool {
        self.subject.relation == ELLIPSIS
    }

    /// Validate the tuple for storage.
    ///
    /// Every field must be non-empty and at most [`MAX_FIELD_LENGTH`] bytes;
    /// [`ELLIPSIS`] is only legal in the subject-relation position.
    pub fn validate(&self) -> std::result::Result<(), String> {
        let fields = [
            ("resource namespace", &self.resource.namespace),
            ("resource object id", &self.resource.object_id),
            ("resource relation", &self.resource.relation),
            ("subject namespace", &self.subject.namespace),
            ("subject object id", &self.subject.object_id),
            ("subject relation", &self.subject.relation),
        ];

        for (label, value) in fields {
            if value.is_empty() {
                return Err(format!("{} must not be empty", label));
            }
            if value.len() > MAX_FIELD_LENGTH {
                return Err(format!(
                    "{} exceeds the {}-byte field limit",
                    label, MAX_FIELD_LENGTH
                ));
            }
        }

        if self.resource.relation == ELLIPSIS {
            return Err("resource relation must not be the reserved ellipsis".to_string());
        }

        Ok(())
    }
}

impl fmt::Display for RelationTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.resource, self.subject)
    }
}

/// Error returned when parsing a canonical tuple string fails.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed tuple string `{0}`")]
pub struct ParseTupleError(pub String);

fn parse_object_and_relation(s: &str) -> Option<ObjectAndRelation> {
    let (namespace, rest) = s.split_once(':')?;
    let (object_id, relation) = rest.split_once('#')?;
    if namespace.is_empty() || object_id.is_empty() || relation.is_empty() {
        return None;
    }
    Some(ObjectAndRelation::new(namespace, object_id, relation))
}

impl FromStr for RelationTuple {
    type Err = ParseTupleError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let err = || ParseTupleError(s.to_string());
        let (resource, subject) = s.split_once('@').ok_or_else(err)?;
        Ok(RelationTuple {
            resource: parse_object_and_relation(resource).ok_or_else(err)?,
            subject: parse_object_and_relation(subject).ok_or_else(err)?,
        })
    }
}

// ============================================================================
// Query Filters
// ============================================================================

/// A forward query filter over the resource side of tuples.
///
/// The namespace is required; absent fields are wildcards. A present field
/// matches exactly and never matches a literal empty string, because empty
/// fields are rejected at write time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TupleFilter {
    pub namespace: String,
    pub object_id: Option<String>,
    pub relation: Option<String>,
}

impl TupleFilter {
    /// All tuples in a namespace.
    pub fn namespace(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            object_id: None,
            relation: None,
        }
    }

    pub fn with_object_id(mut self, object_id: impl Into<String>) -> Self {
        self.object_id = Some(object_id.into());
        self
    }

    pub fn with_relation(mut self, relation: impl Into<String>) -> Self {
        self.relation = Some(relation.into());
        self
    }

    /// Validate the filter shape. Provided fields must be non-empty.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.namespace.is_empty() {
            return Err("filter namespace must not be empty".to_string());
        }
        if matches!(&self.object_id, Some(id) if id.is_empty()) {
            return Err("filter object id must not be empty when provided".to_string());
        }
        if matches!(&self.relation, Some(rel) if rel.is_empty()) {
            return Err("filter relation must not be empty when provided".to_string());
        }
        Ok(())
    }

    /// True if the tuple's resource side satisfies this filter.
    pub fn matches(&self, tuple: &RelationTuple) -> bool {
        if tuple.resource.namespace != self.namespace {
            return false;
        }
        if let Some(object_id) = &self.object_id {
            if &tuple.resource.object_id != object_id {
                return false;
            }
        }
        if let Some(relation) = &self.relation {
            if &tuple.resource.relation != relation {
                return false;
            }
        }
        true
    }
}

/// A reverse query filter over the subject side of tuples.
///
/// Three flavors are supported: a full subject, a (namespace, relation)
/// pair, or a namespace alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectFilter {
    pub namespace: String,
    pub object_id: Option<String>,
    pub relation: Option<String>,
}

impl SubjectFilter {
    /// Tuples whose subject equals the given userset exactly.
    pub fn subject(subject: &ObjectAndRelation) -> Self {
        Self {
            namespace: subject.namespace.clone(),
            object_id: Some(subject.object_id.clone()),
            relation: Some(subject.relation.clone()),
        }
    }

    /// Tuples whose subject carries the given namespace and relation.
    pub fn subject_relation(namespace: impl Into<String>, relation: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            object_id: None,
            relation: Some(relation.into()),
        }
    }

    /// Tuples whose subject lives in the given namespace.
    pub fn subject_namespace(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            object_id: None,
            relation: None,
        }
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.namespace.is_empty() {
            return Err("subject filter namespace must not be empty".to_string());
        }
        if matches!(&self.object_id, Some(id) if id.is_empty()) {
            return Err("subject filter object id must not be empty when provided".to_string());
        }
        if matches!(&self.relation, Some(rel) if rel.is_empty()) {
            return Err("subject filter relation must not be empty when provided".to_string());
        }
        Ok(())
    }

    /// True if the tuple's subject side satisfies this filter.
    pub fn matches(&self, tuple: &RelationTuple) -> bool {
        if tuple.subject.namespace != self.namespace {
            return false;
        }
        if let Some(object_id) = &self.object_id {
            if &tuple.subject.object_id != object_id {
                return false;
            }
        }
        if let Some(relation) = &self.relation {
            if &tuple.subject.relation != relation {
                return false;
            }
        }
        true
    }
}

// ============================================================================
// Updates and Change Records
// ============================================================================

/// The kind of mutation applied to a tuple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UpdateOperation {
    /// Insert a tuple that must not already exist.
    Create,
    /// Assert a tuple exists; a no-op if an equal live tuple is present.
    Touch,
    /// Remove the currently-alive tuple.
    Delete,
}

/// A single tuple mutation, as submitted to a write and as emitted by the
/// change feed (which only ever carries TOUCH and DELETE).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TupleUpdate {
    pub operation: UpdateOperation,
    pub tuple: RelationTuple,
}

impl TupleUpdate {
    pub fn create(tuple: RelationTuple) -> Self {
        Self {
            operation: UpdateOperation::Create,
            tuple,
        }
    }

    pub fn touch(tuple: RelationTuple) -> Self {
        Self {
            operation: UpdateOperation::Touch,
            tuple,
        }
    }

    pub fn delete(tuple: RelationTuple) -> Self {
        Self {
            operation: UpdateOperation::Delete,
            tuple,
        }
    }
}

/// The collapsed change set of a single revision, as delivered to watchers.
///
/// Consumers must treat `changes` as a set: ordering within one revision is
/// unspecified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionChanges {
    pub revision: Revision,
    pub changes: Vec<TupleUpdate>,
}
