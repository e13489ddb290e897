//! Type-system validation of namespace definitions.
//!
//! Cross-references are resolved in two passes: first every definition name
//! is collected, with the in-flight batch shadowing the stored definitions,
//! then references are bound against the collected set. Cyclic references
//! between definitions resolve naturally because binding never recurses
//! through a referenced definition.

use std::collections::{HashMap, HashSet};

use lattice_types::{NamespaceDefinition, RelationDef, UsersetRewrite};
use thiserror::Error;

/// A reference or structure error found during validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("definition `{namespace}` declares `{relation}` more than once")]
    DuplicateRelation { namespace: String, relation: String },

    #[error("relation `{namespace}#{relation}` must allow at least one subject type")]
    NoAllowedSubjects { namespace: String, relation: String },

    #[error("relation `{namespace}#{relation}` allows undefined object definition `{referenced}`")]
    UndefinedSubjectNamespace {
        namespace: String,
        relation: String,
        referenced: String,
    },

    #[error(
        "relation `{namespace}#{relation}` allows `{referenced}#{subject_relation}`, but `{referenced}` has no relation `{subject_relation}`"
    )]
    UndefinedSubjectRelation {
        namespace: String,
        relation: String,
        referenced: String,
        subject_relation: String,
    },

    #[error("permission `{namespace}#{permission}` references undefined relation `{referenced}`")]
    UndefinedRelation {
        namespace: String,
        permission: String,
        referenced: String,
    },

    #[error(
        "permission `{namespace}#{permission}` walks `{tupleset}`, which is not a plain relation of `{namespace}`"
    )]
    InvalidTupleset {
        namespace: String,
        permission: String,
        tupleset: String,
    },
}

/// Resolves names across an in-flight batch and the stored definitions.
pub struct TypeSystem<'a> {
    definitions: HashMap<&'a str, &'a NamespaceDefinition>,
}

impl<'a> TypeSystem<'a> {
    /// Collect definition names. Batch definitions shadow stored ones of the
    /// same name, so a schema replacing a definition validates against its
    /// replacement.
    pub fn new(batch: &'a [NamespaceDefinition], existing: &'a [NamespaceDefinition]) -> Self {
        let mut definitions = HashMap::new();
        for definition in existing {
            definitions.insert(definition.name.as_str(), definition);
        }
        for definition in batch {
            definitions.insert(definition.name.as_str(), definition);
        }
        Self { definitions }
    }

    pub fn lookup(&self, name: &str) -> Option<&'a NamespaceDefinition> {
        self.definitions.get(name).copied()
    }

    /// Validate every definition of the batch, returning all errors found.
    pub fn validate_all(&self, batch: &[NamespaceDefinition]) -> Vec<ValidationError> {
        batch
            .iter()
            .flat_map(|definition| self.validate(definition))
            .collect()
    }

    /// Validate a single definition against the collected names.
    pub fn validate(&self, definition: &NamespaceDefinition) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        let mut seen = HashSet::new();
        for relation in &definition.relations {
            if !seen.insert(relation.name.as_str()) {
                errors.push(ValidationError::DuplicateRelation {
                    namespace: definition.name.clone(),
                    relation: relation.name.clone(),
                });
            }
        }

        for relation in &definition.relations {
            if relation.is_permission() {
                if let Some(rewrite) = &relation.rewrite {
                    self.check_rewrite(definition, &relation.name, rewrite, &mut errors);
                }
            } else {
                self.check_relation(definition, relation, &mut errors);
            }
        }

        errors
    }

    fn check_relation(
        &self,
        definition: &NamespaceDefinition,
        relation: &RelationDef,
        errors: &mut Vec<ValidationError>,
    ) {
        if relation.allowed_subjects.is_empty() {
            errors.push(ValidationError::NoAllowedSubjects {
                namespace: definition.name.clone(),
                relation: relation.name.clone(),
            });
        }

        for subject in &relation.allowed_subjects {
            let target = match self.lookup(&subject.namespace) {
                Some(target) => target,
                None => {
                    errors.push(ValidationError::UndefinedSubjectNamespace {
                        namespace: definition.name.clone(),
                        relation: relation.name.clone(),
                        referenced: subject.namespace.clone(),
                    });
                    continue;
                }
            };

            if let Some(subject_relation) = &subject.relation {
                if !target.has_relation(subject_relation) {
                    errors.push(ValidationError::UndefinedSubjectRelation {
                        namespace: definition.name.clone(),
                        relation: relation.name.clone(),
                        referenced: subject.namespace.clone(),
                        subject_relation: subject_relation.clone(),
                    });
                }
            }
        }
    }

    fn check_rewrite(
        &self,
        definition: &NamespaceDefinition,
        permission: &str,
        rewrite: &UsersetRewrite,
        errors: &mut Vec<ValidationError>,
    ) {
        match rewrite {
            UsersetRewrite::ComputedUserset { relation } => {
                if !definition.has_relation(relation) {
                    errors.push(ValidationError::UndefinedRelation {
                        namespace: definition.name.clone(),
                        permission: permission.to_string(),
                        referenced: relation.clone(),
                    });
                }
            }
            UsersetRewrite::TupleToUserset { tupleset, .. } => {
                // The tupleset must be a plain relation: arrows walk stored
                // tuples, not computed permissions. The computed side is
                // resolved per reached object at evaluation time.
                match definition.find_relation(tupleset) {
                    Some(target) if !target.is_permission() => {}
                    _ => errors.push(ValidationError::InvalidTupleset {
                        namespace: definition.name.clone(),
                        permission: permission.to_string(),
                        tupleset: tupleset.clone(),
                    }),
                }
            }
            UsersetRewrite::Union(children) | UsersetRewrite::Intersection(children) => {
                for child in children {
                    self.check_rewrite(definition, permission, child, errors);
                }
            }
            UsersetRewrite::Exclusion { base, subtract } => {
                self.check_rewrite(definition, permission, base, errors);
                self.check_rewrite(definition, permission, subtract, errors);
            }
        }
    }
}
