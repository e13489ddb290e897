//! Stored namespace definitions.
//!
//! A namespace definition is the compiled, storable form of one `definition`
//! block of the schema language: the namespace's name plus its relations and
//! permission rewrites. Definitions are persisted as serialized documents and
//! versioned under the same aliveness model as tuples.

use serde::{Deserialize, Serialize};

/// A compiled namespace definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceDefinition {
    pub name: String,
    pub relations: Vec<RelationDef>,
}

impl NamespaceDefinition {
    pub fn new(name: impl Into<String>, relations: Vec<RelationDef>) -> Self {
        Self {
            name: name.into(),
            relations,
        }
    }

    /// Find a relation or permission by name.
    pub fn find_relation(&self, name: &str) -> Option<&RelationDef> {
        self.relations.iter().find(|r| r.name == name)
    }

    /// True if the definition carries a relation or permission of this name.
    pub fn has_relation(&self, name: &str) -> bool {
        self.find_relation(name).is_some()
    }

    /// Names of every relation and permission, in declaration order.
    pub fn relation_names(&self) -> impl Iterator<Item = &str> {
        self.relations.iter().map(|r| r.name.as_str())
    }
}

/// One relation or permission inside a namespace definition.
///
/// A plain relation carries the subject types tuples may reference
/// (`relation viewer: user | group#member`); a permission carries a userset
/// rewrite instead (`permission view = viewer + editor`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationDef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_subjects: Vec<AllowedSubject>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rewrite: Option<UsersetRewrite>,
}

impl RelationDef {
    /// A plain relation with the given allowed subject types.
    pub fn relation(name: impl Into<String>, allowed_subjects: Vec<AllowedSubject>) -> Self {
        Self {
            name: name.into(),
            allowed_subjects,
            rewrite: None,
        }
    }

    /// A permission computed by the given rewrite.
    pub fn permission(name: impl Into<String>, rewrite: UsersetRewrite) -> Self {
        Self {
            name: name.into(),
            allowed_subjects: Vec::new(),
            rewrite: Some(rewrite),
        }
    }

    pub fn is_permission(&self) -> bool {
        self.rewrite.is_some()
    }
}

/// A subject type a relation accepts: a namespace, optionally narrowed to a
/// userset relation (`group#member`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowedSubject {
    pub namespace: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relation: Option<String>,
}

impl AllowedSubject {
    /// Plain objects of a namespace (`user`).
    pub fn namespace(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            relation: None,
        }
    }

    /// A userset (`group#member`).
    pub fn userset(namespace: impl Into<String>, relation: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            relation: Some(relation.into()),
        }
    }
}

/// The boolean expression of a permission, over relation references and
/// tuple-to-userset arrows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UsersetRewrite {
    /// A reference to another relation or permission of the same namespace.
    ComputedUserset { relation: String },

    /// `tupleset->computed`: walk the tupleset relation, then evaluate
    /// `computed` on each reached object.
    TupleToUserset { tupleset: String, computed: String },

    /// `a + b`
    Union(Vec<UsersetRewrite>),

    /// `a & b`
    Intersection(Vec<UsersetRewrite>),

    /// `a - b`
    Exclusion {
        base: Box<UsersetRewrite>,
        subtract: Box<UsersetRewrite>,
    },
}

impl UsersetRewrite {
    /// A bare relation reference.
    pub fn relation(name: impl Into<String>) -> Self {
        UsersetRewrite::ComputedUserset {
            relation: name.into(),
        }
    }

    /// A `tupleset->computed` arrow.
    pub fn arrow(tupleset: impl Into<String>, computed: impl Into<String>) -> Self {
        UsersetRewrite::TupleToUserset {
            tupleset: tupleset.into(),
            computed: computed.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document_def() -> NamespaceDefinition {
        NamespaceDefinition::new(
            "document",
            vec![
                RelationDef::relation("viewer", vec![AllowedSubject::namespace("user")]),
                RelationDef::relation(
                    "editor",
                    vec![
                        AllowedSubject::namespace("user"),
                        AllowedSubject::userset("group", "member"),
                    ],
                ),
                RelationDef::permission(
                    "view",
                    UsersetRewrite::Union(vec![
                        UsersetRewrite::relation("viewer"),
                        UsersetRewrite::relation("editor"),
                    ]),
                ),
            ],
        )
    }

    #[test]
    fn test_find_relation() {
        let def = document_def();
        assert!(def.has_relation("viewer"));
        assert!(def.has_relation("view"));
        assert!(!def.has_relation("owner"));
    }

    #[test]
    fn test_permission_classification() {
        let def = document_def();
        assert!(!def.find_relation("viewer").unwrap().is_permission());
        assert!(def.find_relation("view").unwrap().is_permission());
    }

    #[test]
    fn test_relation_names_preserve_order() {
        let def = document_def();
        let names: Vec<_> = def.relation_names().collect();
        assert_eq!(names, vec!["viewer", "editor", "view"]);
    }

    #[test]
    fn test_serialized_form_round_trips() {
        let def = document_def();
        let doc = serde_json::to_string(&def).unwrap();
        let back: NamespaceDefinition = serde_json::from_str(&doc).unwrap();
        assert_eq!(back, def);
    }
}
