//! Lowering from the parsed syntax tree to stored namespace definitions.

use lattice_types::{AllowedSubject, NamespaceDefinition, RelationDef, UsersetRewrite};

use super::ast::{ParsedDeclaration, ParsedExpr, ParsedSchema};
use super::parser::parse_schema;
use super::CompileError;

/// Compile schema source into storable namespace definitions.
///
/// When `prefix_required` is true, definition names without a `prefix/`
/// segment are rejected at compile time; otherwise bare names are accepted
/// by injecting the empty prefix.
pub fn compile(
    source: &str,
    prefix_required: bool,
) -> Result<Vec<NamespaceDefinition>, CompileError> {
    let parsed = parse_schema(source)?;
    lower_schema(parsed, prefix_required)
}

fn lower_schema(
    schema: ParsedSchema,
    prefix_required: bool,
) -> Result<Vec<NamespaceDefinition>, CompileError> {
    let mut definitions = Vec::new();

    for definition in schema.definitions {
        if prefix_required && !definition.name.contains('/') {
            return Err(CompileError::MissingPrefix {
                name: definition.name,
                line: definition.position.line,
                column: definition.position.column,
            });
        }

        let mut relations = Vec::new();
        for declaration in definition.declarations {
            match declaration {
                ParsedDeclaration::Relation(relation) => {
                    let allowed_subjects = relation
                        .allowed
                        .into_iter()
                        .map(|subject| AllowedSubject {
                            namespace: subject.namespace,
                            relation: subject.relation,
                        })
                        .collect();
                    relations.push(RelationDef::relation(relation.name, allowed_subjects));
                }
                ParsedDeclaration::Permission(permission) => {
                    relations.push(RelationDef::permission(
                        permission.name,
                        lower_expr(permission.expr),
                    ));
                }
            }
        }

        definitions.push(NamespaceDefinition::new(definition.name, relations));
    }

    Ok(definitions)
}

fn lower_expr(expr: ParsedExpr) -> UsersetRewrite {
    match expr {
        ParsedExpr::RelationRef(relation) => UsersetRewrite::ComputedUserset { relation },
        ParsedExpr::Arrow { tupleset, computed } => {
            UsersetRewrite::TupleToUserset { tupleset, computed }
        }
        ParsedExpr::Union(children) => {
            UsersetRewrite::Union(children.into_iter().map(lower_expr).collect())
        }
        ParsedExpr::Intersection(children) => {
            UsersetRewrite::Intersection(children.into_iter().map(lower_expr).collect())
        }
        ParsedExpr::Exclusion { base, subtract } => UsersetRewrite::Exclusion {
            base: Box::new(lower_expr(*base)),
            subtract: Box::new(lower_expr(*subtract)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_simple_schema() {
        let source = r#"
            definition document {
                relation viewer: user | group#member
                permission view = viewer
            }
        "#;

        let definitions = compile(source, false).unwrap();
        assert_eq!(definitions.len(), 1);

        let document = &definitions[0];
        assert_eq!(document.name, "document");
        assert_eq!(document.relations.len(), 2);

        let viewer = document.find_relation("viewer").unwrap();
        assert!(!viewer.is_permission());
        assert_eq!(
            viewer.allowed_subjects,
            vec![
                AllowedSubject::namespace("user"),
                AllowedSubject::userset("group", "member"),
            ]
        );

        let view = document.find_relation("view").unwrap();
        assert_eq!(
            view.rewrite,
            Some(UsersetRewrite::relation("viewer"))
        );
    }

    #[test]
    fn test_compile_lowers_operators() {
        let source = r#"
            definition document {
                relation a: user
                relation b: user
                relation c: user
                relation parent: folder
                permission p = a + b & c - parent->p
            }
        "#;

        let definitions = compile(source, false).unwrap();
        let p = definitions[0].find_relation("p").unwrap();

        // Union of `a` and `b & (c - parent->p)`.
        match p.rewrite.as_ref().unwrap() {
            UsersetRewrite::Union(children) => {
                assert_eq!(children.len(), 2);
                assert_eq!(children[0], UsersetRewrite::relation("a"));
                match &children[1] {
                    UsersetRewrite::Intersection(inner) => {
                        assert_eq!(inner[0], UsersetRewrite::relation("b"));
                        assert_eq!(
                            inner[1],
                            UsersetRewrite::Exclusion {
                                base: Box::new(UsersetRewrite::relation("c")),
                                subtract: Box::new(UsersetRewrite::arrow("parent", "p")),
                            }
                        );
                    }
                    other => panic!("expected intersection, got {:?}", other),
                }
            }
            other => panic!("expected union, got {:?}", other),
        }
    }

    #[test]
    fn test_prefix_required_rejects_bare_names() {
        let source = "definition document { relation viewer: user }";
        let err = compile(source, true).unwrap_err();
        match err {
            CompileError::MissingPrefix { name, line, .. } => {
                assert_eq!(name, "document");
                assert_eq!(line, 1);
            }
            other => panic!("expected missing prefix error, got {:?}", other),
        }
    }

    #[test]
    fn test_prefix_required_accepts_prefixed_names() {
        let source = "definition acme/document { relation viewer: acme/user }";
        let definitions = compile(source, true).unwrap();
        assert_eq!(definitions[0].name, "acme/document");
    }

    #[test]
    fn test_prefix_not_required_accepts_both() {
        let source = r#"
            definition document { relation viewer: user }
            definition acme/folder { relation owner: user }
        "#;
        let definitions = compile(source, false).unwrap();
        assert_eq!(definitions.len(), 2);
    }

    #[test]
    fn test_declaration_order_is_preserved() {
        let source = r#"
            definition document {
                relation owner: user
                permission manage = owner
                relation viewer: user
                permission view = viewer + manage
            }
        "#;

        let definitions = compile(source, false).unwrap();
        let names: Vec<_> = definitions[0].relation_names().collect();
        assert_eq!(names, vec!["owner", "manage", "viewer", "view"]);
    }
}
