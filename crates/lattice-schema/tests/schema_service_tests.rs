//! End-to-end scenarios for the schema service.

use std::sync::Arc;

use lattice_config::SchemaConfig;
use lattice_schema::{compile, SchemaService};
use lattice_store::{MemoryBackend, TupleDatastore};
use lattice_types::{RelationTuple, StoreError, TupleUpdate};
use tokio_util::sync::CancellationToken;

fn tuple(s: &str) -> RelationTuple {
    s.parse().unwrap()
}

#[tokio::test]
async fn test_schema_round_trip() {
    let store: Arc<dyn TupleDatastore> = Arc::new(MemoryBackend::new());
    let service = SchemaService::new(Arc::clone(&store), false);
    let cancel = CancellationToken::new();

    let source = r#"
        definition user {
            relation self: user
        }

        definition document {
            relation viewer: user
            relation editor: user
            permission view = viewer + editor
        }
    "#;

    let names = service.write_schema(source, &cancel).await.unwrap();
    assert_eq!(names, vec!["user", "document"]);

    let read_back = service.read_schema(&names, &cancel).await.unwrap();
    assert_eq!(read_back.len(), 2);

    // The regenerated text recompiles to definitions structurally equal to
    // the first compilation.
    let original = compile(source, false).unwrap();
    let recompiled = compile(&read_back.join("\n\n"), false).unwrap();
    assert_eq!(original, recompiled);
}

#[tokio::test]
async fn test_schema_invariant_scenario() {
    let store: Arc<dyn TupleDatastore> = Arc::new(MemoryBackend::new());
    let service = SchemaService::new(Arc::clone(&store), false);
    let cancel = CancellationToken::new();

    service
        .write_schema(
            r#"
            definition user {
                relation self: user
            }

            definition document {
                relation viewer: user
            }
            "#,
            &cancel,
        )
        .await
        .unwrap();

    store
        .write_tuples(
            &[],
            &[TupleUpdate::create(tuple(
                "document:x#viewer@user:alice#...",
            ))],
        )
        .await
        .unwrap();

    let head_before = store.head_revision().await.unwrap();

    // A new `document` definition without `viewer` must be rejected and
    // nothing persisted.
    let result = service
        .write_schema(
            r#"
            definition document {
                relation owner: user
            }
            "#,
            &cancel,
        )
        .await;
    assert!(matches!(result, Err(StoreError::SchemaInvariantViolation(_))));
    assert_eq!(store.head_revision().await.unwrap(), head_before);

    let (stored, _) = store
        .read_namespace("document", head_before)
        .await
        .unwrap();
    assert!(stored.has_relation("viewer"));
    assert!(!stored.has_relation("owner"));
}

#[tokio::test]
async fn test_schema_replacement_allowed_when_tuples_survive() {
    let store: Arc<dyn TupleDatastore> = Arc::new(MemoryBackend::new());
    let service = SchemaService::new(Arc::clone(&store), false);
    let cancel = CancellationToken::new();

    service
        .write_schema(
            r#"
            definition user {
                relation self: user
            }

            definition document {
                relation viewer: user
            }
            "#,
            &cancel,
        )
        .await
        .unwrap();

    store
        .write_tuples(
            &[],
            &[TupleUpdate::create(tuple(
                "document:x#viewer@user:alice#...",
            ))],
        )
        .await
        .unwrap();

    // The replacement keeps `viewer` (as a relation) and adds more; the
    // live tuple stays satisfiable.
    let names = service
        .write_schema(
            r#"
            definition document {
                relation viewer: user
                relation owner: user
                permission view = viewer + owner
            }
            "#,
            &cancel,
        )
        .await
        .unwrap();
    assert_eq!(names, vec!["document"]);
}

#[tokio::test]
async fn test_prefix_policy_from_config() {
    let store: Arc<dyn TupleDatastore> = Arc::new(MemoryBackend::new());
    let config = SchemaConfig {
        prefix_required: true,
    };
    let service = SchemaService::from_config(Arc::clone(&store), &config);
    let cancel = CancellationToken::new();

    let bare = "definition user { relation self: user }";
    let result = service.write_schema(bare, &cancel).await;
    match result {
        Err(StoreError::InvalidArgument(message)) => {
            assert!(message.contains("prefix"), "unexpected message: {}", message);
        }
        other => panic!("expected invalid argument, got {:?}", other),
    }

    let prefixed = "definition acme/user { relation self: acme/user }";
    let names = service.write_schema(prefixed, &cancel).await.unwrap();
    assert_eq!(names, vec!["acme/user"]);
}

#[tokio::test]
async fn test_cross_referencing_definitions_in_one_batch() {
    let store: Arc<dyn TupleDatastore> = Arc::new(MemoryBackend::new());
    let service = SchemaService::new(Arc::clone(&store), false);
    let cancel = CancellationToken::new();

    // `alpha` and `beta` reference each other; the batch must validate as a
    // whole.
    let source = r#"
        definition alpha {
            relation linked: beta
        }

        definition beta {
            relation linked: alpha
        }
    "#;

    let names = service.write_schema(source, &cancel).await.unwrap();
    assert_eq!(names, vec!["alpha", "beta"]);
}

#[tokio::test]
async fn test_schema_write_is_visible_to_tuple_writes() {
    let store: Arc<dyn TupleDatastore> = Arc::new(MemoryBackend::new());
    let service = SchemaService::new(Arc::clone(&store), false);
    let cancel = CancellationToken::new();

    let schema_rev = {
        service
            .write_schema(
                r#"
                definition user {
                    relation self: user
                }

                definition document {
                    relation viewer: user
                }
                "#,
                &cancel,
            )
            .await
            .unwrap();
        store.head_revision().await.unwrap()
    };

    // Namespace definitions and tuples share one revision space: the tuple
    // write lands strictly after the schema write.
    let tuple_rev = store
        .write_tuples(
            &[],
            &[TupleUpdate::create(tuple(
                "document:doc1#viewer@user:alice#...",
            ))],
        )
        .await
        .unwrap();
    assert!(tuple_rev > schema_rev);

    let (definition, written_at) = store.read_namespace("document", tuple_rev).await.unwrap();
    assert!(definition.has_relation("viewer"));
    assert!(written_at <= schema_rev);
}
