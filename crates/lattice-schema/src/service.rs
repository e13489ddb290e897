//! The schema service: read and write namespace definitions as schema text.

use std::sync::Arc;

use lattice_config::SchemaConfig;
use lattice_store::{ReverseTupleQuery, TupleDatastore, TupleQuery};
use lattice_types::{
    NamespaceDefinition, Revision, StoreError, StoreResult, SubjectFilter, TupleFilter, ELLIPSIS,
};
use tokio_util::sync::CancellationToken;

use crate::dsl::{compile, generate};
use crate::typesystem::TypeSystem;

/// Compiles, validates, and persists namespace definitions against a
/// datastore.
pub struct SchemaService {
    store: Arc<dyn TupleDatastore>,
    prefix_required: bool,
}

impl SchemaService {
    pub fn new(store: Arc<dyn TupleDatastore>, prefix_required: bool) -> Self {
        Self {
            store,
            prefix_required,
        }
    }

    pub fn from_config(store: Arc<dyn TupleDatastore>, config: &SchemaConfig) -> Self {
        Self::new(store, config.prefix_required)
    }

    /// Read the requested definitions at the current revision and
    /// re-serialise each to its schema source form.
    ///
    /// A missing name fails the whole read with `NamespaceNotFound`.
    #[tracing::instrument(skip(self, cancel))]
    pub async fn read_schema(
        &self,
        names: &[String],
        cancel: &CancellationToken,
    ) -> StoreResult<Vec<String>> {
        let head = self.store.head_revision().await?;

        let mut sources = Vec::with_capacity(names.len());
        for name in names {
            if cancel.is_cancelled() {
                return Err(StoreError::WatchCanceled);
            }
            let (definition, _) = self.store.read_namespace(name, head).await?;
            sources.push(generate(&definition));
        }

        Ok(sources)
    }

    /// Compile and persist a schema, returning the written definition names.
    ///
    /// The write is atomic: compilation, validation, or sanity-check
    /// failures leave the store untouched, and all definitions land in one
    /// transaction.
    #[tracing::instrument(skip(self, source, cancel))]
    pub async fn write_schema(
        &self,
        source: &str,
        cancel: &CancellationToken,
    ) -> StoreResult<Vec<String>> {
        let definitions = compile(source, self.prefix_required)
            .map_err(|e| StoreError::InvalidArgument(e.to_string()))?;
        if definitions.is_empty() {
            return Err(StoreError::InvalidArgument(
                "schema defines no object definitions".to_string(),
            ));
        }
        tracing::trace!(definitions = definitions.len(), "compiled schema");

        let head = self.store.head_revision().await?;
        let existing = self.store.list_namespaces(head).await?;

        let type_system = TypeSystem::new(&definitions, &existing);
        let errors = type_system.validate_all(&definitions);
        if let Some(error) = errors.first() {
            return Err(StoreError::InvalidArgument(error.to_string()));
        }

        for definition in &definitions {
            self.sanity_check_existing_relationships(definition, head, cancel)
                .await?;
        }

        self.store.write_namespaces(&definitions).await?;
        tracing::debug!(definitions = definitions.len(), "wrote schema");

        Ok(definitions
            .into_iter()
            .map(|definition| definition.name)
            .collect())
    }

    /// Verify that every live relationship touching this namespace stays
    /// satisfiable under the replacement definition. A relation name still
    /// referenced by live tuples must survive, either as a relation or as a
    /// permission rewrite producing it.
    ///
    /// The check reads at the write's snapshot revision, on both the
    /// resource and the subject side.
    async fn sanity_check_existing_relationships(
        &self,
        definition: &NamespaceDefinition,
        revision: Revision,
        cancel: &CancellationToken,
    ) -> StoreResult<()> {
        let forward = TupleQuery::new(TupleFilter::namespace(definition.name.clone()), revision)
            .execute(self.store.as_ref(), cancel)
            .await?;
        for tuple in &forward {
            if !definition.has_relation(&tuple.resource.relation) {
                return Err(StoreError::SchemaInvariantViolation(format!(
                    "cannot write definition `{}`: relation `{}` was removed but is referenced by live relationship `{}`",
                    definition.name, tuple.resource.relation, tuple
                )));
            }
        }

        let reverse = ReverseTupleQuery::new(
            SubjectFilter::subject_namespace(definition.name.clone()),
            revision,
        )
        .execute(self.store.as_ref(), cancel)
        .await?;
        for tuple in &reverse {
            if tuple.subject.relation != ELLIPSIS && !definition.has_relation(&tuple.subject.relation)
            {
                return Err(StoreError::SchemaInvariantViolation(format!(
                    "cannot write definition `{}`: relation `{}` was removed but is referenced as a subject by live relationship `{}`",
                    definition.name, tuple.subject.relation, tuple
                )));
            }
        }

        Ok(())
    }
}
