//! Top-level pipeline facade.
//!
//! Owns the process-wide singletons (schema registry, alias dictionary,
//! embedding indices, file store) and composes them into the five
//! driver-facing operations. Registry and aliases load eagerly at
//! construction; embedding indices build lazily behind a one-shot
//! barrier so the first caller pays for the build and everyone else
//! reads lock-free.

use std::collections::HashMap;
use std::sync::OnceLock;

use anyhow::Context;
use talentmap_engine::{check_mappings, ingest, transform, validate};
use talentmap_protocol::{
    config, CancellationToken, Config, EntityDetection, FileId, Mapping, OutputFormat,
    ParseMetadata, PipelineError, PipelineResult, ResolutionReport, ValidationReport,
};
use talentmap_resolver::{
    detect_entity, EmbeddingIndex, EntityCandidate, FieldResolver, HashEmbedder, TextEmbedder,
};
use talentmap_schema::{AliasDictionary, EntityAliases, EntitySchema, SchemaRegistry};
use talentmap_store::FileStore;

/// Per-entity embedding indices, built once on first use.
struct SemanticState {
    indices: HashMap<String, EmbeddingIndex>,
}

/// The assembled pipeline.
pub struct Pipeline {
    config: Config,
    registry: SchemaRegistry,
    aliases_by_entity: HashMap<String, EntityAliases>,
    embedder: HashEmbedder,
    semantic: OnceLock<Option<SemanticState>>,
    store: FileStore,
}

impl Pipeline {
    /// Load schemas and aliases and wire up the store. Schema problems
    /// are configuration errors: refuse to start.
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let registry = SchemaRegistry::builtin().context("failed to load entity schemas")?;
        let aliases =
            AliasDictionary::builtin(&registry).context("failed to load alias dictionary")?;
        let aliases_by_entity = registry
            .entities()
            .iter()
            .map(|e| (e.name.clone(), aliases.for_entity(&e.name)))
            .collect();
        Ok(Self {
            store: FileStore::new(config.file_ttl_secs),
            config,
            registry,
            aliases_by_entity,
            embedder: HashEmbedder::new(),
            semantic: OnceLock::new(),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// Ingest an upload and park it in the store.
    pub fn ingest(&self, bytes: &[u8], filename: &str) -> PipelineResult<(FileId, ParseMetadata)> {
        let start = std::time::Instant::now();
        let (table, metadata) = ingest(bytes, filename, &self.config)?;
        let elapsed = start.elapsed();
        if elapsed.as_secs() > config::INGEST_TIMEOUT_SECS {
            return Err(PipelineError::Timeout {
                operation: format!("ingestion of '{filename}'"),
                limit_secs: config::INGEST_TIMEOUT_SECS,
                elapsed_secs: elapsed.as_secs_f64(),
            });
        }
        let file_id = self.store.store(table, metadata.clone());
        Ok((file_id, metadata))
    }

    /// Infer the most likely target entity for a stored file.
    pub fn detect_entity(&self, file_id: &FileId) -> PipelineResult<EntityDetection> {
        let stored = self.store.retrieve(file_id)?;
        let semantic = self.semantic_state();
        let candidates: Vec<EntityCandidate<'_>> = self
            .registry
            .entities()
            .iter()
            .map(|schema| EntityCandidate {
                schema,
                aliases: self.entity_aliases(schema),
                semantic: semantic
                    .and_then(|s| s.indices.get(&schema.name))
                    .map(|index| (index, &self.embedder as &dyn TextEmbedder)),
            })
            .collect();
        detect_entity(
            &stored.table().columns,
            &candidates,
            self.config.min_confidence,
            &CancellationToken::new(),
        )
    }

    /// Resolve a stored file's columns against a named entity.
    pub fn auto_map(&self, file_id: &FileId, entity_name: &str) -> PipelineResult<ResolutionReport> {
        let stored = self.store.retrieve(file_id)?;
        let schema = self.schema(entity_name)?;
        let resolver = self.resolver_for(schema);
        let start = std::time::Instant::now();
        let report = resolver.resolve(
            &stored.table().columns,
            self.config.min_confidence,
            &CancellationToken::new(),
        )?;
        let elapsed = start.elapsed();
        if elapsed.as_secs() > config::RESOLVE_SOFT_TIMEOUT_SECS
            && stored.table().column_count() <= 100
        {
            tracing::warn!(
                entity = entity_name,
                columns = stored.table().column_count(),
                elapsed_secs = elapsed.as_secs_f64(),
                "resolution exceeded its soft time budget"
            );
        }
        Ok(report)
    }

    /// Validate a mapping set against a stored file.
    pub fn validate(
        &self,
        file_id: &FileId,
        entity_name: &str,
        mappings: &[Mapping],
    ) -> PipelineResult<ValidationReport> {
        let stored = self.store.retrieve(file_id)?;
        let schema = self.schema(entity_name)?;
        check_mappings(stored.table(), schema, mappings)?;
        Ok(validate(stored.table(), schema, mappings))
    }

    /// Apply mappings and emit the artifact bytes.
    pub fn transform(
        &self,
        file_id: &FileId,
        entity_name: &str,
        mappings: &[Mapping],
        format: OutputFormat,
    ) -> PipelineResult<Vec<u8>> {
        let stored = self.store.retrieve(file_id)?;
        let schema = self.schema(entity_name)?;
        transform(
            stored.table(),
            schema,
            mappings,
            stored.metadata(),
            format,
            &self.config,
            &CancellationToken::new(),
        )
    }

    /// Evict expired uploads; returns the eviction count.
    pub fn cleanup_expired(&self) -> usize {
        self.store.cleanup_expired()
    }

    fn schema(&self, entity_name: &str) -> PipelineResult<&EntitySchema> {
        self.registry
            .get(entity_name)
            .ok_or_else(|| PipelineError::SchemaNotFound {
                entity: entity_name.to_string(),
                known: self.registry.entity_names().join(", "),
            })
    }

    fn entity_aliases(&self, schema: &EntitySchema) -> &EntityAliases {
        static EMPTY: OnceLock<EntityAliases> = OnceLock::new();
        self.aliases_by_entity
            .get(&schema.name)
            .unwrap_or_else(|| EMPTY.get_or_init(EntityAliases::default))
    }

    fn resolver_for<'a>(&'a self, schema: &'a EntitySchema) -> FieldResolver<'a> {
        let semantic = self
            .semantic_state()
            .and_then(|s| s.indices.get(&schema.name))
            .map(|index| (index, &self.embedder as &dyn TextEmbedder));
        FieldResolver::new(schema, self.entity_aliases(schema), semantic)
    }

    /// One-shot lazy build of all embedding indices. On failure the
    /// pipeline stays up in degraded mode (stages A+C only).
    fn semantic_state(&self) -> Option<&SemanticState> {
        self.semantic
            .get_or_init(|| {
                let cache_dir = self
                    .config
                    .embed_cache_dir
                    .clone()
                    .unwrap_or_else(talentmap_logging::embeddings_dir);
                let start = std::time::Instant::now();
                let mut indices = HashMap::new();
                for schema in self.registry.entities() {
                    let aliases = self.entity_aliases(schema);
                    match EmbeddingIndex::load_or_build(
                        &cache_dir,
                        self.registry.content_hash(),
                        schema,
                        aliases,
                        &self.embedder,
                    ) {
                        Ok(index) => {
                            indices.insert(schema.name.clone(), index);
                        }
                        Err(err) => {
                            tracing::warn!(
                                entity = %schema.name,
                                %err,
                                "embedding index unavailable; continuing degraded"
                            );
                            return None;
                        }
                    }
                }
                let elapsed = start.elapsed();
                if elapsed.as_secs() > config::EMBED_BUILD_TIMEOUT_SECS {
                    tracing::warn!(
                        elapsed_secs = elapsed.as_secs_f64(),
                        "embedding index build blew its time budget; running degraded"
                    );
                    return None;
                }
                Some(SemanticState { indices })
            })
            .as_ref()
    }
}
