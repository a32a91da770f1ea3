//! Composition root wiring stores, resolvers, retrievers, fusion and context.

use std::sync::Arc;

use serde::Serialize;
use tokio_rusqlite::Connection;
use tracing::{debug, info};

use crate::retrieval::context::expander::{ContextExpander, ExpansionStats};
use crate::retrieval::context::format::FormattedContext;
use crate::retrieval::core::config::EngineConfig;
use crate::retrieval::core::errors::RetrievalResult;
use crate::retrieval::fusion::engine::{FusionEngine, FusionOutcome, FusionRetrievers};
use crate::retrieval::fusion::metrics::FusionMetrics;
use crate::retrieval::pipeline::cache::FusionCache;
use crate::retrieval::resolve::alias::AliasResolver;
use crate::retrieval::resolve::synonym::{SynonymResolver, SynonymStats};
use crate::retrieval::retrievers::glossary::GlossaryRetriever;
use crate::retrieval::retrievers::lexical::LexicalRetriever;
use crate::retrieval::retrievers::semantic::SemanticRetriever;
use crate::retrieval::storage::chunk_store::ChunkStore;
use crate::retrieval::storage::corpus::SqliteCorpus;
use crate::retrieval::storage::fulltext_index::FullTextIndex;
use crate::retrieval::storage::glossary_store::{GlossaryIndex, SqliteGlossaryStore};
use crate::retrieval::storage::resolver_tables::{AliasSource, SqliteResolverTables, SynonymSource};
use crate::retrieval::storage::sqlite_vec_loader::init_sqlite_vec_extension;
use crate::retrieval::storage::vector_index::{SqliteVectorIndex, VectorIndex};

/// Backend dependencies for the retrieval pipeline.
pub struct RetrievalBackends {
    /// Alias table.
    pub aliases: Arc<dyn AliasSource>,
    /// Synonym table.
    pub synonyms: Arc<dyn SynonymSource>,
    /// Passage embeddings.
    pub vector_index: Arc<dyn VectorIndex>,
    /// Full-text index over chunks.
    pub fulltext_index: Arc<dyn FullTextIndex>,
    /// Glossary.
    pub glossary: Arc<dyn GlossaryIndex>,
    /// Neighbor chunks for context expansion.
    pub chunk_store: Arc<dyn ChunkStore>,
}

impl RetrievalBackends {
    /// Build `SQLite` backends sharing one connection.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or a schema fails.
    pub async fn sqlite(config: &EngineConfig) -> RetrievalResult<Self> {
        init_sqlite_vec_extension();
        let conn = Connection::open(&config.storage.sqlite_path).await?;

        let tables =
            Arc::new(SqliteResolverTables::with_connection(conn.clone(), &config.storage).await?);
        let corpus = Arc::new(SqliteCorpus::with_connection(conn.clone(), &config.storage).await?);
        let glossary =
            Arc::new(SqliteGlossaryStore::with_connection(conn.clone(), &config.storage).await?);
        let vector_index = Arc::new(SqliteVectorIndex::new(conn, config).await?);

        info!(path = %config.storage.sqlite_path.display(), "sqlite backends ready");
        Ok(Self {
            aliases: tables.clone(),
            synonyms: tables,
            vector_index,
            fulltext_index: corpus.clone(),
            glossary,
            chunk_store: corpus,
        })
    }
}

/// Context prepared for a downstream generator.
#[derive(Clone, Debug, Serialize)]
pub struct PreparedContext {
    /// The question as asked.
    pub question: String,
    /// Rendered context with its statistics and sources.
    pub context: FormattedContext,
    /// Expansion statistics, when expansion ran.
    pub expansion: Option<ExpansionStats>,
    /// Metrics of the fusion call.
    pub metrics: FusionMetrics,
}

/// Resolver and cache summary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct PipelineHealth {
    /// Cached aliases.
    pub aliases: usize,
    /// Synonym table summary.
    pub synonyms: SynonymStats,
    /// Queries held by the fusion cache.
    pub cached_queries: usize,
}

/// Retrieval pipeline: fusion, expansion and formatting behind one cache.
pub struct RetrievalPipeline {
    config: EngineConfig,
    engine: FusionEngine,
    expander: ContextExpander,
    cache: FusionCache,
}

impl RetrievalPipeline {
    /// Create a pipeline over `backends`.
    ///
    /// # Errors
    /// Returns an error if `config` is invalid.
    pub fn new(config: EngineConfig, backends: RetrievalBackends) -> RetrievalResult<Self> {
        config.validate()?;

        let aliases = Arc::new(AliasResolver::new(backends.aliases));
        let synonyms = Arc::new(SynonymResolver::new(backends.synonyms));
        let retrievers = FusionRetrievers {
            semantic: Arc::new(SemanticRetriever::new(
                backends.vector_index,
                &config.retrieval,
            )),
            fulltext: Arc::new(LexicalRetriever::new(
                backends.fulltext_index,
                &config.retrieval,
            )),
            dictionary: Arc::new(GlossaryRetriever::new(backends.glossary, &config.retrieval)),
        };

        let engine = FusionEngine::new(aliases, synonyms, retrievers, config.fusion.clone())?;
        let expander = ContextExpander::new(backends.chunk_store, &config.fusion);
        let cache = FusionCache::new(config.cache.clone());

        Ok(Self {
            config,
            engine,
            expander,
            cache,
        })
    }

    /// Create a pipeline using `SQLite` backends.
    ///
    /// # Errors
    /// Returns an error if backends cannot be initialized.
    pub async fn from_config(config: EngineConfig) -> RetrievalResult<Self> {
        let backends = RetrievalBackends::sqlite(&config).await?;
        Self::new(config, backends)
    }

    /// Pipeline configuration.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Underlying fusion engine.
    #[must_use]
    pub const fn engine(&self) -> &FusionEngine {
        &self.engine
    }

    /// Load the alias and synonym caches.
    ///
    /// # Errors
    /// Returns the first loading error. Fusion retries a failed load on its next call.
    pub async fn init(&self) -> RetrievalResult<()> {
        self.engine.aliases().init().await?;
        self.engine.synonyms().init().await?;
        info!(
            aliases = self.engine.aliases().len(),
            synonym_terms = self.engine.synonyms().stats().term_count,
            "retrieval pipeline initialized"
        );
        Ok(())
    }

    /// Fused results for `query`, served from the cache when fresh.
    ///
    /// Degraded outcomes, with at least one failed retriever call, are not cached.
    ///
    /// # Errors
    /// Returns the fusion error; see [`FusionEngine::fuse_with`].
    pub async fn search(&self, query: &str) -> RetrievalResult<FusionOutcome> {
        if let Some(outcome) = self.cache.get(query) {
            debug!(query, "fusion cache hit");
            return Ok(outcome);
        }

        let outcome = self.engine.fuse(query).await?;
        if outcome.metrics.failures.is_empty() {
            self.cache.insert(query, &outcome);
        }
        Ok(outcome)
    }

    /// Search, expand when configured, and render the context for `question`.
    ///
    /// # Errors
    /// Returns the fusion error; expansion and formatting never fail.
    pub async fn prepare_context(&self, question: &str) -> RetrievalResult<PreparedContext> {
        let outcome = self.search(question).await?;

        let (results, expansion) = if self.config.fusion.expand_context {
            let expanded = self.expander.expand(outcome.results).await;
            (expanded.results, Some(expanded.stats))
        } else {
            (outcome.results, None)
        };

        let context = self.expander.format(&results, question);
        Ok(PreparedContext {
            question: question.to_string(),
            context,
            expansion,
            metrics: outcome.metrics,
        })
    }

    /// Resolver and cache summary.
    #[must_use]
    pub fn health(&self) -> PipelineHealth {
        PipelineHealth {
            aliases: self.engine.aliases().len(),
            synonyms: self.engine.synonyms().stats(),
            cached_queries: self.cache.len(),
        }
    }
}
