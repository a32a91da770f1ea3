//! Multi-source retrieval over a classical corpus.
//!
//! This module is organized into:
//! - `core`: Configuration, errors, candidate and source kinds
//! - `text`: Keyword extraction, segmentation and content fingerprints
//! - `resolve`: Alias and synonym resolvers with lazily loaded caches
//! - `storage`: Capability traits and their `SQLite` adapters
//! - `retrievers`: Semantic, lexical and glossary retrievers
//! - `fusion`: Concurrent fan-out and reciprocal rank fusion
//! - `context`: Neighbor expansion and budgeted formatting
//! - `pipeline`: Composition root and result cache

pub mod context;
pub mod core;
pub mod fusion;
pub mod pipeline;
pub mod resolve;
pub mod retrievers;
pub mod storage;
pub mod text;

#[cfg(test)]
mod testing;

pub use context::{
    ContextBudget, ContextExpander, ContextStats, ExpansionOutcome, ExpansionStats,
    FormattedContext, SourceInfo, format_context, smart_truncate,
};
pub use self::core::{
    Candidate, CacheConfig, DedupKey, DocumentType, EmbeddingConfig, EngineConfig, FusionConfig,
    GlossaryEntry, Passage, RetrievalError, RetrievalResult, RetrievalSource, RetrieverConfig,
    ServerConfig, StorageConfig,
};
pub use fusion::{
    FailedRetrieval, FusedResult, FusionEngine, FusionMetrics, FusionOutcome, FusionRetrievers,
    FusionStats, RetrieverMetrics,
};
pub use pipeline::{
    FusionCache, PipelineHealth, PreparedContext, RetrievalBackends, RetrievalPipeline,
};
pub use resolve::{AliasMapping, AliasResolver, ExpandedQuery, SynonymMapping, SynonymResolver};
pub use retrievers::{
    GlossaryRetriever, LexicalRetriever, MatchMode, Retriever, RetrieverHits, ScopedRetriever,
    SemanticRetriever,
};
pub use storage::{
    ChunkStore, FullTextIndex, GlossaryIndex, SqliteCorpus, SqliteGlossaryStore,
    SqliteResolverTables, SqliteVectorIndex, VectorIndex, init_sqlite_vec_extension,
};
pub use text::keywords::extract_keywords;
