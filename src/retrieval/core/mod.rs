//! Core types shared across the retrieval engine.

pub mod candidate;
pub mod config;
pub mod errors;
pub mod kinds;

pub use candidate::{Candidate, DedupKey, GlossaryEntry, Passage};
pub use config::{
    CacheConfig, EmbeddingConfig, EngineConfig, FusionConfig, RetrieverConfig, ServerConfig,
    StorageConfig,
};
pub use errors::{RetrievalError, RetrievalResult};
pub use kinds::{DocumentType, RetrievalSource};
