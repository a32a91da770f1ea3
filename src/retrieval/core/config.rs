//! Configuration for the retrieval engine.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::retrieval::core::errors::{RetrievalError, RetrievalResult};

/// Top-level configuration for the retrieval engine.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Per-retriever settings.
    pub retrieval: RetrieverConfig,
    /// Fusion and context settings.
    pub fusion: FusionConfig,
    /// Storage settings.
    pub storage: StorageConfig,
    /// Embedding model settings.
    pub embedding: EmbeddingConfig,
    /// Fused-result cache settings.
    pub cache: CacheConfig,
    /// HTTP server settings.
    pub server: ServerConfig,
}

impl EngineConfig {
    /// Load a configuration from a JSON file; absent fields keep their defaults.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, parsed, or fails validation.
    pub fn from_json_file(path: &Path) -> RetrievalResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration invariants.
    ///
    /// # Errors
    /// Returns an error if any values are out of range or invalid.
    pub fn validate(&self) -> RetrievalResult<()> {
        if self.retrieval.top_k == 0 {
            return Err(RetrievalError::InvalidConfig(
                "retrieval.top_k must be > 0".to_string(),
            ));
        }

        if self.retrieval.glossary_top_k == 0 {
            return Err(RetrievalError::InvalidConfig(
                "retrieval.glossary_top_k must be > 0".to_string(),
            ));
        }

        if !self.retrieval.min_relevance.is_finite() || self.retrieval.min_relevance < 0.0 {
            return Err(RetrievalError::InvalidConfig(
                "retrieval.min_relevance must be finite and >= 0".to_string(),
            ));
        }

        self.fusion.validate()?;

        if self.embedding.ndims == 0 {
            return Err(RetrievalError::InvalidConfig(
                "embedding.ndims must be > 0".to_string(),
            ));
        }

        if let Some(base_url) = &self.embedding.base_url {
            Url::parse(base_url)?;
        }

        if self.cache.enabled && self.cache.max_entries == 0 {
            return Err(RetrievalError::InvalidConfig(
                "cache.max_entries must be > 0 when the cache is enabled".to_string(),
            ));
        }

        Ok(())
    }
}

/// Per-retriever settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrieverConfig {
    /// Candidates requested from the semantic and lexical retrievers.
    pub top_k: usize,
    /// Candidates requested from the glossary.
    pub glossary_top_k: usize,
    /// Lexical hits below this relevance are discarded.
    pub min_relevance: f64,
    /// Semantic hits below this similarity are discarded.
    pub min_similarity: f64,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            top_k: 10,
            glossary_top_k: 5,
            min_relevance: 0.01,
            min_similarity: 0.0,
        }
    }
}

/// Fusion weights, context budgets and request limits.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    /// RRF weight of the semantic list (and of the alias-scoped list).
    pub semantic_weight: f64,
    /// RRF weight of the lexical list.
    pub fulltext_weight: f64,
    /// RRF weight of the glossary list.
    pub dictionary_weight: f64,
    /// RRF rank offset `k`.
    pub rrf_k: f64,
    /// Number of fused results returned.
    pub final_top_k: usize,
    /// Multiplier for passages of alias-targeted documents.
    pub alias_boost_factor: f64,
    /// Widen passages with their neighboring chunks before formatting.
    pub expand_context: bool,
    /// Neighbor chunks fetched on each side of a passage.
    pub context_window: u32,
    /// Per-candidate character cap.
    pub max_chunk_length: usize,
    /// Character cap for the whole formatted context.
    pub max_context_length: usize,
    /// Candidates requested by the alias-scoped semantic lookup.
    pub scoped_top_k: usize,
    /// Deadline for one fusion or expansion call, in milliseconds.
    pub timeout_ms: Option<u64>,
    /// Fail the whole call on the first retriever failure.
    pub fail_fast: bool,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            semantic_weight: 0.5,
            fulltext_weight: 0.3,
            dictionary_weight: 0.2,
            rrf_k: 60.0,
            final_top_k: 15,
            alias_boost_factor: 2.0,
            expand_context: true,
            context_window: 2,
            max_chunk_length: 1500,
            max_context_length: 20_000,
            scoped_top_k: 5,
            timeout_ms: Some(15_000),
            fail_fast: false,
        }
    }
}

impl FusionConfig {
    /// Request deadline as a duration.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// Validate fusion invariants.
    ///
    /// # Errors
    /// Returns an error if any weight or budget is out of range.
    pub fn validate(&self) -> RetrievalResult<()> {
        for (name, weight) in [
            ("semantic_weight", self.semantic_weight),
            ("fulltext_weight", self.fulltext_weight),
            ("dictionary_weight", self.dictionary_weight),
        ] {
            if !weight.is_finite() || weight < 0.0 {
                return Err(RetrievalError::InvalidConfig(format!(
                    "fusion.{name} must be finite and >= 0"
                )));
            }
        }

        if !self.rrf_k.is_finite() || self.rrf_k < 0.0 {
            return Err(RetrievalError::InvalidConfig(
                "fusion.rrf_k must be finite and >= 0".to_string(),
            ));
        }

        if !self.alias_boost_factor.is_finite() || self.alias_boost_factor <= 0.0 {
            return Err(RetrievalError::InvalidConfig(
                "fusion.alias_boost_factor must be finite and > 0".to_string(),
            ));
        }

        if self.final_top_k == 0 {
            return Err(RetrievalError::InvalidConfig(
                "fusion.final_top_k must be > 0".to_string(),
            ));
        }

        if self.scoped_top_k == 0 {
            return Err(RetrievalError::InvalidConfig(
                "fusion.scoped_top_k must be > 0".to_string(),
            ));
        }

        if self.max_chunk_length == 0 || self.max_context_length == 0 {
            return Err(RetrievalError::InvalidConfig(
                "fusion.max_chunk_length and fusion.max_context_length must be > 0".to_string(),
            ));
        }

        if self.timeout_ms == Some(0) {
            return Err(RetrievalError::InvalidConfig(
                "fusion.timeout_ms must be > 0 when set".to_string(),
            ));
        }

        Ok(())
    }
}

/// `SQLite` storage settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// `SQLite` database path.
    pub sqlite_path: PathBuf,
    /// Document metadata table.
    pub texts_table: String,
    /// Chunk table.
    pub chunks_table: String,
    /// FTS5 index over the chunk table.
    pub fts_table: String,
    /// Alias table.
    pub aliases_table: String,
    /// Synonym table.
    pub synonyms_table: String,
    /// Glossary table.
    pub glossary_table: String,
    /// Vector table managed by rig-sqlite.
    pub vector_table: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            sqlite_path: PathBuf::from("canon.sqlite"),
            texts_table: "texts".to_string(),
            chunks_table: "text_chunks".to_string(),
            fts_table: "text_chunks_fts".to_string(),
            aliases_table: "text_aliases".to_string(),
            synonyms_table: "term_synonyms".to_string(),
            glossary_table: "dictionary_entries".to_string(),
            vector_table: "chunk_vectors".to_string(),
        }
    }
}

/// Embedding model settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Ollama embedding model name.
    pub model: String,
    /// Embedding vector dimensions.
    pub ndims: usize,
    /// Optional custom base URL.
    pub base_url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "bge-m3".to_string(),
            ndims: 1024,
            base_url: None,
        }
    }
}

/// Fused-result cache settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Whether fused results are cached by query.
    pub enabled: bool,
    /// Lifetime of a cached entry, in seconds.
    pub ttl_seconds: u64,
    /// Maximum number of cached queries.
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_seconds: 300,
            max_entries: 512,
        }
    }
}

/// HTTP server settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listening port.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 3000 }
    }
}
