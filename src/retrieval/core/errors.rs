//! Error types for the retrieval subsystem.

use thiserror::Error;

use crate::retrieval::core::kinds::RetrievalSource;

/// Retrieval subsystem error type.
#[derive(Debug, Error)]
pub enum RetrievalError {
    /// Invalid configuration or unsupported values.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// A resolver was queried before its cache was populated.
    #[error("{0} resolver used before init")]
    ResolverNotReady(&'static str),
    /// A single retriever call failed.
    #[error("{retriever} retriever failed: {reason}")]
    RetrieverFailed {
        /// Retriever that failed.
        retriever: RetrievalSource,
        /// Underlying failure, rendered.
        reason: String,
    },
    /// Every retriever call of a fusion request failed.
    #[error("all {failures} retriever calls failed")]
    AllRetrieversFailed {
        /// Number of failed calls.
        failures: usize,
    },
    /// The request deadline expired before the operation finished.
    #[error("{operation} cancelled: deadline exceeded")]
    Cancelled {
        /// Operation that was cut short.
        operation: String,
    },
    /// A backend returned a row that cannot be mapped to a candidate.
    #[error("backend error: {0}")]
    Backend(String),
    /// `SQLite` storage error (sync).
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// `SQLite` storage error (async).
    #[error("tokio-rusqlite error: {0}")]
    TokioSqlite(#[from] tokio_rusqlite::Error),
    /// Vector store error.
    #[error("vector store error: {0}")]
    VectorStore(#[from] rig::vector_store::VectorStoreError),
    /// Embedding error.
    #[error("embedding error: {0}")]
    Embedding(#[from] rig::embeddings::EmbeddingError),
    /// HTTP client error from Rig.
    #[error("http client error: {0}")]
    HttpClient(#[from] rig::http_client::Error),
    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// URL parse error.
    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),
    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl RetrievalError {
    /// Whether this error is a deadline expiry rather than a backend failure.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

/// Convenience result alias for retrieval operations.
pub type RetrievalResult<T> = Result<T, RetrievalError>;
