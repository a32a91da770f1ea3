//! Retrieval strategies feeding the fusion engine.

pub mod glossary;
pub mod lexical;
pub mod semantic;

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::retrieval::core::candidate::Candidate;
use crate::retrieval::core::errors::RetrievalResult;
use crate::retrieval::core::kinds::RetrievalSource;

pub use glossary::GlossaryRetriever;
pub use lexical::LexicalRetriever;
pub use semantic::SemanticRetriever;

/// Boxed future type for retriever calls.
pub type RetrieveFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// How a retriever matched its candidates.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    /// Relevance-ranked search.
    #[default]
    Ranked,
    /// Plain substring containment, used when segmentation fails.
    Substring,
}

/// Candidates returned by one retriever call, best first.
#[derive(Clone, Debug, Default)]
pub struct RetrieverHits {
    /// Ordered candidates.
    pub candidates: Vec<Candidate>,
    /// Matching strategy used.
    pub mode: MatchMode,
}

impl RetrieverHits {
    /// Hits from a ranked search.
    #[must_use]
    pub const fn ranked(candidates: Vec<Candidate>) -> Self {
        Self {
            candidates,
            mode: MatchMode::Ranked,
        }
    }

    /// Hits from a substring search.
    #[must_use]
    pub const fn substring(candidates: Vec<Candidate>) -> Self {
        Self {
            candidates,
            mode: MatchMode::Substring,
        }
    }
}

/// A retrieval strategy: one query in, an ordered candidate list out.
pub trait Retriever: Send + Sync {
    /// Name reported in fused results.
    fn source(&self) -> RetrievalSource;

    /// Retrieve candidates for `query`, best first, bounded by the configured top-k.
    ///
    /// # Errors
    /// Returns an error if the backing index fails.
    fn retrieve(&self, query: &str) -> RetrieveFuture<'_, RetrievalResult<RetrieverHits>>;
}

/// A retriever that can restrict its search to given documents.
pub trait ScopedRetriever: Retriever {
    /// Retrieve up to `limit` candidates for `query` from `document_ids` only.
    ///
    /// # Errors
    /// Returns an error if the backing index fails.
    fn retrieve_scoped(
        &self,
        query: &str,
        document_ids: Vec<String>,
        limit: usize,
    ) -> RetrieveFuture<'_, RetrievalResult<RetrieverHits>>;
}
