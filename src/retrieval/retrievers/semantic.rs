//! Dense-vector retriever.

use std::sync::Arc;

use tracing::debug;

use crate::retrieval::core::candidate::Candidate;
use crate::retrieval::core::config::RetrieverConfig;
use crate::retrieval::core::errors::RetrievalResult;
use crate::retrieval::core::kinds::RetrievalSource;
use crate::retrieval::retrievers::{RetrieveFuture, Retriever, RetrieverHits, ScopedRetriever};
use crate::retrieval::storage::vector_index::VectorIndex;

/// Retriever over a [`VectorIndex`].
pub struct SemanticRetriever {
    index: Arc<dyn VectorIndex>,
    top_k: usize,
    min_similarity: f64,
}

impl SemanticRetriever {
    /// Create a semantic retriever.
    #[must_use]
    pub fn new(index: Arc<dyn VectorIndex>, config: &RetrieverConfig) -> Self {
        Self {
            index,
            top_k: config.top_k,
            min_similarity: config.min_similarity,
        }
    }
}

impl Retriever for SemanticRetriever {
    fn source(&self) -> RetrievalSource {
        RetrievalSource::Semantic
    }

    fn retrieve(&self, query: &str) -> RetrieveFuture<'_, RetrievalResult<RetrieverHits>> {
        let query = query.to_string();
        Box::pin(async move {
            let passages = self
                .index
                .search(&query, self.top_k, self.min_similarity)
                .await?;
            debug!(hits = passages.len(), "semantic retrieval");
            Ok(RetrieverHits::ranked(
                passages.into_iter().map(Candidate::Passage).collect(),
            ))
        })
    }
}

impl ScopedRetriever for SemanticRetriever {
    fn retrieve_scoped(
        &self,
        query: &str,
        document_ids: Vec<String>,
        limit: usize,
    ) -> RetrieveFuture<'_, RetrievalResult<RetrieverHits>> {
        let query = query.to_string();
        Box::pin(async move {
            if document_ids.is_empty() {
                return Ok(RetrieverHits::default());
            }
            let passages = self
                .index
                .search_in_documents(&query, document_ids, limit, self.min_similarity)
                .await?;
            debug!(hits = passages.len(), "scoped semantic retrieval");
            Ok(RetrieverHits::ranked(
                passages.into_iter().map(Candidate::Passage).collect(),
            ))
        })
    }
}
