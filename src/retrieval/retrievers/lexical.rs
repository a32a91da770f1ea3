//! Keyword retriever over a full-text index.
//!
//! The raw question is reduced to its keywords first. If the index cannot
//! segment the resulting term into anything longer than single characters, a
//! ranked search would match nearly every chunk in the corpus, so the retriever
//! switches to plain substring containment instead.

use std::sync::Arc;

use tracing::debug;

use crate::retrieval::core::candidate::Candidate;
use crate::retrieval::core::config::RetrieverConfig;
use crate::retrieval::core::errors::RetrievalResult;
use crate::retrieval::core::kinds::RetrievalSource;
use crate::retrieval::retrievers::{RetrieveFuture, Retriever, RetrieverHits};
use crate::retrieval::storage::fulltext_index::FullTextIndex;
use crate::retrieval::text::keywords::{extract_keywords, search_term};

/// Retriever over a [`FullTextIndex`].
pub struct LexicalRetriever {
    index: Arc<dyn FullTextIndex>,
    top_k: usize,
    min_relevance: f64,
}

impl LexicalRetriever {
    /// Create a lexical retriever.
    #[must_use]
    pub fn new(index: Arc<dyn FullTextIndex>, config: &RetrieverConfig) -> Self {
        Self {
            index,
            top_k: config.top_k,
            min_relevance: config.min_relevance,
        }
    }
}

impl Retriever for LexicalRetriever {
    fn source(&self) -> RetrievalSource {
        RetrievalSource::Fulltext
    }

    fn retrieve(&self, query: &str) -> RetrieveFuture<'_, RetrievalResult<RetrieverHits>> {
        let keywords = extract_keywords(query);
        Box::pin(async move {
            let term = search_term(&keywords);
            if term.is_empty() {
                return Ok(RetrieverHits::default());
            }

            let tokens = self.index.tokenize(&term).await?;
            let segmentation_failed = tokens.iter().all(|token| token.chars().count() <= 1);
            debug!(?keywords, ?tokens, segmentation_failed, "lexical terms");

            if segmentation_failed {
                let passages = self.index.substring_search(&term, self.top_k).await?;
                return Ok(RetrieverHits::substring(
                    passages.into_iter().map(Candidate::Passage).collect(),
                ));
            }

            let passages = self
                .index
                .ranked_search(tokens, self.top_k, self.min_relevance)
                .await?;
            Ok(RetrieverHits::ranked(
                passages
                    .into_iter()
                    .filter(|passage| passage.score.unwrap_or(0.0) >= self.min_relevance)
                    .map(Candidate::Passage)
                    .collect(),
            ))
        })
    }
}
