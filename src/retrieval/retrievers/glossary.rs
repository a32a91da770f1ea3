//! Glossary retriever.

use std::sync::Arc;

use tracing::debug;

use crate::retrieval::core::candidate::Candidate;
use crate::retrieval::core::config::RetrieverConfig;
use crate::retrieval::core::errors::RetrievalResult;
use crate::retrieval::core::kinds::RetrievalSource;
use crate::retrieval::retrievers::{RetrieveFuture, Retriever, RetrieverHits};
use crate::retrieval::storage::glossary_store::GlossaryIndex;
use crate::retrieval::text::keywords::glossary_terms;

/// Retriever over a [`GlossaryIndex`].
pub struct GlossaryRetriever {
    index: Arc<dyn GlossaryIndex>,
    top_k: usize,
}

impl GlossaryRetriever {
    /// Create a glossary retriever.
    #[must_use]
    pub fn new(index: Arc<dyn GlossaryIndex>, config: &RetrieverConfig) -> Self {
        Self {
            index,
            top_k: config.glossary_top_k,
        }
    }
}

impl Retriever for GlossaryRetriever {
    fn source(&self) -> RetrievalSource {
        RetrievalSource::Dictionary
    }

    fn retrieve(&self, query: &str) -> RetrieveFuture<'_, RetrievalResult<RetrieverHits>> {
        let query = query.to_string();
        Box::pin(async move {
            let terms = glossary_terms(&query);
            if terms.is_empty() {
                return Ok(RetrieverHits::default());
            }
            let entries = self.index.lookup(&query, terms, self.top_k).await?;
            debug!(hits = entries.len(), "glossary retrieval");
            Ok(RetrieverHits::ranked(
                entries.into_iter().map(Candidate::GlossaryEntry).collect(),
            ))
        })
    }
}
