//! Neighbor expansion of fused passages.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::retrieval::context::format::{ContextBudget, FormattedContext, format_context};
use crate::retrieval::core::config::FusionConfig;
use crate::retrieval::core::errors::{RetrievalError, RetrievalResult};
use crate::retrieval::fusion::metrics::millis;
use crate::retrieval::fusion::rrf::FusedResult;
use crate::retrieval::storage::chunk_store::{Chunk, ChunkStore};

/// Expansion statistics.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ExpansionStats {
    /// Neighbor fetches issued.
    pub queries: usize,
    /// Results whose content was replaced by their neighborhood.
    pub expanded: usize,
    /// Fetches that failed, timed out or came back empty.
    pub failed: usize,
    /// Wall time, in milliseconds.
    pub time_ms: u64,
}

/// Expanded results in their original order.
#[derive(Clone, Debug)]
pub struct ExpansionOutcome {
    /// Results; unexpanded ones are unchanged.
    pub results: Vec<FusedResult>,
    /// Expansion statistics.
    pub stats: ExpansionStats,
}

enum Fetch {
    Skipped,
    Expanded,
    Failed,
}

/// Widens passages with surrounding chunks and renders them under a budget.
pub struct ContextExpander {
    store: Arc<dyn ChunkStore>,
    window: u32,
    timeout: Option<Duration>,
    budget: ContextBudget,
}

impl ContextExpander {
    /// Create an expander reading neighbors from `store`.
    #[must_use]
    pub fn new(store: Arc<dyn ChunkStore>, config: &FusionConfig) -> Self {
        Self {
            store,
            window: config.context_window,
            timeout: config.timeout(),
            budget: ContextBudget {
                max_chunk_length: config.max_chunk_length,
                max_context_length: config.max_context_length,
            },
        }
    }

    /// Replace each indexed passage by the concatenation of chunks
    /// `[i - window, i + window]` of its volume.
    ///
    /// A failed, cancelled or empty fetch leaves the passage unchanged.
    pub async fn expand(&self, results: Vec<FusedResult>) -> ExpansionOutcome {
        let started = Instant::now();
        let deadline = self.timeout.map(|timeout| started + timeout);

        let outcomes = join_all(
            results
                .into_iter()
                .map(|result| self.expand_one(result, deadline)),
        )
        .await;

        let mut stats = ExpansionStats::default();
        let mut results = Vec::with_capacity(outcomes.len());
        for (result, fetch) in outcomes {
            match fetch {
                Fetch::Skipped => {}
                Fetch::Expanded => {
                    stats.queries += 1;
                    stats.expanded += 1;
                }
                Fetch::Failed => {
                    stats.queries += 1;
                    stats.failed += 1;
                }
            }
            results.push(result);
        }
        stats.time_ms = millis(started.elapsed());

        debug!(
            queries = stats.queries,
            expanded = stats.expanded,
            failed = stats.failed,
            time_ms = stats.time_ms,
            "context expanded"
        );
        ExpansionOutcome { results, stats }
    }

    /// Render `results` for `question` under the configured budgets.
    #[must_use]
    pub fn format(&self, results: &[FusedResult], question: &str) -> FormattedContext {
        format_context(results, question, self.budget)
    }

    async fn expand_one(
        &self,
        mut result: FusedResult,
        deadline: Option<Instant>,
    ) -> (FusedResult, Fetch) {
        let Some((document_id, volume, index)) = result.candidate.as_passage().and_then(|p| {
            p.chunk_index
                .map(|index| (p.document_id.clone(), p.volume, index))
        }) else {
            return (result, Fetch::Skipped);
        };

        let range = index.saturating_sub(self.window)..=index.saturating_add(self.window);
        match self.fetch(&document_id, volume, range, deadline).await {
            Ok(chunks) if !chunks.is_empty() => {
                let content: String = chunks.iter().map(|chunk| chunk.content.as_str()).collect();
                result.candidate.set_content(content);
                (result, Fetch::Expanded)
            }
            Ok(_) => {
                debug!(%document_id, volume, index, "no neighbor chunks");
                (result, Fetch::Failed)
            }
            Err(err) => {
                warn!(%document_id, volume, index, error = %err, "neighbor fetch failed");
                (result, Fetch::Failed)
            }
        }
    }

    async fn fetch(
        &self,
        document_id: &str,
        volume: u32,
        range: std::ops::RangeInclusive<u32>,
        deadline: Option<Instant>,
    ) -> RetrievalResult<Vec<Chunk>> {
        let call = self.store.fetch_chunks(document_id, volume, range);
        match deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, call)
                .await
                .unwrap_or_else(|_| {
                    Err(RetrievalError::Cancelled {
                        operation: "neighbor fetch".to_string(),
                    })
                }),
            None => call.await,
        }
    }
}
