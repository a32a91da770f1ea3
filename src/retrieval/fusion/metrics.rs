//! Per-request fusion metrics, used for offline evaluation.

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::retrieval::core::candidate::Candidate;
use crate::retrieval::core::kinds::RetrievalSource;
use crate::retrieval::fusion::rrf::FusedResult;
use crate::retrieval::resolve::alias::AliasMapping;
use crate::retrieval::resolve::synonym::ExpandedQuery;

/// Latency and yield of one retriever across all of its calls.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct RetrieverMetrics {
    /// Calls issued.
    pub calls: usize,
    /// Calls that failed or were cancelled.
    pub failed_calls: usize,
    /// Slowest call, in milliseconds.
    pub time_ms: u64,
    /// Candidates after merging all calls.
    pub count: usize,
    /// Mean backend score of the merged candidates, rounded to three places.
    pub avg_score: Option<f64>,
    /// Whether any call fell back to substring matching.
    pub used_substring: bool,
}

impl RetrieverMetrics {
    /// Calls that returned hits.
    #[must_use]
    pub const fn succeeded_calls(&self) -> usize {
        self.calls.saturating_sub(self.failed_calls)
    }
}

/// Fusion-stage statistics.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct FusionStats {
    /// Time spent scoring and sorting, in milliseconds.
    pub time_ms: u64,
    /// Candidates entering fusion, summed over all lists.
    pub input_count: usize,
    /// Results returned after the top-k cut.
    pub output_count: usize,
    /// Results returned by more than one retriever.
    pub multi_hit_candidates: usize,
    /// Document volumes whose results together came from more than one retriever.
    pub multi_hit_documents: usize,
}

/// A retriever call that did not contribute.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FailedRetrieval {
    /// Retriever that failed.
    pub retriever: RetrievalSource,
    /// Query text of the failed call.
    pub query: String,
    /// Rendered error.
    pub error: String,
    /// Whether the call hit the request deadline.
    pub cancelled: bool,
}

/// Everything measured during one fusion call.
#[derive(Clone, Debug, Serialize)]
pub struct FusionMetrics {
    /// Request identifier, also attached to log lines.
    pub request_id: Uuid,
    /// Wall-clock start of the request.
    pub started_at: DateTime<Utc>,
    /// Query rewrites that were searched.
    pub expanded_queries: Vec<ExpandedQuery>,
    /// Aliases found in the query.
    pub alias_matches: Vec<AliasMapping>,
    /// Semantic retriever metrics.
    pub semantic: RetrieverMetrics,
    /// Lexical retriever metrics.
    pub fulltext: RetrieverMetrics,
    /// Glossary retriever metrics.
    pub dictionary: RetrieverMetrics,
    /// Alias-scoped semantic lookup metrics, when one ran.
    pub scoped: Option<RetrieverMetrics>,
    /// Fusion-stage statistics.
    pub fusion: FusionStats,
    /// Calls that failed; fusion proceeded without them.
    pub failures: Vec<FailedRetrieval>,
    /// End-to-end time, in milliseconds.
    pub total_time_ms: u64,
}

/// Whole milliseconds in `duration`, saturating.
#[must_use]
pub fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Mean backend score of `candidates`, rounded to three places.
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn average_score(candidates: &[Candidate]) -> Option<f64> {
    let scores: Vec<f64> = candidates.iter().filter_map(Candidate::score).collect();
    if scores.is_empty() {
        return None;
    }
    let mean = scores.iter().sum::<f64>() / scores.len() as f64;
    Some((mean * 1000.0).round() / 1000.0)
}

/// Count multi-source results and multi-source document volumes.
#[must_use]
pub fn multi_hit_counts(results: &[FusedResult]) -> (usize, usize) {
    let candidates = results.iter().filter(|result| result.is_multi_hit()).count();

    let mut volumes: HashMap<(&str, u32), BTreeSet<RetrievalSource>> = HashMap::new();
    for result in results {
        if let Some(passage) = result.candidate.as_passage() {
            volumes
                .entry((passage.document_id.as_str(), passage.volume))
                .or_default()
                .extend(result.sources.iter().copied());
        }
    }
    let documents = volumes.values().filter(|sources| sources.len() > 1).count();

    (candidates, documents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::testing::sutra;

    fn fused(chunk: u32, sources: &[RetrievalSource]) -> FusedResult {
        let candidate = Candidate::Passage(sutra("T08n0251", chunk, "经文"));
        FusedResult {
            key: candidate.dedup_key(),
            candidate,
            score: 0.01,
            sources: sources.iter().copied().collect(),
        }
    }

    #[test]
    fn test_multi_hit_counts_candidates_and_volumes() {
        let results = vec![
            fused(0, &[RetrievalSource::Semantic]),
            fused(1, &[RetrievalSource::Fulltext]),
            fused(2, &[RetrievalSource::Semantic, RetrievalSource::Fulltext]),
        ];
        assert_eq!(multi_hit_counts(&results), (1, 1));
        assert_eq!(multi_hit_counts(&results[..1]), (0, 0));
    }

    #[test]
    fn test_average_score_rounds() {
        let mut first = sutra("T08n0251", 0, "甲");
        first.score = Some(0.8);
        let mut second = sutra("T08n0251", 1, "乙");
        second.score = Some(0.7005);
        let average = average_score(&[Candidate::Passage(first), Candidate::Passage(second)]);
        assert_eq!(average, Some(0.75));
        assert_eq!(average_score(&[]), None);
    }

    #[test]
    fn test_millis_saturates() {
        assert_eq!(millis(Duration::from_millis(42)), 42);
        assert_eq!(millis(Duration::MAX), u64::MAX);
    }
}
