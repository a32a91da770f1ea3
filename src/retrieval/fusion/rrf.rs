//! Weighted reciprocal rank fusion.
//!
//! Similarity and text-rank scores live on different scales, so lists are
//! combined by rank only: a candidate at 0-based rank `r` in a list of weight
//! `w` earns `w / (k + r + 1)`. Passages are further scaled by their document
//! type weight and, when their document is an alias target, by the alias boost.
//! Both multipliers apply to each occurrence before summation.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::hash::BuildHasher;

use serde::Serialize;

use crate::retrieval::core::candidate::{Candidate, DedupKey};
use crate::retrieval::core::config::FusionConfig;
use crate::retrieval::core::kinds::RetrievalSource;

/// One retriever's ranked contribution to fusion.
#[derive(Clone, Debug)]
pub struct RankedList {
    /// Retriever that produced the list.
    pub source: RetrievalSource,
    /// Fusion weight of the list.
    pub weight: f64,
    /// Candidates, best first, unique by dedup key.
    pub candidates: Vec<Candidate>,
}

/// Scalar fusion parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RrfParams {
    /// Rank offset.
    pub k: f64,
    /// Multiplier for alias-targeted passages.
    pub alias_boost: f64,
}

impl Default for RrfParams {
    fn default() -> Self {
        Self::from(&FusionConfig::default())
    }
}

impl From<&FusionConfig> for RrfParams {
    fn from(config: &FusionConfig) -> Self {
        Self {
            k: config.rrf_k,
            alias_boost: config.alias_boost_factor,
        }
    }
}

/// A deduplicated candidate with its accumulated score.
#[derive(Clone, Debug, Serialize)]
pub struct FusedResult {
    /// Dedup key shared by every occurrence.
    pub key: DedupKey,
    /// First occurrence of the candidate.
    pub candidate: Candidate,
    /// Sum of all contributions.
    pub score: f64,
    /// Retrievers that returned the candidate.
    pub sources: BTreeSet<RetrievalSource>,
}

impl FusedResult {
    /// Whether more than one retriever returned this candidate.
    #[must_use]
    pub fn is_multi_hit(&self) -> bool {
        self.sources.len() > 1
    }
}

/// Base contribution of rank `rank` in a list of weight `weight`.
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn rrf_contribution(weight: f64, k: f64, rank: usize) -> f64 {
    weight / (k + rank as f64 + 1.0)
}

/// Merge lists in order, keeping the first occurrence of each dedup key.
#[must_use]
pub fn merge_by_key<I>(lists: I) -> Vec<Candidate>
where
    I: IntoIterator<Item = Vec<Candidate>>,
{
    let mut seen: HashSet<DedupKey> = HashSet::new();
    lists
        .into_iter()
        .flatten()
        .filter(|candidate| seen.insert(candidate.dedup_key()))
        .collect()
}

/// Fuse ranked lists into one list sorted by score, highest first.
///
/// Ties keep the order in which candidates were first seen.
#[must_use]
pub fn rrf_fuse<S: BuildHasher>(
    lists: &[RankedList],
    params: RrfParams,
    alias_targets: &HashSet<String, S>,
) -> Vec<FusedResult> {
    let mut slots: HashMap<DedupKey, usize> = HashMap::new();
    let mut fused: Vec<FusedResult> = Vec::new();

    for list in lists {
        for (rank, candidate) in list.candidates.iter().enumerate() {
            let mut contribution =
                rrf_contribution(list.weight, params.k, rank) * candidate.type_weight();
            if candidate
                .document_id()
                .is_some_and(|id| alias_targets.contains(id))
            {
                contribution *= params.alias_boost;
            }

            let key = candidate.dedup_key();
            if let Some(slot) = slots.get(&key) {
                let entry = &mut fused[*slot];
                entry.score += contribution;
                entry.sources.insert(list.source);
            } else {
                slots.insert(key.clone(), fused.len());
                fused.push(FusedResult {
                    key,
                    candidate: candidate.clone(),
                    score: contribution,
                    sources: BTreeSet::from([list.source]),
                });
            }
        }
    }

    fused.sort_by(|a, b| b.score.total_cmp(&a.score));
    fused
}
