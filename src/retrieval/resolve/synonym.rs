//! Synonym resolution and bounded query rewriting.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::retrieval::core::errors::{RetrievalError, RetrievalResult};
use crate::retrieval::storage::resolver_tables::SynonymSource;

/// Upper bound on expanded queries, original included.
pub const MAX_EXPANDED_QUERIES: usize = 5;

/// How a synonym relates to its canonical term.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationType {
    /// Interchangeable term.
    Exact,
    /// Shortened form.
    Abbreviation,
    /// Loosely related term.
    Related,
}

impl RelationType {
    /// Stable string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Abbreviation => "abbreviation",
            Self::Related => "related",
        }
    }

    /// Weight of a rewrite that introduces a synonym of this relation.
    #[must_use]
    pub const fn rewrite_weight(self) -> f64 {
        match self {
            Self::Abbreviation => 0.8,
            Self::Exact | Self::Related => 0.9,
        }
    }
}

impl fmt::Display for RelationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RelationType {
    type Err = RetrievalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "exact" => Ok(Self::Exact),
            "abbreviation" => Ok(Self::Abbreviation),
            "related" => Ok(Self::Related),
            other => Err(RetrievalError::Backend(format!(
                "unknown synonym relation: {other}"
            ))),
        }
    }
}

/// One canonical term to synonym pair.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynonymMapping {
    /// Normalized term.
    pub canonical_term: String,
    /// Alternative surface form.
    pub synonym: String,
    /// Relation between the two.
    pub relation_type: RelationType,
    /// Load order key, higher first.
    pub priority: i32,
}

/// Where an expanded query came from.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryProvenance {
    /// The question as asked.
    Original,
    /// A canonical term replaced by one of its synonyms.
    Synonym,
    /// A synonym replaced by its canonical term.
    Canonical,
}

/// A query rewrite.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExpandedQuery {
    /// Rewritten query text.
    pub query_text: String,
    /// Rewrite kind.
    pub provenance: QueryProvenance,
    /// Term that was replaced, if any.
    pub source_term: Option<String>,
    /// Confidence of the rewrite.
    pub weight: f64,
}

impl ExpandedQuery {
    fn original(query: &str) -> Self {
        Self {
            query_text: query.to_string(),
            provenance: QueryProvenance::Original,
            source_term: None,
            weight: 1.0,
        }
    }
}

/// Synonym table summary.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
pub struct SynonymStats {
    /// Number of canonical terms.
    pub term_count: usize,
    /// Number of synonym rows across all terms.
    pub total_synonyms: usize,
}

struct SynonymIndex {
    /// Canonical terms in first-appearance order, with their mappings.
    forward: Vec<(String, Vec<SynonymMapping>)>,
    by_canonical: HashMap<String, usize>,
    reverse: HashMap<String, String>,
}

impl SynonymIndex {
    fn build(mut rows: Vec<SynonymMapping>) -> Self {
        rows.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| a.canonical_term.cmp(&b.canonical_term))
        });

        let mut forward: Vec<(String, Vec<SynonymMapping>)> = Vec::new();
        let mut by_canonical = HashMap::new();
        let mut reverse = HashMap::with_capacity(rows.len());

        for row in rows {
            reverse.insert(row.synonym.clone(), row.canonical_term.clone());
            let slot = *by_canonical
                .entry(row.canonical_term.clone())
                .or_insert_with(|| {
                    forward.push((row.canonical_term.clone(), Vec::new()));
                    forward.len() - 1
                });
            forward[slot].1.push(row);
        }

        Self {
            forward,
            by_canonical,
            reverse,
        }
    }

    fn mappings(&self, canonical: &str) -> Option<&[SynonymMapping]> {
        self.by_canonical
            .get(canonical)
            .map(|slot| self.forward[*slot].1.as_slice())
    }
}

/// Resolves synonyms against a cache populated once from a [`SynonymSource`].
pub struct SynonymResolver {
    source: Arc<dyn SynonymSource>,
    cache: OnceCell<SynonymIndex>,
}

impl SynonymResolver {
    /// Create a resolver over `source`; nothing is loaded until [`SynonymResolver::init`].
    #[must_use]
    pub fn new(source: Arc<dyn SynonymSource>) -> Self {
        Self {
            source,
            cache: OnceCell::new(),
        }
    }

    /// Populate both indexes. Concurrent first callers share a single scan.
    ///
    /// # Errors
    /// Returns the source error; the resolver stays uninitialized and a later call retries.
    pub async fn init(&self) -> RetrievalResult<()> {
        self.cache
            .get_or_try_init(|| async {
                let rows = self.source.load_synonyms().await?;
                let index = SynonymIndex::build(rows);
                info!(
                    terms = index.forward.len(),
                    synonyms = index.reverse.len(),
                    "synonym cache loaded"
                );
                Ok::<_, RetrievalError>(index)
            })
            .await?;
        Ok(())
    }

    /// Whether the cache is populated.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.cache.initialized()
    }

    fn index(&self) -> Option<&SynonymIndex> {
        let index = self.cache.get();
        if index.is_none() {
            warn!("{}", RetrievalError::ResolverNotReady("synonym"));
        }
        index
    }

    /// Expand `query` into at most [`MAX_EXPANDED_QUERIES`] rewrites, original first.
    #[must_use]
    pub fn expand_query(&self, query: &str) -> Vec<ExpandedQuery> {
        let Some(index) = self.index() else {
            return vec![ExpandedQuery::original(query)];
        };

        let mut rewrites = vec![ExpandedQuery::original(query)];
        let mut processed: HashSet<&str> = HashSet::new();

        for (canonical, mappings) in &index.forward {
            if query.contains(canonical.as_str()) && processed.insert(canonical.as_str()) {
                for mapping in mappings {
                    if query.contains(mapping.synonym.as_str()) {
                        continue;
                    }
                    rewrites.push(ExpandedQuery {
                        query_text: query.replacen(canonical.as_str(), &mapping.synonym, 1),
                        provenance: QueryProvenance::Synonym,
                        source_term: Some(canonical.clone()),
                        weight: mapping.relation_type.rewrite_weight(),
                    });
                }
            }

            for mapping in mappings {
                let synonym = mapping.synonym.as_str();
                if query.contains(synonym)
                    && !query.contains(canonical.as_str())
                    && processed.insert(synonym)
                {
                    rewrites.push(ExpandedQuery {
                        query_text: query.replacen(synonym, canonical, 1),
                        provenance: QueryProvenance::Canonical,
                        source_term: Some(synonym.to_string()),
                        weight: 1.0,
                    });
                }
            }
        }

        let mut unique = dedupe_by_text(rewrites);
        unique.sort_by(|a, b| b.weight.total_cmp(&a.weight));
        unique.truncate(MAX_EXPANDED_QUERIES);

        if unique.len() > 1 {
            debug!(count = unique.len(), "query expanded");
        }
        unique
    }

    /// Synonyms registered for a canonical term.
    #[must_use]
    pub fn synonyms_of(&self, term: &str) -> Vec<String> {
        self.mappings_of(term)
            .into_iter()
            .map(|mapping| mapping.synonym)
            .collect()
    }

    /// Full mappings registered for a canonical term.
    #[must_use]
    pub fn mappings_of(&self, term: &str) -> Vec<SynonymMapping> {
        self.index()
            .and_then(|index| index.mappings(term))
            .map(<[SynonymMapping]>::to_vec)
            .unwrap_or_default()
    }

    /// Canonical term for a synonym.
    #[must_use]
    pub fn canonical_of(&self, synonym: &str) -> Option<String> {
        self.index()?.reverse.get(synonym).cloned()
    }

    /// Whether two terms name the same concept.
    #[must_use]
    pub fn are_synonyms(&self, left: &str, right: &str) -> bool {
        if left == right {
            return true;
        }
        let Some(index) = self.index() else {
            return false;
        };
        let canonical = |term: &str| {
            index
                .reverse
                .get(term)
                .cloned()
                .unwrap_or_else(|| term.to_string())
        };
        canonical(left) == canonical(right)
    }

    /// Table summary.
    #[must_use]
    pub fn stats(&self) -> SynonymStats {
        self.cache.get().map_or_else(SynonymStats::default, |index| SynonymStats {
            term_count: index.forward.len(),
            total_synonyms: index.forward.iter().map(|(_, rows)| rows.len()).sum(),
        })
    }
}

/// Keep one rewrite per query text: the first position, holding the last value.
fn dedupe_by_text(rewrites: Vec<ExpandedQuery>) -> Vec<ExpandedQuery> {
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut unique: Vec<ExpandedQuery> = Vec::with_capacity(rewrites.len());
    for rewrite in rewrites {
        if let Some(slot) = positions.get(&rewrite.query_text) {
            unique[*slot] = rewrite;
        } else {
            positions.insert(rewrite.query_text.clone(), unique.len());
            unique.push(rewrite);
        }
    }
    unique
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::testing::{StaticSynonymSource, synonym};

    async fn ready(rows: Vec<SynonymMapping>) -> SynonymResolver {
        let resolver = SynonymResolver::new(Arc::new(StaticSynonymSource::new(rows)));
        assert!(resolver.init().await.is_ok());
        resolver
    }

    #[tokio::test]
    async fn test_synonym_in_query_rewrites_to_canonical() {
        let resolver = ready(vec![synonym("阿赖耶识", "藏识", RelationType::Exact, 10)]).await;
        let expanded = resolver.expand_query("什么是藏识");

        assert_eq!(expanded.len(), 2);
        assert_eq!(expanded[0].query_text, "什么是藏识");
        assert_eq!(expanded[0].provenance, QueryProvenance::Original);
        assert!((expanded[0].weight - 1.0).abs() < f64::EPSILON);
        assert_eq!(expanded[1].query_text, "什么是阿赖耶识");
        assert_eq!(expanded[1].provenance, QueryProvenance::Canonical);
        assert_eq!(expanded[1].source_term.as_deref(), Some("藏识"));
        assert!((expanded[1].weight - 1.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_expansion_is_deterministic() {
        let resolver = ready(vec![
            synonym("阿赖耶识", "藏识", RelationType::Exact, 10),
            synonym("阿赖耶识", "第八识", RelationType::Related, 10),
        ])
        .await;
        let first = serde_json::to_string(&resolver.expand_query("什么是藏识")).unwrap_or_default();
        let second =
            serde_json::to_string(&resolver.expand_query("什么是藏识")).unwrap_or_default();
        assert!(!first.is_empty());
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_canonical_in_query_rewrites_to_synonyms() {
        let resolver = ready(vec![
            synonym("般若波罗蜜多", "般若", RelationType::Abbreviation, 5),
            synonym("般若波罗蜜多", "智度", RelationType::Related, 5),
        ])
        .await;
        let expanded = resolver.expand_query("般若波罗蜜多心经");

        let texts: Vec<&str> = expanded.iter().map(|q| q.query_text.as_str()).collect();
        // "般若" is already a substring of the canonical term, so only "智度" applies.
        assert_eq!(texts, vec!["般若波罗蜜多心经", "智度心经"]);
        assert_eq!(expanded[1].provenance, QueryProvenance::Synonym);
        assert!((expanded[1].weight - 0.9).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_abbreviation_weight_and_sorting() {
        let resolver = ready(vec![
            synonym("涅槃", "泥洹", RelationType::Abbreviation, 5),
            synonym("涅槃", "灭度", RelationType::Exact, 5),
        ])
        .await;
        let expanded = resolver.expand_query("涅槃是什么");
        let weights: Vec<f64> = expanded.iter().map(|q| q.weight).collect();
        assert_eq!(weights, vec![1.0, 0.9, 0.8]);
        assert_eq!(expanded[1].query_text, "灭度是什么");
        assert_eq!(expanded[2].query_text, "泥洹是什么");
    }

    #[tokio::test]
    async fn test_expansion_capped_at_five() {
        let rows = ["甲", "乙", "丙", "丁", "戊", "己"]
            .iter()
            .map(|syn| synonym("佛陀", syn, RelationType::Exact, 1))
            .collect();
        let resolver = ready(rows).await;
        let expanded = resolver.expand_query("佛陀");
        assert_eq!(expanded.len(), MAX_EXPANDED_QUERIES);
        assert_eq!(expanded[0].provenance, QueryProvenance::Original);
    }

    #[tokio::test]
    async fn test_not_ready_returns_original_only() {
        let resolver = SynonymResolver::new(Arc::new(StaticSynonymSource::new(vec![synonym(
            "阿赖耶识",
            "藏识",
            RelationType::Exact,
            10,
        )])));
        let expanded = resolver.expand_query("什么是藏识");
        assert_eq!(expanded, vec![ExpandedQuery::original("什么是藏识")]);
        assert!(resolver.canonical_of("藏识").is_none());
    }

    #[tokio::test]
    async fn test_lookup_helpers() {
        let resolver = ready(vec![
            synonym("阿赖耶识", "藏识", RelationType::Exact, 10),
            synonym("阿赖耶识", "第八识", RelationType::Related, 10),
            synonym("末那识", "第七识", RelationType::Related, 1),
        ])
        .await;
        assert_eq!(resolver.synonyms_of("阿赖耶识"), vec!["藏识", "第八识"]);
        assert_eq!(resolver.canonical_of("第七识").as_deref(), Some("末那识"));
        assert!(resolver.are_synonyms("藏识", "第八识"));
        assert!(resolver.are_synonyms("阿赖耶识", "藏识"));
        assert!(!resolver.are_synonyms("藏识", "第七识"));
        assert_eq!(
            resolver.stats(),
            SynonymStats {
                term_count: 2,
                total_synonyms: 3
            }
        );
    }

    #[test]
    fn test_relation_type_parse() {
        assert_eq!(
            "Abbreviation".parse::<RelationType>().ok(),
            Some(RelationType::Abbreviation)
        );
        assert!("alias".parse::<RelationType>().is_err());
    }
}
