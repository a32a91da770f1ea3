//! Fusion engine: concurrent fan-out, per-retriever merge and rank fusion.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use tokio::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

use crate::retrieval::core::candidate::Candidate;
use crate::retrieval::core::config::FusionConfig;
use crate::retrieval::core::errors::{RetrievalError, RetrievalResult};
use crate::retrieval::core::kinds::RetrievalSource;
use crate::retrieval::fusion::metrics::{
    FailedRetrieval, FusionMetrics, FusionStats, RetrieverMetrics, average_score, millis,
    multi_hit_counts,
};
use crate::retrieval::fusion::rrf::{FusedResult, RankedList, RrfParams, merge_by_key, rrf_fuse};
use crate::retrieval::resolve::alias::{AliasMapping, AliasResolver};
use crate::retrieval::resolve::synonym::{ExpandedQuery, SynonymResolver};
use crate::retrieval::retrievers::{MatchMode, Retriever, RetrieverHits, ScopedRetriever};

/// The three retrievers a fusion engine fans out to.
#[derive(Clone)]
pub struct FusionRetrievers {
    /// Semantic retriever, also used for alias-scoped lookups.
    pub semantic: Arc<dyn ScopedRetriever>,
    /// Lexical retriever.
    pub fulltext: Arc<dyn Retriever>,
    /// Glossary retriever.
    pub dictionary: Arc<dyn Retriever>,
}

/// Fused results and the metrics of the call that produced them.
#[derive(Clone, Debug)]
pub struct FusionOutcome {
    /// Ranked results, at most `final_top_k`.
    pub results: Vec<FusedResult>,
    /// Call metrics.
    pub metrics: FusionMetrics,
}

/// Outcome of one retriever call.
struct CallOutcome {
    source: RetrievalSource,
    query: String,
    elapsed: Duration,
    result: RetrievalResult<RetrieverHits>,
}

/// Merged list and metrics of one retriever across its calls.
struct GroupOutcome {
    candidates: Vec<Candidate>,
    metrics: RetrieverMetrics,
}

/// Grouped outcomes of one fan-out across every retriever.
struct FanOut {
    semantic: GroupOutcome,
    fulltext: GroupOutcome,
    dictionary: GroupOutcome,
    scoped: Option<GroupOutcome>,
    failures: Vec<FailedRetrieval>,
}

impl FanOut {
    fn succeeded_calls(&self) -> usize {
        [&self.semantic, &self.fulltext, &self.dictionary]
            .into_iter()
            .chain(self.scoped.as_ref())
            .map(|group| group.metrics.succeeded_calls())
            .sum()
    }
}

/// Multi-source retrieval and rank-fusion engine.
///
/// Holds no per-request state; one instance serves concurrent requests.
pub struct FusionEngine {
    aliases: Arc<AliasResolver>,
    synonyms: Arc<SynonymResolver>,
    retrievers: FusionRetrievers,
    config: FusionConfig,
}

impl FusionEngine {
    /// Create an engine over injected resolvers and retrievers.
    ///
    /// # Errors
    /// Returns an error if `config` is invalid.
    pub fn new(
        aliases: Arc<AliasResolver>,
        synonyms: Arc<SynonymResolver>,
        retrievers: FusionRetrievers,
        config: FusionConfig,
    ) -> RetrievalResult<Self> {
        config.validate()?;
        Ok(Self {
            aliases,
            synonyms,
            retrievers,
            config,
        })
    }

    /// Default configuration used by [`FusionEngine::fuse`].
    #[must_use]
    pub const fn config(&self) -> &FusionConfig {
        &self.config
    }

    /// Alias resolver shared with this engine.
    #[must_use]
    pub const fn aliases(&self) -> &Arc<AliasResolver> {
        &self.aliases
    }

    /// Synonym resolver shared with this engine.
    #[must_use]
    pub const fn synonyms(&self) -> &Arc<SynonymResolver> {
        &self.synonyms
    }

    /// Fuse `query` with the engine's configuration.
    ///
    /// # Errors
    /// See [`FusionEngine::fuse_with`].
    pub async fn fuse(&self, query: &str) -> RetrievalResult<FusionOutcome> {
        self.fuse_with(query, &self.config).await
    }

    /// Fuse `query` with an explicit configuration.
    ///
    /// # Errors
    /// Returns [`RetrievalError::InvalidConfig`] if `config` fails validation and
    /// [`RetrievalError::AllRetrieversFailed`] when no call succeeded.
    /// With `fail_fast`, returns the first failure instead
    /// ([`RetrievalError::Cancelled`] for an expired deadline).
    pub async fn fuse_with(
        &self,
        query: &str,
        config: &FusionConfig,
    ) -> RetrievalResult<FusionOutcome> {
        config.validate()?;

        let started = Instant::now();
        let started_at = Utc::now();
        let request_id = new_request_id();
        let deadline = config.timeout().map(|timeout| started + timeout);

        self.prepare_resolvers().await;
        let alias_matches = self.aliases.extract_aliases(query);
        let targets = target_documents(&alias_matches);
        let expanded = self.synonyms.expand_query(query);

        let mut fan_out = self
            .fan_out(query, &expanded, &targets, config, deadline)
            .await;

        if config.fail_fast
            && let Some(first) = fan_out.failures.first()
        {
            return Err(failure_error(first));
        }
        if fan_out.succeeded_calls() == 0 {
            return Err(RetrievalError::AllRetrieversFailed {
                failures: fan_out.failures.len(),
            });
        }

        let lists = ranked_lists(config, &mut fan_out);
        let (results, fusion) = fuse_lists(&lists, config, targets);
        let total_time_ms = millis(started.elapsed());

        info!(
            %request_id,
            expanded = expanded.len(),
            aliases = alias_matches.len(),
            input = fusion.input_count,
            output = fusion.output_count,
            multi_hit = fusion.multi_hit_candidates,
            failures = fan_out.failures.len(),
            total_ms = total_time_ms,
            "fusion complete"
        );

        Ok(FusionOutcome {
            results,
            metrics: FusionMetrics {
                request_id,
                started_at,
                expanded_queries: expanded,
                alias_matches,
                semantic: fan_out.semantic.metrics,
                fulltext: fan_out.fulltext.metrics,
                dictionary: fan_out.dictionary.metrics,
                scoped: fan_out.scoped.map(|group| group.metrics),
                fusion,
                failures: fan_out.failures,
                total_time_ms,
            },
        })
    }

    /// Run every retriever call concurrently and group the outcomes per retriever.
    async fn fan_out(
        &self,
        query: &str,
        expanded: &[ExpandedQuery],
        targets: &[String],
        config: &FusionConfig,
        deadline: Option<Instant>,
    ) -> FanOut {
        let semantic_calls = join_all(expanded.iter().map(|rewrite| {
            run_call(
                RetrievalSource::Semantic,
                &rewrite.query_text,
                deadline,
                self.retrievers.semantic.retrieve(&rewrite.query_text),
            )
        }));
        let fulltext_calls = join_all(expanded.iter().map(|rewrite| {
            run_call(
                RetrievalSource::Fulltext,
                &rewrite.query_text,
                deadline,
                self.retrievers.fulltext.retrieve(&rewrite.query_text),
            )
        }));
        let dictionary_call = run_call(
            RetrievalSource::Dictionary,
            query,
            deadline,
            self.retrievers.dictionary.retrieve(query),
        );
        let scoped_call = async {
            if targets.is_empty() {
                return None;
            }
            let call = self.retrievers.semantic.retrieve_scoped(
                query,
                targets.to_vec(),
                config.scoped_top_k,
            );
            Some(run_call(RetrievalSource::Semantic, query, deadline, call).await)
        };

        let (semantic, fulltext, dictionary, scoped) =
            tokio::join!(semantic_calls, fulltext_calls, dictionary_call, scoped_call);

        let mut failures = Vec::new();
        let semantic = collect_group(semantic, &mut failures);
        let fulltext = collect_group(fulltext, &mut failures);
        let dictionary = collect_group(vec![dictionary], &mut failures);
        let scoped = scoped.map(|call| collect_group(vec![call], &mut failures));

        FanOut {
            semantic,
            fulltext,
            dictionary,
            scoped,
            failures,
        }
    }

    /// Make sure both resolvers are loaded; a failed load only disables rewriting.
    async fn prepare_resolvers(&self) {
        let (aliases, synonyms) = tokio::join!(self.aliases.init(), self.synonyms.init());
        if let Err(err) = aliases {
            warn!(error = %err, "alias resolver unavailable; continuing without alias boost");
        }
        if let Err(err) = synonyms {
            warn!(error = %err, "synonym resolver unavailable; continuing without rewrites");
        }
    }
}

fn new_request_id() -> Uuid {
    #[cfg(feature = "uuid_v7")]
    {
        Uuid::now_v7()
    }
    #[cfg(not(feature = "uuid_v7"))]
    {
        Uuid::new_v4()
    }
}

/// Unique target documents of the alias matches, by first occurrence.
fn target_documents(matches: &[AliasMapping]) -> Vec<String> {
    let mut seen = HashSet::new();
    matches
        .iter()
        .filter(|mapping| seen.insert(mapping.document_id.as_str()))
        .map(|mapping| mapping.document_id.clone())
        .collect()
}

/// Weighted ranked lists of a fan-out; the scoped list shares the semantic weight.
fn ranked_lists(config: &FusionConfig, fan_out: &mut FanOut) -> Vec<RankedList> {
    let mut lists = vec![
        RankedList {
            source: RetrievalSource::Semantic,
            weight: config.semantic_weight,
            candidates: std::mem::take(&mut fan_out.semantic.candidates),
        },
        RankedList {
            source: RetrievalSource::Fulltext,
            weight: config.fulltext_weight,
            candidates: std::mem::take(&mut fan_out.fulltext.candidates),
        },
        RankedList {
            source: RetrievalSource::Dictionary,
            weight: config.dictionary_weight,
            candidates: std::mem::take(&mut fan_out.dictionary.candidates),
        },
    ];
    if let Some(scoped) = fan_out.scoped.as_mut() {
        lists.push(RankedList {
            source: RetrievalSource::Semantic,
            weight: config.semantic_weight,
            candidates: std::mem::take(&mut scoped.candidates),
        });
    }
    lists
}

/// Rank-fuse `lists`, keep the top `final_top_k` and measure the stage.
fn fuse_lists(
    lists: &[RankedList],
    config: &FusionConfig,
    targets: Vec<String>,
) -> (Vec<FusedResult>, FusionStats) {
    let started = Instant::now();
    let input_count = lists.iter().map(|list| list.candidates.len()).sum();
    let target_set: HashSet<String> = targets.into_iter().collect();
    let mut results = rrf_fuse(lists, RrfParams::from(config), &target_set);
    results.truncate(config.final_top_k);
    let (multi_hit_candidates, multi_hit_documents) = multi_hit_counts(&results);

    let stats = FusionStats {
        time_ms: millis(started.elapsed()),
        input_count,
        output_count: results.len(),
        multi_hit_candidates,
        multi_hit_documents,
    };
    (results, stats)
}

/// Await one retriever call, bounded by `deadline`.
async fn run_call<F>(
    source: RetrievalSource,
    query: &str,
    deadline: Option<Instant>,
    call: F,
) -> CallOutcome
where
    F: Future<Output = RetrievalResult<RetrieverHits>>,
{
    let started = Instant::now();
    let result = match deadline {
        Some(deadline) => tokio::time::timeout_at(deadline, call)
            .await
            .unwrap_or_else(|_| {
                Err(RetrievalError::Cancelled {
                    operation: format!("{source} retrieval"),
                })
            }),
        None => call.await,
    };

    CallOutcome {
        source,
        query: query.to_string(),
        elapsed: started.elapsed(),
        result,
    }
}

/// Merge the successful calls of one retriever and record the failed ones.
fn collect_group(outcomes: Vec<CallOutcome>, failures: &mut Vec<FailedRetrieval>) -> GroupOutcome {
    let mut metrics = RetrieverMetrics::default();
    let mut lists = Vec::with_capacity(outcomes.len());

    for outcome in outcomes {
        metrics.calls += 1;
        metrics.time_ms = metrics.time_ms.max(millis(outcome.elapsed));
        match outcome.result {
            Ok(hits) => {
                metrics.used_substring |= hits.mode == MatchMode::Substring;
                lists.push(hits.candidates);
            }
            Err(err) => {
                metrics.failed_calls += 1;
                warn!(
                    retriever = %outcome.source,
                    query = %outcome.query,
                    error = %err,
                    "retriever call failed"
                );
                failures.push(FailedRetrieval {
                    retriever: outcome.source,
                    query: outcome.query,
                    cancelled: err.is_cancelled(),
                    error: err.to_string(),
                });
            }
        }
    }

    let candidates = merge_by_key(lists);
    metrics.count = candidates.len();
    metrics.avg_score = average_score(&candidates);
    GroupOutcome {
        candidates,
        metrics,
    }
}

fn failure_error(failure: &FailedRetrieval) -> RetrievalError {
    if failure.cancelled {
        RetrievalError::Cancelled {
            operation: format!("{} retrieval", failure.retriever),
        }
    } else {
        RetrievalError::RetrieverFailed {
            retriever: failure.retriever,
            reason: failure.error.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::core::candidate::GlossaryEntry;
    use crate::retrieval::fusion::rrf::rrf_contribution;
    use crate::retrieval::resolve::synonym::RelationType;
    use crate::retrieval::testing::{
        ScriptedRetriever, StaticAliasSource, StaticSynonymSource, alias, sutra, synonym,
    };

    struct Fixture {
        semantic: ScriptedRetriever,
        fulltext: ScriptedRetriever,
        dictionary: ScriptedRetriever,
        aliases: Vec<AliasMapping>,
        synonyms: Vec<crate::retrieval::resolve::synonym::SynonymMapping>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                semantic: ScriptedRetriever::new(RetrievalSource::Semantic),
                fulltext: ScriptedRetriever::new(RetrievalSource::Fulltext),
                dictionary: ScriptedRetriever::new(RetrievalSource::Dictionary),
                aliases: Vec::new(),
                synonyms: Vec::new(),
            }
        }

        fn engine(self, config: FusionConfig) -> (FusionEngine, Arc<ScriptedRetriever>) {
            let semantic = Arc::new(self.semantic);
            let engine = FusionEngine::new(
                Arc::new(AliasResolver::new(Arc::new(StaticAliasSource::new(
                    self.aliases,
                )))),
                Arc::new(SynonymResolver::new(Arc::new(StaticSynonymSource::new(
                    self.synonyms,
                )))),
                FusionRetrievers {
                    semantic: semantic.clone(),
                    fulltext: Arc::new(self.fulltext),
                    dictionary: Arc::new(self.dictionary),
                },
                config,
            )
            .expect("valid config");
            (engine, semantic)
        }
    }

    fn passage(doc: &str, chunk: u32) -> Candidate {
        Candidate::Passage(sutra(doc, chunk, "经文"))
    }

    fn heart_sutra_fixture(with_alias: bool) -> Fixture {
        let mut fixture = Fixture::new();
        fixture.semantic = fixture
            .semantic
            .respond_default(vec![passage("T08n0251", 0), passage("T08n0235", 0)]);
        fixture.fulltext = fixture
            .fulltext
            .respond_default(vec![passage("T08n0235", 0), passage("T08n0251", 1)]);
        if with_alias {
            fixture.aliases = vec![alias("心经", "T08n0251", 100)];
        }
        fixture
    }

    fn score_of(outcome: &FusionOutcome, key: &str) -> f64 {
        outcome
            .results
            .iter()
            .find(|result| result.key.as_str() == key)
            .map_or(0.0, |result| result.score)
    }

    #[tokio::test]
    async fn test_alias_match_doubles_target_scores() {
        let query = "心经的核心思想是什么";
        let (plain, _) = heart_sutra_fixture(false).engine(FusionConfig::default());
        let (boosted, semantic) = heart_sutra_fixture(true).engine(FusionConfig::default());

        let plain = plain.fuse(query).await.expect("plain fusion");
        let boosted = boosted.fuse(query).await.expect("boosted fusion");

        for key in ["T08n0251:1:0", "T08n0251:1:1"] {
            assert_eq!(
                score_of(&boosted, key).to_bits(),
                (2.0 * score_of(&plain, key)).to_bits()
            );
        }
        assert_eq!(
            score_of(&boosted, "T08n0235:1:0").to_bits(),
            score_of(&plain, "T08n0235:1:0").to_bits()
        );
        assert_eq!(semantic.scoped_calls(), vec![vec!["T08n0251".to_string()]]);
        assert!(boosted.metrics.scoped.is_some());
        assert!(plain.metrics.scoped.is_none());
    }

    #[tokio::test]
    async fn test_scoped_hits_join_fusion_with_semantic_weight() {
        let mut fixture = Fixture::new();
        fixture.aliases = vec![alias("心经", "T08n0251", 100)];
        fixture.semantic = fixture
            .semantic
            .with_scoped(vec![passage("T08n0251", 7), passage("T08n0235", 3)]);
        let (engine, _) = fixture.engine(FusionConfig::default());

        let outcome = engine.fuse("心经").await.expect("fusion");

        assert_eq!(outcome.results.len(), 1);
        let hit = &outcome.results[0];
        assert_eq!(hit.key.as_str(), "T08n0251:1:7");
        let expected = 2.0 * rrf_contribution(0.5, 60.0, 0) * hit.candidate.type_weight();
        assert!((hit.score - expected).abs() < 1e-12);
        assert_eq!(outcome.metrics.scoped.as_ref().map(|m| m.count), Some(1));
    }

    #[tokio::test]
    async fn test_expansions_fan_out_and_merge_first_occurrence() {
        let mut fixture = Fixture::new();
        fixture.synonyms = vec![synonym("阿赖耶识", "藏识", RelationType::Exact, 10)];
        fixture.semantic = fixture
            .semantic
            .respond("什么是藏识", vec![passage("T31n1585", 0), passage("T31n1585", 1)])
            .respond("什么是阿赖耶识", vec![passage("T31n1585", 2), passage("T31n1585", 0)]);
        let (engine, semantic) = fixture.engine(FusionConfig::default());

        let outcome = engine.fuse("什么是藏识").await.expect("fusion");

        assert_eq!(semantic.queries().len(), 2);
        assert_eq!(outcome.metrics.expanded_queries.len(), 2);
        assert_eq!(outcome.metrics.semantic.calls, 2);
        assert_eq!(outcome.metrics.semantic.count, 3);
        assert_eq!(outcome.metrics.fulltext.calls, 2);
        assert_eq!(outcome.metrics.dictionary.calls, 1);
        let keys: Vec<&str> = outcome.results.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["T31n1585:1:0", "T31n1585:1:1", "T31n1585:1:2"]);
    }

    #[tokio::test]
    async fn test_multi_source_hits_are_counted() {
        let mut fixture = Fixture::new();
        fixture.semantic = fixture.semantic.respond_default(vec![passage("T08n0251", 0)]);
        fixture.fulltext = fixture
            .fulltext
            .respond_default(vec![passage("T08n0251", 0), passage("T08n0251", 5)]);
        fixture.dictionary = fixture
            .dictionary
            .respond_default(vec![Candidate::GlossaryEntry(GlossaryEntry::new(
                "般若", "智慧", "丁福保", None,
            ))]);
        let (engine, _) = fixture.engine(FusionConfig::default());

        let outcome = engine.fuse("般若").await.expect("fusion");

        assert_eq!(outcome.results.len(), 3);
        assert_eq!(outcome.results[0].key.as_str(), "T08n0251:1:0");
        assert_eq!(outcome.metrics.fusion.input_count, 4);
        assert_eq!(outcome.metrics.fusion.multi_hit_candidates, 1);
        assert_eq!(outcome.metrics.fusion.multi_hit_documents, 1);
    }

    #[tokio::test]
    async fn test_failed_retriever_degrades_and_is_recorded() {
        let mut fixture = Fixture::new();
        fixture.semantic = fixture.semantic.respond_default(vec![passage("T08n0251", 0)]);
        fixture.fulltext = fixture.fulltext.failing("index offline");
        let (engine, _) = fixture.engine(FusionConfig::default());

        let outcome = engine.fuse("般若").await.expect("degraded fusion");

        assert_eq!(outcome.results.len(), 1);
        assert_eq!(outcome.metrics.failures.len(), 1);
        assert_eq!(outcome.metrics.failures[0].retriever, RetrievalSource::Fulltext);
        assert!(!outcome.metrics.failures[0].cancelled);
        assert_eq!(outcome.metrics.fulltext.failed_calls, 1);
    }

    #[tokio::test]
    async fn test_fail_fast_propagates_first_failure() {
        let mut fixture = Fixture::new();
        fixture.fulltext = fixture.fulltext.failing("index offline");
        let config = FusionConfig {
            fail_fast: true,
            ..FusionConfig::default()
        };
        let (engine, _) = fixture.engine(config);

        let result = engine.fuse("般若").await;
        assert!(matches!(
            result,
            Err(RetrievalError::RetrieverFailed {
                retriever: RetrievalSource::Fulltext,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_all_failures_fail_the_call() {
        let mut fixture = Fixture::new();
        fixture.semantic = fixture.semantic.failing("down");
        fixture.fulltext = fixture.fulltext.failing("down");
        fixture.dictionary = fixture.dictionary.failing("down");
        let (engine, _) = fixture.engine(FusionConfig::default());

        let result = engine.fuse("般若").await;
        assert!(matches!(
            result,
            Err(RetrievalError::AllRetrieversFailed { failures: 3 })
        ));
    }

    #[tokio::test]
    async fn test_deadline_cancels_slow_retriever() {
        let mut fixture = Fixture::new();
        fixture.semantic = fixture.semantic.respond_default(vec![passage("T08n0251", 0)]);
        fixture.fulltext = fixture.fulltext.delayed(Duration::from_secs(5));
        let config = FusionConfig {
            timeout_ms: Some(30),
            ..FusionConfig::default()
        };
        let (engine, _) = fixture.engine(config);

        let outcome = engine.fuse("般若").await.expect("fusion");

        assert_eq!(outcome.results.len(), 1);
        assert!(outcome.metrics.failures[0].cancelled);
        assert!(outcome.metrics.total_time_ms < 5_000);
    }

    #[tokio::test]
    async fn test_deadline_with_fail_fast_is_cancelled_error() {
        let mut fixture = Fixture::new();
        fixture.fulltext = fixture.fulltext.delayed(Duration::from_secs(5));
        let config = FusionConfig {
            timeout_ms: Some(30),
            fail_fast: true,
            ..FusionConfig::default()
        };
        let (engine, _) = fixture.engine(config);

        let result = engine.fuse("般若").await;
        assert!(matches!(result, Err(RetrievalError::Cancelled { .. })));
    }

    #[tokio::test]
    async fn test_empty_success_is_ok() {
        let (engine, _) = Fixture::new().engine(FusionConfig::default());
        let outcome = engine.fuse("无").await.expect("fusion");
        assert!(outcome.results.is_empty());
        assert!(outcome.metrics.failures.is_empty());
    }

    #[tokio::test]
    async fn test_fuse_with_rejects_invalid_config() {
        let fixture = heart_sutra_fixture(false);
        let (engine, semantic) = fixture.engine(FusionConfig::default());
        let config = FusionConfig {
            final_top_k: 0,
            ..FusionConfig::default()
        };

        let result = engine.fuse_with("心经", &config).await;

        assert!(matches!(result, Err(RetrievalError::InvalidConfig(_))));
        assert!(semantic.queries().is_empty());
    }

    #[tokio::test]
    async fn test_final_top_k_truncates() {
        let mut fixture = Fixture::new();
        fixture.semantic = fixture
            .semantic
            .respond_default((0..20).map(|idx| passage("T08n0251", idx)).collect());
        let config = FusionConfig {
            final_top_k: 15,
            ..FusionConfig::default()
        };
        let (engine, _) = fixture.engine(config);
        let outcome = engine.fuse("心").await.expect("fusion");
        assert_eq!(outcome.results.len(), 15);
        assert_eq!(outcome.metrics.fusion.input_count, 20);
    }
}
