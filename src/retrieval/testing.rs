//! In-memory fakes shared by unit tests.

use std::collections::HashMap;
use std::ops::RangeInclusive;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use crate::retrieval::core::candidate::{Candidate, GlossaryEntry, Passage};
use crate::retrieval::core::errors::{RetrievalError, RetrievalResult};
use crate::retrieval::core::kinds::{DocumentType, RetrievalSource};
use crate::retrieval::resolve::alias::AliasMapping;
use crate::retrieval::resolve::synonym::{RelationType, SynonymMapping};
use crate::retrieval::retrievers::{RetrieveFuture, Retriever, RetrieverHits, ScopedRetriever};
use crate::retrieval::storage::chunk_store::{Chunk, ChunkStore};
use crate::retrieval::storage::fulltext_index::FullTextIndex;
use crate::retrieval::storage::glossary_store::GlossaryIndex;
use crate::retrieval::storage::resolver_tables::{AliasSource, SynonymSource};
use crate::retrieval::storage::vector_index::VectorIndex;
use crate::retrieval::storage::StoreFuture;

/// Lock a test mutex, ignoring poisoning from an earlier failed assertion.
fn locked<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

pub(crate) fn alias(alias: &str, document_id: &str, priority: i32) -> AliasMapping {
    AliasMapping {
        alias: alias.to_string(),
        canonical_title: alias.to_string(),
        document_id: document_id.to_string(),
        priority,
    }
}

pub(crate) fn synonym(
    canonical: &str,
    synonym: &str,
    relation_type: RelationType,
    priority: i32,
) -> SynonymMapping {
    SynonymMapping {
        canonical_term: canonical.to_string(),
        synonym: synonym.to_string(),
        relation_type,
        priority,
    }
}

/// A volume-1 sutra passage without a backend score.
pub(crate) fn sutra(document_id: &str, chunk_index: u32, content: &str) -> Passage {
    Passage {
        document_id: document_id.to_string(),
        volume: 1,
        chunk_index: Some(chunk_index),
        title: format!("{document_id} title"),
        document_type: DocumentType::Sutra,
        content: content.to_string(),
        score: None,
    }
}

pub(crate) fn passage(
    document_id: &str,
    volume: u32,
    chunk_index: Option<u32>,
    document_type: DocumentType,
    content: &str,
) -> Candidate {
    Candidate::Passage(Passage {
        document_id: document_id.to_string(),
        volume,
        chunk_index,
        title: format!("{document_id} title"),
        document_type,
        content: content.to_string(),
        score: None,
    })
}

pub(crate) struct StaticAliasSource {
    rows: Vec<AliasMapping>,
    fail_next: AtomicBool,
    pub(crate) loads: AtomicUsize,
}

impl StaticAliasSource {
    pub(crate) fn new(rows: Vec<AliasMapping>) -> Self {
        Self {
            rows,
            fail_next: AtomicBool::new(false),
            loads: AtomicUsize::new(0),
        }
    }

    /// Fails the first load, then serves `rows`.
    pub(crate) fn failing_once(rows: Vec<AliasMapping>) -> Self {
        let source = Self::new(rows);
        source.fail_next.store(true, Ordering::SeqCst);
        source
    }
}

impl AliasSource for StaticAliasSource {
    fn load_aliases(&self) -> StoreFuture<'_, RetrievalResult<Vec<AliasMapping>>> {
        Box::pin(async move {
            self.loads.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            if self.fail_next.swap(false, Ordering::SeqCst) {
                return Err(RetrievalError::Backend("alias table offline".to_string()));
            }
            Ok(self.rows.clone())
        })
    }
}

pub(crate) struct StaticSynonymSource {
    rows: Vec<SynonymMapping>,
}

impl StaticSynonymSource {
    pub(crate) const fn new(rows: Vec<SynonymMapping>) -> Self {
        Self { rows }
    }
}

impl SynonymSource for StaticSynonymSource {
    fn load_synonyms(&self) -> StoreFuture<'_, RetrievalResult<Vec<SynonymMapping>>> {
        Box::pin(async move { Ok(self.rows.clone()) })
    }
}

/// Vector index returning its passages in order, whatever the query.
pub(crate) struct StaticVectorIndex {
    passages: Vec<Passage>,
}

impl StaticVectorIndex {
    pub(crate) const fn new(passages: Vec<Passage>) -> Self {
        Self { passages }
    }
}

impl VectorIndex for StaticVectorIndex {
    fn search(
        &self,
        _query: &str,
        limit: usize,
        _min_similarity: f64,
    ) -> StoreFuture<'_, RetrievalResult<Vec<Passage>>> {
        Box::pin(async move { Ok(self.passages.iter().take(limit).cloned().collect()) })
    }

    fn search_in_documents(
        &self,
        _query: &str,
        document_ids: Vec<String>,
        limit: usize,
        _min_similarity: f64,
    ) -> StoreFuture<'_, RetrievalResult<Vec<Passage>>> {
        Box::pin(async move {
            Ok(self
                .passages
                .iter()
                .filter(|passage| document_ids.contains(&passage.document_id))
                .take(limit)
                .cloned()
                .collect())
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum FullTextCall {
    Tokenize(String),
    Ranked(Vec<String>),
    Substring(String),
}

/// Full-text index with a fixed segmentation that records its calls.
pub(crate) struct ScriptedFullTextIndex {
    tokens: Vec<String>,
    ranked: Vec<Passage>,
    calls: Mutex<Vec<FullTextCall>>,
}

impl ScriptedFullTextIndex {
    pub(crate) fn new(tokens: &[&str]) -> Self {
        Self {
            tokens: tokens.iter().map(|token| (*token).to_string()).collect(),
            ranked: Vec::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn with_ranked(mut self, passages: Vec<Passage>) -> Self {
        self.ranked = passages;
        self
    }

    pub(crate) fn calls(&self) -> Vec<FullTextCall> {
        locked(&self.calls).clone()
    }
}

impl FullTextIndex for ScriptedFullTextIndex {
    fn tokenize(&self, text: &str) -> StoreFuture<'_, RetrievalResult<Vec<String>>> {
        locked(&self.calls).push(FullTextCall::Tokenize(text.to_string()));
        Box::pin(async move { Ok(self.tokens.clone()) })
    }

    fn ranked_search(
        &self,
        tokens: Vec<String>,
        limit: usize,
        _min_relevance: f64,
    ) -> StoreFuture<'_, RetrievalResult<Vec<Passage>>> {
        locked(&self.calls).push(FullTextCall::Ranked(tokens));
        Box::pin(async move { Ok(self.ranked.iter().take(limit).cloned().collect()) })
    }

    fn substring_search(
        &self,
        term: &str,
        _limit: usize,
    ) -> StoreFuture<'_, RetrievalResult<Vec<Passage>>> {
        locked(&self.calls).push(FullTextCall::Substring(term.to_string()));
        Box::pin(async move { Ok(Vec::new()) })
    }
}

/// Glossary matching entries whose headword is one of the terms.
pub(crate) struct StaticGlossaryIndex {
    entries: Vec<GlossaryEntry>,
}

impl StaticGlossaryIndex {
    pub(crate) const fn new(entries: Vec<GlossaryEntry>) -> Self {
        Self { entries }
    }
}

impl GlossaryIndex for StaticGlossaryIndex {
    fn lookup(
        &self,
        _query: &str,
        terms: Vec<String>,
        limit: usize,
    ) -> StoreFuture<'_, RetrievalResult<Vec<GlossaryEntry>>> {
        Box::pin(async move {
            Ok(self
                .entries
                .iter()
                .filter(|entry| terms.contains(&entry.term))
                .take(limit)
                .cloned()
                .collect())
        })
    }
}

/// Retriever answering from per-query scripts.
pub(crate) struct ScriptedRetriever {
    source: RetrievalSource,
    responses: HashMap<String, Vec<Candidate>>,
    default: Vec<Candidate>,
    scoped: Vec<Candidate>,
    failure: Option<String>,
    delay: Option<Duration>,
    queries: Mutex<Vec<String>>,
    scoped_calls: Mutex<Vec<Vec<String>>>,
}

impl ScriptedRetriever {
    pub(crate) fn new(source: RetrievalSource) -> Self {
        Self {
            source,
            responses: HashMap::new(),
            default: Vec::new(),
            scoped: Vec::new(),
            failure: None,
            delay: None,
            queries: Mutex::new(Vec::new()),
            scoped_calls: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn respond(mut self, query: &str, candidates: Vec<Candidate>) -> Self {
        self.responses.insert(query.to_string(), candidates);
        self
    }

    pub(crate) fn respond_default(mut self, candidates: Vec<Candidate>) -> Self {
        self.default = candidates;
        self
    }

    pub(crate) fn with_scoped(mut self, candidates: Vec<Candidate>) -> Self {
        self.scoped = candidates;
        self
    }

    pub(crate) fn failing(mut self, reason: &str) -> Self {
        self.failure = Some(reason.to_string());
        self
    }

    pub(crate) const fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) fn queries(&self) -> Vec<String> {
        locked(&self.queries).clone()
    }

    pub(crate) fn scoped_calls(&self) -> Vec<Vec<String>> {
        locked(&self.scoped_calls).clone()
    }

    async fn answer(&self, candidates: Vec<Candidate>) -> RetrievalResult<RetrieverHits> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(reason) = &self.failure {
            return Err(RetrievalError::Backend(reason.clone()));
        }
        Ok(RetrieverHits::ranked(candidates))
    }
}

impl Retriever for ScriptedRetriever {
    fn source(&self) -> RetrievalSource {
        self.source
    }

    fn retrieve(&self, query: &str) -> RetrieveFuture<'_, RetrievalResult<RetrieverHits>> {
        locked(&self.queries).push(query.to_string());
        let candidates = self
            .responses
            .get(query)
            .unwrap_or(&self.default)
            .clone();
        Box::pin(self.answer(candidates))
    }
}

impl ScopedRetriever for ScriptedRetriever {
    fn retrieve_scoped(
        &self,
        _query: &str,
        document_ids: Vec<String>,
        limit: usize,
    ) -> RetrieveFuture<'_, RetrievalResult<RetrieverHits>> {
        let candidates = self
            .scoped
            .iter()
            .filter(|candidate| {
                candidate
                    .document_id()
                    .is_some_and(|id| document_ids.iter().any(|target| target == id))
            })
            .take(limit)
            .cloned()
            .collect();
        locked(&self.scoped_calls).push(document_ids);
        Box::pin(self.answer(candidates))
    }
}

/// Chunk store over a fixed map of `(document, volume)` to chunks.
#[derive(Default)]
pub(crate) struct StaticChunkStore {
    volumes: HashMap<(String, u32), Vec<Chunk>>,
    failing: Vec<String>,
    delay: Option<Duration>,
}

impl StaticChunkStore {
    pub(crate) fn with_volume(mut self, document_id: &str, volume: u32, texts: &[&str]) -> Self {
        let chunks = (0_u32..)
            .zip(texts)
            .map(|(chunk_index, text)| Chunk {
                chunk_index,
                content: (*text).to_string(),
            })
            .collect();
        self.volumes
            .insert((document_id.to_string(), volume), chunks);
        self
    }

    pub(crate) fn failing_for(mut self, document_id: &str) -> Self {
        self.failing.push(document_id.to_string());
        self
    }

    pub(crate) const fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

impl ChunkStore for StaticChunkStore {
    fn fetch_chunks(
        &self,
        document_id: &str,
        volume: u32,
        range: RangeInclusive<u32>,
    ) -> StoreFuture<'_, RetrievalResult<Vec<Chunk>>> {
        let document_id = document_id.to_string();
        Box::pin(async move {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.failing.contains(&document_id) {
                return Err(RetrievalError::Backend("chunk store offline".to_string()));
            }
            Ok(self
                .volumes
                .get(&(document_id, volume))
                .map(|chunks| {
                    chunks
                        .iter()
                        .filter(|chunk| range.contains(&chunk.chunk_index))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default())
        })
    }
}
