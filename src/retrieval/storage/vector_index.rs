//! Vector index over chunk embeddings, using Rig + `SQLite`.

use std::sync::OnceLock;

use futures::future::join_all;
use reqwest::Client as ReqwestClient;
use rig::OneOrMany;
use rig::client::{EmbeddingsClient, Nothing};
use rig::embeddings::Embedding;
use rig::providers::ollama;
use rig::vector_store::VectorStoreIndex;
use rig::vector_store::request::{SearchFilter, VectorSearchRequest};
use rig_sqlite::{Column, ColumnValue, SqliteSearchFilter, SqliteVectorStore, SqliteVectorStoreTable};
use serde::Deserialize;
use tokio_rusqlite::Connection;
use tracing::debug;

use crate::retrieval::core::candidate::Passage;
use crate::retrieval::core::config::EngineConfig;
use crate::retrieval::core::errors::{RetrievalError, RetrievalResult};
use crate::retrieval::core::kinds::DocumentType;
use crate::retrieval::storage::StoreFuture;

type OllamaEmbeddingModel = ollama::EmbeddingModel<ReqwestClient>;

/// Similarity search over passage embeddings.
pub trait VectorIndex: Send + Sync {
    /// Up to `limit` passages nearest to `query` with similarity at least `min_similarity`.
    ///
    /// # Errors
    /// Returns an error if embedding or the search fails.
    fn search(
        &self,
        query: &str,
        limit: usize,
        min_similarity: f64,
    ) -> StoreFuture<'_, RetrievalResult<Vec<Passage>>>;

    /// Like [`VectorIndex::search`], restricted to `document_ids`.
    ///
    /// # Errors
    /// Returns an error if embedding or the search fails.
    fn search_in_documents(
        &self,
        query: &str,
        document_ids: Vec<String>,
        limit: usize,
        min_similarity: f64,
    ) -> StoreFuture<'_, RetrievalResult<Vec<Passage>>>;
}

const DEFAULT_TABLE: &str = "chunk_vectors";
static TABLE_NAME: OnceLock<&'static str> = OnceLock::new();

fn init_table_name(name: &str) -> RetrievalResult<()> {
    if let Some(existing) = TABLE_NAME.get() {
        if *existing == name {
            return Ok(());
        }
        return Err(RetrievalError::InvalidConfig(
            "vector table already initialized with a different name".to_string(),
        ));
    }

    let leaked = Box::leak(name.to_string().into_boxed_str());
    let _ = TABLE_NAME.set(leaked);
    Ok(())
}

fn table_name() -> &'static str {
    TABLE_NAME.get().copied().unwrap_or(DEFAULT_TABLE)
}

/// Row layout of the vector table; numeric fields are stored as text.
#[derive(Clone, Debug, Deserialize)]
struct ChunkDocument {
    id: String,
    document_id: String,
    volume: String,
    chunk_index: String,
    title: String,
    document_type: String,
    content: String,
}

impl ChunkDocument {
    fn from_passage(passage: &Passage) -> RetrievalResult<Self> {
        let chunk_index = passage.chunk_index.ok_or_else(|| {
            RetrievalError::Backend(format!(
                "passage of {} has no chunk index",
                passage.document_id
            ))
        })?;
        Ok(Self {
            id: format!("{}:{}:{chunk_index}", passage.document_id, passage.volume),
            document_id: passage.document_id.clone(),
            volume: passage.volume.to_string(),
            chunk_index: chunk_index.to_string(),
            title: passage.title.clone(),
            document_type: passage.document_type.to_string(),
            content: passage.content.clone(),
        })
    }

    fn into_passage(self, similarity: f64) -> RetrievalResult<Passage> {
        let volume = self.volume.parse::<u32>().map_err(|err| {
            RetrievalError::Backend(format!("invalid volume for {}: {err}", self.id))
        })?;
        let chunk_index = self.chunk_index.parse::<u32>().map_err(|err| {
            RetrievalError::Backend(format!("invalid chunk index for {}: {err}", self.id))
        })?;
        Ok(Passage {
            document_id: self.document_id,
            volume,
            chunk_index: Some(chunk_index),
            title: self.title,
            document_type: DocumentType::from_label(Some(&self.document_type)),
            content: self.content,
            score: Some(similarity),
        })
    }
}

impl SqliteVectorStoreTable for ChunkDocument {
    fn name() -> &'static str {
        table_name()
    }

    fn schema() -> Vec<Column> {
        vec![
            Column::new("id", "TEXT PRIMARY KEY"),
            Column::new("document_id", "TEXT").indexed(),
            Column::new("volume", "TEXT"),
            Column::new("chunk_index", "TEXT"),
            Column::new("title", "TEXT"),
            Column::new("document_type", "TEXT"),
            Column::new("content", "TEXT"),
        ]
    }

    fn id(&self) -> String {
        self.id.clone()
    }

    fn column_values(&self) -> Vec<(&'static str, Box<dyn ColumnValue>)> {
        vec![
            ("id", Box::new(self.id.clone())),
            ("document_id", Box::new(self.document_id.clone())),
            ("volume", Box::new(self.volume.clone())),
            ("chunk_index", Box::new(self.chunk_index.clone())),
            ("title", Box::new(self.title.clone())),
            ("document_type", Box::new(self.document_type.clone())),
            ("content", Box::new(self.content.clone())),
        ]
    }
}

/// SQLite-backed vector index embedding queries with an Ollama model.
pub struct SqliteVectorIndex {
    store: SqliteVectorStore<OllamaEmbeddingModel, ChunkDocument>,
    index: rig_sqlite::SqliteVectorIndex<OllamaEmbeddingModel, ChunkDocument>,
}

impl SqliteVectorIndex {
    /// Open the vector table on `conn`.
    ///
    /// # Errors
    /// Returns an error if the embedding client cannot be built or the
    /// sqlite-vec extension is missing.
    ///
    /// # Note
    /// `init_sqlite_vec_extension()` must run before `conn` is opened.
    pub async fn new(conn: Connection, config: &EngineConfig) -> RetrievalResult<Self> {
        init_table_name(&config.storage.vector_table)?;

        let builder = ollama::Client::<ReqwestClient>::builder().api_key(Nothing);
        let builder = if let Some(base_url) = &config.embedding.base_url {
            builder.base_url(base_url)
        } else {
            builder
        };
        let client = builder.build().map_err(RetrievalError::from)?;
        let model = client
            .embedding_model_with_ndims(config.embedding.model.clone(), config.embedding.ndims);

        let store = SqliteVectorStore::new(conn, &model).await?;
        let index = store.clone().index(model);

        Ok(Self { store, index })
    }

    /// Store a passage with its precomputed embedding.
    ///
    /// # Errors
    /// Returns an error if the passage has no chunk index or the write fails.
    pub async fn upsert(&self, passage: &Passage, embedding: Embedding) -> RetrievalResult<()> {
        let doc = ChunkDocument::from_passage(passage)?;
        self.store
            .add_rows(vec![(doc, OneOrMany::one(embedding))])
            .await?;
        Ok(())
    }

    async fn top_n(
        &self,
        query: &str,
        limit: usize,
        min_similarity: f64,
        filter: Option<SqliteSearchFilter>,
    ) -> RetrievalResult<Vec<Passage>> {
        let builder = VectorSearchRequest::builder()
            .query(query.to_string())
            .samples(u64::try_from(limit).unwrap_or(u64::MAX))
            .threshold(min_similarity);
        let builder = match filter {
            Some(filter) => builder.filter(filter),
            None => builder,
        };
        let request = builder
            .build()
            .map_err(|err| RetrievalError::InvalidConfig(err.to_string()))?;

        let raw = self.index.top_n::<ChunkDocument>(request).await?;
        let mut passages = Vec::with_capacity(raw.len());
        for (score, _id, doc) in raw {
            if score < min_similarity {
                continue;
            }
            passages.push(doc.into_passage(score)?);
        }
        Ok(passages)
    }
}

impl VectorIndex for SqliteVectorIndex {
    fn search(
        &self,
        query: &str,
        limit: usize,
        min_similarity: f64,
    ) -> StoreFuture<'_, RetrievalResult<Vec<Passage>>> {
        let query = query.to_string();
        Box::pin(async move { self.top_n(&query, limit, min_similarity, None).await })
    }

    fn search_in_documents(
        &self,
        query: &str,
        document_ids: Vec<String>,
        limit: usize,
        min_similarity: f64,
    ) -> StoreFuture<'_, RetrievalResult<Vec<Passage>>> {
        let query = query.to_string();
        Box::pin(async move {
            let searches = document_ids.into_iter().map(|document_id| {
                let filter = SqliteSearchFilter::eq("document_id".to_string(), document_id.into());
                self.top_n(&query, limit, min_similarity, Some(filter))
            });

            let mut passages = Vec::new();
            for result in join_all(searches).await {
                passages.extend(result?);
            }
            passages.sort_by(|a, b| {
                b.score
                    .unwrap_or(0.0)
                    .total_cmp(&a.score.unwrap_or(0.0))
            });
            passages.truncate(limit);
            debug!(hits = passages.len(), "scoped vector search");
            Ok(passages)
        })
    }
}
