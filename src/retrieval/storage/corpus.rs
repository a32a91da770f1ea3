//! `SQLite` corpus: document metadata, chunk text and its FTS5 index.
//!
//! Chunks are indexed through their `segmented` column, a space-separated
//! token string produced at ingest time. The FTS5 table uses the chunk table
//! as external content, so [`SqliteCorpus::rebuild_fulltext`] must run after
//! chunks change.

use serde::{Deserialize, Serialize};
use tokio_rusqlite::Connection;
use tracing::info;

use crate::retrieval::core::candidate::Passage;
use crate::retrieval::core::config::StorageConfig;
use crate::retrieval::core::errors::RetrievalResult;
use crate::retrieval::core::kinds::DocumentType;

/// A canonical document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextRecord {
    /// Canonical identifier (for example `T08n0251`).
    pub id: String,
    /// Display title.
    pub title: String,
    /// Genre label as stored (`经`, `律`, ...).
    pub text_type: Option<String>,
    /// Canon collection (`T` for the Taishō canon).
    pub canon_id: Option<String>,
}

/// A chunk to insert.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewChunk {
    /// Owning document.
    pub text_id: String,
    /// Volume (卷).
    pub juan: u32,
    /// Position inside the volume.
    pub chunk_index: u32,
    /// Chunk text.
    pub content: String,
    /// Space-separated tokens for the full-text index; the raw content when absent.
    pub segmented: Option<String>,
}

/// Document, chunk and full-text tables over one connection.
#[derive(Clone)]
pub struct SqliteCorpus {
    conn: Connection,
    pub(crate) texts_table: String,
    pub(crate) chunks_table: String,
    pub(crate) fts_table: String,
}

impl SqliteCorpus {
    /// Open the database and create the corpus tables if needed.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or the schema cannot be created.
    pub async fn new(config: &StorageConfig) -> RetrievalResult<Self> {
        let conn = Connection::open(&config.sqlite_path).await?;
        Self::with_connection(conn, config).await
    }

    /// Use an existing connection and create the corpus tables if needed.
    ///
    /// # Errors
    /// Returns an error if the schema cannot be created.
    pub async fn with_connection(conn: Connection, config: &StorageConfig) -> RetrievalResult<Self> {
        let corpus = Self {
            conn,
            texts_table: config.texts_table.clone(),
            chunks_table: config.chunks_table.clone(),
            fts_table: config.fts_table.clone(),
        };

        let texts = corpus.texts_table.clone();
        let chunks = corpus.chunks_table.clone();
        let fts = corpus.fts_table.clone();
        let vocab = corpus.vocab_table();
        corpus
            .conn
            .call(move |conn| {
                conn.execute_batch(&format!(
                    "CREATE TABLE IF NOT EXISTS {texts} (
                        id TEXT PRIMARY KEY,
                        title TEXT NOT NULL,
                        text_type TEXT,
                        canon_id TEXT
                    );
                    CREATE TABLE IF NOT EXISTS {chunks} (
                        id INTEGER PRIMARY KEY AUTOINCREMENT,
                        text_id TEXT NOT NULL,
                        juan INTEGER NOT NULL,
                        chunk_index INTEGER NOT NULL,
                        content TEXT NOT NULL,
                        segmented TEXT NOT NULL DEFAULT '',
                        UNIQUE (text_id, juan, chunk_index)
                    );
                    CREATE VIRTUAL TABLE IF NOT EXISTS {fts} USING fts5(
                        segmented,
                        content='{chunks}',
                        content_rowid='id'
                    );
                    CREATE VIRTUAL TABLE IF NOT EXISTS {vocab} USING fts5vocab({fts}, 'row');"
                ))?;
                Ok(())
            })
            .await?;

        Ok(corpus)
    }

    /// Underlying connection.
    #[must_use]
    pub const fn connection(&self) -> &Connection {
        &self.conn
    }

    pub(crate) fn vocab_table(&self) -> String {
        format!("{}_vocab", self.fts_table)
    }

    /// Insert or replace a document row.
    ///
    /// # Errors
    /// Returns an error if the write fails.
    pub async fn insert_text(&self, text: TextRecord) -> RetrievalResult<()> {
        let table = self.texts_table.clone();
        self.conn
            .call(move |conn| {
                conn.execute(
                    &format!(
                        "INSERT OR REPLACE INTO {table} (id, title, text_type, canon_id)
                         VALUES (?1, ?2, ?3, ?4)"
                    ),
                    rusqlite::params![text.id, text.title, text.text_type, text.canon_id],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Insert or replace chunks in one transaction.
    ///
    /// # Errors
    /// Returns an error if the write fails.
    pub async fn insert_chunks(&self, chunks: Vec<NewChunk>) -> RetrievalResult<usize> {
        let table = self.chunks_table.clone();
        let inserted = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                {
                    let mut stmt = tx.prepare(&format!(
                        "INSERT OR REPLACE INTO {table}
                            (text_id, juan, chunk_index, content, segmented)
                         VALUES (?1, ?2, ?3, ?4, ?5)"
                    ))?;
                    for chunk in &chunks {
                        let segmented = chunk.segmented.as_deref().unwrap_or(&chunk.content);
                        stmt.execute(rusqlite::params![
                            chunk.text_id,
                            chunk.juan,
                            chunk.chunk_index,
                            chunk.content,
                            segmented
                        ])?;
                    }
                }
                tx.commit()?;
                Ok(chunks.len())
            })
            .await?;
        Ok(inserted)
    }

    /// Rebuild the full-text index from the chunk table.
    ///
    /// # Errors
    /// Returns an error if the rebuild fails.
    pub async fn rebuild_fulltext(&self) -> RetrievalResult<()> {
        let fts = self.fts_table.clone();
        self.conn
            .call(move |conn| {
                conn.execute(&format!("INSERT INTO {fts} ({fts}) VALUES ('rebuild')"), [])?;
                Ok(())
            })
            .await?;
        info!(table = %self.fts_table, "full-text index rebuilt");
        Ok(())
    }
}

/// Map a `(text_id, juan, chunk_index, title, text_type, content, relevance)` row.
pub(crate) fn passage_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Passage> {
    let text_type: Option<String> = row.get(4)?;
    Ok(Passage {
        document_id: row.get(0)?,
        volume: row.get(1)?,
        chunk_index: row.get(2)?,
        title: row.get(3)?,
        document_type: DocumentType::from_label(text_type.as_deref()),
        content: row.get(5)?,
        score: row.get(6)?,
    })
}
