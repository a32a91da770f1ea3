//! Full-text capability and its FTS5 implementation.

use tracing::debug;

use crate::retrieval::core::candidate::Passage;
use crate::retrieval::core::errors::RetrievalResult;
use crate::retrieval::storage::StoreFuture;
use crate::retrieval::storage::corpus::{SqliteCorpus, passage_from_row};
use crate::retrieval::text::segment::forward_maximum_match;

/// Longest vocabulary word tried during segmentation, in chars.
const MAX_WORD_CHARS: usize = 8;

/// Keyword search over chunk text.
pub trait FullTextIndex: Send + Sync {
    /// Segment `text` the way the index segments chunks.
    ///
    /// # Errors
    /// Returns an error if the vocabulary cannot be read.
    fn tokenize(&self, text: &str) -> StoreFuture<'_, RetrievalResult<Vec<String>>>;

    /// Chunks containing every token, by relevance descending.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    fn ranked_search(
        &self,
        tokens: Vec<String>,
        limit: usize,
        min_relevance: f64,
    ) -> StoreFuture<'_, RetrievalResult<Vec<Passage>>>;

    /// Chunks containing `term` verbatim, canon texts first.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    fn substring_search(
        &self,
        term: &str,
        limit: usize,
    ) -> StoreFuture<'_, RetrievalResult<Vec<Passage>>>;
}

/// FTS5 phrase query requiring every token.
fn match_expression(tokens: &[String]) -> String {
    tokens
        .iter()
        .map(|token| format!("\"{}\"", token.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(" ")
}

fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

impl FullTextIndex for SqliteCorpus {
    fn tokenize(&self, text: &str) -> StoreFuture<'_, RetrievalResult<Vec<String>>> {
        let text = text.to_string();
        Box::pin(async move {
            let vocab = self.vocab_table();
            let tokens = self
                .connection()
                .call(move |conn| {
                    let mut stmt =
                        conn.prepare(&format!("SELECT 1 FROM {vocab} WHERE term = ?1 LIMIT 1"))?;
                    let tokens = forward_maximum_match(&text, MAX_WORD_CHARS, |word| {
                        stmt.exists([word])
                    })?;
                    Ok(tokens)
                })
                .await?;
            Ok(tokens)
        })
    }

    fn ranked_search(
        &self,
        tokens: Vec<String>,
        limit: usize,
        min_relevance: f64,
    ) -> StoreFuture<'_, RetrievalResult<Vec<Passage>>> {
        Box::pin(async move {
            if tokens.is_empty() {
                return Ok(Vec::new());
            }
            let expression = match_expression(&tokens);
            let (texts, chunks, fts) = (
                self.texts_table.clone(),
                self.chunks_table.clone(),
                self.fts_table.clone(),
            );
            let passages = self
                .connection()
                .call(move |conn| {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT c.text_id, c.juan, c.chunk_index, t.title, t.text_type, c.content,
                                -bm25({fts}) AS relevance
                         FROM {fts}
                         JOIN {chunks} c ON c.id = {fts}.rowid
                         JOIN {texts} t ON t.id = c.text_id
                         WHERE {fts} MATCH ?1
                         ORDER BY relevance DESC
                         LIMIT ?2"
                    ))?;
                    let rows = stmt
                        .query_map(rusqlite::params![expression, sql_limit(limit)], |row| {
                            passage_from_row(row)
                        })?
                        .collect::<Result<Vec<_>, rusqlite::Error>>()?;
                    Ok(rows)
                })
                .await?;

            let passages: Vec<Passage> = passages
                .into_iter()
                .filter(|passage| passage.score.unwrap_or(0.0) >= min_relevance)
                .collect();
            debug!(hits = passages.len(), "fts ranked search");
            Ok(passages)
        })
    }

    fn substring_search(
        &self,
        term: &str,
        limit: usize,
    ) -> StoreFuture<'_, RetrievalResult<Vec<Passage>>> {
        let term = term.to_string();
        Box::pin(async move {
            let (texts, chunks) = (self.texts_table.clone(), self.chunks_table.clone());
            let passages = self
                .connection()
                .call(move |conn| {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT c.text_id, c.juan, c.chunk_index, t.title, t.text_type, c.content,
                                1.0 AS relevance
                         FROM {chunks} c
                         JOIN {texts} t ON t.id = c.text_id
                         WHERE instr(c.content, ?1) > 0
                         ORDER BY CASE WHEN t.canon_id = 'T' THEN 0 ELSE 1 END,
                                  c.text_id, c.juan, c.chunk_index
                         LIMIT ?2"
                    ))?;
                    let rows = stmt
                        .query_map(rusqlite::params![term, sql_limit(limit)], |row| {
                            passage_from_row(row)
                        })?
                        .collect::<Result<Vec<_>, rusqlite::Error>>()?;
                    Ok(rows)
                })
                .await?;
            debug!(hits = passages.len(), "substring search");
            Ok(passages)
        })
    }
}
