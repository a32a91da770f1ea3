//! Neighbor-chunk access used by context expansion.

use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

use crate::retrieval::core::errors::RetrievalResult;
use crate::retrieval::storage::StoreFuture;
use crate::retrieval::storage::corpus::SqliteCorpus;

/// One chunk of a document volume.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Position inside the volume.
    pub chunk_index: u32,
    /// Chunk text.
    pub content: String,
}

/// Range reads over the chunks of a volume.
pub trait ChunkStore: Send + Sync {
    /// Chunks of `document_id` volume `volume` whose index lies in `range`, by index ascending.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn fetch_chunks(
        &self,
        document_id: &str,
        volume: u32,
        range: RangeInclusive<u32>,
    ) -> StoreFuture<'_, RetrievalResult<Vec<Chunk>>>;
}

impl ChunkStore for SqliteCorpus {
    fn fetch_chunks(
        &self,
        document_id: &str,
        volume: u32,
        range: RangeInclusive<u32>,
    ) -> StoreFuture<'_, RetrievalResult<Vec<Chunk>>> {
        let document_id = document_id.to_string();
        Box::pin(async move {
            let table = self.chunks_table.clone();
            let (start, end) = range.into_inner();
            let chunks = self
                .connection()
                .call(move |conn| {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT chunk_index, content FROM {table}
                         WHERE text_id = ?1 AND juan = ?2 AND chunk_index BETWEEN ?3 AND ?4
                         ORDER BY chunk_index"
                    ))?;
                    let rows = stmt
                        .query_map(rusqlite::params![document_id, volume, start, end], |row| {
                            Ok(Chunk {
                                chunk_index: row.get(0)?,
                                content: row.get(1)?,
                            })
                        })?
                        .collect::<Result<Vec<_>, rusqlite::Error>>()?;
                    Ok(rows)
                })
                .await?;
            Ok(chunks)
        })
    }
}
