//! Storage capabilities consumed by the retrievers, and their `SQLite` adapters.

pub mod chunk_store;
pub mod corpus;
pub mod fulltext_index;
pub mod glossary_store;
pub mod resolver_tables;
pub mod sqlite_vec_loader;
pub mod vector_index;

use std::future::Future;
use std::pin::Pin;

pub use chunk_store::{Chunk, ChunkStore};
pub use corpus::{NewChunk, SqliteCorpus, TextRecord};
pub use fulltext_index::FullTextIndex;
pub use glossary_store::{GlossaryIndex, SqliteGlossaryStore};
pub use resolver_tables::{AliasSource, SqliteResolverTables, SynonymSource};
pub use sqlite_vec_loader::init_sqlite_vec_extension;
pub use vector_index::{SqliteVectorIndex, VectorIndex};

/// Boxed future type for storage operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
