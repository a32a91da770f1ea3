//! Alias and synonym tables backing the resolvers.

use tokio_rusqlite::Connection;
use tracing::warn;

use crate::retrieval::core::config::StorageConfig;
use crate::retrieval::core::errors::RetrievalResult;
use crate::retrieval::resolve::alias::AliasMapping;
use crate::retrieval::resolve::synonym::{RelationType, SynonymMapping};
use crate::retrieval::storage::StoreFuture;

/// Full-scan access to alias rows.
pub trait AliasSource: Send + Sync {
    /// Load every alias row.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn load_aliases(&self) -> StoreFuture<'_, RetrievalResult<Vec<AliasMapping>>>;
}

/// Full-scan access to synonym rows.
pub trait SynonymSource: Send + Sync {
    /// Load every synonym row.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn load_synonyms(&self) -> StoreFuture<'_, RetrievalResult<Vec<SynonymMapping>>>;
}

/// `SQLite` alias and synonym tables.
pub struct SqliteResolverTables {
    conn: Connection,
    aliases_table: String,
    synonyms_table: String,
}

impl SqliteResolverTables {
    /// Open the database and create both tables if needed.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or the schema cannot be created.
    pub async fn new(config: &StorageConfig) -> RetrievalResult<Self> {
        let conn = Connection::open(&config.sqlite_path).await?;
        Self::with_connection(conn, config).await
    }

    /// Use an existing connection and create both tables if needed.
    ///
    /// # Errors
    /// Returns an error if the schema cannot be created.
    pub async fn with_connection(conn: Connection, config: &StorageConfig) -> RetrievalResult<Self> {
        let aliases_table = config.aliases_table.clone();
        let synonyms_table = config.synonyms_table.clone();
        let (aliases, synonyms) = (aliases_table.clone(), synonyms_table.clone());

        conn.call(move |conn| {
            conn.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {aliases} (
                    alias TEXT NOT NULL,
                    canonical_title TEXT NOT NULL,
                    text_id TEXT NOT NULL,
                    priority INTEGER NOT NULL DEFAULT 0
                );
                CREATE TABLE IF NOT EXISTS {synonyms} (
                    canonical_term TEXT NOT NULL,
                    synonym TEXT NOT NULL,
                    relation_type TEXT NOT NULL DEFAULT 'exact',
                    priority INTEGER NOT NULL DEFAULT 0
                );"
            ))?;
            Ok(())
        })
        .await?;

        Ok(Self {
            conn,
            aliases_table,
            synonyms_table,
        })
    }

    /// Insert an alias row.
    ///
    /// # Errors
    /// Returns an error if the insert fails.
    pub async fn insert_alias(&self, mapping: AliasMapping) -> RetrievalResult<()> {
        let table = self.aliases_table.clone();
        self.conn
            .call(move |conn| {
                conn.execute(
                    &format!(
                        "INSERT INTO {table} (alias, canonical_title, text_id, priority)
                         VALUES (?1, ?2, ?3, ?4)"
                    ),
                    rusqlite::params![
                        mapping.alias,
                        mapping.canonical_title,
                        mapping.document_id,
                        mapping.priority
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Insert a synonym row.
    ///
    /// # Errors
    /// Returns an error if the insert fails.
    pub async fn insert_synonym(&self, mapping: SynonymMapping) -> RetrievalResult<()> {
        let table = self.synonyms_table.clone();
        self.conn
            .call(move |conn| {
                conn.execute(
                    &format!(
                        "INSERT INTO {table} (canonical_term, synonym, relation_type, priority)
                         VALUES (?1, ?2, ?3, ?4)"
                    ),
                    rusqlite::params![
                        mapping.canonical_term,
                        mapping.synonym,
                        mapping.relation_type.as_str(),
                        mapping.priority
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }
}

impl AliasSource for SqliteResolverTables {
    fn load_aliases(&self) -> StoreFuture<'_, RetrievalResult<Vec<AliasMapping>>> {
        Box::pin(async move {
            let table = self.aliases_table.clone();
            let rows = self
                .conn
                .call(move |conn| {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT alias, canonical_title, text_id, priority
                         FROM {table} ORDER BY priority DESC"
                    ))?;
                    let rows = stmt
                        .query_map([], |row| {
                            Ok(AliasMapping {
                                alias: row.get(0)?,
                                canonical_title: row.get(1)?,
                                document_id: row.get(2)?,
                                priority: row.get(3)?,
                            })
                        })?
                        .collect::<Result<Vec<_>, rusqlite::Error>>()?;
                    Ok(rows)
                })
                .await?;
            Ok(rows)
        })
    }
}

impl SynonymSource for SqliteResolverTables {
    fn load_synonyms(&self) -> StoreFuture<'_, RetrievalResult<Vec<SynonymMapping>>> {
        Box::pin(async move {
            let table = self.synonyms_table.clone();
            let raw = self
                .conn
                .call(move |conn| {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT canonical_term, synonym, relation_type, priority
                         FROM {table} ORDER BY priority DESC, canonical_term"
                    ))?;
                    let rows = stmt
                        .query_map([], |row| {
                            Ok((
                                row.get::<_, String>(0)?,
                                row.get::<_, String>(1)?,
                                row.get::<_, String>(2)?,
                                row.get::<_, i32>(3)?,
                            ))
                        })?
                        .collect::<Result<Vec<_>, rusqlite::Error>>()?;
                    Ok(rows)
                })
                .await?;

            let rows = raw
                .into_iter()
                .map(|(canonical_term, synonym, relation, priority)| {
                    let relation_type = relation.parse().unwrap_or_else(|err| {
                        warn!(%synonym, "{err}; treating as related");
                        RelationType::Related
                    });
                    SynonymMapping {
                        canonical_term,
                        synonym,
                        relation_type,
                        priority,
                    }
                })
                .collect();
            Ok(rows)
        })
    }
}
