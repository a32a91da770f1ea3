//! Glossary capability and its `SQLite` table.

use tokio_rusqlite::Connection;

use crate::retrieval::core::candidate::GlossaryEntry;
use crate::retrieval::core::config::StorageConfig;
use crate::retrieval::core::errors::RetrievalResult;
use crate::retrieval::storage::StoreFuture;

/// Relevance of an entry whose headword is the whole query.
const EXACT_RELEVANCE: f64 = 1.0;
/// Relevance of an entry whose headword starts with the query.
const PREFIX_RELEVANCE: f64 = 0.9;
/// Relevance of an entry matched through a candidate term.
const TERM_RELEVANCE: f64 = 0.8;

/// Headword lookup over dictionary entries.
pub trait GlossaryIndex: Send + Sync {
    /// Entries whose headword (or simplified headword) contains `query` or is one
    /// of `terms`, most relevant first.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    fn lookup(
        &self,
        query: &str,
        terms: Vec<String>,
        limit: usize,
    ) -> StoreFuture<'_, RetrievalResult<Vec<GlossaryEntry>>>;
}

/// `SQLite` dictionary table.
pub struct SqliteGlossaryStore {
    conn: Connection,
    table: String,
}

impl SqliteGlossaryStore {
    /// Open the database and create the dictionary table if needed.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or the schema cannot be created.
    pub async fn new(config: &StorageConfig) -> RetrievalResult<Self> {
        let conn = Connection::open(&config.sqlite_path).await?;
        Self::with_connection(conn, config).await
    }

    /// Use an existing connection and create the dictionary table if needed.
    ///
    /// # Errors
    /// Returns an error if the schema cannot be created.
    pub async fn with_connection(conn: Connection, config: &StorageConfig) -> RetrievalResult<Self> {
        let table = config.glossary_table.clone();
        let ddl_table = table.clone();
        conn.call(move |conn| {
            conn.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {ddl_table} (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    term TEXT NOT NULL,
                    term_simplified TEXT,
                    definition_text TEXT NOT NULL,
                    source TEXT NOT NULL DEFAULT ''
                );
                CREATE INDEX IF NOT EXISTS idx_{ddl_table}_term ON {ddl_table}(term);
                CREATE INDEX IF NOT EXISTS idx_{ddl_table}_simplified
                    ON {ddl_table}(term_simplified);"
            ))?;
            Ok(())
        })
        .await?;
        Ok(Self { conn, table })
    }

    /// Insert a dictionary entry.
    ///
    /// # Errors
    /// Returns an error if the insert fails.
    pub async fn insert_entry(
        &self,
        term: &str,
        term_simplified: Option<&str>,
        definition: &str,
        source: &str,
    ) -> RetrievalResult<()> {
        let table = self.table.clone();
        let values = (
            term.to_string(),
            term_simplified.map(str::to_string),
            definition.to_string(),
            source.to_string(),
        );
        self.conn
            .call(move |conn| {
                let (term, simplified, definition, source) = values;
                conn.execute(
                    &format!(
                        "INSERT INTO {table} (term, term_simplified, definition_text, source)
                         VALUES (?1, ?2, ?3, ?4)"
                    ),
                    rusqlite::params![term, simplified, definition, source],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }
}

impl GlossaryIndex for SqliteGlossaryStore {
    fn lookup(
        &self,
        query: &str,
        terms: Vec<String>,
        limit: usize,
    ) -> StoreFuture<'_, RetrievalResult<Vec<GlossaryEntry>>> {
        let query = query.to_string();
        Box::pin(async move {
            let table = self.table.clone();
            let placeholders = (0..terms.len())
                .map(|i| format!("?{}", i + 2))
                .collect::<Vec<_>>()
                .join(", ");
            let mut values = Vec::with_capacity(terms.len() + 1);
            values.push(query);
            values.extend(terms);

            let entries = self
                .conn
                .call(move |conn| {
                    let term_filter = if placeholders.is_empty() {
                        String::new()
                    } else {
                        format!(
                            "OR term IN ({placeholders}) OR term_simplified IN ({placeholders})"
                        )
                    };
                    let mut stmt = conn.prepare(&format!(
                        "SELECT term, definition_text, source,
                                CASE WHEN term = ?1 OR term_simplified = ?1
                                          THEN {EXACT_RELEVANCE}
                                     WHEN ?1 <> ''
                                          AND (instr(term, ?1) = 1 OR instr(term_simplified, ?1) = 1)
                                          THEN {PREFIX_RELEVANCE}
                                     ELSE {TERM_RELEVANCE} END AS relevance
                         FROM {table}
                         WHERE term = ?1 OR term_simplified = ?1
                            OR (?1 <> '' AND (instr(term, ?1) > 0 OR instr(term_simplified, ?1) > 0))
                            {term_filter}
                         ORDER BY relevance DESC, length(term) DESC, id
                         LIMIT {limit}"
                    ))?;
                    let rows = stmt
                        .query_map(rusqlite::params_from_iter(values.iter()), |row| {
                            let term: String = row.get(0)?;
                            let definition: String = row.get(1)?;
                            let source: String = row.get(2)?;
                            Ok(GlossaryEntry::new(
                                &term,
                                &definition,
                                &source,
                                Some(row.get(3)?),
                            ))
                        })?
                        .collect::<Result<Vec<_>, rusqlite::Error>>()?;
                    Ok(rows)
                })
                .await?;
            Ok(entries)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::text::keywords::glossary_terms;

    async fn store() -> SqliteGlossaryStore {
        let conn = Connection::open_in_memory()
            .await
            .expect("in-memory database");
        let store = SqliteGlossaryStore::with_connection(conn, &StorageConfig::default())
            .await
            .expect("glossary schema");
        for (term, simplified, definition) in [
            ("般若", None, "智慧"),
            ("涅槃", None, "寂灭"),
            ("阿賴耶識", Some("阿赖耶识"), "藏识"),
        ] {
            store
                .insert_entry(term, simplified, definition, "佛学大辞典")
                .await
                .expect("insert entry");
        }
        store
    }

    #[tokio::test]
    async fn test_exact_query_ranks_first() {
        let store = store().await;
        let entries = store
            .lookup("般若", vec!["般若".to_string()], 5)
            .await
            .unwrap_or_default();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].content, "【般若】智慧");
        assert_eq!(entries[0].score, Some(1.0));
    }

    #[tokio::test]
    async fn test_candidate_terms_match_simplified_headwords() {
        let store = store().await;
        let query = "涅槃与阿赖耶识";
        let entries = store
            .lookup(query, glossary_terms(query), 5)
            .await
            .unwrap_or_default();
        let terms: Vec<&str> = entries.iter().map(|entry| entry.term.as_str()).collect();
        assert_eq!(terms, vec!["阿賴耶識", "涅槃"]);
        assert!(entries.iter().all(|entry| entry.score == Some(0.8)));
    }

    #[tokio::test]
    async fn test_headwords_containing_query_are_ranked() {
        let store = store().await;
        store
            .insert_entry("般若波罗蜜", None, "到彼岸的智慧", "丁福保")
            .await
            .expect("insert entry");
        store
            .insert_entry("摩诃般若", None, "大智慧", "丁福保")
            .await
            .expect("insert entry");

        let entries = store.lookup("般若", Vec::new(), 5).await.unwrap_or_default();
        let ranked: Vec<(&str, Option<f64>)> = entries
            .iter()
            .map(|entry| (entry.term.as_str(), entry.score))
            .collect();
        assert_eq!(
            ranked,
            vec![
                ("般若", Some(1.0)),
                ("般若波罗蜜", Some(0.9)),
                ("摩诃般若", Some(0.8)),
            ]
        );
    }

    #[tokio::test]
    async fn test_limit_is_applied() {
        let store = store().await;
        let entries = store
            .lookup("x", vec!["般若".to_string(), "涅槃".to_string()], 1)
            .await
            .unwrap_or_default();
        assert_eq!(entries.len(), 1);
    }
}
