//! Calibre full-text search (`full-text-search.db`).
//!
//! When FTS indexing is enabled, Calibre keeps an FTS5 database next to
//! `metadata.db`, always named `full-text-search.db`. The FTS table name is
//! not fixed across Calibre versions, so it is discovered from
//! `sqlite_master` at open time.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;

use crate::error::{Error, Result};

/// Calibre's FTS database filename.
pub const FTS_DB_FILENAME: &str = "full-text-search.db";

/// One full-text match.
#[derive(Debug, Clone, Serialize)]
pub struct FtsHit {
    /// Book id in `metadata.db`.
    pub book_id: i64,
    /// The format whose text matched.
    pub format: String,
    /// Highlighted snippet around the match.
    pub snippet: String,
}

/// A handle on a library's full-text index.
#[derive(Debug, Clone)]
pub struct FtsIndex {
    conn: Arc<Mutex<Connection>>,
    table: String,
}

impl FtsIndex {
    /// Open the FTS database for a library, if one exists.
    ///
    /// Returns `Ok(None)` when the library has no `full-text-search.db`;
    /// [`Error::FtsUnavailable`] when the file exists but holds no FTS5
    /// table.
    pub fn open(library_path: &Path) -> Result<Option<Self>> {
        let db_path: PathBuf = library_path.join(FTS_DB_FILENAME);
        if !db_path.exists() {
            return Ok(None);
        }
        let conn = Connection::open(&db_path)?;
        let table = discover_fts_table(&conn)?.ok_or(Error::FtsUnavailable)?;
        Ok(Some(Self {
            conn: Arc::new(Mutex::new(conn)),
            table,
        }))
    }

    /// Run an FTS5 MATCH query, returning snippets.
    pub async fn search(&self, query: &str, limit: i64) -> Result<Vec<FtsHit>> {
        let conn = Arc::clone(&self.conn);
        let table = self.table.clone();
        let query = query.to_string();
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock().expect("fts connection poisoned");
            let sql = format!(
                "SELECT book, format, snippet({table}, -1, '\u{ab}', '\u{bb}', '\u{2026}', 16)
                   FROM {table} WHERE {table} MATCH ? LIMIT ?",
                table = table,
            );
            let mut stmt = guard.prepare(&sql)?;
            let hits = stmt
                .query_map(params![query, limit], |row| {
                    Ok(FtsHit {
                        book_id: row.get(0)?,
                        format: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                        snippet: row.get(2)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(hits)
        })
        .await
        .expect("fts task panicked")
    }
}

/// Find the FTS5 table in the database, if any.
fn discover_fts_table(conn: &Connection) -> Result<Option<String>> {
    let name = conn
        .query_row(
            "SELECT name FROM sqlite_master
              WHERE type = 'table' AND sql LIKE '%USING fts5%' ORDER BY name LIMIT 1",
            [],
            |row| row.get::<_, String>(0),
        )
        .optional()?;
    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discovers_fts5_table() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE VIRTUAL TABLE books_text USING fts5(book, format, searchable_text);",
        )
        .unwrap();
        assert_eq!(
            discover_fts_table(&conn).unwrap().as_deref(),
            Some("books_text")
        );
    }

    #[test]
    fn no_table_means_none() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE plain (x);").unwrap();
        assert!(discover_fts_table(&conn).unwrap().is_none());
    }
}
