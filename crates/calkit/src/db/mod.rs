//! Direct SQLite access to a Calibre library's `metadata.db`.
//!
//! Reads go here instead of through `calibredb` because a process spawn per
//! query is an order of magnitude slower than a prepared statement, and the
//! schema is stable and documented. Writes are restricted to the `comments`
//! table and tag renames; everything else mutates through
//! [`crate::actions`].
//!
//! The connection is wrapped in `Arc<Mutex<_>>` and every query runs on the
//! blocking pool, so the async callers never hold a lock across an await.

mod books;
mod catalog;
mod comments;
mod fts;
mod stats;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::Connection;

use crate::error::{Error, Result};

pub use books::{BookQueries, TitleEntry};
pub use catalog::CatalogQueries;
pub use comments::CommentQueries;
pub use fts::{FtsHit, FtsIndex};
pub use stats::{HealthCounts, StatsQueries};

/// Calibre's database filename inside a library directory.
pub const METADATA_DB: &str = "metadata.db";

/// A handle on one library's `metadata.db`.
///
/// Cheap to clone; all clones share the same connection.
#[derive(Debug, Clone)]
pub struct LibraryDb {
    library_path: PathBuf,
    conn: Arc<Mutex<Connection>>,
}

impl LibraryDb {
    /// Open the `metadata.db` inside `library_path`.
    pub fn open(library_path: &Path) -> Result<Self> {
        let db_path = library_path.join(METADATA_DB);
        if !db_path.exists() {
            return Err(Error::LibraryNotFound(library_path.to_path_buf()));
        }
        let conn = Connection::open(&db_path)?;
        Ok(Self {
            library_path: library_path.to_path_buf(),
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// The library directory this database belongs to.
    pub fn library_path(&self) -> &Path {
        &self.library_path
    }

    /// Access book queries.
    pub fn books(&self) -> BookQueries {
        BookQueries::new(self.clone())
    }

    /// Access catalog queries (authors, series, tags, publishers).
    pub fn catalog(&self) -> CatalogQueries {
        CatalogQueries::new(self.clone())
    }

    /// Access the Calibre comments (description) field.
    pub fn comments(&self) -> CommentQueries {
        CommentQueries::new(self.clone())
    }

    /// Access library-wide statistics.
    pub fn stats(&self) -> StatsQueries {
        StatsQueries::new(self.clone())
    }

    /// Open this library's full-text-search index, if Calibre has built one.
    pub fn fts(&self) -> Result<Option<FtsIndex>> {
        FtsIndex::open(&self.library_path)
    }

    /// Run a closure against the connection on the blocking pool.
    pub(crate) async fn call<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().expect("metadata.db connection poisoned");
            f(&mut guard)
        })
        .await
        .expect("database task panicked")
    }
}

/// Parse Calibre's timestamp text (`2023-05-01 10:02:33+00:00`, sometimes
/// with a `T` separator or without an offset).
pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let normalized = raw.trim().replace(' ', "T");
    if let Ok(dt) = DateTime::parse_from_rfc3339(&normalized) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(&normalized, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_calibre_timestamp_variants() {
        assert!(parse_timestamp("2023-05-01 10:02:33+00:00").is_some());
        assert!(parse_timestamp("2023-05-01T10:02:33.123456+02:00").is_some());
        assert!(parse_timestamp("2023-05-01 10:02:33").is_some());
        assert!(parse_timestamp("0101-01-01 00:00:00+00:00").is_some());
        assert!(parse_timestamp("not a date").is_none());
    }
}
