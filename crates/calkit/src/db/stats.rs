//! Library-wide aggregate statistics.

use rusqlite::params;
use serde::Serialize;

use crate::db::LibraryDb;
use crate::error::Result;
use crate::types::LibraryStats;

/// Per-problem book counts used for library health checks.
#[derive(Debug, Clone, Default, Serialize)]
pub struct HealthCounts {
    pub total_books: i64,
    pub without_authors: i64,
    pub without_tags: i64,
    pub without_formats: i64,
    pub without_cover: i64,
    pub with_empty_comments: i64,
    pub unrated: i64,
}

/// Statistics queries on one library.
///
/// Obtained via [`LibraryDb::stats()`].
#[derive(Debug, Clone)]
pub struct StatsQueries {
    db: LibraryDb,
}

impl StatsQueries {
    pub(crate) fn new(db: LibraryDb) -> Self {
        Self { db }
    }

    /// Aggregate counts across the whole library.
    pub async fn library_stats(&self, recent_limit: i64) -> Result<LibraryStats> {
        self.db
            .call(move |conn| {
                let count = |sql: &str| -> rusqlite::Result<i64> {
                    conn.query_row(sql, [], |row| row.get(0))
                };

                let total_books = count("SELECT COUNT(*) FROM books")?;
                let total_authors = count("SELECT COUNT(*) FROM authors")?;
                let total_series = count("SELECT COUNT(*) FROM series")?;
                let total_tags = count("SELECT COUNT(*) FROM tags")?;
                let total_publishers = count("SELECT COUNT(*) FROM publishers")?;

                let mut stmt = conn.prepare(
                    "SELECT format, COUNT(*) FROM data GROUP BY format ORDER BY COUNT(*) DESC",
                )?;
                let format_counts = stmt
                    .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get(1)?)))?
                    .collect::<rusqlite::Result<Vec<_>>>()?;

                let mut stmt = conn.prepare(
                    "SELECT r.rating, COUNT(*) FROM books_ratings_link l
                       JOIN ratings r ON r.id = l.rating
                      GROUP BY r.rating ORDER BY r.rating DESC",
                )?;
                let rating_counts = stmt
                    .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                    .collect::<rusqlite::Result<Vec<_>>>()?;

                let mut stmt = conn.prepare(
                    "SELECT id, title FROM books ORDER BY timestamp DESC LIMIT ?",
                )?;
                let recent = stmt
                    .query_map(params![recent_limit], |row| {
                        Ok((row.get(0)?, row.get::<_, String>(1)?))
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;

                Ok(LibraryStats {
                    total_books,
                    total_authors,
                    total_series,
                    total_tags,
                    total_publishers,
                    format_counts,
                    rating_counts,
                    recent,
                })
            })
            .await
    }

    /// Count books with common metadata problems.
    pub async fn health_counts(&self) -> Result<HealthCounts> {
        self.db
            .call(|conn| {
                let count = |sql: &str| -> rusqlite::Result<i64> {
                    conn.query_row(sql, [], |row| row.get(0))
                };
                let missing_link = |link: &str| {
                    format!(
                        "SELECT COUNT(*) FROM books b \
                         WHERE NOT EXISTS (SELECT 1 FROM {} l WHERE l.book = b.id)",
                        link
                    )
                };

                Ok(HealthCounts {
                    total_books: count("SELECT COUNT(*) FROM books")?,
                    without_authors: count(&missing_link("books_authors_link"))?,
                    without_tags: count(&missing_link("books_tags_link"))?,
                    without_formats: count(
                        "SELECT COUNT(*) FROM books b \
                         WHERE NOT EXISTS (SELECT 1 FROM data d WHERE d.book = b.id)",
                    )?,
                    without_cover: count(
                        "SELECT COUNT(*) FROM books WHERE has_cover IS NULL OR has_cover = 0",
                    )?,
                    with_empty_comments: count(
                        "SELECT COUNT(*) FROM books b \
                         WHERE NOT EXISTS (SELECT 1 FROM comments c \
                                           WHERE c.book = b.id AND TRIM(c.text) != '')",
                    )?,
                    unrated: count(&missing_link("books_ratings_link"))?,
                })
            })
            .await
    }
}
