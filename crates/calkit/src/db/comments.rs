//! Read/write access to Calibre's comments (description) field.
//!
//! This is the one `metadata.db` table written directly: `comments` rows are
//! plain data with a UNIQUE(book) constraint and no side bookkeeping, so a
//! round trip through `calibredb set_metadata` buys nothing.

use rusqlite::{OptionalExtension, params};

use crate::db::LibraryDb;
use crate::error::Result;

/// Comment queries on one library.
///
/// Obtained via [`LibraryDb::comments()`].
#[derive(Debug, Clone)]
pub struct CommentQueries {
    db: LibraryDb,
}

impl CommentQueries {
    pub(crate) fn new(db: LibraryDb) -> Self {
        Self { db }
    }

    /// The comment text for a book, if any.
    pub async fn get(&self, book_id: i64) -> Result<Option<String>> {
        self.db
            .call(move |conn| {
                let text = conn
                    .query_row(
                        "SELECT text FROM comments WHERE book = ?",
                        params![book_id],
                        |row| row.get(0),
                    )
                    .optional()?;
                Ok(text)
            })
            .await
    }

    /// Create or replace the comment for a book.
    pub async fn set(&self, book_id: i64, text: &str) -> Result<()> {
        let text = text.to_string();
        self.db
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO comments (book, text) VALUES (?, ?)
                     ON CONFLICT(book) DO UPDATE SET text = excluded.text",
                    params![book_id, text],
                )?;
                Ok(())
            })
            .await
    }

    /// Append a paragraph to the existing comment (creates it when absent).
    pub async fn append(&self, book_id: i64, text: &str) -> Result<String> {
        let text = text.to_string();
        self.db
            .call(move |conn| {
                let tx = conn.transaction()?;
                let existing: Option<String> = tx
                    .query_row(
                        "SELECT text FROM comments WHERE book = ?",
                        params![book_id],
                        |row| row.get(0),
                    )
                    .optional()?;
                let combined = match existing {
                    Some(old) if !old.trim().is_empty() => format!("{}\n\n{}", old, text),
                    _ => text,
                };
                tx.execute(
                    "INSERT INTO comments (book, text) VALUES (?, ?)
                     ON CONFLICT(book) DO UPDATE SET text = excluded.text",
                    params![book_id, combined],
                )?;
                tx.commit()?;
                Ok(combined)
            })
            .await
    }

    /// Delete the comment for a book. Returns whether a row was removed.
    pub async fn delete(&self, book_id: i64) -> Result<bool> {
        self.db
            .call(move |conn| {
                let n = conn.execute("DELETE FROM comments WHERE book = ?", params![book_id])?;
                Ok(n > 0)
            })
            .await
    }
}
