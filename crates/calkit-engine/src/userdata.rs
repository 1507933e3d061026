//! Project-owned user data: comments and extended metadata.
//!
//! Calibre's schema has no place for per-user annotations or for
//! provenance fields like the translator or a work's true first
//! publication date (its `pubdate` is the edition date). These live in a
//! separate SQLite database under the platform data directory, keyed by
//! `(book_id, library_path)` so one store serves every library.
//!
//! # Example
//!
//! ```no_run
//! use calkit_engine::Engine;
//!
//! # async fn example() -> calkit_engine::Result<()> {
//! let engine = Engine::new("/books");
//!
//! engine.userdata().comment_upsert(7, "Loved the ending.", None).await?;
//! let meta = engine.userdata().extended_upsert(7, None, Some("1599")).await?;
//! println!("first published {:?}", meta.first_published);
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};

use calkit::CalibreClient;
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;

use crate::{Error, Result};

/// Schema for the user data store. `user_id` is `''` for the anonymous
/// user so the uniqueness constraint holds (NULLs never collide in SQLite).
const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS user_comments (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    book_id       INTEGER NOT NULL,
    library_path  TEXT NOT NULL,
    comment_text  TEXT NOT NULL DEFAULT '',
    user_id       TEXT NOT NULL DEFAULT '',
    created_at    TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at    TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    UNIQUE(book_id, library_path, user_id)
);
CREATE INDEX IF NOT EXISTS idx_user_comments_book
    ON user_comments(book_id, library_path);

CREATE TABLE IF NOT EXISTS book_extended_metadata (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    book_id         INTEGER NOT NULL,
    library_path    TEXT NOT NULL,
    translator      TEXT,
    first_published TEXT,
    created_at      TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at      TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    UNIQUE(book_id, library_path)
);
";

/// A stored user comment.
#[derive(Debug, Clone, Serialize)]
pub struct UserComment {
    pub id: i64,
    pub book_id: i64,
    pub library_path: String,
    pub comment_text: String,
    /// None for the anonymous user.
    pub user_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Extended metadata for one book.
#[derive(Debug, Clone, Serialize)]
pub struct ExtendedMetadata {
    pub id: i64,
    pub book_id: i64,
    pub library_path: String,
    pub translator: Option<String>,
    /// Free text: "1599", "44 BC". Calibre's pubdate is the edition date;
    /// this is the work's first publication.
    pub first_published: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// User data workflow engine.
#[derive(Debug)]
pub struct UserDataEngine<'a> {
    client: &'a CalibreClient,
    store_path: Option<PathBuf>,
}

impl<'a> UserDataEngine<'a> {
    pub(crate) fn new(client: &'a CalibreClient, store_path: Option<&Path>) -> Self {
        Self {
            client,
            store_path: store_path.map(Path::to_path_buf),
        }
    }

    /// Where the store lives: the override, or the platform data dir.
    pub fn store_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.store_path {
            return Ok(path.clone());
        }
        let base = dirs::data_local_dir()
            .or_else(dirs::data_dir)
            .or_else(|| dirs::home_dir().map(|h| h.join(".local").join("share")))
            .ok_or_else(|| Error::Validation("cannot determine a data directory".to_string()))?;
        Ok(base.join("calkit").join("calkit.db"))
    }

    /// Create or replace a user's comment on a book.
    pub async fn comment_upsert(
        &self,
        book_id: i64,
        text: &str,
        user_id: Option<&str>,
    ) -> Result<UserComment> {
        let library = self.library_key();
        let text = text.to_string();
        let user = user_id.unwrap_or("").to_string();
        self.with_store(move |conn| {
            conn.execute(
                "INSERT INTO user_comments (book_id, library_path, comment_text, user_id)
                 VALUES (?, ?, ?, ?)
                 ON CONFLICT(book_id, library_path, user_id)
                 DO UPDATE SET comment_text = excluded.comment_text,
                               updated_at = CURRENT_TIMESTAMP",
                params![book_id, library, text, user],
            )?;
            fetch_comment(conn, book_id, &library, &user)?
                .ok_or_else(|| Error::Validation("comment upsert did not persist".to_string()))
        })
        .await
    }

    /// Read a user's comment on a book.
    pub async fn comment_get(
        &self,
        book_id: i64,
        user_id: Option<&str>,
    ) -> Result<Option<UserComment>> {
        let library = self.library_key();
        let user = user_id.unwrap_or("").to_string();
        self.with_store(move |conn| fetch_comment(conn, book_id, &library, &user))
            .await
    }

    /// Append a paragraph to a user's comment (creates it when absent).
    pub async fn comment_append(
        &self,
        book_id: i64,
        text: &str,
        user_id: Option<&str>,
    ) -> Result<UserComment> {
        let existing = self.comment_get(book_id, user_id).await?;
        let combined = match existing {
            Some(c) if !c.comment_text.trim().is_empty() => {
                format!("{}\n\n{}", c.comment_text, text)
            }
            _ => text.to_string(),
        };
        self.comment_upsert(book_id, &combined, user_id).await
    }

    /// Delete a user's comment. Returns whether a row was removed.
    pub async fn comment_delete(&self, book_id: i64, user_id: Option<&str>) -> Result<bool> {
        let library = self.library_key();
        let user = user_id.unwrap_or("").to_string();
        self.with_store(move |conn| {
            let n = conn.execute(
                "DELETE FROM user_comments
                  WHERE book_id = ? AND library_path = ? AND user_id = ?",
                params![book_id, library, user],
            )?;
            Ok(n > 0)
        })
        .await
    }

    /// All comments on a book across users.
    pub async fn comments_for_book(&self, book_id: i64) -> Result<Vec<UserComment>> {
        let library = self.library_key();
        self.with_store(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, book_id, library_path, comment_text, user_id, created_at, updated_at
                   FROM user_comments
                  WHERE book_id = ? AND library_path = ?
                  ORDER BY user_id",
            )?;
            let rows = stmt
                .query_map(params![book_id, library], comment_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
        .await
    }

    /// Read extended metadata for a book.
    pub async fn extended_get(&self, book_id: i64) -> Result<Option<ExtendedMetadata>> {
        let library = self.library_key();
        self.with_store(move |conn| fetch_extended(conn, book_id, &library))
            .await
    }

    /// Create or partially update extended metadata. `None` fields keep
    /// their stored value; empty strings clear it.
    pub async fn extended_upsert(
        &self,
        book_id: i64,
        translator: Option<&str>,
        first_published: Option<&str>,
    ) -> Result<ExtendedMetadata> {
        if translator.is_none() && first_published.is_none() {
            return Err(Error::Validation(
                "nothing to update: set translator and/or first_published".to_string(),
            ));
        }
        let library = self.library_key();
        let translator = translator.map(str::to_string);
        let first_published = first_published.map(str::to_string);
        self.with_store(move |conn| {
            conn.execute(
                "INSERT INTO book_extended_metadata
                     (book_id, library_path, translator, first_published)
                 VALUES (?, ?, ?, ?)
                 ON CONFLICT(book_id, library_path)
                 DO UPDATE SET
                     translator = COALESCE(excluded.translator, translator),
                     first_published = COALESCE(excluded.first_published, first_published),
                     updated_at = CURRENT_TIMESTAMP",
                params![book_id, library, translator, first_published],
            )?;
            fetch_extended(conn, book_id, &library)?
                .ok_or_else(|| Error::Validation("metadata upsert did not persist".to_string()))
        })
        .await
    }

    /// Set only the translator.
    pub async fn extended_set_translator(
        &self,
        book_id: i64,
        translator: &str,
    ) -> Result<ExtendedMetadata> {
        self.extended_upsert(book_id, Some(translator), None).await
    }

    /// Set only the first-published field.
    pub async fn extended_set_first_published(
        &self,
        book_id: i64,
        first_published: &str,
    ) -> Result<ExtendedMetadata> {
        self.extended_upsert(book_id, None, Some(first_published))
            .await
    }

    /// Delete extended metadata. Returns whether a row was removed.
    pub async fn extended_delete(&self, book_id: i64) -> Result<bool> {
        let library = self.library_key();
        self.with_store(move |conn| {
            let n = conn.execute(
                "DELETE FROM book_extended_metadata
                  WHERE book_id = ? AND library_path = ?",
                params![book_id, library],
            )?;
            Ok(n > 0)
        })
        .await
    }

    fn library_key(&self) -> String {
        self.client.library_path().to_string_lossy().into_owned()
    }

    /// Open the store and run a closure on the blocking pool. The store is
    /// one small file; opening per operation keeps the engine free of
    /// connection state for a second database.
    async fn with_store<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let path = self.store_path()?;
        tokio::task::spawn_blocking(move || {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let conn = Connection::open(&path)?;
            conn.execute_batch(SCHEMA)?;
            f(&conn)
        })
        .await
        .expect("user data task panicked")
    }
}

fn comment_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserComment> {
    let user: String = row.get(4)?;
    Ok(UserComment {
        id: row.get(0)?,
        book_id: row.get(1)?,
        library_path: row.get(2)?,
        comment_text: row.get(3)?,
        user_id: if user.is_empty() { None } else { Some(user) },
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn fetch_comment(
    conn: &Connection,
    book_id: i64,
    library: &str,
    user: &str,
) -> Result<Option<UserComment>> {
    let row = conn
        .query_row(
            "SELECT id, book_id, library_path, comment_text, user_id, created_at, updated_at
               FROM user_comments
              WHERE book_id = ? AND library_path = ? AND user_id = ?",
            params![book_id, library, user],
            comment_from_row,
        )
        .optional()?;
    Ok(row)
}

fn fetch_extended(
    conn: &Connection,
    book_id: i64,
    library: &str,
) -> Result<Option<ExtendedMetadata>> {
    let row = conn
        .query_row(
            "SELECT id, book_id, library_path, translator, first_published,
                    created_at, updated_at
               FROM book_extended_metadata
              WHERE book_id = ? AND library_path = ?",
            params![book_id, library],
            |row| {
                Ok(ExtendedMetadata {
                    id: row.get(0)?,
                    book_id: row.get(1)?,
                    library_path: row.get(2)?,
                    translator: row.get(3)?,
                    first_published: row.get(4)?,
                    created_at: row.get(5)?,
                    updated_at: row.get(6)?,
                })
            },
        )
        .optional()?;
    Ok(row)
}
