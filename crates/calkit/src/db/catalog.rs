//! Catalog queries: authors, series, tags, publishers.
//!
//! The four entities share one schema shape (an entity table plus a
//! `books_*_link` table), so the SQL is built once from a small table spec
//! and wrapped in typed accessors.

use rusqlite::{OptionalExtension, params};

use crate::db::LibraryDb;
use crate::error::{Error, Result};
use crate::types::{Author, LetterCount, Publisher, Series, Tag};

/// Table/column names for one catalog entity.
#[derive(Debug, Clone, Copy)]
struct EntitySpec {
    table: &'static str,
    link_table: &'static str,
    link_column: &'static str,
    has_sort: bool,
}

const AUTHORS: EntitySpec = EntitySpec {
    table: "authors",
    link_table: "books_authors_link",
    link_column: "author",
    has_sort: true,
};
const SERIES: EntitySpec = EntitySpec {
    table: "series",
    link_table: "books_series_link",
    link_column: "series",
    has_sort: false,
};
const TAGS: EntitySpec = EntitySpec {
    table: "tags",
    link_table: "books_tags_link",
    link_column: "tag",
    has_sort: false,
};
const PUBLISHERS: EntitySpec = EntitySpec {
    table: "publishers",
    link_table: "books_publishers_link",
    link_column: "publisher",
    has_sort: false,
};

/// One catalog row before it is wrapped in a typed entity.
#[derive(Debug, Clone)]
struct EntityRow {
    id: i64,
    name: String,
    sort: Option<String>,
    book_count: i64,
}

/// Catalog queries on one library.
///
/// Obtained via [`LibraryDb::catalog()`].
#[derive(Debug, Clone)]
pub struct CatalogQueries {
    db: LibraryDb,
}

impl CatalogQueries {
    pub(crate) fn new(db: LibraryDb) -> Self {
        Self { db }
    }

    pub async fn authors(&self, limit: i64, offset: i64) -> Result<Vec<Author>> {
        let rows = self.list(AUTHORS, limit, offset).await?;
        Ok(rows.into_iter().map(author_from_row).collect())
    }

    pub async fn author(&self, id: i64) -> Result<Author> {
        self.get(AUTHORS, id, "author").await.map(author_from_row)
    }

    pub async fn authors_by_letter(&self) -> Result<Vec<LetterCount>> {
        self.by_letter(AUTHORS).await
    }

    pub async fn series(&self, limit: i64, offset: i64) -> Result<Vec<Series>> {
        let rows = self.list(SERIES, limit, offset).await?;
        Ok(rows.into_iter().map(series_from_row).collect())
    }

    pub async fn series_entry(&self, id: i64) -> Result<Series> {
        self.get(SERIES, id, "series").await.map(series_from_row)
    }

    pub async fn series_by_letter(&self) -> Result<Vec<LetterCount>> {
        self.by_letter(SERIES).await
    }

    pub async fn tags(&self, limit: i64, offset: i64) -> Result<Vec<Tag>> {
        let rows = self.list(TAGS, limit, offset).await?;
        Ok(rows.into_iter().map(tag_from_row).collect())
    }

    pub async fn tag(&self, id: i64) -> Result<Tag> {
        self.get(TAGS, id, "tag").await.map(tag_from_row)
    }

    /// Look up a tag by exact name, case-insensitive.
    pub async fn tag_by_name(&self, name: &str) -> Result<Option<Tag>> {
        let name = name.to_string();
        self.db
            .call(move |conn| {
                let row = conn
                    .query_row(
                        "SELECT t.id, t.name,
                                (SELECT COUNT(*) FROM books_tags_link l WHERE l.tag = t.id)
                           FROM tags t WHERE t.name = ? COLLATE NOCASE",
                        params![name],
                        |row| {
                            Ok(Tag {
                                id: row.get(0)?,
                                name: row.get(1)?,
                                book_count: row.get(2)?,
                            })
                        },
                    )
                    .optional()?;
                Ok(row)
            })
            .await
    }

    pub async fn tags_by_letter(&self) -> Result<Vec<LetterCount>> {
        self.by_letter(TAGS).await
    }

    pub async fn publishers(&self, limit: i64, offset: i64) -> Result<Vec<Publisher>> {
        let rows = self.list(PUBLISHERS, limit, offset).await?;
        Ok(rows.into_iter().map(publisher_from_row).collect())
    }

    pub async fn publisher(&self, id: i64) -> Result<Publisher> {
        self.get(PUBLISHERS, id, "publisher")
            .await
            .map(publisher_from_row)
    }

    pub async fn publishers_by_letter(&self) -> Result<Vec<LetterCount>> {
        self.by_letter(PUBLISHERS).await
    }

    /// Rename a tag. When the target name already exists the two tags are
    /// merged; returns true in that case.
    pub async fn rename_tag(&self, tag_id: i64, new_name: &str) -> Result<bool> {
        let new_name = new_name.trim().to_string();
        self.db
            .call(move |conn| {
                let tx = conn.transaction()?;

                let existing: Option<i64> = tx
                    .query_row(
                        "SELECT id FROM tags WHERE name = ? COLLATE NOCASE AND id != ?",
                        params![new_name, tag_id],
                        |row| row.get(0),
                    )
                    .optional()?;

                let merged = match existing {
                    Some(target_id) => {
                        // Repoint links; a book may carry both tags already,
                        // so duplicates are dropped rather than repointed.
                        tx.execute(
                            "UPDATE OR IGNORE books_tags_link SET tag = ? WHERE tag = ?",
                            params![target_id, tag_id],
                        )?;
                        tx.execute("DELETE FROM books_tags_link WHERE tag = ?", params![tag_id])?;
                        tx.execute("DELETE FROM tags WHERE id = ?", params![tag_id])?;
                        true
                    }
                    None => {
                        let changed = tx.execute(
                            "UPDATE tags SET name = ? WHERE id = ?",
                            params![new_name, tag_id],
                        )?;
                        if changed == 0 {
                            return Err(Error::EntityNotFound { kind: "tag", id: tag_id });
                        }
                        false
                    }
                };

                tx.commit()?;
                Ok(merged)
            })
            .await
    }

    /// Delete a tag and all its links.
    pub async fn delete_tag(&self, tag_id: i64) -> Result<()> {
        self.db
            .call(move |conn| {
                let tx = conn.transaction()?;
                tx.execute("DELETE FROM books_tags_link WHERE tag = ?", params![tag_id])?;
                tx.execute("DELETE FROM tags WHERE id = ?", params![tag_id])?;
                tx.commit()?;
                Ok(())
            })
            .await
    }

    async fn list(&self, spec: EntitySpec, limit: i64, offset: i64) -> Result<Vec<EntityRow>> {
        self.db
            .call(move |conn| {
                let sort_col = if spec.has_sort { "e.sort" } else { "NULL" };
                let sql = format!(
                    "SELECT e.id, e.name, {sort},
                            (SELECT COUNT(*) FROM {link} l WHERE l.{col} = e.id) AS book_count
                       FROM {table} e
                      ORDER BY e.name COLLATE NOCASE
                      LIMIT ? OFFSET ?",
                    sort = sort_col,
                    link = spec.link_table,
                    col = spec.link_column,
                    table = spec.table,
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(params![limit, offset], |row| {
                        Ok(EntityRow {
                            id: row.get(0)?,
                            name: row.get(1)?,
                            sort: row.get(2)?,
                            book_count: row.get(3)?,
                        })
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await
    }

    async fn get(&self, spec: EntitySpec, id: i64, what: &'static str) -> Result<EntityRow> {
        self.db
            .call(move |conn| {
                let sort_col = if spec.has_sort { "e.sort" } else { "NULL" };
                let sql = format!(
                    "SELECT e.id, e.name, {sort},
                            (SELECT COUNT(*) FROM {link} l WHERE l.{col} = e.id)
                       FROM {table} e WHERE e.id = ?",
                    sort = sort_col,
                    link = spec.link_table,
                    col = spec.link_column,
                    table = spec.table,
                );
                conn.query_row(&sql, params![id], |row| {
                    Ok(EntityRow {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        sort: row.get(2)?,
                        book_count: row.get(3)?,
                    })
                })
                .optional()?
                .ok_or(Error::EntityNotFound { kind: what, id })
            })
            .await
    }

    async fn by_letter(&self, spec: EntitySpec) -> Result<Vec<LetterCount>> {
        self.db
            .call(move |conn| {
                let sql = format!(
                    "SELECT CASE WHEN UPPER(SUBSTR(name, 1, 1)) BETWEEN 'A' AND 'Z'
                                 THEN UPPER(SUBSTR(name, 1, 1)) ELSE '#' END AS letter,
                            COUNT(*)
                       FROM {table}
                      GROUP BY letter ORDER BY letter",
                    table = spec.table,
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map([], |row| {
                        Ok(LetterCount {
                            letter: row.get(0)?,
                            count: row.get(1)?,
                        })
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await
    }
}

fn author_from_row(row: EntityRow) -> Author {
    Author {
        id: row.id,
        name: row.name,
        sort: row.sort,
        book_count: row.book_count,
    }
}

fn series_from_row(row: EntityRow) -> Series {
    Series {
        id: row.id,
        name: row.name,
        book_count: row.book_count,
    }
}

fn tag_from_row(row: EntityRow) -> Tag {
    Tag {
        id: row.id,
        name: row.name,
        book_count: row.book_count,
    }
}

fn publisher_from_row(row: EntityRow) -> Publisher {
    Publisher {
        id: row.id,
        name: row.name,
        book_count: row.book_count,
    }
}
