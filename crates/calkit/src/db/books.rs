//! Book queries against `metadata.db`.

use std::path::PathBuf;

use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};

use crate::db::{LibraryDb, parse_timestamp};
use crate::error::{Error, Result};
use crate::query::SearchQuery;
use crate::types::{Book, BookDetails, BookFile, SearchPage};

/// Column list shared by every query that hydrates a full [`Book`].
///
/// List-valued fields are aggregated with correlated subqueries so each book
/// comes back as exactly one row.
const BOOK_SELECT: &str = "\
SELECT b.id, b.title, b.author_sort, b.series_index, b.isbn, b.path, b.uuid, b.has_cover,
       b.timestamp, b.pubdate, b.last_modified,
       (SELECT GROUP_CONCAT(a.name, ' & ') FROM books_authors_link l
          JOIN authors a ON a.id = l.author WHERE l.book = b.id) AS authors,
       (SELECT s.name FROM books_series_link l
          JOIN series s ON s.id = l.series WHERE l.book = b.id) AS series,
       (SELECT p.name FROM books_publishers_link l
          JOIN publishers p ON p.id = l.publisher WHERE l.book = b.id) AS publisher,
       (SELECT r.rating FROM books_ratings_link l
          JOIN ratings r ON r.id = l.rating WHERE l.book = b.id) AS rating,
       (SELECT GROUP_CONCAT(t.name, ',') FROM books_tags_link l
          JOIN tags t ON t.id = l.tag WHERE l.book = b.id) AS tags,
       (SELECT GROUP_CONCAT(lc.lang_code, ',') FROM books_languages_link l
          JOIN languages lc ON lc.id = l.lang_code WHERE l.book = b.id) AS languages,
       (SELECT GROUP_CONCAT(d.format, ',') FROM data d WHERE d.book = b.id) AS formats
FROM books b";

/// A lean per-book row used by analysis passes that only need identity
/// fields (duplicate detection and the like).
#[derive(Debug, Clone)]
pub struct TitleEntry {
    pub id: i64,
    pub title: String,
    /// Ampersand-joined author names, empty when authorless.
    pub authors: String,
    pub isbn: Option<String>,
}

/// Book queries on one library.
///
/// Obtained via [`LibraryDb::books()`].
#[derive(Debug, Clone)]
pub struct BookQueries {
    db: LibraryDb,
}

impl BookQueries {
    pub(crate) fn new(db: LibraryDb) -> Self {
        Self { db }
    }

    /// Run a filtered search with pagination.
    pub async fn search(&self, query: &SearchQuery) -> Result<SearchPage> {
        let query = query.clone();
        self.db
            .call(move |conn| {
                let (where_sql, values) = build_where(&query);

                let count_sql = format!("SELECT COUNT(*) FROM books b{}", where_sql);
                let total: i64 = conn.query_row(
                    &count_sql,
                    params_from_iter(values.iter()),
                    |row| row.get(0),
                )?;

                let mut page_values = values;
                page_values.push(Value::Integer(query.limit));
                page_values.push(Value::Integer(query.offset));
                let sql = format!(
                    "{}{} ORDER BY b.sort LIMIT ? OFFSET ?",
                    BOOK_SELECT, where_sql
                );
                let books = query_books(conn, &sql, &page_values)?;

                Ok(SearchPage {
                    books,
                    total,
                    limit: query.limit,
                    offset: query.offset,
                })
            })
            .await
    }

    /// Fetch one book by id.
    pub async fn get(&self, book_id: i64) -> Result<Book> {
        self.db
            .call(move |conn| {
                let sql = format!("{} WHERE b.id = ?", BOOK_SELECT);
                let books = query_books(conn, &sql, &[Value::Integer(book_id)])?;
                books.into_iter().next().ok_or(Error::BookNotFound(book_id))
            })
            .await
    }

    /// Fetch one book with comments, identifiers and per-format files.
    pub async fn details(&self, book_id: i64) -> Result<BookDetails> {
        self.db
            .call(move |conn| {
                let sql = format!("{} WHERE b.id = ?", BOOK_SELECT);
                let book = query_books(conn, &sql, &[Value::Integer(book_id)])?
                    .into_iter()
                    .next()
                    .ok_or(Error::BookNotFound(book_id))?;

                let comments: Option<String> = conn
                    .query_row(
                        "SELECT text FROM comments WHERE book = ?",
                        params![book_id],
                        |row| row.get(0),
                    )
                    .optional()?;

                let mut stmt =
                    conn.prepare("SELECT type, val FROM identifiers WHERE book = ? ORDER BY type")?;
                let identifiers = stmt
                    .query_map(params![book_id], |row| {
                        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;

                let mut stmt = conn.prepare(
                    "SELECT format, name, uncompressed_size FROM data WHERE book = ? ORDER BY format",
                )?;
                let files = stmt
                    .query_map(params![book_id], |row| {
                        Ok(BookFile {
                            format: row.get(0)?,
                            name: row.get(1)?,
                            size: row.get(2)?,
                        })
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;

                Ok(BookDetails {
                    book,
                    comments,
                    identifiers,
                    files,
                })
            })
            .await
    }

    /// Books linked to an author id.
    pub async fn by_author(&self, author_id: i64, limit: i64, offset: i64) -> Result<SearchPage> {
        self.by_link("books_authors_link", "author", author_id, limit, offset)
            .await
    }

    /// Books linked to a series id, ordered by series position.
    pub async fn by_series(&self, series_id: i64, limit: i64, offset: i64) -> Result<SearchPage> {
        self.db
            .call(move |conn| {
                let where_sql = " WHERE EXISTS (SELECT 1 FROM books_series_link l \
                                 WHERE l.book = b.id AND l.series = ?)";
                let total: i64 = conn.query_row(
                    &format!("SELECT COUNT(*) FROM books b{}", where_sql),
                    params![series_id],
                    |row| row.get(0),
                )?;
                let sql = format!(
                    "{}{} ORDER BY b.series_index LIMIT ? OFFSET ?",
                    BOOK_SELECT, where_sql
                );
                let books = query_books(
                    conn,
                    &sql,
                    &[
                        Value::Integer(series_id),
                        Value::Integer(limit),
                        Value::Integer(offset),
                    ],
                )?;
                Ok(SearchPage {
                    books,
                    total,
                    limit,
                    offset,
                })
            })
            .await
    }

    /// Total number of books in the library.
    pub async fn count(&self) -> Result<i64> {
        self.db
            .call(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM books", [], |row| row.get(0))?))
            .await
    }

    /// A uniformly random book, or `None` for an empty library.
    pub async fn random(&self) -> Result<Option<Book>> {
        self.db
            .call(|conn| {
                let sql = format!("{} ORDER BY RANDOM() LIMIT 1", BOOK_SELECT);
                Ok(query_books(conn, &sql, &[])?.into_iter().next())
            })
            .await
    }

    /// Resolve the on-disk file for one format of a book.
    pub async fn format_path(&self, book_id: i64, format: &str) -> Result<PathBuf> {
        let format = format.to_uppercase();
        let library_path = self.db.library_path().to_path_buf();
        self.db
            .call(move |conn| {
                let book_dir: String = conn
                    .query_row(
                        "SELECT path FROM books WHERE id = ?",
                        params![book_id],
                        |row| row.get(0),
                    )
                    .optional()?
                    .ok_or(Error::BookNotFound(book_id))?;

                let name: String = conn
                    .query_row(
                        "SELECT name FROM data WHERE book = ? AND UPPER(format) = ?",
                        params![book_id, format],
                        |row| row.get(0),
                    )
                    .optional()?
                    .ok_or_else(|| Error::FormatNotFound {
                        book_id,
                        format: format.clone(),
                    })?;

                Ok(library_path
                    .join(book_dir)
                    .join(format!("{}.{}", name, format.to_lowercase())))
            })
            .await
    }

    /// Identity fields for every book, for analysis passes.
    pub async fn title_index(&self) -> Result<Vec<TitleEntry>> {
        self.db
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT b.id, b.title,
                            COALESCE((SELECT GROUP_CONCAT(a.name, ' & ')
                                        FROM books_authors_link l
                                        JOIN authors a ON a.id = l.author
                                       WHERE l.book = b.id), ''),
                            NULLIF(TRIM(b.isbn), '')
                       FROM books b ORDER BY b.id",
                )?;
                let rows = stmt
                    .query_map([], |row| {
                        Ok(TitleEntry {
                            id: row.get(0)?,
                            title: row.get(1)?,
                            authors: row.get(2)?,
                            isbn: row.get(3)?,
                        })
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await
    }

    async fn by_link(
        &self,
        link_table: &'static str,
        link_col: &'static str,
        id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<SearchPage> {
        self.db
            .call(move |conn| {
                let where_sql = format!(
                    " WHERE EXISTS (SELECT 1 FROM {} l WHERE l.book = b.id AND l.{} = ?)",
                    link_table, link_col
                );
                let total: i64 = conn.query_row(
                    &format!("SELECT COUNT(*) FROM books b{}", where_sql),
                    params![id],
                    |row| row.get(0),
                )?;
                let sql = format!("{}{} ORDER BY b.sort LIMIT ? OFFSET ?", BOOK_SELECT, where_sql);
                let books = query_books(
                    conn,
                    &sql,
                    &[Value::Integer(id), Value::Integer(limit), Value::Integer(offset)],
                )?;
                Ok(SearchPage {
                    books,
                    total,
                    limit,
                    offset,
                })
            })
            .await
    }
}

fn query_books(conn: &Connection, sql: &str, values: &[Value]) -> Result<Vec<Book>> {
    let mut stmt = conn.prepare(sql)?;
    let books = stmt
        .query_map(params_from_iter(values.iter()), book_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(books)
}

fn book_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Book> {
    let split = |s: Option<String>, sep: &str| -> Vec<String> {
        s.map(|s| {
            s.split(sep)
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
    };
    let ts = |s: Option<String>| s.as_deref().and_then(parse_timestamp);

    Ok(Book {
        id: row.get(0)?,
        title: row.get(1)?,
        author_sort: row.get(2)?,
        series_index: row.get(3)?,
        isbn: row
            .get::<_, Option<String>>(4)?
            .filter(|s| !s.trim().is_empty()),
        path: row.get(5)?,
        uuid: row.get(6)?,
        has_cover: row.get::<_, Option<i64>>(7)?.unwrap_or(0) != 0,
        added: ts(row.get(8)?),
        pubdate: ts(row.get(9)?),
        last_modified: ts(row.get(10)?),
        authors: split(row.get(11)?, " & "),
        series: row.get(12)?,
        publisher: row.get(13)?,
        rating: row.get(14)?,
        tags: split(row.get(15)?, ","),
        languages: split(row.get(16)?, ","),
        formats: split(row.get(17)?, ","),
    })
}

/// Compile a [`SearchQuery`] into a WHERE clause and its bind values.
fn build_where(query: &SearchQuery) -> (String, Vec<Value>) {
    let mut clauses: Vec<String> = Vec::new();
    let mut values: Vec<Value> = Vec::new();
    let like = |s: &str| Value::Text(format!("%{}%", s));

    let author_exists = "EXISTS (SELECT 1 FROM books_authors_link l \
                         JOIN authors a ON a.id = l.author \
                         WHERE l.book = b.id AND a.name LIKE ?)";
    let series_exists = "EXISTS (SELECT 1 FROM books_series_link l \
                         JOIN series s ON s.id = l.series \
                         WHERE l.book = b.id AND s.name LIKE ?)";
    let tag_exists = "EXISTS (SELECT 1 FROM books_tags_link l \
                      JOIN tags t ON t.id = l.tag \
                      WHERE l.book = b.id AND t.name = ? COLLATE NOCASE)";
    let tag_like_exists = "EXISTS (SELECT 1 FROM books_tags_link l \
                           JOIN tags t ON t.id = l.tag \
                           WHERE l.book = b.id AND t.name LIKE ?)";
    let publisher_exists = "EXISTS (SELECT 1 FROM books_publishers_link l \
                            JOIN publishers p ON p.id = l.publisher \
                            WHERE l.book = b.id AND p.name LIKE ?)";
    let comment_exists = "EXISTS (SELECT 1 FROM comments c \
                          WHERE c.book = b.id AND c.text LIKE ?)";

    if let Some(text) = &query.text {
        clauses.push(format!(
            "(b.title LIKE ? OR {} OR {} OR {} OR {})",
            author_exists, tag_like_exists, series_exists, comment_exists
        ));
        for _ in 0..5 {
            values.push(like(text));
        }
    }
    if let Some(author) = &query.author {
        clauses.push(author_exists.to_string());
        values.push(like(author));
    }
    if !query.authors.is_empty() {
        let alts = vec![author_exists; query.authors.len()].join(" OR ");
        clauses.push(format!("({})", alts));
        for a in &query.authors {
            values.push(like(a));
        }
    }
    for author in &query.exclude_authors {
        clauses.push(format!("NOT {}", author_exists));
        values.push(like(author));
    }
    if let Some(series) = &query.series {
        clauses.push(series_exists.to_string());
        values.push(like(series));
    }
    for series in &query.exclude_series {
        clauses.push(format!("NOT {}", series_exists));
        values.push(like(series));
    }
    if let Some(tag) = &query.tag {
        clauses.push(tag_exists.to_string());
        values.push(Value::Text(tag.clone()));
    }
    for tag in &query.tags {
        clauses.push(tag_exists.to_string());
        values.push(Value::Text(tag.clone()));
    }
    for tag in &query.exclude_tags {
        clauses.push(format!("NOT {}", tag_exists));
        values.push(Value::Text(tag.clone()));
    }
    if let Some(publisher) = &query.publisher {
        clauses.push(publisher_exists.to_string());
        values.push(like(publisher));
    }
    if !query.publishers.is_empty() {
        let alts = vec![publisher_exists; query.publishers.len()].join(" OR ");
        clauses.push(format!("({})", alts));
        for p in &query.publishers {
            values.push(like(p));
        }
    }
    match query.has_publisher {
        Some(true) => {
            clauses.push("EXISTS (SELECT 1 FROM books_publishers_link l WHERE l.book = b.id)".into())
        }
        Some(false) => clauses
            .push("NOT EXISTS (SELECT 1 FROM books_publishers_link l WHERE l.book = b.id)".into()),
        None => {}
    }

    let rating_cmp = |clauses: &mut Vec<String>, values: &mut Vec<Value>, op: &str, stars: i64| {
        clauses.push(format!(
            "EXISTS (SELECT 1 FROM books_ratings_link l \
             JOIN ratings r ON r.id = l.rating \
             WHERE l.book = b.id AND r.rating {} ?)",
            op
        ));
        values.push(Value::Integer(stars * 2));
    };
    if let Some(stars) = query.rating {
        rating_cmp(&mut clauses, &mut values, "=", stars);
    }
    if let Some(stars) = query.min_rating {
        rating_cmp(&mut clauses, &mut values, ">=", stars);
    }
    if let Some(stars) = query.max_rating {
        rating_cmp(&mut clauses, &mut values, "<=", stars);
    }
    if query.unrated {
        clauses.push(
            "NOT EXISTS (SELECT 1 FROM books_ratings_link l \
             JOIN ratings r ON r.id = l.rating \
             WHERE l.book = b.id AND r.rating > 0)"
                .into(),
        );
    }

    let mut date_cmp = |column: &str, op: &str, date: chrono::NaiveDate| {
        clauses.push(format!("DATE(b.{}) {} DATE(?)", column, op));
        values.push(Value::Text(date.format("%Y-%m-%d").to_string()));
    };
    if let Some(d) = query.pubdate_start {
        date_cmp("pubdate", ">=", d);
    }
    if let Some(d) = query.pubdate_end {
        date_cmp("pubdate", "<=", d);
    }
    if let Some(d) = query.added_after {
        date_cmp("timestamp", ">=", d);
    }
    if let Some(d) = query.added_before {
        date_cmp("timestamp", "<=", d);
    }

    if let Some(size) = query.min_size {
        clauses.push(
            "EXISTS (SELECT 1 FROM data d WHERE d.book = b.id AND d.uncompressed_size >= ?)".into(),
        );
        values.push(Value::Integer(size));
    }
    if let Some(size) = query.max_size {
        clauses.push(
            "EXISTS (SELECT 1 FROM data d WHERE d.book = b.id AND d.uncompressed_size <= ?)".into(),
        );
        values.push(Value::Integer(size));
    }
    if !query.formats.is_empty() {
        let placeholders = vec!["?"; query.formats.len()].join(", ");
        clauses.push(format!(
            "EXISTS (SELECT 1 FROM data d WHERE d.book = b.id AND UPPER(d.format) IN ({}))",
            placeholders
        ));
        for f in &query.formats {
            values.push(Value::Text(f.to_uppercase()));
        }
    }
    if let Some(comment) = &query.comment {
        clauses.push(comment_exists.to_string());
        values.push(like(comment));
    }
    match query.has_empty_comments {
        Some(true) => clauses.push(
            "NOT EXISTS (SELECT 1 FROM comments c WHERE c.book = b.id AND TRIM(c.text) != '')"
                .into(),
        ),
        Some(false) => clauses.push(
            "EXISTS (SELECT 1 FROM comments c WHERE c.book = b.id AND TRIM(c.text) != '')".into(),
        ),
        None => {}
    }

    if clauses.is_empty() {
        (String::new(), values)
    } else {
        (format!(" WHERE {}", clauses.join(" AND ")), values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unfiltered_query_has_no_where() {
        let (sql, values) = build_where(&SearchQuery::new());
        assert!(sql.is_empty());
        assert!(values.is_empty());
    }

    #[test]
    fn text_filter_binds_five_patterns() {
        let (sql, values) = build_where(&SearchQuery::new().text("holmes"));
        assert!(sql.starts_with(" WHERE ("));
        assert_eq!(values.len(), 5);
        assert!(matches!(&values[0], Value::Text(t) if t == "%holmes%"));
    }

    #[test]
    fn star_ratings_are_doubled() {
        let (sql, values) = build_where(&SearchQuery::new().min_rating(4));
        assert!(sql.contains("r.rating >= ?"));
        assert!(matches!(values[0], Value::Integer(8)));
    }

    #[test]
    fn clauses_join_with_and() {
        let q = SearchQuery::new().author("doyle").tag("mystery");
        let (sql, values) = build_where(&q);
        assert!(sql.contains(" AND "));
        assert_eq!(values.len(), 2);
    }
}
