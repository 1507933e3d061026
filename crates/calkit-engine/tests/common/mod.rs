//! Common test fixtures for calkit-engine workflow tests.
//!
//! The fixture stands in for a real Calibre library: a temp directory with
//! a seeded `metadata.db` (Calibre's schema) and, for formats, real files
//! in the per-book directories so path resolution works.

use std::path::{Path, PathBuf};

use calkit_engine::Engine;
use rusqlite::{Connection, params};
use tempfile::TempDir;

const SCHEMA: &str = "
CREATE TABLE books (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL DEFAULT 'Unknown',
    sort TEXT,
    timestamp TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    pubdate TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    series_index REAL NOT NULL DEFAULT 1.0,
    author_sort TEXT,
    isbn TEXT DEFAULT '',
    path TEXT NOT NULL DEFAULT '',
    uuid TEXT,
    has_cover BOOL DEFAULT 0,
    last_modified TIMESTAMP NOT NULL DEFAULT '2000-01-01 00:00:00+00:00'
);
CREATE TABLE authors (id INTEGER PRIMARY KEY, name TEXT NOT NULL UNIQUE, sort TEXT);
CREATE TABLE books_authors_link (id INTEGER PRIMARY KEY, book INTEGER NOT NULL,
    author INTEGER NOT NULL, UNIQUE(book, author));
CREATE TABLE tags (id INTEGER PRIMARY KEY, name TEXT NOT NULL UNIQUE);
CREATE TABLE books_tags_link (id INTEGER PRIMARY KEY, book INTEGER NOT NULL,
    tag INTEGER NOT NULL, UNIQUE(book, tag));
CREATE TABLE series (id INTEGER PRIMARY KEY, name TEXT NOT NULL UNIQUE, sort TEXT);
CREATE TABLE books_series_link (id INTEGER PRIMARY KEY, book INTEGER NOT NULL,
    series INTEGER NOT NULL, UNIQUE(book));
CREATE TABLE publishers (id INTEGER PRIMARY KEY, name TEXT NOT NULL UNIQUE, sort TEXT);
CREATE TABLE books_publishers_link (id INTEGER PRIMARY KEY, book INTEGER NOT NULL,
    publisher INTEGER NOT NULL, UNIQUE(book));
CREATE TABLE ratings (id INTEGER PRIMARY KEY, rating INTEGER, UNIQUE(rating));
CREATE TABLE books_ratings_link (id INTEGER PRIMARY KEY, book INTEGER NOT NULL,
    rating INTEGER NOT NULL, UNIQUE(book));
CREATE TABLE languages (id INTEGER PRIMARY KEY, lang_code TEXT NOT NULL UNIQUE);
CREATE TABLE books_languages_link (id INTEGER PRIMARY KEY, book INTEGER NOT NULL,
    lang_code INTEGER NOT NULL, item_order INTEGER DEFAULT 0, UNIQUE(book, lang_code));
CREATE TABLE comments (id INTEGER PRIMARY KEY, book INTEGER NOT NULL UNIQUE,
    text TEXT NOT NULL);
CREATE TABLE data (id INTEGER PRIMARY KEY, book INTEGER NOT NULL, format TEXT NOT NULL,
    uncompressed_size INTEGER NOT NULL DEFAULT 0, name TEXT NOT NULL, UNIQUE(book, format));
CREATE TABLE identifiers (id INTEGER PRIMARY KEY, book INTEGER NOT NULL,
    type TEXT NOT NULL DEFAULT 'isbn', val TEXT NOT NULL, UNIQUE(book, type));
";

/// Everything a seeded book can carry.
#[derive(Debug, Default)]
pub struct BookSpec {
    pub title: String,
    pub authors: Vec<String>,
    pub author_sort: Option<String>,
    pub tags: Vec<String>,
    pub series: Option<(String, f64)>,
    pub publisher: Option<String>,
    /// Stars 1-5; stored doubled like Calibre does.
    pub rating_stars: Option<i64>,
    /// Calibre timestamp text; defaults to a fixed date.
    pub added: Option<String>,
    pub isbn: Option<String>,
    /// (format, size) pairs; a file is created for each.
    pub formats: Vec<(String, i64)>,
    pub comments: Option<String>,
    pub has_cover: bool,
}

impl BookSpec {
    pub fn titled(title: &str, author: &str) -> Self {
        Self {
            title: title.to_string(),
            authors: vec![author.to_string()],
            author_sort: Some(author.to_string()),
            ..Default::default()
        }
    }
}

/// Create a bare library (schema only) at `dir`, for discovery tests.
#[allow(dead_code)]
pub fn init_bare_library(dir: &Path) {
    std::fs::create_dir_all(dir).unwrap();
    let conn = Connection::open(dir.join("metadata.db")).unwrap();
    conn.execute_batch(SCHEMA).unwrap();
}

/// A temp Calibre library plus an engine pointed at it.
pub struct FixtureLibrary {
    dir: TempDir,
}

impl FixtureLibrary {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let conn = Connection::open(dir.path().join("metadata.db")).unwrap();
        conn.execute_batch(SCHEMA).unwrap();
        Self { dir }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// An engine whose user data store also lives inside the temp dir.
    pub fn engine(&self) -> Engine {
        Engine::new(self.path()).with_user_data_path(self.path().join("calkit-userdata.db"))
    }

    /// The on-disk file backing one format of a seeded book.
    pub fn format_file(&self, title: &str, format: &str) -> PathBuf {
        self.path()
            .join(title)
            .join(format!("{}.{}", title, format.to_lowercase()))
    }

    /// Seed one book; returns its id.
    pub fn add_book(&self, spec: &BookSpec) -> i64 {
        let conn = Connection::open(self.path().join("metadata.db")).unwrap();
        let added = spec
            .added
            .clone()
            .unwrap_or_else(|| "2024-01-10 00:00:00+00:00".to_string());

        conn.execute(
            "INSERT INTO books (title, sort, author_sort, isbn, path, timestamp, series_index, has_cover)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                spec.title,
                spec.title,
                spec.author_sort,
                spec.isbn.clone().unwrap_or_default(),
                spec.title,
                added,
                spec.series.as_ref().map(|(_, i)| *i).unwrap_or(1.0),
                spec.has_cover,
            ],
        )
        .unwrap();
        let book_id = conn.last_insert_rowid();

        let link = |table: &str, column: &str, entity_table: &str, name: &str| {
            conn.execute(
                &format!(
                    "INSERT OR IGNORE INTO {} (name) VALUES (?)",
                    entity_table
                ),
                params![name],
            )
            .unwrap();
            let entity_id: i64 = conn
                .query_row(
                    &format!("SELECT id FROM {} WHERE name = ?", entity_table),
                    params![name],
                    |r| r.get(0),
                )
                .unwrap();
            conn.execute(
                &format!("INSERT INTO {} (book, {}) VALUES (?, ?)", table, column),
                params![book_id, entity_id],
            )
            .unwrap();
        };

        for author in &spec.authors {
            link("books_authors_link", "author", "authors", author);
        }
        for tag in &spec.tags {
            link("books_tags_link", "tag", "tags", tag);
        }
        if let Some((series, _)) = &spec.series {
            link("books_series_link", "series", "series", series);
        }
        if let Some(publisher) = &spec.publisher {
            link("books_publishers_link", "publisher", "publishers", publisher);
        }

        if let Some(stars) = spec.rating_stars {
            conn.execute(
                "INSERT OR IGNORE INTO ratings (rating) VALUES (?)",
                params![stars * 2],
            )
            .unwrap();
            let rating_id: i64 = conn
                .query_row(
                    "SELECT id FROM ratings WHERE rating = ?",
                    params![stars * 2],
                    |r| r.get(0),
                )
                .unwrap();
            conn.execute(
                "INSERT INTO books_ratings_link (book, rating) VALUES (?, ?)",
                params![book_id, rating_id],
            )
            .unwrap();
        }

        if let Some(comments) = &spec.comments {
            conn.execute(
                "INSERT INTO comments (book, text) VALUES (?, ?)",
                params![book_id, comments],
            )
            .unwrap();
        }

        for (format, size) in &spec.formats {
            conn.execute(
                "INSERT INTO data (book, format, uncompressed_size, name) VALUES (?, ?, ?, ?)",
                params![book_id, format.to_uppercase(), size, spec.title],
            )
            .unwrap();
            let file = self.format_file(&spec.title, format);
            std::fs::create_dir_all(file.parent().unwrap()).unwrap();
            std::fs::write(&file, b"").unwrap();
        }

        book_id
    }
}
