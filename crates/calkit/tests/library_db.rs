//! Integration tests for the metadata.db layer, against a seeded fixture
//! database using Calibre's schema.

use std::path::Path;

use calkit::{LibraryDb, SearchQuery};
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

fn seed_library(dir: &Path) {
    let conn = Connection::open(dir.join("metadata.db")).unwrap();
    conn.execute_batch(SCHEMA).unwrap();

    let add_book = |title: &str, author: &str, tags: &[&str], rating_stars: Option<i64>| -> i64 {
        conn.execute(
            "INSERT INTO books (title, sort, author_sort, path, timestamp, pubdate)
             VALUES (?, ?, ?, ?, '2024-01-10 00:00:00+00:00', '1920-06-01 00:00:00+00:00')",
            params![title, title, author, title],
        )
        .unwrap();
        let book_id = conn.last_insert_rowid();

        conn.execute(
            "INSERT INTO authors (name, sort) VALUES (?, ?)
             ON CONFLICT DO NOTHING",
            params![author, author],
        )
        .unwrap();
        let author_id: i64 = conn
            .query_row("SELECT id FROM authors WHERE name = ?", params![author], |r| r.get(0))
            .unwrap();
        conn.execute(
            "INSERT INTO books_authors_link (book, author) VALUES (?, ?)",
            params![book_id, author_id],
        )
        .unwrap();

        for tag in tags {
            conn.execute("INSERT OR IGNORE INTO tags (name) VALUES (?)", params![tag])
                .unwrap();
            let tag_id: i64 = conn
                .query_row("SELECT id FROM tags WHERE name = ?", params![tag], |r| r.get(0))
                .unwrap();
            conn.execute(
                "INSERT INTO books_tags_link (book, tag) VALUES (?, ?)",
                params![book_id, tag_id],
            )
            .unwrap();
        }

        if let Some(stars) = rating_stars {
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

        book_id
    };

    let holmes = add_book(
        "A Study in Scarlet",
        "Arthur Conan Doyle",
        &["mystery", "detective"],
        Some(5),
    );
    add_book("The Sign of the Four", "Arthur Conan Doyle", &["mystery"], Some(4));
    add_book("Whose Body?", "Dorothy L. Sayers", &["mystery"], None);
    add_book("Mathematics for Everyone", "Anonymous Author", &[], None);

    conn.execute(
        "INSERT INTO comments (book, text) VALUES (?, 'The first Sherlock Holmes novel.')",
        params![holmes],
    )
    .unwrap();
    conn.execute(
        "INSERT INTO data (book, format, uncompressed_size, name)
         VALUES (?, 'EPUB', 2048, 'A Study in Scarlet')",
        params![holmes],
    )
    .unwrap();
    conn.execute(
        "INSERT INTO identifiers (book, type, val) VALUES (?, 'isbn', '9780140439083')",
        params![holmes],
    )
    .unwrap();
}

fn open_fixture() -> (TempDir, LibraryDb) {
    let dir = TempDir::new().unwrap();
    seed_library(dir.path());
    let db = LibraryDb::open(dir.path()).unwrap();
    (dir, db)
}

#[tokio::test]
async fn get_hydrates_linked_fields() {
    let (_dir, db) = open_fixture();
    let book = db.books().get(1).await.unwrap();

    assert_eq!(book.title, "A Study in Scarlet");
    assert_eq!(book.authors, vec!["Arthur Conan Doyle"]);
    assert_eq!(book.rating, Some(10));
    assert_eq!(book.stars(), Some(5.0));
    let mut tags = book.tags.clone();
    tags.sort();
    assert_eq!(tags, vec!["detective", "mystery"]);
    assert_eq!(book.formats, vec!["EPUB"]);
    assert!(book.added.is_some());
}

#[tokio::test]
async fn missing_book_is_an_error() {
    let (_dir, db) = open_fixture();
    let err = db.books().get(999).await.unwrap_err();
    assert!(matches!(err, calkit::Error::BookNotFound(999)));
}

#[tokio::test]
async fn author_filter_narrows_results() {
    let (_dir, db) = open_fixture();
    let page = db
        .books()
        .search(&SearchQuery::new().author("conan doyle"))
        .await
        .unwrap();
    assert_eq!(page.total, 2);
    assert!(page.books.iter().all(|b| b.authors[0].contains("Doyle")));
}

#[tokio::test]
async fn rating_and_tag_filters_compose() {
    let (_dir, db) = open_fixture();
    let page = db
        .books()
        .search(&SearchQuery::new().tag("mystery").min_rating(5))
        .await
        .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.books[0].title, "A Study in Scarlet");
}

#[tokio::test]
async fn empty_comments_filter() {
    let (_dir, db) = open_fixture();
    let mut query = SearchQuery::new();
    query.has_empty_comments = Some(true);
    let page = db.books().search(&query).await.unwrap();
    assert_eq!(page.total, 3);

    query.has_empty_comments = Some(false);
    let page = db.books().search(&query).await.unwrap();
    assert_eq!(page.total, 1);
}

#[tokio::test]
async fn pagination_reports_total() {
    let (_dir, db) = open_fixture();
    let page = db
        .books()
        .search(&SearchQuery::new().limit(2).offset(0))
        .await
        .unwrap();
    assert_eq!(page.total, 4);
    assert_eq!(page.books.len(), 2);

    let rest = db
        .books()
        .search(&SearchQuery::new().limit(10).offset(2))
        .await
        .unwrap();
    assert_eq!(rest.books.len(), 2);
}

#[tokio::test]
async fn details_carry_comments_files_and_identifiers() {
    let (_dir, db) = open_fixture();
    let details = db.books().details(1).await.unwrap();
    assert_eq!(
        details.comments.as_deref(),
        Some("The first Sherlock Holmes novel.")
    );
    assert_eq!(details.files.len(), 1);
    assert_eq!(details.files[0].format, "EPUB");
    assert_eq!(
        details.identifiers,
        vec![("isbn".to_string(), "9780140439083".to_string())]
    );
}

#[tokio::test]
async fn format_path_resolves_inside_library() {
    let (dir, db) = open_fixture();
    let path = db.books().format_path(1, "epub").await.unwrap();
    assert_eq!(
        path,
        dir.path()
            .join("A Study in Scarlet")
            .join("A Study in Scarlet.epub")
    );

    let err = db.books().format_path(1, "PDF").await.unwrap_err();
    assert!(matches!(
        err,
        calkit::Error::FormatNotFound { book_id: 1, .. }
    ));
}

#[tokio::test]
async fn catalog_counts_and_letters() {
    let (_dir, db) = open_fixture();
    let authors = db.catalog().authors(50, 0).await.unwrap();
    assert_eq!(authors.len(), 3);
    let doyle = authors
        .iter()
        .find(|a| a.name == "Arthur Conan Doyle")
        .unwrap();
    assert_eq!(doyle.book_count, 2);

    let letters = db.catalog().authors_by_letter().await.unwrap();
    assert!(letters.iter().any(|l| l.letter == "A" && l.count == 2));

    let tags = db.catalog().tags(50, 0).await.unwrap();
    assert_eq!(tags.len(), 2);
}

#[tokio::test]
async fn tag_rename_merges_into_existing() {
    let (_dir, db) = open_fixture();
    let detective = db.catalog().tag_by_name("detective").await.unwrap().unwrap();

    let merged = db.catalog().rename_tag(detective.id, "mystery").await.unwrap();
    assert!(merged);

    let mystery = db.catalog().tag_by_name("mystery").await.unwrap().unwrap();
    assert_eq!(mystery.book_count, 3);
    assert!(db.catalog().tag_by_name("detective").await.unwrap().is_none());
}

#[tokio::test]
async fn comment_crud_round_trip() {
    let (_dir, db) = open_fixture();
    let comments = db.comments();

    assert!(comments.get(2).await.unwrap().is_none());
    comments.set(2, "A fine sequel.").await.unwrap();
    assert_eq!(comments.get(2).await.unwrap().as_deref(), Some("A fine sequel."));

    let combined = comments.append(2, "Second thoughts.").await.unwrap();
    assert_eq!(combined, "A fine sequel.\n\nSecond thoughts.");

    assert!(comments.delete(2).await.unwrap());
    assert!(!comments.delete(2).await.unwrap());
    assert!(comments.get(2).await.unwrap().is_none());
}

#[tokio::test]
async fn library_stats_aggregate() {
    let (_dir, db) = open_fixture();
    let stats = db.stats().library_stats(2).await.unwrap();
    assert_eq!(stats.total_books, 4);
    assert_eq!(stats.total_authors, 3);
    assert_eq!(stats.total_tags, 2);
    assert_eq!(stats.format_counts, vec![("EPUB".to_string(), 1)]);
    assert_eq!(stats.recent.len(), 2);

    let health = db.stats().health_counts().await.unwrap();
    assert_eq!(health.total_books, 4);
    assert_eq!(health.without_tags, 1);
    assert_eq!(health.without_formats, 3);
    assert_eq!(health.unrated, 2);
}

#[tokio::test]
async fn fts_absent_is_none() {
    let (_dir, db) = open_fixture();
    assert!(db.fts().unwrap().is_none());
}
