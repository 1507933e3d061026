//! Book records as read from `metadata.db` and from `calibredb --for-machine`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A book row hydrated with its linked metadata.
///
/// This is the shape returned by the SQLite layer; list-valued fields are
/// aggregated from the `books_*_link` tables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Book {
    /// Calibre book id.
    pub id: i64,
    pub title: String,
    /// Author display names, in link order.
    pub authors: Vec<String>,
    pub author_sort: Option<String>,
    pub series: Option<String>,
    pub series_index: Option<f64>,
    /// Raw Calibre rating, 0-10 (two per star).
    pub rating: Option<i64>,
    pub tags: Vec<String>,
    pub publisher: Option<String>,
    /// ISO 639 language codes.
    pub languages: Vec<String>,
    /// Upper-cased format names present in the library (EPUB, PDF, ...).
    pub formats: Vec<String>,
    pub isbn: Option<String>,
    /// Calibre's stable book UUID.
    pub uuid: Option<String>,
    /// Book directory, relative to the library root.
    pub path: String,
    /// When the book was added to the library.
    pub added: Option<DateTime<Utc>>,
    /// Edition publication date.
    pub pubdate: Option<DateTime<Utc>>,
    pub last_modified: Option<DateTime<Utc>>,
    pub has_cover: bool,
}

impl Book {
    /// Rating in stars (half steps), if rated.
    pub fn stars(&self) -> Option<f64> {
        self.rating.map(|r| r as f64 / 2.0)
    }
}

/// A stored file for one format of a book.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookFile {
    /// Upper-cased format name (EPUB, PDF, ...).
    pub format: String,
    /// File stem inside the book directory, without extension.
    pub name: String,
    /// Uncompressed size in bytes.
    pub size: i64,
}

/// A [`Book`] plus the detail fields that are too heavy for list results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookDetails {
    #[serde(flatten)]
    pub book: Book,
    /// Calibre's description/comments field, HTML.
    pub comments: Option<String>,
    /// All identifiers (isbn, amazon, goodreads, ...).
    pub identifiers: Vec<(String, String)>,
    /// Per-format stored files.
    pub files: Vec<BookFile>,
}

/// One page of search results with pagination bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchPage {
    pub books: Vec<Book>,
    /// Total matches ignoring limit/offset.
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

/// A book record as emitted by `calibredb list --for-machine`.
///
/// calibredb joins authors with `" & "` into a single string and reports
/// formats as absolute file paths; this struct keeps that wire shape.
#[derive(Debug, Clone, Deserialize)]
pub struct CliBook {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub authors: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub formats: Vec<String>,
    #[serde(default)]
    pub series: Option<String>,
    #[serde(default)]
    pub series_index: Option<f64>,
}
