//! Catalog entities: authors, series, tags, publishers, and library totals.

use serde::{Deserialize, Serialize};

/// An author with its usage count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Author {
    pub id: i64,
    pub name: String,
    pub sort: Option<String>,
    /// Number of books linked to this author.
    pub book_count: i64,
}

/// A series with its usage count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Series {
    pub id: i64,
    pub name: String,
    pub book_count: i64,
}

/// A tag with its usage count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tag {
    pub id: i64,
    pub name: String,
    pub book_count: i64,
}

/// A publisher with its usage count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Publisher {
    pub id: i64,
    pub name: String,
    pub book_count: i64,
}

/// Count of entities starting with a given letter ("A".."Z", "#" for other).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LetterCount {
    pub letter: String,
    pub count: i64,
}

/// Aggregate numbers for a whole library.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LibraryStats {
    pub total_books: i64,
    pub total_authors: i64,
    pub total_series: i64,
    pub total_tags: i64,
    pub total_publishers: i64,
    /// Books per format, descending.
    pub format_counts: Vec<(String, i64)>,
    /// Books per raw rating value (0-10), descending by rating.
    pub rating_counts: Vec<(i64, i64)>,
    /// Ids and titles of the most recently added books.
    pub recent: Vec<(i64, String)>,
}
