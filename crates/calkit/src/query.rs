//! Composable search filters for Calibre libraries.
//!
//! [`SearchQuery`] is the single filter vocabulary used by both backends:
//! the SQLite layer compiles it to SQL (see [`crate::db`]), and
//! [`SearchQuery::to_expression`] renders it in Calibre's own search
//! language for the `calibredb search` path.
//!
//! Filters compose with AND; the `exclude_*` fields negate.
//!
//! # Example
//!
//! ```
//! use calkit::SearchQuery;
//!
//! let q = SearchQuery::new()
//!     .author("Conan Doyle")
//!     .tag("mystery")
//!     .min_rating(4);
//! assert_eq!(
//!     q.to_expression(),
//!     r#"authors:"~Conan Doyle" and tags:"=mystery" and rating:>=4"#
//! );
//! ```

use chrono::NaiveDate;

/// Default page size for search results.
pub const DEFAULT_LIMIT: i64 = 50;

/// A filter set over the library's books.
#[derive(Debug, Clone, Default)]
pub struct SearchQuery {
    /// Free text matched against title, authors, tags, series and comments.
    pub text: Option<String>,
    /// Author name, case-insensitive substring.
    pub author: Option<String>,
    /// Any-of author names (OR within the list).
    pub authors: Vec<String>,
    pub exclude_authors: Vec<String>,
    pub series: Option<String>,
    pub exclude_series: Vec<String>,
    /// Exact tag name.
    pub tag: Option<String>,
    /// All-of tag names.
    pub tags: Vec<String>,
    pub exclude_tags: Vec<String>,
    pub publisher: Option<String>,
    /// Any-of publisher names.
    pub publishers: Vec<String>,
    /// true = only books with a publisher, false = only books without.
    pub has_publisher: Option<bool>,
    /// Exact rating in stars (1-5).
    pub rating: Option<i64>,
    pub min_rating: Option<i64>,
    pub max_rating: Option<i64>,
    /// Only books without any rating.
    pub unrated: bool,
    pub pubdate_start: Option<NaiveDate>,
    pub pubdate_end: Option<NaiveDate>,
    pub added_after: Option<NaiveDate>,
    pub added_before: Option<NaiveDate>,
    /// Minimum stored file size in bytes (any format).
    pub min_size: Option<i64>,
    pub max_size: Option<i64>,
    /// Any-of format names.
    pub formats: Vec<String>,
    /// Substring matched against the comments field only.
    pub comment: Option<String>,
    /// true = only books with empty comments, false = only with comments.
    pub has_empty_comments: Option<bool>,
    pub limit: i64,
    pub offset: i64,
}

impl SearchQuery {
    /// An empty query matching every book, with the default page size.
    pub fn new() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            ..Default::default()
        }
    }

    /// True when no filter field is set (pagination aside).
    pub fn is_unfiltered(&self) -> bool {
        self.text.is_none()
            && self.author.is_none()
            && self.authors.is_empty()
            && self.exclude_authors.is_empty()
            && self.series.is_none()
            && self.exclude_series.is_empty()
            && self.tag.is_none()
            && self.tags.is_empty()
            && self.exclude_tags.is_empty()
            && self.publisher.is_none()
            && self.publishers.is_empty()
            && self.has_publisher.is_none()
            && self.rating.is_none()
            && self.min_rating.is_none()
            && self.max_rating.is_none()
            && !self.unrated
            && self.pubdate_start.is_none()
            && self.pubdate_end.is_none()
            && self.added_after.is_none()
            && self.added_before.is_none()
            && self.min_size.is_none()
            && self.max_size.is_none()
            && self.formats.is_empty()
            && self.comment.is_none()
            && self.has_empty_comments.is_none()
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn series(mut self, series: impl Into<String>) -> Self {
        self.series = Some(series.into());
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn publisher(mut self, publisher: impl Into<String>) -> Self {
        self.publisher = Some(publisher.into());
        self
    }

    pub fn min_rating(mut self, stars: i64) -> Self {
        self.min_rating = Some(stars);
        self
    }

    pub fn max_rating(mut self, stars: i64) -> Self {
        self.max_rating = Some(stars);
        self
    }

    pub fn format(mut self, format: impl Into<String>) -> Self {
        self.formats.push(format.into());
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    pub fn offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }

    /// Render the query in Calibre's search language.
    ///
    /// Used for the `calibredb search` path; the SQLite layer compiles the
    /// same struct to SQL instead. Date and size filters are expressed with
    /// Calibre's comparison prefixes.
    pub fn to_expression(&self) -> String {
        let mut parts: Vec<String> = Vec::new();

        if let Some(text) = &self.text {
            // Bare quoted text: Calibre searches all fields when no prefix
            // is given.
            parts.push(format!("\"{}\"", text));
        }
        if let Some(author) = &self.author {
            parts.push(contains("authors", author));
        }
        if !self.authors.is_empty() {
            parts.push(any_of("authors", &self.authors));
        }
        for author in &self.exclude_authors {
            parts.push(format!("not {}", contains("authors", author)));
        }
        if let Some(series) = &self.series {
            parts.push(contains("series", series));
        }
        for series in &self.exclude_series {
            parts.push(format!("not {}", contains("series", series)));
        }
        if let Some(tag) = &self.tag {
            parts.push(exact("tags", tag));
        }
        for tag in &self.tags {
            parts.push(exact("tags", tag));
        }
        for tag in &self.exclude_tags {
            parts.push(format!("not {}", exact("tags", tag)));
        }
        if let Some(publisher) = &self.publisher {
            parts.push(contains("publisher", publisher));
        }
        if !self.publishers.is_empty() {
            parts.push(any_of("publisher", &self.publishers));
        }
        match self.has_publisher {
            Some(true) => parts.push("publisher:true".to_string()),
            Some(false) => parts.push("publisher:false".to_string()),
            None => {}
        }
        if let Some(rating) = self.rating {
            parts.push(format!("rating:{}", rating));
        }
        if let Some(min) = self.min_rating {
            parts.push(format!("rating:>={}", min));
        }
        if let Some(max) = self.max_rating {
            parts.push(format!("rating:<={}", max));
        }
        if self.unrated {
            parts.push("rating:false".to_string());
        }
        if let Some(d) = self.pubdate_start {
            parts.push(format!("pubdate:>={}", d.format("%Y-%m-%d")));
        }
        if let Some(d) = self.pubdate_end {
            parts.push(format!("pubdate:<={}", d.format("%Y-%m-%d")));
        }
        if let Some(d) = self.added_after {
            parts.push(format!("date:>={}", d.format("%Y-%m-%d")));
        }
        if let Some(d) = self.added_before {
            parts.push(format!("date:<={}", d.format("%Y-%m-%d")));
        }
        if let Some(size) = self.min_size {
            parts.push(format!("size:>={}", size));
        }
        if let Some(size) = self.max_size {
            parts.push(format!("size:<={}", size));
        }
        if !self.formats.is_empty() {
            let alts: Vec<String> = self
                .formats
                .iter()
                .map(|f| format!("formats:{}", f.to_uppercase()))
                .collect();
            parts.push(group_or(&alts));
        }
        if let Some(comment) = &self.comment {
            parts.push(contains("comments", comment));
        }
        match self.has_empty_comments {
            Some(true) => parts.push("comments:false".to_string()),
            Some(false) => parts.push("comments:true".to_string()),
            None => {}
        }

        parts.join(" and ")
    }
}

fn contains(field: &str, value: &str) -> String {
    format!("{}:\"~{}\"", field, value)
}

fn exact(field: &str, value: &str) -> String {
    format!("{}:\"={}\"", field, value)
}

fn any_of(field: &str, values: &[String]) -> String {
    let alts: Vec<String> = values.iter().map(|v| contains(field, v)).collect();
    group_or(&alts)
}

fn group_or(alts: &[String]) -> String {
    if alts.len() == 1 {
        alts[0].clone()
    } else {
        format!("({})", alts.join(" or "))
    }
}
