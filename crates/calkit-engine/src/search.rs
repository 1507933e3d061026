//! Book search and lookup workflows.
//!
//! Filtered searches compile [`SearchQuery`] against `metadata.db` directly;
//! the calibredb process path is reserved for callers that want Calibre's
//! own search language (see [`SearchEngine::expression`]).
//!
//! # Example
//!
//! ```no_run
//! use calkit_engine::{Engine, SearchQuery};
//!
//! # async fn example() -> calkit_engine::Result<()> {
//! let engine = Engine::new("/books");
//!
//! let page = engine
//!     .search()
//!     .books(&SearchQuery::new().author("Christie").tag("mystery"))
//!     .await?;
//! for book in &page.books {
//!     println!("{}: {}", book.id, book.title);
//! }
//! # Ok(())
//! # }
//! ```

use calkit::{Book, BookDetails, CalibreClient, FtsHit, SearchPage, SearchQuery};

use crate::{Error, Result};

/// Search workflow engine.
#[derive(Debug)]
pub struct SearchEngine<'a> {
    client: &'a CalibreClient,
}

impl<'a> SearchEngine<'a> {
    pub(crate) fn new(client: &'a CalibreClient) -> Self {
        Self { client }
    }

    /// Run a filtered search against the library database.
    pub async fn books(&self, query: &SearchQuery) -> Result<SearchPage> {
        Ok(self.client.database()?.books().search(query).await?)
    }

    /// List books without filters, paginated.
    pub async fn list(&self, limit: i64, offset: i64) -> Result<SearchPage> {
        let mut query = SearchQuery::new();
        query.limit = limit;
        query.offset = offset;
        self.books(&query).await
    }

    /// Books by author id.
    pub async fn by_author(&self, author_id: i64, limit: i64, offset: i64) -> Result<SearchPage> {
        Ok(self
            .client
            .database()?
            .books()
            .by_author(author_id, limit, offset)
            .await?)
    }

    /// Books in a series, ordered by series position.
    pub async fn by_series(&self, series_id: i64, limit: i64, offset: i64) -> Result<SearchPage> {
        Ok(self
            .client
            .database()?
            .books()
            .by_series(series_id, limit, offset)
            .await?)
    }

    /// Fetch one book.
    pub async fn get(&self, book_id: i64) -> Result<Book> {
        Ok(self.client.database()?.books().get(book_id).await?)
    }

    /// Fetch one book with comments, identifiers and files.
    pub async fn details(&self, book_id: i64) -> Result<BookDetails> {
        Ok(self.client.database()?.books().details(book_id).await?)
    }

    /// Run a raw Calibre search expression through `calibredb search`.
    pub async fn expression(&self, expression: &str, limit: Option<i64>) -> Result<Vec<i64>> {
        Ok(self.client.books().search(expression, limit).await?)
    }

    /// Full-text search over book contents.
    ///
    /// Fails with the client's FTS-unavailable error when the library has no
    /// `full-text-search.db`.
    pub async fn fulltext(&self, query: &str, limit: i64) -> Result<Vec<FtsHit>> {
        let fts = self
            .client
            .database()?
            .fts()?
            .ok_or(Error::Client(calkit::Error::FtsUnavailable))?;
        Ok(fts.search(query, limit).await?)
    }
}
