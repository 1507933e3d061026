//! Async client bindings for Calibre ebook libraries.
//!
//! This crate wraps the two interfaces Calibre itself provides:
//!
//! 1. The `calibredb` and `ebook-convert` command-line tools, for every
//!    mutating operation (adding, removing, updating, exporting, converting
//!    books). Calibre keeps internal bookkeeping in sync when changes go
//!    through its own tools, so writes are routed there.
//! 2. The `metadata.db` SQLite database inside a library directory, for fast
//!    read access (searching, listing, catalog browsing, statistics) and for
//!    the one table Calibre treats as plain data (`comments`).
//!
//! # Example
//!
//! ```no_run
//! use calkit::CalibreClient;
//!
//! # async fn example() -> calkit::Result<()> {
//! let client = CalibreClient::builder()
//!     .library_path("/home/me/Calibre Library")
//!     .build();
//!
//! // CLI-backed: add a book
//! let ids = client.books().add("/tmp/novel.epub", Default::default()).await?;
//! println!("added book ids: {:?}", ids);
//!
//! // SQLite-backed: look it up
//! let book = client.database()?.books().get(ids[0]).await?;
//! println!("{} by {}", book.title, book.authors.join(" & "));
//! # Ok(())
//! # }
//! ```

mod client;
mod command;
pub mod error;

pub mod actions;
pub mod db;
pub mod query;
pub mod types;

pub use client::{CalibreClient, ClientBuilder};
pub use db::{FtsHit, FtsIndex, HealthCounts, LibraryDb};
pub use error::{Error, Result};
pub use query::SearchQuery;
pub use types::{
    Author, Book, BookDetails, BookFile, CliBook, LetterCount, LibraryStats, Publisher,
    SearchPage, Series, Tag,
};
