//! Error types for the calkit crate.
//!
//! The most common errors you'll encounter are:
//!
//! - [`Error::CommandNotFound`]: `calibredb` / `ebook-convert` is not on PATH
//! - [`Error::CommandFailed`]: the tool ran but exited non-zero; the captured
//!   stderr carries Calibre's own message
//! - [`Error::LibraryNotFound`]: the library directory has no `metadata.db`
//!
//! # Example
//!
//! ```no_run
//! use calkit::{CalibreClient, Error};
//!
//! # async fn example() {
//! let client = CalibreClient::builder()
//!     .library_path("/books")
//!     .build();
//!
//! match client.books().remove(&[42], false).await {
//!     Ok(()) => println!("removed"),
//!     Err(Error::CommandNotFound(bin)) => {
//!         eprintln!("{} is not installed or not on PATH", bin);
//!     }
//!     Err(e) => eprintln!("error: {}", e),
//! }
//! # }
//! ```

use std::path::PathBuf;

use thiserror::Error;

/// The error type for Calibre client operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The external binary could not be spawned because it does not exist.
    #[error("command not found: {0}. Is Calibre installed and on PATH?")]
    CommandNotFound(String),

    /// The external tool exited with a non-zero status.
    ///
    /// `stderr` contains Calibre's diagnostic output, e.g.
    /// "No book with id 999 present in library".
    #[error("{command} exited with status {status}: {stderr}")]
    CommandFailed {
        /// The program that was run.
        command: String,
        /// The exit status code, or -1 when terminated by a signal.
        status: i32,
        /// Captured standard error, trimmed.
        stderr: String,
    },

    /// The external tool did not finish within the configured timeout.
    #[error("{command} timed out after {seconds}s")]
    Timeout {
        /// The program that was run.
        command: String,
        /// The timeout that expired.
        seconds: u64,
    },

    /// Tool output was not in the expected shape.
    #[error("unexpected output from calibredb: {0}")]
    OutputParse(String),

    /// JSON deserialization of `--for-machine` output failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// An error from the underlying SQLite database.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The library directory does not contain a `metadata.db`.
    #[error("no Calibre library at {0} (metadata.db missing)")]
    LibraryNotFound(PathBuf),

    /// No book with the given id exists in the library.
    #[error("book {0} not found")]
    BookNotFound(i64),

    /// No catalog entity (author, series, tag, publisher) with that id.
    #[error("{kind} {id} not found")]
    EntityNotFound {
        /// The entity kind ("author", "series", "tag", "publisher").
        kind: &'static str,
        /// The id that was looked up.
        id: i64,
    },

    /// The book exists but has no file in the requested format.
    #[error("book {book_id} has no {format} file")]
    FormatNotFound {
        /// The book id.
        book_id: i64,
        /// The requested format, upper-cased.
        format: String,
    },

    /// Full-text search was requested but the library has no FTS index.
    #[error("this library has no full-text-search.db; enable FTS indexing in Calibre first")]
    FtsUnavailable,

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized Result type for Calibre client operations.
pub type Result<T> = std::result::Result<T, Error>;
