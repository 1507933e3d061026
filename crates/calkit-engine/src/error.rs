//! Error types for calkit-engine.
//!
//! Errors from engine workflows fall into two categories:
//!
//! 1. **Client errors**: Wrapped from the underlying [`calkit::Error`] type
//! 2. **Workflow errors**: Specific to engine operations (e.g. unknown
//!    viewer session, no libraries under a base directory)
//!
//! # Example
//!
//! ```no_run
//! use calkit_engine::{Engine, Error};
//!
//! # async fn example() {
//! let engine = Engine::new("/books");
//!
//! match engine.viewer().get_page("nope", 0).await {
//!     Ok(page) => println!("page at {:?}", page.path),
//!     Err(Error::SessionNotFound(id)) => {
//!         eprintln!("viewer session '{}' expired or never existed", id);
//!     }
//!     Err(e) => eprintln!("error: {}", e),
//! }
//! # }
//! ```

use std::fmt;

/// Result type for calkit-engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during engine operations.
#[derive(Debug)]
pub enum Error {
    /// An error from the underlying calkit client.
    Client(calkit::Error),

    /// A viewer session id was not found (closed or never opened).
    SessionNotFound(String),

    /// The book's format cannot be paginated by the viewer.
    UnsupportedViewerFormat(String),

    /// A page index outside the session's page list.
    PageOutOfRange {
        /// Requested page index (zero-based).
        page: usize,
        /// Number of pages in the session.
        pages: usize,
    },

    /// No Calibre libraries were found under the base directory.
    NoLibrariesFound(std::path::PathBuf),

    /// Input failed workflow validation.
    Validation(String),

    /// An error from the engine's own user-data database.
    UserData(rusqlite::Error),

    /// An I/O error occurred.
    Io(std::io::Error),
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Client(e) => Some(e),
            Error::UserData(e) => Some(e),
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Client(e) => write!(f, "{}", e),
            Error::SessionNotFound(id) => write!(f, "viewer session not found: {}", id),
            Error::UnsupportedViewerFormat(format) => {
                write!(f, "viewer cannot paginate {} files", format)
            }
            Error::PageOutOfRange { page, pages } => {
                write!(f, "page {} out of range (session has {} pages)", page, pages)
            }
            Error::NoLibrariesFound(base) => {
                write!(f, "no Calibre libraries found under {}", base.display())
            }
            Error::Validation(msg) => write!(f, "validation error: {}", msg),
            Error::UserData(e) => write!(f, "user data error: {}", e),
            Error::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl From<calkit::Error> for Error {
    fn from(err: calkit::Error) -> Self {
        Error::Client(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::UserData(err)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}
