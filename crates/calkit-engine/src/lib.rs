//! High-level workflow operations for Calibre libraries.
//!
//! This crate provides ergonomic, high-level operations built on top of the
//! [`calkit`] client library. While `calkit` provides direct bindings to
//! `calibredb`, `ebook-convert` and `metadata.db`, `calkit-engine` combines
//! those primitives into cohesive workflows.
//!
//! # Quick Start
//!
//! ```no_run
//! use calkit_engine::Engine;
//! use calkit::SearchQuery;
//!
//! # async fn example() -> calkit_engine::Result<()> {
//! let engine = Engine::new("/home/me/Calibre Library");
//!
//! // High-level workflows
//! let page = engine.search().books(&SearchQuery::new().author("Doyle")).await?;
//! println!("{} matches", page.total);
//!
//! // Direct client access when needed
//! engine.client().check().await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Feature Flags
//!
//! All workflow modules are enabled by default. Disable with:
//!
//! ```toml
//! [dependencies]
//! calkit-engine = { version = "0.1", default-features = false, features = ["search"] }
//! ```
//!
//! Available features:
//! - `search` - Filtered book search, listing and lookup
//! - `metadata` - Metadata editing, tag grooming, consistency fixes
//! - `export` - Exporting books and whole libraries to a directory
//! - `convert` - Format conversion via ebook-convert
//! - `analyze` - Tag/series statistics, library health, reading stats
//! - `duplicates` - Similarity-based duplicate book detection
//! - `viewer` - In-memory viewer sessions with zip-container pagination
//! - `userdata` - Project-owned user comments and extended metadata
//! - `libraries` - Multi-library discovery and statistics

mod error;

#[cfg(feature = "analyze")]
pub mod analyze;

#[cfg(feature = "convert")]
pub mod convert;

#[cfg(feature = "duplicates")]
pub mod duplicates;

#[cfg(feature = "export")]
pub mod export;

#[cfg(feature = "libraries")]
pub mod libraries;

#[cfg(feature = "metadata")]
pub mod metadata;

#[cfg(feature = "search")]
pub mod search;

#[cfg(feature = "userdata")]
pub mod userdata;

#[cfg(feature = "viewer")]
pub mod viewer;

pub use error::{Error, Result};

// Re-export calkit types for convenience
pub use calkit::{
    Author, Book, BookDetails, BookFile, CalibreClient, ClientBuilder, FtsHit, LetterCount,
    LibraryStats, Publisher, SearchPage, SearchQuery, Series, Tag,
};

use std::path::PathBuf;

#[cfg(feature = "analyze")]
use analyze::AnalyzeEngine;

#[cfg(feature = "convert")]
use convert::ConvertEngine;

#[cfg(feature = "duplicates")]
use duplicates::DuplicateEngine;

#[cfg(feature = "export")]
use export::ExportEngine;

#[cfg(feature = "libraries")]
use libraries::LibraryEngine;

#[cfg(feature = "metadata")]
use metadata::MetadataEngine;

#[cfg(feature = "search")]
use search::SearchEngine;

#[cfg(feature = "userdata")]
use userdata::UserDataEngine;

#[cfg(feature = "viewer")]
use viewer::ViewerEngine;

/// High-level workflow engine for one Calibre library.
///
/// The engine wraps a [`CalibreClient`] and provides access to workflow
/// modules that combine client primitives into cohesive operations.
///
/// # Example
///
/// ```no_run
/// use calkit_engine::Engine;
///
/// # async fn example() -> calkit_engine::Result<()> {
/// // Create with default client settings
/// let engine = Engine::new("/books");
///
/// // Or with a custom client
/// let client = calkit_engine::CalibreClient::builder()
///     .library_path("/books")
///     .calibredb_bin("/opt/calibre/calibredb")
///     .build();
/// let engine = Engine::from_client(client);
///
/// let stats = engine.libraries().stats().await?;
/// println!("{} books", stats.total_books);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Engine {
    client: CalibreClient,
    /// Override for the user-data database location (tests, containers).
    user_data_path: Option<PathBuf>,
    #[cfg(feature = "viewer")]
    viewer: ViewerEngine,
}

impl Engine {
    /// Create a new engine for the library at `library_path`.
    pub fn new(library_path: impl Into<PathBuf>) -> Self {
        Self::from_client(CalibreClient::new(library_path.into()))
    }

    /// Create an engine from an existing client.
    pub fn from_client(client: CalibreClient) -> Self {
        Self {
            client,
            user_data_path: None,
            #[cfg(feature = "viewer")]
            viewer: ViewerEngine::new(),
        }
    }

    /// Store the project-owned user data database at `path` instead of the
    /// platform data directory.
    pub fn with_user_data_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.user_data_path = Some(path.into());
        self
    }

    /// Get a reference to the underlying client.
    ///
    /// Use this for direct access when workflows don't cover your use case.
    pub fn client(&self) -> &CalibreClient {
        &self.client
    }

    /// Access search workflows.
    #[cfg(feature = "search")]
    pub fn search(&self) -> SearchEngine<'_> {
        SearchEngine::new(&self.client)
    }

    /// Access metadata workflows.
    ///
    /// Provides field updates, tag grooming and consistency fixes.
    #[cfg(feature = "metadata")]
    pub fn metadata(&self) -> MetadataEngine<'_> {
        MetadataEngine::new(&self.client)
    }

    /// Access export workflows.
    #[cfg(feature = "export")]
    pub fn export(&self) -> ExportEngine<'_> {
        ExportEngine::new(&self.client)
    }

    /// Access format conversion workflows.
    #[cfg(feature = "convert")]
    pub fn convert(&self) -> ConvertEngine<'_> {
        ConvertEngine::new(&self.client)
    }

    /// Access analysis workflows.
    ///
    /// Provides tag statistics, series completeness, library health and
    /// reading statistics.
    #[cfg(feature = "analyze")]
    pub fn analyze(&self) -> AnalyzeEngine<'_> {
        AnalyzeEngine::new(&self.client)
    }

    /// Access duplicate detection.
    #[cfg(feature = "duplicates")]
    pub fn duplicates(&self) -> DuplicateEngine<'_> {
        DuplicateEngine::new(&self.client)
    }

    /// Access viewer sessions.
    ///
    /// Sessions live in memory for the lifetime of this engine (clones
    /// share them).
    #[cfg(feature = "viewer")]
    pub fn viewer(&self) -> viewer::ViewerContext<'_> {
        self.viewer.with_client(&self.client)
    }

    /// Access the project-owned user data store (user comments, extended
    /// metadata).
    #[cfg(feature = "userdata")]
    pub fn userdata(&self) -> UserDataEngine<'_> {
        UserDataEngine::new(&self.client, self.user_data_path.as_deref())
    }

    /// Access multi-library discovery and statistics.
    #[cfg(feature = "libraries")]
    pub fn libraries(&self) -> LibraryEngine<'_> {
        LibraryEngine::new(&self.client)
    }
}
