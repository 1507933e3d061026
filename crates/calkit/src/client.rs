//! The Calibre client and builder.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::actions::{BookActions, ConvertActions, ExportActions};
use crate::command::{CommandOutput, ProcessRunner};
use crate::db::LibraryDb;
use crate::error::{Error, Result};

/// Default name of the calibredb binary.
const DEFAULT_CALIBREDB_BIN: &str = "calibredb";

/// Default name of the ebook-convert binary.
const DEFAULT_CONVERT_BIN: &str = "ebook-convert";

/// Default timeout for subprocess invocations. Conversions of large books
/// can legitimately take minutes.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// The main client for interacting with a Calibre library.
///
/// # Example
///
/// ```no_run
/// use calkit::CalibreClient;
///
/// # async fn example() -> calkit::Result<()> {
/// let client = CalibreClient::builder()
///     .library_path("/home/me/Calibre Library")
///     .build();
///
/// let ids = client.books().search("tags:fiction", Some(10)).await?;
/// println!("found {} books", ids.len());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct CalibreClient {
    library_path: PathBuf,
    calibredb_bin: String,
    convert_bin: String,
    runner: ProcessRunner,
    // Opened lazily on first database() call, shared across clones.
    db: Arc<Mutex<Option<LibraryDb>>>,
}

impl CalibreClient {
    /// Create a client for the given library with default settings.
    pub fn new(library_path: impl Into<PathBuf>) -> Self {
        Self::builder().library_path(library_path).build()
    }

    /// Create a builder for custom client configuration.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// The library directory this client points at.
    pub fn library_path(&self) -> &Path {
        &self.library_path
    }

    /// Access book operations backed by `calibredb`.
    pub fn books(&self) -> BookActions<'_> {
        BookActions { client: self }
    }

    /// Access export operations backed by `calibredb export`.
    pub fn export(&self) -> ExportActions<'_> {
        ExportActions { client: self }
    }

    /// Access format conversion backed by `ebook-convert`.
    pub fn convert(&self) -> ConvertActions<'_> {
        ConvertActions { client: self }
    }

    /// Open (or reuse) the direct SQLite handle on this library's
    /// `metadata.db`.
    ///
    /// Fails with [`Error::LibraryNotFound`] when the directory holds no
    /// `metadata.db`.
    pub fn database(&self) -> Result<LibraryDb> {
        let mut cached = self.db.lock().expect("library db cache poisoned");
        if let Some(db) = cached.as_ref() {
            return Ok(db.clone());
        }
        let db = LibraryDb::open(&self.library_path)?;
        *cached = Some(db.clone());
        Ok(db)
    }

    /// Run a `calibredb` subcommand against this library.
    ///
    /// `--library-path` is appended for every invocation, the way every
    /// other argument is caller-provided.
    pub(crate) async fn run_calibredb(&self, args: &[String]) -> Result<CommandOutput> {
        let mut full = args.to_vec();
        full.push("--library-path".to_string());
        full.push(self.library_path.to_string_lossy().into_owned());
        self.runner.run(&self.calibredb_bin, &full).await
    }

    /// Run `ebook-convert` with the given arguments.
    pub(crate) async fn run_convert(&self, args: &[String]) -> Result<CommandOutput> {
        self.runner.run(&self.convert_bin, args).await
    }

    /// Probe the library: checks that `metadata.db` exists and that
    /// `calibredb` answers a trivial listing.
    pub async fn check(&self) -> Result<()> {
        if !self.library_path.join("metadata.db").exists() {
            return Err(Error::LibraryNotFound(self.library_path.clone()));
        }
        self.run_calibredb(&[
            "list".to_string(),
            "--limit".to_string(),
            "1".to_string(),
        ])
        .await?;
        Ok(())
    }
}

/// Builder for creating a customized [`CalibreClient`].
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
/// use calkit::CalibreClient;
///
/// let client = CalibreClient::builder()
///     .library_path("/books")
///     .calibredb_bin("/opt/calibre/calibredb")
///     .timeout(Duration::from_secs(60))
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct ClientBuilder {
    library_path: PathBuf,
    calibredb_bin: String,
    convert_bin: String,
    timeout: Duration,
}

impl ClientBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self {
            library_path: PathBuf::new(),
            calibredb_bin: DEFAULT_CALIBREDB_BIN.to_string(),
            convert_bin: DEFAULT_CONVERT_BIN.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Set the library directory (the one containing `metadata.db`).
    pub fn library_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.library_path = path.into();
        self
    }

    /// Override the `calibredb` binary name or path.
    pub fn calibredb_bin(mut self, bin: impl Into<String>) -> Self {
        self.calibredb_bin = bin.into();
        self
    }

    /// Override the `ebook-convert` binary name or path.
    pub fn convert_bin(mut self, bin: impl Into<String>) -> Self {
        self.convert_bin = bin.into();
        self
    }

    /// Set the subprocess timeout.
    ///
    /// Defaults to 300 seconds.
    pub fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = duration;
        self
    }

    /// Build the client.
    pub fn build(self) -> CalibreClient {
        CalibreClient {
            library_path: self.library_path,
            calibredb_bin: self.calibredb_bin,
            convert_bin: self.convert_bin,
            runner: ProcessRunner::new(self.timeout),
            db: Arc::new(Mutex::new(None)),
        }
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
