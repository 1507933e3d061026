//! Multi-library discovery and statistics.
//!
//! Libraries are plain directories containing a `metadata.db`; discovery
//! scans the immediate children of a base directory. Switching the active
//! library is the server's concern (it owns the engine), so this module
//! only finds and describes libraries.

use std::path::{Path, PathBuf};

use calkit::{CalibreClient, LibraryDb, LibraryStats};
use serde::Serialize;

use crate::{Error, Result};

/// One discovered library.
#[derive(Debug, Clone, Serialize)]
pub struct LibraryInfo {
    /// Directory name.
    pub name: String,
    pub path: PathBuf,
    /// None when the database could not be opened.
    pub book_count: Option<i64>,
    /// Whether this is the engine's active library.
    pub current: bool,
}

/// Library workflow engine.
#[derive(Debug)]
pub struct LibraryEngine<'a> {
    client: &'a CalibreClient,
}

impl<'a> LibraryEngine<'a> {
    pub(crate) fn new(client: &'a CalibreClient) -> Self {
        Self { client }
    }

    /// Find Calibre libraries directly under `base_dir`.
    ///
    /// The active library is included even when it lives elsewhere.
    pub async fn discover(&self, base_dir: &Path) -> Result<Vec<LibraryInfo>> {
        let current_path = self.client.library_path().to_path_buf();
        let mut libraries = Vec::new();

        for entry in std::fs::read_dir(base_dir)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_dir() || !path.join("metadata.db").exists() {
                continue;
            }
            libraries.push(describe(&path, same_dir(&path, &current_path)).await);
        }
        libraries.sort_by(|a, b| a.name.cmp(&b.name));

        if !libraries.iter().any(|l| l.current) && current_path.join("metadata.db").exists() {
            libraries.insert(0, describe(&current_path, true).await);
        }

        if libraries.is_empty() {
            return Err(Error::NoLibrariesFound(base_dir.to_path_buf()));
        }
        Ok(libraries)
    }

    /// Describe the active library.
    pub async fn current(&self) -> Result<LibraryInfo> {
        let path = self.client.library_path().to_path_buf();
        if !path.join("metadata.db").exists() {
            return Err(Error::Client(calkit::Error::LibraryNotFound(path)));
        }
        Ok(describe(&path, true).await)
    }

    /// Aggregate statistics for the active library.
    pub async fn stats(&self) -> Result<LibraryStats> {
        Ok(self
            .client
            .database()?
            .stats()
            .library_stats(10)
            .await?)
    }
}

/// Compare two library paths, tolerating unnormalized spellings.
fn same_dir(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

async fn describe(path: &Path, current: bool) -> LibraryInfo {
    let book_count = match LibraryDb::open(path) {
        Ok(db) => db.books().count().await.ok(),
        Err(_) => None,
    };
    LibraryInfo {
        name: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string()),
        path: path.to_path_buf(),
        book_count,
        current,
    }
}
