//! Shared state for the Calibre MCP server.

use std::path::{Path, PathBuf};
use std::time::Duration;

use calkit_engine::{CalibreClient, Engine};
use rmcp::ErrorData as McpError;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Server-wide state: the active engine plus the settings needed to build a
/// replacement when the library is switched.
pub struct ServerState {
    engine: RwLock<Engine>,
    /// Parent directory scanned for libraries by `manage_libraries`.
    pub base_library_dir: Option<PathBuf>,
    /// Whether write operations are blocked.
    pub read_only: bool,
    calibredb_bin: String,
    convert_bin: String,
    timeout: Duration,
    user_data_path: Option<PathBuf>,
}

impl ServerState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        library_path: PathBuf,
        base_library_dir: Option<PathBuf>,
        calibredb_bin: String,
        convert_bin: String,
        timeout: Duration,
        user_data_path: Option<PathBuf>,
        read_only: bool,
    ) -> Self {
        let engine = build_engine(
            &library_path,
            &calibredb_bin,
            &convert_bin,
            timeout,
            user_data_path.as_deref(),
        );
        Self {
            engine: RwLock::new(engine),
            base_library_dir,
            read_only,
            calibredb_bin,
            convert_bin,
            timeout,
            user_data_path,
        }
    }

    /// A handle on the active engine. Engines are cheap to clone and clones
    /// share viewer sessions, so the lock is never held across an await.
    pub async fn engine(&self) -> Engine {
        self.engine.read().await.clone()
    }

    /// Re-point the server at another library.
    ///
    /// Viewer sessions belong to the old library and are dropped with it.
    pub async fn switch_library(&self, path: &Path) -> Result<(), calkit::Error> {
        if !path.join("metadata.db").exists() {
            return Err(calkit::Error::LibraryNotFound(path.to_path_buf()));
        }
        let engine = build_engine(
            path,
            &self.calibredb_bin,
            &self.convert_bin,
            self.timeout,
            self.user_data_path.as_deref(),
        );
        *self.engine.write().await = engine;
        info!(library = %path.display(), "Switched active library");
        Ok(())
    }

    /// Check if a write operation is allowed.
    ///
    /// Returns an error if the server is in read-only mode.
    pub fn check_write(&self, operation: &str) -> Result<(), McpError> {
        if self.read_only {
            warn!("Blocked write operation in read-only mode: {}", operation);
            Err(McpError::invalid_request(
                format!(
                    "Write operation '{}' is not allowed in read-only mode",
                    operation
                ),
                None,
            ))
        } else {
            Ok(())
        }
    }
}

fn build_engine(
    library_path: &Path,
    calibredb_bin: &str,
    convert_bin: &str,
    timeout: Duration,
    user_data_path: Option<&Path>,
) -> Engine {
    let client = CalibreClient::builder()
        .library_path(library_path)
        .calibredb_bin(calibredb_bin)
        .convert_bin(convert_bin)
        .timeout(timeout)
        .build();
    let mut engine = Engine::from_client(client);
    if let Some(path) = user_data_path {
        engine = engine.with_user_data_path(path);
    }
    engine
}
