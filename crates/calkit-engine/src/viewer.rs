//! In-memory viewer sessions.
//!
//! A session pins one book file and, for zip-container formats (CBZ comics,
//! EPUB), a sorted page list. Page requests extract the entry to a temp
//! file and hand back its path; rendering is the caller's business (the
//! web frontend uses its own readers). State tracks the current page and
//! zoom so a reconnecting client can resume.
//!
//! Sessions live for the lifetime of the [`crate::Engine`] that opened
//! them; clones of the engine share the session table.

use std::collections::HashMap;
use std::io::Read;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use calkit::{BookDetails, CalibreClient};
use serde::Serialize;

use crate::{Error, Result};

/// Formats the viewer prefers when the caller doesn't pick one.
const VIEW_PREFERENCE: &[&str] = &["CBZ", "EPUB", "PDF"];

/// Image entries that count as comic pages.
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "bmp"];

/// Document entries that count as EPUB pages.
const DOCUMENT_EXTENSIONS: &[&str] = &["xhtml", "html", "htm"];

/// Zoom bounds for [`ViewerContext::update_state`].
const MIN_ZOOM: f64 = 0.1;
const MAX_ZOOM: f64 = 8.0;

/// Client-visible viewer state.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ViewerState {
    /// Current page, zero-based.
    pub page: usize,
    pub zoom: f64,
}

impl Default for ViewerState {
    fn default() -> Self {
        Self { page: 0, zoom: 1.0 }
    }
}

/// Summary of an open session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub session_id: String,
    pub book_id: i64,
    pub title: String,
    pub format: String,
    /// The book file backing the session.
    pub path: PathBuf,
    pub page_count: usize,
    /// False for formats the viewer cannot split into pages.
    pub paginated: bool,
    pub state: ViewerState,
}

/// One extracted page.
#[derive(Debug, Clone, Serialize)]
pub struct PageContent {
    pub index: usize,
    /// Entry name inside the container.
    pub name: String,
    /// Temp file holding the extracted bytes.
    pub path: PathBuf,
    pub size: u64,
}

#[derive(Debug)]
struct ViewerSession {
    book_id: i64,
    title: String,
    format: String,
    path: PathBuf,
    pages: Vec<String>,
    state: ViewerState,
}

impl ViewerSession {
    fn info(&self, session_id: &str) -> SessionInfo {
        SessionInfo {
            session_id: session_id.to_string(),
            book_id: self.book_id,
            title: self.title.clone(),
            format: self.format.clone(),
            path: self.path.clone(),
            page_count: self.pages.len(),
            paginated: !self.pages.is_empty(),
            state: self.state,
        }
    }
}

/// Owns the session table. Lives inside [`crate::Engine`].
#[derive(Debug, Clone)]
pub struct ViewerEngine {
    sessions: Arc<Mutex<HashMap<String, ViewerSession>>>,
}

impl ViewerEngine {
    pub(crate) fn new() -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub(crate) fn with_client<'a>(&'a self, client: &'a CalibreClient) -> ViewerContext<'a> {
        ViewerContext {
            client,
            sessions: &self.sessions,
        }
    }
}

/// Viewer operations bound to a client.
///
/// Obtained via [`crate::Engine::viewer()`].
#[derive(Debug)]
pub struct ViewerContext<'a> {
    client: &'a CalibreClient,
    sessions: &'a Arc<Mutex<HashMap<String, ViewerSession>>>,
}

impl<'a> ViewerContext<'a> {
    /// Open a viewer session for a book.
    ///
    /// Picks the most viewer-friendly format unless one is requested. CBR
    /// is rejected: there is no rar support, and silently opening it
    /// unpaginated would masquerade as success.
    pub async fn open(&self, book_id: i64, format: Option<&str>) -> Result<SessionInfo> {
        let details = self.client.database()?.books().details(book_id).await?;
        let available: Vec<String> = details.files.iter().map(|f| f.format.clone()).collect();

        let format = match format {
            Some(f) => f.to_uppercase(),
            None => pick_view_format(&available).ok_or(Error::Client(
                calkit::Error::FormatNotFound {
                    book_id,
                    format: "any".to_string(),
                },
            ))?,
        };
        if format == "CBR" {
            return Err(Error::UnsupportedViewerFormat(format));
        }

        let path = self
            .client
            .database()?
            .books()
            .format_path(book_id, &format)
            .await?;

        let pages = if is_zip_container(&format) {
            let path = path.clone();
            let format = format.clone();
            tokio::task::spawn_blocking(move || list_pages(&path, &format))
                .await
                .expect("page listing task panicked")?
        } else {
            Vec::new()
        };

        let session_id = uuid::Uuid::new_v4().to_string();
        let session = ViewerSession {
            book_id,
            title: details.book.title.clone(),
            format,
            path,
            pages,
            state: ViewerState::default(),
        };
        let info = session.info(&session_id);
        self.sessions
            .lock()
            .expect("viewer sessions poisoned")
            .insert(session_id, session);
        Ok(info)
    }

    /// Open a random book from the library.
    pub async fn open_random(&self) -> Result<SessionInfo> {
        let book = self
            .client
            .database()?
            .books()
            .random()
            .await?
            .ok_or_else(|| Error::Validation("library is empty".to_string()))?;
        self.open(book.id, None).await
    }

    /// Extract one page to a temp file.
    pub async fn get_page(&self, session_id: &str, page: usize) -> Result<PageContent> {
        let (path, name) = {
            let sessions = self.sessions.lock().expect("viewer sessions poisoned");
            let session = sessions
                .get(session_id)
                .ok_or_else(|| Error::SessionNotFound(session_id.to_string()))?;
            if session.pages.is_empty() {
                return Err(Error::UnsupportedViewerFormat(session.format.clone()));
            }
            let name = session
                .pages
                .get(page)
                .ok_or(Error::PageOutOfRange {
                    page,
                    pages: session.pages.len(),
                })?
                .clone();
            (session.path.clone(), name)
        };

        let out_dir = std::env::temp_dir().join("calkit-viewer").join(session_id);
        let entry_name = name.clone();
        let (page_path, size) = tokio::task::spawn_blocking(move || -> Result<(PathBuf, u64)> {
            std::fs::create_dir_all(&out_dir)?;
            let file = std::fs::File::open(&path)?;
            let mut archive = zip::ZipArchive::new(file)
                .map_err(|e| Error::Validation(format!("unreadable container: {}", e)))?;
            let mut entry = archive
                .by_name(&entry_name)
                .map_err(|e| Error::Validation(format!("missing page entry: {}", e)))?;
            let mut bytes = Vec::with_capacity(entry.size() as usize);
            entry.read_to_end(&mut bytes)?;

            let file_name = entry_name.rsplit('/').next().unwrap_or(&entry_name);
            let out_path = out_dir.join(file_name);
            std::fs::write(&out_path, &bytes)?;
            Ok((out_path, bytes.len() as u64))
        })
        .await
        .expect("page extraction task panicked")?;

        // Track progress the way a reader turning pages would expect.
        if let Ok(mut sessions) = self.sessions.lock() {
            if let Some(session) = sessions.get_mut(session_id) {
                session.state.page = page;
            }
        }

        Ok(PageContent {
            index: page,
            name,
            path: page_path,
            size,
        })
    }

    /// Full metadata for the session's book.
    pub async fn get_metadata(&self, session_id: &str) -> Result<BookDetails> {
        let book_id = {
            let sessions = self.sessions.lock().expect("viewer sessions poisoned");
            sessions
                .get(session_id)
                .map(|s| s.book_id)
                .ok_or_else(|| Error::SessionNotFound(session_id.to_string()))?
        };
        Ok(self.client.database()?.books().details(book_id).await?)
    }

    /// Current session summary and state.
    pub fn get_state(&self, session_id: &str) -> Result<SessionInfo> {
        let sessions = self.sessions.lock().expect("viewer sessions poisoned");
        sessions
            .get(session_id)
            .map(|s| s.info(session_id))
            .ok_or_else(|| Error::SessionNotFound(session_id.to_string()))
    }

    /// Update page and/or zoom, clamped to valid ranges.
    pub fn update_state(
        &self,
        session_id: &str,
        page: Option<usize>,
        zoom: Option<f64>,
    ) -> Result<ViewerState> {
        let mut sessions = self.sessions.lock().expect("viewer sessions poisoned");
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| Error::SessionNotFound(session_id.to_string()))?;

        if let Some(page) = page {
            let max = session.pages.len().saturating_sub(1);
            session.state.page = page.min(max);
        }
        if let Some(zoom) = zoom {
            session.state.zoom = zoom.clamp(MIN_ZOOM, MAX_ZOOM);
        }
        Ok(session.state)
    }

    /// Close a session. Returns whether it existed.
    pub fn close(&self, session_id: &str) -> bool {
        self.sessions
            .lock()
            .expect("viewer sessions poisoned")
            .remove(session_id)
            .is_some()
    }

    /// Ids of all open sessions.
    pub fn open_sessions(&self) -> Vec<String> {
        self.sessions
            .lock()
            .expect("viewer sessions poisoned")
            .keys()
            .cloned()
            .collect()
    }
}

fn is_zip_container(format: &str) -> bool {
    matches!(format, "CBZ" | "EPUB" | "ZIP")
}

/// Choose the format to view, skipping CBR (no rar support).
fn pick_view_format(available: &[String]) -> Option<String> {
    for preferred in VIEW_PREFERENCE {
        if let Some(found) = available.iter().find(|a| a.eq_ignore_ascii_case(preferred)) {
            return Some(found.to_uppercase());
        }
    }
    available
        .iter()
        .find(|f| !f.eq_ignore_ascii_case("CBR"))
        .map(|f| f.to_uppercase())
}

/// List the page entries of a zip container, sorted by name.
fn list_pages(path: &std::path::Path, format: &str) -> Result<Vec<String>> {
    let file = std::fs::File::open(path)?;
    let archive = zip::ZipArchive::new(file)
        .map_err(|e| Error::Validation(format!("unreadable container: {}", e)))?;

    let wanted: &[&str] = if format == "EPUB" {
        DOCUMENT_EXTENSIONS
    } else {
        IMAGE_EXTENSIONS
    };

    let mut pages: Vec<String> = archive
        .file_names()
        .filter(|name| {
            let ext = name.rsplit('.').next().unwrap_or("").to_lowercase();
            wanted.contains(&ext.as_str()) && !name.ends_with('/')
        })
        .map(String::from)
        .collect();
    pages.sort();
    Ok(pages)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn view_format_prefers_comics_then_epub() {
        let available = vec!["PDF".to_string(), "EPUB".to_string(), "CBZ".to_string()];
        assert_eq!(pick_view_format(&available).as_deref(), Some("CBZ"));

        let available = vec!["pdf".to_string(), "epub".to_string()];
        assert_eq!(pick_view_format(&available).as_deref(), Some("EPUB"));
    }

    #[test]
    fn cbr_is_never_auto_picked() {
        let available = vec!["CBR".to_string(), "MOBI".to_string()];
        assert_eq!(pick_view_format(&available).as_deref(), Some("MOBI"));
        assert_eq!(pick_view_format(&["CBR".to_string()]), None);
    }

    #[test]
    fn zip_containers() {
        assert!(is_zip_container("CBZ"));
        assert!(is_zip_container("EPUB"));
        assert!(!is_zip_container("PDF"));
    }
}
