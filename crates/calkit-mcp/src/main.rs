//! MCP server for Calibre ebook library management.
//!
//! This server exposes calkit-engine workflows as portmanteau tools for LLM
//! assistants: each tool covers one domain (books, metadata, viewer, ...)
//! and takes an `operation` selector, keeping the registered tool count
//! small. In HTTP mode a REST mirror of the same workflows is mounted next
//! to the MCP endpoint for the companion web frontend.

mod rest;
mod state;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use calkit::SearchQuery;
use calkit_engine::duplicates::DuplicateCriteria;
use calkit_engine::metadata::MetadataUpdate;
use calkit_engine::Engine;
use chrono::NaiveDate;
use clap::Parser;
use rmcp::{
    ErrorData as McpError, ServerHandler, ServiceExt,
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::*,
    schemars, tool, tool_handler, tool_router,
};
use tracing::{debug, info};

use crate::state::ServerState;

// ============================================================================
// CLI Arguments
// ============================================================================

/// MCP server for Calibre ebook library management.
#[derive(Parser, Debug)]
#[command(name = "calkit-mcp")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the Calibre library directory (contains metadata.db)
    #[arg(long, env = "CALIBRE_LIBRARY_PATH")]
    library_path: PathBuf,

    /// Directory whose subdirectories are scanned for additional libraries
    #[arg(long, env = "CALIBRE_BASE_PATH")]
    base_library_dir: Option<PathBuf>,

    /// Name or path of the calibredb binary
    #[arg(long, default_value = "calibredb", env = "CALIBREDB_BIN")]
    calibredb_bin: String,

    /// Name or path of the ebook-convert binary
    #[arg(long, default_value = "ebook-convert", env = "EBOOK_CONVERT_BIN")]
    convert_bin: String,

    /// Subprocess timeout in seconds
    #[arg(long, default_value_t = 300)]
    timeout: u64,

    /// Location of the server's own user-data database
    #[arg(long, env = "CALKIT_USER_DATA_DB")]
    user_data_db: Option<PathBuf>,

    /// Read-only mode (disables write operations)
    #[arg(long, default_value_t = false)]
    read_only: bool,

    /// Enable verbose logging (use multiple times for more verbosity)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Transport mode: stdio (default) or http
    #[arg(long, default_value = "stdio")]
    transport: Transport,

    /// HTTP server port (only used with --transport http)
    #[arg(long, default_value_t = 3000)]
    http_port: u16,

    /// HTTP server bind address (only used with --transport http)
    #[arg(long, default_value = "127.0.0.1")]
    http_host: String,
}

/// Transport mode for the MCP server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Transport {
    /// Standard I/O transport (default, for CLI integration)
    #[default]
    Stdio,
    /// HTTP transport with the REST API mounted alongside
    Http,
}

impl std::str::FromStr for Transport {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "stdio" => Ok(Transport::Stdio),
            "http" => Ok(Transport::Http),
            _ => Err(format!("Invalid transport: {}. Use 'stdio' or 'http'", s)),
        }
    }
}

// ============================================================================
// Parameter Types
// ============================================================================

fn default_limit() -> i64 {
    50
}

fn default_analysis_limit() -> usize {
    20
}

fn default_similarity() -> f64 {
    0.85
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
enum QueryBooksOperation {
    /// Filtered search; the primary operation for any "find/list/get books
    /// by X" request
    Search,
    /// All books, paginated, no filters
    List,
    /// Books by numeric author id
    ByAuthor,
    /// Books in a series by numeric series id
    BySeries,
}

#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
struct QueryBooksParams {
    /// The operation to perform
    operation: QueryBooksOperation,
    /// Author name filter, case-insensitive substring (for 'search')
    #[serde(default)]
    author: Option<String>,
    /// Any-of author names (for 'search')
    #[serde(default)]
    authors: Vec<String>,
    /// Exclude books by these authors (for 'search')
    #[serde(default)]
    exclude_authors: Vec<String>,
    /// Author id (required for 'by_author')
    #[serde(default)]
    author_id: Option<i64>,
    /// Series id (required for 'by_series')
    #[serde(default)]
    series_id: Option<i64>,
    /// Series name filter (for 'search')
    #[serde(default)]
    series: Option<String>,
    /// Exclude books in these series (for 'search')
    #[serde(default)]
    exclude_series: Vec<String>,
    /// Free text matched against title, authors, tags, series and comments
    #[serde(default)]
    text: Option<String>,
    /// Exact tag name (for 'search')
    #[serde(default)]
    tag: Option<String>,
    /// All-of tag names (for 'search')
    #[serde(default)]
    tags: Vec<String>,
    /// Exclude books with these tags (for 'search')
    #[serde(default)]
    exclude_tags: Vec<String>,
    /// Publisher name filter (for 'search')
    #[serde(default)]
    publisher: Option<String>,
    /// Any-of publisher names (for 'search')
    #[serde(default)]
    publishers: Vec<String>,
    /// true = only books with a publisher, false = only books without
    #[serde(default)]
    has_publisher: Option<bool>,
    /// Exact rating in stars 1-5 (for 'search')
    #[serde(default)]
    rating: Option<i64>,
    /// Minimum rating in stars (for 'search')
    #[serde(default)]
    min_rating: Option<i64>,
    /// Maximum rating in stars (for 'search')
    #[serde(default)]
    max_rating: Option<i64>,
    /// Only unrated books (for 'search')
    #[serde(default)]
    unrated: bool,
    /// Publication date range start, YYYY-MM-DD (for 'search')
    #[serde(default)]
    pubdate_start: Option<String>,
    /// Publication date range end, YYYY-MM-DD (for 'search')
    #[serde(default)]
    pubdate_end: Option<String>,
    /// Added-to-library date lower bound, YYYY-MM-DD (for 'search')
    #[serde(default)]
    added_after: Option<String>,
    /// Added-to-library date upper bound, YYYY-MM-DD (for 'search')
    #[serde(default)]
    added_before: Option<String>,
    /// Minimum stored file size in bytes (for 'search')
    #[serde(default)]
    min_size: Option<i64>,
    /// Maximum stored file size in bytes (for 'search')
    #[serde(default)]
    max_size: Option<i64>,
    /// Any-of format names, e.g. ["EPUB", "PDF"] (for 'search')
    #[serde(default)]
    formats: Vec<String>,
    /// Substring matched against the comments field only (for 'search')
    #[serde(default)]
    comment: Option<String>,
    /// true = books with empty comments, false = books with comments
    #[serde(default)]
    has_empty_comments: Option<bool>,
    /// Maximum results to return
    #[serde(default = "default_limit")]
    limit: i64,
    /// Results offset for pagination
    #[serde(default)]
    offset: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
enum ManageBooksOperation {
    /// Add a book file to the library
    Add,
    /// Fetch one book's core metadata
    Get,
    /// Fetch one book with comments, identifiers and files
    Details,
    /// Update metadata fields via calibredb
    Update,
    /// Remove a book from the library
    Delete,
}

#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
struct ManageBooksParams {
    /// The operation to perform
    operation: ManageBooksOperation,
    /// Book id (required for get/details/update/delete)
    #[serde(default)]
    book_id: Option<i64>,
    /// Path of the file to add (required for 'add')
    #[serde(default)]
    file_path: Option<String>,
    /// Title override (for 'add')
    #[serde(default)]
    title: Option<String>,
    /// Author string, '&'-separated for multiple authors (for 'add')
    #[serde(default)]
    authors: Option<String>,
    /// Comma-separated tags (for 'add')
    #[serde(default)]
    tags: Option<String>,
    /// Series name (for 'add')
    #[serde(default)]
    series: Option<String>,
    /// Position within the series (for 'add')
    #[serde(default)]
    series_index: Option<f64>,
    /// ISBN (for 'add')
    #[serde(default)]
    isbn: Option<String>,
    /// Add even when Calibre considers the book a duplicate (for 'add')
    #[serde(default)]
    allow_duplicates: bool,
    /// Calibre field name to value map (required for 'update')
    #[serde(default)]
    fields: Option<HashMap<String, String>>,
    /// Skip the recycle bin when deleting (for 'delete')
    #[serde(default)]
    permanent: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
enum ManageMetadataOperation {
    /// Full metadata for one book
    Show,
    /// Apply a typed metadata update
    Update,
    /// Find (and optionally merge) near-duplicate tags
    OrganizeTags,
    /// Scan for (and optionally fix) metadata problems
    FixIssues,
}

#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
struct ManageMetadataParams {
    /// The operation to perform
    operation: ManageMetadataOperation,
    /// Book id (required for show/update)
    #[serde(default)]
    book_id: Option<i64>,
    /// New title (for 'update')
    #[serde(default)]
    title: Option<String>,
    /// New author string, '&'-separated (for 'update')
    #[serde(default)]
    authors: Option<String>,
    /// Replacement tag list (for 'update')
    #[serde(default)]
    tags: Option<Vec<String>>,
    /// New publisher (for 'update')
    #[serde(default)]
    publisher: Option<String>,
    /// New rating in stars 0-5; 0 clears (for 'update')
    #[serde(default)]
    rating: Option<i64>,
    /// New series name (for 'update')
    #[serde(default)]
    series: Option<String>,
    /// New series position (for 'update')
    #[serde(default)]
    series_index: Option<f64>,
    /// New comments/description HTML (for 'update')
    #[serde(default)]
    comments: Option<String>,
    /// New ISBN (for 'update')
    #[serde(default)]
    isbn: Option<String>,
    /// Apply changes instead of reporting them (organize_tags/fix_issues)
    #[serde(default)]
    apply: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
enum CatalogOperation {
    /// All entries, alphabetical, paginated
    List,
    /// One entry by id
    Get,
    /// Books linked to an entry
    GetBooks,
    /// Totals and the most-used entries
    Stats,
    /// Entry counts per initial letter
    ByLetter,
}

#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
struct CatalogParams {
    /// The operation to perform
    operation: CatalogOperation,
    /// Entry id (required for get/get_books)
    #[serde(default)]
    id: Option<i64>,
    /// Maximum results to return
    #[serde(default = "default_limit")]
    limit: i64,
    /// Results offset for pagination
    #[serde(default)]
    offset: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
enum ManageTagsOperation {
    /// All tags, alphabetical, paginated
    List,
    /// One tag by id
    Get,
    /// Books carrying a tag
    GetBooks,
    /// Totals and the most-used tags
    Stats,
    /// Tag counts per initial letter
    ByLetter,
    /// Rename a tag (merges when the target name exists)
    Rename,
    /// Delete a tag and its links
    Delete,
}

#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
struct ManageTagsParams {
    /// The operation to perform
    operation: ManageTagsOperation,
    /// Tag id (required for get/get_books/rename/delete)
    #[serde(default)]
    tag_id: Option<i64>,
    /// Replacement name (required for 'rename')
    #[serde(default)]
    new_name: Option<String>,
    /// Maximum results to return
    #[serde(default = "default_limit")]
    limit: i64,
    /// Results offset for pagination
    #[serde(default)]
    offset: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
enum ManageCommentsOperation {
    /// Set the comment (alias of 'update')
    Create,
    /// Read the comment
    Read,
    /// Replace the comment
    Update,
    /// Append a paragraph to the comment
    Append,
    /// Delete the comment
    Delete,
}

#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
struct ManageCommentsParams {
    /// The operation to perform
    operation: ManageCommentsOperation,
    /// Book id
    book_id: i64,
    /// Comment text (required for create/update/append)
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
enum UserCommentsOperation {
    /// Create or replace the user's comment
    Upsert,
    /// Read the user's comment
    Read,
    /// Append a paragraph to the user's comment
    Append,
    /// Delete the user's comment
    Delete,
}

#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
struct UserCommentsParams {
    /// The operation to perform
    operation: UserCommentsOperation,
    /// Book id
    book_id: i64,
    /// Comment text (required for upsert/append)
    #[serde(default)]
    text: Option<String>,
    /// Owning user; omit for the anonymous user
    #[serde(default)]
    user_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
enum ExtendedMetadataOperation {
    /// Read extended metadata
    Get,
    /// Set only the translator
    SetTranslator,
    /// Set only the first-published field
    SetFirstPublished,
    /// Set any provided fields, keeping the rest
    Upsert,
    /// Delete the record
    Delete,
}

#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
struct ExtendedMetadataParams {
    /// The operation to perform
    operation: ExtendedMetadataOperation,
    /// Book id
    book_id: i64,
    /// Translator name
    #[serde(default)]
    translator: Option<String>,
    /// First publication of the work, free text ("1599", "44 BC")
    #[serde(default)]
    first_published: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
enum ManageFilesOperation {
    /// Convert one book to another format
    Convert,
    /// Resolve the on-disk file for a stored format
    Download,
    /// Convert several books, collecting per-book failures
    BulkConvert,
}

#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
struct ManageFilesParams {
    /// The operation to perform
    operation: ManageFilesOperation,
    /// Book id (required for convert/download)
    #[serde(default)]
    book_id: Option<i64>,
    /// Book ids (required for 'bulk_convert')
    #[serde(default)]
    book_ids: Vec<i64>,
    /// Target format, e.g. "MOBI" (required for convert/bulk_convert)
    #[serde(default)]
    target_format: Option<String>,
    /// Format to read (for 'download'; optional for 'convert')
    #[serde(default)]
    source_format: Option<String>,
    /// Directory for conversion output (required for convert/bulk_convert)
    #[serde(default)]
    output_dir: Option<String>,
    /// Attach the converted file back onto the book
    #[serde(default)]
    add_to_library: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
enum ExportOperation {
    /// Export selected books
    Books,
    /// Export the whole library
    Library,
}

#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
struct ExportBooksParams {
    /// The operation to perform
    operation: ExportOperation,
    /// Book ids (required for 'books')
    #[serde(default)]
    book_ids: Vec<i64>,
    /// Target directory, created when missing
    to_dir: String,
    /// Restrict to these formats; empty exports everything
    #[serde(default)]
    formats: Vec<String>,
    /// Put all files in one directory instead of per-author trees
    #[serde(default)]
    single_dir: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
enum ManageLibrariesOperation {
    /// Libraries under the base directory
    List,
    /// Re-point the server at another library
    Switch,
    /// Aggregate statistics for the active library
    Stats,
    /// Describe the active library
    Current,
}

#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
struct ManageLibrariesParams {
    /// The operation to perform
    operation: ManageLibrariesOperation,
    /// Library directory, or a name under the base directory (for 'switch')
    #[serde(default)]
    library: Option<String>,
    /// Override the configured base directory (for 'list')
    #[serde(default)]
    base_dir: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
enum ManageViewerOperation {
    /// Open a viewer session for a book
    Open,
    /// Open a random book
    OpenRandom,
    /// Extract one page to a temp file
    GetPage,
    /// Full metadata for the session's book
    GetMetadata,
    /// Current session summary and state
    GetState,
    /// Update current page and/or zoom
    UpdateState,
    /// Close the session
    Close,
}

#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
struct ManageViewerParams {
    /// The operation to perform
    operation: ManageViewerOperation,
    /// Book id (required for 'open')
    #[serde(default)]
    book_id: Option<i64>,
    /// Format to open; picked automatically when omitted (for 'open')
    #[serde(default)]
    format: Option<String>,
    /// Viewer session id (required for everything after open)
    #[serde(default)]
    session_id: Option<String>,
    /// Page index, zero-based (for get_page/update_state)
    #[serde(default)]
    page: Option<usize>,
    /// Zoom factor (for 'update_state')
    #[serde(default)]
    zoom: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
enum AnalysisOperation {
    /// Tag usage breakdown
    TagStatistics,
    /// Similarity-based duplicate detection
    DuplicateBooks,
    /// Series with missing volumes
    SeriesAnalysis,
    /// Problem-book counts and a health score
    LibraryHealth,
    /// Unrated books ranked by shelf time
    UnreadPriority,
    /// Rating coverage and acquisition pace
    ReadingStats,
}

#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
struct ManageAnalysisParams {
    /// The operation to perform
    operation: AnalysisOperation,
    /// Result cap for tag_statistics/unread_priority
    #[serde(default = "default_analysis_limit")]
    limit: usize,
    /// Title similarity threshold for duplicate_books (0-1)
    #[serde(default = "default_similarity")]
    min_title_similarity: f64,
    /// Require a shared author for duplicate_books
    #[serde(default = "default_true")]
    require_author_overlap: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
enum SystemOperation {
    /// Active library, mode and configuration
    Status,
    /// Probe calibredb and the library
    HealthCheck,
    /// Server version
    Version,
}

#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
struct ManageSystemParams {
    /// The operation to perform
    operation: SystemOperation,
}

#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
struct FulltextSearchParams {
    /// FTS5 query over book contents
    query: String,
    /// Maximum hits to return
    #[serde(default = "default_limit")]
    limit: i64,
}

// ============================================================================
// Helpers
// ============================================================================

/// Map an engine error onto the MCP error split: caller mistakes become
/// invalid-params, everything else is internal.
fn engine_error(e: calkit_engine::Error) -> McpError {
    use calkit_engine::Error as E;
    let invalid = matches!(
        &e,
        E::Validation(_)
            | E::SessionNotFound(_)
            | E::PageOutOfRange { .. }
            | E::UnsupportedViewerFormat(_)
            | E::Client(
                calkit::Error::BookNotFound(_)
                    | calkit::Error::EntityNotFound { .. }
                    | calkit::Error::FormatNotFound { .. }
                    | calkit::Error::FtsUnavailable
            )
    );
    if invalid {
        McpError::invalid_params(e.to_string(), None)
    } else {
        McpError::internal_error(e.to_string(), None)
    }
}

fn client_error(e: calkit::Error) -> McpError {
    engine_error(calkit_engine::Error::Client(e))
}

fn json_result<T: serde::Serialize>(value: &T) -> CallToolResult {
    CallToolResult::success(vec![Content::text(
        serde_json::to_string_pretty(value).unwrap(),
    )])
}

fn parse_date(field: &str, value: Option<&str>) -> Result<Option<NaiveDate>, McpError> {
    match value {
        None => Ok(None),
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d").map(Some).map_err(|_| {
            McpError::invalid_params(
                format!("{} must be YYYY-MM-DD, got '{}'", field, s),
                None,
            )
        }),
    }
}

fn require<T>(value: Option<T>, message: &str) -> Result<T, McpError> {
    value.ok_or_else(|| McpError::invalid_params(message.to_string(), None))
}

fn build_search_query(params: &QueryBooksParams) -> Result<SearchQuery, McpError> {
    let mut query = SearchQuery::new();
    query.text = params.text.clone();
    query.author = params.author.clone();
    query.authors = params.authors.clone();
    query.exclude_authors = params.exclude_authors.clone();
    query.series = params.series.clone();
    query.exclude_series = params.exclude_series.clone();
    query.tag = params.tag.clone();
    query.tags = params.tags.clone();
    query.exclude_tags = params.exclude_tags.clone();
    query.publisher = params.publisher.clone();
    query.publishers = params.publishers.clone();
    query.has_publisher = params.has_publisher;
    query.rating = params.rating;
    query.min_rating = params.min_rating;
    query.max_rating = params.max_rating;
    query.unrated = params.unrated;
    query.pubdate_start = parse_date("pubdate_start", params.pubdate_start.as_deref())?;
    query.pubdate_end = parse_date("pubdate_end", params.pubdate_end.as_deref())?;
    query.added_after = parse_date("added_after", params.added_after.as_deref())?;
    query.added_before = parse_date("added_before", params.added_before.as_deref())?;
    query.min_size = params.min_size;
    query.max_size = params.max_size;
    query.formats = params.formats.clone();
    query.comment = params.comment.clone();
    query.has_empty_comments = params.has_empty_comments;
    query.limit = params.limit;
    query.offset = params.offset;
    Ok(query)
}

/// Which catalog a shared-shape tool call targets.
#[derive(Debug, Clone, Copy)]
enum CatalogKind {
    Authors,
    Series,
    Publishers,
}

// ============================================================================
// Server Implementation
// ============================================================================

#[derive(Clone)]
struct CalibreServer {
    state: Arc<ServerState>,
    tool_router: ToolRouter<CalibreServer>,
}

impl CalibreServer {
    fn new(state: Arc<ServerState>) -> Self {
        Self {
            state,
            tool_router: Self::tool_router(),
        }
    }

    async fn engine(&self) -> Engine {
        self.state.engine().await
    }

    async fn catalog_tool(
        &self,
        kind: CatalogKind,
        params: CatalogParams,
    ) -> Result<CallToolResult, McpError> {
        let engine = self.engine().await;
        let db = engine.client().database().map_err(client_error)?;
        let catalog = db.catalog();

        match params.operation {
            CatalogOperation::List => match kind {
                CatalogKind::Authors => Ok(json_result(
                    &catalog
                        .authors(params.limit, params.offset)
                        .await
                        .map_err(client_error)?,
                )),
                CatalogKind::Series => Ok(json_result(
                    &catalog
                        .series(params.limit, params.offset)
                        .await
                        .map_err(client_error)?,
                )),
                CatalogKind::Publishers => Ok(json_result(
                    &catalog
                        .publishers(params.limit, params.offset)
                        .await
                        .map_err(client_error)?,
                )),
            },
            CatalogOperation::Get => {
                let id = require(params.id, "id is required for operation='get'")?;
                match kind {
                    CatalogKind::Authors => {
                        Ok(json_result(&catalog.author(id).await.map_err(client_error)?))
                    }
                    CatalogKind::Series => Ok(json_result(
                        &catalog.series_entry(id).await.map_err(client_error)?,
                    )),
                    CatalogKind::Publishers => Ok(json_result(
                        &catalog.publisher(id).await.map_err(client_error)?,
                    )),
                }
            }
            CatalogOperation::GetBooks => {
                let id = require(params.id, "id is required for operation='get_books'")?;
                let page = match kind {
                    CatalogKind::Authors => engine
                        .search()
                        .by_author(id, params.limit, params.offset)
                        .await
                        .map_err(engine_error)?,
                    CatalogKind::Series => engine
                        .search()
                        .by_series(id, params.limit, params.offset)
                        .await
                        .map_err(engine_error)?,
                    CatalogKind::Publishers => {
                        let publisher = catalog.publisher(id).await.map_err(client_error)?;
                        let mut query = SearchQuery::new();
                        query.publisher = Some(publisher.name);
                        query.limit = params.limit;
                        query.offset = params.offset;
                        engine.search().books(&query).await.map_err(engine_error)?
                    }
                };
                Ok(json_result(&page))
            }
            CatalogOperation::Stats => {
                // Top entries by usage plus the total, from one listing.
                let mut entries: Vec<(i64, String, i64)> = match kind {
                    CatalogKind::Authors => catalog
                        .authors(i64::MAX, 0)
                        .await
                        .map_err(client_error)?
                        .into_iter()
                        .map(|a| (a.id, a.name, a.book_count))
                        .collect(),
                    CatalogKind::Series => catalog
                        .series(i64::MAX, 0)
                        .await
                        .map_err(client_error)?
                        .into_iter()
                        .map(|s| (s.id, s.name, s.book_count))
                        .collect(),
                    CatalogKind::Publishers => catalog
                        .publishers(i64::MAX, 0)
                        .await
                        .map_err(client_error)?
                        .into_iter()
                        .map(|p| (p.id, p.name, p.book_count))
                        .collect(),
                };
                entries.sort_by(|a, b| b.2.cmp(&a.2));
                let total = entries.len();
                entries.truncate(params.limit.max(0) as usize);
                let top: Vec<_> = entries
                    .into_iter()
                    .map(|(id, name, book_count)| {
                        serde_json::json!({"id": id, "name": name, "book_count": book_count})
                    })
                    .collect();
                Ok(json_result(&serde_json::json!({
                    "total": total,
                    "top": top,
                })))
            }
            CatalogOperation::ByLetter => match kind {
                CatalogKind::Authors => Ok(json_result(
                    &catalog.authors_by_letter().await.map_err(client_error)?,
                )),
                CatalogKind::Series => Ok(json_result(
                    &catalog.series_by_letter().await.map_err(client_error)?,
                )),
                CatalogKind::Publishers => Ok(json_result(
                    &catalog.publishers_by_letter().await.map_err(client_error)?,
                )),
            },
        }
    }
}

#[tool_router]
impl CalibreServer {
    // ========================================================================
    // Books
    // ========================================================================

    #[tool(
        description = "Query books in the Calibre library. Use operation='search' for ANY filtered request (by author, tag, text, publisher, rating, dates, size, format); 'list' for all books; 'by_author'/'by_series' with numeric ids."
    )]
    async fn query_books(
        &self,
        Parameters(params): Parameters<QueryBooksParams>,
    ) -> Result<CallToolResult, McpError> {
        debug!(operation = ?params.operation, "query_books");
        let engine = self.engine().await;

        match params.operation {
            QueryBooksOperation::Search => {
                let query = build_search_query(&params)?;
                let page = engine.search().books(&query).await.map_err(engine_error)?;
                Ok(json_result(&page))
            }
            QueryBooksOperation::List => {
                let page = engine
                    .search()
                    .list(params.limit, params.offset)
                    .await
                    .map_err(engine_error)?;
                Ok(json_result(&page))
            }
            QueryBooksOperation::ByAuthor => {
                let author_id = require(
                    params.author_id,
                    "author_id is required for operation='by_author'; find it with operation='search' first",
                )?;
                let page = engine
                    .search()
                    .by_author(author_id, params.limit, params.offset)
                    .await
                    .map_err(engine_error)?;
                Ok(json_result(&page))
            }
            QueryBooksOperation::BySeries => {
                let series_id = require(
                    params.series_id,
                    "series_id is required for operation='by_series'; find it with operation='search' first",
                )?;
                let page = engine
                    .search()
                    .by_series(series_id, params.limit, params.offset)
                    .await
                    .map_err(engine_error)?;
                Ok(json_result(&page))
            }
        }
    }

    #[tool(
        description = "Add, fetch, update or delete books. operation is one of 'add' (file_path required), 'get'/'details' (book_id), 'update' (book_id + fields map), 'delete' (book_id)."
    )]
    async fn manage_books(
        &self,
        Parameters(params): Parameters<ManageBooksParams>,
    ) -> Result<CallToolResult, McpError> {
        debug!(operation = ?params.operation, "manage_books");
        let engine = self.engine().await;

        match params.operation {
            ManageBooksOperation::Add => {
                self.state.check_write("manage_books add")?;
                let file_path =
                    require(params.file_path, "file_path is required for operation='add'")?;
                let options = calkit::actions::AddOptions {
                    title: params.title,
                    authors: params.authors,
                    tags: params.tags,
                    series: params.series,
                    series_index: params.series_index,
                    isbn: params.isbn,
                    allow_duplicates: params.allow_duplicates,
                };
                let ids = engine
                    .client()
                    .books()
                    .add(&file_path, options)
                    .await
                    .map_err(client_error)?;
                info!(?ids, "Books added");
                Ok(json_result(&serde_json::json!({ "added_ids": ids })))
            }
            ManageBooksOperation::Get => {
                let book_id = require(params.book_id, "book_id is required for operation='get'")?;
                let book = engine.search().get(book_id).await.map_err(engine_error)?;
                Ok(json_result(&book))
            }
            ManageBooksOperation::Details => {
                let book_id =
                    require(params.book_id, "book_id is required for operation='details'")?;
                let details = engine
                    .search()
                    .details(book_id)
                    .await
                    .map_err(engine_error)?;
                Ok(json_result(&details))
            }
            ManageBooksOperation::Update => {
                self.state.check_write("manage_books update")?;
                let book_id =
                    require(params.book_id, "book_id is required for operation='update'")?;
                let fields = require(params.fields, "fields is required for operation='update'")?;
                if fields.is_empty() {
                    return Err(McpError::invalid_params(
                        "fields must contain at least one field:value pair",
                        None,
                    ));
                }
                let pairs: Vec<(String, String)> = fields.into_iter().collect();
                engine
                    .client()
                    .books()
                    .set_metadata(book_id, &pairs)
                    .await
                    .map_err(client_error)?;
                info!(book_id, "Book updated");
                Ok(CallToolResult::success(vec![Content::text(format!(
                    "Updated book {}",
                    book_id
                ))]))
            }
            ManageBooksOperation::Delete => {
                self.state.check_write("manage_books delete")?;
                let book_id =
                    require(params.book_id, "book_id is required for operation='delete'")?;
                engine
                    .client()
                    .books()
                    .remove(&[book_id], params.permanent)
                    .await
                    .map_err(client_error)?;
                info!(book_id, "Book deleted");
                Ok(CallToolResult::success(vec![Content::text(format!(
                    "Deleted book {}",
                    book_id
                ))]))
            }
        }
    }

    // ========================================================================
    // Metadata
    // ========================================================================

    #[tool(
        description = "Inspect and groom metadata. operation: 'show' (book_id), 'update' (book_id + typed fields), 'organize_tags' (merge near-duplicate tags; apply=false previews), 'fix_issues' (scan for whitespace/sort/ISBN problems; apply=false previews)."
    )]
    async fn manage_metadata(
        &self,
        Parameters(params): Parameters<ManageMetadataParams>,
    ) -> Result<CallToolResult, McpError> {
        debug!(operation = ?params.operation, "manage_metadata");
        let engine = self.engine().await;

        match params.operation {
            ManageMetadataOperation::Show => {
                let book_id = require(params.book_id, "book_id is required for operation='show'")?;
                let details = engine
                    .metadata()
                    .show(book_id)
                    .await
                    .map_err(engine_error)?;
                Ok(json_result(&details))
            }
            ManageMetadataOperation::Update => {
                self.state.check_write("manage_metadata update")?;
                let book_id =
                    require(params.book_id, "book_id is required for operation='update'")?;
                let update = MetadataUpdate {
                    title: params.title,
                    authors: params.authors,
                    tags: params.tags,
                    publisher: params.publisher,
                    rating: params.rating,
                    series: params.series,
                    series_index: params.series_index,
                    comments: params.comments,
                    isbn: params.isbn,
                };
                engine
                    .metadata()
                    .update(book_id, &update)
                    .await
                    .map_err(engine_error)?;
                info!(book_id, "Metadata updated");
                Ok(CallToolResult::success(vec![Content::text(format!(
                    "Updated metadata for book {}",
                    book_id
                ))]))
            }
            ManageMetadataOperation::OrganizeTags => {
                if params.apply {
                    self.state.check_write("manage_metadata organize_tags")?;
                }
                let report = engine
                    .metadata()
                    .organize_tags(params.apply)
                    .await
                    .map_err(engine_error)?;
                info!(
                    groups = report.groups.len(),
                    merged = report.merged,
                    "Tag grooming finished"
                );
                Ok(json_result(&report))
            }
            ManageMetadataOperation::FixIssues => {
                if params.apply {
                    self.state.check_write("manage_metadata fix_issues")?;
                }
                let report = engine
                    .metadata()
                    .fix_issues(params.apply)
                    .await
                    .map_err(engine_error)?;
                info!(
                    issues = report.issues.len(),
                    fixed = report.fixed,
                    "Consistency scan finished"
                );
                Ok(json_result(&report))
            }
        }
    }

    // ========================================================================
    // Catalogs
    // ========================================================================

    #[tool(
        description = "Browse authors. operation: 'list', 'get' (id), 'get_books' (id), 'stats', 'by_letter'."
    )]
    async fn manage_authors(
        &self,
        Parameters(params): Parameters<CatalogParams>,
    ) -> Result<CallToolResult, McpError> {
        debug!(operation = ?params.operation, "manage_authors");
        self.catalog_tool(CatalogKind::Authors, params).await
    }

    #[tool(
        description = "Browse series. operation: 'list', 'get' (id), 'get_books' (id, ordered by position), 'stats', 'by_letter'."
    )]
    async fn manage_series(
        &self,
        Parameters(params): Parameters<CatalogParams>,
    ) -> Result<CallToolResult, McpError> {
        debug!(operation = ?params.operation, "manage_series");
        self.catalog_tool(CatalogKind::Series, params).await
    }

    #[tool(
        description = "Browse publishers. operation: 'list', 'get' (id), 'get_books' (id), 'stats', 'by_letter'."
    )]
    async fn manage_publishers(
        &self,
        Parameters(params): Parameters<CatalogParams>,
    ) -> Result<CallToolResult, McpError> {
        debug!(operation = ?params.operation, "manage_publishers");
        self.catalog_tool(CatalogKind::Publishers, params).await
    }

    #[tool(
        description = "Browse and maintain tags. operation: 'list', 'get', 'get_books', 'stats', 'by_letter', 'rename' (tag_id + new_name; merges into an existing tag of that name), 'delete' (tag_id)."
    )]
    async fn manage_tags(
        &self,
        Parameters(params): Parameters<ManageTagsParams>,
    ) -> Result<CallToolResult, McpError> {
        debug!(operation = ?params.operation, "manage_tags");
        let engine = self.engine().await;
        let db = engine.client().database().map_err(client_error)?;
        let catalog = db.catalog();

        match params.operation {
            ManageTagsOperation::List => {
                let tags = catalog
                    .tags(params.limit, params.offset)
                    .await
                    .map_err(client_error)?;
                Ok(json_result(&tags))
            }
            ManageTagsOperation::Get => {
                let tag_id = require(params.tag_id, "tag_id is required for operation='get'")?;
                let tag = catalog.tag(tag_id).await.map_err(client_error)?;
                Ok(json_result(&tag))
            }
            ManageTagsOperation::GetBooks => {
                let tag_id =
                    require(params.tag_id, "tag_id is required for operation='get_books'")?;
                let tag = catalog.tag(tag_id).await.map_err(client_error)?;
                let mut query = SearchQuery::new();
                query.tag = Some(tag.name);
                query.limit = params.limit;
                query.offset = params.offset;
                let page = engine.search().books(&query).await.map_err(engine_error)?;
                Ok(json_result(&page))
            }
            ManageTagsOperation::Stats => {
                let mut tags = catalog.tags(i64::MAX, 0).await.map_err(client_error)?;
                tags.sort_by(|a, b| b.book_count.cmp(&a.book_count));
                let total = tags.len();
                tags.truncate(params.limit.max(0) as usize);
                Ok(json_result(&serde_json::json!({
                    "total": total,
                    "top": tags,
                })))
            }
            ManageTagsOperation::ByLetter => {
                let letters = catalog.tags_by_letter().await.map_err(client_error)?;
                Ok(json_result(&letters))
            }
            ManageTagsOperation::Rename => {
                self.state.check_write("manage_tags rename")?;
                let tag_id = require(params.tag_id, "tag_id is required for operation='rename'")?;
                let new_name =
                    require(params.new_name, "new_name is required for operation='rename'")?;
                let merged = catalog
                    .rename_tag(tag_id, &new_name)
                    .await
                    .map_err(client_error)?;
                info!(tag_id, new_name = %new_name, merged, "Tag renamed");
                let verb = if merged { "Merged tag into" } else { "Renamed tag to" };
                Ok(CallToolResult::success(vec![Content::text(format!(
                    "{} '{}'",
                    verb, new_name
                ))]))
            }
            ManageTagsOperation::Delete => {
                self.state.check_write("manage_tags delete")?;
                let tag_id = require(params.tag_id, "tag_id is required for operation='delete'")?;
                catalog.delete_tag(tag_id).await.map_err(client_error)?;
                info!(tag_id, "Tag deleted");
                Ok(CallToolResult::success(vec![Content::text(format!(
                    "Deleted tag {}",
                    tag_id
                ))]))
            }
        }
    }

    // ========================================================================
    // Comments
    // ========================================================================

    #[tool(
        description = "Work with Calibre's description/comments field. operation: 'create'/'update' (set text), 'read', 'append', 'delete'. All take book_id."
    )]
    async fn manage_comments(
        &self,
        Parameters(params): Parameters<ManageCommentsParams>,
    ) -> Result<CallToolResult, McpError> {
        debug!(operation = ?params.operation, book_id = params.book_id, "manage_comments");
        let engine = self.engine().await;
        let db = engine.client().database().map_err(client_error)?;
        let comments = db.comments();

        match params.operation {
            ManageCommentsOperation::Create | ManageCommentsOperation::Update => {
                self.state.check_write("manage_comments update")?;
                let text = require(params.text, "text is required to set a comment")?;
                comments
                    .set(params.book_id, &text)
                    .await
                    .map_err(client_error)?;
                info!(book_id = params.book_id, "Comment set");
                Ok(CallToolResult::success(vec![Content::text(format!(
                    "Set comment on book {}",
                    params.book_id
                ))]))
            }
            ManageCommentsOperation::Read => {
                let text = comments.get(params.book_id).await.map_err(client_error)?;
                Ok(json_result(&serde_json::json!({
                    "book_id": params.book_id,
                    "comment": text,
                })))
            }
            ManageCommentsOperation::Append => {
                self.state.check_write("manage_comments append")?;
                let text = require(params.text, "text is required to append a comment")?;
                let combined = comments
                    .append(params.book_id, &text)
                    .await
                    .map_err(client_error)?;
                info!(book_id = params.book_id, "Comment appended");
                Ok(json_result(&serde_json::json!({
                    "book_id": params.book_id,
                    "comment": combined,
                })))
            }
            ManageCommentsOperation::Delete => {
                self.state.check_write("manage_comments delete")?;
                let removed = comments.delete(params.book_id).await.map_err(client_error)?;
                info!(book_id = params.book_id, removed, "Comment deleted");
                Ok(CallToolResult::success(vec![Content::text(if removed {
                    format!("Deleted comment on book {}", params.book_id)
                } else {
                    format!("Book {} had no comment", params.book_id)
                })]))
            }
        }
    }

    #[tool(
        description = "Per-user annotations stored outside Calibre's database. operation: 'upsert', 'read', 'append', 'delete'. Scoped by book_id and optional user_id."
    )]
    async fn manage_user_comments(
        &self,
        Parameters(params): Parameters<UserCommentsParams>,
    ) -> Result<CallToolResult, McpError> {
        debug!(operation = ?params.operation, book_id = params.book_id, "manage_user_comments");
        let engine = self.engine().await;
        let userdata = engine.userdata();
        let user = params.user_id.as_deref();

        match params.operation {
            UserCommentsOperation::Upsert => {
                self.state.check_write("manage_user_comments upsert")?;
                let text = require(params.text, "text is required for operation='upsert'")?;
                let comment = userdata
                    .comment_upsert(params.book_id, &text, user)
                    .await
                    .map_err(engine_error)?;
                Ok(json_result(&comment))
            }
            UserCommentsOperation::Read => {
                let comment = userdata
                    .comment_get(params.book_id, user)
                    .await
                    .map_err(engine_error)?;
                Ok(json_result(&comment))
            }
            UserCommentsOperation::Append => {
                self.state.check_write("manage_user_comments append")?;
                let text = require(params.text, "text is required for operation='append'")?;
                let comment = userdata
                    .comment_append(params.book_id, &text, user)
                    .await
                    .map_err(engine_error)?;
                Ok(json_result(&comment))
            }
            UserCommentsOperation::Delete => {
                self.state.check_write("manage_user_comments delete")?;
                let removed = userdata
                    .comment_delete(params.book_id, user)
                    .await
                    .map_err(engine_error)?;
                Ok(CallToolResult::success(vec![Content::text(if removed {
                    format!("Deleted user comment on book {}", params.book_id)
                } else {
                    format!("Book {} had no user comment", params.book_id)
                })]))
            }
        }
    }

    #[tool(
        description = "Extended metadata Calibre has no fields for (translator, first publication of the work). operation: 'get', 'set_translator', 'set_first_published', 'upsert', 'delete'."
    )]
    async fn manage_extended_metadata(
        &self,
        Parameters(params): Parameters<ExtendedMetadataParams>,
    ) -> Result<CallToolResult, McpError> {
        debug!(operation = ?params.operation, book_id = params.book_id, "manage_extended_metadata");
        let engine = self.engine().await;
        let userdata = engine.userdata();

        match params.operation {
            ExtendedMetadataOperation::Get => {
                let meta = userdata
                    .extended_get(params.book_id)
                    .await
                    .map_err(engine_error)?;
                Ok(json_result(&meta))
            }
            ExtendedMetadataOperation::SetTranslator => {
                self.state.check_write("manage_extended_metadata set_translator")?;
                let translator = require(
                    params.translator,
                    "translator is required for operation='set_translator'",
                )?;
                let meta = userdata
                    .extended_set_translator(params.book_id, &translator)
                    .await
                    .map_err(engine_error)?;
                Ok(json_result(&meta))
            }
            ExtendedMetadataOperation::SetFirstPublished => {
                self.state
                    .check_write("manage_extended_metadata set_first_published")?;
                let first_published = require(
                    params.first_published,
                    "first_published is required for operation='set_first_published'",
                )?;
                let meta = userdata
                    .extended_set_first_published(params.book_id, &first_published)
                    .await
                    .map_err(engine_error)?;
                Ok(json_result(&meta))
            }
            ExtendedMetadataOperation::Upsert => {
                self.state.check_write("manage_extended_metadata upsert")?;
                let meta = userdata
                    .extended_upsert(
                        params.book_id,
                        params.translator.as_deref(),
                        params.first_published.as_deref(),
                    )
                    .await
                    .map_err(engine_error)?;
                Ok(json_result(&meta))
            }
            ExtendedMetadataOperation::Delete => {
                self.state.check_write("manage_extended_metadata delete")?;
                let removed = userdata
                    .extended_delete(params.book_id)
                    .await
                    .map_err(engine_error)?;
                Ok(CallToolResult::success(vec![Content::text(if removed {
                    format!("Deleted extended metadata for book {}", params.book_id)
                } else {
                    format!("Book {} had no extended metadata", params.book_id)
                })]))
            }
        }
    }

    // ========================================================================
    // Files, conversion, export
    // ========================================================================

    #[tool(
        description = "File operations. operation: 'convert' (book_id + target_format + output_dir), 'download' (book_id + source_format; resolves the stored file path), 'bulk_convert' (book_ids + target_format + output_dir)."
    )]
    async fn manage_files(
        &self,
        Parameters(params): Parameters<ManageFilesParams>,
    ) -> Result<CallToolResult, McpError> {
        debug!(operation = ?params.operation, "manage_files");
        let engine = self.engine().await;

        match params.operation {
            ManageFilesOperation::Convert => {
                if params.add_to_library {
                    self.state.check_write("manage_files convert")?;
                }
                let book_id =
                    require(params.book_id, "book_id is required for operation='convert'")?;
                let target = require(
                    params.target_format,
                    "target_format is required for operation='convert'",
                )?;
                let output_dir = require(
                    params.output_dir,
                    "output_dir is required for operation='convert'",
                )?;
                let report = engine
                    .convert()
                    .book(
                        book_id,
                        &target,
                        std::path::Path::new(&output_dir),
                        params.source_format.as_deref(),
                        params.add_to_library,
                    )
                    .await
                    .map_err(engine_error)?;
                info!(book_id, target = %report.to_format, "Book converted");
                Ok(json_result(&report))
            }
            ManageFilesOperation::Download => {
                let book_id =
                    require(params.book_id, "book_id is required for operation='download'")?;
                let format = require(
                    params.source_format,
                    "source_format is required for operation='download'",
                )?;
                let db = engine.client().database().map_err(client_error)?;
                let path = db
                    .books()
                    .format_path(book_id, &format)
                    .await
                    .map_err(client_error)?;
                let size = std::fs::metadata(&path).map(|m| m.len()).ok();
                Ok(json_result(&serde_json::json!({
                    "book_id": book_id,
                    "format": format.to_uppercase(),
                    "path": path,
                    "size": size,
                })))
            }
            ManageFilesOperation::BulkConvert => {
                if params.add_to_library {
                    self.state.check_write("manage_files bulk_convert")?;
                }
                if params.book_ids.is_empty() {
                    return Err(McpError::invalid_params(
                        "book_ids is required for operation='bulk_convert'",
                        None,
                    ));
                }
                let target = require(
                    params.target_format,
                    "target_format is required for operation='bulk_convert'",
                )?;
                let output_dir = require(
                    params.output_dir,
                    "output_dir is required for operation='bulk_convert'",
                )?;
                let report = engine
                    .convert()
                    .bulk(
                        &params.book_ids,
                        &target,
                        std::path::Path::new(&output_dir),
                        params.add_to_library,
                    )
                    .await
                    .map_err(engine_error)?;
                info!(
                    converted = report.converted.len(),
                    failed = report.failed.len(),
                    "Bulk conversion finished"
                );
                Ok(json_result(&report))
            }
        }
    }

    #[tool(
        description = "Export books to a directory via calibredb. operation: 'books' (book_ids + to_dir) or 'library' (to_dir). formats restricts what is copied."
    )]
    async fn export_books(
        &self,
        Parameters(params): Parameters<ExportBooksParams>,
    ) -> Result<CallToolResult, McpError> {
        debug!(operation = ?params.operation, to_dir = %params.to_dir, "export_books");
        let engine = self.engine().await;
        let to_dir = std::path::PathBuf::from(&params.to_dir);

        let report = match params.operation {
            ExportOperation::Books => engine
                .export()
                .books(&params.book_ids, &to_dir, params.formats, params.single_dir)
                .await
                .map_err(engine_error)?,
            ExportOperation::Library => engine
                .export()
                .library(&to_dir, params.formats)
                .await
                .map_err(engine_error)?,
        };
        info!(requested = report.requested, to_dir = %report.to_dir.display(), "Export finished");
        Ok(json_result(&report))
    }

    // ========================================================================
    // Libraries
    // ========================================================================

    #[tool(
        description = "Multi-library management. operation: 'list' (discover under the base dir), 'switch' (library = path or name under base dir), 'stats', 'current'."
    )]
    async fn manage_libraries(
        &self,
        Parameters(params): Parameters<ManageLibrariesParams>,
    ) -> Result<CallToolResult, McpError> {
        debug!(operation = ?params.operation, "manage_libraries");
        let engine = self.engine().await;

        match params.operation {
            ManageLibrariesOperation::List => {
                let base = params
                    .base_dir
                    .map(PathBuf::from)
                    .or_else(|| self.state.base_library_dir.clone())
                    .ok_or_else(|| {
                        McpError::invalid_params(
                            "no base library directory configured; pass base_dir or start with --base-library-dir",
                            None,
                        )
                    })?;
                let libraries = engine
                    .libraries()
                    .discover(&base)
                    .await
                    .map_err(engine_error)?;
                Ok(json_result(&libraries))
            }
            ManageLibrariesOperation::Switch => {
                let library =
                    require(params.library, "library is required for operation='switch'")?;
                let candidate = PathBuf::from(&library);
                let target = if candidate.join("metadata.db").exists() {
                    candidate
                } else if let Some(base) = &self.state.base_library_dir {
                    base.join(&library)
                } else {
                    candidate
                };
                self.state
                    .switch_library(&target)
                    .await
                    .map_err(client_error)?;
                Ok(CallToolResult::success(vec![Content::text(format!(
                    "Switched to library at {}",
                    target.display()
                ))]))
            }
            ManageLibrariesOperation::Stats => {
                let stats = engine.libraries().stats().await.map_err(engine_error)?;
                Ok(json_result(&stats))
            }
            ManageLibrariesOperation::Current => {
                let info = engine.libraries().current().await.map_err(engine_error)?;
                Ok(json_result(&info))
            }
        }
    }

    // ========================================================================
    // Viewer
    // ========================================================================

    #[tool(
        description = "Viewer sessions for reading books. operation: 'open' (book_id, optional format), 'open_random', 'get_page' (session_id + page; extracts to a temp file), 'get_metadata', 'get_state', 'update_state' (page/zoom), 'close'."
    )]
    async fn manage_viewer(
        &self,
        Parameters(params): Parameters<ManageViewerParams>,
    ) -> Result<CallToolResult, McpError> {
        debug!(operation = ?params.operation, "manage_viewer");
        let engine = self.engine().await;
        let viewer = engine.viewer();

        match params.operation {
            ManageViewerOperation::Open => {
                let book_id = require(params.book_id, "book_id is required for operation='open'")?;
                let info = viewer
                    .open(book_id, params.format.as_deref())
                    .await
                    .map_err(engine_error)?;
                info!(book_id, session_id = %info.session_id, "Viewer session opened");
                Ok(json_result(&info))
            }
            ManageViewerOperation::OpenRandom => {
                let info = viewer.open_random().await.map_err(engine_error)?;
                info!(book_id = info.book_id, "Random viewer session opened");
                Ok(json_result(&info))
            }
            ManageViewerOperation::GetPage => {
                let session_id = require(
                    params.session_id,
                    "session_id is required for operation='get_page'",
                )?;
                let page = require(params.page, "page is required for operation='get_page'")?;
                let content = viewer
                    .get_page(&session_id, page)
                    .await
                    .map_err(engine_error)?;
                Ok(json_result(&content))
            }
            ManageViewerOperation::GetMetadata => {
                let session_id = require(
                    params.session_id,
                    "session_id is required for operation='get_metadata'",
                )?;
                let details = viewer
                    .get_metadata(&session_id)
                    .await
                    .map_err(engine_error)?;
                Ok(json_result(&details))
            }
            ManageViewerOperation::GetState => {
                let session_id = require(
                    params.session_id,
                    "session_id is required for operation='get_state'",
                )?;
                let info = viewer.get_state(&session_id).map_err(engine_error)?;
                Ok(json_result(&info))
            }
            ManageViewerOperation::UpdateState => {
                let session_id = require(
                    params.session_id,
                    "session_id is required for operation='update_state'",
                )?;
                let state = viewer
                    .update_state(&session_id, params.page, params.zoom)
                    .map_err(engine_error)?;
                Ok(json_result(&state))
            }
            ManageViewerOperation::Close => {
                let session_id = require(
                    params.session_id,
                    "session_id is required for operation='close'",
                )?;
                let closed = viewer.close(&session_id);
                Ok(CallToolResult::success(vec![Content::text(if closed {
                    format!("Closed viewer session {}", session_id)
                } else {
                    format!("No viewer session {}", session_id)
                })]))
            }
        }
    }

    // ========================================================================
    // Analysis
    // ========================================================================

    #[tool(
        description = "Library analysis. operation: 'tag_statistics', 'duplicate_books' (similarity scan), 'series_analysis' (missing volumes), 'library_health', 'unread_priority', 'reading_stats'."
    )]
    async fn manage_analysis(
        &self,
        Parameters(params): Parameters<ManageAnalysisParams>,
    ) -> Result<CallToolResult, McpError> {
        debug!(operation = ?params.operation, "manage_analysis");
        let engine = self.engine().await;
        let analyze = engine.analyze();

        match params.operation {
            AnalysisOperation::TagStatistics => {
                let stats = analyze
                    .tag_statistics(params.limit)
                    .await
                    .map_err(engine_error)?;
                Ok(json_result(&stats))
            }
            AnalysisOperation::DuplicateBooks => {
                let criteria = DuplicateCriteria {
                    min_title_similarity: params.min_title_similarity,
                    require_author_overlap: params.require_author_overlap,
                };
                let groups = engine
                    .duplicates()
                    .find(&criteria)
                    .await
                    .map_err(engine_error)?;
                debug!(groups = groups.len(), "Duplicate scan finished");
                Ok(json_result(&groups))
            }
            AnalysisOperation::SeriesAnalysis => {
                let gaps = analyze.series_analysis().await.map_err(engine_error)?;
                Ok(json_result(&gaps))
            }
            AnalysisOperation::LibraryHealth => {
                let health = analyze.library_health().await.map_err(engine_error)?;
                Ok(json_result(&health))
            }
            AnalysisOperation::UnreadPriority => {
                let candidates = analyze
                    .unread_priority(params.limit)
                    .await
                    .map_err(engine_error)?;
                Ok(json_result(&candidates))
            }
            AnalysisOperation::ReadingStats => {
                let stats = analyze.reading_stats().await.map_err(engine_error)?;
                Ok(json_result(&stats))
            }
        }
    }

    // ========================================================================
    // System
    // ========================================================================

    #[tool(
        description = "Server status and health. operation: 'status' (active library and mode), 'health_check' (probes calibredb and the library), 'version'."
    )]
    async fn manage_system(
        &self,
        Parameters(params): Parameters<ManageSystemParams>,
    ) -> Result<CallToolResult, McpError> {
        debug!(operation = ?params.operation, "manage_system");
        let engine = self.engine().await;

        match params.operation {
            SystemOperation::Status => {
                let library = engine.libraries().current().await.ok();
                Ok(json_result(&serde_json::json!({
                    "library": library,
                    "read_only": self.state.read_only,
                    "base_library_dir": self.state.base_library_dir,
                    "version": env!("CARGO_PKG_VERSION"),
                })))
            }
            SystemOperation::HealthCheck => {
                let calibredb = match engine.client().check().await {
                    Ok(()) => serde_json::json!({"ok": true}),
                    Err(e) => serde_json::json!({"ok": false, "error": e.to_string()}),
                };
                let fts_available = engine
                    .client()
                    .database()
                    .ok()
                    .and_then(|db| db.fts().ok().flatten())
                    .is_some();
                Ok(json_result(&serde_json::json!({
                    "calibredb": calibredb,
                    "fts_available": fts_available,
                })))
            }
            SystemOperation::Version => Ok(CallToolResult::success(vec![Content::text(format!(
                "calkit-mcp {}",
                env!("CARGO_PKG_VERSION")
            ))])),
        }
    }

    #[tool(
        description = "Full-text search over book contents. Requires Calibre's FTS indexing to be enabled for the library."
    )]
    async fn search_fulltext(
        &self,
        Parameters(params): Parameters<FulltextSearchParams>,
    ) -> Result<CallToolResult, McpError> {
        debug!(query = %params.query, "search_fulltext");
        let engine = self.engine().await;
        let hits = engine
            .search()
            .fulltext(&params.query, params.limit)
            .await
            .map_err(engine_error)?;
        debug!(count = hits.len(), "Full-text hits");
        Ok(json_result(&hits))
    }
}

#[tool_handler]
impl ServerHandler for CalibreServer {
    fn get_info(&self) -> ServerInfo {
        let mode = if self.state.read_only {
            " (read-only)"
        } else {
            ""
        };
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(format!(
                "Calibre ebook library management{}. Requires Calibre's command-line \
                 tools (calibredb, ebook-convert) to be installed. Each tool takes an \
                 'operation' selector: query_books, manage_books, manage_metadata, \
                 manage_tags, manage_authors, manage_viewer, manage_analysis, and more.",
                mode
            )),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Initialize tracing
    let log_level = match args.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .init();

    info!(
        library = %args.library_path.display(),
        read_only = args.read_only,
        transport = ?args.transport,
        "Starting calkit-mcp server"
    );

    let state = Arc::new(ServerState::new(
        args.library_path,
        args.base_library_dir,
        args.calibredb_bin,
        args.convert_bin,
        Duration::from_secs(args.timeout),
        args.user_data_db,
        args.read_only,
    ));
    let server = CalibreServer::new(state.clone());

    match args.transport {
        Transport::Stdio => {
            let transport = (tokio::io::stdin(), tokio::io::stdout());
            let mcp_server = server.serve(transport).await?;
            mcp_server.waiting().await?;
        }
        Transport::Http => {
            use rmcp::transport::streamable_http_server::{
                StreamableHttpServerConfig, StreamableHttpService,
                session::local::LocalSessionManager,
            };

            let bind_addr = format!("{}:{}", args.http_host, args.http_port);
            info!(bind_addr = %bind_addr, "Starting HTTP transport");

            let service: StreamableHttpService<CalibreServer, LocalSessionManager> =
                StreamableHttpService::new(
                    move || Ok(server.clone()),
                    Arc::new(LocalSessionManager::default()),
                    StreamableHttpServerConfig::default(),
                );

            let router = axum::Router::new()
                .nest_service("/mcp", service)
                .merge(rest::router(state));
            let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
            info!(bind_addr = %bind_addr, "MCP server and web API listening on HTTP");

            axum::serve(listener, router).await?;
        }
    }

    Ok(())
}
