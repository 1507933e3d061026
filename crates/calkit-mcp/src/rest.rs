//! REST mirror of the engine workflows, for the companion web frontend.
//!
//! Mounted next to `/mcp` when the server runs with the HTTP transport.
//! Handlers call the same engine the MCP tools do; errors are converted at
//! this boundary to the uniform `{"success": false, "error": ...}` shape.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use calkit::SearchQuery;
use calkit_engine::duplicates::DuplicateCriteria;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::state::ServerState;

pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/api/books", get(list_books))
        .route("/api/books/{id}", get(get_book).delete(delete_book))
        .route("/api/books/{id}/metadata", axum::routing::put(update_metadata))
        .route("/api/authors", get(list_authors))
        .route("/api/authors/{id}/books", get(author_books))
        .route("/api/series", get(list_series))
        .route("/api/series/{id}/books", get(series_books))
        .route("/api/tags", get(list_tags))
        .route("/api/tags/{id}/books", get(tag_books))
        .route("/api/publishers", get(list_publishers))
        .route("/api/publishers/{id}/books", get(publisher_books))
        .route("/api/search", get(search))
        .route("/api/analysis/{operation}", get(analysis))
        .route(
            "/api/comments/{book_id}",
            get(get_comment)
                .put(put_comment)
                .delete(delete_comment),
        )
        .route("/api/system/status", get(status))
        .with_state(state)
}

/// Error envelope required by the web frontend.
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn forbidden(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::FORBIDDEN,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "success": false,
            "error": self.message,
        }));
        (self.status, body).into_response()
    }
}

impl From<calkit_engine::Error> for ApiError {
    fn from(e: calkit_engine::Error) -> Self {
        use calkit_engine::Error as E;
        let status = match &e {
            E::Validation(_) | E::PageOutOfRange { .. } | E::UnsupportedViewerFormat(_) => {
                StatusCode::BAD_REQUEST
            }
            E::SessionNotFound(_) | E::NoLibrariesFound(_) => StatusCode::NOT_FOUND,
            E::Client(
                calkit::Error::BookNotFound(_)
                | calkit::Error::EntityNotFound { .. }
                | calkit::Error::FormatNotFound { .. }
                | calkit::Error::LibraryNotFound(_),
            ) => StatusCode::NOT_FOUND,
            E::Client(calkit::Error::FtsUnavailable) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: e.to_string(),
        }
    }
}

impl From<calkit::Error> for ApiError {
    fn from(e: calkit::Error) -> Self {
        calkit_engine::Error::Client(e).into()
    }
}

type ApiResult = Result<Json<serde_json::Value>, ApiError>;

fn check_write(state: &ServerState) -> Result<(), ApiError> {
    if state.read_only {
        Err(ApiError::forbidden(
            "server is in read-only mode".to_string(),
        ))
    } else {
        Ok(())
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Json<serde_json::Value> {
    Json(serde_json::to_value(value).expect("response serialization"))
}

fn default_limit() -> i64 {
    50
}

#[derive(Debug, Deserialize)]
struct BookFilter {
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    series: Option<String>,
    #[serde(default)]
    tag: Option<String>,
    #[serde(default)]
    publisher: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    min_rating: Option<i64>,
    #[serde(default)]
    unrated: Option<bool>,
    #[serde(default = "default_limit")]
    limit: i64,
    #[serde(default)]
    offset: i64,
}

impl BookFilter {
    fn into_query(self) -> SearchQuery {
        let mut query = SearchQuery::new();
        query.author = self.author;
        query.series = self.series;
        query.tag = self.tag;
        query.publisher = self.publisher;
        query.text = self.text;
        query.min_rating = self.min_rating;
        query.unrated = self.unrated.unwrap_or(false);
        query.limit = self.limit;
        query.offset = self.offset;
        query
    }
}

#[derive(Debug, Deserialize)]
struct PageQuery {
    #[serde(default = "default_limit")]
    limit: i64,
    #[serde(default)]
    offset: i64,
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    q: String,
    #[serde(default = "default_limit")]
    limit: i64,
}

#[derive(Debug, Deserialize)]
struct CommentBody {
    text: String,
}

async fn list_books(
    State(state): State<Arc<ServerState>>,
    Query(filter): Query<BookFilter>,
) -> ApiResult {
    let engine = state.engine().await;
    let page = engine.search().books(&filter.into_query()).await?;
    Ok(to_json(&page))
}

async fn get_book(State(state): State<Arc<ServerState>>, Path(id): Path<i64>) -> ApiResult {
    let engine = state.engine().await;
    let details = engine.search().details(id).await?;
    Ok(to_json(&details))
}

async fn update_metadata(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<i64>,
    Json(fields): Json<HashMap<String, String>>,
) -> ApiResult {
    check_write(&state)?;
    if fields.is_empty() {
        return Err(ApiError::bad_request("no fields to update"));
    }
    let engine = state.engine().await;
    let pairs: Vec<(String, String)> = fields.into_iter().collect();
    engine.client().books().set_metadata(id, &pairs).await?;
    Ok(Json(json!({"success": true, "book_id": id})))
}

async fn delete_book(State(state): State<Arc<ServerState>>, Path(id): Path<i64>) -> ApiResult {
    check_write(&state)?;
    let engine = state.engine().await;
    engine.client().books().remove(&[id], false).await?;
    Ok(Json(json!({"success": true, "book_id": id})))
}

async fn list_authors(
    State(state): State<Arc<ServerState>>,
    Query(page): Query<PageQuery>,
) -> ApiResult {
    let engine = state.engine().await;
    let db = engine.client().database()?;
    let authors = db.catalog().authors(page.limit, page.offset).await?;
    Ok(to_json(&authors))
}

async fn author_books(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<i64>,
    Query(page): Query<PageQuery>,
) -> ApiResult {
    let engine = state.engine().await;
    let books = engine.search().by_author(id, page.limit, page.offset).await?;
    Ok(to_json(&books))
}

async fn list_series(
    State(state): State<Arc<ServerState>>,
    Query(page): Query<PageQuery>,
) -> ApiResult {
    let engine = state.engine().await;
    let db = engine.client().database()?;
    let series = db.catalog().series(page.limit, page.offset).await?;
    Ok(to_json(&series))
}

async fn series_books(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<i64>,
    Query(page): Query<PageQuery>,
) -> ApiResult {
    let engine = state.engine().await;
    let books = engine.search().by_series(id, page.limit, page.offset).await?;
    Ok(to_json(&books))
}

async fn list_tags(
    State(state): State<Arc<ServerState>>,
    Query(page): Query<PageQuery>,
) -> ApiResult {
    let engine = state.engine().await;
    let db = engine.client().database()?;
    let tags = db.catalog().tags(page.limit, page.offset).await?;
    Ok(to_json(&tags))
}

async fn tag_books(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<i64>,
    Query(page): Query<PageQuery>,
) -> ApiResult {
    let engine = state.engine().await;
    let db = engine.client().database()?;
    let tag = db.catalog().tag(id).await?;
    let mut query = SearchQuery::new();
    query.tag = Some(tag.name);
    query.limit = page.limit;
    query.offset = page.offset;
    let books = engine.search().books(&query).await?;
    Ok(to_json(&books))
}

async fn list_publishers(
    State(state): State<Arc<ServerState>>,
    Query(page): Query<PageQuery>,
) -> ApiResult {
    let engine = state.engine().await;
    let db = engine.client().database()?;
    let publishers = db.catalog().publishers(page.limit, page.offset).await?;
    Ok(to_json(&publishers))
}

async fn publisher_books(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<i64>,
    Query(page): Query<PageQuery>,
) -> ApiResult {
    let engine = state.engine().await;
    let db = engine.client().database()?;
    let publisher = db.catalog().publisher(id).await?;
    let mut query = SearchQuery::new();
    query.publisher = Some(publisher.name);
    query.limit = page.limit;
    query.offset = page.offset;
    let books = engine.search().books(&query).await?;
    Ok(to_json(&books))
}

/// Full-text search with a filter-search fallback for libraries that have
/// no FTS index.
async fn search(
    State(state): State<Arc<ServerState>>,
    Query(params): Query<SearchParams>,
) -> ApiResult {
    let engine = state.engine().await;
    match engine.search().fulltext(&params.q, params.limit).await {
        Ok(hits) => Ok(Json(json!({"mode": "fulltext", "hits": hits}))),
        Err(calkit_engine::Error::Client(calkit::Error::FtsUnavailable)) => {
            debug!("FTS unavailable, falling back to metadata search");
            let mut query = SearchQuery::new();
            query.text = Some(params.q);
            query.limit = params.limit;
            let page = engine.search().books(&query).await?;
            Ok(Json(json!({"mode": "metadata", "page": page})))
        }
        Err(e) => Err(e.into()),
    }
}

async fn analysis(
    State(state): State<Arc<ServerState>>,
    Path(operation): Path<String>,
) -> ApiResult {
    let engine = state.engine().await;
    let analyze = engine.analyze();
    match operation.as_str() {
        "tag_statistics" => Ok(to_json(&analyze.tag_statistics(20).await?)),
        "duplicate_books" => Ok(to_json(
            &engine.duplicates().find(&DuplicateCriteria::default()).await?,
        )),
        "series_analysis" => Ok(to_json(&analyze.series_analysis().await?)),
        "library_health" => Ok(to_json(&analyze.library_health().await?)),
        "unread_priority" => Ok(to_json(&analyze.unread_priority(20).await?)),
        "reading_stats" => Ok(to_json(&analyze.reading_stats().await?)),
        other => Err(ApiError::bad_request(format!(
            "unknown analysis operation '{}'",
            other
        ))),
    }
}

async fn get_comment(
    State(state): State<Arc<ServerState>>,
    Path(book_id): Path<i64>,
) -> ApiResult {
    let engine = state.engine().await;
    let db = engine.client().database()?;
    let text = db.comments().get(book_id).await?;
    Ok(Json(json!({"book_id": book_id, "comment": text})))
}

async fn put_comment(
    State(state): State<Arc<ServerState>>,
    Path(book_id): Path<i64>,
    Json(body): Json<CommentBody>,
) -> ApiResult {
    check_write(&state)?;
    let engine = state.engine().await;
    let db = engine.client().database()?;
    db.comments().set(book_id, &body.text).await?;
    Ok(Json(json!({"success": true, "book_id": book_id})))
}

async fn delete_comment(
    State(state): State<Arc<ServerState>>,
    Path(book_id): Path<i64>,
) -> ApiResult {
    check_write(&state)?;
    let engine = state.engine().await;
    let db = engine.client().database()?;
    let removed = db.comments().delete(book_id).await?;
    Ok(Json(json!({"success": true, "removed": removed})))
}

async fn status(State(state): State<Arc<ServerState>>) -> ApiResult {
    let engine = state.engine().await;
    let library = engine.libraries().current().await.ok();
    Ok(Json(json!({
        "library": library,
        "read_only": state.read_only,
        "version": env!("CARGO_PKG_VERSION"),
    })))
}
