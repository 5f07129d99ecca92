//! HTTP surface for loading XML files into shared documents

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use sharedxml::{DocumentId, LoadError, LoadMode, LoadState, Loader};
use tower_http::cors::{Any, CorsLayer};
use tracing::warn;

#[derive(Clone, Debug)]
pub struct AppState {
    loader: Arc<Loader>,
}

impl AppState {
    pub fn new(loader: Loader) -> Self {
        Self {
            loader: Arc::new(loader),
        }
    }

    pub fn loader(&self) -> &Arc<Loader> {
        &self.loader
    }
}

#[derive(Debug, Deserialize)]
struct LoadQuery {
    file: Option<String>,
    #[serde(rename = "async")]
    load_async: Option<String>,
}

impl LoadQuery {
    /// Present and not literally "false"
    fn mode(&self) -> LoadMode {
        LoadMode::from_async_flag(
            self.load_async
                .as_deref()
                .is_some_and(|flag| flag != "false"),
        )
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LoadResponse {
    document_id: DocumentId,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TreeResponse {
    document_id: DocumentId,
    state: LoadState,
    lines: Vec<String>,
}

/// Load failures rendered as plain-text 4xx responses
#[derive(Debug)]
pub struct ApiError(LoadError);

impl From<LoadError> for ApiError {
    fn from(value: LoadError) -> Self {
        Self(value)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            LoadError::UnknownDocument(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::BAD_REQUEST,
        };
        (status, self.0.to_string()).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/load", get(load))
        .route("/api/documents/{id}/tree", get(tree))
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

async fn load(
    State(state): State<AppState>,
    Query(query): Query<LoadQuery>,
) -> Result<Json<LoadResponse>, ApiError> {
    let mode = query.mode();
    let file = query.file.unwrap_or_default();
    let document_id = state
        .loader
        .load_document(&file, mode)
        .await
        .inspect_err(|err| warn!("load of {file:?} failed: {err}"))?;
    Ok(Json(LoadResponse { document_id }))
}

async fn tree(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<TreeResponse>, ApiError> {
    let session = id
        .parse::<DocumentId>()
        .ok()
        .and_then(|document_id| state.loader.session(document_id))
        .ok_or(LoadError::UnknownDocument(id))?;
    Ok(Json(TreeResponse {
        document_id: session.id(),
        state: session.state(),
        lines: session.render(),
    }))
}
