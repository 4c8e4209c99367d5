use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use localhist_core::{EditOutcome, Engine, Error, PatchChain};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
}

type ApiResult<T> = Result<Json<T>, (StatusCode, String)>;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/files", get(get_files))
        .route("/history", get(get_history))
        .route("/content", get(get_content))
        .route("/edits", post(record_edit))
        .route("/commits", post(create_commit))
        .route("/commits/restore", post(restore_commit))
        .route("/commits/delete", post(delete_commit))
        .route("/commits/rename", post(rename_commit))
        .route("/patches/restore", post(restore_patch))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn error_response(e: Error) -> (StatusCode, String) {
    let status = match &e {
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::IndexOutOfRange { .. } | Error::InvalidPath(_) => StatusCode::BAD_REQUEST,
        Error::InvalidOperation(_) => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, e.to_string())
}

/// Current file content, or empty when the file does not exist yet.
fn read_disk(engine: &Engine, path: &Path) -> Result<String, (StatusCode, String)> {
    let relative = engine.workspace().relative_path(path).map_err(error_response)?;
    match std::fs::read_to_string(engine.workspace().absolute_path(&relative)) {
        Ok(content) => Ok(content),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
        Err(e) => Err(error_response(e.into())),
    }
}

#[derive(Serialize)]
struct Ack {
    ok: bool,
}

const ACK: Ack = Ack { ok: true };

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok"}))
}

async fn get_files(State(state): State<AppState>) -> ApiResult<Vec<String>> {
    state.engine.tracked_files().map(Json).map_err(error_response)
}

#[derive(Deserialize)]
struct FileQuery {
    path: PathBuf,
}

async fn get_history(
    State(state): State<AppState>,
    Query(query): Query<FileQuery>,
) -> ApiResult<PatchChain> {
    state.engine.load(&query.path).map(Json).map_err(error_response)
}

#[derive(Deserialize)]
struct ContentQuery {
    path: PathBuf,
    commit: Option<usize>,
    patch: Option<usize>,
}

#[derive(Serialize)]
struct ContentResponse {
    commit: usize,
    patch: usize,
    content: String,
}

async fn get_content(
    State(state): State<AppState>,
    Query(query): Query<ContentQuery>,
) -> ApiResult<ContentResponse> {
    let chain = state.engine.load(&query.path).map_err(error_response)?;
    let commit = query.commit.unwrap_or(chain.active_commit_index);
    let patch = match query.patch {
        Some(patch) => patch,
        None => chain.commit(commit).map_err(error_response)?.active_patch_index,
    };

    let content = chain.get_patched(commit, patch).map_err(error_response)?;
    Ok(Json(ContentResponse {
        commit,
        patch,
        content,
    }))
}

#[derive(Deserialize)]
struct RecordEditRequest {
    path: PathBuf,
    /// Defaults to the file's current content.
    disk_data: Option<String>,
    new_data: String,
}

async fn record_edit(
    State(state): State<AppState>,
    Json(req): Json<RecordEditRequest>,
) -> ApiResult<EditOutcome> {
    let disk_data = match req.disk_data {
        Some(disk_data) => disk_data,
        None => read_disk(&state.engine, &req.path)?,
    };

    state
        .engine
        .record_edit(&req.path, &disk_data, &req.new_data)
        .map(Json)
        .map_err(error_response)
}

#[derive(Deserialize)]
struct CreateCommitRequest {
    path: PathBuf,
    content: Option<String>,
    name: Option<String>,
}

#[derive(Serialize)]
struct CreateCommitResponse {
    commit: usize,
}

async fn create_commit(
    State(state): State<AppState>,
    Json(req): Json<CreateCommitRequest>,
) -> ApiResult<CreateCommitResponse> {
    let content = match req.content {
        Some(content) => content,
        None => read_disk(&state.engine, &req.path)?,
    };

    let commit = state
        .engine
        .create_commit(&req.path, &content, req.name)
        .map_err(error_response)?;
    Ok(Json(CreateCommitResponse { commit }))
}

#[derive(Deserialize)]
struct CommitRequest {
    path: PathBuf,
    commit: usize,
}

async fn restore_commit(
    State(state): State<AppState>,
    Json(req): Json<CommitRequest>,
) -> ApiResult<Ack> {
    state
        .engine
        .restore_commit(&req.path, req.commit)
        .map_err(error_response)?;
    Ok(Json(ACK))
}

async fn delete_commit(
    State(state): State<AppState>,
    Json(req): Json<CommitRequest>,
) -> ApiResult<Ack> {
    state
        .engine
        .delete_commit(&req.path, req.commit)
        .map_err(error_response)?;
    Ok(Json(ACK))
}

#[derive(Deserialize)]
struct RenameCommitRequest {
    path: PathBuf,
    commit: usize,
    name: String,
}

async fn rename_commit(
    State(state): State<AppState>,
    Json(req): Json<RenameCommitRequest>,
) -> ApiResult<Ack> {
    state
        .engine
        .rename_commit(&req.path, req.commit, req.name)
        .map_err(error_response)?;
    Ok(Json(ACK))
}

#[derive(Deserialize)]
struct RestorePatchRequest {
    path: PathBuf,
    patch: usize,
    commit: Option<usize>,
}

async fn restore_patch(
    State(state): State<AppState>,
    Json(req): Json<RestorePatchRequest>,
) -> ApiResult<Ack> {
    state
        .engine
        .restore_patch(&req.path, req.patch, req.commit)
        .map_err(error_response)?;
    Ok(Json(ACK))
}
