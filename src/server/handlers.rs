//! Request handlers for the refresh polling protocol and library lookups.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::DateTime;
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::bandcamp::Track;
use crate::library::{AlbumRecord, LibraryStats};
use crate::sync::{SyncError, TaskState, TaskStatus};
use crate::types::AlbumFilter;

/// Error body shared by every endpoint: `{success: false, message}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn internal(err: impl std::fmt::Display) -> Self {
        tracing::error!(error = %err, "Request failed");
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    success: bool,
    message: &'a str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            success: false,
            message: &self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    #[serde(default, rename = "fanId", alias = "fan_id")]
    pub fan_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub success: bool,
    pub message: String,
    pub task_id: String,
    pub status: TaskState,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ConflictResponse {
    success: bool,
    message: String,
    active_task_id: String,
}

/// POST /api/bandcamp/refresh
pub async fn refresh(
    State(state): State<AppState>,
    Json(body): Json<RefreshRequest>,
) -> Result<Response, ApiError> {
    match state.sync.request_sync(&body.fan_id) {
        Ok(handle) => Ok(Json(RefreshResponse {
            success: true,
            message: "Album refresh started".to_string(),
            task_id: handle.task_id,
            status: handle.status.status,
        })
        .into_response()),
        Err(SyncError::AlreadyRunning { active_task_id }) => Ok((
            StatusCode::CONFLICT,
            Json(ConflictResponse {
                success: false,
                message: "A refresh is already in progress. Please wait for it to complete."
                    .to_string(),
                active_task_id,
            }),
        )
            .into_response()),
        Err(e @ SyncError::InvalidFanId) => {
            Err(ApiError::new(StatusCode::UNPROCESSABLE_ENTITY, e.to_string()))
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatusResponse {
    pub success: bool,
    pub task: TaskStatus,
    pub active: bool,
    pub can_refresh: bool,
}

impl From<TaskStatus> for TaskStatusResponse {
    fn from(task: TaskStatus) -> Self {
        Self {
            success: true,
            active: task.status.is_active(),
            can_refresh: task.status.is_terminal(),
            task,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IdleStatusResponse {
    pub active: bool,
    pub can_refresh: bool,
    /// RFC 3339, absent if the library was never synced.
    pub last_refresh: Option<String>,
}

fn task_not_found() -> ApiError {
    ApiError::new(StatusCode::NOT_FOUND, "Task not found or expired")
}

/// GET /api/bandcamp/status/{task_id}
pub async fn task_status(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<TaskStatusResponse>, ApiError> {
    state
        .sync
        .task(&task_id)
        .map(|task| Json(task.into()))
        .ok_or_else(task_not_found)
}

/// GET /api/bandcamp/status
///
/// Reports the active task when there is one, otherwise whether a refresh
/// can start and when the last one finished.
pub async fn active_status(State(state): State<AppState>) -> Result<Response, ApiError> {
    if let Some(active_id) = state.sync.active_task_id() {
        return state
            .sync
            .task(&active_id)
            .map(|task| Json(TaskStatusResponse::from(task)).into_response())
            .ok_or_else(task_not_found);
    }

    let last_refresh = state.sync.last_refresh().await.map_err(ApiError::internal)?;
    Ok(Json(IdleStatusResponse {
        active: false,
        can_refresh: true,
        last_refresh: DateTime::from_timestamp(last_refresh, 0)
            .filter(|_| last_refresh > 0)
            .map(|dt| dt.to_rfc3339()),
    })
    .into_response())
}

#[derive(Debug, Deserialize)]
pub struct FanIdRequest {
    #[serde(default)]
    pub username: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FanIdResponse {
    pub success: bool,
    pub fan_id: String,
}

/// POST /api/bandcamp/fan-id
pub async fn fan_id(
    State(state): State<AppState>,
    Json(body): Json<FanIdRequest>,
) -> Result<Json<FanIdResponse>, ApiError> {
    if body.username.trim().is_empty() {
        return Err(ApiError::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            "Username must not be empty",
        ));
    }
    match state.client.resolve_fan_id(&body.username).await {
        Some(fan_id) => Ok(Json(FanIdResponse {
            success: true,
            fan_id,
        })),
        None => Err(ApiError::new(
            StatusCode::NOT_FOUND,
            "Could not find fan ID for username",
        )),
    }
}

#[derive(Debug, Deserialize)]
pub struct TracksRequest {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub artist: String,
    #[serde(default)]
    pub album: String,
}

#[derive(Debug, Serialize)]
pub struct TracksResponse {
    pub success: bool,
    pub artist: String,
    pub album: String,
    pub tracks: Vec<Track>,
}

/// POST /api/bandcamp/tracks
pub async fn tracks(
    State(state): State<AppState>,
    Json(body): Json<TracksRequest>,
) -> Result<Json<TracksResponse>, ApiError> {
    let url = body.url.trim();
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(ApiError::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            "A valid album URL is required",
        ));
    }
    if body.artist.trim().is_empty() || body.album.trim().is_empty() {
        return Err(ApiError::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            "Artist and album are required",
        ));
    }

    let tracks = state.client.fetch_track_listing(url).await;
    Ok(Json(TracksResponse {
        success: true,
        artist: body.artist,
        album: body.album,
        tracks,
    }))
}

#[derive(Debug, Default, Deserialize)]
pub struct AlbumQuery {
    #[serde(default)]
    pub filter: AlbumFilter,
    #[serde(default)]
    pub search: Option<String>,
}

/// GET /api/albums
pub async fn list_albums(
    State(state): State<AppState>,
    Query(query): Query<AlbumQuery>,
) -> Result<Json<Vec<AlbumRecord>>, ApiError> {
    state
        .albums
        .list(query.filter, query.search.as_deref())
        .await
        .map(Json)
        .map_err(ApiError::internal)
}

/// GET /api/albums/stats
pub async fn album_stats(State(state): State<AppState>) -> Result<Json<LibraryStats>, ApiError> {
    state
        .albums
        .stats()
        .await
        .map(Json)
        .map_err(ApiError::internal)
}
