use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::models::{ReplayResponse, TaskPage};
use crate::queue::metrics::QueueStats;
use crate::queue::repo::ReplayOutcome;
use crate::queue::timeline::build_timeline;
use crate::queue::{JobQueue, TaskStatus};

pub mod models;

#[derive(Clone)]
pub struct ApiState {
    pub queue: JobQueue,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        // Inspect
        .route("/tasks", get(list_tasks))
        .route("/tasks/failed", get(list_failed))
        .route("/tasks/:id", get(get_task))
        .route("/tasks/:id/timeline", get(get_timeline))
        .route("/tasks/:id/replay", post(replay_task))
        // Metrics
        .route("/metrics", get(metrics))
        // Health
        .route("/health", get(health))
        .with_state(state)
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

fn error_response(status: StatusCode, error: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            error: error.into(),
        }),
    )
        .into_response()
}

fn internal_err(e: anyhow::Error) -> Response {
    error_response(StatusCode::INTERNAL_SERVER_ERROR, format!("internal error: {e}"))
}

/// Cursors travel as `<created_at rfc3339>|<id>`.
pub fn encode_cursor(created_at: DateTime<Utc>, id: Uuid) -> String {
    format!("{}|{}", created_at.to_rfc3339(), id)
}

pub fn decode_cursor(raw: &str) -> Option<(DateTime<Utc>, Uuid)> {
    let (at, id) = raw.split_once('|')?;
    let at = DateTime::parse_from_rfc3339(at).ok()?.with_timezone(&Utc);
    let id = Uuid::parse_str(id).ok()?;
    Some((at, id))
}

#[derive(Debug, Deserialize)]
pub struct ListTasksQuery {
    pub status: Option<String>,
    pub task_type: Option<String>,
    pub limit: Option<i64>,
    pub cursor: Option<String>,
}

pub async fn list_tasks(
    State(state): State<ApiState>,
    Query(q): Query<ListTasksQuery>,
) -> Result<Json<TaskPage>, Response> {
    let status = q
        .status
        .as_deref()
        .map(str::parse::<TaskStatus>)
        .transpose()
        .map_err(|e| error_response(StatusCode::BAD_REQUEST, e.to_string()))?;
    let cursor = match q.cursor.as_deref() {
        Some(raw) => Some(
            decode_cursor(raw)
                .ok_or_else(|| error_response(StatusCode::BAD_REQUEST, "malformed cursor"))?,
        ),
        None => None,
    };
    let limit = q.limit.unwrap_or(100).clamp(1, 500);

    let items = state
        .queue
        .tasks()
        .list_tasks(status, q.task_type.as_deref(), limit, cursor)
        .await
        .map_err(internal_err)?;

    let next_cursor = if items.len() as i64 == limit {
        items.last().map(|x| encode_cursor(x.created_at, x.id))
    } else {
        None
    };

    Ok(Json(TaskPage { items, next_cursor }))
}

#[derive(Debug, Deserialize)]
pub struct ListFailedQuery {
    pub limit: Option<i64>,
}

pub async fn list_failed(
    State(state): State<ApiState>,
    Query(q): Query<ListFailedQuery>,
) -> Result<Json<TaskPage>, Response> {
    let items = state
        .queue
        .tasks()
        .list_failed(q.limit.unwrap_or(100).clamp(1, 500))
        .await
        .map_err(internal_err)?;

    Ok(Json(TaskPage {
        items,
        next_cursor: None,
    }))
}

pub async fn get_task(Path(id): Path<Uuid>, State(state): State<ApiState>) -> Response {
    match state.queue.tasks().get_task(id).await {
        Ok(Some(task)) => (StatusCode::OK, Json(task)).into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, "task not found"),
        Err(e) => internal_err(e),
    }
}

pub async fn get_timeline(Path(id): Path<Uuid>, State(state): State<ApiState>) -> Response {
    match build_timeline(state.queue.tasks(), state.queue.attempts(), id).await {
        Ok(Some(tl)) => (StatusCode::OK, Json(tl)).into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, "task not found"),
        Err(e) => internal_err(e),
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ReplayRequest {
    pub run_at: Option<DateTime<Utc>>,
}

pub async fn replay_task(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
    body: Option<Json<ReplayRequest>>,
) -> Response {
    let run_at = body.and_then(|Json(b)| b.run_at);

    match state.queue.tasks().replay_task(id, run_at).await {
        Ok(ReplayOutcome::Replayed(task_id)) => {
            tracing::info!(replayed_from = %id, %task_id, "task replayed");
            (
                StatusCode::OK,
                Json(ReplayResponse {
                    replayed_from: id,
                    task_id,
                }),
            )
                .into_response()
        }
        Ok(ReplayOutcome::NotFound) => error_response(StatusCode::NOT_FOUND, "task not found"),
        Ok(ReplayOutcome::NotFailed(status)) => error_response(
            StatusCode::CONFLICT,
            format!("only failed tasks can be replayed (task is {status})"),
        ),
        Err(e) => internal_err(e),
    }
}

pub async fn metrics(State(state): State<ApiState>) -> Result<Json<QueueStats>, Response> {
    let stats = state.queue.metrics().snapshot().await.map_err(internal_err)?;
    Ok(Json(stats))
}

pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn cursor_survives_encoding() {
        let at = Utc.with_ymd_and_hms(2025, 3, 4, 5, 6, 7).unwrap();
        let id = Uuid::new_v4();
        let raw = encode_cursor(at, id);
        assert_eq!(decode_cursor(&raw), Some((at, id)));
    }

    #[test]
    fn malformed_cursors_are_rejected() {
        assert_eq!(decode_cursor("nope"), None);
        assert_eq!(decode_cursor("2025-03-04T05:06:07Z|not-a-uuid"), None);
        assert_eq!(decode_cursor(&format!("yesterday|{}", Uuid::nil())), None);
    }
}
