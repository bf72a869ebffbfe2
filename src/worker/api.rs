//! Worker HTTP API: the per-node task surface.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State as AxumState};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use super::types::Worker;
use crate::tasks::types::TaskEvent;

/// Error envelope returned on every 4xx response.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ErrResponse {
    pub message: String,
}

pub fn build_router(worker: Arc<Worker>) -> Router {
    Router::new()
        .route("/tasks", get(get_tasks).post(submit_task))
        .route("/tasks/{taskID}", delete(stop_task))
        .route("/stats", get(get_stats))
        .with_state(worker)
}

fn bad_request(message: String) -> Response {
    warn!(%message, "rejecting request");
    (StatusCode::BAD_REQUEST, Json(ErrResponse { message })).into_response()
}

async fn submit_task(
    AxumState(worker): AxumState<Arc<Worker>>,
    payload: Result<Json<TaskEvent>, JsonRejection>,
) -> Response {
    let Json(event) = match payload {
        Ok(json) => json,
        Err(rejection) => return bad_request(format!("error unmarshalling body: {rejection}")),
    };

    info!(task_id = %event.task.id, event_id = %event.id, "task queued");
    let task = event.task.clone();
    worker.add_task(event.task).await;
    (StatusCode::CREATED, Json(task)).into_response()
}

async fn get_tasks(AxumState(worker): AxumState<Arc<Worker>>) -> Response {
    Json(worker.get_tasks().await).into_response()
}

async fn stop_task(
    AxumState(worker): AxumState<Arc<Worker>>,
    Path(task_id): Path<String>,
) -> Response {
    let id = match Uuid::parse_str(&task_id) {
        Ok(id) => id,
        Err(_) => return bad_request(format!("task ID {task_id} is not a valid UUID")),
    };

    match worker.enqueue_stop(id).await {
        Ok(task) => {
            info!(task_id = %id, container_id = ?task.container_id, "stop intent queued");
            StatusCode::NO_CONTENT.into_response()
        }
        Err(e) => bad_request(e.to_string()),
    }
}

async fn get_stats(AxumState(worker): AxumState<Arc<Worker>>) -> Response {
    Json(worker.stats().await).into_response()
}
