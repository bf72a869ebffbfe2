//! Manager HTTP API: the public task surface.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State as AxumState};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get};
use axum::{Json, Router};
use tracing::{info, warn};
use uuid::Uuid;

use super::types::Manager;
use crate::tasks::types::TaskEvent;
use crate::worker::api::ErrResponse;

pub fn build_router(manager: Arc<Manager>) -> Router {
    Router::new()
        .route("/tasks", get(get_tasks).post(submit_task))
        .route("/tasks/{taskID}", delete(stop_task))
        .with_state(manager)
}

fn bad_request(message: String) -> Response {
    warn!(%message, "rejecting request");
    (StatusCode::BAD_REQUEST, Json(ErrResponse { message })).into_response()
}

async fn submit_task(
    AxumState(manager): AxumState<Arc<Manager>>,
    payload: Result<Json<TaskEvent>, JsonRejection>,
) -> Response {
    let Json(event) = match payload {
        Ok(json) => json,
        Err(rejection) => return bad_request(format!("error unmarshalling body: {rejection}")),
    };

    info!(task_id = %event.task.id, event_id = %event.id, "task event accepted");
    let task = event.task.clone();
    manager.add_task(event).await;
    (StatusCode::CREATED, Json(task)).into_response()
}

async fn get_tasks(AxumState(manager): AxumState<Arc<Manager>>) -> Response {
    Json(manager.get_tasks().await).into_response()
}

async fn stop_task(
    AxumState(manager): AxumState<Arc<Manager>>,
    Path(task_id): Path<String>,
) -> Response {
    let id = match Uuid::parse_str(&task_id) {
        Ok(id) => id,
        Err(_) => return bad_request(format!("task ID {task_id} is not a valid UUID")),
    };

    match manager.stop_task(id).await {
        Ok(event) => {
            info!(task_id = %id, event_id = %event.id, "stop event queued");
            StatusCode::NO_CONTENT.into_response()
        }
        Err(e) => bad_request(e.to_string()),
    }
}
