// Task CRUD, scoped to the verified caller

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use tracing::debug;
use validator::Validate;

use crate::middleware::VerifiedUser;
use crate::models::{AppState, CreateTaskRequest, NewTask, SuccessResponse, Task, TaskFilter, TaskPatch};
use crate::types::{AppError, AppResult};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/tasks", get(list_tasks).post(create_task))
        .route(
            "/api/v1/tasks/{id}",
            get(get_task).patch(update_task).delete(delete_task),
        )
        .with_state(state)
}

fn task_not_found(task_id: i64) -> AppError {
    AppError::NotFound(format!("Task {task_id} not found"))
}

async fn list_tasks(
    State(state): State<AppState>,
    caller: VerifiedUser,
    Query(filter): Query<TaskFilter>,
) -> AppResult<Json<Vec<Task>>> {
    let tasks = state.tasks.list_tasks(caller.user.id, filter).await?;
    Ok(Json(tasks))
}

async fn create_task(
    State(state): State<AppState>,
    caller: VerifiedUser,
    Json(request): Json<CreateTaskRequest>,
) -> AppResult<(StatusCode, Json<Task>)> {
    request.validate()?;

    let task = state
        .tasks
        .create_task(
            caller.user.id,
            NewTask {
                name: request.name,
                description: request.description,
            },
        )
        .await?;

    debug!(user_id = %caller.user.id, task_id = task.id, "Task created");
    Ok((StatusCode::CREATED, Json(task)))
}

async fn get_task(
    State(state): State<AppState>,
    caller: VerifiedUser,
    Path(task_id): Path<i64>,
) -> AppResult<Json<Task>> {
    state
        .tasks
        .get_task(caller.user.id, task_id)
        .await?
        .map(Json)
        .ok_or_else(|| task_not_found(task_id))
}

async fn update_task(
    State(state): State<AppState>,
    caller: VerifiedUser,
    Path(task_id): Path<i64>,
    Json(patch): Json<TaskPatch>,
) -> AppResult<Json<Task>> {
    patch.validate()?;

    state
        .tasks
        .update_task(caller.user.id, task_id, patch)
        .await?
        .map(Json)
        .ok_or_else(|| task_not_found(task_id))
}

async fn delete_task(
    State(state): State<AppState>,
    caller: VerifiedUser,
    Path(task_id): Path<i64>,
) -> AppResult<Json<SuccessResponse>> {
    if !state.tasks.delete_task(caller.user.id, task_id).await? {
        return Err(task_not_found(task_id));
    }
    Ok(Json(SuccessResponse::ok()))
}
