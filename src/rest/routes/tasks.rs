// rest/routes/tasks.rs — Task query, creation, and status-update routes.

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use super::{bad_request, engine_error, parse_boundary_date, parse_end_boundary, ApiError};
use crate::engine::{NewTask, Task, TaskFilter, TaskStatus};
use crate::AppContext;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListTasksQuery {
    pub routine_id: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

/// `GET /api/v1/tasks` — ensure the routine's schedule is materialized over
/// the requested range, then list. Materialization and listing are two
/// explicit calls so the list itself stays a pure read; an unknown routine
/// yields an empty array.
pub async fn list_tasks(
    State(ctx): State<Arc<AppContext>>,
    Query(q): Query<ListTasksQuery>,
) -> Result<Json<Vec<Task>>, ApiError> {
    let start = q
        .start_date
        .as_deref()
        .map(parse_boundary_date)
        .transpose()
        .map_err(|e| bad_request(&e))?;
    let end = q
        .end_date
        .as_deref()
        .map(parse_end_boundary)
        .transpose()
        .map_err(|e| bad_request(&e))?;

    if let Some(rid) = q.routine_id.as_deref() {
        ctx.tasks
            .ensure_materialized(rid, start, end)
            .await
            .map_err(engine_error)?;
    }

    let filter = TaskFilter {
        routine_id: q.routine_id,
        range: start.zip(end),
    };
    let tasks = ctx.tasks.list_tasks(&filter).await.map_err(engine_error)?;
    Ok(Json(tasks))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskRequest {
    pub routine_id: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub start_time: String,
    pub end_time: Option<String>,
    #[serde(default)]
    pub is_recurring: bool,
    pub frequency: Option<String>,
}

/// `POST /api/v1/tasks` — create one manual task.
pub async fn create_task(
    State(ctx): State<Arc<AppContext>>,
    Json(body): Json<CreateTaskRequest>,
) -> Result<Json<Task>, ApiError> {
    let start_time = parse_boundary_date(&body.start_time).map_err(|e| bad_request(&e))?;
    let end_time = body
        .end_time
        .as_deref()
        .map(parse_boundary_date)
        .transpose()
        .map_err(|e| bad_request(&e))?;

    let task = ctx
        .tasks
        .create_task(NewTask {
            routine_id: body.routine_id,
            title: body.title,
            description: body.description,
            start_time,
            end_time,
            is_recurring: body.is_recurring,
            frequency: body.frequency,
        })
        .await
        .map_err(engine_error)?;
    Ok(Json(task))
}

#[derive(Debug, Deserialize)]
pub struct UpdateTaskQuery {
    pub id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTaskRequest {
    pub status: String,
    pub notes: Option<String>,
}

/// `PUT /api/v1/tasks?id=<taskId>` — record a status change. Returns the
/// updated task with its full progress history.
pub async fn update_task(
    State(ctx): State<Arc<AppContext>>,
    Query(q): Query<UpdateTaskQuery>,
    Json(body): Json<UpdateTaskRequest>,
) -> Result<Json<Task>, ApiError> {
    let Some(task_id) = q.id else {
        return Err(bad_request("Task ID is required"));
    };
    let status: TaskStatus = body.status.parse().map_err(|e: String| bad_request(&e))?;

    let task = ctx
        .tasks
        .update_status(&task_id, status, body.notes.as_deref())
        .await
        .map_err(engine_error)?;
    Ok(Json(task))
}
