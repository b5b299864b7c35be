// rest/routes/routines.rs — Routine listing, creation, and generation.

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

use super::{bad_request, ApiError};
use crate::engine::schedule::validate_schedule_document;
use crate::storage::RoutineRow;
use crate::AppContext;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Routine {
    pub id: String,
    pub input: String,
    pub output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<String>,
    pub created_at: String,
}

impl From<RoutineRow> for Routine {
    fn from(row: RoutineRow) -> Self {
        Self {
            id: row.id,
            input: row.input,
            output: row.output,
            schedule: row.schedule,
            tags: row.tags,
            created_at: row.created_at,
        }
    }
}

/// `GET /api/v1/routines` — newest first.
pub async fn list_routines(
    State(ctx): State<Arc<AppContext>>,
) -> Result<Json<Vec<Routine>>, ApiError> {
    let rows = ctx.storage.list_routines().await.map_err(internal)?;
    Ok(Json(rows.into_iter().map(Routine::from).collect()))
}

#[derive(Debug, Deserialize)]
pub struct CreateRoutineRequest {
    pub input: String,
    pub output: String,
    /// Either a JSON array of slot objects or that array pre-serialized as a
    /// string. Validated before it reaches the database.
    pub schedule: Option<Value>,
    pub tags: Option<String>,
}

/// `POST /api/v1/routines` — store a routine directly.
pub async fn create_routine(
    State(ctx): State<Arc<AppContext>>,
    Json(body): Json<CreateRoutineRequest>,
) -> Result<Json<Routine>, ApiError> {
    let schedule = match body.schedule {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => {
            validate_schedule_document(&s).map_err(|e| bad_request(&e))?;
            Some(s)
        }
        Some(v @ Value::Array(_)) => {
            let s = v.to_string();
            validate_schedule_document(&s).map_err(|e| bad_request(&e))?;
            Some(s)
        }
        Some(_) => return Err(bad_request("schedule must be a JSON array of slot objects")),
    };

    let row = ctx
        .storage
        .create_routine(
            &body.input,
            &body.output,
            schedule.as_deref(),
            body.tags.as_deref(),
        )
        .await
        .map_err(internal)?;
    Ok(Json(row.into()))
}

#[derive(Debug, Deserialize)]
pub struct GenerateRoutineRequest {
    pub prompt: Option<String>,
}

/// `POST /api/v1/routines/generate` — call the completion API with the user's
/// prompt and persist the generated routine.
pub async fn generate_routine(
    State(ctx): State<Arc<AppContext>>,
    Json(body): Json<GenerateRoutineRequest>,
) -> Result<Json<Routine>, ApiError> {
    let prompt = body.prompt.as_deref().map(str::trim).unwrap_or_default();
    if prompt.is_empty() {
        return Err(bad_request(
            "Please provide a description of your routine goals",
        ));
    }

    let Some(client) = ctx.generator.as_ref() else {
        return Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "completion API key is not configured" })),
        ));
    };

    let generated = client.generate_routine(prompt).await.map_err(internal)?;
    let row = ctx
        .storage
        .create_routine(prompt, &generated.narrative, generated.schedule.as_deref(), None)
        .await
        .map_err(internal)?;
    Ok(Json(row.into()))
}

fn internal(e: anyhow::Error) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": e.to_string() })),
    )
}
