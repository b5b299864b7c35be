//! The task engine: schedule parsing, materialization, and progress tracking
//! behind one facade.
//!
//! `TaskService` is what the HTTP layer talks to. Materialization and listing
//! are two explicit operations — the GET handler calls both in sequence — so
//! the list itself stays a pure read.

pub mod materializer;
pub mod schedule;
pub mod task;

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::info;

pub use task::{ProgressEntry, Task, TaskStatus};

use crate::storage::{Storage, TaskRow};

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Missing or malformed request fields. Detected before any side effect.
    #[error("invalid request: {0}")]
    Validation(String),
    /// A referenced routine or task id does not resolve.
    #[error("not found: {0}")]
    NotFound(String),
    /// The persistence layer or an external collaborator failed.
    #[error(transparent)]
    Dependency(#[from] anyhow::Error),
}

/// Filter for a pure task listing.
#[derive(Debug, Default, Clone)]
pub struct TaskFilter {
    pub routine_id: Option<String>,
    /// Inclusive bounds on `start_time`. Applied only when both are present.
    pub range: Option<(DateTime<Utc>, DateTime<Utc>)>,
}

/// A manually created, non-recurring-by-default task.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub routine_id: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub is_recurring: bool,
    pub frequency: Option<String>,
}

#[derive(Clone)]
pub struct TaskService {
    storage: Arc<Storage>,
    horizon_days: u32,
}

impl TaskService {
    pub fn new(storage: Arc<Storage>, horizon_days: u32) -> Self {
        Self {
            storage,
            horizon_days,
        }
    }

    /// Materialize the routine's schedule over the requested range.
    ///
    /// Idempotent: days that already carry task instances are left as they
    /// are. An unknown routine id yields an empty result, not an error —
    /// this is the read path's soft behavior.
    pub async fn ensure_materialized(
        &self,
        routine_id: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<TaskRow>, EngineError> {
        let (start, end) = materializer::resolve_range(start, end, self.horizon_days)?;
        let Some(routine) = self.storage.get_routine(routine_id).await? else {
            return Ok(Vec::new());
        };
        materializer::ensure_tasks_for_range(&self.storage, &routine, start, end).await
    }

    /// Pure read: tasks matching the filter, each with its progress history,
    /// ordered by start time.
    pub async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>, EngineError> {
        let range = filter
            .range
            .map(|(s, e)| (s.to_rfc3339(), e.to_rfc3339()));
        let rows = self
            .storage
            .list_tasks(
                filter.routine_id.as_deref(),
                range.as_ref().map(|(s, e)| (s.as_str(), e.as_str())),
            )
            .await?;
        self.with_progress(rows).await
    }

    /// Create a manual task. Validation happens before any write; an unknown
    /// routine id is an error here, unlike on the read path.
    pub async fn create_task(&self, spec: NewTask) -> Result<Task, EngineError> {
        if spec.title.trim().is_empty() {
            return Err(EngineError::Validation("title must not be empty".into()));
        }
        if let Some(rid) = spec.routine_id.as_deref() {
            if self.storage.get_routine(rid).await?.is_none() {
                return Err(EngineError::NotFound(format!("routine {rid}")));
            }
        }
        let row = self
            .storage
            .create_manual_task(
                spec.routine_id.as_deref(),
                spec.title.trim(),
                spec.description.as_deref(),
                &spec.start_time.to_rfc3339(),
                spec.end_time.map(|t| t.to_rfc3339()).as_deref(),
                spec.is_recurring,
                spec.frequency.as_deref(),
            )
            .await?;
        Ok(Task::from_row(row, Vec::new()))
    }

    /// Record a status change: the task's status field and one appended
    /// progress entry, committed together.
    pub async fn update_status(
        &self,
        task_id: &str,
        status: TaskStatus,
        notes: Option<&str>,
    ) -> Result<Task, EngineError> {
        let updated = self
            .storage
            .update_task_status(task_id, status.as_str(), notes)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("task {task_id}")))?;
        info!(%task_id, status = %status, "task status updated");
        let progress = self.storage.list_progress(task_id).await?;
        Ok(Task::from_row(updated, progress))
    }

    async fn with_progress(&self, rows: Vec<TaskRow>) -> Result<Vec<Task>, EngineError> {
        let mut tasks = Vec::with_capacity(rows.len());
        for row in rows {
            let progress = self.storage.list_progress(&row.id).await?;
            tasks.push(Task::from_row(row, progress));
        }
        Ok(tasks)
    }
}
