//! Task and progress types as they appear on the wire.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::storage::{ProgressEntryRow, TaskRow};

/// Lifecycle states a task can be in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Completed,
    Skipped,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Completed => "completed",
            TaskStatus::Skipped => "skipped",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "completed" => Ok(TaskStatus::Completed),
            "skipped" => Ok(TaskStatus::Skipped),
            other => Err(format!(
                "unknown status '{other}' (expected pending, completed, or skipped)"
            )),
        }
    }
}

/// One concrete, dated task instance — either materialized from a routine's
/// schedule or created manually.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub routine_id: Option<String>,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub start_time: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
    pub status: String,
    pub is_recurring: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency: Option<String>,
    pub created_at: String,
    pub progress: Vec<ProgressEntry>,
}

/// Immutable record of a status change.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEntry {
    pub id: String,
    pub task_id: String,
    pub date: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl Task {
    pub fn from_row(row: TaskRow, progress: Vec<ProgressEntryRow>) -> Self {
        Self {
            id: row.id,
            routine_id: row.routine_id,
            title: row.title,
            description: row.description,
            start_time: row.start_time,
            end_time: row.end_time,
            status: row.status,
            is_recurring: row.is_recurring,
            frequency: row.frequency,
            created_at: row.created_at,
            progress: progress.into_iter().map(ProgressEntry::from_row).collect(),
        }
    }
}

impl ProgressEntry {
    pub fn from_row(row: ProgressEntryRow) -> Self {
        Self {
            id: row.id,
            task_id: row.task_id,
            date: row.date,
            status: row.status,
            notes: row.notes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_str() {
        for (s, v) in [
            ("pending", TaskStatus::Pending),
            ("completed", TaskStatus::Completed),
            ("skipped", TaskStatus::Skipped),
        ] {
            assert_eq!(s.parse::<TaskStatus>().unwrap(), v);
            assert_eq!(v.to_string(), s);
        }
        assert!("done".parse::<TaskStatus>().is_err());
    }
}
