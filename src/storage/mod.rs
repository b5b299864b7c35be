//! SQLite persistence for routines, tasks, and progress entries.

use anyhow::{Context as _, Result};
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::{path::Path, str::FromStr};
use uuid::Uuid;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("src/storage/migrations");

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RoutineRow {
    pub id: String,
    /// The user's free-text prompt the routine was generated from.
    pub input: String,
    /// The generated narrative schedule.
    pub output: String,
    /// JSON array of `{time, activity, description}` slot objects.
    /// NULL when the routine has no structured schedule yet.
    pub schedule: Option<String>,
    pub tags: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TaskRow {
    pub id: String,
    pub routine_id: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub start_time: String,
    pub end_time: Option<String>,
    pub status: String,
    pub is_recurring: bool,
    pub frequency: Option<String>,
    /// Calendar day (YYYY-MM-DD) this task was materialized for.
    /// NULL for manually created tasks.
    pub slot_day: Option<String>,
    /// Index of the schedule slot this task was expanded from.
    pub slot_index: Option<i64>,
    pub created_at: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProgressEntryRow {
    pub id: String,
    pub task_id: String,
    pub date: String,
    pub status: String,
    pub notes: Option<String>,
}

#[derive(Clone)]
pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    pub async fn new(data_dir: &Path) -> Result<Self> {
        tokio::fs::create_dir_all(data_dir).await?;
        let db_path = data_dir.join("routined.db");
        let opts =
            SqliteConnectOptions::from_str(&format!("sqlite://{}?mode=rwc", db_path.display()))?
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
                .foreign_keys(true)
                .create_if_missing(true);
        let pool = SqlitePool::connect_with(opts).await?;
        MIGRATOR
            .run(&pool)
            .await
            .context("Failed to run database migrations")?;
        Ok(Self { pool })
    }

    /// In-memory database for tests. Capped at one connection — each SQLite
    /// `:memory:` connection is its own database.
    pub async fn in_memory() -> Result<Self> {
        let opts = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await?;
        MIGRATOR.run(&pool).await?;
        Ok(Self { pool })
    }

    // ─── Routines ───────────────────────────────────────────────────────────

    pub async fn create_routine(
        &self,
        input: &str,
        output: &str,
        schedule: Option<&str>,
        tags: Option<&str>,
    ) -> Result<RoutineRow> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO routines (id, input, output, schedule, tags, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(input)
        .bind(output)
        .bind(schedule)
        .bind(tags)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        self.get_routine(&id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("routine not found after insert"))
    }

    pub async fn get_routine(&self, id: &str) -> Result<Option<RoutineRow>> {
        Ok(sqlx::query_as("SELECT * FROM routines WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn list_routines(&self) -> Result<Vec<RoutineRow>> {
        Ok(
            sqlx::query_as("SELECT * FROM routines ORDER BY created_at DESC")
                .fetch_all(&self.pool)
                .await?,
        )
    }

    // ─── Tasks ──────────────────────────────────────────────────────────────

    #[allow(clippy::too_many_arguments)]
    pub async fn create_manual_task(
        &self,
        routine_id: Option<&str>,
        title: &str,
        description: Option<&str>,
        start_time: &str,
        end_time: Option<&str>,
        is_recurring: bool,
        frequency: Option<&str>,
    ) -> Result<TaskRow> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO tasks
             (id, routine_id, title, description, start_time, end_time, status,
              is_recurring, frequency, created_at)
             VALUES (?, ?, ?, ?, ?, ?, 'pending', ?, ?, ?)",
        )
        .bind(&id)
        .bind(routine_id)
        .bind(title)
        .bind(description)
        .bind(start_time)
        .bind(end_time)
        .bind(is_recurring)
        .bind(frequency)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        self.get_task(&id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("task not found after insert"))
    }

    /// Insert one materialized task instance for a (routine, day, slot) triple.
    ///
    /// The UNIQUE constraint on `(routine_id, slot_day, slot_index)` makes
    /// this safe under concurrent materialization of overlapping ranges: a
    /// conflicting insert is ignored and the already-existing row is returned
    /// instead, so the same triple can never yield two tasks.
    pub async fn insert_materialized_task(
        &self,
        routine_id: &str,
        title: &str,
        description: Option<&str>,
        start_time: &str,
        slot_day: &str,
        slot_index: i64,
    ) -> Result<TaskRow> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT OR IGNORE INTO tasks
             (id, routine_id, title, description, start_time, end_time, status,
              is_recurring, frequency, slot_day, slot_index, created_at)
             VALUES (?, ?, ?, ?, ?, NULL, 'pending', 1, 'daily', ?, ?, ?)",
        )
        .bind(&id)
        .bind(routine_id)
        .bind(title)
        .bind(description)
        .bind(start_time)
        .bind(slot_day)
        .bind(slot_index)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        // Fetch by the materialization key — covers both the fresh insert and
        // the ignored-conflict case.
        sqlx::query_as(
            "SELECT * FROM tasks WHERE routine_id = ? AND slot_day = ? AND slot_index = ?",
        )
        .bind(routine_id)
        .bind(slot_day)
        .bind(slot_index)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| anyhow::anyhow!("materialized task not found after insert"))
    }

    pub async fn get_task(&self, id: &str) -> Result<Option<TaskRow>> {
        Ok(sqlx::query_as("SELECT * FROM tasks WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    /// List tasks with optional routine and date-range filters, ordered by
    /// start time ascending. The range filter only applies when both bounds
    /// are present, matching the public query contract.
    pub async fn list_tasks(
        &self,
        routine_id: Option<&str>,
        range: Option<(&str, &str)>,
    ) -> Result<Vec<TaskRow>> {
        match (routine_id, range) {
            (Some(rid), Some((start, end))) => Ok(sqlx::query_as(
                "SELECT * FROM tasks
                 WHERE routine_id = ? AND start_time >= ? AND start_time <= ?
                 ORDER BY start_time ASC",
            )
            .bind(rid)
            .bind(start)
            .bind(end)
            .fetch_all(&self.pool)
            .await?),
            (Some(rid), None) => Ok(sqlx::query_as(
                "SELECT * FROM tasks WHERE routine_id = ? ORDER BY start_time ASC",
            )
            .bind(rid)
            .fetch_all(&self.pool)
            .await?),
            (None, Some((start, end))) => Ok(sqlx::query_as(
                "SELECT * FROM tasks
                 WHERE start_time >= ? AND start_time <= ?
                 ORDER BY start_time ASC",
            )
            .bind(start)
            .bind(end)
            .fetch_all(&self.pool)
            .await?),
            (None, None) => Ok(
                sqlx::query_as("SELECT * FROM tasks ORDER BY start_time ASC")
                    .fetch_all(&self.pool)
                    .await?,
            ),
        }
    }

    // ─── Progress ───────────────────────────────────────────────────────────

    /// Set a task's status and append the matching progress entry in one
    /// transaction — a reader never observes one without the other.
    ///
    /// Returns `None` when the task id does not resolve (nothing written).
    pub async fn update_task_status(
        &self,
        task_id: &str,
        status: &str,
        notes: Option<&str>,
    ) -> Result<Option<TaskRow>> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query("UPDATE tasks SET status = ? WHERE id = ?")
            .bind(status)
            .bind(task_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if updated == 0 {
            return Ok(None);
        }

        let entry_id = Uuid::new_v4().to_string();
        sqlx::query(
            "INSERT INTO progress_entries (id, task_id, date, status, notes)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&entry_id)
        .bind(task_id)
        .bind(&now)
        .bind(status)
        .bind(notes)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        self.get_task(task_id).await
    }

    pub async fn list_progress(&self, task_id: &str) -> Result<Vec<ProgressEntryRow>> {
        Ok(sqlx::query_as(
            "SELECT * FROM progress_entries WHERE task_id = ? ORDER BY date ASC, id ASC",
        )
        .bind(task_id)
        .fetch_all(&self.pool)
        .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn materialized_insert_is_idempotent_per_key() {
        let s = Storage::in_memory().await.unwrap();
        let routine = s.create_routine("in", "out", None, None).await.unwrap();

        let a = s
            .insert_materialized_task(
                &routine.id,
                "Run",
                None,
                "2024-01-01T07:00:00+00:00",
                "2024-01-01",
                0,
            )
            .await
            .unwrap();
        let b = s
            .insert_materialized_task(
                &routine.id,
                "Run",
                None,
                "2024-01-01T07:00:00+00:00",
                "2024-01-01",
                0,
            )
            .await
            .unwrap();
        assert_eq!(a.id, b.id);

        let all = s.list_tasks(Some(&routine.id), None).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].status, "pending");
        assert!(all[0].is_recurring);
        assert_eq!(all[0].frequency.as_deref(), Some("daily"));
    }

    #[tokio::test]
    async fn manual_tasks_bypass_the_materialization_constraint() {
        let s = Storage::in_memory().await.unwrap();
        // Two manual tasks with no slot key must both insert (NULLs are
        // distinct under SQLite UNIQUE).
        let t1 = s
            .create_manual_task(None, "A", None, "2024-01-01T08:00:00+00:00", None, false, None)
            .await
            .unwrap();
        let t2 = s
            .create_manual_task(None, "B", None, "2024-01-01T09:00:00+00:00", None, false, None)
            .await
            .unwrap();
        assert_ne!(t1.id, t2.id);
        assert_eq!(s.list_tasks(None, None).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn status_update_writes_task_and_progress_together() {
        let s = Storage::in_memory().await.unwrap();
        let task = s
            .create_manual_task(None, "A", None, "2024-01-01T08:00:00+00:00", None, false, None)
            .await
            .unwrap();

        let updated = s
            .update_task_status(&task.id, "completed", Some("done early"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.status, "completed");

        let progress = s.list_progress(&task.id).await.unwrap();
        assert_eq!(progress.len(), 1);
        assert_eq!(progress[0].status, "completed");
        assert_eq!(progress[0].notes.as_deref(), Some("done early"));
    }

    #[tokio::test]
    async fn status_update_on_unknown_task_writes_nothing() {
        let s = Storage::in_memory().await.unwrap();
        let result = s
            .update_task_status("no-such-task", "completed", None)
            .await
            .unwrap();
        assert!(result.is_none());
        let progress = s.list_progress("no-such-task").await.unwrap();
        assert!(progress.is_empty());
    }

    #[tokio::test]
    async fn range_filter_is_inclusive() {
        let s = Storage::in_memory().await.unwrap();
        for (title, ts) in [
            ("before", "2023-12-31T23:00:00+00:00"),
            ("inside", "2024-01-01T05:00:00+00:00"),
            ("after", "2024-01-02T01:00:00+00:00"),
        ] {
            s.create_manual_task(None, title, None, ts, None, false, None)
                .await
                .unwrap();
        }
        let rows = s
            .list_tasks(
                None,
                Some(("2024-01-01T00:00:00+00:00", "2024-01-01T23:59:59+00:00")),
            )
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].title, "inside");
    }
}
