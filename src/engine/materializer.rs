//! Task materialization: expanding a routine's schedule slots into concrete
//! task instances, one per (day, slot) pair.
//!
//! Days are civil calendar dates (UTC), stepped with `NaiveDate::succ_opt`
//! rather than a fixed 24-hour offset, so a day is never skipped or doubled.
//! The loop reads the routine's existing tasks for the whole range once up
//! front and only creates instances for days found empty, which makes the
//! operation idempotent per day: re-running it for an overlapping range only
//! fills the gaps. A dependency failure mid-loop leaves earlier days
//! committed — a retry completes the rest.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use std::collections::BTreeMap;
use tracing::debug;

use super::schedule::{parse_schedule, ScheduleSlot};
use super::EngineError;
use crate::storage::{RoutineRow, Storage, TaskRow};

/// Resolve an optional request range into concrete inclusive bounds.
///
/// Missing start defaults to `now`; missing end defaults to start plus the
/// configured horizon. A start after the end is a validation error.
pub fn resolve_range(
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    horizon_days: u32,
) -> Result<(DateTime<Utc>, DateTime<Utc>), EngineError> {
    let start = start.unwrap_or_else(Utc::now);
    let end = end.unwrap_or_else(|| start + Duration::days(i64::from(horizon_days)));
    if start > end {
        return Err(EngineError::Validation(format!(
            "startDate {start} is after endDate {end}"
        )));
    }
    Ok((start, end))
}

/// Materialize tasks for every day of `[start, end]` that does not already
/// have instances, and return the full task set for the range in day order
/// (existing tasks for a day keep their stored start-time order).
pub async fn ensure_tasks_for_range(
    storage: &Storage,
    routine: &RoutineRow,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<Vec<TaskRow>, EngineError> {
    let first = start.date_naive();
    let last = end.date_naive();

    // One read for the whole range; per-day partitions come from this map.
    let range_start = day_start(first).to_rfc3339();
    let range_end = day_end(last).to_rfc3339();
    let existing = storage
        .list_tasks(Some(&routine.id), Some((&range_start, &range_end)))
        .await?;
    let mut by_day: BTreeMap<NaiveDate, Vec<TaskRow>> = BTreeMap::new();
    for row in existing {
        if let Ok(ts) = DateTime::parse_from_rfc3339(&row.start_time) {
            by_day
                .entry(ts.with_timezone(&Utc).date_naive())
                .or_default()
                .push(row);
        }
    }

    let slots = parse_schedule(routine.schedule.as_deref());

    let mut out = Vec::new();
    let mut day = first;
    loop {
        match by_day.remove(&day) {
            // Day already materialized: reuse, never retro-edit.
            Some(tasks) => out.extend(tasks),
            None => {
                for (index, slot) in slots.iter().enumerate() {
                    let row = storage
                        .insert_materialized_task(
                            &routine.id,
                            &slot.activity,
                            slot.description.as_deref(),
                            &slot_start(day, slot).to_rfc3339(),
                            &day.to_string(),
                            index as i64,
                        )
                        .await?;
                    out.push(row);
                }
                if !slots.is_empty() {
                    debug!(routine_id = %routine.id, %day, slots = slots.len(), "materialized day");
                }
            }
        }
        if day >= last {
            break;
        }
        let Some(next) = day.succ_opt() else { break };
        day = next;
    }
    Ok(out)
}

fn day_start(day: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&day.and_time(NaiveTime::MIN))
}

fn day_end(day: NaiveDate) -> DateTime<Utc> {
    let end = NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN);
    Utc.from_utc_datetime(&day.and_time(end))
}

fn slot_start(day: NaiveDate, slot: &ScheduleSlot) -> DateTime<Utc> {
    let time = NaiveTime::from_hms_opt(slot.hour, slot.minute, 0).unwrap_or(NaiveTime::MIN);
    Utc.from_utc_datetime(&day.and_time(time))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_SLOTS: &str = r#"[
        {"time": "05:00", "activity": "Meditate"},
        {"time": "06:00", "activity": "Exercise"}
    ]"#;

    fn utc(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    async fn routine_with(schedule: Option<&str>) -> (Storage, RoutineRow) {
        let storage = Storage::in_memory().await.unwrap();
        let routine = storage
            .create_routine("morning focus", "narrative", schedule, None)
            .await
            .unwrap();
        (storage, routine)
    }

    #[tokio::test]
    async fn single_day_range_creates_one_task_per_slot() {
        let (storage, routine) = routine_with(Some(TWO_SLOTS)).await;
        let start = utc(2024, 1, 1, 0);

        let tasks = ensure_tasks_for_range(&storage, &routine, start, start)
            .await
            .unwrap();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].start_time, "2024-01-01T05:00:00+00:00");
        assert_eq!(tasks[1].start_time, "2024-01-01T06:00:00+00:00");
        assert!(tasks.iter().all(|t| t.status == "pending"));
        assert!(tasks.iter().all(|t| t.is_recurring));
    }

    #[tokio::test]
    async fn repeat_invocation_returns_same_tasks_not_duplicates() {
        let (storage, routine) = routine_with(Some(TWO_SLOTS)).await;
        let start = utc(2024, 1, 1, 0);

        let first = ensure_tasks_for_range(&storage, &routine, start, start)
            .await
            .unwrap();
        let second = ensure_tasks_for_range(&storage, &routine, start, start)
            .await
            .unwrap();

        let mut first_ids: Vec<_> = first.iter().map(|t| t.id.clone()).collect();
        let mut second_ids: Vec<_> = second.iter().map(|t| t.id.clone()).collect();
        first_ids.sort();
        second_ids.sort();
        assert_eq!(first_ids, second_ids);
        assert_eq!(storage.list_tasks(Some(&routine.id), None).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn n_slots_times_d_days() {
        let (storage, routine) = routine_with(Some(TWO_SLOTS)).await;
        let tasks =
            ensure_tasks_for_range(&storage, &routine, utc(2024, 1, 1, 0), utc(2024, 1, 7, 0))
                .await
                .unwrap();
        // 2 slots × 7 days inclusive
        assert_eq!(tasks.len(), 14);
    }

    #[tokio::test]
    async fn shifted_overlapping_range_only_fills_new_days() {
        let (storage, routine) = routine_with(Some(TWO_SLOTS)).await;
        ensure_tasks_for_range(&storage, &routine, utc(2024, 1, 1, 0), utc(2024, 1, 3, 0))
            .await
            .unwrap();
        let widened =
            ensure_tasks_for_range(&storage, &routine, utc(2024, 1, 2, 0), utc(2024, 1, 5, 0))
                .await
                .unwrap();
        assert_eq!(widened.len(), 8); // days 2..=5
        // 5 distinct days in total, 2 slots each.
        assert_eq!(
            storage.list_tasks(Some(&routine.id), None).await.unwrap().len(),
            10
        );
    }

    #[tokio::test]
    async fn populated_day_is_untouched_even_after_schedule_change() {
        let (storage, routine) = routine_with(Some(TWO_SLOTS)).await;
        let day = utc(2024, 1, 1, 0);
        let before = ensure_tasks_for_range(&storage, &routine, day, day)
            .await
            .unwrap();

        // Re-materialize through a routine value whose schedule has since
        // grown a third slot — the day already has instances, so nothing new.
        let mut edited = routine.clone();
        edited.schedule = Some(
            r#"[
                {"time": "05:00", "activity": "Meditate"},
                {"time": "06:00", "activity": "Exercise"},
                {"time": "07:00", "activity": "Read"}
            ]"#
            .to_string(),
        );
        let after = ensure_tasks_for_range(&storage, &edited, day, day)
            .await
            .unwrap();
        assert_eq!(after.len(), before.len());
    }

    #[tokio::test]
    async fn no_schedule_means_no_tasks_and_no_error() {
        let (storage, routine) = routine_with(None).await;
        let tasks =
            ensure_tasks_for_range(&storage, &routine, utc(2024, 1, 1, 0), utc(2024, 1, 10, 0))
                .await
                .unwrap();
        assert!(tasks.is_empty());

        let (storage, routine) = routine_with(Some("not even json")).await;
        let tasks =
            ensure_tasks_for_range(&storage, &routine, utc(2024, 1, 1, 0), utc(2024, 1, 10, 0))
                .await
                .unwrap();
        assert!(tasks.is_empty());
    }

    #[tokio::test]
    async fn malformed_time_entries_materialize_only_valid_slots() {
        let schedule = r#"[
            {"time": "7:00", "activity": "Run"},
            {"time": "bad", "activity": "X"}
        ]"#;
        let (storage, routine) = routine_with(Some(schedule)).await;
        let day = utc(2024, 1, 1, 0);
        let tasks = ensure_tasks_for_range(&storage, &routine, day, day)
            .await
            .unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].title, "Run");
    }

    #[test]
    fn range_defaults_and_validation() {
        let start = utc(2024, 1, 1, 0);
        let (s, e) = resolve_range(Some(start), None, 30).unwrap();
        assert_eq!(s, start);
        assert_eq!(e, start + Duration::days(30));

        let (s, e) = resolve_range(None, None, 30).unwrap();
        assert_eq!(e - s, Duration::days(30));

        let err = resolve_range(Some(utc(2024, 1, 2, 0)), Some(utc(2024, 1, 1, 0)), 30);
        assert!(matches!(err, Err(EngineError::Validation(_))));
    }

    #[test]
    fn day_bounds_cover_the_whole_civil_day() {
        let day = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
        assert_eq!(day_start(day).to_rfc3339(), "2024-03-10T00:00:00+00:00");
        assert_eq!(day_end(day).to_rfc3339(), "2024-03-10T23:59:59+00:00");
    }
}
