//! Schedule parsing: a routine's stored schedule text into validated
//! time-of-day slots.
//!
//! Parsing is deliberately soft. A routine may have no structured schedule
//! yet, or the stored text may predate validation — both cases yield an
//! empty slot list rather than an error, and individual entries with an
//! unparsable time are dropped rather than failing the whole schedule.

use serde::{Deserialize, Serialize};

/// One stored schedule entry, before time validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawSlot {
    pub time: String,
    pub activity: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A validated time-of-day slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleSlot {
    pub hour: u32,
    pub minute: u32,
    pub activity: String,
    pub description: Option<String>,
}

/// Parse a routine's serialized schedule into slots.
///
/// Output order follows input order; callers must not rely on it being
/// time-sorted.
pub fn parse_schedule(raw: Option<&str>) -> Vec<ScheduleSlot> {
    let Some(raw) = raw else {
        return Vec::new();
    };
    let entries: Vec<RawSlot> = match serde_json::from_str(raw) {
        Ok(entries) => entries,
        Err(_) => return Vec::new(),
    };
    entries
        .into_iter()
        .filter_map(|entry| {
            let (hour, minute) = parse_time(&entry.time)?;
            Some(ScheduleSlot {
                hour,
                minute,
                activity: entry.activity,
                description: entry.description,
            })
        })
        .collect()
}

/// Split "H:MM" into a valid (hour, minute) pair, or None.
fn parse_time(time: &str) -> Option<(u32, u32)> {
    let mut parts = time.splitn(2, ':');
    let hour: u32 = parts.next()?.trim().parse().ok()?;
    let minute: u32 = parts.next()?.trim().parse().ok()?;
    (hour <= 23 && minute <= 59).then_some((hour, minute))
}

/// Check that `raw` is a well-formed schedule document — a JSON array of
/// slot objects. Used on the write path so junk never reaches the database;
/// entries with bad times are still tolerated (the parser drops them).
pub fn validate_schedule_document(raw: &str) -> Result<(), String> {
    serde_json::from_str::<Vec<RawSlot>>(raw)
        .map(|_| ())
        .map_err(|e| format!("schedule must be a JSON array of slot objects: {e}"))
}
