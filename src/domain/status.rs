use crate::domain::models::{TaskStatus, TimeWindow};
use chrono::{DateTime, Utc};

/// Display status of an occurrence window at `now`.
///
/// A pinned completion always wins; otherwise the window is compared
/// against the clock. Never cache the result: it goes stale as time passes.
pub fn derive_status(window: TimeWindow, now: DateTime<Utc>, pinned_completed: bool) -> TaskStatus {
    if pinned_completed {
        TaskStatus::Completed
    } else if window.contains(now) {
        TaskStatus::InProgress
    } else if window.end < now {
        TaskStatus::Expired
    } else {
        TaskStatus::NotStarted
    }
}
