use crate::domain::models::{CalendarEvent, Task, TaskStatus, TaskUpdate, TimeWindow};
use crate::domain::status::derive_status;
use crate::infrastructure::error::InfraError;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Local edit produced by a drag or resize, ready to be persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reschedule {
    pub event: CalendarEvent,
    pub update: TaskUpdate,
    pub revision: u64,
}

/// Read-through projection of the backend's tasks as calendar events.
///
/// The backend stays the source of truth; this list is replaced wholesale
/// on refresh and edited optimistically in between. Revisions count local
/// reschedules per event and survive refreshes, so a write report can be
/// matched against the latest local intent.
///
/// A refresh cannot undo a newer local reschedule: the last local edit of
/// each event is laid over fetched tasks while its write is unsettled or
/// when the fetch was issued before the edit.
#[derive(Debug, Default)]
pub struct CalendarBoard {
    events: Vec<CalendarEvent>,
    revisions: HashMap<String, u64>,
    local_edits: HashMap<String, LocalEdit>,
    edit_mark: u64,
}

#[derive(Debug, Clone)]
struct LocalEdit {
    mark: u64,
    event: CalendarEvent,
    settled: bool,
}

impl CalendarBoard {
    /// Replaces every event with a fetch issued just now; returns how many
    /// tasks had no usable window.
    pub fn replace_from_tasks(&mut self, tasks: &[Task]) -> usize {
        self.replace_as_of(tasks, self.edit_mark)
    }

    /// Counter of local reschedules. Capture it when a fetch is issued and
    /// hand it back to [`Self::replace_as_of`].
    pub fn edit_mark(&self) -> u64 {
        self.edit_mark
    }

    /// Replaces every event with tasks fetched when the board stood at
    /// `issued_at`. Local edits that fetch could not have seen win.
    pub fn replace_as_of(&mut self, tasks: &[Task], issued_at: u64) -> usize {
        let mut skipped = 0;
        let mut events = Vec::with_capacity(tasks.len());
        for task in tasks {
            match task.to_calendar_event() {
                Some(event) => events.push(event),
                None => {
                    skipped += 1;
                    tracing::debug!(task_id = %task.id, "task has no dates; not shown on calendar");
                }
            }
        }
        for event in &mut events {
            let Some(edit) = self.local_edits.get(&event.id) else {
                continue;
            };
            if edit.settled && edit.mark <= issued_at {
                continue;
            }
            let local = &edit.event;
            let completed = event.is_completed() || local.is_completed();
            event.start = local.start;
            event.end = local.end;
            event.all_day = local.all_day;
            event.status = if completed { TaskStatus::Completed } else { local.status };
            tracing::debug!(task_id = %event.id, issued_at, "kept newer local reschedule over refresh");
        }
        events.sort_by(|left, right| left.start.cmp(&right.start));
        self.events = events;
        skipped
    }

    pub fn events(&self) -> &[CalendarEvent] {
        &self.events
    }

    pub fn get(&self, event_id: &str) -> Option<&CalendarEvent> {
        self.events.iter().find(|event| event.id == event_id)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Events with their status re-derived against `now`.
    pub fn display_events(&self, now: DateTime<Utc>) -> Vec<CalendarEvent> {
        self.events
            .iter()
            .map(|event| CalendarEvent {
                status: derive_status(event.window(), now, event.is_completed()),
                ..event.clone()
            })
            .collect()
    }

    /// Drag and resize share this path. A completed event keeps its status;
    /// anything else is reclassified against the new window.
    pub fn reschedule(
        &mut self,
        event_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        all_day: bool,
        now: DateTime<Utc>,
    ) -> Result<Reschedule, InfraError> {
        let window = TimeWindow::new(start, end).map_err(InfraError::InvalidInput)?;
        let Some(event) = self.events.iter_mut().find(|event| event.id == event_id) else {
            return Err(InfraError::NotFound(format!("calendar event {event_id}")));
        };

        let status = if event.is_completed() {
            TaskStatus::Completed
        } else {
            derive_status(window, now, false)
        };
        event.start = window.start;
        event.end = window.end;
        event.all_day = all_day;
        event.status = status;
        let event = event.clone();
        self.edit_mark += 1;
        self.local_edits.insert(
            event.id.clone(),
            LocalEdit {
                mark: self.edit_mark,
                event: event.clone(),
                settled: false,
            },
        );

        let revision = self.revisions.entry(event.id.clone()).or_insert(0);
        *revision += 1;

        Ok(Reschedule {
            update: TaskUpdate::schedule(window, status),
            revision: *revision,
            event,
        })
    }

    pub fn revision(&self, event_id: &str) -> u64 {
        self.revisions.get(event_id).copied().unwrap_or(0)
    }

    pub fn is_latest(&self, event_id: &str, revision: u64) -> bool {
        self.revision(event_id) == revision
    }

    /// Records that the write for `revision` has reported back. Returns false
    /// when a newer reschedule has superseded it; that one stays unsettled.
    pub fn settle(&mut self, event_id: &str, revision: u64) -> bool {
        if !self.is_latest(event_id, revision) {
            return false;
        }
        if let Some(edit) = self.local_edits.get_mut(event_id) {
            edit.settled = true;
        }
        true
    }

    /// Pins an event to `Completed`; false when the event is gone.
    pub fn apply_completed(&mut self, event_id: &str) -> bool {
        match self.events.iter_mut().find(|event| event.id == event_id) {
            Some(event) => {
                event.status = TaskStatus::Completed;
                if let Some(edit) = self.local_edits.get_mut(event_id) {
                    edit.event.status = TaskStatus::Completed;
                }
                true
            }
            None => false,
        }
    }
}
