//! Calendar and focus-timer controller for one planner view.
//!
//! The controller exclusively owns the event board, the timer session and
//! the set of in-flight backend calls. Local edits are applied before the
//! matching write is spawned, and writes finish in the background so the
//! timer can keep ticking. Results are drained with
//! [`PlannerController::next_outcome`].

use crate::application::calendar_board::CalendarBoard;
use crate::domain::models::{CalendarEvent, TaskList, TaskQuery, TaskStatus};
use crate::domain::timer::{TimerError, TimerNotice, TimerSession};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::notifier::Notifier;
use crate::infrastructure::task_api::TaskApi;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::task::JoinSet;

pub type NowProvider = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// What became of a backend write once it finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    Persisted { event_id: String },
    Completed { event_id: String },
    /// The local state is left as the user saw it; the next refresh corrects it.
    Failed { event_id: String, message: String },
    /// A newer local reschedule of the same event exists.
    Superseded { event_id: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackgroundOutcome {
    Refreshed { events: usize, skipped: usize },
    RefreshFailed { message: String },
    Write(WriteOutcome),
}

#[derive(Debug, Clone, Copy)]
enum WriteKind {
    Reschedule { revision: u64 },
    Complete,
}

#[derive(Debug)]
enum Completion {
    Refresh {
        issued_at: u64,
        result: Result<TaskList, InfraError>,
    },
    Write {
        event_id: String,
        kind: WriteKind,
        result: Result<(), InfraError>,
    },
}

pub struct PlannerController<A, N>
where
    A: TaskApi,
    N: Notifier,
{
    api: Arc<A>,
    notifier: Arc<N>,
    access_token: String,
    board: CalendarBoard,
    timer: TimerSession,
    focus_minutes: u32,
    end_early_requested: bool,
    background: JoinSet<Completion>,
    now_provider: NowProvider,
}

impl<A, N> PlannerController<A, N>
where
    A: TaskApi + 'static,
    N: Notifier + 'static,
{
    pub fn new(
        api: Arc<A>,
        notifier: Arc<N>,
        access_token: impl Into<String>,
        focus_minutes: u32,
        break_minutes: u32,
    ) -> Result<Self, InfraError> {
        let access_token = access_token.into().trim().to_string();
        if access_token.is_empty() {
            return Err(InfraError::InvalidInput("access token must not be empty".to_string()));
        }
        Ok(Self {
            api,
            notifier,
            access_token,
            board: CalendarBoard::default(),
            timer: TimerSession::new(focus_minutes, break_minutes),
            focus_minutes: focus_minutes.max(1),
            end_early_requested: false,
            background: JoinSet::new(),
            now_provider: Arc::new(Utc::now),
        })
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    pub fn board(&self) -> &CalendarBoard {
        &self.board
    }

    pub fn timer(&self) -> &TimerSession {
        &self.timer
    }

    pub fn end_early_pending(&self) -> bool {
        self.end_early_requested
    }

    pub fn has_background_work(&self) -> bool {
        !self.background.is_empty()
    }

    pub fn display_events(&self) -> Vec<CalendarEvent> {
        self.board.display_events((self.now_provider)())
    }

    /// Fetches tasks and replaces the board. A failure keeps the previous
    /// list and is only logged.
    pub async fn refresh(&mut self) -> BackgroundOutcome {
        let issued_at = self.board.edit_mark();
        let result = self.api.list_tasks(&self.access_token, &TaskQuery::default()).await;
        self.apply_refresh(result, issued_at)
    }

    /// Same as [`Self::refresh`] without waiting for the response. Reschedules
    /// made while the fetch is out are kept when it lands.
    pub fn spawn_refresh(&mut self) {
        let api = Arc::clone(&self.api);
        let access_token = self.access_token.clone();
        let issued_at = self.board.edit_mark();
        self.background.spawn(async move {
            Completion::Refresh {
                issued_at,
                result: api.list_tasks(&access_token, &TaskQuery::default()).await,
            }
        });
    }

    /// Drag or resize of an event. The board changes right away; the write
    /// is reported later through [`Self::next_outcome`].
    pub fn reschedule(
        &mut self,
        event_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        all_day: bool,
    ) -> Result<CalendarEvent, InfraError> {
        let now = (self.now_provider)();
        let reschedule = self.board.reschedule(event_id, start, end, all_day, now)?;
        tracing::info!(
            event_id,
            status = %reschedule.event.status,
            revision = reschedule.revision,
            "rescheduled event"
        );

        let api = Arc::clone(&self.api);
        let access_token = self.access_token.clone();
        let event_id = reschedule.event.id.clone();
        let update = reschedule.update;
        let revision = reschedule.revision;
        self.background.spawn(async move {
            let result = api.update_task(&access_token, &event_id, &update).await;
            Completion::Write {
                event_id,
                kind: WriteKind::Reschedule { revision },
                result,
            }
        });
        Ok(reschedule.event)
    }

    /// Ends any running timer, then asks the backend to mark the event
    /// completed. The event is pinned only once the backend agrees.
    pub fn mark_completed(&mut self, event_id: &str) -> Result<(), InfraError> {
        if self.board.get(event_id).is_none() {
            return Err(InfraError::NotFound(format!("calendar event {event_id}")));
        }
        if self.timer.is_running() {
            self.timer.end_early()?;
            self.end_early_requested = false;
            tracing::info!(event_id, "stopped running timer before completing event");
        }

        let api = Arc::clone(&self.api);
        let access_token = self.access_token.clone();
        let event_id = event_id.to_string();
        self.background.spawn(async move {
            let result = api
                .update_task_status(&access_token, &event_id, TaskStatus::Completed)
                .await;
            Completion::Write {
                event_id,
                kind: WriteKind::Complete,
                result,
            }
        });
        Ok(())
    }

    pub fn start_focus(&mut self, event_id: &str, minutes: Option<u32>) -> Result<(), InfraError> {
        if self.board.get(event_id).is_none() {
            return Err(InfraError::NotFound(format!("calendar event {event_id}")));
        }
        self.timer
            .start_focus(event_id, minutes.unwrap_or(self.focus_minutes))?;
        self.end_early_requested = false;
        tracing::info!(
            event_id,
            remaining_seconds = self.timer.remaining_seconds(),
            "focus started"
        );
        Ok(())
    }

    pub fn start_break(&mut self, minutes: Option<u32>) -> Result<(), TimerError> {
        self.timer.start_break(minutes)?;
        tracing::info!(remaining_seconds = self.timer.remaining_seconds(), "break started");
        Ok(())
    }

    pub fn restart_focus(&mut self) -> Result<(), TimerError> {
        self.timer.restart_focus()?;
        self.end_early_requested = false;
        tracing::info!(remaining_seconds = self.timer.remaining_seconds(), "focus restarted");
        Ok(())
    }

    /// First half of the early-end confirmation.
    pub fn request_end_early(&mut self) -> Result<(), TimerError> {
        if !self.timer.is_running() {
            return Err(TimerError::NotRunning);
        }
        self.end_early_requested = true;
        Ok(())
    }

    pub fn confirm_end_early(&mut self) -> Result<(), InfraError> {
        if !self.end_early_requested {
            return Err(InfraError::InvalidInput(
                "no early end is waiting for confirmation".to_string(),
            ));
        }
        self.end_early_requested = false;
        self.timer.end_early()?;
        tracing::info!("timer ended early");
        Ok(())
    }

    /// Returns whether a request was pending.
    pub fn cancel_end_early(&mut self) -> bool {
        std::mem::replace(&mut self.end_early_requested, false)
    }

    /// The view went away: drop the session without saving anything.
    pub fn close_view(&mut self) {
        if self.timer.is_running() {
            tracing::info!(phase = self.timer.phase().as_str(), "timer abandoned");
        }
        self.timer.abandon();
        self.end_early_requested = false;
    }

    /// Advances the timer by one second and fires the transition effects.
    pub fn tick(&mut self) -> Option<TimerNotice> {
        let now = (self.now_provider)();
        let bound_end = self
            .timer
            .bound_event_id()
            .and_then(|event_id| self.board.get(event_id))
            .map(|event| event.end);
        let (next, notice) = self.timer.ticked(now, bound_end);
        self.timer = next;

        let notice = notice?;
        if !self.timer.is_running() {
            self.end_early_requested = false;
        }
        tracing::info!(
            notice = ?notice,
            phase = self.timer.phase().as_str(),
            "timer transition"
        );
        self.run_effects(notice);
        Some(notice)
    }

    /// Waits for the next background call to finish and folds it into local
    /// state. `None` once nothing is in flight.
    pub async fn next_outcome(&mut self) -> Option<BackgroundOutcome> {
        loop {
            match self.background.join_next().await? {
                Ok(completion) => return Some(self.apply_completion(completion)),
                Err(error) => tracing::warn!(%error, "background call did not finish"),
            }
        }
    }

    /// Waits for every in-flight call.
    pub async fn drain(&mut self) -> Vec<BackgroundOutcome> {
        let mut outcomes = Vec::new();
        while let Some(outcome) = self.next_outcome().await {
            outcomes.push(outcome);
        }
        outcomes
    }

    fn run_effects(&self, notice: TimerNotice) {
        if let Err(error) = self.notifier.notify(notice.title(), notice.body()) {
            tracing::debug!(%error, "notification not shown");
        }
        if let Err(error) = self.notifier.play_cue() {
            tracing::debug!(%error, "audible cue not played");
        }
    }

    fn apply_refresh(&mut self, result: Result<TaskList, InfraError>, issued_at: u64) -> BackgroundOutcome {
        match result {
            Ok(list) => {
                let skipped = list.skipped + self.board.replace_as_of(&list.tasks, issued_at);
                tracing::info!(events = self.board.len(), skipped, "calendar refreshed");
                BackgroundOutcome::Refreshed {
                    events: self.board.len(),
                    skipped,
                }
            }
            Err(error) => {
                tracing::warn!(%error, "failed to fetch tasks; keeping previous events");
                BackgroundOutcome::RefreshFailed {
                    message: error.to_string(),
                }
            }
        }
    }

    fn apply_completion(&mut self, completion: Completion) -> BackgroundOutcome {
        let (event_id, kind, result) = match completion {
            Completion::Refresh { issued_at, result } => return self.apply_refresh(result, issued_at),
            Completion::Write {
                event_id,
                kind,
                result,
            } => (event_id, kind, result),
        };

        let superseded = match kind {
            WriteKind::Reschedule { revision } => !self.board.settle(&event_id, revision),
            WriteKind::Complete => false,
        };
        if superseded {
            tracing::info!(event_id = %event_id, "older reschedule superseded");
            return BackgroundOutcome::Write(WriteOutcome::Superseded { event_id });
        }

        let outcome = match (kind, result) {
            (WriteKind::Reschedule { .. }, Ok(())) => WriteOutcome::Persisted { event_id },
            (WriteKind::Complete, Ok(())) => {
                if !self.board.apply_completed(&event_id) {
                    tracing::debug!(event_id = %event_id, "completed event no longer on the board");
                }
                WriteOutcome::Completed { event_id }
            }
            (_, Err(error)) => {
                tracing::warn!(event_id = %event_id, %error, "failed to persist event change");
                WriteOutcome::Failed {
                    event_id,
                    message: error.to_string(),
                }
            }
        };
        BackgroundOutcome::Write(outcome)
    }
}
