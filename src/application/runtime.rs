use crate::application::planner::{BackgroundOutcome, PlannerController};
use crate::domain::models::CalendarEvent;
use crate::domain::timer::{TimerNotice, TimerPhase};
use crate::infrastructure::notifier::Notifier;
use crate::infrastructure::task_api::TaskApi;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::{Duration, Instant, Interval, interval_at};

const TICK_PERIOD: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlannerCommand {
    Refresh,
    Reschedule {
        event_id: String,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        all_day: bool,
    },
    MarkCompleted {
        event_id: String,
    },
    StartFocus {
        event_id: String,
        minutes: Option<u32>,
    },
    StartBreak {
        minutes: Option<u32>,
    },
    RestartFocus,
    RequestEndEarly,
    ConfirmEndEarly,
    CancelEndEarly,
    CloseView,
}

impl PlannerCommand {
    fn name(&self) -> &'static str {
        match self {
            Self::Refresh => "refresh",
            Self::Reschedule { .. } => "reschedule",
            Self::MarkCompleted { .. } => "mark_completed",
            Self::StartFocus { .. } => "start_focus",
            Self::StartBreak { .. } => "start_break",
            Self::RestartFocus => "restart_focus",
            Self::RequestEndEarly => "request_end_early",
            Self::ConfirmEndEarly => "confirm_end_early",
            Self::CancelEndEarly => "cancel_end_early",
            Self::CloseView => "close_view",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerView {
    pub phase: TimerPhase,
    pub remaining_seconds: u32,
    pub bound_event_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlannerUpdate {
    Timer(TimerView),
    Notice(TimerNotice),
    EndEarlyRequested,
    EventMoved(CalendarEvent),
    Background(BackgroundOutcome),
    Rejected { command: &'static str, message: String },
}

/// Drives one planner view until the command channel closes.
///
/// Commands, the one-second tick and finished backend calls are handled on
/// this single task, so the controller needs no locking. The tick interval
/// exists only while a countdown runs and is dropped on every transition
/// out of a running phase. On exit the view is closed and the controller is
/// handed back so callers can drain outstanding writes.
pub async fn run_planner<A, N>(
    mut controller: PlannerController<A, N>,
    mut commands: mpsc::Receiver<PlannerCommand>,
    updates: mpsc::Sender<PlannerUpdate>,
) -> PlannerController<A, N>
where
    A: TaskApi + 'static,
    N: Notifier + 'static,
{
    let mut ticker: Option<Interval> = None;

    loop {
        sync_ticker(controller.timer().is_running(), &mut ticker);

        let outgoing = tokio::select! {
            command = commands.recv() => {
                let Some(command) = command else {
                    break;
                };
                handle_command(&mut controller, command)
            }
            _ = next_tick(&mut ticker) => {
                let notice = controller.tick();
                let mut outgoing = vec![PlannerUpdate::Timer(timer_view(&controller))];
                outgoing.extend(notice.map(PlannerUpdate::Notice));
                outgoing
            }
            Some(outcome) = controller.next_outcome(), if controller.has_background_work() => {
                vec![PlannerUpdate::Background(outcome)]
            }
        };

        for update in outgoing {
            if updates.send(update).await.is_err() {
                tracing::debug!("planner update receiver dropped; stopping");
                controller.close_view();
                return controller;
            }
        }
    }

    controller.close_view();
    controller
}

fn sync_ticker(running: bool, ticker: &mut Option<Interval>) {
    match (running, ticker.is_some()) {
        (true, false) => *ticker = Some(interval_at(Instant::now() + TICK_PERIOD, TICK_PERIOD)),
        (false, true) => *ticker = None,
        _ => {}
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

fn timer_view<A, N>(controller: &PlannerController<A, N>) -> TimerView
where
    A: TaskApi + 'static,
    N: Notifier + 'static,
{
    let timer = controller.timer();
    TimerView {
        phase: timer.phase(),
        remaining_seconds: timer.remaining_seconds(),
        bound_event_id: timer.bound_event_id().map(str::to_string),
    }
}

fn handle_command<A, N>(
    controller: &mut PlannerController<A, N>,
    command: PlannerCommand,
) -> Vec<PlannerUpdate>
where
    A: TaskApi + 'static,
    N: Notifier + 'static,
{
    let name = command.name();
    let result = match command {
        PlannerCommand::Refresh => {
            controller.spawn_refresh();
            return Vec::new();
        }
        PlannerCommand::Reschedule {
            event_id,
            start,
            end,
            all_day,
        } => {
            return match controller.reschedule(&event_id, start, end, all_day) {
                Ok(event) => vec![PlannerUpdate::EventMoved(event)],
                Err(error) => vec![rejected(name, error.to_string())],
            };
        }
        PlannerCommand::RequestEndEarly => {
            return match controller.request_end_early() {
                Ok(()) => vec![PlannerUpdate::EndEarlyRequested],
                Err(error) => vec![rejected(name, error.to_string())],
            };
        }
        PlannerCommand::MarkCompleted { event_id } => controller.mark_completed(&event_id),
        PlannerCommand::StartFocus { event_id, minutes } => controller.start_focus(&event_id, minutes),
        PlannerCommand::StartBreak { minutes } => controller.start_break(minutes).map_err(Into::into),
        PlannerCommand::RestartFocus => controller.restart_focus().map_err(Into::into),
        PlannerCommand::ConfirmEndEarly => controller.confirm_end_early(),
        PlannerCommand::CancelEndEarly => {
            controller.cancel_end_early();
            Ok(())
        }
        PlannerCommand::CloseView => {
            controller.close_view();
            Ok(())
        }
    };

    match result {
        Ok(()) => vec![PlannerUpdate::Timer(timer_view(controller))],
        Err(error) => vec![rejected(name, error.to_string())],
    }
}

fn rejected(command: &'static str, message: String) -> PlannerUpdate {
    tracing::info!(command, %message, "planner command rejected");
    PlannerUpdate::Rejected { command, message }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{
        NewTask, ProfileUpdate, Task, TaskList, TaskPriority, TaskQuery, TaskStatus, TaskUpdate,
        UserProfile,
    };
    use crate::infrastructure::error::InfraError;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    struct StaticTaskApi {
        tasks: Vec<Task>,
    }

    #[async_trait]
    impl TaskApi for StaticTaskApi {
        async fn list_tasks(&self, _access_token: &str, _query: &TaskQuery) -> Result<TaskList, InfraError> {
            Ok(TaskList {
                tasks: self.tasks.clone(),
                skipped: 0,
            })
        }

        async fn count_due_today(&self, _access_token: &str) -> Result<u64, InfraError> {
            Ok(0)
        }

        async fn upcoming_tasks(&self, _access_token: &str) -> Result<Vec<Task>, InfraError> {
            Ok(Vec::new())
        }

        async fn create_task(&self, _access_token: &str, _task: &NewTask) -> Result<Option<Task>, InfraError> {
            Ok(None)
        }

        async fn update_task(&self, _access_token: &str, _task_id: &str, _update: &TaskUpdate) -> Result<(), InfraError> {
            Ok(())
        }

        async fn update_task_status(
            &self,
            _access_token: &str,
            _task_id: &str,
            _status: TaskStatus,
        ) -> Result<(), InfraError> {
            Ok(())
        }

        async fn delete_task(&self, _access_token: &str, _task_id: &str) -> Result<(), InfraError> {
            Ok(())
        }

        async fn fetch_profile(&self, _access_token: &str) -> Result<UserProfile, InfraError> {
            Err(InfraError::NotFound("profile".to_string()))
        }

        async fn update_profile(&self, _access_token: &str, _update: ProfileUpdate) -> Result<(), InfraError> {
            Ok(())
        }

        async fn logout(&self, _access_token: &str) -> Result<(), InfraError> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        titles: Mutex<Vec<String>>,
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, title: &str, _body: &str) -> Result<(), InfraError> {
            self.titles.lock().expect("titles lock").push(title.to_string());
            Ok(())
        }

        fn play_cue(&self) -> Result<(), InfraError> {
            Ok(())
        }
    }

    fn fixed_time(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    struct Running {
        commands: mpsc::Sender<PlannerCommand>,
        updates: mpsc::Receiver<PlannerUpdate>,
        handle: tokio::task::JoinHandle<PlannerController<StaticTaskApi, RecordingNotifier>>,
        notifier: Arc<RecordingNotifier>,
        origin: Instant,
    }

    /// Starts a planner whose wall clock follows tokio's paused clock.
    async fn start_planner(event_end: DateTime<Utc>) -> Running {
        let base = fixed_time("2024-01-01T09:00:00Z");
        let origin = Instant::now();
        let api = Arc::new(StaticTaskApi {
            tasks: vec![Task {
                id: "t1".to_string(),
                title: "Revise notes".to_string(),
                description: None,
                priority: TaskPriority::High,
                status: TaskStatus::InProgress,
                start_date: Some(base),
                end_date: Some(event_end),
                due_date: None,
            }],
        });
        let notifier = Arc::new(RecordingNotifier::default());
        let mut controller = PlannerController::new(api, Arc::clone(&notifier), "id-token", 25, 5)
            .expect("controller")
            .with_now_provider(Arc::new(move || {
                let elapsed = Instant::now().duration_since(origin);
                base + chrono::Duration::milliseconds(elapsed.as_millis() as i64)
            }));
        controller.refresh().await;

        let (command_tx, command_rx) = mpsc::channel(8);
        let (update_tx, update_rx) = mpsc::channel(256);
        let handle = tokio::spawn(run_planner(controller, command_rx, update_tx));
        Running {
            commands: command_tx,
            updates: update_rx,
            handle,
            notifier,
            origin,
        }
    }

    async fn recv_until_notice(updates: &mut mpsc::Receiver<PlannerUpdate>) -> (Vec<TimerView>, TimerNotice) {
        let mut views = Vec::new();
        loop {
            match updates.recv().await.expect("planner alive") {
                PlannerUpdate::Timer(view) => views.push(view),
                PlannerUpdate::Notice(notice) => return (views, notice),
                _ => {}
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn focus_completes_and_tick_stops_until_break_starts() {
        let mut running = start_planner(fixed_time("2024-01-02T09:00:00Z")).await;
        running
            .commands
            .send(PlannerCommand::StartFocus {
                event_id: "t1".to_string(),
                minutes: Some(1),
            })
            .await
            .expect("send");

        let (views, notice) = recv_until_notice(&mut running.updates).await;
        assert_eq!(notice, TimerNotice::FocusComplete);
        assert_eq!(views.last().map(|view| view.phase), Some(TimerPhase::BreakPending));
        assert_eq!(Instant::now().duration_since(running.origin), Duration::from_secs(60));

        let quiet = tokio::time::timeout(Duration::from_secs(30), running.updates.recv()).await;
        assert!(quiet.is_err(), "no tick may fire while the break is pending");

        running
            .commands
            .send(PlannerCommand::StartBreak { minutes: Some(1) })
            .await
            .expect("send");
        let (_, notice) = recv_until_notice(&mut running.updates).await;
        assert_eq!(notice, TimerNotice::BreakComplete);

        drop(running.commands);
        let controller = running.handle.await.expect("planner task");
        assert_eq!(controller.timer().phase(), TimerPhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_reached_after_ten_ticks() {
        let deadline = fixed_time("2024-01-01T09:00:10Z");
        let mut running = start_planner(deadline).await;
        running
            .commands
            .send(PlannerCommand::StartFocus {
                event_id: "t1".to_string(),
                minutes: Some(25),
            })
            .await
            .expect("send");

        let (views, notice) = recv_until_notice(&mut running.updates).await;
        assert_eq!(notice, TimerNotice::DeadlineReached);
        assert_eq!(views.last().map(|view| view.phase), Some(TimerPhase::Idle));
        assert_eq!(Instant::now().duration_since(running.origin), Duration::from_secs(10));
        assert_eq!(
            running.notifier.titles.lock().expect("titles lock").clone(),
            vec!["Timer ended".to_string()]
        );

        let quiet = tokio::time::timeout(Duration::from_secs(30), running.updates.recv()).await;
        assert!(quiet.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_commands_are_rejected_and_loop_continues() {
        let mut running = start_planner(fixed_time("2024-01-02T09:00:00Z")).await;
        running
            .commands
            .send(PlannerCommand::ConfirmEndEarly)
            .await
            .expect("send");
        running
            .commands
            .send(PlannerCommand::StartFocus {
                event_id: "ghost".to_string(),
                minutes: None,
            })
            .await
            .expect("send");

        for expected in ["confirm_end_early", "start_focus"] {
            match running.updates.recv().await.expect("update") {
                PlannerUpdate::Rejected { command, .. } => assert_eq!(command, expected),
                other => panic!("expected rejection, got {other:?}"),
            }
        }

        running
            .commands
            .send(PlannerCommand::Reschedule {
                event_id: "t1".to_string(),
                start: fixed_time("2024-01-03T09:00:00Z"),
                end: fixed_time("2024-01-03T10:00:00Z"),
                all_day: false,
            })
            .await
            .expect("send");
        match running.updates.recv().await.expect("update") {
            PlannerUpdate::EventMoved(event) => assert_eq!(event.status, TaskStatus::NotStarted),
            other => panic!("expected moved event, got {other:?}"),
        }
        match running.updates.recv().await.expect("update") {
            PlannerUpdate::Background(BackgroundOutcome::Write(outcome)) => {
                assert!(matches!(outcome, crate::application::planner::WriteOutcome::Persisted { .. }));
            }
            other => panic!("expected write outcome, got {other:?}"),
        }
    }
}
