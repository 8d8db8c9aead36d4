//! Focus/break countdown as a pure state machine.
//!
//! Commands (`start_focus`, `start_break`, ...) validate their source phase
//! and mutate the session. Clock progress goes through [`TimerSession::ticked`],
//! which takes the current time and the bound event's live end and returns
//! the next session without touching anything else.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

pub const DEFAULT_FOCUS_MINUTES: u32 = 25;
pub const DEFAULT_BREAK_MINUTES: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerMode {
    Focus,
    Break,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerPhase {
    Idle,
    FocusRunning,
    BreakPending,
    BreakRunning,
}

impl TimerPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::FocusRunning => "focus_running",
            Self::BreakPending => "break_pending",
            Self::BreakRunning => "break_running",
        }
    }

    pub fn is_running(self) -> bool {
        matches!(self, Self::FocusRunning | Self::BreakRunning)
    }
}

/// Why a countdown stopped on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerNotice {
    FocusComplete,
    BreakComplete,
    DeadlineReached,
}

impl TimerNotice {
    pub fn title(self) -> &'static str {
        match self {
            Self::FocusComplete => "Focus Session Complete!",
            Self::BreakComplete => "Break Time Finished!",
            Self::DeadlineReached => "Timer ended",
        }
    }

    pub fn body(self) -> &'static str {
        match self {
            Self::FocusComplete => "Great job! Time for a break!",
            Self::BreakComplete => "Ready to get back to work?",
            Self::DeadlineReached => "Task deadline has been reached!",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimerError {
    #[error("a timer is already running; end it before starting another")]
    AlreadyRunning,
    #[error("no timer is running")]
    NotRunning,
    #[error("cannot {action} while timer is {}", .phase.as_str())]
    InvalidTransition {
        phase: TimerPhase,
        action: &'static str,
    },
    #[error("duration must be at least one minute")]
    InvalidDuration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerSession {
    phase: TimerPhase,
    focus_seconds: u32,
    break_seconds: u32,
    remaining_seconds: u32,
    bound_event_id: Option<String>,
}

impl Default for TimerSession {
    fn default() -> Self {
        Self::new(DEFAULT_FOCUS_MINUTES, DEFAULT_BREAK_MINUTES)
    }
}

impl TimerSession {
    /// Idle session; zero-minute inputs are clamped to one minute.
    pub fn new(focus_minutes: u32, break_minutes: u32) -> Self {
        let focus_seconds = minutes_to_seconds(focus_minutes.max(1));
        Self {
            phase: TimerPhase::Idle,
            focus_seconds,
            break_seconds: minutes_to_seconds(break_minutes.max(1)),
            remaining_seconds: focus_seconds,
            bound_event_id: None,
        }
    }

    pub fn phase(&self) -> TimerPhase {
        self.phase
    }

    pub fn mode(&self) -> Option<TimerMode> {
        match self.phase {
            TimerPhase::Idle => None,
            TimerPhase::FocusRunning => Some(TimerMode::Focus),
            TimerPhase::BreakPending | TimerPhase::BreakRunning => Some(TimerMode::Break),
        }
    }

    pub fn is_running(&self) -> bool {
        self.phase.is_running()
    }

    pub fn remaining_seconds(&self) -> u32 {
        self.remaining_seconds
    }

    /// Configured length of the current mode.
    pub fn duration_seconds(&self) -> u32 {
        match self.mode() {
            Some(TimerMode::Break) => self.break_seconds,
            _ => self.focus_seconds,
        }
    }

    pub fn focus_seconds(&self) -> u32 {
        self.focus_seconds
    }

    pub fn break_seconds(&self) -> u32 {
        self.break_seconds
    }

    pub fn bound_event_id(&self) -> Option<&str> {
        self.bound_event_id.as_deref()
    }

    pub fn start_focus(
        &mut self,
        event_id: impl Into<String>,
        focus_minutes: u32,
    ) -> Result<(), TimerError> {
        if self.is_running() {
            return Err(TimerError::AlreadyRunning);
        }
        if self.phase != TimerPhase::Idle {
            return Err(self.invalid("start focus"));
        }
        if focus_minutes == 0 {
            return Err(TimerError::InvalidDuration);
        }
        self.focus_seconds = minutes_to_seconds(focus_minutes);
        self.remaining_seconds = self.focus_seconds;
        self.bound_event_id = Some(event_id.into());
        self.phase = TimerPhase::FocusRunning;
        Ok(())
    }

    /// Starts the pending break, optionally with a new length.
    pub fn start_break(&mut self, break_minutes: Option<u32>) -> Result<(), TimerError> {
        if self.phase != TimerPhase::BreakPending {
            return Err(self.invalid("start break"));
        }
        if let Some(minutes) = break_minutes {
            if minutes == 0 {
                return Err(TimerError::InvalidDuration);
            }
            self.break_seconds = minutes_to_seconds(minutes);
        }
        self.remaining_seconds = self.break_seconds;
        self.phase = TimerPhase::BreakRunning;
        Ok(())
    }

    pub fn restart_focus(&mut self) -> Result<(), TimerError> {
        if self.phase != TimerPhase::BreakRunning {
            return Err(self.invalid("restart focus"));
        }
        self.remaining_seconds = self.focus_seconds;
        self.phase = TimerPhase::FocusRunning;
        Ok(())
    }

    /// User-confirmed early stop of a running countdown.
    pub fn end_early(&mut self) -> Result<(), TimerError> {
        if !self.is_running() {
            return Err(TimerError::NotRunning);
        }
        self.reset();
        Ok(())
    }

    /// Drops whatever is in progress; used when the detail view goes away.
    pub fn abandon(&mut self) {
        self.reset();
        self.bound_event_id = None;
    }

    /// One second of clock progress.
    ///
    /// `bound_event_end` is the live end of the bound event, looked up at
    /// tick time so that a window moved mid-session is honoured.
    pub fn ticked(
        &self,
        now: DateTime<Utc>,
        bound_event_end: Option<DateTime<Utc>>,
    ) -> (TimerSession, Option<TimerNotice>) {
        let mut next = self.clone();
        let notice = match self.phase {
            TimerPhase::Idle | TimerPhase::BreakPending => None,
            TimerPhase::FocusRunning => {
                if bound_event_end.is_some_and(|end| end <= now) {
                    next.reset();
                    Some(TimerNotice::DeadlineReached)
                } else if self.remaining_seconds <= 1 {
                    next.phase = TimerPhase::BreakPending;
                    next.remaining_seconds = self.break_seconds;
                    Some(TimerNotice::FocusComplete)
                } else {
                    next.remaining_seconds -= 1;
                    None
                }
            }
            TimerPhase::BreakRunning => {
                if self.remaining_seconds <= 1 {
                    next.reset();
                    Some(TimerNotice::BreakComplete)
                } else {
                    next.remaining_seconds -= 1;
                    None
                }
            }
        };
        (next, notice)
    }

    fn reset(&mut self) {
        self.phase = TimerPhase::Idle;
        self.remaining_seconds = self.focus_seconds;
    }

    fn invalid(&self, action: &'static str) -> TimerError {
        TimerError::InvalidTransition {
            phase: self.phase,
            action,
        }
    }
}

fn minutes_to_seconds(minutes: u32) -> u32 {
    minutes.saturating_mul(60)
}

/// `mm:ss` rendering of a countdown.
pub fn format_remaining(seconds: u32) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use proptest::prelude::*;

    fn fixed_time(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn run_ticks(
        mut session: TimerSession,
        start: DateTime<Utc>,
        ticks: i64,
        bound_end: Option<DateTime<Utc>>,
    ) -> (TimerSession, Vec<TimerNotice>) {
        let mut notices = Vec::new();
        for second in 1..=ticks {
            let (next, notice) = session.ticked(start + Duration::seconds(second), bound_end);
            session = next;
            notices.extend(notice);
        }
        (session, notices)
    }

    #[test]
    fn start_focus_sets_remaining_to_duration() {
        let mut session = TimerSession::default();
        session.start_focus("evt-1", 25).expect("start focus");
        assert_eq!(session.phase(), TimerPhase::FocusRunning);
        assert_eq!(session.remaining_seconds(), 25 * 60);
        assert_eq!(session.bound_event_id(), Some("evt-1"));
        assert_eq!(session.mode(), Some(TimerMode::Focus));
    }

    #[test]
    fn second_start_is_rejected_while_running() {
        let mut session = TimerSession::default();
        session.start_focus("evt-1", 25).expect("start focus");
        assert_eq!(session.start_focus("evt-2", 10), Err(TimerError::AlreadyRunning));
        assert_eq!(session.bound_event_id(), Some("evt-1"));
        assert_eq!(session.remaining_seconds(), 25 * 60);
    }

    #[test]
    fn zero_minute_focus_is_rejected() {
        let mut session = TimerSession::default();
        assert_eq!(session.start_focus("evt-1", 0), Err(TimerError::InvalidDuration));
        assert_eq!(session.phase(), TimerPhase::Idle);
    }

    #[test]
    fn natural_focus_completion_leads_to_break_pending() {
        let start = fixed_time("2024-01-01T09:00:00Z");
        let mut session = TimerSession::new(25, 5);
        session.start_focus("evt-1", 1).expect("start focus");

        let (session, notices) = run_ticks(session, start, 60, None);
        assert_eq!(session.phase(), TimerPhase::BreakPending);
        assert_eq!(session.remaining_seconds(), 5 * 60);
        assert_eq!(notices, vec![TimerNotice::FocusComplete]);
    }

    #[test]
    fn countdown_decrements_once_per_tick() {
        let start = fixed_time("2024-01-01T09:00:00Z");
        let mut session = TimerSession::default();
        session.start_focus("evt-1", 2).expect("start focus");
        let (session, notices) = run_ticks(session, start, 30, None);
        assert_eq!(session.remaining_seconds(), 90);
        assert!(notices.is_empty());
    }

    #[test]
    fn deadline_preempts_focus_before_completion() {
        let start = fixed_time("2024-01-01T09:00:00Z");
        let deadline = start + Duration::seconds(10);
        let mut session = TimerSession::default();
        session.start_focus("evt-1", 25).expect("start focus");

        let (mid, notices) = run_ticks(session.clone(), start, 9, Some(deadline));
        assert_eq!(mid.phase(), TimerPhase::FocusRunning);
        assert!(notices.is_empty());

        let (session, notices) = run_ticks(session, start, 10, Some(deadline));
        assert_eq!(session.phase(), TimerPhase::Idle);
        assert_eq!(session.remaining_seconds(), 25 * 60);
        assert_eq!(notices, vec![TimerNotice::DeadlineReached]);

        let (after, notices) = run_ticks(session, deadline, 5, Some(deadline));
        assert_eq!(after.phase(), TimerPhase::Idle);
        assert!(notices.is_empty());
    }

    #[test]
    fn deadline_already_passed_preempts_on_first_tick() {
        let start = fixed_time("2024-01-01T09:00:00Z");
        let mut session = TimerSession::default();
        session.start_focus("evt-1", 25).expect("start focus");
        let (session, notice) = session.ticked(start, Some(start - Duration::hours(1)));
        assert_eq!(session.phase(), TimerPhase::Idle);
        assert_eq!(notice, Some(TimerNotice::DeadlineReached));
    }

    #[test]
    fn break_runs_to_idle_and_resets_to_focus_length() {
        let start = fixed_time("2024-01-01T09:00:00Z");
        let mut session = TimerSession::new(25, 5);
        session.start_focus("evt-1", 1).expect("start focus");
        let (mut session, _) = run_ticks(session, start, 60, None);

        session.start_break(Some(2)).expect("start break");
        assert_eq!(session.phase(), TimerPhase::BreakRunning);
        assert_eq!(session.remaining_seconds(), 120);

        let (session, notices) = run_ticks(session, start, 120, None);
        assert_eq!(session.phase(), TimerPhase::Idle);
        assert_eq!(session.remaining_seconds(), 60);
        assert_eq!(notices, vec![TimerNotice::BreakComplete]);
    }

    #[test]
    fn break_is_not_preempted_by_deadline() {
        let start = fixed_time("2024-01-01T09:00:00Z");
        let mut session = TimerSession::new(1, 1);
        session.start_focus("evt-1", 1).expect("start focus");
        let (mut session, _) = run_ticks(session, start, 60, None);
        session.start_break(None).expect("start break");

        let (session, notice) = session.ticked(start, Some(start - Duration::hours(1)));
        assert_eq!(session.phase(), TimerPhase::BreakRunning);
        assert_eq!(notice, None);
    }

    #[test]
    fn restart_focus_from_break() {
        let start = fixed_time("2024-01-01T09:00:00Z");
        let mut session = TimerSession::new(1, 5);
        session.start_focus("evt-1", 1).expect("start focus");
        let (mut session, _) = run_ticks(session, start, 60, None);
        session.start_break(None).expect("start break");
        session.restart_focus().expect("restart focus");
        assert_eq!(session.phase(), TimerPhase::FocusRunning);
        assert_eq!(session.remaining_seconds(), 60);
    }

    #[test]
    fn end_early_resets_to_focus_duration() {
        let start = fixed_time("2024-01-01T09:00:00Z");
        let mut session = TimerSession::default();
        session.start_focus("evt-1", 10).expect("start focus");
        let (mut session, _) = run_ticks(session, start, 42, None);
        session.end_early().expect("end early");
        assert_eq!(session.phase(), TimerPhase::Idle);
        assert_eq!(session.remaining_seconds(), 600);
        assert_eq!(session.end_early(), Err(TimerError::NotRunning));
    }

    #[test]
    fn invalid_transitions_are_reported() {
        let mut session = TimerSession::default();
        assert!(matches!(
            session.start_break(None),
            Err(TimerError::InvalidTransition { phase: TimerPhase::Idle, .. })
        ));
        assert!(matches!(
            session.restart_focus(),
            Err(TimerError::InvalidTransition { phase: TimerPhase::Idle, .. })
        ));
    }

    #[test]
    fn abandon_clears_binding_from_any_phase() {
        let mut session = TimerSession::default();
        session.start_focus("evt-1", 25).expect("start focus");
        session.abandon();
        assert_eq!(session.phase(), TimerPhase::Idle);
        assert_eq!(session.bound_event_id(), None);
    }

    #[test]
    fn remaining_is_rendered_as_minutes_and_seconds() {
        assert_eq!(format_remaining(1500), "25:00");
        assert_eq!(format_remaining(61), "1:01");
        assert_eq!(format_remaining(0), "0:00");
    }

    #[derive(Debug, Clone)]
    enum Step {
        Tick,
        StartFocus(u32),
        StartBreak,
        Restart,
        EndEarly,
        Abandon,
    }

    fn step_strategy() -> impl Strategy<Value = Step> {
        prop_oneof![
            6 => Just(Step::Tick),
            1 => (1u32..3).prop_map(Step::StartFocus),
            1 => Just(Step::StartBreak),
            1 => Just(Step::Restart),
            1 => Just(Step::EndEarly),
            1 => Just(Step::Abandon),
        ]
    }

    proptest! {
        #[test]
        fn remaining_never_exceeds_mode_duration(steps in prop::collection::vec(step_strategy(), 0..400)) {
            let start = fixed_time("2024-01-01T09:00:00Z");
            let mut session = TimerSession::new(1, 1);
            for (index, step) in steps.into_iter().enumerate() {
                let before = session.clone();
                match step {
                    Step::Tick => {
                        let (next, _) = session.ticked(start + Duration::seconds(index as i64), None);
                        if before.phase() == next.phase() && next.is_running() {
                            prop_assert_eq!(next.remaining_seconds() + 1, before.remaining_seconds());
                        }
                        session = next;
                    }
                    Step::StartFocus(minutes) => {
                        let _ = session.start_focus("evt", minutes);
                    }
                    Step::StartBreak => {
                        let _ = session.start_break(None);
                    }
                    Step::Restart => {
                        let _ = session.restart_focus();
                    }
                    Step::EndEarly => {
                        let _ = session.end_early();
                    }
                    Step::Abandon => session.abandon(),
                }
                prop_assert!(session.remaining_seconds() >= 1);
                prop_assert!(session.remaining_seconds() <= session.duration_seconds());
            }
        }
    }
}
