use crate::domain::models::{Task, TaskStatus};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

const DAILY_WINDOW_DAYS: i64 = 7;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusBreakdown {
    pub todo: usize,
    pub not_started: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub expired: usize,
}

impl StatusBreakdown {
    pub fn total(&self) -> usize {
        self.todo + self.not_started + self.in_progress + self.completed + self.expired
    }

    fn record(&mut self, status: TaskStatus) {
        match status {
            TaskStatus::Todo => self.todo += 1,
            TaskStatus::NotStarted => self.not_started += 1,
            TaskStatus::InProgress => self.in_progress += 1,
            TaskStatus::Completed => self.completed += 1,
            TaskStatus::Expired => self.expired += 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyMinutes {
    pub date: NaiveDate,
    pub minutes: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsSnapshot {
    pub status_breakdown: StatusBreakdown,
    pub progress_percentage: u32,
    pub daily_minutes: Vec<DailyMinutes>,
}

impl AnalyticsSnapshot {
    /// Builds the snapshot for the seven days ending on `now`'s date.
    pub fn from_tasks(tasks: &[Task], now: DateTime<Utc>) -> Self {
        let mut status_breakdown = StatusBreakdown::default();
        for task in tasks {
            status_breakdown.record(task.status);
        }

        let total = status_breakdown.total();
        let progress_percentage = if total == 0 {
            0
        } else {
            ((status_breakdown.completed as f64 / total as f64) * 100.0).round() as u32
        };

        let today = now.date_naive();
        let first_day = today - Duration::days(DAILY_WINDOW_DAYS - 1);
        let mut per_day: BTreeMap<NaiveDate, i64> = (0..DAILY_WINDOW_DAYS)
            .map(|offset| (first_day + Duration::days(offset), 0))
            .collect();
        for window in tasks.iter().filter_map(Task::window) {
            let minutes = (window.end - window.start).num_minutes();
            if minutes <= 0 {
                continue;
            }
            if let Some(slot) = per_day.get_mut(&window.start.date_naive()) {
                *slot += minutes;
            }
        }

        Self {
            status_breakdown,
            progress_percentage,
            daily_minutes: per_day
                .into_iter()
                .map(|(date, minutes)| DailyMinutes { date, minutes })
                .collect(),
        }
    }
}

pub fn schedule_analysis_prompt(tasks: &[Task]) -> Result<String, serde_json::Error> {
    let tasks_json = serde_json::to_string_pretty(tasks)?;
    Ok(format!(
        r#"Analyze the following task schedule and provide comprehensive, structured feedback in the specified format:

1. **Schedule Status Overview:**
   - Assess the current task load and distribution.
   - Identify any immediate concerns or bottlenecks.
   - Highlight if the schedule lacks tasks and discuss potential implications.

2. **Task Prioritization Recommendations:**
   - Categorize tasks using the Eisenhower Matrix (Urgent/Important).
   - Identify tasks that are both urgent and important versus those that can be delegated or scheduled for later.
   - Suggest an optimized sequence for task execution to enhance productivity.

3. **Time Management Analysis:**
   - Review patterns in time allocation across tasks.
   - Detect potential scheduling conflicts or overlapping commitments.
   - Recommend improvements in time blocking to maximize efficiency.

4. **Work-Life Balance Assessment:**
   - Evaluate the balance between work/study tasks and breaks or personal time.
   - Identify indicators of potential burnout or excessive workload.
   - Suggest strategies to improve work-life balance.

5. **Action Steps:**
   - List 3-5 specific, actionable steps to enhance the schedule.
   - Recommend adjustments to the current schedule if necessary.
   - Provide tips for effective time management based on the analysis.

**Tasks:**
{tasks_json}

**Note:** If no tasks are present, offer guidance on creating an effective schedule and managing time efficiently."#
    ))
}

pub fn progress_analysis_prompt(snapshot: &AnalyticsSnapshot) -> Result<String, serde_json::Error> {
    let daily = serde_json::to_string(&snapshot.daily_minutes)?;
    let statuses = serde_json::to_string(&snapshot.status_breakdown)?;
    Ok(format!(
        r#"As a study analytics AI assistant, perform an in-depth analysis of the provided data and offer insightful feedback:

**Data Overview:**
- **Daily Time Spent Pattern:** {daily}
- **Task Completion Status:** {statuses}
- **Overall Progress:** {progress}%

**Analysis Requirements:**
1. **Areas of Excellence:**
   - Identify subjects or tasks where the user is performing exceptionally well.
   - Highlight positive study habits and effective time management practices.
   - Acknowledge achievements and milestones reached.

2. **Areas Needing Improvement:**
   - Pinpoint subjects or tasks that require more attention or effort.
   - Analyze patterns that may be hindering progress.
   - Suggest strategies to overcome challenges in weaker areas.

3. **Motivational Feedback:**
   - Provide encouragement to maintain or increase current performance levels.
   - Offer motivational tips to sustain and enhance study efforts.
   - Recognize the user's dedication and progress to foster continued improvement.

4. **Actionable Recommendations:**
   - Suggest 3-5 practical steps to improve overall academic performance.
   - Recommend adjustments to study routines or methods based on the analysis.
   - Provide strategies for maintaining momentum and achieving goals.

**Note:** Ensure that the feedback is personalized, data-driven, and aimed at fostering continuous improvement."#,
        progress = snapshot.progress_percentage,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::TaskPriority;

    fn fixed_time(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn task(id: &str, status: TaskStatus, start: &str, end: &str) -> Task {
        Task {
            id: id.to_string(),
            title: format!("task {id}"),
            description: None,
            priority: TaskPriority::Medium,
            status,
            start_date: Some(fixed_time(start)),
            end_date: Some(fixed_time(end)),
            due_date: None,
        }
    }

    #[test]
    fn snapshot_counts_statuses_and_progress() {
        let tasks = vec![
            task("1", TaskStatus::Completed, "2024-01-07T09:00:00Z", "2024-01-07T10:00:00Z"),
            task("2", TaskStatus::Completed, "2024-01-06T09:00:00Z", "2024-01-06T09:30:00Z"),
            task("3", TaskStatus::Expired, "2024-01-01T09:00:00Z", "2024-01-01T10:00:00Z"),
        ];
        let snapshot = AnalyticsSnapshot::from_tasks(&tasks, fixed_time("2024-01-07T12:00:00Z"));
        assert_eq!(snapshot.status_breakdown.completed, 2);
        assert_eq!(snapshot.status_breakdown.expired, 1);
        assert_eq!(snapshot.progress_percentage, 67);
    }

    #[test]
    fn snapshot_daily_minutes_cover_last_seven_days() {
        let tasks = vec![
            task("1", TaskStatus::Completed, "2024-01-07T09:00:00Z", "2024-01-07T10:00:00Z"),
            task("2", TaskStatus::Todo, "2024-01-07T13:00:00Z", "2024-01-07T13:45:00Z"),
            task("3", TaskStatus::Expired, "2023-12-20T09:00:00Z", "2023-12-20T10:00:00Z"),
        ];
        let snapshot = AnalyticsSnapshot::from_tasks(&tasks, fixed_time("2024-01-07T12:00:00Z"));
        assert_eq!(snapshot.daily_minutes.len(), 7);
        assert_eq!(
            snapshot.daily_minutes.first().map(|day| day.date),
            NaiveDate::from_ymd_opt(2024, 1, 1)
        );
        let last = snapshot.daily_minutes.last().expect("today");
        assert_eq!(last.minutes, 105);
        assert_eq!(snapshot.daily_minutes.iter().map(|day| day.minutes).sum::<i64>(), 105);
    }

    #[test]
    fn empty_task_list_yields_zero_progress() {
        let snapshot = AnalyticsSnapshot::from_tasks(&[], fixed_time("2024-01-07T12:00:00Z"));
        assert_eq!(snapshot.progress_percentage, 0);
        assert_eq!(snapshot.status_breakdown.total(), 0);
    }

    #[test]
    fn schedule_prompt_embeds_tasks_and_empty_note() {
        let tasks = vec![task("1", TaskStatus::Todo, "2024-01-07T09:00:00Z", "2024-01-07T10:00:00Z")];
        let prompt = schedule_analysis_prompt(&tasks).expect("prompt");
        assert!(prompt.contains("Eisenhower Matrix"));
        assert!(prompt.contains("\"_id\": \"1\""));
        assert!(prompt.contains("If no tasks are present"));
    }

    #[test]
    fn progress_prompt_embeds_snapshot() {
        let snapshot = AnalyticsSnapshot::from_tasks(&[], fixed_time("2024-01-07T12:00:00Z"));
        let prompt = progress_analysis_prompt(&snapshot).expect("prompt");
        assert!(prompt.contains("**Overall Progress:** 0%"));
        assert!(prompt.contains("\"notStarted\":0"));
    }
}
