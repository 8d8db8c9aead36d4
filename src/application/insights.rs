use crate::domain::insights::{AnalyticsSnapshot, progress_analysis_prompt, schedule_analysis_prompt};
use crate::domain::models::TaskQuery;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::gemini_client::SummaryModel;
use crate::infrastructure::task_api::TaskApi;
use chrono::{DateTime, Utc};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressReport {
    pub snapshot: AnalyticsSnapshot,
    pub feedback: String,
}

/// Natural-language feedback on the user's schedule and progress.
pub struct InsightsService<A, M>
where
    A: TaskApi,
    M: SummaryModel,
{
    api: Arc<A>,
    model: Arc<M>,
}

impl<A, M> InsightsService<A, M>
where
    A: TaskApi,
    M: SummaryModel,
{
    pub fn new(api: Arc<A>, model: Arc<M>) -> Self {
        Self { api, model }
    }

    pub async fn analyze_schedule(&self, access_token: &str) -> Result<String, InfraError> {
        let tasks = self.api.list_tasks(access_token, &TaskQuery::default()).await?.tasks;
        let prompt = schedule_analysis_prompt(&tasks)?;
        tracing::info!(tasks = tasks.len(), "requesting schedule analysis");
        self.model.generate(&prompt).await
    }

    pub async fn analyze_progress(
        &self,
        access_token: &str,
        now: DateTime<Utc>,
    ) -> Result<ProgressReport, InfraError> {
        let tasks = self.api.list_tasks(access_token, &TaskQuery::default()).await?.tasks;
        let snapshot = AnalyticsSnapshot::from_tasks(&tasks, now);
        let prompt = progress_analysis_prompt(&snapshot)?;
        tracing::info!(
            tasks = tasks.len(),
            progress = snapshot.progress_percentage,
            "requesting progress analysis"
        );
        let feedback = self.model.generate(&prompt).await?;
        Ok(ProgressReport { snapshot, feedback })
    }
}
