use crate::domain::models::{
    NewTask, ProfileUpdate, Task, TaskList, TaskQuery, TaskStatus, TaskUpdate, UserProfile,
};
use crate::infrastructure::error::InfraError;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder};
use url::Url;

#[async_trait]
pub trait TaskApi: Send + Sync {
    /// Records that cannot be decoded are counted in `TaskList::skipped`.
    async fn list_tasks(&self, access_token: &str, query: &TaskQuery) -> Result<TaskList, InfraError>;

    async fn count_due_today(&self, access_token: &str) -> Result<u64, InfraError>;

    async fn upcoming_tasks(&self, access_token: &str) -> Result<Vec<Task>, InfraError>;

    async fn create_task(&self, access_token: &str, task: &NewTask) -> Result<Option<Task>, InfraError>;

    async fn update_task(
        &self,
        access_token: &str,
        task_id: &str,
        update: &TaskUpdate,
    ) -> Result<(), InfraError>;

    async fn update_task_status(
        &self,
        access_token: &str,
        task_id: &str,
        status: TaskStatus,
    ) -> Result<(), InfraError>;

    async fn delete_task(&self, access_token: &str, task_id: &str) -> Result<(), InfraError>;

    async fn fetch_profile(&self, access_token: &str) -> Result<UserProfile, InfraError>;

    async fn update_profile(&self, access_token: &str, update: ProfileUpdate) -> Result<(), InfraError>;

    async fn logout(&self, access_token: &str) -> Result<(), InfraError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestTaskApi {
    client: Client,
    base_url: Url,
}

#[derive(Debug, serde::Deserialize)]
struct TaskListResponse {
    #[serde(default)]
    tasks: Option<Vec<serde_json::Value>>,
}

#[derive(Debug, serde::Deserialize)]
struct CountResponse {
    #[serde(default)]
    count: u64,
}

#[derive(Debug, serde::Deserialize)]
struct TaskEnvelope {
    task: Task,
}

#[derive(Debug, serde::Serialize)]
struct StatusRequest {
    status: TaskStatus,
}

impl ReqwestTaskApi {
    pub fn new(base_url: Url) -> Self {
        Self {
            client: Client::new(),
            base_url,
        }
    }

    fn ensure_non_empty(value: &str, field: &str) -> Result<(), InfraError> {
        if value.trim().is_empty() {
            return Err(InfraError::InvalidInput(format!("{field} must not be empty")));
        }
        Ok(())
    }

    pub(crate) fn endpoint(&self, segments: &[&str]) -> Result<Url, InfraError> {
        let mut url = self.base_url.clone();
        {
            let mut path = url.path_segments_mut().map_err(|_| {
                InfraError::InvalidConfig("backend base url cannot be a base".to_string())
            })?;
            path.pop_if_empty();
            path.extend(segments);
        }
        Ok(url)
    }

    async fn execute(&self, request: RequestBuilder, action: &str) -> Result<String, InfraError> {
        let response = request
            .send()
            .await
            .map_err(|error| InfraError::Network(format!("{action}: {error}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| InfraError::Network(format!("failed reading {action} response: {error}")))?;

        if !status.is_success() {
            tracing::debug!(action, status = status.as_u16(), "backend rejected request");
            return Err(InfraError::from_status(status, &body));
        }
        Ok(body)
    }

    fn parse_task_list(body: &str, action: &str) -> Result<TaskList, InfraError> {
        let parsed: TaskListResponse = serde_json::from_str(body)?;
        let mut list = TaskList::default();
        for item in parsed.tasks.unwrap_or_default() {
            let task_id = item
                .get("_id")
                .and_then(serde_json::Value::as_str)
                .unwrap_or("<missing>")
                .to_string();
            match serde_json::from_value::<Task>(item) {
                Ok(task) => list.tasks.push(task),
                Err(error) => {
                    tracing::warn!(task_id = %task_id, action, %error, "skipping malformed task");
                    list.skipped += 1;
                }
            }
        }
        Ok(list)
    }
}

/// Created-task responses come either wrapped (`{ task }`) or bare.
fn parse_created_task(body: &str) -> Option<Task> {
    if body.trim().is_empty() {
        return None;
    }
    serde_json::from_str::<TaskEnvelope>(body)
        .map(|envelope| envelope.task)
        .or_else(|_| serde_json::from_str::<Task>(body))
        .ok()
}

#[async_trait]
impl TaskApi for ReqwestTaskApi {
    async fn list_tasks(&self, access_token: &str, query: &TaskQuery) -> Result<TaskList, InfraError> {
        Self::ensure_non_empty(access_token, "access token")?;

        let request = self
            .client
            .get(self.endpoint(&["api", "tasks"])?)
            .query(&query.to_pairs())
            .bearer_auth(access_token);
        let body = self.execute(request, "list tasks").await?;
        Self::parse_task_list(&body, "task list")
    }

    async fn count_due_today(&self, access_token: &str) -> Result<u64, InfraError> {
        Self::ensure_non_empty(access_token, "access token")?;

        let request = self
            .client
            .get(self.endpoint(&["api", "tasks", "due-today"])?)
            .bearer_auth(access_token);
        let body = self.execute(request, "count tasks due today").await?;
        let parsed: CountResponse = serde_json::from_str(&body)?;
        Ok(parsed.count)
    }

    async fn upcoming_tasks(&self, access_token: &str) -> Result<Vec<Task>, InfraError> {
        Self::ensure_non_empty(access_token, "access token")?;

        let request = self
            .client
            .get(self.endpoint(&["api", "tasks", "upcoming"])?)
            .bearer_auth(access_token);
        let body = self.execute(request, "list upcoming tasks").await?;
        Ok(Self::parse_task_list(&body, "upcoming tasks")?.tasks)
    }

    async fn create_task(&self, access_token: &str, task: &NewTask) -> Result<Option<Task>, InfraError> {
        Self::ensure_non_empty(access_token, "access token")?;
        task.validate().map_err(InfraError::InvalidInput)?;

        let request = self
            .client
            .post(self.endpoint(&["api", "tasks"])?)
            .bearer_auth(access_token)
            .json(task);
        let body = self.execute(request, "create task").await?;
        Ok(parse_created_task(&body))
    }

    async fn update_task(
        &self,
        access_token: &str,
        task_id: &str,
        update: &TaskUpdate,
    ) -> Result<(), InfraError> {
        Self::ensure_non_empty(access_token, "access token")?;
        Self::ensure_non_empty(task_id, "task id")?;
        update.validate().map_err(InfraError::InvalidInput)?;

        let request = self
            .client
            .put(self.endpoint(&["api", "tasks", task_id.trim()])?)
            .bearer_auth(access_token)
            .json(update);
        self.execute(request, "update task").await?;
        Ok(())
    }

    async fn update_task_status(
        &self,
        access_token: &str,
        task_id: &str,
        status: TaskStatus,
    ) -> Result<(), InfraError> {
        Self::ensure_non_empty(access_token, "access token")?;
        Self::ensure_non_empty(task_id, "task id")?;

        let request = self
            .client
            .patch(self.endpoint(&["api", "tasks", task_id.trim(), "status"])?)
            .bearer_auth(access_token)
            .json(&StatusRequest { status });
        self.execute(request, "update task status").await?;
        Ok(())
    }

    async fn delete_task(&self, access_token: &str, task_id: &str) -> Result<(), InfraError> {
        Self::ensure_non_empty(access_token, "access token")?;
        Self::ensure_non_empty(task_id, "task id")?;

        let request = self
            .client
            .delete(self.endpoint(&["api", "tasks", task_id.trim()])?)
            .bearer_auth(access_token);
        self.execute(request, "delete task").await?;
        Ok(())
    }

    async fn fetch_profile(&self, access_token: &str) -> Result<UserProfile, InfraError> {
        Self::ensure_non_empty(access_token, "access token")?;

        let request = self
            .client
            .get(self.endpoint(&["api", "users", "profile"])?)
            .bearer_auth(access_token);
        let body = self.execute(request, "fetch profile").await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn update_profile(&self, access_token: &str, update: ProfileUpdate) -> Result<(), InfraError> {
        Self::ensure_non_empty(access_token, "access token")?;
        update.validate().map_err(InfraError::InvalidInput)?;

        let mut form = Form::new().text("name", update.name.trim().to_string());
        if let Some(bio) = update.bio {
            form = form.text("bio", bio);
        }
        if let Some(avatar) = update.avatar {
            let part = Part::bytes(avatar.bytes)
                .file_name(avatar.file_name)
                .mime_str(&avatar.mime_type)
                .map_err(|error| InfraError::InvalidInput(format!("invalid avatar mime type: {error}")))?;
            form = form.part("avatar", part);
        }

        let request = self
            .client
            .put(self.endpoint(&["api", "users", "profile"])?)
            .bearer_auth(access_token)
            .multipart(form);
        self.execute(request, "update profile").await?;
        Ok(())
    }

    async fn logout(&self, access_token: &str) -> Result<(), InfraError> {
        Self::ensure_non_empty(access_token, "access token")?;

        let request = self
            .client
            .post(self.endpoint(&["api", "users", "logout"])?)
            .bearer_auth(access_token)
            .json(&serde_json::json!({}));
        self.execute(request, "logout").await?;
        Ok(())
    }
}
