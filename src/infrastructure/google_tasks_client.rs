use crate::infrastructure::error::InfraError;
use crate::infrastructure::task_mapper::GoogleTask;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use std::time::Duration;
use url::Url;

pub const TASKS_API_BASE: &str = "https://www.googleapis.com/tasks/v1/";
const PAGE_SIZE: &str = "100";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskListSummary {
    pub id: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListTasksRequest {
    pub due_min: String,
    pub due_max: String,
    pub page_token: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct TasksPage {
    pub items: Vec<GoogleTask>,
    pub next_page_token: Option<String>,
}

/// Google Tasks API v1. One call per method; paging is left to the caller
/// so a failure on any page is visible there.
#[async_trait]
pub trait GoogleTasksClient: Send + Sync {
    async fn list_task_lists(&self, access_token: &str) -> Result<Vec<TaskListSummary>, InfraError>;

    async fn create_task_list(
        &self,
        access_token: &str,
        title: &str,
    ) -> Result<TaskListSummary, InfraError>;

    async fn list_tasks_page(
        &self,
        access_token: &str,
        list_id: &str,
        request: ListTasksRequest,
    ) -> Result<TasksPage, InfraError>;

    async fn get_task(
        &self,
        access_token: &str,
        list_id: &str,
        task_id: &str,
    ) -> Result<GoogleTask, InfraError>;

    async fn insert_task(
        &self,
        access_token: &str,
        list_id: &str,
        task: &GoogleTask,
    ) -> Result<String, InfraError>;

    async fn update_task(
        &self,
        access_token: &str,
        list_id: &str,
        task_id: &str,
        task: &GoogleTask,
    ) -> Result<(), InfraError>;

    async fn delete_task(
        &self,
        access_token: &str,
        list_id: &str,
        task_id: &str,
    ) -> Result<(), InfraError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestGoogleTasksClient {
    client: Client,
    base: Url,
}

#[derive(Debug, serde::Deserialize)]
struct TaskListsResponse {
    items: Option<Vec<TaskListItem>>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
struct TaskListItem {
    id: Option<String>,
    title: Option<String>,
}

#[derive(Debug, serde::Serialize)]
struct CreateTaskListRequest<'a> {
    title: &'a str,
}

#[derive(Debug, serde::Deserialize)]
struct TasksPageResponse {
    items: Option<Vec<GoogleTask>>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

impl ReqwestGoogleTasksClient {
    pub fn new(timeout: Duration) -> Result<Self, InfraError> {
        Self::with_base_url(TASKS_API_BASE, timeout)
    }

    pub fn with_base_url(base_url: &str, timeout: Duration) -> Result<Self, InfraError> {
        let mut normalized = base_url.trim().to_string();
        if !normalized.ends_with('/') {
            normalized.push('/');
        }
        let base = Url::parse(&normalized)
            .map_err(|error| InfraError::InvalidConfig(format!("invalid tasks api base url: {error}")))?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| InfraError::Network(format!("failed to build http client: {error}")))?;
        Ok(Self { client, base })
    }

    fn ensure_non_empty(value: &str, field: &str) -> Result<(), InfraError> {
        if value.trim().is_empty() {
            return Err(InfraError::InvalidConfig(format!("{field} must not be empty")));
        }
        Ok(())
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, InfraError> {
        let mut url = self.base.clone();
        {
            let mut path = url.path_segments_mut().map_err(|_| {
                InfraError::InvalidConfig("tasks api base URL cannot be a base".to_string())
            })?;
            path.pop_if_empty();
            for segment in segments {
                path.push(segment);
            }
        }
        Ok(url)
    }

    fn tasks_endpoint(&self, list_id: &str) -> Result<Url, InfraError> {
        self.endpoint(&["lists", list_id, "tasks"])
    }

    fn task_endpoint(&self, list_id: &str, task_id: &str) -> Result<Url, InfraError> {
        self.endpoint(&["lists", list_id, "tasks", task_id])
    }

    async fn send(&self, request: RequestBuilder, context: &str) -> Result<String, InfraError> {
        let response = request
            .send()
            .await
            .map_err(|error| InfraError::from_reqwest(context, error))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| InfraError::from_reqwest(context, error))?;

        if !status.is_success() {
            return Err(InfraError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }

    fn parse<T: DeserializeOwned>(body: &str, context: &str) -> Result<T, InfraError> {
        serde_json::from_str(body).map_err(|error| {
            InfraError::Network(format!("invalid {context} payload: {error}; body={body}"))
        })
    }
}

#[async_trait]
impl GoogleTasksClient for ReqwestGoogleTasksClient {
    async fn list_task_lists(&self, access_token: &str) -> Result<Vec<TaskListSummary>, InfraError> {
        Self::ensure_non_empty(access_token, "access token")?;

        let endpoint = self.endpoint(&["users", "@me", "lists"])?;
        let mut lists = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .get(endpoint.clone())
                .bearer_auth(access_token)
                .query(&[("maxResults", PAGE_SIZE)]);
            if let Some(page_token) = page_token.as_deref() {
                request = request.query(&[("pageToken", page_token)]);
            }

            let body = self.send(request, "listing task lists").await?;
            let parsed: TaskListsResponse = Self::parse(&body, "task list")?;

            lists.extend(parsed.items.unwrap_or_default().into_iter().filter_map(|item| {
                let id = item.id?.trim().to_string();
                if id.is_empty() {
                    return None;
                }
                let title = item.title.unwrap_or_default().trim().to_string();
                Some(TaskListSummary { id, title })
            }));

            match parsed.next_page_token.filter(|token| !token.is_empty()) {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }

        Ok(lists)
    }

    async fn create_task_list(
        &self,
        access_token: &str,
        title: &str,
    ) -> Result<TaskListSummary, InfraError> {
        Self::ensure_non_empty(access_token, "access token")?;
        Self::ensure_non_empty(title, "task list title")?;

        let title = title.trim();
        let endpoint = self.endpoint(&["users", "@me", "lists"])?;
        let request = self
            .client
            .post(endpoint)
            .bearer_auth(access_token)
            .json(&CreateTaskListRequest { title });
        let body = self.send(request, "creating task list").await?;
        let parsed: TaskListItem = Self::parse(&body, "task list create")?;

        let id = parsed
            .id
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .ok_or_else(|| InfraError::Network("task list create response did not include id".to_string()))?;
        Ok(TaskListSummary {
            id,
            title: parsed.title.unwrap_or_else(|| title.to_string()),
        })
    }

    async fn list_tasks_page(
        &self,
        access_token: &str,
        list_id: &str,
        request: ListTasksRequest,
    ) -> Result<TasksPage, InfraError> {
        Self::ensure_non_empty(access_token, "access token")?;
        Self::ensure_non_empty(list_id, "task list id")?;

        let mut builder = self
            .client
            .get(self.tasks_endpoint(list_id)?)
            .bearer_auth(access_token)
            .query(&[
                ("dueMin", request.due_min.as_str()),
                ("dueMax", request.due_max.as_str()),
                ("showCompleted", "true"),
                ("showHidden", "true"),
                ("maxResults", PAGE_SIZE),
            ]);
        if let Some(page_token) = request.page_token.as_deref() {
            builder = builder.query(&[("pageToken", page_token)]);
        }

        let body = self.send(builder, "listing tasks").await?;
        let parsed: TasksPageResponse = Self::parse(&body, "tasks page")?;
        Ok(TasksPage {
            items: parsed.items.unwrap_or_default(),
            next_page_token: parsed.next_page_token.filter(|token| !token.is_empty()),
        })
    }

    async fn get_task(
        &self,
        access_token: &str,
        list_id: &str,
        task_id: &str,
    ) -> Result<GoogleTask, InfraError> {
        Self::ensure_non_empty(access_token, "access token")?;
        Self::ensure_non_empty(list_id, "task list id")?;
        Self::ensure_non_empty(task_id, "task id")?;

        let request = self
            .client
            .get(self.task_endpoint(list_id, task_id)?)
            .bearer_auth(access_token);
        let body = self.send(request, "fetching task").await?;
        Self::parse(&body, "task")
    }

    async fn insert_task(
        &self,
        access_token: &str,
        list_id: &str,
        task: &GoogleTask,
    ) -> Result<String, InfraError> {
        Self::ensure_non_empty(access_token, "access token")?;
        Self::ensure_non_empty(list_id, "task list id")?;

        let request = self
            .client
            .post(self.tasks_endpoint(list_id)?)
            .bearer_auth(access_token)
            .json(task);
        let body = self.send(request, "creating task").await?;
        let parsed: GoogleTask = Self::parse(&body, "task create")?;
        parsed
            .id
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .ok_or_else(|| InfraError::Network("task create response did not include id".to_string()))
    }

    async fn update_task(
        &self,
        access_token: &str,
        list_id: &str,
        task_id: &str,
        task: &GoogleTask,
    ) -> Result<(), InfraError> {
        Self::ensure_non_empty(access_token, "access token")?;
        Self::ensure_non_empty(list_id, "task list id")?;
        Self::ensure_non_empty(task_id, "task id")?;

        let request = self
            .client
            .put(self.task_endpoint(list_id, task_id)?)
            .bearer_auth(access_token)
            .json(task);
        self.send(request, "updating task").await?;
        Ok(())
    }

    async fn delete_task(
        &self,
        access_token: &str,
        list_id: &str,
        task_id: &str,
    ) -> Result<(), InfraError> {
        Self::ensure_non_empty(access_token, "access token")?;
        Self::ensure_non_empty(list_id, "task list id")?;
        Self::ensure_non_empty(task_id, "task id")?;

        let request = self
            .client
            .delete(self.task_endpoint(list_id, task_id)?)
            .bearer_auth(access_token);
        self.send(request, "deleting task").await?;
        Ok(())
    }
}
