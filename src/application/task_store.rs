use crate::application::oauth::AccessTokenSource;
use crate::domain::models::{RecurrenceRequest, Task, TaskBucket, TaskStatus};
use crate::domain::recurrence::expand;
use crate::error::CoreError;
use crate::infrastructure::change_signal::ChangeNotifier;
use crate::infrastructure::clock::{system_now, NowProvider};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::google_tasks_client::{GoogleTasksClient, ListTasksRequest};
use crate::infrastructure::task_mapper::{
    apply_status, decode_task, encode_new_task, format_due_end, format_due_start,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// The fetch half of the store, as the scheduler sees it.
#[async_trait]
pub trait TaskSync: Send + Sync {
    async fn sync(&self, start: NaiveDate, end: NaiveDate) -> Result<TaskBucket, CoreError>;
}

pub struct TaskStore<A, G>
where
    A: AccessTokenSource,
    G: GoogleTasksClient,
{
    list_name: String,
    token_source: Arc<A>,
    tasks_client: Arc<G>,
    notifier: Arc<dyn ChangeNotifier>,
    list_id: Mutex<Option<String>>,
    now_provider: NowProvider,
}

impl<A, G> TaskStore<A, G>
where
    A: AccessTokenSource,
    G: GoogleTasksClient,
{
    pub fn new(
        list_name: impl Into<String>,
        token_source: Arc<A>,
        tasks_client: Arc<G>,
        notifier: Arc<dyn ChangeNotifier>,
    ) -> Self {
        Self {
            list_name: list_name.into().trim().to_string(),
            token_source,
            tasks_client,
            notifier,
            list_id: Mutex::new(None),
            now_provider: system_now(),
        }
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    pub fn list_name(&self) -> &str {
        &self.list_name
    }

    /// Fetches every task due in `[start, end]`, following all pages.
    pub async fn fetch_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<TaskBucket, CoreError> {
        if end < start {
            return Err(CoreError::InvalidRequest(format!(
                "range end {end} is before start {start}"
            )));
        }

        let token = self.token_source.access_token().await?;
        let list_id = self.resolve_list(&token).await?;

        let mut tasks: Vec<Task> = Vec::new();
        let mut page_token: Option<String> = None;
        let mut pages = 0usize;
        let mut skipped = 0usize;

        loop {
            let request = ListTasksRequest {
                due_min: format_due_start(start),
                due_max: format_due_end(end),
                page_token: page_token.take(),
            };
            let page = self
                .list_scoped(self.tasks_client.list_tasks_page(&token, &list_id, request).await)
                .await?;
            pages += 1;

            for raw in page.items {
                match decode_task(raw) {
                    Some(task) if task.due >= start && task.due <= end => tasks.push(task),
                    _ => skipped += 1,
                }
            }

            match page.next_page_token {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }

        if skipped > 0 {
            debug!(skipped, "ignored tasks without a due date in range");
        }
        let bucket = TaskBucket::from_tasks(tasks);
        info!(%start, %end, pages, tasks = bucket.task_count(), "tasks synced");
        Ok(bucket)
    }

    /// Creates one task per expanded date. Nothing is sent when the
    /// request itself is invalid.
    pub async fn create_recurring(
        &self,
        request: &RecurrenceRequest,
    ) -> Result<Vec<String>, CoreError> {
        let title = request.title.trim();
        if title.is_empty() {
            return Err(CoreError::InvalidRequest("title must not be empty".to_string()));
        }
        let dates = expand(request)?;

        let token = self.token_source.access_token().await?;
        let list_id = self.resolve_list(&token).await?;

        let requested = dates.len();
        let mut created_ids = Vec::with_capacity(requested);
        for date in dates {
            let body = encode_new_task(title, &request.notes, date);
            match self.tasks_client.insert_task(&token, &list_id, &body).await {
                Ok(id) => created_ids.push(id),
                Err(error) => {
                    warn!(%error, created = created_ids.len(), requested, "task creation stopped");
                    self.forget_list_if_missing(&error).await;
                    if created_ids.is_empty() {
                        return Err(CoreError::sync(error));
                    }
                    self.post_changed();
                    return Err(CoreError::SyncPartial {
                        created_ids,
                        requested,
                        reason: error.to_string(),
                    });
                }
            }
        }

        info!(title, created = created_ids.len(), "tasks created");
        self.post_changed();
        Ok(created_ids)
    }

    pub async fn set_status(&self, task_id: &str, status: TaskStatus) -> Result<(), CoreError> {
        let task_id = Self::require_task_id(task_id)?;
        let token = self.token_source.access_token().await?;
        let list_id = self.resolve_list(&token).await?;

        let mut task = self
            .list_scoped(self.tasks_client.get_task(&token, &list_id, task_id).await)
            .await?;
        apply_status(&mut task, status, (self.now_provider)());
        self.list_scoped(self.tasks_client.update_task(&token, &list_id, task_id, &task).await)
            .await?;

        info!(task_id, status = status.as_str(), "task status updated");
        self.post_changed();
        Ok(())
    }

    /// Flips completion and returns the status the task now has.
    pub async fn toggle_status(&self, task_id: &str) -> Result<TaskStatus, CoreError> {
        let task_id = Self::require_task_id(task_id)?;
        let token = self.token_source.access_token().await?;
        let list_id = self.resolve_list(&token).await?;

        let mut task = self
            .list_scoped(self.tasks_client.get_task(&token, &list_id, task_id).await)
            .await?;
        let next = task
            .status
            .as_deref()
            .and_then(TaskStatus::parse)
            .unwrap_or(TaskStatus::NeedsAction)
            .toggled();
        apply_status(&mut task, next, (self.now_provider)());
        self.list_scoped(self.tasks_client.update_task(&token, &list_id, task_id, &task).await)
            .await?;

        info!(task_id, status = next.as_str(), "task status toggled");
        self.post_changed();
        Ok(next)
    }

    pub async fn rename(&self, task_id: &str, title: &str, notes: &str) -> Result<(), CoreError> {
        let task_id = Self::require_task_id(task_id)?;
        let title = title.trim();
        if title.is_empty() {
            return Err(CoreError::InvalidRequest("title must not be empty".to_string()));
        }
        let notes = notes.trim();

        let token = self.token_source.access_token().await?;
        let list_id = self.resolve_list(&token).await?;

        let mut task = self
            .list_scoped(self.tasks_client.get_task(&token, &list_id, task_id).await)
            .await?;
        task.title = Some(title.to_string());
        task.notes = (!notes.is_empty()).then(|| notes.to_string());
        self.list_scoped(self.tasks_client.update_task(&token, &list_id, task_id, &task).await)
            .await?;

        info!(task_id, "task renamed");
        self.post_changed();
        Ok(())
    }

    pub async fn remove(&self, task_id: &str) -> Result<(), CoreError> {
        let task_id = Self::require_task_id(task_id)?;
        let token = self.token_source.access_token().await?;
        let list_id = self.resolve_list(&token).await?;

        self.list_scoped(self.tasks_client.delete_task(&token, &list_id, task_id).await)
            .await?;

        info!(task_id, "task removed");
        self.post_changed();
        Ok(())
    }

    fn require_task_id(task_id: &str) -> Result<&str, CoreError> {
        let task_id = task_id.trim();
        if task_id.is_empty() {
            return Err(CoreError::InvalidRequest("task id must not be empty".to_string()));
        }
        Ok(task_id)
    }

    // Held across the lookup so concurrent first calls create the list once.
    async fn resolve_list(&self, access_token: &str) -> Result<String, CoreError> {
        let mut cached = self.list_id.lock().await;
        if let Some(list_id) = cached.as_ref() {
            return Ok(list_id.clone());
        }

        let lists = self
            .tasks_client
            .list_task_lists(access_token)
            .await
            .map_err(CoreError::sync)?;
        let list_id = match lists.into_iter().find(|list| list.title == self.list_name) {
            Some(existing) => existing.id,
            None => {
                info!(list = %self.list_name, "task list not found; creating it");
                self.tasks_client
                    .create_task_list(access_token, &self.list_name)
                    .await
                    .map_err(CoreError::sync)?
                    .id
            }
        };

        *cached = Some(list_id.clone());
        Ok(list_id)
    }

    /// Google answers 404 for a deleted or recreated list; the cached id is
    /// dropped so the next call looks the list up again.
    async fn forget_list_if_missing(&self, error: &InfraError) {
        if matches!(error, InfraError::Api { status: 404, .. }) {
            if self.list_id.lock().await.take().is_some() {
                warn!(list = %self.list_name, "cached task list id no longer resolves");
            }
        }
    }

    async fn list_scoped<T>(&self, result: Result<T, InfraError>) -> Result<T, CoreError> {
        match result {
            Ok(value) => Ok(value),
            Err(error) => {
                self.forget_list_if_missing(&error).await;
                Err(CoreError::sync(error))
            }
        }
    }

    fn post_changed(&self) {
        if let Err(error) = self.notifier.notify_changed() {
            warn!(%error, "failed to post data-changed signal");
        }
    }
}

#[async_trait]
impl<A, G> TaskSync for TaskStore<A, G>
where
    A: AccessTokenSource,
    G: GoogleTasksClient,
{
    async fn sync(&self, start: NaiveDate, end: NaiveDate) -> Result<TaskBucket, CoreError> {
        self.fetch_range(start, end).await
    }
}
