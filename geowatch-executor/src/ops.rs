//! Task operations exposed to the API layer (transport-agnostic).

use crate::executor::CancelRegistry;
use chrono::{DateTime, Utc};
use geowatch_core::{
    CrawlResult, CrawlTask, Engine, GeoError, ProjectId, QueryId, QueryItem, Result, TaskId,
    TaskStatus,
};
use geowatch_store::{ExportFormat, Store, export_results};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone)]
pub struct CreateTaskRequest {
    pub project_id: ProjectId,
    pub engine: Engine,
    /// Existing query items to run.
    pub query_ids: Vec<QueryId>,
    /// Raw query strings; each becomes a new informational query item.
    pub raw_queries: Vec<String>,
    pub region: Option<String>,
    pub language: Option<String>,
    pub use_proxy: bool,
    pub enable_web_search: bool,
}

impl CreateTaskRequest {
    pub fn new(project_id: ProjectId, engine: Engine) -> Self {
        Self {
            project_id,
            engine,
            query_ids: Vec::new(),
            raw_queries: Vec::new(),
            region: None,
            language: None,
            use_proxy: true,
            enable_web_search: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TaskView {
    pub id: TaskId,
    pub project_id: ProjectId,
    pub engine: Engine,
    pub status: TaskStatus,
    pub total: u32,
    pub successful: u32,
    pub failed: u32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<&CrawlTask> for TaskView {
    fn from(task: &CrawlTask) -> Self {
        Self {
            id: task.id,
            project_id: task.project_id,
            engine: task.engine,
            status: task.status,
            total: task.total,
            successful: task.successful,
            failed: task.failed,
            created_at: task.created_at,
            started_at: task.started_at,
            completed_at: task.completed_at,
        }
    }
}

pub struct TaskService {
    store: Arc<dyn Store>,
    cancels: CancelRegistry,
}

impl TaskService {
    pub fn new(store: Arc<dyn Store>, cancels: CancelRegistry) -> Self {
        Self { store, cancels }
    }

    /// Create a crawl task. Raw queries materialize as new informational
    /// query items on the project; at least one query must resolve.
    pub async fn create_task(&self, request: CreateTaskRequest) -> Result<TaskId> {
        let project = self.store.project(request.project_id).await?;

        if request.query_ids.is_empty() && request.raw_queries.iter().all(|q| q.trim().is_empty())
        {
            return Err(GeoError::BadRequest(
                "either query_ids or raw_queries must be provided".into(),
            ));
        }

        let mut query_ids = Vec::new();
        for query_id in &request.query_ids {
            // Validate up front; a task full of dangling ids fails fast here
            // instead of at execution time.
            self.store.query_item(*query_id).await?;
            query_ids.push(*query_id);
        }

        let existing = self
            .store
            .query_items_for_project(project.id)
            .await?
            .len() as u32;
        for (offset, raw) in request
            .raw_queries
            .iter()
            .map(|q| q.trim())
            .filter(|q| !q.is_empty())
            .enumerate()
        {
            let item = QueryItem::informational(project.id, raw, existing + offset as u32);
            query_ids.push(item.id);
            self.store.insert_query_item(item).await?;
        }

        if query_ids.is_empty() {
            return Err(GeoError::BadRequest("no valid queries provided".into()));
        }

        let mut task = CrawlTask::new(project.id, request.engine, query_ids);
        task.region = request.region;
        task.language = request.language;
        task.use_proxy = request.use_proxy;
        task.enable_web_search = request.enable_web_search;
        let task_id = task.id;
        self.store.insert_task(task).await?;

        info!(%task_id, engine = %request.engine, "crawl task created");
        Ok(task_id)
    }

    pub async fn get(&self, task_id: TaskId) -> Result<TaskView> {
        Ok(TaskView::from(&self.store.task(task_id).await?))
    }

    /// Cancel a pending or running task. Pending tasks flip immediately; a
    /// running one halts at its next query boundary.
    pub async fn cancel(&self, task_id: TaskId) -> Result<()> {
        let mut task = self.store.task(task_id).await?;
        match task.status {
            TaskStatus::Pending => {
                task.status = TaskStatus::Cancelled;
                task.completed_at = Some(Utc::now());
                self.store.save_task(task).await
            }
            TaskStatus::Running => {
                self.cancels.request(task_id);
                Ok(())
            }
            other => Err(GeoError::BadRequest(format!(
                "task {task_id} is {other:?} and cannot be cancelled"
            ))),
        }
    }

    /// Reset a terminal task back to pending so the executor can rerun it.
    pub async fn retry(&self, task_id: TaskId) -> Result<()> {
        let mut task = self.store.task(task_id).await?;
        if !task.status.is_terminal() {
            return Err(GeoError::BadRequest(format!(
                "task {task_id} is {:?} and cannot be retried",
                task.status
            )));
        }
        task.status = TaskStatus::Pending;
        task.successful = 0;
        task.failed = 0;
        task.started_at = None;
        task.completed_at = None;
        self.store.save_task(task).await
    }

    pub async fn results(&self, task_id: TaskId) -> Result<Vec<CrawlResult>> {
        self.store.task(task_id).await?;
        self.store.results_for_task(task_id).await
    }

    pub async fn export(&self, task_id: TaskId, format: ExportFormat) -> Result<String> {
        let results = self.results(task_id).await?;
        export_results(&results, format)
    }

    /// Export every result across all of a project's tasks.
    pub async fn export_project(
        &self,
        project_id: ProjectId,
        format: ExportFormat,
    ) -> Result<String> {
        self.store.project(project_id).await?;
        let mut results = Vec::new();
        for task in self.store.tasks_for_project(project_id).await? {
            results.extend(self.store.results_for_task(task.id).await?);
        }
        export_results(&results, format)
    }
}
