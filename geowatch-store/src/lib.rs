//! Entity persistence behind a narrow trait.
//!
//! Every cross-worker mutation goes through a [`Store`]; components never
//! share in-memory object graphs. The in-memory implementation in
//! [`memory`] backs tests and single-process deployments; a SQL-backed
//! implementation slots behind the same trait.

pub mod export;
pub mod memory;

pub use export::{ExportFormat, ExportRow, export_results};
pub use memory::MemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use geowatch_core::{
    AnalyticsEvent, CrawlResult, CrawlTask, DriftEvent, Project, QueryItem, Result, Run, RunId,
    Subscription, TaskId, UserId, WorkspaceId,
};
use geowatch_core::{ProjectId, QueryId};

/// Persistence seam for the crawl-and-score pipeline. Reads return owned
/// values; writes replace whole rows. Implementations keep every mutation
/// short — no transaction spans a suspension point in the callers.
#[async_trait]
pub trait Store: Send + Sync {
    // Projects
    async fn insert_project(&self, project: Project) -> Result<()>;
    async fn project(&self, id: ProjectId) -> Result<Project>;
    async fn active_projects(&self) -> Result<Vec<Project>>;

    // Query items
    async fn insert_query_item(&self, item: QueryItem) -> Result<()>;
    async fn query_item(&self, id: QueryId) -> Result<QueryItem>;
    async fn query_items_for_project(&self, project_id: ProjectId) -> Result<Vec<QueryItem>>;

    // Runs
    /// Allocate the next `run_number` for the project and persist the run.
    async fn create_run(&self, project_id: ProjectId) -> Result<Run>;
    async fn run(&self, id: RunId) -> Result<Run>;
    async fn save_run(&self, run: Run) -> Result<()>;
    /// Completed runs with metrics, newest first by `completed_at` with
    /// `run_number` breaking ties.
    async fn completed_runs(&self, project_id: ProjectId, limit: usize) -> Result<Vec<Run>>;

    // Crawl tasks
    async fn insert_task(&self, task: CrawlTask) -> Result<()>;
    async fn task(&self, id: TaskId) -> Result<CrawlTask>;
    async fn save_task(&self, task: CrawlTask) -> Result<()>;
    async fn tasks_for_run(&self, run_id: RunId) -> Result<Vec<CrawlTask>>;
    async fn tasks_for_project(&self, project_id: ProjectId) -> Result<Vec<CrawlTask>>;
    async fn latest_completed_task(&self, project_id: ProjectId) -> Result<Option<CrawlTask>>;

    // Crawl results
    async fn insert_result(&self, result: CrawlResult) -> Result<()>;
    /// Results in the order they were persisted (the task's query order).
    async fn results_for_task(&self, task_id: TaskId) -> Result<Vec<CrawlResult>>;
    async fn results_for_run(&self, run_id: RunId) -> Result<Vec<CrawlResult>>;

    // Drift events
    async fn insert_drift_event(&self, event: DriftEvent) -> Result<()>;
    async fn drift_events_for_project(&self, project_id: ProjectId) -> Result<Vec<DriftEvent>>;

    // Subscriptions
    async fn insert_subscription(&self, subscription: Subscription) -> Result<()>;
    async fn subscriptions(&self) -> Result<Vec<Subscription>>;
    async fn save_subscription(&self, subscription: Subscription) -> Result<()>;

    // Analytics events
    async fn insert_event(&self, event: AnalyticsEvent) -> Result<()>;
    async fn delete_events_before(&self, cutoff: DateTime<Utc>) -> Result<usize>;

    // Workspace membership (read-only view for notification fan-out)
    async fn add_workspace_recipient(&self, workspace_id: WorkspaceId, user_id: UserId)
    -> Result<()>;
    async fn workspace_recipients(&self, workspace_id: WorkspaceId) -> Result<Vec<UserId>>;
}
