//! In-memory [`Store`] implementation.

use crate::Store;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use geowatch_core::{
    AnalyticsEvent, CrawlResult, CrawlTask, DriftEvent, GeoError, Project, ProjectId, ProjectStatus,
    QueryId, QueryItem, Result, Run, RunId, RunStatus, Subscription, SubscriptionId, TaskId,
    TaskStatus, UserId, WorkspaceId,
};
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Default)]
struct Inner {
    projects: HashMap<ProjectId, Project>,
    query_items: HashMap<QueryId, QueryItem>,
    runs: HashMap<RunId, Run>,
    tasks: HashMap<TaskId, CrawlTask>,
    results: Vec<CrawlResult>,
    drift_events: Vec<DriftEvent>,
    subscriptions: HashMap<SubscriptionId, Subscription>,
    events: Vec<AnalyticsEvent>,
    recipients: HashMap<WorkspaceId, Vec<UserId>>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_project(&self, project: Project) -> Result<()> {
        self.inner.write().unwrap().projects.insert(project.id, project);
        Ok(())
    }

    async fn project(&self, id: ProjectId) -> Result<Project> {
        self.inner
            .read()
            .unwrap()
            .projects
            .get(&id)
            .cloned()
            .ok_or_else(|| GeoError::NotFound(format!("project {id}")))
    }

    async fn active_projects(&self) -> Result<Vec<Project>> {
        let inner = self.inner.read().unwrap();
        let mut projects: Vec<Project> = inner
            .projects
            .values()
            .filter(|p| p.status == ProjectStatus::Active)
            .cloned()
            .collect();
        projects.sort_by_key(|p| p.created_at);
        Ok(projects)
    }

    async fn insert_query_item(&self, item: QueryItem) -> Result<()> {
        self.inner.write().unwrap().query_items.insert(item.id, item);
        Ok(())
    }

    async fn query_item(&self, id: QueryId) -> Result<QueryItem> {
        self.inner
            .read()
            .unwrap()
            .query_items
            .get(&id)
            .cloned()
            .ok_or_else(|| GeoError::NotFound(format!("query item {id}")))
    }

    async fn query_items_for_project(&self, project_id: ProjectId) -> Result<Vec<QueryItem>> {
        let inner = self.inner.read().unwrap();
        let mut items: Vec<QueryItem> = inner
            .query_items
            .values()
            .filter(|q| q.project_id == project_id)
            .cloned()
            .collect();
        items.sort_by_key(|q| q.position);
        Ok(items)
    }

    async fn create_run(&self, project_id: ProjectId) -> Result<Run> {
        let mut inner = self.inner.write().unwrap();
        if !inner.projects.contains_key(&project_id) {
            return Err(GeoError::NotFound(format!("project {project_id}")));
        }
        let next_number = inner
            .runs
            .values()
            .filter(|r| r.project_id == project_id)
            .map(|r| r.run_number)
            .max()
            .unwrap_or(0)
            + 1;
        let run = Run::new(project_id, next_number);
        inner.runs.insert(run.id, run.clone());
        Ok(run)
    }

    async fn run(&self, id: RunId) -> Result<Run> {
        self.inner
            .read()
            .unwrap()
            .runs
            .get(&id)
            .cloned()
            .ok_or_else(|| GeoError::NotFound(format!("run {id}")))
    }

    async fn save_run(&self, run: Run) -> Result<()> {
        self.inner.write().unwrap().runs.insert(run.id, run);
        Ok(())
    }

    async fn completed_runs(&self, project_id: ProjectId, limit: usize) -> Result<Vec<Run>> {
        let inner = self.inner.read().unwrap();
        let mut runs: Vec<Run> = inner
            .runs
            .values()
            .filter(|r| {
                r.project_id == project_id
                    && r.status == RunStatus::Completed
                    && r.summary_metrics.is_some()
            })
            .cloned()
            .collect();
        runs.sort_by(|a, b| {
            b.completed_at
                .cmp(&a.completed_at)
                .then(b.run_number.cmp(&a.run_number))
        });
        runs.truncate(limit);
        Ok(runs)
    }

    async fn insert_task(&self, task: CrawlTask) -> Result<()> {
        self.inner.write().unwrap().tasks.insert(task.id, task);
        Ok(())
    }

    async fn task(&self, id: TaskId) -> Result<CrawlTask> {
        self.inner
            .read()
            .unwrap()
            .tasks
            .get(&id)
            .cloned()
            .ok_or_else(|| GeoError::NotFound(format!("task {id}")))
    }

    async fn save_task(&self, task: CrawlTask) -> Result<()> {
        self.inner.write().unwrap().tasks.insert(task.id, task);
        Ok(())
    }

    async fn tasks_for_run(&self, run_id: RunId) -> Result<Vec<CrawlTask>> {
        let inner = self.inner.read().unwrap();
        let mut tasks: Vec<CrawlTask> = inner
            .tasks
            .values()
            .filter(|t| t.run_id == Some(run_id))
            .cloned()
            .collect();
        tasks.sort_by_key(|t| t.created_at);
        Ok(tasks)
    }

    async fn tasks_for_project(&self, project_id: ProjectId) -> Result<Vec<CrawlTask>> {
        let inner = self.inner.read().unwrap();
        let mut tasks: Vec<CrawlTask> = inner
            .tasks
            .values()
            .filter(|t| t.project_id == project_id)
            .cloned()
            .collect();
        tasks.sort_by_key(|t| t.created_at);
        Ok(tasks)
    }

    async fn latest_completed_task(&self, project_id: ProjectId) -> Result<Option<CrawlTask>> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .tasks
            .values()
            .filter(|t| t.project_id == project_id && t.status == TaskStatus::Completed)
            .max_by_key(|t| t.completed_at)
            .cloned())
    }

    async fn insert_result(&self, result: CrawlResult) -> Result<()> {
        self.inner.write().unwrap().results.push(result);
        Ok(())
    }

    async fn results_for_task(&self, task_id: TaskId) -> Result<Vec<CrawlResult>> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .results
            .iter()
            .filter(|r| r.task_id == task_id)
            .cloned()
            .collect())
    }

    async fn results_for_run(&self, run_id: RunId) -> Result<Vec<CrawlResult>> {
        let inner = self.inner.read().unwrap();
        let task_ids: Vec<TaskId> = inner
            .tasks
            .values()
            .filter(|t| t.run_id == Some(run_id))
            .map(|t| t.id)
            .collect();
        Ok(inner
            .results
            .iter()
            .filter(|r| task_ids.contains(&r.task_id))
            .cloned()
            .collect())
    }

    async fn insert_drift_event(&self, event: DriftEvent) -> Result<()> {
        self.inner.write().unwrap().drift_events.push(event);
        Ok(())
    }

    async fn drift_events_for_project(&self, project_id: ProjectId) -> Result<Vec<DriftEvent>> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .drift_events
            .iter()
            .filter(|e| e.project_id == project_id)
            .cloned()
            .collect())
    }

    async fn insert_subscription(&self, subscription: Subscription) -> Result<()> {
        self.inner
            .write()
            .unwrap()
            .subscriptions
            .insert(subscription.id, subscription);
        Ok(())
    }

    async fn subscriptions(&self) -> Result<Vec<Subscription>> {
        Ok(self
            .inner
            .read()
            .unwrap()
            .subscriptions
            .values()
            .cloned()
            .collect())
    }

    async fn save_subscription(&self, subscription: Subscription) -> Result<()> {
        self.inner
            .write()
            .unwrap()
            .subscriptions
            .insert(subscription.id, subscription);
        Ok(())
    }

    async fn insert_event(&self, event: AnalyticsEvent) -> Result<()> {
        self.inner.write().unwrap().events.push(event);
        Ok(())
    }

    async fn delete_events_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let mut inner = self.inner.write().unwrap();
        let before = inner.events.len();
        inner.events.retain(|e| e.created_at >= cutoff);
        Ok(before - inner.events.len())
    }

    async fn add_workspace_recipient(
        &self,
        workspace_id: WorkspaceId,
        user_id: UserId,
    ) -> Result<()> {
        self.inner
            .write()
            .unwrap()
            .recipients
            .entry(workspace_id)
            .or_default()
            .push(user_id);
        Ok(())
    }

    async fn workspace_recipients(&self, workspace_id: WorkspaceId) -> Result<Vec<UserId>> {
        Ok(self
            .inner
            .read()
            .unwrap()
            .recipients
            .get(&workspace_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geowatch_core::Engine;

    fn project() -> Project {
        Project::new(WorkspaceId::new(), "acme")
    }

    #[tokio::test]
    async fn run_numbers_are_monotonic_per_project() {
        let store = MemoryStore::new();
        let p1 = project();
        let p2 = project();
        store.insert_project(p1.clone()).await.unwrap();
        store.insert_project(p2.clone()).await.unwrap();

        let a = store.create_run(p1.id).await.unwrap();
        let b = store.create_run(p1.id).await.unwrap();
        let c = store.create_run(p2.id).await.unwrap();
        assert_eq!(a.run_number, 1);
        assert_eq!(b.run_number, 2);
        assert_eq!(c.run_number, 1);
    }

    #[tokio::test]
    async fn create_run_requires_an_existing_project() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.create_run(ProjectId::new()).await,
            Err(GeoError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn completed_runs_order_by_completion_then_number() {
        let store = MemoryStore::new();
        let p = project();
        store.insert_project(p.clone()).await.unwrap();

        let t0 = Utc::now();
        for (number_offset, completed_at) in [(0, t0), (1, t0 + chrono::Duration::hours(1)), (2, t0)]
        {
            let mut run = store.create_run(p.id).await.unwrap();
            run.status = RunStatus::Completed;
            run.completed_at = Some(completed_at);
            run.summary_metrics = Some(serde_json::json!({}));
            let _ = number_offset;
            store.save_run(run).await.unwrap();
        }

        let runs = store.completed_runs(p.id, 3).await.unwrap();
        assert_eq!(runs.len(), 3);
        // Newest completion first; equal completions fall back to run_number.
        assert_eq!(runs[0].run_number, 2);
        assert_eq!(runs[1].run_number, 3);
        assert_eq!(runs[2].run_number, 1);
    }

    #[tokio::test]
    async fn results_keep_insertion_order() {
        let store = MemoryStore::new();
        let p = project();
        store.insert_project(p.clone()).await.unwrap();
        let task = CrawlTask::new(p.id, Engine::Kimi, vec![]);
        let task_id = task.id;
        store.insert_task(task).await.unwrap();

        for i in 0..5 {
            let result = CrawlResult {
                id: geowatch_core::ResultId::new(),
                task_id,
                query_id: QueryId::new(),
                engine: Engine::Kimi,
                query_text: format!("q{i}"),
                response_text: String::new(),
                citations: vec![],
                raw_html: None,
                screenshot_path: None,
                response_time_ms: None,
                error: None,
                is_complete: true,
                has_citations: false,
                crawled_at: Utc::now(),
            };
            store.insert_result(result).await.unwrap();
        }

        let results = store.results_for_task(task_id).await.unwrap();
        let order: Vec<String> = results.iter().map(|r| r.query_text.clone()).collect();
        assert_eq!(order, vec!["q0", "q1", "q2", "q3", "q4"]);
    }

    #[tokio::test]
    async fn event_cleanup_deletes_only_old_rows() {
        let store = MemoryStore::new();
        let ws = WorkspaceId::new();
        let now = Utc::now();
        for age_days in [1, 50, 120] {
            store
                .insert_event(AnalyticsEvent {
                    id: geowatch_core::EventId::new(),
                    workspace_id: ws,
                    name: "page_view".into(),
                    payload: None,
                    created_at: now - chrono::Duration::days(age_days),
                })
                .await
                .unwrap();
        }
        let deleted = store
            .delete_events_before(now - chrono::Duration::days(90))
            .await
            .unwrap();
        assert_eq!(deleted, 1);
    }
}
