//! The crawl executor: drives one task from `pending` to a terminal state.
//!
//! Queries run sequentially within a task; parallelism lives across tasks.
//! Every query attempt persists a result row — failure is evidence too.

use chrono::Utc;
use geowatch_api::ApiEngine;
use geowatch_browser::Page;
use geowatch_challenge::ChallengeHandler;
use geowatch_core::config::keys;
use geowatch_core::{
    ConfigProvider, CrawlOutcome, CrawlResult, CrawlTask, CredentialKind, Engine, GeoError,
    IntentKind, NotificationIntent, Notifier, Project, QueryId, Result, ResultId, TaskId,
    TaskStatus,
};
use geowatch_engine::{BrowserAdapter, CrawlOptions};
use geowatch_session::{DEFAULT_ACCOUNT, SessionStore};
use geowatch_store::Store;
use geowatch_vault::CredentialVault;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{error, info, warn};

/// Opens fresh browser contexts. Production wires this to WebDriver; tests
/// hand back scripted pages.
#[async_trait::async_trait]
pub trait PageProvider: Send + Sync {
    async fn open(&self, engine: Engine) -> Result<Box<dyn Page>>;
}

/// Builds API adapters from an engine and a decrypted key. Swappable so the
/// executor is testable without vendor endpoints.
pub type ApiFactory =
    Arc<dyn Fn(Engine, String) -> Option<Box<dyn ApiEngine>> + Send + Sync>;

/// Cooperative cancellation, observed at query boundaries only — no
/// mid-query kill.
#[derive(Default, Clone)]
pub struct CancelRegistry {
    flags: Arc<Mutex<HashMap<TaskId, Arc<AtomicBool>>>>,
}

impl CancelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn flag_for(&self, task_id: TaskId) -> Arc<AtomicBool> {
        self.flags
            .lock()
            .unwrap()
            .entry(task_id)
            .or_default()
            .clone()
    }

    pub fn request(&self, task_id: TaskId) {
        self.flag_for(task_id).store(true, Ordering::SeqCst);
    }

    fn clear(&self, task_id: TaskId) {
        self.flags.lock().unwrap().remove(&task_id);
    }
}

#[derive(Debug, Clone)]
pub struct TaskSummary {
    pub task_id: TaskId,
    pub status: TaskStatus,
    pub total: u32,
    pub successful: u32,
    pub failed: u32,
}

pub struct CrawlExecutor {
    store: Arc<dyn Store>,
    vault: Arc<CredentialVault>,
    sessions: Arc<SessionStore>,
    pages: Arc<dyn PageProvider>,
    config: ConfigProvider,
    notifier: Notifier,
    cancels: CancelRegistry,
    api_factory: ApiFactory,
}

enum Transport {
    Api {
        adapter: Box<dyn ApiEngine>,
        credential_id: geowatch_core::CredentialId,
    },
    Browser,
}

impl CrawlExecutor {
    pub fn new(
        store: Arc<dyn Store>,
        vault: Arc<CredentialVault>,
        sessions: Arc<SessionStore>,
        pages: Arc<dyn PageProvider>,
        config: ConfigProvider,
        notifier: Notifier,
    ) -> Self {
        Self {
            store,
            vault,
            sessions,
            pages,
            config,
            notifier,
            cancels: CancelRegistry::new(),
            api_factory: Arc::new(|engine, key| geowatch_api::adapter_for(engine, key)),
        }
    }

    pub fn with_api_factory(mut self, factory: ApiFactory) -> Self {
        self.api_factory = factory;
        self
    }

    pub fn cancels(&self) -> CancelRegistry {
        self.cancels.clone()
    }

    /// Drive the task to a terminal state. Single-query failures never fail
    /// the task; only setup errors (nothing resolvable) do.
    pub async fn execute_task(&self, task_id: TaskId) -> Result<TaskSummary> {
        let mut task = self.store.task(task_id).await?;
        if task.status != TaskStatus::Pending {
            return Err(GeoError::BadRequest(format!(
                "task {task_id} is {:?}, expected pending",
                task.status
            )));
        }
        let project = self.store.project(task.project_id).await?;

        let queries = self.materialize_queries(&task).await;
        if queries.is_empty() {
            task.status = TaskStatus::Failed;
            task.completed_at = Some(Utc::now());
            self.store.save_task(task).await?;
            return Err(GeoError::BadRequest("no resolvable queries on task".into()));
        }

        task.status = TaskStatus::Running;
        task.started_at = Some(Utc::now());
        task.total = queries.len() as u32;
        self.store.save_task(task.clone()).await?;

        let cancel = self.cancels.flag_for(task_id);
        let transport = self.choose_transport(&project, task.engine);
        match &transport {
            Transport::Api { .. } => info!(engine = %task.engine, %task_id, "using api transport"),
            Transport::Browser => info!(engine = %task.engine, %task_id, "using browser transport"),
        }

        let rate = self
            .config
            .f64_or(keys::RATE_LIMIT_PER_SEC, 0.2)
            .max(0.001);
        let gap = Duration::from_secs_f64(1.0 / rate);

        let mut cancelled = false;
        for (index, (query_id, query_text)) in queries.iter().enumerate() {
            if cancel.load(Ordering::SeqCst) {
                info!(%task_id, "cancel observed at query boundary");
                cancelled = true;
                break;
            }

            let outcome = self
                .run_one(&task, &transport, query_text)
                .await
                .unwrap_or_else(|err| {
                    error!(%task_id, %err, "query raised; recording internal failure");
                    CrawlOutcome::failure(task.engine, query_text.clone(), err.to_string())
                });

            if outcome.success {
                task.successful += 1;
            } else {
                task.failed += 1;
            }
            self.persist_result(&task, *query_id, &project, outcome).await?;
            self.store.save_task(task.clone()).await?;

            if index + 1 < queries.len() {
                tokio::time::sleep(gap).await;
            }
        }

        task.status = if cancelled {
            TaskStatus::Cancelled
        } else {
            TaskStatus::Completed
        };
        task.completed_at = Some(Utc::now());
        self.store.save_task(task.clone()).await?;
        self.cancels.clear(task_id);

        if task.status == TaskStatus::Completed {
            self.notify_completion(&project, &task).await;
        }

        info!(
            %task_id,
            status = ?task.status,
            successful = task.successful,
            failed = task.failed,
            "task finished"
        );
        Ok(TaskSummary {
            task_id,
            status: task.status,
            total: task.total,
            successful: task.successful,
            failed: task.failed,
        })
    }

    async fn materialize_queries(&self, task: &CrawlTask) -> Vec<(QueryId, String)> {
        let mut queries = Vec::with_capacity(task.query_ids.len());
        for query_id in &task.query_ids {
            match self.store.query_item(*query_id).await {
                Ok(item) => queries.push((*query_id, item.text)),
                Err(_) => warn!(%query_id, "query id on task does not resolve, skipping"),
            }
        }
        queries
    }

    fn choose_transport(&self, project: &Project, engine: Engine) -> Transport {
        let api_enabled = self.config.bool_or(keys::API_MODE_ENABLED, true);
        if api_enabled && self.config.api_mode_engines().contains(&engine) {
            if let Some(credential) = self.vault.pick_active(
                project.workspace_id,
                engine,
                CredentialKind::ApiKey,
                DEFAULT_ACCOUNT,
            ) {
                let key = credential
                    .value
                    .as_str()
                    .map(str::to_string)
                    .unwrap_or_else(|| credential.value.to_string());
                if let Some(adapter) = (self.api_factory)(engine, key) {
                    return Transport::Api {
                        adapter,
                        credential_id: credential.id,
                    };
                }
            }
        }
        Transport::Browser
    }

    async fn run_one(
        &self,
        task: &CrawlTask,
        transport: &Transport,
        query_text: &str,
    ) -> Result<CrawlOutcome> {
        match transport {
            Transport::Api {
                adapter,
                credential_id,
            } => {
                match adapter.query(query_text, task.enable_web_search).await {
                    Ok(answer) => {
                        self.vault.mark_used(*credential_id);
                        Ok(CrawlOutcome {
                            success: !answer.response_text.is_empty()
                                || !answer.citations.is_empty(),
                            engine: task.engine,
                            query_text: query_text.to_string(),
                            response_text: answer.response_text,
                            citations: answer.citations,
                            response_time_ms: Some(answer.response_time_ms),
                            raw_html: None,
                            screenshot_path: None,
                            error: None,
                            requires_login: false,
                            web_search_enabled: Some(task.enable_web_search),
                            turns: Some(1),
                            crawled_at: Utc::now(),
                        })
                    }
                    Err(err) => {
                        if matches!(err, GeoError::BadRequest(_) | GeoError::RateLimited(_)) {
                            self.vault.mark_failed(*credential_id, &err.to_string());
                        }
                        Ok(CrawlOutcome::failure(
                            task.engine,
                            query_text,
                            err.to_string(),
                        ))
                    }
                }
            }
            Transport::Browser => self.run_browser_query(task, query_text).await,
        }
    }

    async fn run_browser_query(
        &self,
        task: &CrawlTask,
        query_text: &str,
    ) -> Result<CrawlOutcome> {
        let engine = task.engine;
        let page = self.pages.open(engine).await?;

        // Warm start: replay the stored session onto the engine origin before
        // the adapter navigates for real, so cookies beat the login wall.
        if let Some(state) = self.sessions.load(engine, DEFAULT_ACCOUNT).await {
            let origin = geowatch_engine::profile(engine).chat_url;
            if page.goto(origin).await.is_ok() {
                if let Err(err) = page.apply_storage_state(&state).await {
                    warn!(%engine, %err, "failed to replay stored session");
                }
            }
        }

        let challenges = ChallengeHandler::new(&self.config);
        let adapter = BrowserAdapter::new(engine, &challenges);
        let opts = CrawlOptions {
            enable_web_search: task.enable_web_search,
            screenshot_dir: PathBuf::from(
                self.config.string_or(keys::SCREENSHOT_DIR, "data/screenshots"),
            ),
            ..Default::default()
        };
        let outcome = adapter.crawl(query_text, page.as_ref(), &opts).await;

        if outcome.success {
            match page.storage_state().await {
                Ok(state) => {
                    if let Err(err) = self.sessions.save(engine, DEFAULT_ACCOUNT, state).await {
                        warn!(%engine, %err, "failed to persist session");
                    }
                }
                Err(err) => warn!(%engine, %err, "failed to capture session"),
            }
        }
        if let Err(err) = page.close().await {
            warn!(%engine, %err, "failed to close browser context");
        }
        Ok(outcome)
    }

    async fn persist_result(
        &self,
        task: &CrawlTask,
        query_id: QueryId,
        project: &Project,
        mut outcome: CrawlOutcome,
    ) -> Result<()> {
        for citation in &mut outcome.citations {
            citation.resolve_target(&project.target_domains);
        }
        let result = CrawlResult {
            id: ResultId::new(),
            task_id: task.id,
            query_id,
            engine: task.engine,
            query_text: outcome.query_text,
            response_text: outcome.response_text,
            has_citations: !outcome.citations.is_empty(),
            citations: outcome.citations,
            raw_html: outcome.raw_html,
            screenshot_path: outcome.screenshot_path,
            response_time_ms: outcome.response_time_ms,
            error: outcome.error,
            is_complete: outcome.success,
            crawled_at: outcome.crawled_at,
        };
        self.store.insert_result(result).await
    }

    async fn notify_completion(&self, project: &Project, task: &CrawlTask) {
        let recipients = self
            .store
            .workspace_recipients(project.workspace_id)
            .await
            .unwrap_or_default();
        for user_id in recipients {
            self.notifier.emit(
                NotificationIntent::new(
                    IntentKind::CheckupCompleted,
                    user_id,
                    format!("Checkup finished for {}", project.name),
                    format!(
                        "{} of {} queries succeeded on {}.",
                        task.successful, task.total, task.engine
                    ),
                )
                .with_metadata(serde_json::json!({
                    "task_id": task.id.to_string(),
                    "engine": task.engine.as_str(),
                })),
            );
        }
    }
}
