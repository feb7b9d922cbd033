//! Executor lifecycle tests over the in-memory store and scripted pages.

use async_trait::async_trait;
use geowatch_api::{ApiAnswer, ApiEngine};
use geowatch_browser::testing::ScriptedPage;
use geowatch_browser::{LinkInfo, Page};
use geowatch_core::config::keys;
use geowatch_core::{
    Citation, ConfigProvider, CredentialKind, CredentialScope, Engine, GeoError, IntentKind,
    Notifier, Project, QueryItem, Result, TaskStatus, UserId, WorkspaceId,
};
use geowatch_executor::{CrawlExecutor, CreateTaskRequest, PageProvider, TaskService};
use geowatch_session::{DEFAULT_ACCOUNT, SessionStore};
use geowatch_store::{ExportFormat, MemoryStore, Store};
use geowatch_vault::{CredentialVault, StoreOptions};
use serde_json::json;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Hands out pre-scripted pages in order; panics when the browser path is
/// used more than scripted.
struct ScriptedProvider {
    pages: Mutex<VecDeque<ScriptedPage>>,
}

impl ScriptedProvider {
    fn new(pages: Vec<ScriptedPage>) -> Arc<Self> {
        Arc::new(Self {
            pages: Mutex::new(pages.into()),
        })
    }
}

#[async_trait]
impl PageProvider for ScriptedProvider {
    async fn open(&self, _engine: Engine) -> Result<Box<dyn Page>> {
        let page = self
            .pages
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| GeoError::Internal("no scripted page left".into()))?;
        Ok(Box::new(page))
    }
}

struct NoBrowser;

#[async_trait]
impl PageProvider for NoBrowser {
    async fn open(&self, engine: Engine) -> Result<Box<dyn Page>> {
        panic!("browser transport must not be used for {engine}");
    }
}

struct FakeApi {
    engine: Engine,
}

#[async_trait]
impl ApiEngine for FakeApi {
    fn engine(&self) -> Engine {
        self.engine
    }

    async fn query(&self, question: &str, _enable_web_search: bool) -> Result<ApiAnswer> {
        Ok(ApiAnswer {
            response_text: format!("api answer for {question}"),
            citations: vec![
                Citation::new(0, "https://blog.example.com/a", "blog.example.com")
                    .with_title("blog.example.com"),
                Citation::new(1, "https://rival.net/b", "rival.net").with_title("rival.net"),
            ],
            model: "fake-model".into(),
            response_time_ms: 42,
            tokens_used: 100,
        })
    }
}

struct Fixture {
    store: Arc<MemoryStore>,
    vault: Arc<CredentialVault>,
    sessions: Arc<SessionStore>,
    config: ConfigProvider,
    project: Project,
    _dirs: Vec<tempfile::TempDir>,
}

async fn fixture() -> Fixture {
    let store = Arc::new(MemoryStore::new());
    let vault = Arc::new(CredentialVault::new("executor-tests"));
    let session_dir = tempfile::tempdir().unwrap();
    let shot_dir = tempfile::tempdir().unwrap();
    let sessions = Arc::new(SessionStore::new(session_dir.path()));
    let config = ConfigProvider::default();
    config.set(keys::SCREENSHOT_DIR, json!(shot_dir.path().display().to_string()));
    config.set(keys::RATE_LIMIT_PER_SEC, json!(100.0));

    let project = Project::new(WorkspaceId::new(), "acme").with_target_domains(["example.com"]);
    store.insert_project(project.clone()).await.unwrap();

    Fixture {
        store,
        vault,
        sessions,
        config,
        project,
        _dirs: vec![session_dir, shot_dir],
    }
}

async fn seed_queries(fixture: &Fixture, texts: &[&str]) -> Vec<geowatch_core::QueryId> {
    let mut ids = Vec::new();
    for (position, text) in texts.iter().enumerate() {
        let item = QueryItem::new(fixture.project.id, *text, position as u32);
        ids.push(item.id);
        fixture.store.insert_query_item(item).await.unwrap();
    }
    ids
}

fn kimi_page(answer: &str, links: Vec<LinkInfo>) -> ScriptedPage {
    ScriptedPage::new()
        .with_url("https://kimi.moonshot.cn")
        .with_body("Kimi 对话")
        .with_visible(["textarea"])
        .with_texts("[class*=\"markdown\"]", vec![answer.to_string()])
        .with_links("[class*=\"source\"] a", links)
        .with_storage(json!({"cookies": [{"name": "sess", "value": "tok"}]}))
}

fn answer_text() -> String {
    "这是一段足够长的回答，覆盖了问题的全部方面并给出了结论。".repeat(3)
}

#[tokio::test(start_paused = true)]
async fn browser_task_completes_with_ordered_target_resolved_results() {
    let fixture = fixture().await;
    fixture.config.set(keys::API_MODE_ENABLED, json!(false));
    let query_ids = seed_queries(&fixture, &["第一问", "第二问"]).await;

    let provider = ScriptedProvider::new(vec![
        kimi_page(
            &answer_text(),
            vec![LinkInfo {
                href: "https://docs.example.com/guide".into(),
                text: "目标站点指南".into(),
                ..Default::default()
            }],
        ),
        kimi_page(
            &answer_text(),
            vec![LinkInfo {
                href: "https://rival.net/review".into(),
                text: "竞品评测文章".into(),
                ..Default::default()
            }],
        ),
    ]);

    let (notifier, mut rx) = Notifier::channel();
    fixture
        .store
        .add_workspace_recipient(fixture.project.workspace_id, UserId::new())
        .await
        .unwrap();

    let executor = CrawlExecutor::new(
        fixture.store.clone(),
        fixture.vault.clone(),
        fixture.sessions.clone(),
        provider,
        fixture.config.clone(),
        notifier,
    );

    let mut task = geowatch_core::CrawlTask::new(fixture.project.id, Engine::Kimi, query_ids);
    let task_id = task.id;
    task.enable_web_search = false;
    fixture.store.insert_task(task).await.unwrap();

    let summary = executor.execute_task(task_id).await.unwrap();
    assert_eq!(summary.status, TaskStatus::Completed);
    assert_eq!(summary.successful, 2);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.successful + summary.failed, summary.total);

    let results = fixture.store.results_for_task(task_id).await.unwrap();
    assert_eq!(results.len(), 2);
    // Order follows the task's query list.
    assert_eq!(results[0].query_text, "第一问");
    assert_eq!(results[1].query_text, "第二问");
    // Engine invariant and target-domain resolution.
    for result in &results {
        assert_eq!(result.engine, Engine::Kimi);
    }
    assert!(results[0].citations[0].is_target_domain);
    assert!(!results[1].citations[0].is_target_domain);

    // A successful browser crawl persists the session for the next run.
    assert!(
        fixture
            .sessions
            .load(Engine::Kimi, DEFAULT_ACCOUNT)
            .await
            .is_some()
    );

    // Completion fans out a checkup intent.
    let intent = rx.recv().await.unwrap();
    assert_eq!(intent.kind, IntentKind::CheckupCompleted);
}

#[tokio::test(start_paused = true)]
async fn failed_queries_persist_rows_and_counters() {
    let fixture = fixture().await;
    fixture.config.set(keys::API_MODE_ENABLED, json!(false));
    let query_ids = seed_queries(&fixture, &["好问题", "坏问题"]).await;

    // Second page has no input field and no login banner: protocol failure.
    let provider = ScriptedProvider::new(vec![
        kimi_page(&answer_text(), vec![]),
        ScriptedPage::new()
            .with_url("https://kimi.moonshot.cn")
            .with_body("空白页面"),
    ]);

    let executor = CrawlExecutor::new(
        fixture.store.clone(),
        fixture.vault.clone(),
        fixture.sessions.clone(),
        provider,
        fixture.config.clone(),
        Notifier::disconnected(),
    );

    let task = geowatch_core::CrawlTask::new(fixture.project.id, Engine::Kimi, query_ids);
    let task_id = task.id;
    fixture.store.insert_task(task).await.unwrap();

    let summary = executor.execute_task(task_id).await.unwrap();
    assert_eq!(summary.status, TaskStatus::Completed);
    assert_eq!(summary.successful, 1);
    assert_eq!(summary.failed, 1);

    let results = fixture.store.results_for_task(task_id).await.unwrap();
    assert_eq!(results.len(), 2);
    assert!(results[0].is_complete);
    assert!(!results[1].is_complete);
    assert!(results[1].error.is_some());
}

#[tokio::test(start_paused = true)]
async fn api_transport_is_preferred_when_key_exists() {
    let fixture = fixture().await;
    let query_ids = seed_queries(&fixture, &["api 问题"]).await;

    fixture
        .vault
        .store(
            CredentialScope::Workspace(fixture.project.workspace_id),
            Engine::DeepSeek,
            CredentialKind::ApiKey,
            &json!("sk-test"),
            StoreOptions::default(),
        )
        .unwrap();

    let executor = CrawlExecutor::new(
        fixture.store.clone(),
        fixture.vault.clone(),
        fixture.sessions.clone(),
        Arc::new(NoBrowser),
        fixture.config.clone(),
        Notifier::disconnected(),
    )
    .with_api_factory(Arc::new(|engine, _key| {
        Some(Box::new(FakeApi { engine }) as Box<dyn ApiEngine>)
    }));

    let task = geowatch_core::CrawlTask::new(fixture.project.id, Engine::DeepSeek, query_ids);
    let task_id = task.id;
    fixture.store.insert_task(task).await.unwrap();

    let summary = executor.execute_task(task_id).await.unwrap();
    assert_eq!(summary.status, TaskStatus::Completed);
    assert_eq!(summary.successful, 1);

    let results = fixture.store.results_for_task(task_id).await.unwrap();
    assert!(results[0].citations[0].is_target_domain);
    assert!(!results[0].citations[1].is_target_domain);

    // The credential is marked as used.
    let info = fixture
        .vault
        .list_for_workspace(fixture.project.workspace_id, true);
    assert!(info[0].last_used_at.is_some());
}

#[tokio::test(start_paused = true)]
async fn cancel_is_observed_at_the_query_boundary() {
    let fixture = fixture().await;
    fixture.config.set(keys::API_MODE_ENABLED, json!(false));
    let query_ids = seed_queries(&fixture, &["q1", "q2"]).await;

    let provider = ScriptedProvider::new(vec![]);
    let executor = CrawlExecutor::new(
        fixture.store.clone(),
        fixture.vault.clone(),
        fixture.sessions.clone(),
        provider,
        fixture.config.clone(),
        Notifier::disconnected(),
    );

    let task = geowatch_core::CrawlTask::new(fixture.project.id, Engine::Kimi, query_ids);
    let task_id = task.id;
    fixture.store.insert_task(task).await.unwrap();

    executor.cancels().request(task_id);
    let summary = executor.execute_task(task_id).await.unwrap();
    assert_eq!(summary.status, TaskStatus::Cancelled);
    assert_eq!(summary.successful, 0);
    assert_eq!(summary.failed, 0);
    assert!(
        fixture
            .store
            .results_for_task(task_id)
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn task_with_no_resolvable_queries_fails_fast() {
    let fixture = fixture().await;
    let executor = CrawlExecutor::new(
        fixture.store.clone(),
        fixture.vault.clone(),
        fixture.sessions.clone(),
        ScriptedProvider::new(vec![]),
        fixture.config.clone(),
        Notifier::disconnected(),
    );

    let task = geowatch_core::CrawlTask::new(
        fixture.project.id,
        Engine::Qwen,
        vec![geowatch_core::QueryId::new()],
    );
    let task_id = task.id;
    fixture.store.insert_task(task).await.unwrap();

    let err = executor.execute_task(task_id).await.unwrap_err();
    assert!(matches!(err, GeoError::BadRequest(_)));
    assert_eq!(
        fixture.store.task(task_id).await.unwrap().status,
        TaskStatus::Failed
    );
}

#[tokio::test]
async fn task_service_creates_cancels_retries_and_exports() {
    let fixture = fixture().await;
    let service = TaskService::new(fixture.store.clone(), Default::default());

    // Raw queries materialize as informational query items.
    let mut request = CreateTaskRequest::new(fixture.project.id, Engine::DeepSeek);
    request.raw_queries = vec!["  推荐理财产品 ".into(), "".into()];
    let task_id = service.create_task(request).await.unwrap();

    let view = service.get(task_id).await.unwrap();
    assert_eq!(view.status, TaskStatus::Pending);
    assert_eq!(view.total, 1);
    let items = fixture
        .store
        .query_items_for_project(fixture.project.id)
        .await
        .unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].text, "推荐理财产品");
    assert_eq!(items[0].query_type.as_deref(), Some("informational"));

    // Pending cancel flips immediately.
    service.cancel(task_id).await.unwrap();
    assert_eq!(
        service.get(task_id).await.unwrap().status,
        TaskStatus::Cancelled
    );

    // Terminal tasks can be retried back to pending.
    service.retry(task_id).await.unwrap();
    assert_eq!(
        service.get(task_id).await.unwrap().status,
        TaskStatus::Pending
    );

    // Empty request is a contract violation.
    let err = service
        .create_task(CreateTaskRequest::new(fixture.project.id, Engine::Kimi))
        .await
        .unwrap_err();
    assert!(matches!(err, GeoError::BadRequest(_)));

    // Export renders the (empty) result set.
    let json_export = service.export(task_id, ExportFormat::Json).await.unwrap();
    assert_eq!(json_export.trim(), "[]");
}
