//! Plain entity records persisted by the store.
//!
//! Relationships are expressed as foreign-key identifiers, never as nested
//! object graphs, so the scorer and drift detector can operate on owned
//! values loaded by small query functions.

use crate::types::{
    CredentialId, CredentialKind, CredentialScope, DriftEventId, DriftSeverity, Engine, EventId,
    ProjectId, QueryId, QueryRisk, QueryRole, QueryStage, ResultId, RunId, RunStatus,
    SubscriptionId, TaskId, TaskStatus, WorkspaceId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Active,
    Archived,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub workspace_id: WorkspaceId,
    pub name: String,
    /// Hosts the project is monitoring, stored lowercase.
    pub target_domains: BTreeSet<String>,
    pub status: ProjectStatus,
    pub default_engine: Engine,
    /// Per-project override of the auto-checkup interval, in days.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkup_interval_days: Option<u32>,
    pub created_at: DateTime<Utc>,
}

impl Project {
    pub fn new(workspace_id: WorkspaceId, name: impl Into<String>) -> Self {
        Self {
            id: ProjectId::new(),
            workspace_id,
            name: name.into(),
            target_domains: BTreeSet::new(),
            status: ProjectStatus::Active,
            default_engine: Engine::DeepSeek,
            checkup_interval_days: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_target_domains<I, S>(mut self, domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.target_domains = domains
            .into_iter()
            .map(|d| d.into().to_ascii_lowercase())
            .collect();
        self
    }

    /// Whether `host` matches one of the target domains, exactly or as a
    /// subdomain (`blog.example.com` matches `example.com`,
    /// `counterexample.com` does not). Case-insensitive.
    pub fn matches_target(&self, host: &str) -> bool {
        host_matches_any(host, &self.target_domains)
    }
}

pub fn host_matches_any<'a, I>(host: &str, targets: I) -> bool
where
    I: IntoIterator<Item = &'a String>,
{
    let host = host.to_ascii_lowercase();
    targets.into_iter().any(|t| {
        let t = t.to_ascii_lowercase();
        host == t || host.ends_with(&format!(".{t}"))
    })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryItem {
    pub id: QueryId,
    pub project_id: ProjectId,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<QueryStage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk: Option<QueryRisk>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<QueryRole>,
    pub position: u32,
}

impl QueryItem {
    pub fn new(project_id: ProjectId, text: impl Into<String>, position: u32) -> Self {
        Self {
            id: QueryId::new(),
            project_id,
            text: text.into(),
            query_type: None,
            stage: None,
            risk: None,
            role: None,
            position,
        }
    }

    /// A query materialized from a raw string attached to a crawl task.
    pub fn informational(project_id: ProjectId, text: impl Into<String>, position: u32) -> Self {
        Self {
            query_type: Some("informational".to_string()),
            ..Self::new(project_id, text, position)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: RunId,
    pub project_id: ProjectId,
    /// Monotonic per project; `(project_id, run_number)` is unique.
    pub run_number: u32,
    pub status: RunStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Denormalized from `summary_metrics` for fast listing, 0–100.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health_score: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary_metrics: Option<serde_json::Value>,
}

impl Run {
    pub fn new(project_id: ProjectId, run_number: u32) -> Self {
        Self {
            id: RunId::new(),
            project_id,
            run_number,
            status: RunStatus::Pending,
            started_at: None,
            completed_at: None,
            health_score: None,
            summary_metrics: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlTask {
    pub id: TaskId,
    pub project_id: ProjectId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<RunId>,
    pub engine: Engine,
    pub status: TaskStatus,
    /// Ordered; results are produced and persisted in this order.
    pub query_ids: Vec<QueryId>,
    pub total: u32,
    pub successful: u32,
    pub failed: u32,
    pub enable_web_search: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    pub use_proxy: bool,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl CrawlTask {
    pub fn new(project_id: ProjectId, engine: Engine, query_ids: Vec<QueryId>) -> Self {
        let total = query_ids.len() as u32;
        Self {
            id: TaskId::new(),
            project_id,
            run_id: None,
            engine,
            status: TaskStatus::Pending,
            query_ids,
            total,
            successful: 0,
            failed: 0,
            enable_web_search: true,
            region: None,
            language: None,
            use_proxy: true,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }
}

/// One cited source inside an engine answer.
///
/// Order within a result is the order the engine presented the links;
/// `position` is the 0-based insertion index. Deduplication is by URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub position: u32,
    pub url: String,
    pub host: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub is_target_domain: bool,
}

impl Citation {
    pub fn new(position: u32, url: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            position,
            url: url.into(),
            host: host.into(),
            title: None,
            is_target_domain: false,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Recompute the target flag against a project's domain set.
    pub fn resolve_target<'a, I>(&mut self, targets: I)
    where
        I: IntoIterator<Item = &'a String>,
    {
        self.is_target_domain = host_matches_any(&self.host, targets);
    }
}

/// Immutable evidence row: one query attempt against one engine.
/// Failures are persisted too; failure is a legitimate evidence type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlResult {
    pub id: ResultId,
    pub task_id: TaskId,
    pub query_id: QueryId,
    pub engine: Engine,
    pub query_text: String,
    pub response_text: String,
    pub citations: Vec<Citation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_html: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshot_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub is_complete: bool,
    pub has_citations: bool,
    pub crawled_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftEvent {
    pub id: DriftEventId,
    pub project_id: ProjectId,
    pub baseline_run_id: RunId,
    pub compare_run_id: RunId,
    pub metric_name: String,
    pub baseline_value: f64,
    pub current_value: f64,
    pub change_percent: f64,
    /// `position_drop` for the position metric, `visibility_loss` otherwise.
    pub drift_type: String,
    pub severity: DriftSeverity,
    pub detected_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acknowledged_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    pub id: CredentialId,
    pub scope: CredentialScope,
    pub engine: Engine,
    pub kind: CredentialKind,
    pub account: String,
    /// Base64-encoded ciphertext. Cleartext is never persisted or logged.
    pub encrypted_value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub is_active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Credential {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub workspace_id: WorkspaceId,
    pub plan_code: String,
    pub is_active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    pub runs_this_month: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_reset_at: Option<DateTime<Utc>>,
}

/// Append-only analytics row; swept by the weekly cleanup job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsEvent {
    pub id: EventId,
    pub workspace_id: WorkspaceId,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}
