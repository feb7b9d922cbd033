//! Core types for GeoWatch: the crawl-and-score pipeline that measures how a
//! brand shows up in generative-AI answers.
//!
//! This crate holds the shared vocabulary — entity records, the engine set,
//! the error taxonomy, configuration, adapter outcomes, and notification
//! intents. Behavior lives in the sibling crates.

pub mod config;
pub mod entity;
pub mod error;
pub mod notify;
pub mod outcome;
pub mod types;

pub use config::ConfigProvider;
pub use entity::{
    AnalyticsEvent, Citation, CrawlResult, CrawlTask, Credential, DriftEvent, Project,
    ProjectStatus, QueryItem, Run, Subscription, host_matches_any,
};
pub use error::{GeoError, Result};
pub use notify::{IntentKind, NotificationIntent, Notifier};
pub use outcome::CrawlOutcome;
pub use types::{
    CredentialId, CredentialKind, CredentialScope, DriftEventId, DriftSeverity, Engine, EventId,
    ProjectId, QueryId, QueryRisk, QueryRole, QueryStage, ResultId, RunId, RunStatus,
    SubscriptionId, TaskId, TaskStatus, UserId, WorkspaceId,
};
