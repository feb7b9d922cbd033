//! GeoWatch monitors how a brand appears in answers produced by
//! generative-AI assistants. For each project it submits curated queries to
//! several AI engines (vendor APIs when a key is enrolled, stealth browser
//! automation otherwise), persists answer text and URL citations, derives
//! visibility metrics for the project's target domains, and detects drift
//! between scoring runs.
//!
//! This crate is the facade: it re-exports the public surface of the member
//! crates. Start with [`executor::TaskService`] for the task operations,
//! [`score::score_run`] and [`score::detect_project_drift`] for scoring, and
//! [`scheduler::Scheduler`] for the periodic jobs.

pub use geowatch_api as api;
pub use geowatch_browser as browser;
pub use geowatch_challenge as challenge;
pub use geowatch_core as core;
pub use geowatch_engine as engine;
pub use geowatch_executor as executor;
pub use geowatch_score as score;
pub use geowatch_scheduler as scheduler;
pub use geowatch_session as session;
pub use geowatch_store as store;
pub use geowatch_telemetry as telemetry;
pub use geowatch_vault as vault;

pub use geowatch_core::{
    Citation, ConfigProvider, CrawlOutcome, CrawlResult, CrawlTask, Credential, DriftEvent,
    Engine, GeoError, NotificationIntent, Notifier, Project, QueryItem, Result, Run,
};
