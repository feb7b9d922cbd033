use crate::entity::Citation;
use crate::types::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What an adapter (browser or API) hands back for one query attempt.
///
/// Adapters never raise across this boundary: protocol trouble becomes
/// `success = false` plus a short human-readable `error`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlOutcome {
    pub success: bool,
    pub engine: Engine,
    pub query_text: String,
    pub response_text: String,
    pub citations: Vec<Citation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_html: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshot_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub requires_login: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub web_search_enabled: Option<bool>,
    /// Conversation turns consumed, including clarification follow-ups.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turns: Option<u32>,
    pub crawled_at: DateTime<Utc>,
}

impl CrawlOutcome {
    pub fn failure(engine: Engine, query_text: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            engine,
            query_text: query_text.into(),
            response_text: String::new(),
            citations: Vec::new(),
            response_time_ms: None,
            raw_html: None,
            screenshot_path: None,
            error: Some(error.into()),
            requires_login: false,
            web_search_enabled: None,
            turns: None,
            crawled_at: Utc::now(),
        }
    }

    pub fn login_required(engine: Engine, query_text: impl Into<String>) -> Self {
        Self {
            requires_login: true,
            ..Self::failure(engine, query_text, "login required, enrol a session credential")
        }
    }

    pub fn with_screenshot(mut self, path: Option<String>) -> Self {
        self.screenshot_path = path;
        self
    }
}
