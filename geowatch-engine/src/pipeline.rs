//! The shared browser crawl pipeline.
//!
//! Every engine runs the same sequence — navigate, clear challenges, check
//! login, flip the web-search toggle, type, submit, wait for completion,
//! clarify if asked, extract — parameterized by its [`EngineProfile`].

use crate::completion::{DEFAULT_MAX_WAIT, WEB_SEARCH_MAX_WAIT, wait_for_completion};
use crate::extract::{extract_body_fallback, extract_citations};
use crate::profile::{
    CLARIFICATION_PATTERNS, EngineProfile, FOLLOWUP_MESSAGE, TOGGLE_STATE_ATTRS, profile,
};
use geowatch_browser::{Page, human};
use geowatch_core::{CrawlOutcome, Engine};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct CrawlOptions {
    pub enable_web_search: bool,
    /// Conversation turns budget, clarification follow-ups included.
    pub max_turns: u32,
    pub max_wait: Option<Duration>,
    pub take_screenshot: bool,
    pub screenshot_dir: PathBuf,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self {
            enable_web_search: true,
            max_turns: 2,
            max_wait: None,
            take_screenshot: true,
            screenshot_dir: PathBuf::from("data/screenshots"),
        }
    }
}

/// `<engine>_<sanitized_query_prefix>_<yyyyMMdd_HHmmss>.png`
pub fn screenshot_path(dir: &Path, engine: Engine, query: &str) -> PathBuf {
    let safe: String = query
        .chars()
        .take(30)
        .filter(|c| c.is_alphanumeric() || *c == ' ' || *c == '-' || *c == '_')
        .collect();
    let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S");
    dir.join(format!("{}_{}_{}.png", engine.as_str(), safe.trim(), timestamp))
}

async fn take_screenshot(
    page: &dyn Page,
    dir: &Path,
    engine: Engine,
    query: &str,
) -> Option<String> {
    if std::fs::create_dir_all(dir).is_err() {
        return None;
    }
    let path = screenshot_path(dir, engine, query);
    match page.screenshot(&path).await {
        Ok(()) => Some(path.display().to_string()),
        Err(err) => {
            warn!(%err, "screenshot failed");
            None
        }
    }
}

fn needs_clarification(text: &str) -> bool {
    if text.chars().count() >= 1000 {
        return false;
    }
    let lower = text.to_lowercase();
    CLARIFICATION_PATTERNS
        .iter()
        .any(|p| lower.contains(&p.to_lowercase()))
}

pub struct BrowserAdapter<'a> {
    profile: &'static EngineProfile,
    challenges: &'a geowatch_challenge::ChallengeHandler,
}

impl<'a> BrowserAdapter<'a> {
    pub fn new(engine: Engine, challenges: &'a geowatch_challenge::ChallengeHandler) -> Self {
        Self {
            profile: profile(engine),
            challenges,
        }
    }

    pub fn engine(&self) -> Engine {
        self.profile.engine
    }

    /// Drive one query to completion on a live page. Never errors across the
    /// boundary — trouble comes back as an unsuccessful [`CrawlOutcome`].
    pub async fn crawl(&self, query: &str, page: &dyn Page, opts: &CrawlOptions) -> CrawlOutcome {
        let engine = self.profile.engine;
        let started = std::time::Instant::now();

        let url = if self.profile.query_in_url {
            format!("{}{}", self.profile.chat_url, urlencode(query))
        } else {
            self.profile.chat_url.to_string()
        };
        info!(%engine, %url, "navigating");
        if let Err(err) = page.goto(&url).await {
            return CrawlOutcome::failure(engine, query, format!("navigation failed: {err}"));
        }
        human::random_delay(2000, 4000).await;

        let resolution = self.challenges.resolve(page).await;
        if !resolution.success {
            warn!(%engine, kind = %resolution.kind, "challenge unresolved");
            let mut outcome = CrawlOutcome::failure(
                engine,
                query,
                format!("challenge failed: {}", resolution.message),
            );
            outcome.screenshot_path = resolution.screenshot_path;
            return outcome;
        }

        if self.profile.query_in_url {
            return self.finish(query, page, opts, started, None, 1).await;
        }

        // Read the page like a human before touching the input.
        let _ = human::wander_cursor(page).await;
        let _ = human::natural_scroll(page).await;

        // Locate the input before deciding anything about login: several
        // engines show a login banner while still serving an input box.
        let input_selector = self.find_input(page).await;
        let Some(input_selector) = input_selector else {
            let body = page.body_text().await.unwrap_or_default();
            let login_hinted = self
                .profile
                .login_keywords
                .iter()
                .any(|kw| body.contains(kw));
            let shot =
                take_screenshot(page, &opts.screenshot_dir, engine, query).await;
            if login_hinted {
                info!(%engine, "login wall with no input field");
                return CrawlOutcome::login_required(engine, query).with_screenshot(shot);
            }
            return CrawlOutcome::failure(
                engine,
                query,
                "no input field found; page layout may have changed",
            )
            .with_screenshot(shot);
        };

        let web_search_enabled = if opts.enable_web_search
            && !self.profile.web_search_toggles.is_empty()
        {
            Some(self.enable_web_search(page).await)
        } else {
            None
        };

        let text_to_type = match self.profile.query_preamble {
            Some(preamble) => format!("{preamble}{query}"),
            None => query.to_string(),
        };
        match human::type_text(page, &input_selector, &text_to_type).await {
            Ok(true) => {}
            Ok(false) => {
                return CrawlOutcome::failure(engine, query, "input field disappeared mid-typing");
            }
            Err(err) => {
                return CrawlOutcome::failure(engine, query, format!("typing failed: {err}"));
            }
        }
        human::random_delay(500, 1000).await;

        if let Err(err) = self.submit(page).await {
            return CrawlOutcome::failure(engine, query, format!("submit failed: {err}"));
        }
        human::random_delay(3000, 5000).await;

        self.finish(query, page, opts, started, web_search_enabled, opts.max_turns.max(1))
            .await
    }

    async fn finish(
        &self,
        query: &str,
        page: &dyn Page,
        opts: &CrawlOptions,
        started: std::time::Instant,
        web_search_enabled: Option<bool>,
        max_turns: u32,
    ) -> CrawlOutcome {
        let engine = self.profile.engine;
        let max_wait = opts.max_wait.unwrap_or(
            if web_search_enabled == Some(true) {
                WEB_SEARCH_MAX_WAIT
            } else {
                DEFAULT_MAX_WAIT
            },
        );

        let mut turns = 0u32;
        let mut text = String::new();
        let mut citations = Vec::new();

        while turns < max_turns {
            turns += 1;
            let completion = wait_for_completion(page, self.profile, max_wait).await;
            text = completion.text;
            citations = completion.citations;

            if !self.profile.supports_clarification_loop || !needs_clarification(&text) {
                break;
            }
            if turns >= max_turns {
                info!(%engine, turns, "turn budget exhausted, accepting clarification text");
                break;
            }

            info!(%engine, turn = turns, "engine asked for clarification, sending follow-up");
            if !self.send_followup(page).await {
                break;
            }
            human::random_delay(3000, 5000).await;
        }

        // Selector misses with citations present usually mean hashed class
        // churn; the body scan often still recovers the answer.
        if text.chars().count() < 50 && !citations.is_empty() {
            let recovered = extract_body_fallback(page, self.profile).await;
            if !recovered.is_empty() {
                info!(%engine, len = recovered.chars().count(), "recovered answer from body scan");
                text = recovered;
            }
        }
        if citations.is_empty() {
            citations = extract_citations(page, self.profile).await;
        }

        let screenshot = if opts.take_screenshot {
            take_screenshot(page, &opts.screenshot_dir, engine, query).await
        } else {
            None
        };
        let raw_html = page.page_source().await.ok().map(|html| {
            let mut html = html;
            html.truncate(50_000);
            html
        });

        // Citations alone count as success; they are the scoring signal.
        let success = text.chars().count() > 50 || !citations.is_empty();
        info!(
            %engine,
            success,
            text_len = text.chars().count(),
            citations = citations.len(),
            turns,
            "crawl finished"
        );

        CrawlOutcome {
            success,
            engine,
            query_text: query.to_string(),
            response_text: text,
            citations,
            response_time_ms: Some(started.elapsed().as_millis() as u64),
            raw_html,
            screenshot_path: screenshot,
            error: if success {
                None
            } else {
                Some("no substantial answer or citations extracted".to_string())
            },
            requires_login: false,
            web_search_enabled,
            turns: Some(turns),
            crawled_at: chrono::Utc::now(),
        }
    }

    async fn find_input(&self, page: &dyn Page) -> Option<String> {
        for selector in self.profile.input_selectors {
            if page.exists_visible(selector).await.unwrap_or(false) {
                return Some((*selector).to_string());
            }
        }
        None
    }

    /// Flip the web-search toggle on when present and currently off.
    /// Missing toggle is non-fatal; the crawl continues without it.
    async fn enable_web_search(&self, page: &dyn Page) -> bool {
        for selector in self.profile.web_search_toggles {
            if !page.exists_visible(selector).await.unwrap_or(false) {
                continue;
            }
            let mut enabled = false;
            for attr in TOGGLE_STATE_ATTRS {
                if let Ok(Some(value)) = page.attr(selector, attr).await {
                    if value == "true" || value == "checked" {
                        enabled = true;
                        break;
                    }
                }
            }
            if !enabled {
                if let Ok(Some(class)) = page.attr(selector, "class").await {
                    let class = class.to_lowercase();
                    enabled = class.contains("active")
                        || class.contains("enabled")
                        || class.contains("selected");
                }
            }

            if enabled {
                info!(engine = %self.profile.engine, "web search already enabled");
                return true;
            }
            if page.click(selector).await.unwrap_or(false) {
                info!(engine = %self.profile.engine, selector, "enabled web search");
                human::random_delay(800, 1500).await;
                return true;
            }
        }
        warn!(engine = %self.profile.engine, "web-search toggle not found, continuing without it");
        false
    }

    async fn submit(&self, page: &dyn Page) -> geowatch_core::Result<()> {
        for selector in self.profile.send_selectors {
            if page.click(selector).await.unwrap_or(false) {
                return Ok(());
            }
        }
        page.press_enter().await
    }

    async fn send_followup(&self, page: &dyn Page) -> bool {
        let Some(input_selector) = self.find_input(page).await else {
            warn!(engine = %self.profile.engine, "no input field for follow-up");
            return false;
        };
        if !page.fill(&input_selector, FOLLOWUP_MESSAGE).await.unwrap_or(false) {
            return false;
        }
        human::random_delay(300, 500).await;
        self.submit(page).await.is_ok()
    }
}

fn urlencode(query: &str) -> String {
    let mut out = String::with_capacity(query.len() * 3);
    for byte in query.as_bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(*byte as char);
            }
            b' ' => out.push('+'),
            other => out.push_str(&format!("%{other:02X}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn screenshot_name_is_sanitized() {
        let path = screenshot_path(Path::new("/tmp/shots"), Engine::DeepSeek, "what? laptop/best <2024>");
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("deepseek_"));
        assert!(!name.contains('?'));
        assert!(!name.contains('/'));
        assert!(name.ends_with(".png"));
    }

    #[test]
    fn clarification_requires_short_text() {
        assert!(needs_clarification("请告诉我您的预算范围是多少？"));
        let long = "请告诉我 ".repeat(300);
        assert!(!needs_clarification(&long));
        assert!(!needs_clarification("以下是完整的推荐清单。"));
    }

    #[test]
    fn urlencode_handles_spaces_and_unicode() {
        assert_eq!(urlencode("best laptop"), "best+laptop");
        assert_eq!(urlencode("笔记本"), "%E7%AC%94%E8%AE%B0%E6%9C%AC");
    }
}
