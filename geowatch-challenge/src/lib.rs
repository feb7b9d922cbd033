//! Anti-bot challenge handling for live crawl pages.
//!
//! Detection identifies which wall is up (Cloudflare, reCAPTCHA, hCaptcha,
//! login, rate limit, block); resolution picks a strategy and drives it to a
//! verdict. Nothing in this crate raises across the boundary — callers get a
//! [`Resolution`] either way.

mod detect;
mod strategy;

pub use detect::{ChallengeDetector, ChallengeKind};
pub use strategy::{ApiSolverStrategy, AutoWaitStrategy, ManualStrategy, Resolution};

use geowatch_browser::Page;
use geowatch_core::ConfigProvider;
use geowatch_core::config::keys;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategySelection {
    Manual,
    AutoWait,
    Api,
    /// Pick per challenge kind: auto-wait for Cloudflare (manual fallback for
    /// Turnstile), solver API for reCAPTCHA/hCaptcha when a key exists,
    /// manual for everything else.
    Smart,
}

impl StrategySelection {
    fn parse(s: &str) -> Self {
        match s {
            "manual" => StrategySelection::Manual,
            "auto_wait" => StrategySelection::AutoWait,
            "api" => StrategySelection::Api,
            _ => StrategySelection::Smart,
        }
    }
}

pub struct ChallengeHandler {
    selection: StrategySelection,
    manual_timeout: Duration,
    solver_api_key: Option<String>,
    solver_base_url: Option<String>,
    screenshot_dir: PathBuf,
    detector: ChallengeDetector,
}

impl ChallengeHandler {
    pub fn new(config: &ConfigProvider) -> Self {
        Self {
            selection: StrategySelection::parse(
                &config.string_or(keys::CAPTCHA_STRATEGY, "smart"),
            ),
            manual_timeout: Duration::from_secs(
                config.u64_or(keys::CAPTCHA_MANUAL_TIMEOUT_SECONDS, 300),
            ),
            solver_api_key: config.string(keys::CAPTCHA_API_KEY),
            solver_base_url: None,
            screenshot_dir: PathBuf::from(
                config.string_or(keys::SCREENSHOT_DIR, "data/screenshots"),
            ),
            detector: ChallengeDetector::new(),
        }
    }

    pub fn with_solver_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.solver_base_url = Some(base_url.into());
        self
    }

    pub async fn detect(&self, page: &dyn Page) -> ChallengeKind {
        self.detector.detect(page).await
    }

    /// Detect and, when needed, resolve whatever is blocking the page.
    pub async fn resolve(&self, page: &dyn Page) -> Resolution {
        let kind = self.detect(page).await;
        if kind == ChallengeKind::None {
            return Resolution {
                success: true,
                kind,
                message: "no challenge detected".to_string(),
                screenshot_path: None,
                elapsed_ms: 0,
            };
        }

        info!(%kind, "challenge detected");
        match self.selection {
            StrategySelection::Manual => self.manual().resolve(page, kind, &self.screenshot_dir).await,
            StrategySelection::AutoWait => {
                AutoWaitStrategy::default()
                    .resolve(page, kind, &self.screenshot_dir)
                    .await
            }
            StrategySelection::Api => self.solver().resolve(page, kind, &self.screenshot_dir).await,
            StrategySelection::Smart => self.resolve_smart(page, kind).await,
        }
    }

    async fn resolve_smart(&self, page: &dyn Page, kind: ChallengeKind) -> Resolution {
        match kind {
            ChallengeKind::CloudflareJs => {
                AutoWaitStrategy::default()
                    .resolve(page, kind, &self.screenshot_dir)
                    .await
            }
            ChallengeKind::CloudflareCaptcha => {
                // Turnstile sometimes passes without interaction; try the
                // cheap wait before asking a human.
                let attempt = AutoWaitStrategy::default()
                    .resolve(page, kind, &self.screenshot_dir)
                    .await;
                if attempt.success {
                    return attempt;
                }
                self.manual().resolve(page, kind, &self.screenshot_dir).await
            }
            ChallengeKind::RecaptchaV2 | ChallengeKind::RecaptchaV3 | ChallengeKind::Hcaptcha => {
                if self.solver_api_key.is_some() {
                    self.solver().resolve(page, kind, &self.screenshot_dir).await
                } else {
                    self.manual().resolve(page, kind, &self.screenshot_dir).await
                }
            }
            _ => self.manual().resolve(page, kind, &self.screenshot_dir).await,
        }
    }

    fn manual(&self) -> ManualStrategy {
        ManualStrategy {
            timeout: self.manual_timeout,
        }
    }

    fn solver(&self) -> ApiSolverStrategy {
        let mut solver =
            ApiSolverStrategy::new(self.solver_api_key.clone().unwrap_or_default());
        if let Some(base_url) = &self.solver_base_url {
            solver = solver.with_base_url(base_url.clone());
        }
        solver
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geowatch_browser::testing::ScriptedPage;
    use serde_json::json;

    fn test_config() -> ConfigProvider {
        let config = ConfigProvider::default();
        let dir = std::env::temp_dir().join("geowatch-challenge-handler-tests");
        config.set(
            geowatch_core::config::keys::SCREENSHOT_DIR,
            json!(dir.display().to_string()),
        );
        config
    }

    fn handler() -> ChallengeHandler {
        ChallengeHandler::new(&test_config())
    }

    #[tokio::test]
    async fn clean_page_resolves_immediately() {
        let page = ScriptedPage::new()
            .with_url("https://chat.deepseek.com")
            .with_body("开始对话");
        let resolution = handler().resolve(&page).await;
        assert!(resolution.success);
        assert_eq!(resolution.kind, ChallengeKind::None);
    }

    #[tokio::test(start_paused = true)]
    async fn smart_uses_auto_wait_for_cloudflare_js() {
        let page = ScriptedPage::new()
            .with_url("https://www.perplexity.ai")
            .with_body_sequence(["Just a moment...", "Just a moment...", "Ask anything"]);
        let resolution = handler().resolve(&page).await;
        assert!(resolution.success, "{}", resolution.message);
        assert_eq!(resolution.kind, ChallengeKind::CloudflareJs);
    }

    #[tokio::test(start_paused = true)]
    async fn smart_falls_back_to_manual_for_stuck_turnstile() {
        use std::sync::Arc;
        use std::time::Duration;

        // Turnstile never clears during the auto-wait budget; a human solves
        // it later, during the manual phase.
        let page = Arc::new(
            ScriptedPage::new()
                .with_url("https://www.perplexity.ai")
                .with_body("Verifying you are human")
                .with_visible([".cf-turnstile"]),
        );
        let solved = page.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(40)).await;
            solved.set_body("Ask anything");
            solved.set_visible(".cf-turnstile", false);
        });

        let resolution = handler().resolve(page.as_ref()).await;
        assert!(resolution.success, "{}", resolution.message);
        assert_eq!(resolution.kind, ChallengeKind::CloudflareCaptcha);
        assert!(resolution.message.contains("manually"));
    }

    #[tokio::test]
    async fn explicit_api_strategy_fails_without_key() {
        let config = ConfigProvider::default();
        config.set(geowatch_core::config::keys::CAPTCHA_STRATEGY, json!("api"));
        let page = ScriptedPage::new()
            .with_url("https://chatgpt.com")
            .with_body("complete the captcha")
            .with_visible([".g-recaptcha"]);
        let resolution = ChallengeHandler::new(&config).resolve(&page).await;
        assert!(!resolution.success);
    }
}
