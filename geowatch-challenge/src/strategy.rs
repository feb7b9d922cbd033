//! Resolution strategies.
//!
//! Strategies never raise across the handler boundary: anything that goes
//! wrong becomes `success = false` with a short reason.

use crate::detect::{ChallengeDetector, ChallengeKind};
use geowatch_browser::Page;
use serde_json::Value;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct Resolution {
    pub success: bool,
    pub kind: ChallengeKind,
    pub message: String,
    pub screenshot_path: Option<String>,
    pub elapsed_ms: u64,
}

impl Resolution {
    fn ok(kind: ChallengeKind, message: impl Into<String>, started: Instant) -> Self {
        Self {
            success: true,
            kind,
            message: message.into(),
            screenshot_path: None,
            elapsed_ms: started.elapsed().as_millis() as u64,
        }
    }

    fn failed(kind: ChallengeKind, message: impl Into<String>, started: Instant) -> Self {
        Self {
            success: false,
            kind,
            message: message.into(),
            screenshot_path: None,
            elapsed_ms: started.elapsed().as_millis() as u64,
        }
    }

    fn with_screenshot(mut self, path: Option<String>) -> Self {
        self.screenshot_path = path;
        self
    }
}

pub(crate) async fn take_screenshot(
    page: &dyn Page,
    dir: &Path,
    prefix: &str,
) -> Option<String> {
    if std::fs::create_dir_all(dir).is_err() {
        return None;
    }
    let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S");
    let path = dir.join(format!("{prefix}_{timestamp}.png"));
    match page.screenshot(&path).await {
        Ok(()) => Some(path.display().to_string()),
        Err(err) => {
            warn!(%err, "challenge screenshot failed");
            None
        }
    }
}

/// Wait for a self-resolving challenge. Cloudflare JS checks normally clear
/// in 5–10 seconds; the `cf_clearance` cookie showing up counts as success
/// even while the interstitial is still rendered.
pub struct AutoWaitStrategy {
    pub timeout: Duration,
}

impl Default for AutoWaitStrategy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
        }
    }
}

impl AutoWaitStrategy {
    const POLL: Duration = Duration::from_secs(1);

    pub async fn resolve(
        &self,
        page: &dyn Page,
        kind: ChallengeKind,
        screenshot_dir: &Path,
    ) -> Resolution {
        let started = Instant::now();
        let screenshot =
            take_screenshot(page, screenshot_dir, &format!("autowait_{kind}")).await;
        let detector = ChallengeDetector::new();

        while started.elapsed() < self.timeout {
            tokio::time::sleep(Self::POLL).await;

            if detector.detect(page).await == ChallengeKind::None {
                info!(%kind, elapsed_ms = started.elapsed().as_millis() as u64, "challenge auto-resolved");
                return Resolution::ok(kind, "challenge auto-resolved", started)
                    .with_screenshot(screenshot);
            }

            if matches!(
                kind,
                ChallengeKind::CloudflareJs | ChallengeKind::CloudflareCaptcha
            ) {
                let cookies = page.cookie_names().await.unwrap_or_default();
                if cookies.iter().any(|name| name == "cf_clearance") {
                    info!("cloudflare clearance cookie obtained");
                    return Resolution::ok(kind, "cloudflare clearance cookie obtained", started);
                }
            }
        }

        Resolution::failed(
            kind,
            format!("auto-wait timeout after {}s", self.timeout.as_secs()),
            started,
        )
        .with_screenshot(screenshot)
    }
}

/// Keep the page open and wait for a human to click through, polling until
/// the detector reports a clean page, then let the post-challenge redirect
/// settle before handing the page back.
pub struct ManualStrategy {
    pub timeout: Duration,
}

impl Default for ManualStrategy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(300),
        }
    }
}

impl ManualStrategy {
    const POLL: Duration = Duration::from_secs(2);

    pub async fn resolve(
        &self,
        page: &dyn Page,
        kind: ChallengeKind,
        screenshot_dir: &Path,
    ) -> Resolution {
        let started = Instant::now();
        let screenshot =
            take_screenshot(page, screenshot_dir, &format!("manual_{kind}")).await;
        warn!(
            %kind,
            timeout_s = self.timeout.as_secs(),
            "manual solving required; waiting for the challenge to be cleared in the browser window"
        );

        let detector = ChallengeDetector::new();
        while started.elapsed() < self.timeout {
            tokio::time::sleep(Self::POLL).await;

            if detector.detect(page).await == ChallengeKind::None {
                info!(elapsed_ms = started.elapsed().as_millis() as u64, "challenge solved manually");

                // The site redirects once the wall clears; let the DOM settle
                // before protocol code starts querying selectors.
                tokio::time::sleep(Duration::from_secs(3)).await;
                if let Err(err) = page.wait_dom_ready(Duration::from_secs(15)).await {
                    warn!(%err, "page did not settle after manual solve");
                }
                tokio::time::sleep(Duration::from_secs(2)).await;

                return Resolution::ok(kind, "challenge solved manually", started)
                    .with_screenshot(screenshot);
            }
        }

        let timeout_shot =
            take_screenshot(page, screenshot_dir, "manual_timeout").await;
        Resolution::failed(
            kind,
            format!("manual solving timeout after {}s", self.timeout.as_secs()),
            started,
        )
        .with_screenshot(timeout_shot.or(screenshot))
    }
}

/// Delegate reCAPTCHA v2 / hCaptcha to an external solver API
/// (`POST /in.php` → request id, `GET /res.php` → token), then inject the
/// token into the page's response field and fire any registered callback.
pub struct ApiSolverStrategy {
    pub api_key: String,
    pub base_url: String,
    pub poll_interval: Duration,
    pub poll_budget: Duration,
    client: reqwest::Client,
}

impl ApiSolverStrategy {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: "http://2captcha.com".to_string(),
            poll_interval: Duration::from_secs(5),
            poll_budget: Duration::from_secs(120),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub async fn resolve(
        &self,
        page: &dyn Page,
        kind: ChallengeKind,
        screenshot_dir: &Path,
    ) -> Resolution {
        let started = Instant::now();

        if self.api_key.is_empty() {
            return Resolution::failed(kind, "solver api key not configured", started);
        }

        let method = match kind {
            ChallengeKind::RecaptchaV2 => "userrecaptcha",
            ChallengeKind::Hcaptcha => "hcaptcha",
            other => {
                return Resolution::failed(
                    kind,
                    format!("solver does not support {other}"),
                    started,
                );
            }
        };

        let detector = ChallengeDetector::new();
        let Some(site_key) = detector.site_key(page, kind).await else {
            let screenshot =
                take_screenshot(page, screenshot_dir, "solver_no_sitekey").await;
            return Resolution::failed(kind, "could not extract captcha site key", started)
                .with_screenshot(screenshot);
        };
        let page_url = page.current_url().await.unwrap_or_default();

        let request_id = match self.submit(method, &site_key, &page_url).await {
            Ok(id) => id,
            Err(message) => return Resolution::failed(kind, message, started),
        };
        info!(%kind, request_id, "captcha submitted to solver");

        let poll_started = Instant::now();
        while poll_started.elapsed() < self.poll_budget {
            tokio::time::sleep(self.poll_interval).await;

            match self.poll(&request_id).await {
                Ok(Some(token)) => {
                    info!(token_len = token.len(), "captcha solved by api");
                    return match inject_token(page, kind, &token).await {
                        Ok(()) => Resolution::ok(kind, "captcha solved via solver api", started),
                        Err(message) => Resolution::failed(kind, message, started),
                    };
                }
                Ok(None) => continue,
                Err(message) => return Resolution::failed(kind, message, started),
            }
        }

        Resolution::failed(kind, "solver polling timeout", started)
    }

    async fn submit(&self, method: &str, site_key: &str, page_url: &str) -> Result<String, String> {
        let key_field = if method == "hcaptcha" { "sitekey" } else { "googlekey" };
        let response = self
            .client
            .post(format!("{}/in.php", self.base_url))
            .form(&[
                ("key", self.api_key.as_str()),
                ("method", method),
                (key_field, site_key),
                ("pageurl", page_url),
                ("json", "1"),
            ])
            .timeout(Duration::from_secs(30))
            .send()
            .await
            .map_err(|e| format!("solver submit failed: {e}"))?;

        let body: Value = response
            .json()
            .await
            .map_err(|e| format!("solver submit returned bad json: {e}"))?;
        if body.get("status").and_then(|v| v.as_i64()) != Some(1) {
            return Err(format!(
                "solver rejected submission: {}",
                body.get("request").and_then(|v| v.as_str()).unwrap_or("unknown")
            ));
        }
        body.get("request")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| "solver response missing request id".to_string())
    }

    /// `Ok(Some(token))` when solved, `Ok(None)` while pending.
    async fn poll(&self, request_id: &str) -> Result<Option<String>, String> {
        let response = self
            .client
            .get(format!("{}/res.php", self.base_url))
            .query(&[
                ("key", self.api_key.as_str()),
                ("action", "get"),
                ("id", request_id),
                ("json", "1"),
            ])
            .timeout(Duration::from_secs(30))
            .send()
            .await
            .map_err(|e| format!("solver poll failed: {e}"))?;

        let body: Value = response
            .json()
            .await
            .map_err(|e| format!("solver poll returned bad json: {e}"))?;
        if body.get("status").and_then(|v| v.as_i64()) == Some(1) {
            return Ok(body
                .get("request")
                .and_then(|v| v.as_str())
                .map(str::to_string));
        }
        match body.get("request").and_then(|v| v.as_str()) {
            Some("CAPCHA_NOT_READY") | None => Ok(None),
            Some(other) => Err(format!("solver error: {other}")),
        }
    }
}

async fn inject_token(page: &dyn Page, kind: ChallengeKind, token: &str) -> Result<(), String> {
    let token_json = serde_json::to_string(token).map_err(|e| e.to_string())?;
    let script = match kind {
        ChallengeKind::RecaptchaV2 => format!(
            r#"
            const token = {token_json};
            const field = document.getElementById("g-recaptcha-response");
            if (field) {{ field.innerHTML = token; }}
            if (typeof ___grecaptcha_cfg !== "undefined") {{
                Object.keys(___grecaptcha_cfg.clients).forEach(key => {{
                    const client = ___grecaptcha_cfg.clients[key];
                    if (client && client.G && client.G.callback) {{
                        client.G.callback(token);
                    }}
                }});
            }}
            return true;
            "#
        ),
        ChallengeKind::Hcaptcha => format!(
            r#"
            const token = {token_json};
            const h = document.querySelector('[name="h-captcha-response"]');
            if (h) {{ h.value = token; }}
            const g = document.querySelector('[name="g-recaptcha-response"]');
            if (g) {{ g.value = token; }}
            return true;
            "#
        ),
        other => return Err(format!("no injection path for {other}")),
    };
    page.execute_js(&script)
        .await
        .map(|_| ())
        .map_err(|e| format!("token injection failed: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use geowatch_browser::testing::ScriptedPage;
    use std::path::PathBuf;

    fn dir() -> PathBuf {
        std::env::temp_dir().join("geowatch-challenge-tests")
    }

    #[tokio::test(start_paused = true)]
    async fn auto_wait_succeeds_when_page_clears() {
        let page = ScriptedPage::new()
            .with_url("https://www.perplexity.ai")
            .with_body_sequence(["Just a moment...", "Ask anything"]);
        let resolution = AutoWaitStrategy::default()
            .resolve(&page, ChallengeKind::CloudflareJs, &dir())
            .await;
        assert!(resolution.success);
    }

    #[tokio::test(start_paused = true)]
    async fn auto_wait_accepts_clearance_cookie() {
        let page = ScriptedPage::new()
            .with_url("https://www.perplexity.ai")
            .with_body("Just a moment...")
            .with_cookie("cf_clearance");
        let resolution = AutoWaitStrategy::default()
            .resolve(&page, ChallengeKind::CloudflareCaptcha, &dir())
            .await;
        assert!(resolution.success);
        assert!(resolution.message.contains("clearance"));
    }

    #[tokio::test(start_paused = true)]
    async fn auto_wait_times_out_on_stuck_page() {
        let page = ScriptedPage::new()
            .with_url("https://www.perplexity.ai")
            .with_body("Just a moment...");
        let resolution = AutoWaitStrategy {
            timeout: Duration::from_secs(3),
        }
        .resolve(&page, ChallengeKind::CloudflareJs, &dir())
        .await;
        assert!(!resolution.success);
    }

    #[tokio::test(start_paused = true)]
    async fn manual_waits_until_human_clears_the_wall() {
        let page = ScriptedPage::new()
            .with_url("https://kimi.moonshot.cn")
            .with_body_sequence(["正在验证您是否是真人", "正在验证您是否是真人", "Kimi 对话"]);
        let resolution = ManualStrategy::default()
            .resolve(&page, ChallengeKind::CloudflareCaptcha, &dir())
            .await;
        assert!(resolution.success);
        assert!(!page.screenshots().is_empty());
    }

    #[tokio::test]
    async fn solver_rejects_unsupported_kinds_fast() {
        let page = ScriptedPage::new();
        let resolution = ApiSolverStrategy::new("key")
            .resolve(&page, ChallengeKind::CloudflareJs, &dir())
            .await;
        assert!(!resolution.success);
        assert!(resolution.message.contains("does not support"));
    }

    #[tokio::test]
    async fn solver_requires_api_key() {
        let page = ScriptedPage::new();
        let resolution = ApiSolverStrategy::new("")
            .resolve(&page, ChallengeKind::RecaptchaV2, &dir())
            .await;
        assert!(!resolution.success);
        assert!(resolution.message.contains("not configured"));
    }

    #[tokio::test]
    async fn solver_requires_a_site_key() {
        let page = ScriptedPage::new().with_url("https://chatgpt.com");
        let resolution = ApiSolverStrategy::new("key")
            .resolve(&page, ChallengeKind::RecaptchaV2, &dir())
            .await;
        assert!(!resolution.success);
        assert!(resolution.message.contains("site key"));
    }
}
