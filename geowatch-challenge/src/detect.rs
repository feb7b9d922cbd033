//! Challenge detection: bilingual keyword scan plus DOM-selector scan per
//! challenge family.

use geowatch_browser::Page;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeKind {
    None,
    /// JavaScript challenge; usually resolves on its own within seconds.
    CloudflareJs,
    /// Turnstile or interactive Cloudflare CAPTCHA.
    CloudflareCaptcha,
    RecaptchaV2,
    RecaptchaV3,
    Hcaptcha,
    LoginRequired,
    RateLimited,
    Blocked,
    Unknown,
}

impl ChallengeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChallengeKind::None => "none",
            ChallengeKind::CloudflareJs => "cloudflare_js",
            ChallengeKind::CloudflareCaptcha => "cloudflare_captcha",
            ChallengeKind::RecaptchaV2 => "recaptcha_v2",
            ChallengeKind::RecaptchaV3 => "recaptcha_v3",
            ChallengeKind::Hcaptcha => "hcaptcha",
            ChallengeKind::LoginRequired => "login_required",
            ChallengeKind::RateLimited => "rate_limited",
            ChallengeKind::Blocked => "blocked",
            ChallengeKind::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ChallengeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// Cloudflare interstitial phrases, English and Chinese.
const CLOUDFLARE_INDICATORS: &[&str] = &[
    "checking your browser",
    "please wait",
    "just a moment",
    "ddos protection by",
    "cf-browser-verification",
    "verifying you are human",
    "checking if the site connection is secure",
    "enable javascript and cookies",
    "正在验证您是否是真人",
    "这可能需要几秒钟时间",
    "检查您的连接的安全性",
    "正在验证",
    "请稍候",
    "验证您是人类",
    "安全检查",
    "cloudflare",
    "ray id",
];

const CLOUDFLARE_SELECTORS: &[&str] = &[
    "#cf-spinner",
    ".cf-browser-verification",
    "#challenge-running",
    "#challenge-form",
    "#challenge-stage",
    "iframe[src*=\"challenges.cloudflare.com\"]",
    "#turnstile-wrapper",
    ".cf-turnstile",
    "[data-ray]",
];

const CLOUDFLARE_CAPTCHA_SELECTORS: &[&str] = &[
    "iframe[src*=\"challenges.cloudflare.com\"]",
    "#turnstile-wrapper",
    ".cf-turnstile",
];

pub(crate) const RECAPTCHA_SELECTORS: &[&str] = &[
    ".g-recaptcha",
    "#g-recaptcha",
    "iframe[src*=\"recaptcha\"]",
    "iframe[title*=\"reCAPTCHA\"]",
];

pub(crate) const HCAPTCHA_SELECTORS: &[&str] =
    &[".h-captcha", "#h-captcha", "iframe[src*=\"hcaptcha\"]"];

const LOGIN_INDICATORS: &[&str] = &[
    "登录",
    "sign in",
    "login",
    "log in",
    "请登录",
    "please sign in",
    "请先登录",
];

const LOGIN_SELECTORS: &[&str] = &[
    "input[type=\"password\"]",
    "form[action*=\"login\"]",
    "form[action*=\"signin\"]",
];

const RATE_LIMIT_INDICATORS: &[&str] = &[
    "rate limit",
    "too many requests",
    "请求过于频繁",
    "try again later",
    "稍后重试",
];

const BLOCKED_INDICATORS: &[&str] = &[
    "access denied",
    "blocked",
    "forbidden",
    "您的访问被拒绝",
    "访问受限",
];

#[derive(Debug, Default)]
pub struct ChallengeDetector;

impl ChallengeDetector {
    pub fn new() -> Self {
        Self
    }

    /// Identify the challenge currently blocking the page, if any.
    ///
    /// Priority: Cloudflare > reCAPTCHA > hCaptcha > rate-limited > blocked >
    /// login-required > none. Detector errors come back as `Unknown` rather
    /// than propagating.
    pub async fn detect(&self, page: &dyn Page) -> ChallengeKind {
        match self.try_detect(page).await {
            Ok(kind) => kind,
            Err(err) => {
                warn!(%err, "challenge detection failed");
                ChallengeKind::Unknown
            }
        }
    }

    async fn try_detect(&self, page: &dyn Page) -> geowatch_core::Result<ChallengeKind> {
        let body = page.body_text().await?.to_lowercase();
        let url = page.current_url().await.unwrap_or_default().to_lowercase();

        if self.is_cloudflare(page, &body, &url).await? {
            if any_selector(page, CLOUDFLARE_CAPTCHA_SELECTORS).await {
                debug!("cloudflare challenge with turnstile widget");
                return Ok(ChallengeKind::CloudflareCaptcha);
            }
            debug!("cloudflare javascript challenge");
            return Ok(ChallengeKind::CloudflareJs);
        }

        if any_selector(page, RECAPTCHA_SELECTORS).await {
            return Ok(ChallengeKind::RecaptchaV2);
        }

        if any_selector(page, HCAPTCHA_SELECTORS).await {
            return Ok(ChallengeKind::Hcaptcha);
        }

        if contains_any(&body, RATE_LIMIT_INDICATORS) {
            return Ok(ChallengeKind::RateLimited);
        }

        if contains_any(&body, BLOCKED_INDICATORS) {
            return Ok(ChallengeKind::Blocked);
        }

        if contains_any(&body, LOGIN_INDICATORS) && any_selector(page, LOGIN_SELECTORS).await {
            return Ok(ChallengeKind::LoginRequired);
        }

        Ok(ChallengeKind::None)
    }

    async fn is_cloudflare(
        &self,
        page: &dyn Page,
        body: &str,
        url: &str,
    ) -> geowatch_core::Result<bool> {
        if contains_any(body, CLOUDFLARE_INDICATORS) {
            return Ok(true);
        }
        if any_selector(page, CLOUDFLARE_SELECTORS).await {
            return Ok(true);
        }
        Ok(url.contains("challenge") || url.contains("cdn-cgi"))
    }

    /// Site key for CAPTCHA solver APIs, when the widget exposes one.
    pub async fn site_key(&self, page: &dyn Page, kind: ChallengeKind) -> Option<String> {
        let selector = match kind {
            ChallengeKind::RecaptchaV2 | ChallengeKind::RecaptchaV3 => ".g-recaptcha",
            ChallengeKind::Hcaptcha => ".h-captcha",
            _ => return None,
        };
        page.attr(selector, "data-sitekey").await.ok().flatten()
    }
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(&n.to_lowercase()))
}

async fn any_selector(page: &dyn Page, selectors: &[&str]) -> bool {
    for selector in selectors {
        if page.exists_visible(selector).await.unwrap_or(false) {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use geowatch_browser::testing::ScriptedPage;

    #[tokio::test]
    async fn clean_page_detects_none() {
        let page = ScriptedPage::new()
            .with_url("https://chat.deepseek.com")
            .with_body("DeepSeek 对话 输入问题开始");
        assert_eq!(ChallengeDetector::new().detect(&page).await, ChallengeKind::None);
    }

    #[tokio::test]
    async fn cloudflare_text_indicator_english() {
        let page = ScriptedPage::new()
            .with_url("https://www.perplexity.ai")
            .with_body("Just a moment... Checking your browser before accessing");
        assert_eq!(
            ChallengeDetector::new().detect(&page).await,
            ChallengeKind::CloudflareJs
        );
    }

    #[tokio::test]
    async fn cloudflare_text_indicator_chinese() {
        let page = ScriptedPage::new()
            .with_url("https://kimi.moonshot.cn")
            .with_body("正在验证您是否是真人，这可能需要几秒钟时间");
        assert_eq!(
            ChallengeDetector::new().detect(&page).await,
            ChallengeKind::CloudflareJs
        );
    }

    #[tokio::test]
    async fn turnstile_widget_refines_to_captcha() {
        let page = ScriptedPage::new()
            .with_url("https://www.perplexity.ai")
            .with_body("Verifying you are human")
            .with_visible([".cf-turnstile"]);
        assert_eq!(
            ChallengeDetector::new().detect(&page).await,
            ChallengeKind::CloudflareCaptcha
        );
    }

    #[tokio::test]
    async fn cloudflare_url_heuristic() {
        let page = ScriptedPage::new()
            .with_url("https://example.com/cdn-cgi/challenge-platform/h/g")
            .with_body("");
        assert_eq!(
            ChallengeDetector::new().detect(&page).await,
            ChallengeKind::CloudflareJs
        );
    }

    #[tokio::test]
    async fn recaptcha_beats_hcaptcha_and_login() {
        let page = ScriptedPage::new()
            .with_url("https://chatgpt.com")
            .with_body("Sign in to continue")
            .with_visible([".g-recaptcha", ".h-captcha", "input[type=\"password\"]"]);
        assert_eq!(
            ChallengeDetector::new().detect(&page).await,
            ChallengeKind::RecaptchaV2
        );
    }

    #[tokio::test]
    async fn rate_limit_before_blocked() {
        let page = ScriptedPage::new()
            .with_url("https://chatglm.cn")
            .with_body("请求过于频繁 access denied");
        assert_eq!(
            ChallengeDetector::new().detect(&page).await,
            ChallengeKind::RateLimited
        );
    }

    #[tokio::test]
    async fn login_needs_both_keyword_and_form() {
        let keyword_only = ScriptedPage::new()
            .with_url("https://chatglm.cn")
            .with_body("请先登录后使用");
        assert_eq!(
            ChallengeDetector::new().detect(&keyword_only).await,
            ChallengeKind::None
        );

        let with_form = ScriptedPage::new()
            .with_url("https://chatglm.cn")
            .with_body("请先登录后使用")
            .with_visible(["input[type=\"password\"]"]);
        assert_eq!(
            ChallengeDetector::new().detect(&with_form).await,
            ChallengeKind::LoginRequired
        );
    }

    #[tokio::test]
    async fn site_key_comes_from_widget_attr() {
        let page = ScriptedPage::new()
            .with_visible([".g-recaptcha"])
            .with_attr(".g-recaptcha", "data-sitekey", "6LfKey");
        let detector = ChallengeDetector::new();
        assert_eq!(
            detector.site_key(&page, ChallengeKind::RecaptchaV2).await.as_deref(),
            Some("6LfKey")
        );
        assert!(detector.site_key(&page, ChallengeKind::CloudflareJs).await.is_none());
    }
}
