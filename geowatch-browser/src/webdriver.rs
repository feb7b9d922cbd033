//! [`Page`] implementation over a WebDriver session.

use crate::page::{LinkInfo, Page};
use crate::stealth::{LAUNCH_ARGS, STEALTH_SCRIPT, StealthProfile};
use async_trait::async_trait;
use geowatch_core::{GeoError, Result};
use serde::Deserialize;
use serde_json::json;
use std::path::Path;
use std::time::Duration;
use thirtyfour::error::WebDriverError;
use thirtyfour::extensions::cdp::ChromeDevTools;
use thirtyfour::prelude::*;
use tracing::{debug, warn};

const NAVIGATION_TIMEOUT: Duration = Duration::from_secs(60);
const READY_POLL: Duration = Duration::from_millis(250);

fn wd_err(err: WebDriverError) -> GeoError {
    GeoError::Browser(err.to_string())
}

#[derive(Debug, Clone)]
pub struct BrowserConfig {
    /// WebDriver endpoint, e.g. `http://localhost:9515`.
    pub webdriver_url: String,
    pub headless: bool,
    pub profile: StealthProfile,
}

impl BrowserConfig {
    pub fn new(webdriver_url: impl Into<String>) -> Self {
        Self {
            webdriver_url: webdriver_url.into(),
            headless: true,
            profile: StealthProfile::sample("zh-CN"),
        }
    }

    pub fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    pub fn with_profile(mut self, profile: StealthProfile) -> Self {
        self.profile = profile;
        self
    }
}

pub struct WebDriverPage {
    driver: WebDriver,
}

impl WebDriverPage {
    /// Open a fresh stealth context: launch flags, randomized fingerprint,
    /// forced timezone, and the init script registered before any page
    /// script can look.
    pub async fn connect(config: &BrowserConfig) -> Result<Self> {
        let mut caps = DesiredCapabilities::chrome();
        for arg in LAUNCH_ARGS {
            caps.add_arg(arg).map_err(wd_err)?;
        }
        caps.add_arg(&format!("--user-agent={}", config.profile.user_agent))
            .map_err(wd_err)?;
        caps.add_arg(&format!(
            "--window-size={},{}",
            config.profile.viewport.0, config.profile.viewport.1
        ))
        .map_err(wd_err)?;
        caps.add_arg(&format!("--lang={}", config.profile.locale))
            .map_err(wd_err)?;
        if config.headless {
            caps.add_arg("--headless=new").map_err(wd_err)?;
        }

        let driver = WebDriver::new(&config.webdriver_url, caps)
            .await
            .map_err(wd_err)?;

        let devtools = ChromeDevTools::new(driver.handle.clone());
        devtools
            .execute_cdp_with_params(
                "Emulation.setTimezoneOverride",
                json!({ "timezoneId": config.profile.timezone }),
            )
            .await
            .map_err(wd_err)?;
        devtools
            .execute_cdp_with_params(
                "Page.addScriptToEvaluateOnNewDocument",
                json!({ "source": STEALTH_SCRIPT }),
            )
            .await
            .map_err(wd_err)?;

        debug!(
            ua = %config.profile.user_agent,
            viewport = ?config.profile.viewport,
            tz = %config.profile.timezone,
            "stealth context ready"
        );
        Ok(Self { driver })
    }

    pub async fn quit(self) -> Result<()> {
        self.driver.quit().await.map_err(wd_err)
    }

    async fn first_displayed(&self, selector: &str) -> Result<Option<WebElement>> {
        let elements = self
            .driver
            .find_all(By::Css(selector))
            .await
            .unwrap_or_default();
        for element in elements {
            if element.is_displayed().await.unwrap_or(false) {
                return Ok(Some(element));
            }
        }
        Ok(None)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawLink {
    href: String,
    text: String,
    title: Option<String>,
    aria_label: Option<String>,
    parent_text: Option<String>,
}

#[async_trait]
impl Page for WebDriverPage {
    async fn goto(&self, url: &str) -> Result<()> {
        self.driver.goto(url).await.map_err(wd_err)?;
        self.wait_dom_ready(NAVIGATION_TIMEOUT).await
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.driver.current_url().await.map_err(wd_err)?.to_string())
    }

    async fn body_text(&self) -> Result<String> {
        let body = self.driver.find(By::Tag("body")).await.map_err(wd_err)?;
        body.text().await.map_err(wd_err)
    }

    async fn page_source(&self) -> Result<String> {
        self.driver.source().await.map_err(wd_err)
    }

    async fn exists_visible(&self, selector: &str) -> Result<bool> {
        Ok(self.first_displayed(selector).await?.is_some())
    }

    async fn inner_texts(&self, selector: &str) -> Result<Vec<String>> {
        let elements = self
            .driver
            .find_all(By::Css(selector))
            .await
            .unwrap_or_default();
        let mut texts = Vec::with_capacity(elements.len());
        for element in elements {
            if let Ok(text) = element.text().await {
                texts.push(text);
            }
        }
        Ok(texts)
    }

    async fn click(&self, selector: &str) -> Result<bool> {
        match self.first_displayed(selector).await? {
            Some(element) => {
                element.click().await.map_err(wd_err)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn fill(&self, selector: &str, text: &str) -> Result<bool> {
        match self.first_displayed(selector).await? {
            Some(element) => {
                element.clear().await.ok();
                element.send_keys(text).await.map_err(wd_err)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn send_keys(&self, selector: &str, text: &str) -> Result<bool> {
        match self.first_displayed(selector).await? {
            Some(element) => {
                element.send_keys(text).await.map_err(wd_err)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn press_enter(&self) -> Result<()> {
        let element = self.driver.active_element().await.map_err(wd_err)?;
        let enter: char = Key::Enter.into();
        element.send_keys(enter.to_string()).await.map_err(wd_err)
    }

    async fn attr(&self, selector: &str, name: &str) -> Result<Option<String>> {
        match self.first_displayed(selector).await? {
            Some(element) => element.attr(name).await.map_err(wd_err),
            None => Ok(None),
        }
    }

    async fn links(&self, selector: &str) -> Result<Vec<LinkInfo>> {
        // One script round trip instead of four attribute fetches per link.
        let script = format!(
            r#"
            return Array.from(document.querySelectorAll({selector})).map(a => ({{
                href: a.href || '',
                text: (a.innerText || '').trim(),
                title: a.getAttribute('title'),
                ariaLabel: a.getAttribute('aria-label'),
                parentText: a.parentElement ? (a.parentElement.innerText || '').trim().slice(0, 500) : null
            }}));
            "#,
            selector = serde_json::to_string(selector)?,
        );
        let value = self.execute_js(&script).await?;
        let raw: Vec<RawLink> = serde_json::from_value(value).unwrap_or_default();
        Ok(raw
            .into_iter()
            .map(|l| LinkInfo {
                href: l.href,
                text: l.text,
                title: l.title,
                aria_label: l.aria_label,
                parent_text: l.parent_text,
            })
            .collect())
    }

    async fn execute_js(&self, script: &str) -> Result<serde_json::Value> {
        let ret = self
            .driver
            .execute(script, Vec::new())
            .await
            .map_err(wd_err)?;
        Ok(ret.json().clone())
    }

    async fn screenshot(&self, path: &Path) -> Result<()> {
        self.driver.screenshot(path).await.map_err(wd_err)
    }

    async fn cookie_names(&self) -> Result<Vec<String>> {
        let cookies = self.driver.get_all_cookies().await.map_err(wd_err)?;
        Ok(cookies.into_iter().map(|c| c.name).collect())
    }

    async fn storage_state(&self) -> Result<serde_json::Value> {
        let cookies = self.driver.get_all_cookies().await.map_err(wd_err)?;
        let cookie_values: Vec<serde_json::Value> = cookies
            .iter()
            .map(|c| {
                json!({
                    "name": c.name,
                    "value": c.value,
                    "path": c.path,
                    "domain": c.domain,
                    "secure": c.secure,
                    "expiry": c.expiry,
                })
            })
            .collect();
        let local_storage = self
            .execute_js("return Object.assign({}, window.localStorage);")
            .await
            .unwrap_or(serde_json::Value::Null);
        Ok(json!({
            "cookies": cookie_values,
            "local_storage": local_storage,
        }))
    }

    async fn apply_storage_state(&self, state: &serde_json::Value) -> Result<()> {
        if let Some(cookies) = state.get("cookies").and_then(|v| v.as_array()) {
            for entry in cookies {
                let (Some(name), Some(value)) = (
                    entry.get("name").and_then(|v| v.as_str()),
                    entry.get("value").and_then(|v| v.as_str()),
                ) else {
                    continue;
                };
                let mut cookie = Cookie::new(name.to_string(), value.to_string());
                cookie.path = entry
                    .get("path")
                    .and_then(|v| v.as_str())
                    .map(str::to_string);
                cookie.domain = entry
                    .get("domain")
                    .and_then(|v| v.as_str())
                    .map(str::to_string);
                cookie.secure = entry.get("secure").and_then(|v| v.as_bool());
                cookie.expiry = entry.get("expiry").and_then(|v| v.as_i64());
                if let Err(err) = self.driver.add_cookie(cookie).await {
                    warn!(name, %err, "skipping cookie that the browser refused");
                }
            }
        }
        if let Some(entries) = state.get("local_storage").and_then(|v| v.as_object()) {
            if !entries.is_empty() {
                let script = format!(
                    r#"
                    const data = {data};
                    for (const [key, value] of Object.entries(data)) {{
                        try {{ window.localStorage.setItem(key, value); }} catch (e) {{}}
                    }}
                    return true;
                    "#,
                    data = serde_json::to_string(entries)?,
                );
                self.execute_js(&script).await?;
            }
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.driver.clone().quit().await.map_err(wd_err)
    }

    async fn wait_dom_ready(&self, timeout: Duration) -> Result<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let state = self
                .execute_js("return document.readyState;")
                .await
                .unwrap_or(serde_json::Value::Null);
            if state.as_str().map(|s| s != "loading").unwrap_or(false) {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(GeoError::Browser(format!(
                    "document did not become ready within {}s",
                    timeout.as_secs()
                )));
            }
            tokio::time::sleep(READY_POLL).await;
        }
    }
}
