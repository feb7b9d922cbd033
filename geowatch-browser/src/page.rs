use async_trait::async_trait;
use geowatch_core::Result;
use std::path::Path;
use std::time::Duration;

/// One anchor element as seen in the rendered answer, with everything the
/// citation-title ladder needs in a single round trip.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinkInfo {
    pub href: String,
    pub text: String,
    pub title: Option<String>,
    pub aria_label: Option<String>,
    pub parent_text: Option<String>,
}

/// The seam between engine protocol code and a live browser.
///
/// Implementations: [`crate::WebDriverPage`] over a real WebDriver session,
/// and the scripted fake in [`crate::testing`] for adapter tests. Selector
/// arguments are CSS.
#[async_trait]
pub trait Page: Send + Sync {
    /// Navigate and wait for DOM-content-loaded. Never waits for network
    /// idle; anti-bot pages hold connections open indefinitely.
    async fn goto(&self, url: &str) -> Result<()>;

    async fn current_url(&self) -> Result<String>;

    /// Visible text of the whole document body.
    async fn body_text(&self) -> Result<String>;

    /// Full HTML of the current document.
    async fn page_source(&self) -> Result<String>;

    /// Whether at least one element matching the selector is displayed.
    async fn exists_visible(&self, selector: &str) -> Result<bool>;

    /// Visible text of every element matching the selector, in DOM order.
    async fn inner_texts(&self, selector: &str) -> Result<Vec<String>>;

    /// Click the first visible match. Returns false when nothing matched.
    async fn click(&self, selector: &str) -> Result<bool>;

    /// Replace the content of the first matching input. Returns false when
    /// nothing matched.
    async fn fill(&self, selector: &str, text: &str) -> Result<bool>;

    /// Append keystrokes to the first matching input.
    async fn send_keys(&self, selector: &str, text: &str) -> Result<bool>;

    async fn press_enter(&self) -> Result<()>;

    /// Attribute of the first matching element.
    async fn attr(&self, selector: &str, name: &str) -> Result<Option<String>>;

    /// Anchors matching the selector with title-extraction context attached.
    async fn links(&self, selector: &str) -> Result<Vec<LinkInfo>>;

    /// Run a script in the page; the script must `return` a JSON-able value.
    async fn execute_js(&self, script: &str) -> Result<serde_json::Value>;

    async fn screenshot(&self, path: &Path) -> Result<()>;

    /// Names of cookies visible to the current context.
    async fn cookie_names(&self) -> Result<Vec<String>>;

    /// Capture cookies plus web storage as an opaque blob for the session
    /// store.
    async fn storage_state(&self) -> Result<serde_json::Value>;

    /// Replay a previously captured blob into the live context. Callers
    /// navigate to the engine origin first; cookies and storage only apply
    /// there.
    async fn apply_storage_state(&self, state: &serde_json::Value) -> Result<()>;

    /// Block until `document.readyState` leaves `loading`, up to the timeout.
    async fn wait_dom_ready(&self, timeout: Duration) -> Result<()>;

    /// Tear down the underlying context. Further calls are undefined.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
