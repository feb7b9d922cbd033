//! Scripted in-memory [`Page`] for adapter and challenge tests.
//!
//! The fake is programmed up front: which selectors are visible, what text
//! each selector yields, and a queue of response states that advance every
//! time the page is "submitted" (Enter or the configured send button). No
//! browser, no timers.

use crate::page::{LinkInfo, Page};
use async_trait::async_trait;
use geowatch_core::Result;
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

#[derive(Default)]
struct State {
    url: String,
    body: String,
    body_sequence: VecDeque<String>,
    visible: HashSet<String>,
    texts: HashMap<String, Vec<String>>,
    attrs: HashMap<(String, String), String>,
    links: HashMap<String, Vec<LinkInfo>>,
    cookie_names: Vec<String>,
    storage: Value,
    response_selector: Option<String>,
    response_script: VecDeque<Vec<String>>,
    submit_selector: Option<String>,
    pending_input: String,
    navigations: Vec<String>,
    clicks: Vec<String>,
    submissions: Vec<String>,
    screenshots: Vec<String>,
    applied_states: Vec<Value>,
}

impl State {
    fn submit(&mut self) {
        self.submissions.push(std::mem::take(&mut self.pending_input));
        if let (Some(selector), Some(next)) =
            (self.response_selector.clone(), self.response_script.pop_front())
        {
            self.texts.insert(selector, next);
        }
    }
}

#[derive(Default)]
pub struct ScriptedPage {
    state: Mutex<State>,
}

impl ScriptedPage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_url(self, url: impl Into<String>) -> Self {
        self.state.lock().unwrap().url = url.into();
        self
    }

    pub fn with_body(self, body: impl Into<String>) -> Self {
        self.state.lock().unwrap().body = body.into();
        self
    }

    /// Successive `body_text` results; the last one repeats forever.
    pub fn with_body_sequence<I, S>(self, bodies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.state.lock().unwrap().body_sequence =
            bodies.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_visible<I, S>(self, selectors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.state
            .lock()
            .unwrap()
            .visible
            .extend(selectors.into_iter().map(Into::into));
        self
    }

    pub fn with_texts(self, selector: impl Into<String>, texts: Vec<String>) -> Self {
        self.state.lock().unwrap().texts.insert(selector.into(), texts);
        self
    }

    pub fn with_attr(
        self,
        selector: impl Into<String>,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.state
            .lock()
            .unwrap()
            .attrs
            .insert((selector.into(), name.into()), value.into());
        self
    }

    pub fn with_links(self, selector: impl Into<String>, links: Vec<LinkInfo>) -> Self {
        self.state.lock().unwrap().links.insert(selector.into(), links);
        self
    }

    pub fn with_cookie(self, name: impl Into<String>) -> Self {
        self.state.lock().unwrap().cookie_names.push(name.into());
        self
    }

    pub fn with_storage(self, storage: Value) -> Self {
        self.state.lock().unwrap().storage = storage;
        self
    }

    /// Each submit installs the next element-text set under `selector`.
    pub fn with_response_script(
        self,
        selector: impl Into<String>,
        turns: Vec<Vec<String>>,
    ) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.response_selector = Some(selector.into());
            state.response_script = turns.into();
        }
        self
    }

    /// Clicking this selector counts as a submit.
    pub fn with_submit_selector(self, selector: impl Into<String>) -> Self {
        self.state.lock().unwrap().submit_selector = Some(selector.into());
        self
    }

    pub fn set_visible(&self, selector: impl Into<String>, visible: bool) {
        let mut state = self.state.lock().unwrap();
        let selector = selector.into();
        if visible {
            state.visible.insert(selector);
        } else {
            state.visible.remove(&selector);
        }
    }

    pub fn set_body(&self, body: impl Into<String>) {
        self.state.lock().unwrap().body = body.into();
    }

    pub fn navigations(&self) -> Vec<String> {
        self.state.lock().unwrap().navigations.clone()
    }

    pub fn clicks(&self) -> Vec<String> {
        self.state.lock().unwrap().clicks.clone()
    }

    pub fn submissions(&self) -> Vec<String> {
        self.state.lock().unwrap().submissions.clone()
    }

    pub fn screenshots(&self) -> Vec<String> {
        self.state.lock().unwrap().screenshots.clone()
    }

    pub fn applied_states(&self) -> Vec<Value> {
        self.state.lock().unwrap().applied_states.clone()
    }
}

#[async_trait]
impl Page for ScriptedPage {
    async fn goto(&self, url: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.url = url.to_string();
        state.navigations.push(url.to_string());
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.state.lock().unwrap().url.clone())
    }

    async fn body_text(&self) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        if let Some(next) = state.body_sequence.pop_front() {
            if state.body_sequence.is_empty() {
                state.body_sequence.push_back(next.clone());
            }
            return Ok(next);
        }
        Ok(state.body.clone())
    }

    async fn page_source(&self) -> Result<String> {
        let state = self.state.lock().unwrap();
        Ok(format!("<html><body>{}</body></html>", state.body))
    }

    async fn exists_visible(&self, selector: &str) -> Result<bool> {
        Ok(self.state.lock().unwrap().visible.contains(selector))
    }

    async fn inner_texts(&self, selector: &str) -> Result<Vec<String>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .texts
            .get(selector)
            .cloned()
            .unwrap_or_default())
    }

    async fn click(&self, selector: &str) -> Result<bool> {
        let mut state = self.state.lock().unwrap();
        state.clicks.push(selector.to_string());
        if !state.visible.contains(selector) {
            return Ok(false);
        }
        if state.submit_selector.as_deref() == Some(selector) {
            state.submit();
        }
        Ok(true)
    }

    async fn fill(&self, selector: &str, text: &str) -> Result<bool> {
        let mut state = self.state.lock().unwrap();
        if !state.visible.contains(selector) {
            return Ok(false);
        }
        state.pending_input = text.to_string();
        Ok(true)
    }

    async fn send_keys(&self, selector: &str, text: &str) -> Result<bool> {
        let mut state = self.state.lock().unwrap();
        if !state.visible.contains(selector) {
            return Ok(false);
        }
        if text == crate::human::BACKSPACE {
            state.pending_input.pop();
        } else {
            state.pending_input.push_str(text);
        }
        Ok(true)
    }

    async fn press_enter(&self) -> Result<()> {
        self.state.lock().unwrap().submit();
        Ok(())
    }

    async fn attr(&self, selector: &str, name: &str) -> Result<Option<String>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .attrs
            .get(&(selector.to_string(), name.to_string()))
            .cloned())
    }

    async fn links(&self, selector: &str) -> Result<Vec<LinkInfo>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .links
            .get(selector)
            .cloned()
            .unwrap_or_default())
    }

    async fn execute_js(&self, script: &str) -> Result<Value> {
        if script.contains("document.readyState") {
            return Ok(Value::String("complete".into()));
        }
        if script.contains("document.body.innerText") {
            return Ok(Value::String(self.state.lock().unwrap().body.clone()));
        }
        Ok(Value::Null)
    }

    async fn screenshot(&self, path: &Path) -> Result<()> {
        self.state
            .lock()
            .unwrap()
            .screenshots
            .push(path.display().to_string());
        Ok(())
    }

    async fn cookie_names(&self) -> Result<Vec<String>> {
        Ok(self.state.lock().unwrap().cookie_names.clone())
    }

    async fn storage_state(&self) -> Result<Value> {
        Ok(self.state.lock().unwrap().storage.clone())
    }

    async fn apply_storage_state(&self, state: &Value) -> Result<()> {
        self.state.lock().unwrap().applied_states.push(state.clone());
        Ok(())
    }

    async fn wait_dom_ready(&self, _timeout: Duration) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn submit_advances_the_response_script() {
        let page = ScriptedPage::new()
            .with_visible(["textarea"])
            .with_response_script("[class*='answer']", vec![
                vec!["first turn".into()],
                vec!["second turn".into()],
            ]);

        page.fill("textarea", "question").await.unwrap();
        page.press_enter().await.unwrap();
        assert_eq!(
            page.inner_texts("[class*='answer']").await.unwrap(),
            vec!["first turn".to_string()]
        );

        page.fill("textarea", "follow-up").await.unwrap();
        page.press_enter().await.unwrap();
        assert_eq!(
            page.inner_texts("[class*='answer']").await.unwrap(),
            vec!["second turn".to_string()]
        );
        assert_eq!(page.submissions(), vec!["question", "follow-up"]);
    }

    #[tokio::test]
    async fn body_sequence_repeats_its_tail() {
        let page = ScriptedPage::new().with_body_sequence(["a", "b"]);
        assert_eq!(page.body_text().await.unwrap(), "a");
        assert_eq!(page.body_text().await.unwrap(), "b");
        assert_eq!(page.body_text().await.unwrap(), "b");
    }
}
