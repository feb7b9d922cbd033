//! Explicit configuration provider.
//!
//! Components receive a [`ConfigProvider`] handle instead of reading a
//! process-wide singleton. Reads are cheap clones of an immutable snapshot;
//! `reload` swaps the snapshot atomically.

use crate::types::Engine;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::{Arc, RwLock};

/// Recognized configuration keys.
pub mod keys {
    pub const API_MODE_ENABLED: &str = "crawler.api_mode_enabled";
    pub const API_MODE_ENGINES: &str = "crawler.api_mode_engines";
    pub const RATE_LIMIT_PER_SEC: &str = "crawler.rate_limit_per_sec";
    pub const CAPTCHA_STRATEGY: &str = "captcha.strategy";
    pub const CAPTCHA_MANUAL_TIMEOUT_SECONDS: &str = "captcha.manual_timeout_seconds";
    pub const CAPTCHA_API_KEY: &str = "captcha.api_key";
    pub const SESSION_TTL_HOURS: &str = "session.ttl_hours";
    pub const AUTO_CHECKUP_INTERVAL_DAYS: &str = "scheduler.auto_checkup_interval_days";
    pub const RETEST_AFTER_DAYS: &str = "scheduler.retest_after_days";
    pub const INVITE_CODE_REQUIRED: &str = "auth.invite_code_required";
    pub const HEADLESS: &str = "browser.headless";
    pub const SESSION_DIR: &str = "paths.session_dir";
    pub const SCREENSHOT_DIR: &str = "paths.screenshot_dir";
}

#[derive(Debug, Default)]
struct Snapshot {
    map: HashMap<String, Value>,
}

#[derive(Debug, Clone)]
pub struct ConfigProvider {
    inner: Arc<RwLock<Arc<Snapshot>>>,
}

impl Default for ConfigProvider {
    fn default() -> Self {
        Self::new(HashMap::new())
    }
}

impl ConfigProvider {
    pub fn new(map: HashMap<String, Value>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(Snapshot { map }))),
        }
    }

    /// Replace the whole snapshot. Readers holding the old one finish with it.
    pub fn reload(&self, map: HashMap<String, Value>) {
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        *guard = Arc::new(Snapshot { map });
    }

    pub fn set(&self, key: impl Into<String>, value: Value) {
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let mut map = guard.map.clone();
        map.insert(key.into(), value);
        *guard = Arc::new(Snapshot { map });
    }

    fn snapshot(&self) -> Arc<Snapshot> {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.snapshot().map.get(key).cloned()
    }

    pub fn bool_or(&self, key: &str, default: bool) -> bool {
        self.get(key).and_then(|v| v.as_bool()).unwrap_or(default)
    }

    pub fn u64_or(&self, key: &str, default: u64) -> u64 {
        self.get(key).and_then(|v| v.as_u64()).unwrap_or(default)
    }

    pub fn f64_or(&self, key: &str, default: f64) -> f64 {
        self.get(key).and_then(|v| v.as_f64()).unwrap_or(default)
    }

    pub fn string_or(&self, key: &str, default: &str) -> String {
        self.get(key)
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_else(|| default.to_string())
    }

    pub fn string(&self, key: &str) -> Option<String> {
        self.get(key)
            .and_then(|v| v.as_str().map(str::to_string))
            .filter(|s| !s.is_empty())
    }

    /// Engines eligible for API-mode crawling. Unparseable entries are ignored.
    pub fn api_mode_engines(&self) -> HashSet<Engine> {
        match self.get(keys::API_MODE_ENGINES) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str())
                .filter_map(|s| Engine::from_str(s).ok())
                .collect(),
            _ => [
                Engine::DeepSeek,
                Engine::Qwen,
                Engine::Kimi,
                Engine::Perplexity,
                Engine::ChatGpt,
            ]
            .into_iter()
            .collect(),
        }
    }

    pub fn session_ttl_hours(&self) -> u64 {
        self.u64_or(keys::SESSION_TTL_HOURS, 24)
    }

    pub fn auto_checkup_interval_days(&self) -> u32 {
        self.u64_or(keys::AUTO_CHECKUP_INTERVAL_DAYS, 7) as u32
    }

    pub fn retest_after_days(&self) -> u32 {
        self.u64_or(keys::RETEST_AFTER_DAYS, 14) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_apply_when_unset() {
        let config = ConfigProvider::default();
        assert!(config.bool_or(keys::API_MODE_ENABLED, true));
        assert_eq!(config.session_ttl_hours(), 24);
        assert_eq!(config.retest_after_days(), 14);
        assert!(config.api_mode_engines().contains(&Engine::DeepSeek));
        assert!(!config.api_mode_engines().contains(&Engine::Doubao));
    }

    #[test]
    fn reload_swaps_snapshot() {
        let config = ConfigProvider::default();
        config.reload(HashMap::from([(
            keys::SESSION_TTL_HOURS.to_string(),
            json!(6),
        )]));
        assert_eq!(config.session_ttl_hours(), 6);
        config.reload(HashMap::new());
        assert_eq!(config.session_ttl_hours(), 24);
    }

    #[test]
    fn api_mode_engines_parse_known_names() {
        let config = ConfigProvider::default();
        config.set(keys::API_MODE_ENGINES, json!(["qwen", "bogus", "kimi"]));
        let engines = config.api_mode_engines();
        assert_eq!(engines.len(), 2);
        assert!(engines.contains(&Engine::Qwen));
    }
}
