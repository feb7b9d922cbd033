//! HTTP-API adapters: the browser-free path for engines with an enrolled
//! API key. Same outcome contract as the browser adapters, a fraction of the
//! cost, and no challenge handling to worry about.

pub mod citations;
mod http;
pub mod vendors;

pub use citations::{citations_from_text, merge_citations};
pub use vendors::{ChatGptApi, DeepSeekApi, KimiApi, PerplexityApi, QwenApi};

use async_trait::async_trait;
use geowatch_core::{Citation, Engine, Result};

/// Engines that have a vendor chat-completion API worth preferring over
/// browser automation.
pub const API_ELIGIBLE: [Engine; 5] = [
    Engine::DeepSeek,
    Engine::Qwen,
    Engine::Kimi,
    Engine::Perplexity,
    Engine::ChatGpt,
];

#[derive(Debug, Clone)]
pub struct ApiAnswer {
    pub response_text: String,
    pub citations: Vec<Citation>,
    pub model: String,
    pub response_time_ms: u64,
    pub tokens_used: u64,
}

#[async_trait]
pub trait ApiEngine: Send + Sync {
    fn engine(&self) -> Engine;

    async fn query(&self, question: &str, enable_web_search: bool) -> Result<ApiAnswer>;
}

/// Build the adapter for an engine, or `None` when the engine has no API.
pub fn adapter_for(engine: Engine, api_key: impl Into<String>) -> Option<Box<dyn ApiEngine>> {
    let api_key = api_key.into();
    match engine {
        Engine::DeepSeek => Some(Box::new(DeepSeekApi::new(api_key))),
        Engine::Qwen => Some(Box::new(QwenApi::new(api_key))),
        Engine::Kimi => Some(Box::new(KimiApi::new(api_key))),
        Engine::Perplexity => Some(Box::new(PerplexityApi::new(api_key))),
        Engine::ChatGpt => Some(Box::new(ChatGptApi::new(api_key))),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eligible_engines_have_adapters() {
        for engine in API_ELIGIBLE {
            let adapter = adapter_for(engine, "key").unwrap();
            assert_eq!(adapter.engine(), engine);
        }
        assert!(adapter_for(Engine::Doubao, "key").is_none());
        assert!(adapter_for(Engine::GoogleSge, "key").is_none());
    }
}
