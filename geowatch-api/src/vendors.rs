//! One adapter per vendor chat-completion API.
//!
//! DeepSeek, Kimi (Moonshot), and ChatGPT speak the OpenAI wire shape; Qwen
//! goes through DashScope; Perplexity adds a structured `citations` array.
//! Parsing is split out of the HTTP path so it stays testable offline.

use crate::citations::{citations_from_text, host_of, merge_citations};
use crate::http::ChatHttp;
use crate::{ApiAnswer, ApiEngine};
use async_trait::async_trait;
use geowatch_core::{Citation, Engine, Result};
use serde_json::{Value, json};
use std::time::Instant;

const DEEPSEEK_BASE: &str = "https://api.deepseek.com/v1";
const DASHSCOPE_BASE: &str = "https://dashscope.aliyuncs.com/api/v1";
const MOONSHOT_BASE: &str = "https://api.moonshot.cn/v1";
const PERPLEXITY_BASE: &str = "https://api.perplexity.ai";
const OPENAI_BASE: &str = "https://api.openai.com/v1";

const DEEPSEEK_SYSTEM_PROMPT: &str = "你是一个专业的信息检索助手。请根据用户的问题提供准确、详细的回答。\n如果你引用了网络信息，请在回答中包含相关的来源链接。\n回答格式要求：\n1. 先给出直接答案\n2. 然后提供详细解释\n3. 如果有相关来源，请列出";

const QWEN_SYSTEM_PROMPT: &str =
    "你是通义千问，一个由阿里云开发的AI助手。\n请根据用户的问题提供准确、详细的回答。如果引用了信息来源，请包含链接。";

const KIMI_SYSTEM_PROMPT: &str = "你是 Kimi，由 Moonshot AI 提供的人工智能助手。\n请根据用户的问题提供准确、详细的回答。如果需要，请搜索网络获取最新信息，并在回答中包含信息来源。";

const CHATGPT_SYSTEM_PROMPT: &str = "You are ChatGPT, a helpful AI assistant.\nPlease provide accurate and detailed answers to the user's questions.\nIf you reference any information sources, please include the URLs.";

fn openai_text(data: &Value) -> String {
    data.pointer("/choices/0/message/content")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}

fn total_tokens(data: &Value) -> u64 {
    data.pointer("/usage/total_tokens")
        .and_then(|v| v.as_u64())
        .unwrap_or(0)
}

fn model_name(data: &Value, fallback: &str) -> String {
    data.get("model")
        .and_then(|v| v.as_str())
        .unwrap_or(fallback)
        .to_string()
}

fn answer(
    data: &Value,
    fallback_model: &str,
    text: String,
    structured: Vec<Citation>,
    started: Instant,
) -> ApiAnswer {
    let citations = merge_citations(structured, citations_from_text(&text));
    ApiAnswer {
        citations,
        model: model_name(data, fallback_model),
        response_time_ms: started.elapsed().as_millis() as u64,
        tokens_used: total_tokens(data),
        response_text: text,
    }
}

pub struct DeepSeekApi {
    api_key: String,
    base_url: String,
    model: String,
    http: ChatHttp,
}

impl DeepSeekApi {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEEPSEEK_BASE.to_string(),
            model: "deepseek-chat".to_string(),
            http: ChatHttp::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn payload(&self, question: &str, enable_web_search: bool) -> Value {
        let mut system = DEEPSEEK_SYSTEM_PROMPT.to_string();
        if enable_web_search {
            system.push_str("\n请搜索最新的网络信息来回答问题。");
        }
        json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": question},
            ],
            "temperature": 0.7,
            "max_tokens": 4096,
            "stream": false,
        })
    }
}

#[async_trait]
impl ApiEngine for DeepSeekApi {
    fn engine(&self) -> Engine {
        Engine::DeepSeek
    }

    async fn query(&self, question: &str, enable_web_search: bool) -> Result<ApiAnswer> {
        let started = Instant::now();
        let data = self
            .http
            .post_chat(
                &format!("{}/chat/completions", self.base_url),
                &self.api_key,
                &self.payload(question, enable_web_search),
            )
            .await?;
        let text = openai_text(&data);
        Ok(answer(&data, &self.model, text, Vec::new(), started))
    }
}

pub struct QwenApi {
    api_key: String,
    base_url: String,
    model: String,
    http: ChatHttp,
}

impl QwenApi {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DASHSCOPE_BASE.to_string(),
            model: "qwen-max".to_string(),
            http: ChatHttp::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn payload(&self, question: &str, enable_web_search: bool) -> Value {
        let mut parameters = json!({
            "temperature": 0.7,
            "max_tokens": 4096,
            "result_format": "message",
        });
        if enable_web_search {
            parameters["enable_search"] = json!(true);
        }
        json!({
            "model": self.model,
            "input": {
                "messages": [
                    {"role": "system", "content": QWEN_SYSTEM_PROMPT},
                    {"role": "user", "content": question},
                ]
            },
            "parameters": parameters,
        })
    }

    /// DashScope: answer under `output`, search hits under
    /// `output.search_info.search_results`.
    pub(crate) fn parse(data: &Value) -> (String, Vec<Citation>) {
        let text = data
            .pointer("/output/choices/0/message/content")
            .and_then(|v| v.as_str())
            .or_else(|| data.pointer("/output/text").and_then(|v| v.as_str()))
            .unwrap_or_default()
            .to_string();

        let mut structured = Vec::new();
        if let Some(results) = data
            .pointer("/output/search_info/search_results")
            .and_then(|v| v.as_array())
        {
            for item in results {
                let Some(url) = item.get("url").and_then(|v| v.as_str()).filter(|u| !u.is_empty())
                else {
                    continue;
                };
                let title = item
                    .get("title")
                    .and_then(|v| v.as_str())
                    .filter(|t| !t.is_empty())
                    .map(str::to_string)
                    .unwrap_or_else(|| host_of(url));
                let position = structured.len() as u32;
                structured.push(Citation::new(position, url, host_of(url)).with_title(title));
            }
        }
        (text, structured)
    }
}

#[async_trait]
impl ApiEngine for QwenApi {
    fn engine(&self) -> Engine {
        Engine::Qwen
    }

    async fn query(&self, question: &str, enable_web_search: bool) -> Result<ApiAnswer> {
        let started = Instant::now();
        let data = self
            .http
            .post_chat(
                &format!(
                    "{}/services/aigc/text-generation/generation",
                    self.base_url
                ),
                &self.api_key,
                &self.payload(question, enable_web_search),
            )
            .await?;
        let (text, structured) = Self::parse(&data);
        Ok(answer(&data, &self.model, text, structured, started))
    }
}

pub struct KimiApi {
    api_key: String,
    base_url: String,
    model: String,
    http: ChatHttp,
}

impl KimiApi {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: MOONSHOT_BASE.to_string(),
            model: "moonshot-v1-128k".to_string(),
            http: ChatHttp::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn payload(&self, question: &str, enable_web_search: bool) -> Value {
        let mut payload = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": KIMI_SYSTEM_PROMPT},
                {"role": "user", "content": question},
            ],
            "temperature": 0.7,
            "max_tokens": 4096,
            "stream": false,
        });
        if enable_web_search {
            payload["tools"] = json!([
                {"type": "web_search", "web_search": {"enable": true}}
            ]);
        }
        payload
    }

    /// Moonshot: OpenAI shape plus web-search hits inside tool calls.
    pub(crate) fn parse(data: &Value) -> (String, Vec<Citation>) {
        let text = openai_text(data);

        let mut structured = Vec::new();
        if let Some(tool_calls) = data
            .pointer("/choices/0/message/tool_calls")
            .and_then(|v| v.as_array())
        {
            for call in tool_calls {
                if call.get("type").and_then(|v| v.as_str()) != Some("web_search") {
                    continue;
                }
                let Some(results) = call
                    .pointer("/web_search/results")
                    .and_then(|v| v.as_array())
                else {
                    continue;
                };
                for item in results {
                    let Some(url) =
                        item.get("url").and_then(|v| v.as_str()).filter(|u| !u.is_empty())
                    else {
                        continue;
                    };
                    let title = item
                        .get("title")
                        .and_then(|v| v.as_str())
                        .filter(|t| !t.is_empty())
                        .map(str::to_string)
                        .unwrap_or_else(|| host_of(url));
                    let position = structured.len() as u32;
                    structured.push(Citation::new(position, url, host_of(url)).with_title(title));
                }
            }
        }
        (text, structured)
    }
}

#[async_trait]
impl ApiEngine for KimiApi {
    fn engine(&self) -> Engine {
        Engine::Kimi
    }

    async fn query(&self, question: &str, enable_web_search: bool) -> Result<ApiAnswer> {
        let started = Instant::now();
        let data = self
            .http
            .post_chat(
                &format!("{}/chat/completions", self.base_url),
                &self.api_key,
                &self.payload(question, enable_web_search),
            )
            .await?;
        let (text, structured) = Self::parse(&data);
        Ok(answer(&data, &self.model, text, structured, started))
    }
}

pub struct PerplexityApi {
    api_key: String,
    base_url: String,
    model: String,
    http: ChatHttp,
}

impl PerplexityApi {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: PERPLEXITY_BASE.to_string(),
            model: "llama-3.1-sonar-large-128k-online".to_string(),
            http: ChatHttp::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn payload(&self, question: &str) -> Value {
        json!({
            "model": self.model,
            "messages": [
                {"role": "user", "content": question},
            ],
            "temperature": 0.7,
            "max_tokens": 4096,
            "return_citations": true,
            "return_related_questions": false,
        })
    }

    /// Perplexity reports citations as a top-level array of URLs.
    pub(crate) fn parse(data: &Value) -> (String, Vec<Citation>) {
        let text = openai_text(data);
        let mut structured = Vec::new();
        if let Some(urls) = data.get("citations").and_then(|v| v.as_array()) {
            for url in urls.iter().filter_map(|v| v.as_str()) {
                let host = host_of(url);
                let position = structured.len() as u32;
                structured.push(Citation::new(position, url, host.clone()).with_title(host));
            }
        }
        (text, structured)
    }
}

#[async_trait]
impl ApiEngine for PerplexityApi {
    fn engine(&self) -> Engine {
        Engine::Perplexity
    }

    async fn query(&self, question: &str, _enable_web_search: bool) -> Result<ApiAnswer> {
        // Search is always on for the online models.
        let started = Instant::now();
        let data = self
            .http
            .post_chat(
                &format!("{}/chat/completions", self.base_url),
                &self.api_key,
                &self.payload(question),
            )
            .await?;
        let (text, structured) = Self::parse(&data);
        Ok(answer(&data, &self.model, text, structured, started))
    }
}

pub struct ChatGptApi {
    api_key: String,
    base_url: String,
    model: String,
    http: ChatHttp,
}

impl ChatGptApi {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: OPENAI_BASE.to_string(),
            model: "gpt-4o".to_string(),
            http: ChatHttp::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn payload(&self, question: &str) -> Value {
        json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": CHATGPT_SYSTEM_PROMPT},
                {"role": "user", "content": question},
            ],
            "temperature": 0.7,
            "max_tokens": 4096,
        })
    }
}

#[async_trait]
impl ApiEngine for ChatGptApi {
    fn engine(&self) -> Engine {
        Engine::ChatGpt
    }

    async fn query(&self, question: &str, _enable_web_search: bool) -> Result<ApiAnswer> {
        // No native web search on the vanilla completions API.
        let started = Instant::now();
        let data = self
            .http
            .post_chat(
                &format!("{}/chat/completions", self.base_url),
                &self.api_key,
                &self.payload(question),
            )
            .await?;
        let text = openai_text(&data);
        Ok(answer(&data, &self.model, text, Vec::new(), started))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perplexity_parse_reads_structured_citations() {
        let data = json!({
            "model": "llama-3.1-sonar-large-128k-online",
            "choices": [{"message": {"content": "Answer citing https://inline.example.com/post"}}],
            "citations": ["https://first.example.com/a", "https://second.example.org/b"],
        });
        let (text, structured) = PerplexityApi::parse(&data);
        assert!(text.starts_with("Answer"));
        assert_eq!(structured.len(), 2);
        assert_eq!(structured[0].host, "first.example.com");

        let merged = merge_citations(structured, citations_from_text(&text));
        assert_eq!(merged.len(), 3);
        assert_eq!(merged[2].url, "https://inline.example.com/post");
        assert_eq!(merged[2].position, 2);
    }

    #[test]
    fn qwen_parse_reads_search_info() {
        let data = json!({
            "output": {
                "choices": [{"message": {"content": "回答正文"}}],
                "search_info": {
                    "search_results": [
                        {"url": "https://news.example.cn/item", "title": "新闻标题", "site_name": "news"},
                        {"url": "", "title": "skipped"},
                    ]
                }
            }
        });
        let (text, structured) = QwenApi::parse(&data);
        assert_eq!(text, "回答正文");
        assert_eq!(structured.len(), 1);
        assert_eq!(structured[0].title.as_deref(), Some("新闻标题"));
    }

    #[test]
    fn qwen_parse_falls_back_to_output_text() {
        let data = json!({"output": {"text": "纯文本输出"}});
        let (text, structured) = QwenApi::parse(&data);
        assert_eq!(text, "纯文本输出");
        assert!(structured.is_empty());
    }

    #[test]
    fn kimi_parse_reads_web_search_tool_results() {
        let data = json!({
            "choices": [{
                "message": {
                    "content": "答案",
                    "tool_calls": [{
                        "type": "web_search",
                        "web_search": {
                            "results": [
                                {"url": "https://doc.example.com/p", "title": "文档", "host": "doc.example.com"}
                            ]
                        }
                    }]
                }
            }]
        });
        let (text, structured) = KimiApi::parse(&data);
        assert_eq!(text, "答案");
        assert_eq!(structured.len(), 1);
        assert_eq!(structured[0].url, "https://doc.example.com/p");
    }

    #[test]
    fn openai_shape_helpers() {
        let data = json!({
            "model": "deepseek-chat",
            "choices": [{"message": {"content": "hello"}}],
            "usage": {"total_tokens": 321},
        });
        assert_eq!(openai_text(&data), "hello");
        assert_eq!(total_tokens(&data), 321);
        assert_eq!(model_name(&data, "x"), "deepseek-chat");
    }

    #[test]
    fn kimi_payload_carries_web_search_tool_only_when_enabled() {
        let api = KimiApi::new("k");
        assert!(api.payload("q", true).get("tools").is_some());
        assert!(api.payload("q", false).get("tools").is_none());
    }
}
