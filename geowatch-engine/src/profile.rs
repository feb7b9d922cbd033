//! The engine registry: everything protocol-specific lives here as data.
//!
//! One profile per engine — chat URL, selector priority lists, completion
//! hints, citation rules, optional web-search toggle — consumed by the one
//! shared pipeline in [`crate::pipeline`]. Selectors are ordered most-specific
//! first; engines ship hashed class names, so `[class*=...]` patterns carry
//! most of the weight.

use geowatch_core::Engine;

/// Stop buttons and streaming indicators shared across chat engines.
pub const COMMON_GENERATING_SELECTORS: &[&str] = &[
    "button[aria-label*=\"停止\"]",
    "button[aria-label*=\"Stop\"]",
    "[class*=\"loading\"]",
    "[class*=\"typing\"]",
    "[class*=\"generating\"]",
    "[class*=\"streaming\"]",
    "[class*=\"thinking\"]",
    ".animate-pulse",
    "[class*=\"cursor-blink\"]",
];

/// Phrases that mean the model is asking for more detail instead of
/// answering. Checked against responses under 1000 chars only; real answers
/// quote these words too.
pub const CLARIFICATION_PATTERNS: &[&str] = &[
    "请告诉我",
    "请问",
    "您可以告诉",
    "能告诉我",
    "想了解",
    "您的需求",
    "您的预算",
    "核心需求",
    "具体需求",
    "可以提供",
    "更多信息",
    "详细说明",
    "what would you like",
    "could you tell me",
    "what are your",
];

/// Canned follow-up that pushes the model to answer with what it has.
pub const FOLLOWUP_MESSAGE: &str = "不需要更多信息，请直接给出完整的推荐和建议。";

/// Enabled-state attributes probed before clicking a web-search toggle.
pub const TOGGLE_STATE_ATTRS: &[&str] = &["aria-checked", "data-state", "aria-pressed"];

#[derive(Debug)]
pub struct EngineProfile {
    pub engine: Engine,
    pub chat_url: &'static str,
    /// Search-style engines take the query in the URL instead of a chat box.
    pub query_in_url: bool,
    pub input_selectors: &'static [&'static str],
    pub send_selectors: &'static [&'static str],
    pub response_selectors: &'static [&'static str],
    pub citation_selectors: &'static [&'static str],
    pub extra_generating_selectors: &'static [&'static str],
    pub web_search_toggles: &'static [&'static str],
    pub login_keywords: &'static [&'static str],
    /// Links on these hosts are the engine's own chrome, never citations.
    pub own_hosts: &'static [&'static str],
    /// Prepended to the query to cut down clarifying turns.
    pub query_preamble: Option<&'static str>,
    pub supports_clarification_loop: bool,
    /// Chrome text stripped from the JS body-scan fallback.
    pub chrome_strings: &'static [&'static str],
}

const PERPLEXITY: EngineProfile = EngineProfile {
    engine: Engine::Perplexity,
    chat_url: "https://www.perplexity.ai",
    query_in_url: false,
    input_selectors: &[
        "textarea[placeholder*=\"Ask\"]",
        "textarea[placeholder*=\"ask\"]",
        "textarea[placeholder*=\"Search\"]",
        "textarea[placeholder*=\"搜索\"]",
        "textarea[placeholder*=\"anything\"]",
        "textarea[autofocus]",
        "[data-testid=\"search-input\"]",
        "textarea.grow",
        "div[contenteditable=\"true\"]",
        "textarea",
    ],
    send_selectors: &["button[aria-label*=\"Submit\"]", "button[type=\"submit\"]"],
    response_selectors: &[
        "[class*=\"prose\"]",
        "[class*=\"markdown\"]",
        "[class*=\"response\"]",
        "[class*=\"answer\"]",
        "[class*=\"result\"]",
        "article",
    ],
    citation_selectors: &[
        "[class*=\"citation\"] a",
        "[class*=\"source\"] a",
        "[class*=\"reference\"] a",
        "[class*=\"prose\"] a[href^=\"http\"]",
        "[data-testid*=\"source\"] a",
    ],
    extra_generating_selectors: &[],
    web_search_toggles: &[],
    login_keywords: &["Sign in", "Log in", "登录"],
    own_hosts: &["perplexity.ai"],
    query_preamble: None,
    supports_clarification_loop: false,
    chrome_strings: &["Ask anything"],
};

const QWEN: EngineProfile = EngineProfile {
    engine: Engine::Qwen,
    chat_url: "https://tongyi.aliyun.com/qianwen",
    query_in_url: false,
    input_selectors: &["textarea", "[contenteditable=\"true\"]", "input[type=\"text\"]"],
    send_selectors: &["button[type=\"submit\"]", "[class*=\"send\"]"],
    response_selectors: &[
        "[class*=\"message\"]",
        "[class*=\"response\"]",
        "[class*=\"answer\"]",
        "[class*=\"content\"]",
    ],
    citation_selectors: &[
        "[class*=\"source\"] a",
        "[class*=\"reference\"] a",
        "[class*=\"citation\"] a",
        "[class*=\"search-result\"] a",
        "[class*=\"link-preview\"] a",
        "[class*=\"footnote\"] a",
        "[class*=\"message\"] a[href^=\"http\"]",
        "[class*=\"answer\"] a[href^=\"http\"]",
    ],
    extra_generating_selectors: &[],
    web_search_toggles: &[
        "button[aria-label*=\"联网\"]",
        "button[aria-label*=\"搜索\"]",
        "[class*=\"search-toggle\"]",
        "[class*=\"web-search\"]",
        "[data-testid*=\"search\"]",
        "[class*=\"internet\"]",
        "[role=\"switch\"]",
    ],
    login_keywords: &["登录", "请登录", "Sign in"],
    own_hosts: &["aliyun.com", "tongyi.aliyun.com", "taobao.com"],
    query_preamble: None,
    supports_clarification_loop: false,
    chrome_strings: &["通义千问"],
};

const DEEPSEEK: EngineProfile = EngineProfile {
    engine: Engine::DeepSeek,
    chat_url: "https://chat.deepseek.com",
    query_in_url: false,
    input_selectors: &["textarea", "[contenteditable=\"true\"]"],
    send_selectors: &["button[type=\"submit\"]", "[class*=\"send\"]"],
    response_selectors: &[
        "[class*=\"ds-markdown\"]",
        "[class*=\"markdown-body\"]",
        "[class*=\"message-content\"]",
        "[class*=\"prose\"]",
        "[class*=\"response\"]",
        "[class*=\"answer-content\"]",
    ],
    citation_selectors: &[
        "[class*=\"source\"] a",
        "[class*=\"reference\"] a",
        "[class*=\"citation\"] a",
        "[class*=\"refs\"] a",
        "[class*=\"search-result\"] a",
        "[class*=\"result-item\"] a",
        "[class*=\"web-result\"] a",
        "[class*=\"link-card\"] a",
        "[class*=\"footnote\"] a",
        "[class*=\"markdown\"] a[href^=\"http\"]",
        "[class*=\"message\"] a[href^=\"http\"]",
    ],
    extra_generating_selectors: &["[class*=\"thinking\"]:not([class*=\"done\"])"],
    web_search_toggles: &[
        "button[aria-label*=\"联网\"]",
        "button[aria-label*=\"搜索\"]",
        "button[aria-label*=\"Search\"]",
        "[class*=\"web-search-toggle\"]",
        "[class*=\"search-btn\"]",
        "button[class*=\"search\"]",
        "[role=\"switch\"]",
        "[title*=\"联网\"]",
    ],
    login_keywords: &["登录", "Sign in", "Login", "注册", "Sign up"],
    own_hosts: &["deepseek.com"],
    query_preamble: Some("直接回答以下问题，不要询问更多信息，给出完整建议："),
    supports_clarification_loop: true,
    chrome_strings: &["给 DeepSeek 发送消息", "深度思考"],
};

const KIMI: EngineProfile = EngineProfile {
    engine: Engine::Kimi,
    chat_url: "https://kimi.moonshot.cn",
    query_in_url: false,
    input_selectors: &["textarea", "[contenteditable=\"true\"]"],
    send_selectors: &["button[type=\"submit\"]", "[class*=\"send\"]"],
    response_selectors: &[
        "[class*=\"markdown\"]",
        "[class*=\"message-content\"]",
        "[class*=\"response\"]",
        "[class*=\"answer\"]",
    ],
    citation_selectors: &[
        "[class*=\"source\"] a",
        "[class*=\"reference\"] a",
        "[class*=\"citation\"] a",
        "[class*=\"link-card\"] a",
        "[class*=\"markdown\"] a[href^=\"http\"]",
    ],
    extra_generating_selectors: &[],
    web_search_toggles: &[
        "button[aria-label*=\"联网\"]",
        "[class*=\"web-search\"]",
        "[role=\"switch\"]",
    ],
    login_keywords: &["登录", "Sign in", "注册"],
    own_hosts: &["kimi.moonshot.cn", "moonshot.cn"],
    query_preamble: None,
    supports_clarification_loop: true,
    chrome_strings: &["Kimi"],
};

const CHATGPT: EngineProfile = EngineProfile {
    engine: Engine::ChatGpt,
    chat_url: "https://chatgpt.com",
    query_in_url: false,
    input_selectors: &[
        "#prompt-textarea",
        "textarea[data-id=\"root\"]",
        "textarea[placeholder*=\"Message\"]",
        "textarea[placeholder*=\"消息\"]",
        "textarea",
        "[contenteditable=\"true\"]",
    ],
    send_selectors: &[
        "button[data-testid=\"send-button\"]",
        "button[aria-label*=\"Send\"]",
    ],
    response_selectors: &[
        "[data-message-author-role=\"assistant\"]",
        "[class*=\"markdown\"]",
        "[class*=\"prose\"]",
        "[class*=\"agent-turn\"]",
    ],
    citation_selectors: &[
        "[class*=\"citation\"] a",
        "[class*=\"source\"] a",
        "[data-message-author-role=\"assistant\"] a[href^=\"http\"]",
        "[class*=\"markdown\"] a[href^=\"http\"]",
    ],
    extra_generating_selectors: &["button[aria-label*=\"Stop streaming\"]"],
    web_search_toggles: &[],
    login_keywords: &["Log in", "Sign up", "登录", "注册", "Welcome to ChatGPT"],
    own_hosts: &["chatgpt.com", "openai.com", "oaistatic.com"],
    query_preamble: None,
    supports_clarification_loop: true,
    chrome_strings: &["ChatGPT can make mistakes"],
};

const DOUBAO: EngineProfile = EngineProfile {
    engine: Engine::Doubao,
    chat_url: "https://www.doubao.com/chat",
    query_in_url: false,
    input_selectors: &[
        "textarea[placeholder*=\"输入\"]",
        "textarea[placeholder*=\"问\"]",
        "textarea",
        "[contenteditable=\"true\"]",
        "input[type=\"text\"]",
    ],
    send_selectors: &["button[type=\"submit\"]", "[class*=\"send\"]"],
    response_selectors: &[
        "[class*=\"message-content\"]",
        "[class*=\"markdown\"]",
        "[class*=\"response\"]",
        "[class*=\"answer\"]",
        "[class*=\"bot-message\"]",
    ],
    // Conversational assistant; rarely cites, but keep the generic rails.
    citation_selectors: &[
        "[class*=\"source\"] a",
        "[class*=\"reference\"] a",
        "[class*=\"message-content\"] a[href^=\"http\"]",
    ],
    extra_generating_selectors: &[],
    web_search_toggles: &[],
    login_keywords: &["登录", "注册", "Login", "Sign"],
    own_hosts: &["doubao.com", "bytedance.com"],
    query_preamble: None,
    supports_clarification_loop: true,
    chrome_strings: &["豆包"],
};

const CHATGLM: EngineProfile = EngineProfile {
    engine: Engine::ChatGlm,
    chat_url: "https://chatglm.cn",
    query_in_url: false,
    input_selectors: &[
        "textarea[placeholder*=\"输入\"]",
        "textarea[placeholder*=\"问\"]",
        "textarea",
        "[contenteditable=\"true\"]",
    ],
    send_selectors: &["button[type=\"submit\"]", "[class*=\"send\"]"],
    response_selectors: &[
        "[class*=\"markdown\"]",
        "[class*=\"message-content\"]",
        "[class*=\"answer\"]",
        "[class*=\"response\"]",
    ],
    citation_selectors: &[
        "[class*=\"source\"] a",
        "[class*=\"reference\"] a",
        "[class*=\"citation\"] a",
        "[class*=\"markdown\"] a[href^=\"http\"]",
    ],
    extra_generating_selectors: &[],
    web_search_toggles: &[],
    login_keywords: &["登录", "注册", "Login", "Sign in"],
    own_hosts: &["chatglm.cn", "zhipuai.cn", "bigmodel.cn"],
    query_preamble: None,
    supports_clarification_loop: true,
    chrome_strings: &["智谱清言"],
};

const GOOGLE_SGE: EngineProfile = EngineProfile {
    engine: Engine::GoogleSge,
    chat_url: "https://www.google.com/search?q=",
    query_in_url: true,
    input_selectors: &[],
    send_selectors: &[],
    response_selectors: &[
        "[class*=\"ai-overview\"]",
        "[class*=\"AIOverview\"]",
        "[class*=\"featured-snippet\"]",
        "[class*=\"kp-wholepage\"]",
        "#rso [class*=\"g\"] [data-attrid]",
    ],
    citation_selectors: &[
        "#rso a[href^=\"http\"]",
        "[data-attrid] a[href^=\"http\"]",
    ],
    extra_generating_selectors: &[],
    web_search_toggles: &[],
    login_keywords: &[],
    own_hosts: &["google.com", "gstatic.com", "googleusercontent.com"],
    query_preamble: None,
    supports_clarification_loop: false,
    chrome_strings: &["People also ask"],
};

const BING_COPILOT: EngineProfile = EngineProfile {
    engine: Engine::BingCopilot,
    chat_url: "https://www.bing.com/chat",
    query_in_url: false,
    input_selectors: &[
        "textarea[placeholder*=\"Ask\"]",
        "textarea[placeholder*=\"问\"]",
        "textarea[name=\"q\"]",
        "[class*=\"chat-input\"] textarea",
        "textarea",
    ],
    send_selectors: &[
        "button[type=\"submit\"]",
        "button[aria-label*=\"Submit\"]",
        "[class*=\"submit\"]",
    ],
    response_selectors: &[
        "[class*=\"response-content\"]",
        "[class*=\"message-content\"]",
        "[class*=\"bot-response\"]",
        "[class*=\"cib-message\"]",
        "[class*=\"markdown\"]",
        "[class*=\"prose\"]",
    ],
    citation_selectors: &[
        "[class*=\"citation\"] a",
        "[class*=\"source\"] a",
        "[class*=\"reference\"] a",
        "[class*=\"learn-more\"] a",
    ],
    extra_generating_selectors: &[],
    web_search_toggles: &[],
    login_keywords: &["Sign in", "登录"],
    own_hosts: &["bing.com", "microsoft.com", "msn.com"],
    query_preamble: None,
    supports_clarification_loop: false,
    chrome_strings: &["Copilot"],
};

/// Look up the profile for an engine. Total over the closed engine set.
pub fn profile(engine: Engine) -> &'static EngineProfile {
    match engine {
        Engine::Perplexity => &PERPLEXITY,
        Engine::Qwen => &QWEN,
        Engine::DeepSeek => &DEEPSEEK,
        Engine::Kimi => &KIMI,
        Engine::ChatGpt => &CHATGPT,
        Engine::Doubao => &DOUBAO,
        Engine::ChatGlm => &CHATGLM,
        Engine::GoogleSge => &GOOGLE_SGE,
        Engine::BingCopilot => &BING_COPILOT,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_engine_has_a_profile() {
        for engine in Engine::ALL {
            let p = profile(engine);
            assert_eq!(p.engine, engine);
            assert!(p.chat_url.starts_with("https://"));
            assert!(!p.own_hosts.is_empty());
            assert!(!p.response_selectors.is_empty());
            if !p.query_in_url {
                assert!(!p.input_selectors.is_empty(), "{engine} needs input selectors");
            }
        }
    }

    #[test]
    fn deepseek_carries_the_direct_answer_preamble() {
        let p = profile(Engine::DeepSeek);
        assert!(p.query_preamble.unwrap().contains("直接回答"));
        assert!(p.supports_clarification_loop);
    }

    #[test]
    fn search_engines_take_the_query_in_the_url() {
        assert!(profile(Engine::GoogleSge).query_in_url);
        assert!(!profile(Engine::BingCopilot).query_in_url);
    }

    #[test]
    fn web_search_toggles_exist_where_expected() {
        for engine in [Engine::Qwen, Engine::DeepSeek, Engine::Kimi] {
            assert!(
                !profile(engine).web_search_toggles.is_empty(),
                "{engine} should expose a web-search toggle"
            );
        }
        assert!(profile(Engine::Perplexity).web_search_toggles.is_empty());
    }
}
