//! Streaming-completion detection.
//!
//! Two signals, whichever fires first: the answer text has stopped growing
//! while no stop button is visible, or the citation list has stabilized with
//! no stop button. Engines stream token by token and some keep spinners up
//! forever, so a long-stability fallback returns whatever exists rather than
//! spinning to the hard deadline.

use crate::extract::{extract_citations, extract_text};
use crate::profile::{COMMON_GENERATING_SELECTORS, EngineProfile};
use geowatch_browser::Page;
use geowatch_core::Citation;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(120);
pub const WEB_SEARCH_MAX_WAIT: Duration = Duration::from_secs(180);

const POLL: Duration = Duration::from_secs(2);
/// Polls of identical text before the answer counts as finished (~6 s).
const TEXT_STABLE_POLLS: u32 = 3;
/// Polls without a generating indicator before citations alone count (~6 s).
const QUIET_POLLS_FOR_CITATIONS: u32 = 3;
/// Polls without a generating indicator before giving up and returning
/// whatever text exists (~30 s).
const QUIET_POLLS_FALLBACK: u32 = 15;

#[derive(Debug, Default)]
pub struct Completion {
    pub text: String,
    pub citations: Vec<Citation>,
    pub timed_out: bool,
}

async fn is_generating(page: &dyn Page, profile: &EngineProfile) -> bool {
    for selector in COMMON_GENERATING_SELECTORS
        .iter()
        .chain(profile.extra_generating_selectors)
    {
        if page.exists_visible(selector).await.unwrap_or(false) {
            debug!(selector, "engine still generating");
            return true;
        }
    }
    false
}

/// Poll until the answer is complete or `max_wait` elapses. Returns the best
/// text and citations seen either way; `timed_out` marks a hard-deadline
/// exit with the answer still growing.
pub async fn wait_for_completion(
    page: &dyn Page,
    profile: &EngineProfile,
    max_wait: Duration,
) -> Completion {
    let started = tokio::time::Instant::now();
    let mut last_text = String::new();
    let mut last_len = 0usize;
    let mut stable_polls = 0u32;
    let mut quiet_polls = 0u32;

    while started.elapsed() < max_wait {
        if is_generating(page, profile).await {
            stable_polls = 0;
            quiet_polls = 0;
            tokio::time::sleep(POLL).await;
            continue;
        }
        quiet_polls += 1;

        if quiet_polls >= QUIET_POLLS_FOR_CITATIONS {
            let citations = extract_citations(page, profile).await;
            if !citations.is_empty() {
                let text = extract_text(page, profile).await;
                debug!(citations = citations.len(), "citations stabilized, answer complete");
                return Completion {
                    text,
                    citations,
                    timed_out: false,
                };
            }
        }

        let text = extract_text(page, profile).await;
        let len = text.chars().count();

        if len > 50 {
            if len > last_len + 10 {
                debug!(from = last_len, to = len, "answer still growing");
                last_len = len;
                last_text = text;
                stable_polls = 0;
            } else if text == last_text {
                stable_polls += 1;
                if stable_polls >= TEXT_STABLE_POLLS {
                    debug!(len, "answer stabilized");
                    return Completion {
                        citations: extract_citations(page, profile).await,
                        text,
                        timed_out: false,
                    };
                }
            } else {
                last_len = len;
                last_text = text;
                stable_polls = 0;
            }
        } else if len > 0 {
            last_len = len;
            last_text = text;
        }

        if quiet_polls >= QUIET_POLLS_FALLBACK {
            debug!("page quiet for an extended period, taking what exists");
            return Completion {
                citations: extract_citations(page, profile).await,
                text: last_text,
                timed_out: false,
            };
        }

        tokio::time::sleep(POLL).await;
    }

    Completion {
        citations: extract_citations(page, profile).await,
        text: last_text,
        timed_out: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::profile;
    use geowatch_browser::LinkInfo;
    use geowatch_browser::testing::ScriptedPage;
    use geowatch_core::Engine;

    fn long_answer() -> String {
        "这是一段完整的回答内容，包含足够多的文字来通过长度判断。".repeat(4)
    }

    #[tokio::test(start_paused = true)]
    async fn stable_text_completes() {
        let p = profile(Engine::Kimi);
        let page = ScriptedPage::new()
            .with_texts("[class*=\"markdown\"]", vec![long_answer()]);
        let done = wait_for_completion(&page, p, DEFAULT_MAX_WAIT).await;
        assert!(!done.timed_out);
        assert_eq!(done.text, long_answer());
    }

    #[tokio::test(start_paused = true)]
    async fn citations_short_circuit_without_text() {
        let p = profile(Engine::DeepSeek);
        let page = ScriptedPage::new().with_links(
            "[class*=\"source\"] a",
            vec![LinkInfo {
                href: "https://example.net/ref".into(),
                text: "Reference article".into(),
                ..Default::default()
            }],
        );
        let done = wait_for_completion(&page, p, DEFAULT_MAX_WAIT).await;
        assert!(!done.timed_out);
        assert_eq!(done.citations.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn visible_stop_button_keeps_waiting_until_deadline() {
        let p = profile(Engine::Kimi);
        let page = ScriptedPage::new()
            .with_visible(["button[aria-label*=\"Stop\"]"])
            .with_texts("[class*=\"markdown\"]", vec![long_answer()]);
        let done = wait_for_completion(&page, p, Duration::from_secs(10)).await;
        assert!(done.timed_out);
    }

    #[tokio::test(start_paused = true)]
    async fn quiet_page_with_no_answer_returns_empty_after_fallback() {
        let p = profile(Engine::ChatGlm);
        let page = ScriptedPage::new();
        let done = wait_for_completion(&page, p, DEFAULT_MAX_WAIT).await;
        assert!(!done.timed_out);
        assert!(done.text.is_empty());
    }
}
