//! Answer text and citation extraction.
//!
//! Selector-first, with a JS body scan as the fallback for engines that ship
//! hashed class names. Citations dedup by URL in insertion order; titles walk
//! a ladder from link text down to the host, rejecting bare reference
//! markers like `[1]` or `(2)`.

use crate::profile::EngineProfile;
use geowatch_browser::{LinkInfo, Page};
use geowatch_core::Citation;
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;
use tracing::debug;
use url::Url;

const MAX_LINKS_PER_SELECTOR: usize = 30;
const MAX_TITLE_LEN: usize = 200;

static MARKER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\[\]\(\)\-\s\d]+$").expect("static regex"));
static NUMBERED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[?\(?\d+\)?\]?$").expect("static regex"));

/// Whether the text is a bare citation marker ("[2]", "(3)", "- 4", …).
pub fn is_citation_marker(text: &str) -> bool {
    let text = text.trim();
    if text.is_empty() || text.chars().count() <= 3 {
        return true;
    }
    MARKER_RE.is_match(text) || NUMBERED_RE.is_match(text)
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// Title ladder: link text → `title` attribute → `aria-label` → first usable
/// parent line. `None` means the caller should fall back to the host.
pub fn citation_title(link: &LinkInfo) -> Option<String> {
    let text = link.text.trim();
    if !text.is_empty() && !is_citation_marker(text) && text.chars().count() > 3 {
        return Some(truncate_chars(text, MAX_TITLE_LEN));
    }
    if let Some(title) = link.title.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        return Some(truncate_chars(title, MAX_TITLE_LEN));
    }
    if let Some(label) = link
        .aria_label
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
    {
        return Some(truncate_chars(label, MAX_TITLE_LEN));
    }
    if let Some(parent) = link.parent_text.as_deref() {
        for line in parent.lines() {
            let line = line.trim();
            if !line.is_empty() && line.chars().count() > 5 && !is_citation_marker(line) {
                return Some(truncate_chars(line, MAX_TITLE_LEN));
            }
        }
    }
    None
}

fn host_of(url: &str) -> Option<String> {
    Url::parse(url).ok()?.host_str().map(str::to_lowercase)
}

/// Pull citations off the page using the profile's selector list.
///
/// External links only — anything on the engine's own hosts is chrome.
/// Insertion order is preserved and positions are 0-based indexes into it.
pub async fn extract_citations(page: &dyn Page, profile: &EngineProfile) -> Vec<Citation> {
    let mut citations: Vec<Citation> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    for selector in profile.citation_selectors {
        let links = match page.links(selector).await {
            Ok(links) => links,
            Err(err) => {
                debug!(selector, %err, "citation selector failed");
                continue;
            }
        };
        for link in links.into_iter().take(MAX_LINKS_PER_SELECTOR) {
            if !link.href.starts_with("http") {
                continue;
            }
            let Some(host) = host_of(&link.href) else {
                continue;
            };
            if profile
                .own_hosts
                .iter()
                .any(|own| host == *own || host.ends_with(&format!(".{own}")))
            {
                continue;
            }
            if !seen.insert(link.href.clone()) {
                continue;
            }

            let title = citation_title(&link).unwrap_or_else(|| host.clone());
            let position = citations.len() as u32;
            citations.push(
                Citation::new(position, link.href.clone(), host).with_title(title),
            );
        }
    }

    if !citations.is_empty() {
        debug!(engine = %profile.engine, count = citations.len(), "extracted citations");
    }
    citations
}

/// Extract the answer text via the profile's response selectors: look at the
/// trailing elements of the first selector that matches, keep substantial
/// blocks, and return the longest. The user's own (preamble-prefixed) query
/// echo is skipped.
pub async fn extract_text(page: &dyn Page, profile: &EngineProfile) -> String {
    for selector in profile.response_selectors {
        let texts = page.inner_texts(selector).await.unwrap_or_default();
        if texts.is_empty() {
            continue;
        }
        let tail_start = texts.len().saturating_sub(3);
        let mut candidates: Vec<&String> = texts[tail_start..]
            .iter()
            .filter(|t| t.trim().chars().count() > 30)
            .filter(|t| {
                profile
                    .query_preamble
                    .map(|p| !t.trim_start().starts_with(p))
                    .unwrap_or(true)
            })
            .collect();
        if let Some(best) = candidates
            .drain(..)
            .max_by_key(|t| t.chars().count())
        {
            return best.clone();
        }
    }
    String::new()
}

/// Last-ditch extraction when selectors found nothing but the page clearly
/// holds an answer (citations exist): scan the body text, keep substantial
/// lines, and stop at known chrome strings like the input placeholder.
pub async fn extract_body_fallback(page: &dyn Page, profile: &EngineProfile) -> String {
    let body = match page
        .execute_js("return document.body.innerText;")
        .await
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
    {
        Some(body) if body.chars().count() > 200 => body,
        _ => return String::new(),
    };

    let mut content: Vec<&str> = Vec::new();
    let mut in_content = false;
    'lines: for line in body.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if !in_content && line.chars().count() > 30 {
            in_content = true;
        }
        if in_content {
            for chrome in profile.chrome_strings {
                if line.contains(chrome) {
                    break 'lines;
                }
            }
            content.push(line);
            if content.len() >= 50 {
                break;
            }
        }
    }
    content.join("\n")
}
