//! Citation extraction from API responses: structured vendor fields plus a
//! URL sweep over the answer text, union-deduplicated by URL.

use geowatch_core::Citation;
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;
use url::Url;

static URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"https?://[^\s<>"{}|\\^`\[\])]+"#).expect("static regex")
});

pub(crate) fn host_of(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_lowercase))
        .unwrap_or_else(|| url.to_string())
}

/// Scan free text for URLs. Trailing sentence punctuation is stripped and
/// duplicates keep their first position.
pub fn citations_from_text(text: &str) -> Vec<Citation> {
    let mut citations = Vec::new();
    let mut seen = HashSet::new();

    for m in URL_RE.find_iter(text) {
        let url = m.as_str().trim_end_matches(['.', ',', ';', ':', '!', '?']);
        if !seen.insert(url.to_string()) {
            continue;
        }
        let host = host_of(url);
        let position = citations.len() as u32;
        citations.push(Citation::new(position, url, host.clone()).with_title(host));
    }
    citations
}

/// Structured citations first, then text-derived ones the vendor did not
/// already report. Positions are renumbered to the merged order.
pub fn merge_citations(structured: Vec<Citation>, from_text: Vec<Citation>) -> Vec<Citation> {
    let mut merged = structured;
    let mut seen: HashSet<String> = merged.iter().map(|c| c.url.clone()).collect();

    for citation in from_text {
        if seen.insert(citation.url.clone()) {
            merged.push(citation);
        }
    }
    for (index, citation) in merged.iter_mut().enumerate() {
        citation.position = index as u32;
    }
    merged
}
