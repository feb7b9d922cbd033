//! Per-engine browser adapters.
//!
//! One shared pipeline, one profile per engine. The profile registry is the
//! only place that knows selectors and chat URLs; everything else — challenge
//! handling, completion detection, clarification turns, extraction — is
//! common code.

pub mod completion;
pub mod extract;
pub mod pipeline;
pub mod profile;

pub use completion::{Completion, DEFAULT_MAX_WAIT, WEB_SEARCH_MAX_WAIT, wait_for_completion};
pub use extract::{citation_title, extract_citations, extract_text, is_citation_marker};
pub use pipeline::{BrowserAdapter, CrawlOptions, screenshot_path};
pub use profile::{EngineProfile, FOLLOWUP_MESSAGE, profile};
