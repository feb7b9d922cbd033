//! Crawl-result exports: JSON array or CSV, one row per query attempt.

use geowatch_core::{CrawlResult, Result};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
}

impl ExportFormat {
    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("csv") {
            ExportFormat::Csv
        } else {
            ExportFormat::Json
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExportRow {
    pub query: String,
    pub response: String,
    pub engine: String,
    pub citations_count: usize,
    pub citations: Vec<String>,
    pub crawled_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&CrawlResult> for ExportRow {
    fn from(result: &CrawlResult) -> Self {
        Self {
            query: result.query_text.clone(),
            response: result.response_text.clone(),
            engine: result.engine.as_str().to_string(),
            citations_count: result.citations.len(),
            citations: result.citations.iter().map(|c| c.url.clone()).collect(),
            crawled_at: result.crawled_at.to_rfc3339(),
            error: result.error.clone(),
        }
    }
}

/// Render results in the requested format. CSV joins citation URLs with
/// `"; "` into a single column.
pub fn export_results(results: &[CrawlResult], format: ExportFormat) -> Result<String> {
    let rows: Vec<ExportRow> = results.iter().map(ExportRow::from).collect();
    match format {
        ExportFormat::Json => Ok(serde_json::to_string_pretty(&rows)?),
        ExportFormat::Csv => {
            let mut writer = csv::Writer::from_writer(Vec::new());
            writer
                .write_record([
                    "query",
                    "response",
                    "engine",
                    "citations_count",
                    "citations",
                    "crawled_at",
                    "error",
                ])
                .map_err(|e| geowatch_core::GeoError::Internal(e.to_string()))?;
            for row in &rows {
                let record = [
                    row.query.clone(),
                    row.response.clone(),
                    row.engine.clone(),
                    row.citations_count.to_string(),
                    row.citations.join("; "),
                    row.crawled_at.clone(),
                    row.error.clone().unwrap_or_default(),
                ];
                writer
                    .write_record(&record)
                    .map_err(|e| geowatch_core::GeoError::Internal(e.to_string()))?;
            }
            let bytes = writer
                .into_inner()
                .map_err(|e| geowatch_core::GeoError::Internal(e.to_string()))?;
            String::from_utf8(bytes)
                .map_err(|e| geowatch_core::GeoError::Internal(e.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use geowatch_core::{Citation, Engine, QueryId, ResultId, TaskId};

    fn result(query: &str, urls: &[&str], error: Option<&str>) -> CrawlResult {
        CrawlResult {
            id: ResultId::new(),
            task_id: TaskId::new(),
            query_id: QueryId::new(),
            engine: Engine::Perplexity,
            query_text: query.to_string(),
            response_text: "an answer".to_string(),
            citations: urls
                .iter()
                .enumerate()
                .map(|(i, url)| Citation::new(i as u32, *url, "example.com"))
                .collect(),
            raw_html: None,
            screenshot_path: None,
            response_time_ms: Some(1200),
            error: error.map(str::to_string),
            is_complete: error.is_none(),
            has_citations: !urls.is_empty(),
            crawled_at: Utc::now(),
        }
    }

    #[test]
    fn json_export_includes_citation_urls() {
        let results = vec![result("q1", &["https://example.com/a"], None)];
        let json = export_results(&results, ExportFormat::Json).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed[0]["query"], "q1");
        assert_eq!(parsed[0]["citations_count"], 1);
        assert_eq!(parsed[0]["citations"][0], "https://example.com/a");
    }

    #[test]
    fn csv_export_joins_citations() {
        let results = vec![result(
            "q1",
            &["https://example.com/a", "https://example.com/b"],
            Some("partial"),
        )];
        let csv = export_results(&results, ExportFormat::Csv).unwrap();
        let mut lines = csv.lines();
        assert_eq!(
            lines.next().unwrap(),
            "query,response,engine,citations_count,citations,crawled_at,error"
        );
        let row = lines.next().unwrap();
        assert!(row.contains("https://example.com/a; https://example.com/b"));
        assert!(row.contains("partial"));
    }

    #[test]
    fn format_parsing_defaults_to_json() {
        assert_eq!(ExportFormat::parse("CSV"), ExportFormat::Csv);
        assert_eq!(ExportFormat::parse("anything"), ExportFormat::Json);
    }
}
