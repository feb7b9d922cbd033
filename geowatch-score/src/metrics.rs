//! Run-level metric math.
//!
//! Pure over `(citations, target_domains)`: no store, no clock, no
//! randomness. Positions are 0-based, so lower is better.

use geowatch_core::{Citation, QueryId, host_matches_any};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A citation attributed to the query that produced it.
#[derive(Debug, Clone)]
pub struct AttributedCitation {
    pub query_id: QueryId,
    pub citation: Citation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetrics {
    pub citation_count: u64,
    pub target_citation_count: u64,
    /// Share of distinct queries with at least one target citation.
    pub visibility_rate: f64,
    /// Mean 0-based position over target citations; 0 when there are none.
    pub avg_citation_position: f64,
    /// Share of target citations landing in the top three positions.
    pub top3_rate: f64,
    /// Share of all citations pointing somewhere other than a target.
    pub competitor_share: f64,
    pub position_score: f64,
    /// Weighted 0–100 composite.
    pub health_score: f64,
}

impl RunMetrics {
    pub fn zero() -> Self {
        Self {
            citation_count: 0,
            target_citation_count: 0,
            visibility_rate: 0.0,
            avg_citation_position: 0.0,
            top3_rate: 0.0,
            competitor_share: 0.0,
            position_score: 0.0,
            health_score: 0.0,
        }
    }

    /// Integer form denormalized onto the run row.
    pub fn health_score_int(&self) -> i64 {
        self.health_score.round().clamp(0.0, 100.0) as i64
    }
}

fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

/// Compute the scorecard for one run's citations against the project's
/// target domains. A citation counts as target if it was flagged at crawl
/// time or its host matches the current domain set.
pub fn calculate_metrics(
    citations: &[AttributedCitation],
    target_domains: &BTreeSet<String>,
) -> RunMetrics {
    if citations.is_empty() {
        return RunMetrics::zero();
    }

    let distinct_queries: BTreeSet<QueryId> = citations.iter().map(|c| c.query_id).collect();
    let total_queries = distinct_queries.len().max(1);

    let targets: Vec<&AttributedCitation> = citations
        .iter()
        .filter(|c| {
            c.citation.is_target_domain || host_matches_any(&c.citation.host, target_domains)
        })
        .collect();
    let target_count = targets.len();

    let queries_with_target: BTreeSet<QueryId> = targets.iter().map(|c| c.query_id).collect();
    let visibility_rate = queries_with_target.len() as f64 / total_queries as f64;

    let avg_position = if targets.is_empty() {
        0.0
    } else {
        targets
            .iter()
            .map(|c| c.citation.position as f64)
            .sum::<f64>()
            / target_count as f64
    };

    let top3_rate = if target_count > 0 {
        targets.iter().filter(|c| c.citation.position < 3).count() as f64 / target_count as f64
    } else {
        0.0
    };

    let competitor_share = (citations.len() - target_count) as f64 / citations.len() as f64;

    let position_score = if targets.is_empty() {
        1.0
    } else {
        (1.0 - avg_position / 10.0).max(0.0)
    };

    let health_score = (visibility_rate * 40.0
        + position_score * 30.0
        + top3_rate * 20.0
        + (1.0 - competitor_share) * 10.0)
        .clamp(0.0, 100.0);

    RunMetrics {
        citation_count: citations.len() as u64,
        target_citation_count: target_count as u64,
        visibility_rate: round_to(visibility_rate, 4),
        avg_citation_position: round_to(avg_position, 2),
        top3_rate: round_to(top3_rate, 4),
        competitor_share: round_to(competitor_share, 4),
        position_score: round_to(position_score, 4),
        health_score: round_to(health_score, 2),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn targets(domains: &[&str]) -> BTreeSet<String> {
        domains.iter().map(|d| d.to_string()).collect()
    }

    fn cite(query_id: QueryId, position: u32, host: &str) -> AttributedCitation {
        AttributedCitation {
            query_id,
            citation: Citation::new(position, format!("https://{host}/p{position}"), host),
        }
    }

    #[test]
    fn zero_citations_zero_everything() {
        let metrics = calculate_metrics(&[], &targets(&["example.com"]));
        assert_eq!(metrics, RunMetrics::zero());
        assert_eq!(metrics.health_score_int(), 0);
    }

    #[test]
    fn all_target_top_positions() {
        // Two queries, three citations each, every host a target domain.
        let q1 = QueryId::new();
        let q2 = QueryId::new();
        let citations: Vec<AttributedCitation> = [q1, q2]
            .iter()
            .flat_map(|q| (0..3).map(|p| cite(*q, p, "example.com")))
            .collect();

        let m = calculate_metrics(&citations, &targets(&["example.com"]));
        assert_eq!(m.visibility_rate, 1.0);
        assert_eq!(m.avg_citation_position, 1.0);
        assert_eq!(m.top3_rate, 1.0);
        assert_eq!(m.competitor_share, 0.0);
        assert_eq!(m.position_score, 0.9);
        assert_eq!(m.health_score, 97.0);
        assert_eq!(m.health_score_int(), 97);
    }

    #[test]
    fn mixed_queries_partial_visibility() {
        // Four queries: two with one target citation at position 0 among five
        // citations, two with four competitor citations each.
        let with_target: Vec<QueryId> = (0..2).map(|_| QueryId::new()).collect();
        let without: Vec<QueryId> = (0..2).map(|_| QueryId::new()).collect();

        let mut citations = Vec::new();
        for q in &with_target {
            citations.push(cite(*q, 0, "example.com"));
            for p in 1..5 {
                citations.push(cite(*q, p, "competitor.net"));
            }
        }
        for q in &without {
            for p in 0..4 {
                citations.push(cite(*q, p, "competitor.net"));
            }
        }

        let m = calculate_metrics(&citations, &targets(&["example.com"]));
        assert_eq!(m.citation_count, 18);
        assert_eq!(m.target_citation_count, 2);
        assert_eq!(m.visibility_rate, 0.5);
        assert_eq!(m.avg_citation_position, 0.0);
        assert_eq!(m.top3_rate, 1.0);
        assert_eq!(m.competitor_share, 0.8889);
        assert_eq!(m.position_score, 1.0);
        assert!((m.health_score - 71.11).abs() < 0.01);
    }

    #[test]
    fn suffix_hosts_count_as_target() {
        let q = QueryId::new();
        let citations = vec![
            cite(q, 0, "blog.example.com"),
            cite(q, 1, "counterexample.com"),
        ];
        let m = calculate_metrics(&citations, &targets(&["example.com"]));
        assert_eq!(m.target_citation_count, 1);
        assert_eq!(m.competitor_share, 0.5);
    }

    #[test]
    fn crawl_time_flag_is_honored() {
        let q = QueryId::new();
        let mut flagged = cite(q, 0, "mirror.example-cdn.net");
        flagged.citation.is_target_domain = true;
        let m = calculate_metrics(&[flagged], &targets(&["example.com"]));
        assert_eq!(m.target_citation_count, 1);
    }

    #[test]
    fn no_targets_still_scores_positioning() {
        let q = QueryId::new();
        let citations = vec![cite(q, 0, "other.net"), cite(q, 1, "another.net")];
        let m = calculate_metrics(&citations, &targets(&["example.com"]));
        assert_eq!(m.visibility_rate, 0.0);
        assert_eq!(m.position_score, 1.0);
        assert_eq!(m.competitor_share, 1.0);
        // 0·40 + 1·30 + 0·20 + 0·10
        assert_eq!(m.health_score, 30.0);
    }

    #[test]
    fn order_of_equivalent_citations_does_not_matter() {
        let q1 = QueryId::new();
        let q2 = QueryId::new();
        let mut citations = vec![
            cite(q1, 0, "example.com"),
            cite(q1, 1, "competitor.net"),
            cite(q2, 2, "example.com"),
            cite(q2, 0, "competitor.net"),
        ];
        let forward = calculate_metrics(&citations, &targets(&["example.com"]));
        citations.reverse();
        let reversed = calculate_metrics(&citations, &targets(&["example.com"]));
        assert_eq!(forward, reversed);
    }
}
