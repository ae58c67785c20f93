//! Batch summaries and post-match filtering.

use rustc_hash::FxHashSet;
use serde::Serialize;
use tracing::info;

use crate::models::MatchResult;

/// Summary of one results list.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub inputs: usize,
    pub groups: usize,
    pub duplicates: usize,
    pub matched: usize,
    pub unmatched: usize,
    /// Matched groups over all groups.
    pub match_rate: f64,
    pub mean_matched_score: Option<f64>,
    pub threshold: Option<f64>,
}

impl BatchReport {
    pub fn from_results(results: &[MatchResult], threshold: Option<f64>) -> Self {
        let duplicates = results.iter().filter(|r| r.is_duplicate).count();
        let groups = results.len() - duplicates;
        let matched_scores: Vec<f64> = results
            .iter()
            .filter(|r| r.matched && !r.is_duplicate)
            .map(|r| r.score)
            .collect();
        let matched = matched_scores.len();

        Self {
            inputs: results.len(),
            groups,
            duplicates,
            matched,
            unmatched: groups - matched,
            match_rate: if groups == 0 {
                0.0
            } else {
                matched as f64 / groups as f64
            },
            mean_matched_score: if matched == 0 {
                None
            } else {
                Some(matched_scores.iter().sum::<f64>() / matched as f64)
            },
            threshold,
        }
    }

    pub fn log(&self) {
        match serde_json::to_string_pretty(self) {
            Ok(json) => info!("Batch report:\n{}", json),
            Err(_) => info!("Batch report: {:?}", self),
        }
    }
}

/// Up to `limit` representatives that are unmatched or scored below
/// `min_score`, in result order.
pub fn unmatched_samples(results: &[MatchResult], min_score: f64, limit: usize) -> Vec<&MatchResult> {
    results
        .iter()
        .filter(|r| !r.is_duplicate && (!r.matched || r.score < min_score))
        .take(limit)
        .collect()
}

/// Counts produced by `filter_matches`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterSummary {
    pub kept: usize,
    pub rejected_by_score: usize,
    pub without_id: usize,
    pub duplicate_id: usize,
    pub duplicate_placeholders: usize,
}

/// Keep matched representatives scoring at least `min_score`, one per
/// catalog id (first occurrence wins).
pub fn filter_matches(results: &[MatchResult], min_score: f64) -> (Vec<MatchResult>, FilterSummary) {
    let mut summary = FilterSummary::default();
    let mut seen: FxHashSet<&str> = FxHashSet::default();
    let mut kept = Vec::new();

    for result in results {
        if result.is_duplicate {
            summary.duplicate_placeholders += 1;
            continue;
        }
        let Some(id) = result.spotify_id.as_deref().filter(|id| !id.trim().is_empty()) else {
            summary.without_id += 1;
            continue;
        };
        if result.score < min_score {
            summary.rejected_by_score += 1;
            continue;
        }
        if !seen.insert(id) {
            summary.duplicate_id += 1;
            continue;
        }
        kept.push(result.clone());
    }

    summary.kept = kept.len();
    (kept, summary)
}
