//! Batch match orchestration.
//!
//! Phases per batch:
//! 1. Group duplicate inputs
//! 2. Per group: build queries, search each (paced), pool unique candidates,
//!    keep the best-scoring one
//! 3. Choose the acceptance threshold from all best scores
//! 4. Emit one result per input: representative, then its duplicates

use rustc_hash::FxHashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::catalog::SearchCatalog;
use crate::config::MatchConfig;
use crate::error::Result;
use crate::grouping::group_duplicates;
use crate::models::{BatchOutcome, DuplicateGroup, LocalTrack, MatchResult, ScoredCandidate};
use crate::query::build_queries;
use crate::scoring::score_candidate;
use crate::threshold::{choose_threshold, match_rate};

/// Receives `(current, total)` after each processed group.
pub trait ProgressSink: Send + Sync {
    fn group_scored(&self, current: usize, total: usize);
}

impl<F> ProgressSink for F
where
    F: Fn(usize, usize) + Send + Sync,
{
    fn group_scored(&self, current: usize, total: usize) {
        self(current, total)
    }
}

pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn group_scored(&self, _current: usize, _total: usize) {}
}

#[derive(Clone)]
pub struct Matcher {
    catalog: Arc<dyn SearchCatalog>,
    config: Arc<MatchConfig>,
}

impl Matcher {
    pub fn new(catalog: Arc<dyn SearchCatalog>, config: Arc<MatchConfig>) -> Self {
        Self { catalog, config }
    }

    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    pub fn group(&self, tracks: &[LocalTrack]) -> Vec<DuplicateGroup> {
        group_duplicates(tracks, &self.config.grouping)
    }

    /// Match a whole batch. Fails only on authorization errors.
    pub async fn match_batch(
        &self,
        tracks: &[LocalTrack],
        progress: &dyn ProgressSink,
    ) -> Result<BatchOutcome> {
        let groups = self.group(tracks);
        self.match_groups(&groups, tracks.len(), progress).await
    }

    /// Match pre-computed groups covering `input_len` tracks.
    pub async fn match_groups(
        &self,
        groups: &[DuplicateGroup],
        input_len: usize,
        progress: &dyn ProgressSink,
    ) -> Result<BatchOutcome> {
        let total = groups.len();
        info!(
            "Matching {} tracks in {} groups against {}",
            input_len,
            total,
            self.catalog.name()
        );

        let mut best: Vec<Option<ScoredCandidate>> = Vec::with_capacity(total);
        let mut searched_once = false;

        for (i, group) in groups.iter().enumerate() {
            best.push(self.best_candidate(&group.representative, &mut searched_once).await?);
            progress.group_scored(i + 1, total);
        }

        let scores: Vec<f64> = best
            .iter()
            .map(|b| b.as_ref().map_or(0.0, |s| s.score))
            .collect();
        let threshold = choose_threshold(
            &scores,
            &self.config.threshold.ladder,
            self.config.threshold.min_match_rate,
        );
        info!(
            "Threshold {:.2} (match rate {:.1}%)",
            threshold,
            100.0 * match_rate(&scores, threshold)
        );

        let mut results = Vec::with_capacity(input_len);
        for (group, best) in groups.iter().zip(best) {
            let rep = group.representative_index();
            let dups = group.duplicate_count();
            results.push(match best {
                Some(hit) if hit.score >= threshold => {
                    MatchResult::matched(&hit.candidate, hit.score, dups, rep)
                }
                Some(hit) => MatchResult::unmatched(hit.score, dups, rep),
                None => MatchResult::unmatched(0.0, dups, rep),
            });
            results.extend(group.duplicate_indices().iter().map(|&i| MatchResult::duplicate(i)));
        }

        Ok(BatchOutcome { results, threshold })
    }

    /// Search every query variant and keep the strict maximum score.
    async fn best_candidate(
        &self,
        track: &LocalTrack,
        searched_once: &mut bool,
    ) -> Result<Option<ScoredCandidate>> {
        let queries = build_queries(track, self.config.queries.max_queries);
        let delay = self.config.search.delay();
        let mut seen: FxHashSet<String> = FxHashSet::default();
        let mut best: Option<ScoredCandidate> = None;

        for query in &queries {
            if *searched_once && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            *searched_once = true;

            let candidates = match self.catalog.search(query).await {
                Ok(candidates) => candidates,
                Err(e) if e.is_authorization() => return Err(e),
                Err(e) => {
                    warn!("Search {:?} failed, skipping: {}", query, e);
                    if let Some(wait) = self.config.search.rate_limit_wait(&e) {
                        info!("Rate limited, waiting {}s", wait.as_secs());
                        tokio::time::sleep(wait).await;
                    }
                    continue;
                }
            };
            debug!("Query {:?}: {} candidates", query, candidates.len());

            for candidate in candidates {
                if !seen.insert(candidate.id.clone()) {
                    continue;
                }
                let score = score_candidate(track, &candidate, &self.config.scoring);
                if best.as_ref().map_or(true, |b| score > b.score) {
                    best = Some(ScoredCandidate { candidate, score });
                }
            }
        }

        Ok(best)
    }
}
