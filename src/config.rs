//! Tunable constants of the matching engine.
//!
//! Every section deserializes with defaults, so a config file only needs the
//! values it changes:
//!
//! ```json
//! { "threshold": { "min_match_rate": 0.9 }, "search": { "delay_ms": 200 } }
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{RelinkError, Result};

/// Candidate scoring weights and fallbacks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub title_weight: f64,
    pub artist_weight: f64,
    pub duration_weight: f64,
    /// Added when both sides are remix/edit variants.
    pub remix_bonus: f64,
    /// A local artist token counts as found above this similarity.
    pub artist_accept_similarity: f64,
    /// Artist component used when the local artist is unknown.
    pub unknown_artist_score: f64,
    /// Duration component used when either duration is unknown.
    pub unknown_duration_score: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            title_weight: 0.55,
            artist_weight: 0.35,
            duration_weight: 0.10,
            remix_bonus: 0.05,
            artist_accept_similarity: 0.6,
            unknown_artist_score: 0.5,
            unknown_duration_score: 0.55,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupingConfig {
    /// Same-key tracks closer than this are duplicates.
    pub duplicate_tolerance_ms: u64,
}

impl Default for GroupingConfig {
    fn default() -> Self {
        Self {
            duplicate_tolerance_ms: 3000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    /// Candidate thresholds, highest first.
    pub ladder: Vec<f64>,
    pub min_match_rate: f64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            ladder: vec![0.56, 0.50, 0.45, 0.40, 0.35, 0.30],
            min_match_rate: 0.85,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    pub max_queries: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self { max_queries: 8 }
    }
}

/// Outbound search pacing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Pause between two successive search calls of a batch.
    pub delay_ms: u64,
    /// Candidates requested per query.
    pub limit: usize,
    /// Per-request timeout for HTTP catalogs.
    pub timeout_secs: u64,
    /// Upper bound on a rate-limit `Retry-After` wait.
    pub max_retry_after_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            delay_ms: 120,
            limit: 5,
            timeout_secs: 15,
            max_retry_after_secs: 30,
        }
    }
}

impl SearchConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Pause requested by a rate-limited search, capped. `None` when the
    /// error carries no usable wait.
    pub fn rate_limit_wait(&self, err: &RelinkError) -> Option<Duration> {
        match err {
            RelinkError::RateLimited {
                retry_after: Some(secs),
            } => Some(Duration::from_secs((*secs).min(self.max_retry_after_secs)))
                .filter(|wait| !wait.is_zero()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobConfig {
    /// How long a finished job stays pollable.
    pub retention_secs: u64,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            retention_secs: 300,
        }
    }
}

impl JobConfig {
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    pub scoring: ScoringConfig,
    pub grouping: GroupingConfig,
    pub threshold: ThresholdConfig,
    pub queries: QueryConfig,
    pub search: SearchConfig,
    pub jobs: JobConfig,
}

impl MatchConfig {
    /// Load a JSON config file and validate it.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: MatchConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let s = &self.scoring;
        let weights = [s.title_weight, s.artist_weight, s.duration_weight];
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(RelinkError::Config(
                "scoring weights must be finite and non-negative".to_string(),
            ));
        }
        if weights.iter().sum::<f64>() <= 0.0 {
            return Err(RelinkError::Config(
                "scoring weights must not all be zero".to_string(),
            ));
        }
        for (name, value) in [
            ("artist_accept_similarity", s.artist_accept_similarity),
            ("unknown_artist_score", s.unknown_artist_score),
            ("unknown_duration_score", s.unknown_duration_score),
            ("min_match_rate", self.threshold.min_match_rate),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(RelinkError::Config(format!(
                    "{name} must be within [0, 1], got {value}"
                )));
            }
        }

        let ladder = &self.threshold.ladder;
        if ladder.is_empty() {
            return Err(RelinkError::Config(
                "threshold ladder must not be empty".to_string(),
            ));
        }
        if ladder.iter().any(|t| !(0.0..=1.0).contains(t)) {
            return Err(RelinkError::Config(
                "threshold ladder rungs must be within [0, 1]".to_string(),
            ));
        }
        if ladder.windows(2).any(|w| w[0] <= w[1]) {
            return Err(RelinkError::Config(
                "threshold ladder must be strictly descending".to_string(),
            ));
        }

        if self.queries.max_queries == 0 {
            return Err(RelinkError::Config(
                "max_queries must be at least 1".to_string(),
            ));
        }
        if self.search.limit == 0 {
            return Err(RelinkError::Config(
                "search limit must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
