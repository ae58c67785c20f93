//! Core data models for track matching.
//!
//! Inputs (`LocalTrack`), catalog search hits (`CatalogCandidate`), batch
//! intermediates (`DuplicateGroup`, `ScoredCandidate`) and the pollable
//! outputs (`MatchResult`, `MatchJob`).

use serde::{Deserialize, Serialize};

// ============================================================================
// Inputs
// ============================================================================

/// One local audio file as described by the caller.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LocalTrack {
    pub title: String,
    /// Possibly several artists joined with a delimiter ("A feat. B").
    pub artist: String,
    /// Zero when unknown.
    pub duration_ms: u64,
}

impl LocalTrack {
    pub fn new(title: impl Into<String>, artist: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            title: title.into(),
            artist: artist.into(),
            duration_ms,
        }
    }

    /// No title and no artist: nothing to search for.
    pub fn is_blank(&self) -> bool {
        self.title.trim().is_empty() && self.artist.trim().is_empty()
    }
}

/// Catalog track returned by a search, already mapped out of the provider's
/// wire format.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CatalogCandidate {
    pub id: String,
    pub name: String,
    /// Credited artists in catalog order.
    pub artists: Vec<String>,
    pub duration_ms: u64,
    pub external_url: String,
}

impl CatalogCandidate {
    pub fn artists_joined(&self) -> String {
        self.artists.join(", ")
    }
}

// ============================================================================
// Batch intermediates
// ============================================================================

/// Input tracks judged to be the same recording.
#[derive(Clone, Debug, PartialEq)]
pub struct DuplicateGroup {
    pub representative: LocalTrack,
    /// 1 + number of duplicates.
    pub member_count: usize,
    /// Input indices, representative first, duplicates in input order.
    pub members: Vec<usize>,
}

impl DuplicateGroup {
    pub fn representative_index(&self) -> usize {
        self.members[0]
    }

    pub fn duplicate_indices(&self) -> &[usize] {
        &self.members[1..]
    }

    pub fn duplicate_count(&self) -> usize {
        self.member_count - 1
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ScoredCandidate {
    pub candidate: CatalogCandidate,
    pub score: f64,
}

// ============================================================================
// Outputs
// ============================================================================

/// Match outcome for one input track.
///
/// Representatives carry the best candidate (when accepted) and the score;
/// duplicate placeholders carry only `is_duplicate` and their input index.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchResult {
    pub matched: bool,
    pub spotify_id: Option<String>,
    pub spotify_url: Option<String>,
    pub name: Option<String>,
    pub artists: Option<String>,
    pub score: f64,
    pub duplicate_count: usize,
    pub is_duplicate: bool,
    #[serde(default)]
    pub input_index: usize,
}

impl MatchResult {
    pub fn matched(
        candidate: &CatalogCandidate,
        score: f64,
        duplicate_count: usize,
        input_index: usize,
    ) -> Self {
        Self {
            matched: true,
            spotify_id: Some(candidate.id.clone()),
            spotify_url: Some(candidate.external_url.clone()).filter(|u| !u.is_empty()),
            name: Some(candidate.name.clone()),
            artists: Some(candidate.artists_joined()),
            score,
            duplicate_count,
            is_duplicate: false,
            input_index,
        }
    }

    pub fn unmatched(score: f64, duplicate_count: usize, input_index: usize) -> Self {
        Self {
            matched: false,
            spotify_id: None,
            spotify_url: None,
            name: None,
            artists: None,
            score,
            duplicate_count,
            is_duplicate: false,
            input_index,
        }
    }

    pub fn duplicate(input_index: usize) -> Self {
        Self {
            is_duplicate: true,
            ..Self::unmatched(0.0, 0, input_index)
        }
    }
}

/// Result of one orchestrated batch.
#[derive(Clone, Debug, PartialEq)]
pub struct BatchOutcome {
    pub results: Vec<MatchResult>,
    /// Acceptance threshold chosen for the batch.
    pub threshold: f64,
}

// ============================================================================
// Jobs
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Pending,
    Running,
    Done,
    Failed,
}

impl JobState {
    pub fn is_finished(self) -> bool {
        matches!(self, JobState::Done | JobState::Failed)
    }
}

/// Pollable view of a batch match.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchJob {
    pub state: JobState,
    pub current: usize,
    pub total: usize,
    pub results: Option<Vec<MatchResult>>,
    pub threshold: Option<f64>,
    pub done: bool,
    pub error: Option<String>,
}

impl MatchJob {
    pub fn pending(total: usize) -> Self {
        Self {
            state: JobState::Pending,
            current: 0,
            total,
            results: None,
            threshold: None,
            done: false,
            error: None,
        }
    }
}

/// Returned by `start_match`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStarted {
    pub total: usize,
}

/// Returned by `poll_match`: `{"exists": false}` or the job fields.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PollResponse {
    pub exists: bool,
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub job: Option<MatchJob>,
}

impl PollResponse {
    pub fn missing() -> Self {
        Self {
            exists: false,
            job: None,
        }
    }

    pub fn tracked(job: MatchJob) -> Self {
        Self {
            exists: true,
            job: Some(job),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_placeholder_is_empty() {
        let dup = MatchResult::duplicate(3);
        assert!(dup.is_duplicate);
        assert!(!dup.matched);
        assert_eq!(dup.spotify_id, None);
        assert_eq!(dup.name, None);
        assert_eq!(dup.score, 0.0);
        assert_eq!(dup.duplicate_count, 0);
        assert_eq!(dup.input_index, 3);
    }

    #[test]
    fn test_match_result_serializes_camel_case() {
        let candidate = CatalogCandidate {
            id: "abc".to_string(),
            name: "Song".to_string(),
            artists: vec!["A".to_string(), "B".to_string()],
            duration_ms: 1000,
            external_url: "https://open.spotify.com/track/abc".to_string(),
        };
        let json = serde_json::to_value(MatchResult::matched(&candidate, 0.9, 1, 0)).unwrap();
        assert_eq!(json["spotifyId"], "abc");
        assert_eq!(json["artists"], "A, B");
        assert_eq!(json["duplicateCount"], 1);
        assert_eq!(json["isDuplicate"], false);
    }

    #[test]
    fn test_missing_poll_serializes_exists_only() {
        let json = serde_json::to_value(PollResponse::missing()).unwrap();
        assert_eq!(json, serde_json::json!({ "exists": false }));
    }

    #[test]
    fn test_local_track_defaults_missing_fields() {
        let track: LocalTrack = serde_json::from_str(r#"{"title":"Song"}"#).unwrap();
        assert_eq!(track.artist, "");
        assert_eq!(track.duration_ms, 0);
        assert!(!track.is_blank());
        assert!(LocalTrack::default().is_blank());
    }
}
