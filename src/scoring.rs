//! Candidate scoring.
//!
//! A score combines three bounded components:
//! - title similarity (bigram Dice or token Jaccard, whichever is higher)
//! - artist overlap (fraction of local artists found among the credits)
//! - duration closeness (graduated bands)
//!
//! Weights come from `ScoringConfig`; the final value is clamped to [0, 1].

use rustc_hash::FxHashSet;

use crate::config::ScoringConfig;
use crate::models::{CatalogCandidate, LocalTrack};
use crate::normalize::{
    fold_to_ascii, has_remix_marker, normalize_artist, normalize_title, primary_artist,
    split_artists, strip_artist_prefix,
};

// ============================================================================
// Similarity Primitives
// ============================================================================

/// Jaccard similarity on whitespace tokens (0.0 to 1.0).
pub fn token_jaccard(a: &str, b: &str) -> f64 {
    let tokens_a: FxHashSet<&str> = a.split_whitespace().collect();
    let tokens_b: FxHashSet<&str> = b.split_whitespace().collect();

    if tokens_a.is_empty() || tokens_b.is_empty() {
        return 0.0;
    }

    let intersection = tokens_a.intersection(&tokens_b).count();
    let union = tokens_a.union(&tokens_b).count();

    intersection as f64 / union as f64
}

/// Higher of bigram Dice and token Jaccard on already-folded strings.
fn folded_similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }
    strsim::sorensen_dice(a, b).max(token_jaccard(a, b))
}

fn title_form(raw: &str) -> String {
    fold_to_ascii(&normalize_title(raw)).trim().to_string()
}

// ============================================================================
// Components
// ============================================================================

/// Similarity of two raw titles after normalization and ASCII folding.
pub fn title_similarity(a: &str, b: &str) -> f64 {
    folded_similarity(&title_form(a), &title_form(b))
}

/// Similarity of two artist names.
pub fn artist_similarity(a: &str, b: &str) -> f64 {
    let a = fold_to_ascii(&normalize_artist(a));
    let b = fold_to_ascii(&normalize_artist(b));
    folded_similarity(a.trim(), b.trim())
}

/// Fraction of local artists found among the candidate's credits.
/// `None` when the local artist is unknown.
pub fn artist_overlap(local_artist: &str, candidate_artists: &[String], accept: f64) -> Option<f64> {
    let local = split_artists(local_artist);
    if local.is_empty() {
        return None;
    }

    let credits: Vec<String> = candidate_artists
        .iter()
        .flat_map(|a| split_artists(a))
        .collect();

    let found = local
        .iter()
        .filter(|name| credits.iter().any(|credit| artist_similarity(name, credit) > accept))
        .count();

    Some(found as f64 / local.len() as f64)
}

/// Graduated duration closeness; `unknown` when either side is zero.
pub fn duration_score(local_ms: u64, candidate_ms: u64, unknown: f64) -> f64 {
    if local_ms == 0 || candidate_ms == 0 {
        return unknown;
    }
    let diff_ms = local_ms.abs_diff(candidate_ms);
    match diff_ms {
        0..=2_000 => 1.0,
        2_001..=5_000 => 0.85,
        5_001..=10_000 => 0.7,
        10_001..=20_000 => 0.55,
        20_001..=30_000 => 0.45,
        _ => 0.4,
    }
}

// ============================================================================
// Combined Scoring
// ============================================================================

/// Score one catalog candidate against a local track, in [0, 1].
pub fn score_candidate(
    local: &LocalTrack,
    candidate: &CatalogCandidate,
    config: &ScoringConfig,
) -> f64 {
    // Filenames often keep the artist in the title: "Artist - Song"
    let unprefixed = strip_artist_prefix(&normalize_title(&local.title), &primary_artist(&local.artist));
    let title = title_similarity(&local.title, &candidate.name)
        .max(title_similarity(&unprefixed, &candidate.name));

    let artist = artist_overlap(
        &local.artist,
        &candidate.artists,
        config.artist_accept_similarity,
    )
    .unwrap_or(config.unknown_artist_score);

    let duration = duration_score(
        local.duration_ms,
        candidate.duration_ms,
        config.unknown_duration_score,
    );

    let weight_sum = config.title_weight + config.artist_weight + config.duration_weight;
    if weight_sum <= 0.0 {
        return 0.0;
    }

    let mut score = (config.title_weight * title
        + config.artist_weight * artist
        + config.duration_weight * duration)
        / weight_sum;

    if has_remix_marker(&local.title) && has_remix_marker(&candidate.name) {
        score += config.remix_bonus;
    }

    if score.is_nan() {
        return 0.0;
    }
    score.clamp(0.0, 1.0)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(name: &str, artists: &[&str], duration_ms: u64) -> CatalogCandidate {
        CatalogCandidate {
            id: "id".to_string(),
            name: name.to_string(),
            artists: artists.iter().map(|a| a.to_string()).collect(),
            duration_ms,
            external_url: String::new(),
        }
    }

    #[test]
    fn test_duration_bands() {
        assert_eq!(duration_score(200_000, 201_000, 0.55), 1.0);
        assert_eq!(duration_score(200_000, 204_000, 0.55), 0.85);
        assert_eq!(duration_score(200_000, 209_000, 0.55), 0.7);
        assert_eq!(duration_score(200_000, 215_000, 0.55), 0.55);
        assert_eq!(duration_score(200_000, 230_000, 0.55), 0.45);
        assert_eq!(duration_score(200_000, 400_000, 0.55), 0.4);
        assert_eq!(duration_score(0, 200_000, 0.55), 0.55);
        assert_eq!(duration_score(200_000, 0, 0.55), 0.55);
    }

    #[test]
    fn test_title_similarity() {
        assert_eq!(title_similarity("Song", "song"), 1.0);
        assert_eq!(title_similarity("Song (Official Video)", "Song"), 1.0);
        assert_eq!(title_similarity("", "Song"), 0.0);
        assert!(title_similarity("One More Time", "One More Tim") > 0.8);
        assert!(title_similarity("One More Time", "Harder Better Faster") < 0.3);
    }

    #[test]
    fn test_artist_overlap() {
        let credits = vec!["Daft Punk".to_string(), "Romanthony".to_string()];
        assert_eq!(artist_overlap("Daft Punk", &credits, 0.6), Some(1.0));
        assert_eq!(artist_overlap("Daft Punk feat. Someone", &credits, 0.6), Some(0.5));
        assert_eq!(artist_overlap("Justice", &credits, 0.6), Some(0.0));
        assert_eq!(artist_overlap("", &credits, 0.6), None);
        assert_eq!(artist_overlap("Daft Punk", &[], 0.6), Some(0.0));
    }

    #[test]
    fn test_exact_match_scores_high() {
        let local = LocalTrack::new("One More Time", "Daft Punk", 320_000);
        let hit = candidate("One More Time", &["Daft Punk"], 320_500);
        let score = score_candidate(&local, &hit, &ScoringConfig::default());
        assert!(score >= 0.9, "score was {score}");
    }

    #[test]
    fn test_artist_in_title_still_matches() {
        let local = LocalTrack::new("Daft Punk - One More Time", "Daft Punk", 0);
        let hit = candidate("One More Time", &["Daft Punk"], 320_000);
        let score = score_candidate(&local, &hit, &ScoringConfig::default());
        assert!(score > 0.9, "score was {score}");
    }

    #[test]
    fn test_score_bounded() {
        let config = ScoringConfig::default();
        let cases = [
            (LocalTrack::new("Song (Remix)", "A", 100_000), candidate("Song (Remix)", &["A"], 100_000)),
            (LocalTrack::new("", "", 0), candidate("", &[], 0)),
            (LocalTrack::new("x", "y", 1), candidate("zzz", &["q"], 9_999_999)),
        ];
        for (local, hit) in &cases {
            let score = score_candidate(local, hit, &config);
            assert!((0.0..=1.0).contains(&score), "score {score} out of range");
        }
    }

    #[test]
    fn test_remix_bonus() {
        let with_bonus = ScoringConfig::default();
        let without_bonus = ScoringConfig {
            remix_bonus: 0.0,
            ..ScoringConfig::default()
        };
        let local = LocalTrack::new("Song (Club Mix)", "A", 0);
        let remix = candidate("Song (Club Mix)", &["B"], 0);
        let diff = score_candidate(&local, &remix, &with_bonus)
            - score_candidate(&local, &remix, &without_bonus);
        assert!((diff - 0.05).abs() < 1e-9);

        let plain = candidate("Song", &["B"], 0);
        assert_eq!(
            score_candidate(&local, &plain, &with_bonus),
            score_candidate(&local, &plain, &without_bonus)
        );
    }

    #[test]
    fn test_unknown_artist_uses_fallback() {
        let config = ScoringConfig::default();
        let local = LocalTrack::new("Song", "", 0);
        let hit = candidate("Song", &["Anyone"], 0);
        let expected = 0.55 * 1.0 + 0.35 * 0.5 + 0.10 * 0.55;
        assert!((score_candidate(&local, &hit, &config) - expected).abs() < 1e-9);
    }
}
