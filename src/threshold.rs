//! Adaptive acceptance threshold.
//!
//! Walks a descending ladder and stops at the first rung that still lets the
//! requested share of the batch through.

/// Fraction of scores at or above `threshold`. Zero for an empty batch.
pub fn match_rate(scores: &[f64], threshold: f64) -> f64 {
    if scores.is_empty() {
        return 0.0;
    }
    let passing = scores.iter().filter(|&&s| s >= threshold).count();
    passing as f64 / scores.len() as f64
}

/// Highest rung whose match rate reaches `min_match_rate`, else the lowest.
/// An empty batch gets the highest rung; an empty ladder gets 0.0.
pub fn choose_threshold(scores: &[f64], ladder: &[f64], min_match_rate: f64) -> f64 {
    let (Some(&highest), Some(&lowest)) = (ladder.first(), ladder.last()) else {
        return 0.0;
    };
    if scores.is_empty() {
        return highest;
    }
    ladder
        .iter()
        .copied()
        .find(|&rung| match_rate(scores, rung) >= min_match_rate)
        .unwrap_or(lowest)
}
