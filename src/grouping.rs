//! Duplicate grouping.
//!
//! Local libraries often hold the same recording several times ("Song.mp3",
//! "Song - copy (2).mp3", a re-encode). Grouping them lets the orchestrator
//! search once per recording and copy the outcome to every member.

use rayon::prelude::*;

use crate::config::GroupingConfig;
use crate::models::{DuplicateGroup, LocalTrack};
use crate::normalize::match_key;

/// True when two tracks with equal keys should share a group.
fn durations_compatible(a: u64, b: u64, tolerance_ms: u64) -> bool {
    a == 0 || b == 0 || a.abs_diff(b) < tolerance_ms
}

/// Partition tracks into duplicate groups in first-seen order.
///
/// A track joins an earlier representative's group when both share a
/// non-empty `match_key` and their durations are within tolerance (or one is
/// unknown). Every input index lands in exactly one group.
pub fn group_duplicates(tracks: &[LocalTrack], config: &GroupingConfig) -> Vec<DuplicateGroup> {
    let keys: Vec<String> = tracks
        .par_iter()
        .map(|t| match_key(&t.title, &t.artist))
        .collect();

    let mut assigned = vec![false; tracks.len()];
    let mut groups = Vec::new();

    for i in 0..tracks.len() {
        if assigned[i] {
            continue;
        }
        assigned[i] = true;
        let mut members = vec![i];

        if !keys[i].is_empty() {
            for j in (i + 1)..tracks.len() {
                if assigned[j] || keys[j] != keys[i] {
                    continue;
                }
                if durations_compatible(
                    tracks[i].duration_ms,
                    tracks[j].duration_ms,
                    config.duplicate_tolerance_ms,
                ) {
                    assigned[j] = true;
                    members.push(j);
                }
            }
        }

        groups.push(DuplicateGroup {
            representative: tracks[i].clone(),
            member_count: members.len(),
            members,
        });
    }

    groups
}
