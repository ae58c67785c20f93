//! Search query construction.
//!
//! Each track yields a short ordered list of alternative queries, most
//! specific first. The orchestrator tries all of them and pools the hits.

use rustc_hash::FxHashSet;

use crate::models::LocalTrack;
use crate::normalize::{
    collapse_whitespace, extract_featured, has_remix_marker, normalize_title, split_artists,
    strip_brackets, strip_remix_marker,
};

/// Build up to `max_queries` distinct search queries for a track.
pub fn build_queries(track: &LocalTrack, max_queries: usize) -> Vec<String> {
    let mut title = normalize_title(&track.title);
    let mut artists = split_artists(&track.artist);

    // "Song (feat. B)" by "A" searches better as "Song" by "A, B"
    if artists.len() == 1 {
        let (without, featured) = extract_featured(&title);
        if let Some(featured) = featured {
            artists.extend(split_artists(&featured));
            title = without;
        }
    }

    // Every variant needs a title; an artist alone only finds random songs
    if title.is_empty() {
        return Vec::new();
    }

    let clean = strip_brackets(&title);
    let primary = artists.first().map(String::as_str);
    let mut candidates: Vec<String> = Vec::with_capacity(10);

    if let Some(primary) = primary {
        candidates.push(format!("{primary} {title}"));
        if clean != title {
            candidates.push(format!("{primary} {clean}"));
        }
    }

    if artists.len() >= 2 {
        let pair = format!("{} {}", artists[0], artists[1]);
        candidates.push(format!("{pair} {title}"));
        candidates.push(format!("{pair} {clean}"));
    }

    candidates.push(title.clone());
    candidates.push(clean.clone());

    if let Some(primary) = primary {
        if has_remix_marker(&title) {
            candidates.push(format!("{primary} {}", strip_remix_marker(&title)));
        }
        let field_title = if clean.is_empty() { &title } else { &clean };
        candidates.push(format!(r#"track:"{field_title}" artist:"{primary}""#));
    }

    let mut seen = FxHashSet::default();
    candidates
        .into_iter()
        .map(|q| collapse_whitespace(&q))
        .filter(|q| !q.is_empty())
        .filter(|q| seen.insert(q.to_lowercase()))
        .take(max_queries)
        .collect()
}
