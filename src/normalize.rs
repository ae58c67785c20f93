//! Title and artist normalization shared by the query builder, scorer and
//! duplicate grouper.
//!
//! Display normalization (`normalize_title`, `normalize_artist`) keeps the
//! text readable enough to send as a search query. Comparison keys go one step
//! further through `fold_to_ascii`.
//!
//! CRITICAL: the scorer and the grouper both depend on these outputs. Run the
//! tests after changing any pattern.

use any_ascii::any_ascii;
use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

// ============================================================================
// REGEX PATTERNS
// ============================================================================

/// Decorative annotation vocabulary. Longest alternatives first so that
/// "music video" wins over "video".
const DECORATIVE_WORD: &str = r"(?:official|lyrics?|audio|music\s+video|video|mv|hd|hq|remaster(?:ed)?(?:\s+\d{4})?|\d{4}\s+remaster(?:ed)?|visuali[sz]er|clip|radio\s+edit|extended\s+mix|full\s+(?:track|version)|original\s+mix|live|out\s+now|premiere|teaser|trailer)";

/// A bracketed annotation made only of vocabulary words:
/// "(Official Music Video)", "[HD]", "(Lyrics / Audio)".
pub static DECORATIVE_BRACKET: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?i)\s*[\(\[]\s*\b{w}\b(?:[\s,/&+]+\b{w}\b)*\s*[\)\]]",
        w = DECORATIVE_WORD
    ))
    .unwrap()
});

/// A trailing hyphen run of vocabulary words: "Song - Official Video".
pub static DECORATIVE_SUFFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?i)\s+[-–—]\s+\b{w}\b(?:[\s,/&+]+\b{w}\b)*\s*$",
        w = DECORATIVE_WORD
    ))
    .unwrap()
});

/// Download-copy markers: "Track - copy (2)", "Track_copy", "Track copy (3)".
/// A bare trailing "copy" needs a separator so "Carbon Copy" survives.
pub static COPY_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:\s*[-_]\s*copy(?:\s*\(\d+\))?|\s+copy\s*\(\d+\))\s*$").unwrap()
});

/// Everything up to the last path separator.
pub static PATH_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^.*[\\/]").unwrap());

pub static EMPTY_BRACKETS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\(\s*\)|\[\s*\]").unwrap());

/// Any bracketed segment.
pub static BRACKETED: Lazy<Regex> = Lazy::new(|| Regex::new(r"\([^)]*\)|\[[^\]]*\]").unwrap());

/// Artist list separators. Word separators need surrounding whitespace so
/// names like "Xzibit" or "Within Temptation" stay whole.
pub static ARTIST_SEPARATOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\s*,\s*|\s*&\s*|\s+(?:x|vs\.?|versus|feat\.?|ft\.?|featuring|with)\s+").unwrap()
});

const REMIX_WORD: &str = r"(?:remix|rmx|edit|mix|bootleg|rework)";

pub static REMIX_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"(?i)\b{REMIX_WORD}\b")).unwrap());

/// Remix annotations: "(Skrillex Remix)", "[VIP Edit]", "- Club Mix".
pub static REMIX_SEGMENT: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(&format!(r"(?i)\s*[\(\[][^\)\]]*\b{REMIX_WORD}\b[^\)\]]*[\)\]]")).unwrap(),
        Regex::new(&format!(r"(?i)\s+[-–—]\s+[^-–—]*\b{REMIX_WORD}\b[^-–—]*$")).unwrap(),
    ]
});

/// "(feat. X)" / "[ft. X]" inside a title.
pub static FEAT_BRACKETED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\s*[\(\[]\s*(?:feat\.?|ft\.?|featuring)\s+([^\)\]]+?)\s*[\)\]]").unwrap()
});

/// Bare "feat. X" running up to the next bracket or the end of the title.
pub static FEAT_BARE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\s+(?:feat\.?|ft\.?|featuring)\s+([^\(\[]+?)\s*([\(\[].*)?$").unwrap()
});

/// Regex to collapse runs of whitespace into a single space
pub static MULTI_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

static NON_KEY_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9 ]+").unwrap());

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

/// Check if a character is a Unicode combining mark (diacritical mark).
pub fn is_combining_mark(c: char) -> bool {
    matches!(c as u32, 0x0300..=0x036F | 0x1AB0..=0x1AFF | 0x1DC0..=0x1DFF | 0x20D0..=0x20FF | 0xFE20..=0xFE2F)
}

/// Remove accents while keeping case and non-Latin scripts intact.
/// e.g., "Beyoncé" → "Beyonce"
pub fn strip_diacritics(s: &str) -> String {
    s.nfkd().filter(|c| !is_combining_mark(*c)).nfc().collect()
}

/// Fold Unicode text to lower-case ASCII for comparison keys.
/// e.g., "Björk" → "bjork", "кино" → "kino"
pub fn fold_to_ascii(s: &str) -> String {
    let stripped: String = s.nfkd().filter(|c| !is_combining_mark(*c)).collect();
    any_ascii(&stripped).to_lowercase()
}

pub fn collapse_whitespace(s: &str) -> String {
    MULTI_SPACE.replace_all(s, " ").trim().to_string()
}

/// Remove every `(...)` and `[...]` segment.
pub fn strip_brackets(s: &str) -> String {
    collapse_whitespace(&BRACKETED.replace_all(s, " "))
}

pub fn has_remix_marker(s: &str) -> bool {
    REMIX_MARKER.is_match(s)
}

/// Drop the remix/edit annotation, keeping the base title.
/// e.g., "Song (Someone Remix)" → "Song"
pub fn strip_remix_marker(s: &str) -> String {
    let mut result = s.to_string();
    for pattern in REMIX_SEGMENT.iter() {
        result = pattern.replace_all(&result, "").to_string();
    }
    collapse_whitespace(&result)
}

/// Split a featured-artist clause out of a title.
/// Returns the title without the clause and the featured artist text.
pub fn extract_featured(title: &str) -> (String, Option<String>) {
    if let Some(caps) = FEAT_BRACKETED.captures(title) {
        let featured = caps[1].trim().to_string();
        let rest = FEAT_BRACKETED.replace(title, " ");
        return (collapse_whitespace(&rest), Some(featured).filter(|f| !f.is_empty()));
    }
    if let Some(caps) = FEAT_BARE.captures(title) {
        let featured = caps[1].trim().to_string();
        let whole = caps.get(0).map_or(0..0, |m| m.range());
        let tail = caps.get(2).map_or("", |m| m.as_str());
        let rest = format!("{} {}", &title[..whole.start], tail);
        return (collapse_whitespace(&rest), Some(featured).filter(|f| !f.is_empty()));
    }
    (collapse_whitespace(title), None)
}

// ============================================================================
// NORMALIZATION FUNCTIONS
// ============================================================================

/// Normalize a raw title for searching and display.
/// Case is preserved; decorative annotations, copy markers and path
/// prefixes are removed. "remix", "edit" and "feat" clauses survive.
pub fn normalize_title(raw: &str) -> String {
    let mut result = collapse_whitespace(&strip_diacritics(raw));

    result = PATH_PREFIX.replace(&result, "").to_string();

    // Copy markers go first so "(2)" in "copy (2)" is not left as a bracket
    result = COPY_MARKER.replace(&result, "").to_string();

    // Repeat: stripping one annotation can expose another ("Song [HD] - Live")
    loop {
        let before = result.len();
        result = DECORATIVE_BRACKET.replace_all(&result, "").to_string();
        result = DECORATIVE_SUFFIX.replace(&result, "").to_string();
        result = EMPTY_BRACKETS.replace_all(&result, "").to_string();
        result = collapse_whitespace(&result);
        if result.len() == before {
            break;
        }
    }

    result
}

/// Normalize an artist string: no accents, lower-case, " and " → " & ".
pub fn normalize_artist(raw: &str) -> String {
    let lowered = strip_diacritics(raw).to_lowercase();
    collapse_whitespace(&lowered).replace(" and ", " & ")
}

/// Split an artist string into its normalized members.
/// e.g., "A feat. B & C" → ["a", "b", "c"]
pub fn split_artists(raw: &str) -> Vec<String> {
    let normalized = normalize_artist(raw);
    ARTIST_SEPARATOR
        .split(&normalized)
        .map(|s| s.trim_matches(|c: char| c.is_whitespace() || "()[]".contains(c)))
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// First credited artist, or an empty string.
pub fn primary_artist(raw: &str) -> String {
    split_artists(raw).into_iter().next().unwrap_or_default()
}

/// Drop a leading "Artist - " from a title when it repeats the given artist.
/// e.g., ("Daft Punk - One More Time", "Daft Punk") → "One More Time"
pub fn strip_artist_prefix(title: &str, artist: &str) -> String {
    let artist = collapse_whitespace(artist);
    // Short names give false positives ("A - Song")
    if artist.chars().count() < 3 {
        return title.to_string();
    }
    let pattern = format!(r"(?i)^\s*{}\s*[-–—:]\s*", regex::escape(&artist));
    match Regex::new(&pattern) {
        Ok(prefix) => prefix.replace(title, "").to_string(),
        Err(_) => title.to_string(),
    }
}

/// Comparison key for a title: normalized, folded to ASCII with punctuation
/// dropped. Bracketed words such as "(Someone Remix)" stay in the key.
pub fn title_key(title: &str) -> String {
    let folded = fold_to_ascii(&normalize_title(title));
    collapse_whitespace(&NON_KEY_CHARS.replace_all(&folded, " "))
}

/// Key under which two local tracks are candidate duplicates.
/// Empty when the title has no usable text.
pub fn match_key(title: &str, artist: &str) -> String {
    let title = title_key(title);
    if title.is_empty() {
        return String::new();
    }
    let artist = fold_to_ascii(&primary_artist(artist));
    let artist = collapse_whitespace(&NON_KEY_CHARS.replace_all(&artist, " "));
    format!("{title}|{artist}")
}

// ============================================================================
// TESTS
// ============================================================================
