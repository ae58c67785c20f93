//! Reading track lists, music folders and catalog dumps, writing result
//! files.

use lofty::prelude::*;
use lofty::probe::Probe;
use once_cell::sync::Lazy;
use rayon::prelude::*;
use regex::Regex;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::error::{RelinkError, Result};
use crate::models::{CatalogCandidate, LocalTrack, MatchResult};
use crate::normalize::collapse_whitespace;

/// A short alphanumeric suffix such as ".mp3" or ".flac".
static FILE_EXTENSION: Lazy<Regex> = Lazy::new(|| Regex::new(r"\.[A-Za-z0-9]{1,5}$").unwrap());

/// Guess `(artist, title)` from a file path.
///
/// Uses the last path segment without its extension, underscores read as
/// spaces. "Artist - Title" splits on the first " - "; anything else is all
/// title. Double quotes are dropped.
pub fn parse_filename(path: &str) -> (String, String) {
    let name = path.rsplit(['/', '\\']).next().unwrap_or(path);
    let name = FILE_EXTENSION.replace(name, "");
    let name = collapse_whitespace(&name.replace('_', " "));

    let (artist, title) = match name.split_once(" - ") {
        Some((artist, title)) => (artist, title),
        None => ("", name.as_str()),
    };
    (
        artist.replace('"', "").trim().to_string(),
        title.replace('"', "").trim().to_string(),
    )
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct TrackRecord {
    title: Option<String>,
    artist: Option<String>,
    #[serde(alias = "duration_ms")]
    duration_ms: Option<u64>,
    path: Option<String>,
}

impl TrackRecord {
    fn into_track(self) -> LocalTrack {
        let blank = |s: &Option<String>| s.as_deref().map_or(true, |v| v.trim().is_empty());
        let (mut artist, mut title) = (self.artist.clone(), self.title.clone());
        if blank(&title) || blank(&artist) {
            if let Some(path) = &self.path {
                let (guess_artist, guess_title) = parse_filename(path);
                if blank(&title) {
                    title = Some(guess_title);
                }
                if blank(&artist) {
                    artist = Some(guess_artist);
                }
            }
        }
        LocalTrack {
            title: title.unwrap_or_default(),
            artist: artist.unwrap_or_default(),
            duration_ms: self.duration_ms.unwrap_or(0),
        }
    }
}

// ============================================================================
// Folder scanning
// ============================================================================

/// Audio extensions picked up by `scan_directory`, compared case-insensitively.
pub const AUDIO_EXTENSIONS: [&str; 4] = ["mp3", "flac", "m4a", "wav"];

fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| AUDIO_EXTENSIONS.iter().any(|a| e.eq_ignore_ascii_case(a)))
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

/// Title, artist and duration from embedded tags. Unreadable files yield an
/// empty record.
fn read_tags(path: &Path) -> TrackRecord {
    let tagged = match Probe::open(path).and_then(|reader| reader.read()) {
        Ok(tagged) => tagged,
        Err(e) => {
            debug!("No tags read from {}: {}", path.display(), e);
            return TrackRecord::default();
        }
    };

    let duration_ms = tagged.properties().duration().as_millis() as u64;
    let tag = tagged.primary_tag().or_else(|| tagged.first_tag());

    TrackRecord {
        title: tag.and_then(|t| non_blank(t.title().as_deref())),
        artist: tag.and_then(|t| non_blank(t.artist().as_deref())),
        duration_ms: Some(duration_ms),
        path: None,
    }
}

/// Walk `root` for audio files and describe each one.
///
/// Tags supply title, artist and duration; a missing title or artist is
/// guessed from the file name. Files come back sorted by path.
pub fn scan_directory(root: &Path) -> Result<Vec<LocalTrack>> {
    if !root.is_dir() {
        return Err(RelinkError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("{} is not a directory", root.display()),
        )));
    }

    let files: Vec<PathBuf> = WalkDir::new(root)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                debug!("Skipping unreadable entry: {}", e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file() && is_audio_file(entry.path()))
        .map(|entry| entry.into_path())
        .collect();
    info!("Found {} audio files under {}, reading tags", files.len(), root.display());

    Ok(files
        .par_iter()
        .map(|file| {
            let relative = file.strip_prefix(root).unwrap_or(file.as_path());
            let record = TrackRecord {
                path: Some(relative.to_string_lossy().into_owned()),
                ..read_tags(file)
            };
            record.into_track()
        })
        .collect())
}

// ============================================================================
// Lists and dumps
// ============================================================================

fn is_json(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"))
}

/// Load local tracks.
///
/// A directory is scanned with `scan_directory`. `.json`: array of
/// `{title?, artist?, durationMs?, path?}`, blanks filled from the path.
/// Anything else: one file name per non-empty line.
pub fn load_tracks(path: &Path) -> Result<Vec<LocalTrack>> {
    if path.is_dir() {
        return scan_directory(path);
    }
    let text = fs::read_to_string(path)?;
    if is_json(path) {
        let records: Vec<TrackRecord> = serde_json::from_str(&text)?;
        return Ok(records.into_iter().map(TrackRecord::into_track).collect());
    }
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            let (artist, title) = parse_filename(line);
            LocalTrack::new(title, artist, 0)
        })
        .collect())
}

/// Load catalog tracks from a JSON array or JSON lines.
pub fn load_candidates(path: &Path) -> Result<Vec<CatalogCandidate>> {
    let text = fs::read_to_string(path)?;
    if text.trim_start().starts_with('[') {
        return Ok(serde_json::from_str(&text)?);
    }
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| Ok(serde_json::from_str::<CatalogCandidate>(line)?))
        .collect()
}

pub fn save_results(path: &Path, results: &[MatchResult]) -> Result<()> {
    fs::write(path, serde_json::to_string_pretty(results)?)?;
    Ok(())
}

pub fn load_results(path: &Path) -> Result<Vec<MatchResult>> {
    let text = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}
