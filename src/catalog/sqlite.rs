//! Local SQLite catalog with an FTS5 index.
//!
//! Schema:
//! - `tracks`: one row per catalog track, artists stored as a JSON array plus a
//!   joined display string, and comparison keys for exact lookups
//! - `tracks_fts`: external-content FTS5 index over `name` and `artist`
//!
//! Searches run on the blocking pool; the connection sits behind a mutex.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::debug;

use super::SearchCatalog;
use crate::error::{RelinkError, Result};
use crate::models::CatalogCandidate;
use crate::normalize::{fold_to_ascii, primary_artist, title_key};

/// Rows per write transaction.
pub const WRITE_BATCH_SIZE: usize = 10_000;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS tracks (
        pk INTEGER PRIMARY KEY,
        id TEXT NOT NULL UNIQUE,
        name TEXT NOT NULL,
        artists_json TEXT NOT NULL,
        artist TEXT NOT NULL,
        duration_ms INTEGER NOT NULL,
        external_url TEXT NOT NULL,
        title_norm TEXT NOT NULL,
        artist_norm TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_tracks_norm ON tracks(title_norm, artist_norm);

    CREATE VIRTUAL TABLE IF NOT EXISTS tracks_fts USING fts5(
        name, artist,
        content='tracks',
        content_rowid='pk',
        tokenize='porter unicode61 remove_diacritics 2'
    );";

/// `track:"..."` / `artist:"..."` qualifiers.
static FIELD_FILTER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)\b(track|artist):"([^"]*)""#).unwrap());

// ============================================================================
// Query translation
// ============================================================================

/// Parsed search query: free text plus optional field qualifiers.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ParsedQuery {
    pub free: String,
    pub track: Option<String>,
    pub artist: Option<String>,
}

pub fn parse_query(query: &str) -> ParsedQuery {
    let mut parsed = ParsedQuery::default();
    for caps in FIELD_FILTER.captures_iter(query) {
        let value = caps[2].trim().to_string();
        if caps[1].eq_ignore_ascii_case("track") {
            parsed.track = Some(value);
        } else {
            parsed.artist = Some(value);
        }
    }
    parsed.free = FIELD_FILTER.replace_all(query, " ").trim().to_string();
    parsed
}

fn fts_tokens(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| format!("\"{}\"", t.to_lowercase()))
        .collect()
}

/// Build an FTS5 MATCH expression; every token is required.
/// Returns `None` when the query has no searchable token.
pub fn to_fts_expression(parsed: &ParsedQuery) -> Option<String> {
    let mut terms = fts_tokens(&parsed.free);
    if let Some(track) = &parsed.track {
        terms.extend(fts_tokens(track).into_iter().map(|t| format!("name:{t}")));
    }
    if let Some(artist) = &parsed.artist {
        terms.extend(fts_tokens(artist).into_iter().map(|t| format!("artist:{t}")));
    }
    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" "))
    }
}

fn artist_norm(artists: &[String]) -> String {
    artists
        .first()
        .map(|a| fold_to_ascii(&primary_artist(a)))
        .unwrap_or_default()
}

fn row_to_candidate(row: &Row) -> rusqlite::Result<(CatalogCandidate, String)> {
    Ok((
        CatalogCandidate {
            id: row.get(0)?,
            name: row.get(1)?,
            artists: Vec::new(),
            duration_ms: row.get::<_, i64>(3)?.max(0) as u64,
            external_url: row.get(4)?,
        },
        row.get(2)?,
    ))
}

fn decode_artists(pair: (CatalogCandidate, String)) -> Result<CatalogCandidate> {
    let (mut candidate, artists_json) = pair;
    candidate.artists = serde_json::from_str(&artists_json)?;
    Ok(candidate)
}

// ============================================================================
// Reader
// ============================================================================

#[derive(Clone)]
pub struct SqliteCatalog {
    conn: Arc<Mutex<Connection>>,
    limit: usize,
}

impl SqliteCatalog {
    pub fn open(path: &Path, limit: usize) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA query_only = ON;
             PRAGMA cache_size = -64000;
             PRAGMA temp_store = MEMORY;",
        )?;
        Ok(Self::from_connection(conn, limit))
    }

    pub fn from_connection(conn: Connection, limit: usize) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
            limit: limit.max(1),
        }
    }

    pub fn track_count(&self) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM tracks", [], |r| r.get(0))?;
        Ok(count as usize)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| RelinkError::Search("catalog connection poisoned".to_string()))
    }

    /// Synchronous search: exact key lookup for field-qualified queries,
    /// then FTS5 ranked by bm25, deduplicated by id.
    pub fn search_blocking(&self, query: &str) -> Result<Vec<CatalogCandidate>> {
        let parsed = parse_query(query);
        let conn = self.lock()?;
        let mut results: Vec<CatalogCandidate> = Vec::new();

        if let (Some(track), Some(artist)) = (&parsed.track, &parsed.artist) {
            let key_title = title_key(track);
            let key_artist = artist_norm(std::slice::from_ref(artist));
            let exact = conn
                .query_row(
                    "SELECT id, name, artists_json, duration_ms, external_url
                     FROM tracks WHERE title_norm = ?1 AND artist_norm = ?2
                     LIMIT 1",
                    params![key_title, key_artist],
                    row_to_candidate,
                )
                .optional()?;
            if let Some(pair) = exact {
                results.push(decode_artists(pair)?);
            }
        }

        let Some(expression) = to_fts_expression(&parsed) else {
            return Ok(results);
        };
        debug!("FTS query {:?} -> {}", query, expression);

        let mut stmt = conn.prepare_cached(
            "SELECT t.id, t.name, t.artists_json, t.duration_ms, t.external_url
             FROM tracks_fts
             JOIN tracks t ON t.pk = tracks_fts.rowid
             WHERE tracks_fts MATCH ?1
             ORDER BY bm25(tracks_fts)
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![expression, self.limit as i64], row_to_candidate)?;
        for row in rows {
            let candidate = decode_artists(row?)?;
            if results.iter().all(|c| c.id != candidate.id) {
                results.push(candidate);
            }
        }

        results.truncate(self.limit);
        Ok(results)
    }
}

#[async_trait]
impl SearchCatalog for SqliteCatalog {
    fn name(&self) -> &'static str {
        "SQLite catalog"
    }

    async fn search(&self, query: &str) -> Result<Vec<CatalogCandidate>> {
        let catalog = self.clone();
        let query = query.to_string();
        tokio::task::spawn_blocking(move || catalog.search_blocking(&query))
            .await
            .map_err(|e| RelinkError::Search(format!("catalog search task failed: {e}")))?
    }
}

// ============================================================================
// Writer
// ============================================================================

/// Catalog track with its precomputed comparison keys.
#[derive(Debug, Clone)]
pub struct CatalogRow {
    pub candidate: CatalogCandidate,
    pub title_norm: String,
    pub artist_norm: String,
}

impl CatalogRow {
    pub fn from_candidate(candidate: CatalogCandidate) -> Self {
        Self {
            title_norm: title_key(&candidate.name),
            artist_norm: artist_norm(&candidate.artists),
            candidate,
        }
    }
}

pub struct CatalogWriter {
    conn: Connection,
}

impl CatalogWriter {
    pub fn create(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA cache_size = -64000;
             PRAGMA temp_store = MEMORY;",
        )?;
        Self::from_connection(conn)
    }

    pub fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// Insert one batch in a single transaction. Ids already present are
    /// skipped. Returns the number of rows inserted.
    pub fn write_batch(&mut self, rows: &[CatalogRow]) -> Result<usize> {
        let tx = self.conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT OR IGNORE INTO tracks
                 (id, name, artists_json, artist, duration_ms, external_url, title_norm, artist_norm)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )?;

            for row in rows {
                let c = &row.candidate;
                inserted += stmt.execute(params![
                    c.id,
                    c.name,
                    serde_json::to_string(&c.artists)?,
                    c.artists_joined(),
                    c.duration_ms as i64,
                    c.external_url,
                    row.title_norm,
                    row.artist_norm,
                ])?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    pub fn build_fts_index(&self) -> Result<()> {
        self.conn
            .execute("INSERT INTO tracks_fts(tracks_fts) VALUES('rebuild')", [])?;
        Ok(())
    }

    pub fn optimize(&self) -> Result<()> {
        self.conn.execute_batch("VACUUM; ANALYZE;")?;
        Ok(())
    }

    pub fn into_catalog(self, limit: usize) -> SqliteCatalog {
        SqliteCatalog::from_connection(self.conn, limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(id: &str, name: &str, artists: &[&str], duration_ms: u64) -> CatalogCandidate {
        CatalogCandidate {
            id: id.to_string(),
            name: name.to_string(),
            artists: artists.iter().map(|a| a.to_string()).collect(),
            duration_ms,
            external_url: format!("https://open.spotify.com/track/{id}"),
        }
    }

    fn sample_catalog(limit: usize) -> SqliteCatalog {
        let conn = Connection::open_in_memory().unwrap();
        let mut writer = CatalogWriter::from_connection(conn).unwrap();
        let rows: Vec<CatalogRow> = vec![
            candidate("1", "One More Time", &["Daft Punk"], 320_000),
            candidate("2", "Harder, Better, Faster, Stronger", &["Daft Punk"], 224_000),
            candidate("3", "One More Time", &["Someone Else"], 200_000),
            candidate("4", "Jóga", &["Björk"], 305_000),
            candidate("1", "Duplicate Id", &["Nobody"], 1_000),
        ]
        .into_iter()
        .map(CatalogRow::from_candidate)
        .collect();
        assert_eq!(writer.write_batch(&rows).unwrap(), 4);
        writer.build_fts_index().unwrap();
        writer.into_catalog(limit)
    }

    #[test]
    fn test_parse_query() {
        let parsed = parse_query(r#"track:"One More Time" artist:"Daft Punk""#);
        assert_eq!(parsed.track.as_deref(), Some("One More Time"));
        assert_eq!(parsed.artist.as_deref(), Some("Daft Punk"));
        assert_eq!(parsed.free, "");

        let parsed = parse_query("daft punk one more time");
        assert_eq!(parsed.track, None);
        assert_eq!(parsed.free, "daft punk one more time");
    }

    #[test]
    fn test_fts_expression() {
        let parsed = parse_query(r#"track:"It's" artist:"AC/DC""#);
        assert_eq!(
            to_fts_expression(&parsed).unwrap(),
            r#"name:"it" name:"s" artist:"ac" artist:"dc""#
        );
        assert_eq!(to_fts_expression(&parse_query("  -- ")), None);
    }

    #[test]
    fn test_free_text_search() {
        let catalog = sample_catalog(5);
        assert_eq!(catalog.track_count().unwrap(), 4);

        let hits = catalog.search_blocking("daft punk one more time").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "1");
        assert_eq!(hits[0].artists, vec!["Daft Punk"]);
        assert_eq!(hits[0].duration_ms, 320_000);

        let hits = catalog.search_blocking("one more time").unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn test_diacritics_fold() {
        let catalog = sample_catalog(5);
        let hits = catalog.search_blocking("bjork joga").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "Jóga");
    }

    #[test]
    fn test_field_search() {
        let catalog = sample_catalog(5);
        let hits = catalog
            .search_blocking(r#"track:"One More Time" artist:"Someone Else""#)
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "3");
    }

    #[test]
    fn test_limit_and_empty() {
        let catalog = sample_catalog(1);
        assert_eq!(catalog.search_blocking("one more time").unwrap().len(), 1);
        assert!(catalog.search_blocking("").unwrap().is_empty());
        assert!(catalog.search_blocking("nothing matches this").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_async_search() {
        let catalog = sample_catalog(5);
        let hits = catalog.search("harder better").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "2");
    }
}
