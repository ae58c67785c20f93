//! Spotify Web API track search.
//!
//! Only the search endpoint is used. The bearer token is supplied by the
//! caller; acquiring or refreshing it happens elsewhere.

use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::SearchCatalog;
use crate::error::{RelinkError, Result};
use crate::models::CatalogCandidate;

const DEFAULT_BASE_URL: &str = "https://api.spotify.com/";
const TRACK_URL_PREFIX: &str = "https://open.spotify.com/track/";

// Loose wire shapes: every field optional, nulls tolerated.

#[derive(Debug, Default, Deserialize)]
struct SearchEnvelope {
    #[serde(default)]
    tracks: Option<TrackPage>,
}

#[derive(Debug, Default, Deserialize)]
struct TrackPage {
    #[serde(default)]
    items: Vec<Option<TrackItem>>,
}

#[derive(Debug, Default, Deserialize)]
struct TrackItem {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    artists: Vec<ArtistRef>,
    #[serde(default)]
    duration_ms: Option<u64>,
    #[serde(default)]
    external_urls: Option<ExternalUrls>,
}

#[derive(Debug, Default, Deserialize)]
struct ArtistRef {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ExternalUrls {
    #[serde(default)]
    spotify: Option<String>,
}

impl TrackItem {
    fn into_candidate(self) -> Option<CatalogCandidate> {
        let id = self.id.filter(|id| !id.is_empty())?;
        let external_url = self
            .external_urls
            .and_then(|u| u.spotify)
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| format!("{TRACK_URL_PREFIX}{id}"));
        Some(CatalogCandidate {
            name: self.name.unwrap_or_default(),
            artists: self
                .artists
                .into_iter()
                .filter_map(|a| a.name)
                .filter(|n| !n.is_empty())
                .collect(),
            duration_ms: self.duration_ms.unwrap_or(0),
            external_url,
            id,
        })
    }
}

/// Map a search response body into candidates, dropping items without an id.
pub fn parse_search_response(body: &str) -> Result<Vec<CatalogCandidate>> {
    if body.trim().is_empty() {
        return Ok(Vec::new());
    }
    let envelope: SearchEnvelope = serde_json::from_str(body)?;
    Ok(envelope
        .tracks
        .map(|page| page.items)
        .unwrap_or_default()
        .into_iter()
        .flatten()
        .filter_map(TrackItem::into_candidate)
        .collect())
}

/// Classify a non-success HTTP status.
pub fn status_error(status: u16, retry_after: Option<u64>, body: String) -> RelinkError {
    match status {
        401 | 403 => RelinkError::Unauthorized(body),
        429 => RelinkError::RateLimited { retry_after },
        _ => RelinkError::Api {
            status,
            message: body,
        },
    }
}

#[derive(Debug, Clone)]
pub struct SpotifyCatalog {
    base_url: Url,
    access_token: Option<String>,
    client: Client,
    limit: usize,
}

#[derive(Default)]
pub struct SpotifyCatalogBuilder {
    base_url: Option<String>,
    access_token: Option<String>,
    limit: Option<usize>,
    timeout: Option<Duration>,
}

impl SpotifyCatalogBuilder {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn base_url(mut self, url: &str) -> Self {
        self.base_url = Some(url.to_string());
        self
    }

    /// Empty tokens count as "not linked".
    pub fn access_token(mut self, token: Option<String>) -> Self {
        self.access_token = token.filter(|t| !t.trim().is_empty());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn build(self) -> Result<SpotifyCatalog> {
        let mut base = self.base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base)?;

        let client = Client::builder()
            .timeout(self.timeout.unwrap_or(Duration::from_secs(15)))
            .build()?;

        Ok(SpotifyCatalog {
            base_url,
            access_token: self.access_token,
            client,
            limit: self.limit.unwrap_or(5).clamp(1, 50),
        })
    }
}

impl SpotifyCatalog {
    fn search_url(&self, query: &str) -> Result<Url> {
        let mut url = self.base_url.join("v1/search")?;
        url.query_pairs_mut()
            .append_pair("q", query)
            .append_pair("type", "track")
            .append_pair("limit", &self.limit.to_string());
        Ok(url)
    }
}

#[async_trait]
impl SearchCatalog for SpotifyCatalog {
    fn name(&self) -> &'static str {
        "Spotify"
    }

    async fn search(&self, query: &str) -> Result<Vec<CatalogCandidate>> {
        let token = self.access_token.as_deref().ok_or(RelinkError::NotLinked)?;
        let url = self.search_url(query)?;
        debug!("Request: GET {}", url);

        let response = self.client.get(url).bearer_auth(token).send().await?;
        let status = response.status();
        if status.is_success() {
            let text = response.text().await?;
            return parse_search_response(&text);
        }

        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok());
        let text = response
            .text()
            .await
            .unwrap_or_else(|_| "Could not read error body".to_string());
        Err(status_error(status.as_u16(), retry_after, text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_search_response() {
        let body = r#"{
            "tracks": {
                "items": [
                    {
                        "id": "abc",
                        "name": "One More Time",
                        "artists": [{"name": "Daft Punk"}, {"name": null}],
                        "duration_ms": 320357,
                        "external_urls": {"spotify": "https://open.spotify.com/track/abc"}
                    },
                    {"name": "No Id"},
                    null,
                    {"id": "def", "name": "Bare"}
                ]
            }
        }"#;
        let candidates = parse_search_response(body).unwrap();
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].id, "abc");
        assert_eq!(candidates[0].artists, vec!["Daft Punk"]);
        assert_eq!(candidates[0].duration_ms, 320357);
        assert_eq!(candidates[1].external_url, "https://open.spotify.com/track/def");
        assert_eq!(candidates[1].duration_ms, 0);
    }

    #[test]
    fn test_parse_empty_bodies() {
        assert!(parse_search_response("").unwrap().is_empty());
        assert!(parse_search_response("{}").unwrap().is_empty());
        assert!(parse_search_response("not json").is_err());
    }

    #[test]
    fn test_status_mapping() {
        assert!(status_error(401, None, String::new()).is_authorization());
        assert!(status_error(403, None, String::new()).is_authorization());
        assert!(matches!(
            status_error(429, Some(3), String::new()),
            RelinkError::RateLimited { retry_after: Some(3) }
        ));
        let server = status_error(503, None, "busy".to_string());
        assert!(!server.is_authorization());
        assert_eq!(server.tag(), "transient");
    }

    #[test]
    fn test_search_url() {
        let catalog = SpotifyCatalogBuilder::new()
            .base_url("http://localhost:9000")
            .limit(7)
            .build()
            .unwrap();
        let url = catalog.search_url(r#"track:"Song" artist:"A""#).unwrap();
        assert_eq!(url.path(), "/v1/search");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("q".to_string(), r#"track:"Song" artist:"A""#.to_string())));
        assert!(pairs.contains(&("limit".to_string(), "7".to_string())));
    }

    #[tokio::test]
    async fn test_missing_token_is_not_linked() {
        let catalog = SpotifyCatalogBuilder::new()
            .access_token(Some("  ".to_string()))
            .build()
            .unwrap();
        let err = catalog.search("anything").await.unwrap_err();
        assert!(matches!(err, RelinkError::NotLinked));
    }
}
