//! Error type shared by the matching engine and the catalog adapters.
//!
//! Catalog failures fall in two classes: transient ones (network, rate limits,
//! server errors) that only cost a single query, and authorization failures
//! that end the whole batch. `is_authorization` draws that line.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelinkError {
    #[error("catalog search failed: {0}")]
    Search(String),

    #[error("catalog rate limited (retry after {retry_after:?}s)")]
    RateLimited { retry_after: Option<u64> },

    #[error("no catalog account linked for this caller")]
    NotLinked,

    #[error("catalog authorization failed: {0}")]
    Unauthorized(String),

    #[error("catalog API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("catalog database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, RelinkError>;

impl RelinkError {
    /// Failures that retrying cannot fix: the caller has to re-link the account.
    pub fn is_authorization(&self) -> bool {
        match self {
            RelinkError::NotLinked | RelinkError::Unauthorized(_) => true,
            RelinkError::Api { status, .. } => matches!(status, 401 | 403),
            _ => false,
        }
    }

    /// Stable short tag surfaced in failed jobs, e.g. `not_linked`.
    pub fn tag(&self) -> &'static str {
        match self {
            RelinkError::NotLinked => "not_linked",
            RelinkError::Unauthorized(_) => "unauthorized",
            RelinkError::Api { status: 401 | 403, .. } => "unauthorized",
            RelinkError::RateLimited { .. } => "rate_limited",
            RelinkError::Search(_) | RelinkError::Http(_) | RelinkError::Api { .. } => "transient",
            RelinkError::Sqlite(_) => "catalog_db",
            RelinkError::Json(_) => "json",
            RelinkError::Url(_) => "url",
            RelinkError::Io(_) => "io",
            RelinkError::Config(_) => "config",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authorization_classes() {
        assert!(RelinkError::NotLinked.is_authorization());
        assert!(RelinkError::Unauthorized("expired".into()).is_authorization());
        assert!(RelinkError::Api {
            status: 401,
            message: String::new()
        }
        .is_authorization());
        assert!(!RelinkError::Api {
            status: 503,
            message: String::new()
        }
        .is_authorization());
        assert!(!RelinkError::RateLimited { retry_after: None }.is_authorization());
        assert!(!RelinkError::Search("timeout".into()).is_authorization());
    }

    #[test]
    fn test_tags() {
        assert_eq!(RelinkError::NotLinked.tag(), "not_linked");
        assert_eq!(RelinkError::Unauthorized("x".into()).tag(), "unauthorized");
        assert_eq!(
            RelinkError::Api {
                status: 403,
                message: String::new()
            }
            .tag(),
            "unauthorized"
        );
        assert_eq!(RelinkError::Search("x".into()).tag(), "transient");
    }
}
