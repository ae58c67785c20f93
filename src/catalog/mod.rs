//! Catalog search capability.
//!
//! The matcher only needs "search by query string"; everything about the
//! backing service (HTTP session, database, wire format) stays behind this
//! trait.

use async_trait::async_trait;

use crate::error::Result;
use crate::models::CatalogCandidate;

pub mod spotify;
pub mod sqlite;

pub use spotify::{SpotifyCatalog, SpotifyCatalogBuilder};
pub use sqlite::{CatalogWriter, SqliteCatalog};

#[async_trait]
pub trait SearchCatalog: Send + Sync {
    fn name(&self) -> &'static str;

    /// Run one search. Transient failures (network, rate limit, 5xx) are
    /// reported as errors the caller may skip; authorization failures are
    /// classified by `RelinkError::is_authorization`.
    async fn search(&self, query: &str) -> Result<Vec<CatalogCandidate>>;
}
