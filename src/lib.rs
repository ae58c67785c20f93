//! relink: match local track metadata against a music catalog.
//!
//! Pipeline: `grouping` folds duplicate inputs, `matcher` searches the
//! catalog through `query` variants and ranks hits with `scoring`,
//! `threshold` calibrates acceptance per batch, and `jobs` runs batches in
//! the background for polling callers.

pub mod catalog;
pub mod config;
pub mod error;
pub mod grouping;
pub mod input;
pub mod jobs;
pub mod matcher;
pub mod models;
pub mod normalize;
pub mod progress;
pub mod query;
pub mod report;
pub mod safety;
pub mod scoring;
pub mod threshold;

pub use catalog::SearchCatalog;
pub use config::MatchConfig;
pub use error::{RelinkError, Result};
pub use jobs::JobTracker;
pub use matcher::{Matcher, NoProgress, ProgressSink};
pub use models::{
    BatchOutcome, CatalogCandidate, DuplicateGroup, JobStarted, JobState, LocalTrack, MatchJob,
    MatchResult, PollResponse,
};
