//! Contracts for the remote rating-service collaborators.
//!
//! The orchestrator consumes these traits and never sees a transport
//! error: clients log their own failures (timeout, rate limit, malformed
//! response) and answer `None`, which the pipeline reads as "no data
//! available this run", never "permanently absent".

use std::future::Future;

/// A search match from a remote service.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    /// The service's identifier for the matched work.
    pub id: String,
    /// The title the service matched on, for diagnostics.
    pub raw_title: String,
    /// Score in the service's native scale; 0.0 when unknown.
    pub score: f64,
    /// Vote/member count; 0 when unknown.
    pub votes: u64,
    /// Cross-service identifier the service links to (e.g. the IMDb id
    /// MyAnimeList lists under external links).
    pub secondary_id: Option<String>,
}

/// Score data for an already-known identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreDetails {
    pub score: f64,
    pub votes: u64,
    pub secondary_id: Option<String>,
}

/// A remote search/detail service.
pub trait RemoteCatalog: Send + Sync {
    /// Search by (cleaned) title, optionally biased by release year.
    fn search(
        &self,
        title: &str,
        year: Option<i32>,
    ) -> impl Future<Output = Option<SearchHit>> + Send;

    /// Fetch score data for a known identifier.
    fn details(&self, id: &str) -> impl Future<Output = Option<ScoreDetails>> + Send;
}
