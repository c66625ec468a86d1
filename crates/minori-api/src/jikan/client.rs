use std::time::Duration;

use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use minori_core::remote::{RemoteCatalog, ScoreDetails, SearchHit};

use super::types::{FullResponse, JikanAnime, SearchResponse};
use crate::error::ApiError;
use crate::limiter::{RateLimiter, RetryOnce};

const BASE_URL: &str = "https://api.jikan.moe/v4";
const SEARCH_LIMIT: &str = "5";

/// Minimum normalized match confidence to accept a search result.
const MATCH_THRESHOLD: f64 = 0.6;
/// Confidence penalty when the candidate's year is off by more than one.
const YEAR_PENALTY: f64 = 0.2;

/// Jikan (MyAnimeList) client.
pub struct JikanClient {
    http: reqwest::Client,
    limiter: RateLimiter,
    retry_backoff: Duration,
}

impl JikanClient {
    pub fn new(
        timeout: Duration,
        min_interval: Duration,
        retry_backoff: Duration,
    ) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            limiter: RateLimiter::new(min_interval),
            retry_backoff,
        })
    }

    /// Rate-limited GET with a single bounded retry on HTTP 429.
    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<T, ApiError> {
        let mut retry = RetryOnce::default();
        loop {
            self.limiter.acquire().await;
            let resp = self.http.get(url).query(query).send().await?;

            if retry.should_retry(resp.status()) {
                warn!(url, backoff_secs = self.retry_backoff.as_secs(), "jikan rate limit hit, retrying once");
                tokio::time::sleep(self.retry_backoff).await;
                continue;
            }
            if !resp.status().is_success() {
                return Err(ApiError::Api {
                    status: resp.status().as_u16(),
                    message: resp.text().await.unwrap_or_default(),
                });
            }
            return resp
                .json()
                .await
                .map_err(|e| ApiError::Parse(e.to_string()));
        }
    }

    async fn search_anime(
        &self,
        query: &str,
        year: Option<i32>,
    ) -> Result<Option<SearchHit>, ApiError> {
        let response: SearchResponse = self
            .get_json(
                &format!("{BASE_URL}/anime"),
                &[("q", query), ("limit", SEARCH_LIMIT)],
            )
            .await?;

        let Some(best) = best_match(query, year, &response.data) else {
            debug!(query, "no jikan result above threshold");
            return Ok(None);
        };

        Ok(Some(SearchHit {
            id: best.mal_id.to_string(),
            raw_title: best.display_title().to_string(),
            score: best.score.unwrap_or(0.0),
            votes: best.members.unwrap_or(0),
            secondary_id: best.imdb_id(),
        }))
    }

    async fn fetch_details(&self, id: &str) -> Result<ScoreDetails, ApiError> {
        let response: FullResponse = self
            .get_json(&format!("{BASE_URL}/anime/{id}/full"), &[])
            .await?;
        Ok(ScoreDetails {
            score: response.data.score.unwrap_or(0.0),
            votes: response.data.members.unwrap_or(0),
            secondary_id: response.data.imdb_id(),
        })
    }
}

/// Pick the candidate with the best fuzzy title score, year-penalized.
///
/// Confidence is the best Skim score across the candidate's title variants,
/// normalized by the query's self-match score as in local library matching.
fn best_match<'a>(
    query: &str,
    year: Option<i32>,
    candidates: &'a [JikanAnime],
) -> Option<&'a JikanAnime> {
    let matcher = SkimMatcherV2::default();
    let query_lower = query.to_lowercase();
    let max_possible = matcher
        .fuzzy_match(&query_lower, &query_lower)
        .unwrap_or(1)
        .max(1) as f64;

    let mut best: Option<(&JikanAnime, f64)> = None;
    for candidate in candidates {
        let raw = candidate
            .titles()
            .filter_map(|t| matcher.fuzzy_match(&t.to_lowercase(), &query_lower))
            .max()
            .unwrap_or(0);
        let mut confidence = raw as f64 / max_possible;

        if let (Some(want), Some(have)) = (year, candidate.year) {
            if (want - have).abs() > 1 {
                confidence -= YEAR_PENALTY;
            }
        }

        if best.map_or(true, |(_, score)| confidence > score) {
            best = Some((candidate, confidence));
        }
    }

    best.filter(|&(_, confidence)| confidence >= MATCH_THRESHOLD)
        .map(|(candidate, _)| candidate)
}

impl RemoteCatalog for JikanClient {
    async fn search(&self, title: &str, year: Option<i32>) -> Option<SearchHit> {
        match self.search_anime(title, year).await {
            Ok(hit) => hit,
            Err(e) => {
                warn!(title, error = %e, "jikan search failed");
                None
            }
        }
    }

    async fn details(&self, id: &str) -> Option<ScoreDetails> {
        match self.fetch_details(id).await {
            Ok(details) => Some(details),
            Err(e) => {
                warn!(id, error = %e, "jikan details fetch failed");
                None
            }
        }
    }
}
