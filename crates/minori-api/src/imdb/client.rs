use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use tracing::{debug, warn};
use url::Url;

use minori_core::remote::{RemoteCatalog, ScoreDetails, SearchHit};

use super::types::{SuggestItem, SuggestResponse};
use crate::error::ApiError;
use crate::limiter::{RateLimiter, RetryOnce};

const SUGGEST_URL: &str = "https://v2.sg.media-imdb.com/suggestion";
const TITLE_URL: &str = "https://www.imdb.com/title";
// IMDb serves bot agents a stripped page without the rating markup.
const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// IMDb client. Search goes through the suggestion API, sharded by the
/// query's first character; the rating itself is read from the title
/// page's embedded JSON-LD fields.
pub struct ImdbClient {
    http: reqwest::Client,
    limiter: RateLimiter,
    retry_backoff: Duration,
}

impl ImdbClient {
    pub fn new(
        timeout: Duration,
        min_interval: Duration,
        retry_backoff: Duration,
    ) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            http,
            limiter: RateLimiter::new(min_interval),
            retry_backoff,
        })
    }

    /// Rate-limited GET with a single bounded retry on HTTP 429.
    async fn get(&self, url: &str) -> Result<reqwest::Response, ApiError> {
        let mut retry = RetryOnce::default();
        loop {
            self.limiter.acquire().await;
            let resp = self
                .http
                .get(url)
                .header("Accept-Language", "en-US,en;q=0.9")
                .send()
                .await?;

            if retry.should_retry(resp.status()) {
                warn!(url, backoff_secs = self.retry_backoff.as_secs(), "imdb rate limit hit, retrying once");
                tokio::time::sleep(self.retry_backoff).await;
                continue;
            }
            if !resp.status().is_success() {
                return Err(ApiError::Api {
                    status: resp.status().as_u16(),
                    message: String::new(),
                });
            }
            return Ok(resp);
        }
    }

    async fn suggest(&self, query: &str) -> Result<Vec<SuggestItem>, ApiError> {
        let Some(url) = suggest_url(query) else {
            return Ok(Vec::new());
        };
        let resp = self.get(url.as_str()).await?;
        let body: SuggestResponse = resp
            .json()
            .await
            .map_err(|e| ApiError::Parse(e.to_string()))?;
        Ok(body.results)
    }

    async fn title_rating(&self, id: &str) -> Result<Option<(f64, u64)>, ApiError> {
        let resp = self.get(&format!("{TITLE_URL}/{id}/")).await?;
        let html = resp.text().await?;
        Ok(parse_rating(&html))
    }
}

/// Build the sharded suggestion URL. The shard is the query's first
/// character lowercased, with anything outside ASCII alphanumerics
/// falling back to `x`; the query itself lands percent-encoded as the
/// final path segment.
fn suggest_url(query: &str) -> Option<Url> {
    let first = query.chars().next()?.to_ascii_lowercase();
    let shard = if first.is_ascii_alphanumeric() { first } else { 'x' };

    let mut url = Url::parse(SUGGEST_URL).ok()?;
    url.path_segments_mut()
        .ok()?
        .push(&shard.to_string())
        .push(&format!("{query}.json"));
    Some(url)
}

/// First suggestion that is a title. The payload interleaves people
/// (`nm…`) with titles (`tt…`) and is already popularity-ordered.
fn first_title(items: &[SuggestItem]) -> Option<&SuggestItem> {
    items.iter().find(|item| item.id.starts_with("tt"))
}

/// Extract the aggregate rating from a title page.
///
/// The page embeds JSON-LD with `"ratingValue": 8.9` (sometimes quoted)
/// and `"ratingCount": 12345`.
fn parse_rating(html: &str) -> Option<(f64, u64)> {
    static VALUE: OnceLock<Regex> = OnceLock::new();
    static COUNT: OnceLock<Regex> = OnceLock::new();
    let value = VALUE
        .get_or_init(|| Regex::new(r#""ratingValue":\s*"?([0-9]+\.?[0-9]*)"?"#).unwrap());
    let count = COUNT.get_or_init(|| Regex::new(r#""ratingCount":\s*([0-9]+)"#).unwrap());

    let score: f64 = value.captures(html)?.get(1)?.as_str().parse().ok()?;
    let votes: u64 = count
        .captures(html)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0);
    Some((score, votes))
}

impl RemoteCatalog for ImdbClient {
    async fn search(&self, title: &str, _year: Option<i32>) -> Option<SearchHit> {
        let items = match self.suggest(title).await {
            Ok(items) => items,
            Err(e) => {
                warn!(title, error = %e, "imdb suggest failed");
                return None;
            }
        };
        let candidate = first_title(&items)?;
        debug!(title, id = %candidate.id, matched = %candidate.title, "imdb suggestion accepted");

        // An unrated title is a miss, not an error.
        let (score, votes) = match self.title_rating(&candidate.id).await {
            Ok(rating) => rating?,
            Err(e) => {
                warn!(id = %candidate.id, error = %e, "imdb title fetch failed");
                return None;
            }
        };

        Some(SearchHit {
            id: candidate.id.clone(),
            raw_title: candidate.title.clone(),
            score,
            votes,
            secondary_id: None,
        })
    }

    async fn details(&self, id: &str) -> Option<ScoreDetails> {
        match self.title_rating(id).await {
            Ok(rating) => rating.map(|(score, votes)| ScoreDetails {
                score,
                votes,
                secondary_id: None,
            }),
            Err(e) => {
                warn!(id, error = %e, "imdb details fetch failed");
                None
            }
        }
    }
}
