use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use tracing::{debug, warn};

use minori_core::remote::{RemoteCatalog, ScoreDetails, SearchHit};

use super::types::SuggestItem;
use crate::error::ApiError;
use crate::limiter::{RateLimiter, RetryOnce};

const SUGGEST_URL: &str = "https://movie.douban.com/j/subject_suggest";
const SUBJECT_URL: &str = "https://movie.douban.com/subject";
// Douban blocks obvious bot agents outright.
const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const REFERER: &str = "https://movie.douban.com/";

/// Douban client. Search goes through the lightweight suggest API; the
/// rating itself only exists on the subject page, so a detail fetch
/// follows every accepted suggestion.
pub struct DoubanClient {
    http: reqwest::Client,
    limiter: RateLimiter,
    retry_backoff: Duration,
}

impl DoubanClient {
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
    async fn get(&self, url: &str, query: &[(&str, &str)]) -> Result<reqwest::Response, ApiError> {
        let mut retry = RetryOnce::default();
        loop {
            self.limiter.acquire().await;
            let resp = self
                .http
                .get(url)
                .query(query)
                .header("Referer", REFERER)
                .send()
                .await?;

            if retry.should_retry(resp.status()) {
                warn!(url, backoff_secs = self.retry_backoff.as_secs(), "douban rate limit hit, retrying once");
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

    async fn suggest(&self, title: &str) -> Result<Vec<SuggestItem>, ApiError> {
        let resp = self.get(SUGGEST_URL, &[("q", title)]).await?;
        resp.json().await.map_err(|e| ApiError::Parse(e.to_string()))
    }

    async fn subject_rating(&self, id: &str) -> Result<Option<(f64, u64)>, ApiError> {
        let resp = self.get(&format!("{SUBJECT_URL}/{id}/"), &[]).await?;
        let html = resp.text().await?;
        Ok(parse_rating(&html))
    }
}

/// Prefer the first candidate within ±1 of the wanted year; otherwise the
/// first result, mirroring the suggest endpoint's own relevance order.
fn pick_candidate<'a>(items: &'a [SuggestItem], year: Option<i32>) -> Option<&'a SuggestItem> {
    if let Some(want) = year {
        if let Some(by_year) = items
            .iter()
            .find(|item| item.year_i32().is_some_and(|have| (have - want).abs() <= 1))
        {
            return Some(by_year);
        }
    }
    items.first()
}

/// Extract the average rating and vote count from a subject page.
///
/// Target markup:
/// `<strong class="ll rating_num" property="v:average">9.1</strong>` and
/// `<span property="v:votes">12345</span>`.
fn parse_rating(html: &str) -> Option<(f64, u64)> {
    static AVERAGE: OnceLock<Regex> = OnceLock::new();
    static VOTES: OnceLock<Regex> = OnceLock::new();
    let average = AVERAGE
        .get_or_init(|| Regex::new(r#"property="v:average"[^>]*>\s*([0-9.]+)\s*<"#).unwrap());
    let votes =
        VOTES.get_or_init(|| Regex::new(r#"property="v:votes"[^>]*>\s*([0-9]+)\s*<"#).unwrap());

    let score: f64 = average.captures(html)?.get(1)?.as_str().parse().ok()?;
    let votes: u64 = votes
        .captures(html)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0);
    Some((score, votes))
}

impl RemoteCatalog for DoubanClient {
    async fn search(&self, title: &str, year: Option<i32>) -> Option<SearchHit> {
        let items = match self.suggest(title).await {
            Ok(items) => items,
            Err(e) => {
                warn!(title, error = %e, "douban suggest failed");
                return None;
            }
        };
        let candidate = pick_candidate(&items, year)?;
        debug!(title, id = %candidate.id, matched = %candidate.title, "douban suggestion accepted");

        // An unrated subject is a miss, not an error.
        let (score, votes) = match self.subject_rating(&candidate.id).await {
            Ok(rating) => rating?,
            Err(e) => {
                warn!(id = %candidate.id, error = %e, "douban subject fetch failed");
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
        match self.subject_rating(id).await {
            Ok(rating) => rating.map(|(score, votes)| ScoreDetails {
                score,
                votes,
                secondary_id: None,
            }),
            Err(e) => {
                warn!(id, error = %e, "douban details fetch failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str, year: Option<&str>) -> SuggestItem {
        SuggestItem {
            id: id.into(),
            title: format!("title {id}"),
            year: year.map(Into::into),
        }
    }

    #[test]
    fn year_match_preferred_over_first() {
        let items = [item("a", Some("2010")), item("b", Some("2024"))];
        assert_eq!(pick_candidate(&items, Some(2024)).unwrap().id, "b");
    }

    #[test]
    fn year_tolerance_is_one() {
        let items = [item("a", Some("2022")), item("b", Some("2023"))];
        assert_eq!(pick_candidate(&items, Some(2024)).unwrap().id, "b");
    }

    #[test]
    fn falls_back_to_first_without_year_match() {
        let items = [item("a", Some("1995")), item("b", None)];
        assert_eq!(pick_candidate(&items, Some(2024)).unwrap().id, "a");
    }

    #[test]
    fn empty_suggestions_yield_none() {
        assert!(pick_candidate(&[], Some(2024)).is_none());
    }

    #[test]
    fn parses_rating_markup() {
        let html = r#"
            <strong class="ll rating_num" property="v:average">9.1</strong>
            <span property="v:votes">12345</span>
        "#;
        assert_eq!(parse_rating(html), Some((9.1, 12345)));
    }

    #[test]
    fn missing_votes_default_to_zero() {
        let html = r#"<strong property="v:average">7.8</strong>"#;
        assert_eq!(parse_rating(html), Some((7.8, 0)));
    }

    #[test]
    fn unrated_subject_is_none() {
        assert_eq!(parse_rating("<html><body>no rating here</body></html>"), None);
    }
}
