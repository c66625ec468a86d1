//! Record types shared across the enrichment pipeline.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// The closed set of external rating sources a record can hold.
///
/// Used as the `ratings` map key; an unknown source name in a persisted
/// record fails that record's deserialization at the load boundary instead
/// of flowing through the pipeline untyped.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum RatingSource {
    MyAnimeList,
    Imdb,
    Douban,
}

impl RatingSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MyAnimeList => "myanimelist",
            Self::Imdb => "imdb",
            Self::Douban => "douban",
        }
    }
}

impl std::str::FromStr for RatingSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "myanimelist" => Ok(Self::MyAnimeList),
            "imdb" => Ok(Self::Imdb),
            "douban" => Ok(Self::Douban),
            other => Err(format!("unknown rating source: {other}")),
        }
    }
}

impl std::fmt::Display for RatingSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One source's rating data on a record.
///
/// `score` is in the source's native scale (MAL 0–10, Douban 0–10, IMDb
/// 0–10) and is never cross-normalized here. `votes` accepts the legacy
/// `members` spelling on input and always serializes as `votes`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingEntry {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub score: f64,
    #[serde(default, alias = "members")]
    pub votes: u64,
}

impl RatingEntry {
    /// An entry counts as resolved only with a non-empty identifier.
    pub fn has_id(&self) -> bool {
        self.id.as_deref().is_some_and(|id| !id.is_empty())
    }
}

/// One media item from the primary catalog.
///
/// Field names follow the upstream scraper's JSON. Fields this subsystem
/// does not interpret (Bahamut score, cover image, genres…) are carried
/// through `extra` so a save never drops upstream data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogRecord {
    pub id: String,
    /// Primary (Chinese) display title.
    #[serde(default)]
    pub title: String,
    /// Original-language (Japanese) title, preferred for reference lookups.
    #[serde(rename = "titleOriginal", default, skip_serializing_if = "Option::is_none")]
    pub title_original: Option<String>,
    /// English title, second lookup preference.
    #[serde(rename = "titleEnglish", default, skip_serializing_if = "Option::is_none")]
    pub title_english: Option<String>,
    /// Release year; 0 when unknown.
    #[serde(default)]
    pub year: i32,
    #[serde(default)]
    pub ratings: BTreeMap<RatingSource, RatingEntry>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl CatalogRecord {
    /// Year hint for matching, if known.
    pub fn year_hint(&self) -> Option<i32> {
        (self.year > 0).then_some(self.year)
    }

    /// Alternate-language titles in fixed lookup preference order.
    pub fn alternate_titles(&self) -> impl Iterator<Item = &str> {
        self.title_original
            .as_deref()
            .into_iter()
            .chain(self.title_english.as_deref())
            .filter(|t| !t.is_empty())
    }

    /// Whether `source` holds a resolved identifier.
    pub fn has_rating_id(&self, source: RatingSource) -> bool {
        self.ratings.get(&source).is_some_and(RatingEntry::has_id)
    }
}

/// Per-record progress through the pipeline, derived from the ratings map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrichmentState {
    Unenriched,
    PartiallyEnriched,
    FullyEnriched,
}

impl EnrichmentState {
    /// Classify a record against the configured source set.
    pub fn of(record: &CatalogRecord, sources: &[RatingSource]) -> Self {
        let resolved = sources
            .iter()
            .filter(|s| record.has_rating_id(**s))
            .count();
        if resolved == 0 && !sources.is_empty() {
            Self::Unenriched
        } else if resolved == sources.len() {
            Self::FullyEnriched
        } else {
            Self::PartiallyEnriched
        }
    }
}
