use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::MinoriError;
use crate::models::RatingSource;

const DEFAULT_CONFIG: &str = include_str!("../../../config/default.toml");

/// Top-level pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub paths: PathsConfig,
    pub enrichment: EnrichmentConfig,
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Primary catalog from the upstream scraper (required at run time).
    pub catalog: PathBuf,
    /// Enriched output; merge base for resumed runs.
    pub enriched: PathBuf,
    /// Reference corpus (anime-offline-database JSONL).
    pub reference: PathBuf,
    /// Manual override table; may be absent.
    pub overrides: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentConfig {
    /// Records between incremental flushes.
    pub batch_size: usize,
    /// Sources to enrich, in processing order.
    pub sources: Vec<String>,
}

impl EnrichmentConfig {
    /// Parse the configured source names against the closed enum.
    pub fn parsed_sources(&self) -> Result<Vec<RatingSource>, MinoriError> {
        self.sources
            .iter()
            .map(|s| s.parse().map_err(MinoriError::Config))
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub request_timeout_secs: u64,
    pub mal_interval_ms: u64,
    pub imdb_interval_ms: u64,
    pub douban_interval_ms: u64,
    /// Backoff before the single permitted retry on a rate-limit response.
    pub retry_backoff_secs: u64,
}

impl AppConfig {
    /// Load from a user file, or the built-in defaults when `path` is None.
    pub fn load(path: Option<&Path>) -> Result<Self, MinoriError> {
        let config = match path {
            Some(p) => {
                let text = std::fs::read_to_string(p)
                    .map_err(|e| MinoriError::Config(format!("{}: {e}", p.display())))?;
                toml::from_str(&text).map_err(|e| MinoriError::Config(e.to_string()))?
            }
            None => Self::default(),
        };
        // Fail on bad source names now, not mid-run.
        config.enrichment.parsed_sources()?;
        Ok(config)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        toml::from_str(DEFAULT_CONFIG).expect("built-in default config is valid TOML")
    }
}
