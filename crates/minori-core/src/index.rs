//! Reference-corpus index: canonical title key → candidate MAL ids.
//!
//! Built once per process by streaming the anime-offline-database JSONL
//! dump, then read-only. Entries without a MyAnimeList source URL are not
//! indexed — they can never be lookup targets here.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use serde::Deserialize;
use tracing::{debug, error, info, warn};

use crate::normalize::normalize;
use crate::resolver;

const MAL_URL_MARKER: &str = "myanimelist.net/anime/";

/// Corpus media type, used only as a collision-resolution hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaType {
    Tv,
    Movie,
    Ova,
    Ona,
    Special,
    Music,
    Unknown,
}

impl MediaType {
    fn parse(s: &str) -> Self {
        match s.to_ascii_uppercase().as_str() {
            "TV" => Self::Tv,
            "MOVIE" => Self::Movie,
            "OVA" => Self::Ova,
            "ONA" => Self::Ona,
            "SPECIAL" => Self::Special,
            "MUSIC" => Self::Music,
            _ => Self::Unknown,
        }
    }
}

/// One candidate under a canonical key.
#[derive(Debug, Clone)]
pub struct ReferenceEntry {
    pub mal_id: u32,
    pub year: Option<i32>,
    pub media_type: MediaType,
    /// Number of cross-catalog source links the corpus entry carries.
    /// More links ⇒ more likely the "main" entry for a shared title.
    pub alias_count: usize,
    /// Corpus display title, for diagnostics.
    pub title: String,
}

/// Shape of one corpus line (anime-offline-database).
#[derive(Debug, Deserialize)]
struct CorpusLine {
    #[serde(default)]
    sources: Vec<String>,
    #[serde(default)]
    title: String,
    #[serde(default)]
    synonyms: Vec<String>,
    #[serde(rename = "animeSeason", default)]
    season: CorpusSeason,
    #[serde(rename = "type", default)]
    media_type: String,
}

#[derive(Debug, Default, Deserialize)]
struct CorpusSeason {
    #[serde(default)]
    year: Option<i32>,
}

/// Title-keyed index over the reference corpus.
///
/// Loading is lazy: the first lookup builds the map if `load` was never
/// called, and calling `load` twice is a no-op. A missing or unreadable
/// corpus degrades to an empty index that answers `None` everywhere.
pub struct ReferenceIndex {
    path: PathBuf,
    map: OnceLock<HashMap<String, Vec<ReferenceEntry>>>,
}

impl ReferenceIndex {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            map: OnceLock::new(),
        }
    }

    /// Build the index now. Idempotent.
    pub fn load(&self) {
        let _ = self.entries();
    }

    fn entries(&self) -> &HashMap<String, Vec<ReferenceEntry>> {
        self.map.get_or_init(|| build_index(&self.path))
    }

    /// Number of distinct canonical keys.
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    /// Resolve a title to a single MAL id, or `None` when the key is absent.
    ///
    /// `year` and `media_type` are hints forwarded to the collision
    /// resolver when more than one candidate shares the key.
    pub fn lookup(
        &self,
        title: &str,
        year: Option<i32>,
        media_type: Option<MediaType>,
    ) -> Option<u32> {
        let key = normalize(title);
        if key.is_empty() {
            return None;
        }
        let candidates = self.entries().get(&key)?;
        match candidates.as_slice() {
            [] => None,
            [single] => Some(single.mal_id),
            many => {
                debug!(
                    key = %key,
                    candidates = many.len(),
                    "collision on canonical key"
                );
                Some(resolver::resolve(many, year, media_type))
            }
        }
    }
}

fn build_index(path: &Path) -> HashMap<String, Vec<ReferenceEntry>> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) => {
            error!(path = %path.display(), error = %e, "reference corpus not readable; index will be empty");
            return HashMap::new();
        }
    };

    info!(path = %path.display(), "building reference index");
    let mut map: HashMap<String, Vec<ReferenceEntry>> = HashMap::new();
    let mut entries = 0usize;
    let mut skipped = 0usize;

    for line in BufReader::new(file).lines() {
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                warn!(error = %e, "unreadable corpus line, stopping scan");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        let parsed: CorpusLine = match serde_json::from_str(&line) {
            Ok(p) => p,
            Err(_) => {
                skipped += 1;
                continue;
            }
        };
        if index_line(&mut map, &parsed) {
            entries += 1;
        }
    }

    info!(
        entries,
        skipped,
        keys = map.len(),
        "reference index built"
    );
    map
}

/// Index one corpus entry under its main title and all synonyms.
/// Returns false when the entry carries no MAL id and was skipped.
fn index_line(map: &mut HashMap<String, Vec<ReferenceEntry>>, line: &CorpusLine) -> bool {
    let Some(mal_id) = extract_mal_id(&line.sources) else {
        return false;
    };

    let entry = ReferenceEntry {
        mal_id,
        year: line.season.year,
        media_type: MediaType::parse(&line.media_type),
        alias_count: line.sources.len(),
        title: line.title.clone(),
    };

    for title in std::iter::once(line.title.as_str())
        .chain(line.synonyms.iter().map(String::as_str))
    {
        let key = normalize(title);
        if key.is_empty() {
            continue;
        }
        let candidates = map.entry(key).or_default();
        // One entry may reach the same key via several synonyms.
        if candidates.iter().all(|c| c.mal_id != entry.mal_id) {
            candidates.push(entry.clone());
        }
    }
    true
}

/// The MAL id is the numeric suffix of the matching source URL.
fn extract_mal_id(sources: &[String]) -> Option<u32> {
    sources
        .iter()
        .find(|s| s.contains(MAL_URL_MARKER))
        .and_then(|s| s.trim_end_matches('/').rsplit('/').next())
        .and_then(|tail| tail.parse().ok())
}
