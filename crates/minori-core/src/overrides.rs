//! Hand-curated override table.
//!
//! The one legitimate path that may replace previously-written enrichment
//! data. Loaded once at startup, read-only afterwards; the file maps an
//! internal record id to a partial per-source `RatingEntry` set:
//!
//! ```json
//! { "3017": { "myanimelist": { "id": "52991", "score": 9.3, "votes": 620000 } } }
//! ```

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

use serde::Deserialize;
use tracing::{info, warn};

use crate::models::{CatalogRecord, RatingEntry, RatingSource};

#[derive(Debug, Default, Deserialize)]
#[serde(transparent)]
struct OverrideFile(HashMap<String, BTreeMap<RatingSource, RatingEntry>>);

/// Manual override table keyed by internal record id.
#[derive(Debug, Default)]
pub struct ManualOverrides {
    entries: HashMap<String, BTreeMap<RatingSource, RatingEntry>>,
}

impl ManualOverrides {
    /// Load the table. An absent file is an empty table, not an error; a
    /// malformed file is logged and degrades to empty.
    pub fn load(path: &Path) -> Self {
        let text = match std::fs::read_to_string(path) {
            Ok(t) => t,
            Err(_) => {
                info!(path = %path.display(), "no manual override file");
                return Self::default();
            }
        };
        match serde_json::from_str::<OverrideFile>(&text) {
            Ok(file) => {
                info!(path = %path.display(), entries = file.0.len(), "loaded manual overrides");
                Self { entries: file.0 }
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "malformed override file ignored");
                Self::default()
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether an override entry exists for this record id.
    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Apply any overrides for this record, unconditionally replacing the
    /// listed sources. Returns the set of sources that were overridden so
    /// the orchestrator can skip automated resolution for them.
    pub fn apply(&self, record: &mut CatalogRecord) -> BTreeSet<RatingSource> {
        let Some(overrides) = self.entries.get(&record.id) else {
            return BTreeSet::new();
        };
        let mut applied = BTreeSet::new();
        for (source, entry) in overrides {
            info!(record = %record.id, source = %source, "applying manual override");
            record.ratings.insert(*source, entry.clone());
            applied.insert(*source);
        }
        applied
    }
}
