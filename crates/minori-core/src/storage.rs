//! JSON persistence for the enriched record collection.
//!
//! The on-disk format is a pretty-printed array of records, re-read as the
//! merge base on the next run. Merging is by record id: an updated record
//! replaces its own slot in place, new ids are appended, and ids absent
//! from the current input are preserved untouched — a save never silently
//! deletes anything.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::MinoriError;
use crate::models::CatalogRecord;

/// Load the primary input catalog. Its absence is the one fatal startup
/// error of the whole pipeline.
pub fn load_input(path: &Path) -> Result<Vec<CatalogRecord>, MinoriError> {
    if !path.exists() {
        return Err(MinoriError::MissingInput(path.display().to_string()));
    }
    let text = std::fs::read_to_string(path)?;
    parse_records(&text)
}

fn parse_records(text: &str) -> Result<Vec<CatalogRecord>, MinoriError> {
    // Per-record validation: a record that fails the schema (e.g. an
    // unknown rating source) is skipped with a warning instead of failing
    // the whole collection.
    let raw: Vec<serde_json::Value> = serde_json::from_str(text)?;
    let mut records = Vec::with_capacity(raw.len());
    for value in raw {
        match serde_json::from_value::<CatalogRecord>(value) {
            Ok(r) => records.push(r),
            Err(e) => warn!(error = %e, "skipping invalid record"),
        }
    }
    Ok(records)
}

/// The persisted collection plus its merge bookkeeping.
///
/// Keeps file order stable across runs: existing records stay where they
/// were, new records append in processing order. Stable order plus the
/// deterministic ratings-map order is what makes a no-op re-run
/// byte-identical.
pub struct CatalogStore {
    path: PathBuf,
    records: Vec<CatalogRecord>,
    by_id: HashMap<String, usize>,
}

impl CatalogStore {
    /// Open the store at `path`, loading any pre-existing collection as the
    /// merge base. A missing file starts an empty store; a malformed file
    /// is logged and also starts empty rather than aborting the run.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let records = match std::fs::read_to_string(&path) {
            Ok(text) => match parse_records(&text) {
                Ok(records) => {
                    info!(path = %path.display(), count = records.len(), "loaded persisted records");
                    records
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "could not parse persisted records, starting fresh");
                    Vec::new()
                }
            },
            Err(_) => Vec::new(),
        };
        let by_id = records
            .iter()
            .enumerate()
            .map(|(i, r)| (r.id.clone(), i))
            .collect();
        Self {
            path,
            records,
            by_id,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&CatalogRecord> {
        self.by_id.get(id).map(|&i| &self.records[i])
    }

    /// Insert or replace a record by id, preserving its file position.
    pub fn upsert(&mut self, record: CatalogRecord) {
        match self.by_id.get(&record.id) {
            Some(&i) => self.records[i] = record,
            None => {
                self.by_id.insert(record.id.clone(), self.records.len());
                self.records.push(record);
            }
        }
    }

    /// Flush the full collection to disk.
    pub fn save(&self) -> Result<(), MinoriError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(&self.records)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }
}
