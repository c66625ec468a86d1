//! Enrichment orchestrator.
//!
//! Drives one record at a time through the per-source decision ladder:
//! manual override → cached identifier → local reference-index resolution →
//! remote search fallback. Already fully-enriched records are skipped
//! without any index or network activity, which is what makes an
//! interrupted run safely restartable. Progress is flushed to the store
//! every `batch_size` records and once unconditionally at the end.

use tracing::{debug, info, warn};

use crate::error::MinoriError;
use crate::index::ReferenceIndex;
use crate::models::{CatalogRecord, EnrichmentState, RatingEntry, RatingSource};
use crate::normalize::clean_title;
use crate::overrides::ManualOverrides;
use crate::remote::RemoteCatalog;
use crate::storage::CatalogStore;

/// Counters reported at the end of a run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Records that went through the decision ladder.
    pub processed: usize,
    /// Records already fully enriched at run start.
    pub skipped: usize,
    /// Processed records that gained or changed at least one entry.
    pub updated: usize,
    /// Records whose processing failed; their prior state is untouched.
    pub failed: usize,
}

/// The enrichment engine for one run. Index and override table are built
/// before any mutation begins and shared read-only; the orchestrator is
/// the sole owner of the mutable record collection while running.
pub struct Enricher<'a, M, I, D> {
    index: &'a ReferenceIndex,
    overrides: &'a ManualOverrides,
    mal: &'a M,
    imdb: &'a I,
    douban: &'a D,
    sources: Vec<RatingSource>,
    batch_size: usize,
}

impl<'a, M: RemoteCatalog, I: RemoteCatalog, D: RemoteCatalog> Enricher<'a, M, I, D> {
    pub fn new(
        index: &'a ReferenceIndex,
        overrides: &'a ManualOverrides,
        mal: &'a M,
        imdb: &'a I,
        douban: &'a D,
        sources: Vec<RatingSource>,
        batch_size: usize,
    ) -> Self {
        Self {
            index,
            overrides,
            mal,
            imdb,
            douban,
            sources,
            batch_size: batch_size.max(1),
        }
    }

    /// Enrich `input` against the store's merge base, flushing incrementally.
    ///
    /// For each input record the persisted version, when present, is the
    /// base — enrichment is monotonic and never regresses persisted data.
    /// A per-record failure is logged and leaves that record's prior
    /// persisted state intact; it never aborts the batch.
    pub async fn run(
        &self,
        input: Vec<CatalogRecord>,
        store: &mut CatalogStore,
    ) -> Result<RunSummary, MinoriError> {
        let mut summary = RunSummary::default();
        let total = input.len();

        for (i, incoming) in input.into_iter().enumerate() {
            let mut current = match store.get(&incoming.id) {
                Some(existing) => existing.clone(),
                None => incoming,
            };

            // A pending manual override must land even on a record that is
            // already fully enriched — it is the one thing allowed to
            // replace existing data.
            let skip = EnrichmentState::of(&current, &self.sources)
                == EnrichmentState::FullyEnriched
                && !self.overrides.contains(&current.id);

            if skip {
                debug!(record = %current.id, "already fully enriched, skipping");
                store.upsert(current);
                summary.skipped += 1;
            } else {
                match self.enrich_record(&mut current).await {
                    Ok(changed) => {
                        store.upsert(current);
                        summary.processed += 1;
                        if changed {
                            summary.updated += 1;
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "record processing failed, keeping prior state");
                        summary.failed += 1;
                    }
                }
            }

            if (i + 1) % self.batch_size == 0 {
                info!(progress = i + 1, total, "incremental flush");
                if let Err(e) = store.save() {
                    warn!(error = %e, "incremental flush failed, continuing");
                }
            }
        }

        store.save()?;
        info!(
            processed = summary.processed,
            skipped = summary.skipped,
            updated = summary.updated,
            failed = summary.failed,
            "enrichment run complete"
        );
        Ok(summary)
    }

    /// Run the per-source ladder on one record. Returns whether anything
    /// was written.
    async fn enrich_record(&self, record: &mut CatalogRecord) -> Result<bool, MinoriError> {
        // The id is the merge key; a record without one can never be
        // found again in the store, so it is rejected here rather than
        // written under a blank key.
        if record.id.trim().is_empty() {
            return Err(MinoriError::InvalidRecord(format!(
                "record {:?} has no id",
                record.title
            )));
        }

        // Manual overrides first; overridden sources skip automation.
        let overridden = self.overrides.apply(record);
        let mut changed = !overridden.is_empty();

        for source in &self.sources {
            if overridden.contains(source) {
                continue;
            }
            changed |= match source {
                RatingSource::MyAnimeList => self.enrich_mal(record).await,
                RatingSource::Imdb => self.enrich_imdb(record).await,
                RatingSource::Douban => self.enrich_douban(record).await,
            };
        }
        Ok(changed)
    }

    // ── MyAnimeList ─────────────────────────────────────────────────────

    async fn enrich_mal(&self, record: &mut CatalogRecord) -> bool {
        const SOURCE: RatingSource = RatingSource::MyAnimeList;

        // A cached identifier is never re-validated; only an entry that
        // lost its score gets a details re-fetch.
        if let Some(cached_id) = cached_id_needing_score(record, SOURCE) {
            return self.refetch_details(record, SOURCE, &cached_id).await;
        }
        if record.has_rating_id(SOURCE) {
            return false;
        }

        let year = record.year_hint();
        let queries: Vec<String> = record
            .alternate_titles()
            .map(clean_title)
            .filter(|t| !t.is_empty())
            .collect();

        // Local resolution: each alternate title in preference order until
        // one hits the reference index.
        for query in &queries {
            let Some(mal_id) = self.index.lookup(query, year, None) else {
                continue;
            };
            debug!(record = %record.id, query = %query, mal_id, "resolved via reference index");
            let id = mal_id.to_string();
            match self.mal.details(&id).await {
                Some(details) => {
                    record.ratings.insert(
                        SOURCE,
                        RatingEntry {
                            id: Some(id),
                            score: details.score,
                            votes: details.votes,
                        },
                    );
                    record_secondary_id(record, details.secondary_id);
                    return true;
                }
                None => {
                    // Logged at the client; leave unpopulated this run.
                    warn!(record = %record.id, mal_id, "details fetch failed, source left empty");
                    return false;
                }
            }
        }

        // Last resort: the rate-limited remote search.
        let Some(query) = queries.first() else {
            debug!(record = %record.id, "no alternate title to search with");
            return false;
        };
        match self.mal.search(query, year).await {
            Some(hit) => {
                info!(record = %record.id, id = %hit.id, matched = %hit.raw_title, "resolved via remote search");
                record.ratings.insert(
                    SOURCE,
                    RatingEntry {
                        id: Some(hit.id),
                        score: hit.score,
                        votes: hit.votes,
                    },
                );
                record_secondary_id(record, hit.secondary_id);
                true
            }
            None => {
                debug!(record = %record.id, query = %query, "remote search found nothing");
                false
            }
        }
    }

    // ── IMDb ────────────────────────────────────────────────────────────

    async fn enrich_imdb(&self, record: &mut CatalogRecord) -> bool {
        const SOURCE: RatingSource = RatingSource::Imdb;

        // The MyAnimeList external-links linkage leaves an id-only entry;
        // completing its score is the common path here.
        if let Some(cached_id) = cached_id_needing_score(record, SOURCE) {
            return self.refetch_details(record, SOURCE, &cached_id).await;
        }
        if record.has_rating_id(SOURCE) {
            return false;
        }

        // No local corpus carries IMDb ids, so without a linkage the
        // suggestion search over the alternate titles is the only path.
        let queries: Vec<String> = record
            .alternate_titles()
            .map(clean_title)
            .filter(|t| !t.is_empty())
            .collect();
        for query in &queries {
            let Some(hit) = self.imdb.search(query, record.year_hint()).await else {
                continue;
            };
            info!(record = %record.id, id = %hit.id, matched = %hit.raw_title, "resolved imdb via suggestion search");
            record.ratings.insert(
                SOURCE,
                RatingEntry {
                    id: Some(hit.id),
                    score: hit.score,
                    votes: hit.votes,
                },
            );
            return true;
        }
        debug!(record = %record.id, "no imdb match");
        false
    }

    // ── Douban ──────────────────────────────────────────────────────────

    async fn enrich_douban(&self, record: &mut CatalogRecord) -> bool {
        const SOURCE: RatingSource = RatingSource::Douban;

        if let Some(cached_id) = cached_id_needing_score(record, SOURCE) {
            return self.refetch_details(record, SOURCE, &cached_id).await;
        }
        if record.has_rating_id(SOURCE) {
            return false;
        }

        // The reference corpus carries no Douban ids, so the primary-title
        // remote search is the only resolution path.
        let query = clean_title(&record.title);
        if query.is_empty() {
            return false;
        }
        match self.douban.search(&query, record.year_hint()).await {
            Some(hit) => {
                info!(record = %record.id, id = %hit.id, "resolved douban via remote search");
                record.ratings.insert(
                    SOURCE,
                    RatingEntry {
                        id: Some(hit.id),
                        score: hit.score,
                        votes: hit.votes,
                    },
                );
                true
            }
            None => false,
        }
    }

    // ── Shared steps ────────────────────────────────────────────────────

    /// Complete a cached identifier whose score is missing.
    async fn refetch_details(
        &self,
        record: &mut CatalogRecord,
        source: RatingSource,
        id: &str,
    ) -> bool {
        let details = match source {
            RatingSource::MyAnimeList => self.mal.details(id).await,
            RatingSource::Imdb => self.imdb.details(id).await,
            RatingSource::Douban => self.douban.details(id).await,
        };
        let Some(details) = details else {
            debug!(record = %record.id, source = %source, "score re-fetch failed");
            return false;
        };
        if let Some(entry) = record.ratings.get_mut(&source) {
            entry.score = details.score;
            entry.votes = details.votes;
        }
        record_secondary_id(record, details.secondary_id);
        true
    }
}

/// Identifier of a cached entry that still lacks score data, if any.
fn cached_id_needing_score(record: &CatalogRecord, source: RatingSource) -> Option<String> {
    let entry = record.ratings.get(&source)?;
    (entry.has_id() && entry.score == 0.0)
        .then(|| entry.id.clone())
        .flatten()
}

/// Record a cross-linked IMDb id as an id-only entry. Never touches an
/// entry that already holds an identifier.
fn record_secondary_id(record: &mut CatalogRecord, secondary_id: Option<String>) {
    let Some(id) = secondary_id.filter(|id| !id.is_empty()) else {
        return;
    };
    if record.has_rating_id(RatingSource::Imdb) {
        return;
    }
    debug!(record = %record.id, imdb = %id, "recording cross-linked imdb id");
    record.ratings.insert(
        RatingSource::Imdb,
        RatingEntry {
            id: Some(id),
            score: 0.0,
            votes: 0,
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{ScoreDetails, SearchHit};
    use std::collections::HashMap;
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scripted in-memory stand-in for a remote service.
    #[derive(Default)]
    struct FakeService {
        search_hits: HashMap<String, SearchHit>,
        details: HashMap<String, ScoreDetails>,
        calls: AtomicUsize,
    }

    impl FakeService {
        fn with_details(mut self, id: &str, score: f64, votes: u64) -> Self {
            self.details.insert(
                id.into(),
                ScoreDetails { score, votes, secondary_id: None },
            );
            self
        }

        fn with_linked_details(mut self, id: &str, score: f64, imdb: &str) -> Self {
            self.details.insert(
                id.into(),
                ScoreDetails { score, votes: 100, secondary_id: Some(imdb.into()) },
            );
            self
        }

        fn with_search_hit(mut self, query: &str, hit: SearchHit) -> Self {
            self.search_hits.insert(query.into(), hit);
            self
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl RemoteCatalog for FakeService {
        async fn search(&self, title: &str, _year: Option<i32>) -> Option<SearchHit> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.search_hits.get(title).cloned()
        }

        async fn details(&self, id: &str) -> Option<ScoreDetails> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.details.get(id).cloned()
        }
    }

    fn test_corpus() -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        let line = serde_json::json!({
            "sources": ["https://myanimelist.net/anime/999"],
            "title": "Tesuto Anime",
            "synonyms": ["Test Anime"],
            "animeSeason": { "year": 2022 },
            "type": "TV",
        });
        writeln!(f, "{line}").unwrap();
        f
    }

    fn record(json: serde_json::Value) -> CatalogRecord {
        serde_json::from_value(json).unwrap()
    }

    fn sources() -> Vec<RatingSource> {
        vec![RatingSource::MyAnimeList, RatingSource::Douban]
    }

    fn store(dir: &tempfile::TempDir) -> CatalogStore {
        CatalogStore::open(dir.path().join("enriched.json"))
    }

    #[tokio::test]
    async fn end_to_end_local_resolution() {
        let corpus = test_corpus();
        let index = ReferenceIndex::new(corpus.path());
        let overrides = ManualOverrides::default();
        let mal = FakeService::default().with_details("999", 8.2, 54321);
        let imdb = FakeService::default();
        let douban = FakeService::default();
        let dir = tempfile::tempdir().unwrap();
        let mut store = store(&dir);

        let input = vec![record(serde_json::json!({
            "id": "42",
            "title": "測試",
            "titleOriginal": "Test Anime",
            "year": 2022,
        }))];

        let enricher = Enricher::new(&index, &overrides, &mal, &imdb, &douban, sources(), 10);
        let summary = enricher.run(input, &mut store).await.unwrap();

        assert_eq!(summary.processed, 1);
        let saved = store.get("42").unwrap();
        let mal_entry = &saved.ratings[&RatingSource::MyAnimeList];
        assert_eq!(mal_entry.id.as_deref(), Some("999"));
        assert_eq!(mal_entry.score, 8.2);
        assert_ne!(
            EnrichmentState::of(saved, &sources()),
            EnrichmentState::Unenriched
        );
    }

    #[tokio::test]
    async fn fully_enriched_records_skip_all_calls() {
        let index = ReferenceIndex::new("/nonexistent.jsonl");
        let overrides = ManualOverrides::default();
        let mal = FakeService::default();
        let imdb = FakeService::default();
        let douban = FakeService::default();
        let dir = tempfile::tempdir().unwrap();
        let mut store = store(&dir);

        let input = vec![record(serde_json::json!({
            "id": "1",
            "title": "done",
            "ratings": {
                "myanimelist": { "id": "10", "score": 8.0, "votes": 1 },
                "douban": { "id": "d1", "score": 9.0, "votes": 2 },
            }
        }))];

        let enricher = Enricher::new(&index, &overrides, &mal, &imdb, &douban, sources(), 10);
        let summary = enricher.run(input, &mut store).await.unwrap();

        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.processed, 0);
        assert_eq!(mal.call_count(), 0);
        assert_eq!(imdb.call_count(), 0);
        assert_eq!(douban.call_count(), 0);
    }

    #[tokio::test]
    async fn second_run_is_byte_identical_and_quiet() {
        let corpus = test_corpus();
        let index = ReferenceIndex::new(corpus.path());
        let overrides = ManualOverrides::default();
        let mal = FakeService::default().with_details("999", 8.2, 54321);
        let imdb = FakeService::default();
        let douban = FakeService::default().with_search_hit(
            "測試",
            SearchHit {
                id: "d77".into(),
                raw_title: "測試".into(),
                score: 9.0,
                votes: 300,
                secondary_id: None,
            },
        );
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("enriched.json");

        let input = vec![record(serde_json::json!({
            "id": "42",
            "title": "測試",
            "titleOriginal": "Test Anime",
            "year": 2022,
        }))];

        let enricher = Enricher::new(&index, &overrides, &mal, &imdb, &douban, sources(), 10);

        let mut store = CatalogStore::open(&path);
        enricher.run(input.clone(), &mut store).await.unwrap();
        let first = std::fs::read(&path).unwrap();
        let calls_after_first = mal.call_count() + douban.call_count();

        let mut store = CatalogStore::open(&path);
        let summary = enricher.run(input, &mut store).await.unwrap();
        let second = std::fs::read(&path).unwrap();

        assert_eq!(first, second);
        assert_eq!(summary.skipped, 1);
        assert_eq!(mal.call_count() + douban.call_count(), calls_after_first);
    }

    #[tokio::test]
    async fn manual_override_beats_existing_automated_value() {
        let index = ReferenceIndex::new("/nonexistent.jsonl");
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(
            f,
            r#"{{ "5": {{ "myanimelist": {{ "id": "777", "score": 9.9, "votes": 1 }} }} }}"#
        )
        .unwrap();
        let overrides = ManualOverrides::load(f.path());
        let mal = FakeService::default();
        let imdb = FakeService::default();
        let douban = FakeService::default();
        let dir = tempfile::tempdir().unwrap();
        let mut store = store(&dir);

        let input = vec![record(serde_json::json!({
            "id": "5",
            "title": "x",
            "ratings": { "myanimelist": { "id": "111", "score": 6.0, "votes": 10 } }
        }))];

        let enricher = Enricher::new(
            &index,
            &overrides,
            &mal,
            &imdb,
            &douban,
            vec![RatingSource::MyAnimeList],
            10,
        );
        enricher.run(input, &mut store).await.unwrap();

        let mal_entry = &store.get("5").unwrap().ratings[&RatingSource::MyAnimeList];
        assert_eq!(mal_entry.id.as_deref(), Some("777"));
        assert_eq!(mal_entry.score, 9.9);
        // Overridden source is never re-resolved automatically.
        assert_eq!(mal.call_count(), 0);
    }

    #[tokio::test]
    async fn remote_search_is_the_last_resort() {
        let index = ReferenceIndex::new("/nonexistent.jsonl");
        let overrides = ManualOverrides::default();
        let mal = FakeService::default().with_search_hit(
            "Unknown Show",
            SearchHit {
                id: "314".into(),
                raw_title: "Unknown Show".into(),
                score: 7.5,
                votes: 42,
                secondary_id: Some("tt0111161".into()),
            },
        );
        let imdb = FakeService::default();
        let douban = FakeService::default();
        let dir = tempfile::tempdir().unwrap();
        let mut store = store(&dir);

        let input = vec![record(serde_json::json!({
            "id": "9",
            "title": "未知",
            "titleOriginal": "Unknown Show",
            "year": 2020,
        }))];

        let enricher = Enricher::new(
            &index,
            &overrides,
            &mal,
            &imdb,
            &douban,
            vec![RatingSource::MyAnimeList],
            10,
        );
        enricher.run(input, &mut store).await.unwrap();

        let saved = store.get("9").unwrap();
        assert_eq!(
            saved.ratings[&RatingSource::MyAnimeList].id.as_deref(),
            Some("314")
        );
        // The cross-linked IMDb id lands as an id-only entry.
        let imdb = &saved.ratings[&RatingSource::Imdb];
        assert_eq!(imdb.id.as_deref(), Some("tt0111161"));
        assert_eq!(imdb.score, 0.0);
    }

    #[tokio::test]
    async fn details_failure_leaves_source_unpopulated() {
        let corpus = test_corpus();
        let index = ReferenceIndex::new(corpus.path());
        let overrides = ManualOverrides::default();
        // No details scripted for id 999 → fetch yields None.
        let mal = FakeService::default();
        let imdb = FakeService::default();
        let douban = FakeService::default();
        let dir = tempfile::tempdir().unwrap();
        let mut store = store(&dir);

        let input = vec![record(serde_json::json!({
            "id": "42",
            "title": "測試",
            "titleOriginal": "Test Anime",
            "year": 2022,
        }))];

        let enricher = Enricher::new(
            &index,
            &overrides,
            &mal,
            &imdb,
            &douban,
            vec![RatingSource::MyAnimeList],
            10,
        );
        let summary = enricher.run(input, &mut store).await.unwrap();

        assert_eq!(summary.processed, 1);
        let saved = store.get("42").unwrap();
        assert!(!saved.has_rating_id(RatingSource::MyAnimeList));
    }

    #[tokio::test]
    async fn cached_id_without_score_is_completed() {
        let index = ReferenceIndex::new("/nonexistent.jsonl");
        let overrides = ManualOverrides::default();
        let mal = FakeService::default().with_linked_details("123", 8.8, "tt7654321");
        let imdb = FakeService::default();
        let douban = FakeService::default();
        let dir = tempfile::tempdir().unwrap();
        let mut store = store(&dir);

        let input = vec![record(serde_json::json!({
            "id": "3",
            "title": "x",
            "ratings": { "myanimelist": { "id": "123", "score": 0.0, "votes": 0 } }
        }))];

        let enricher = Enricher::new(
            &index,
            &overrides,
            &mal,
            &imdb,
            &douban,
            vec![RatingSource::MyAnimeList],
            10,
        );
        enricher.run(input, &mut store).await.unwrap();

        let saved = store.get("3").unwrap();
        let entry = &saved.ratings[&RatingSource::MyAnimeList];
        assert_eq!(entry.id.as_deref(), Some("123"));
        assert_eq!(entry.score, 8.8);
        assert_eq!(
            saved.ratings[&RatingSource::Imdb].id.as_deref(),
            Some("tt7654321")
        );
    }

    #[tokio::test]
    async fn secondary_id_never_overwrites_existing_imdb_entry() {
        let index = ReferenceIndex::new("/nonexistent.jsonl");
        let overrides = ManualOverrides::default();
        let mal = FakeService::default().with_linked_details("123", 8.8, "tt9999999");
        let imdb = FakeService::default();
        let douban = FakeService::default();
        let dir = tempfile::tempdir().unwrap();
        let mut store = store(&dir);

        let input = vec![record(serde_json::json!({
            "id": "3",
            "title": "x",
            "ratings": {
                "myanimelist": { "id": "123", "score": 0.0, "votes": 0 },
                "imdb": { "id": "tt0000001", "score": 8.0, "votes": 12 },
            }
        }))];

        let enricher = Enricher::new(
            &index,
            &overrides,
            &mal,
            &imdb,
            &douban,
            vec![RatingSource::MyAnimeList],
            10,
        );
        enricher.run(input, &mut store).await.unwrap();

        assert_eq!(
            store.get("3").unwrap().ratings[&RatingSource::Imdb]
                .id
                .as_deref(),
            Some("tt0000001")
        );
    }

    #[tokio::test]
    async fn douban_uses_cleaned_primary_title() {
        let index = ReferenceIndex::new("/nonexistent.jsonl");
        let overrides = ManualOverrides::default();
        let mal = FakeService::default();
        let imdb = FakeService::default();
        let douban = FakeService::default().with_search_hit(
            "鬼滅之刃 柱訓練篇",
            SearchHit {
                id: "35902155".into(),
                raw_title: "鬼滅之刃 柱訓練篇".into(),
                score: 9.1,
                votes: 8000,
                secondary_id: None,
            },
        );
        let dir = tempfile::tempdir().unwrap();
        let mut store = store(&dir);

        let input = vec![record(serde_json::json!({
            "id": "8",
            "title": "鬼滅之刃 柱訓練篇 [1]",
            "year": 2024,
        }))];

        let enricher = Enricher::new(
            &index,
            &overrides,
            &mal,
            &imdb,
            &douban,
            vec![RatingSource::Douban],
            10,
        );
        enricher.run(input, &mut store).await.unwrap();

        let entry = &store.get("8").unwrap().ratings[&RatingSource::Douban];
        assert_eq!(entry.id.as_deref(), Some("35902155"));
        assert_eq!(entry.score, 9.1);
    }

    #[tokio::test]
    async fn mal_linked_imdb_id_gains_a_score_in_the_same_run() {
        let corpus = test_corpus();
        let index = ReferenceIndex::new(corpus.path());
        let overrides = ManualOverrides::default();
        let mal = FakeService::default().with_linked_details("999", 8.2, "tt0213338");
        let imdb = FakeService::default().with_details("tt0213338", 8.9, 52733);
        let douban = FakeService::default();
        let dir = tempfile::tempdir().unwrap();
        let mut store = store(&dir);

        let input = vec![record(serde_json::json!({
            "id": "42",
            "title": "測試",
            "titleOriginal": "Test Anime",
            "year": 2022,
        }))];

        let enricher = Enricher::new(
            &index,
            &overrides,
            &mal,
            &imdb,
            &douban,
            vec![RatingSource::MyAnimeList, RatingSource::Imdb],
            10,
        );
        enricher.run(input, &mut store).await.unwrap();

        // The linkage writes the id, then the imdb pass completes it.
        let entry = &store.get("42").unwrap().ratings[&RatingSource::Imdb];
        assert_eq!(entry.id.as_deref(), Some("tt0213338"));
        assert_eq!(entry.score, 8.9);
        assert_eq!(entry.votes, 52733);
    }

    #[tokio::test]
    async fn imdb_search_used_when_mal_provides_no_link() {
        let index = ReferenceIndex::new("/nonexistent.jsonl");
        let overrides = ManualOverrides::default();
        let mal = FakeService::default();
        let imdb = FakeService::default().with_search_hit(
            "Unknown Show",
            SearchHit {
                id: "tt0111161".into(),
                raw_title: "Unknown Show".into(),
                score: 7.9,
                votes: 1500,
                secondary_id: None,
            },
        );
        let douban = FakeService::default();
        let dir = tempfile::tempdir().unwrap();
        let mut store = store(&dir);

        let input = vec![record(serde_json::json!({
            "id": "11",
            "title": "未知",
            "titleOriginal": "Unknown Show",
            "year": 2020,
        }))];

        let enricher = Enricher::new(
            &index,
            &overrides,
            &mal,
            &imdb,
            &douban,
            vec![RatingSource::Imdb],
            10,
        );
        enricher.run(input, &mut store).await.unwrap();

        let entry = &store.get("11").unwrap().ratings[&RatingSource::Imdb];
        assert_eq!(entry.id.as_deref(), Some("tt0111161"));
        assert_eq!(entry.score, 7.9);
    }

    #[tokio::test]
    async fn record_without_id_fails_without_aborting_the_run() {
        let index = ReferenceIndex::new("/nonexistent.jsonl");
        let overrides = ManualOverrides::default();
        let mal = FakeService::default();
        let imdb = FakeService::default();
        let douban = FakeService::default();
        let dir = tempfile::tempdir().unwrap();
        let mut store = store(&dir);

        let input = vec![
            record(serde_json::json!({ "id": "", "title": "orphan" })),
            record(serde_json::json!({ "id": "1", "title": "fine" })),
        ];

        let enricher = Enricher::new(&index, &overrides, &mal, &imdb, &douban, sources(), 10);
        let summary = enricher.run(input, &mut store).await.unwrap();

        assert_eq!(summary.failed, 1);
        assert_eq!(summary.processed, 1);
        assert!(store.get("1").is_some());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn incremental_flush_persists_partial_progress() {
        let index = ReferenceIndex::new("/nonexistent.jsonl");
        let overrides = ManualOverrides::default();
        let mal = FakeService::default();
        let imdb = FakeService::default();
        let douban = FakeService::default();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("enriched.json");
        let mut store = CatalogStore::open(&path);

        let input: Vec<CatalogRecord> = (0..25)
            .map(|i| record(serde_json::json!({ "id": i.to_string(), "title": "t" })))
            .collect();

        let enricher = Enricher::new(&index, &overrides, &mal, &imdb, &douban, sources(), 10);
        enricher.run(input, &mut store).await.unwrap();

        let reloaded = CatalogStore::open(&path);
        assert_eq!(reloaded.len(), 25);
    }
}
