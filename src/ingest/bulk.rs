//! Bulk ingestion: schema check, marker cleaning, deduplication, and chunked
//! upserts.
//!
//! Each stage is a plain function so it can be tested on its own;
//! [`BulkIngestor`] drives them in order. Ingestion is chunk-atomic: every
//! chunk commits as one store transaction, and a failing chunk does not roll
//! back the chunks before it.

use serde::Serialize;
use std::collections::HashMap;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::cache::ResultCache;
use crate::catalog::store::{guarded, ProfileStore, StoreError, UpsertMode};
use crate::core::marker::{normalize_marker_value, MarkerMap};
use crate::core::profile::{
    Profile, ProfileSubmission, MAX_COUNTRY_LEN, MAX_HAPLOGROUP_LEN, MAX_KIT_LEN, MAX_NAME_LEN,
};
use crate::core::types::{count_to_f64, ErrorKind, KitId};

/// Profiles per store transaction
pub const DEFAULT_CHUNK_SIZE: usize = 500;

/// Largest accepted submission
pub const DEFAULT_MAX_BATCH: usize = 5000;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Invalid batch: {0}")]
    InvalidBatch(String),

    #[error("Invalid sample at index {index}: {reason}")]
    InvalidSchema { index: usize, reason: String },

    #[error("No valid samples to import ({skipped} samples had no valid markers)")]
    NoValidSamples { skipped: usize, cleaned_markers: usize },

    #[error(
        "Chunk {chunk_index} (starting at kit {first_kit}) failed after {inserted_so_far} profiles were written: {source}"
    )]
    ChunkUpsertFailed {
        chunk_index: usize,
        chunk_len: usize,
        first_kit: KitId,
        inserted_so_far: usize,
        #[source]
        source: StoreError,
    },
}

impl IngestError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidBatch(_) | Self::InvalidSchema { .. } => ErrorKind::InvalidSchema,
            Self::NoValidSamples { .. } => ErrorKind::NoValidSamples,
            Self::ChunkUpsertFailed { .. } => ErrorKind::ChunkUpsertFailed,
        }
    }
}

/// Options of one bulk ingestion call
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(default)]
pub struct BulkOptions {
    /// Overwrite kits that already exist in the store
    #[serde(alias = "replaceExisting")]
    pub replace_existing: bool,
}

impl Default for BulkOptions {
    fn default() -> Self {
        Self {
            replace_existing: true,
        }
    }
}

/// Outcome of a bulk ingestion call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestReport {
    /// Profiles written by the store, summed over chunks
    pub inserted: usize,
    /// Samples dropped for having no valid markers
    pub skipped: usize,
    /// Earlier occurrences of kits repeated within the submission
    pub duplicates_removed: usize,
    /// Non-blank marker values dropped by cleaning
    pub cleaned_markers: usize,
    /// Samples submitted
    pub total: usize,
    /// Chunks committed
    pub chunks: usize,
    pub duration_ms: u64,
    pub profiles_per_second: f64,
    /// Stopped at a chunk boundary by the progress callback
    pub cancelled: bool,
}

/// Progress after one committed chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkProgress {
    pub chunk_index: usize,
    pub chunks: usize,
    pub chunk_len: usize,
    pub inserted_so_far: usize,
}

/// Per-chunk progress callback; `Break` stops before the next chunk
pub type ProgressFn<'a> = dyn FnMut(&ChunkProgress) -> ControlFlow<()> + Send + 'a;

/// Output of the cleaning stage
#[derive(Debug, Clone, PartialEq)]
pub struct CleanedBatch {
    pub profiles: Vec<Profile>,
    pub skipped: usize,
    pub cleaned_markers: usize,
}

fn check_len(index: usize, field: &str, value: Option<&str>, max: usize) -> Result<(), IngestError> {
    match value {
        Some(v) if v.chars().count() > max => Err(IngestError::InvalidSchema {
            index,
            reason: format!("{field} must be at most {max} characters"),
        }),
        _ => Ok(()),
    }
}

/// Reject malformed submissions before any cleaning.
///
/// # Errors
///
/// Returns `IngestError::InvalidBatch` for an empty or oversized batch and
/// `IngestError::InvalidSchema` with the index of the first bad sample.
pub fn validate_schema(submissions: &[ProfileSubmission], max_batch: usize) -> Result<(), IngestError> {
    if submissions.is_empty() {
        return Err(IngestError::InvalidBatch("at least one sample is required".to_string()));
    }
    if submissions.len() > max_batch {
        return Err(IngestError::InvalidBatch(format!(
            "{} samples submitted, at most {max_batch} allowed",
            submissions.len()
        )));
    }

    for (index, sample) in submissions.iter().enumerate() {
        if sample.kit_number.trim().is_empty() {
            return Err(IngestError::InvalidSchema {
                index,
                reason: "kit number is required".to_string(),
            });
        }
        check_len(index, "kit number", Some(sample.kit_number.trim()), MAX_KIT_LEN)?;
        check_len(index, "name", sample.name.as_deref(), MAX_NAME_LEN)?;
        check_len(index, "country", sample.country.as_deref(), MAX_COUNTRY_LEN)?;
        check_len(index, "haplogroup", sample.haplogroup.as_deref(), MAX_HAPLOGROUP_LEN)?;
        if sample.markers.is_empty() {
            return Err(IngestError::InvalidSchema {
                index,
                reason: "markers must contain at least one entry".to_string(),
            });
        }
    }

    Ok(())
}

/// Raw text of a submitted value; `None` for values carrying no reading
fn raw_marker_text(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s.trim().to_string()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

/// Drop invalid marker values, and samples left without any.
///
/// Blank values are dropped silently; every other rejected value counts
/// toward `cleaned_markers`.
pub fn clean_markers(submissions: Vec<ProfileSubmission>) -> CleanedBatch {
    let mut profiles = Vec::with_capacity(submissions.len());
    let mut skipped = 0;
    let mut cleaned_markers = 0;

    for sample in submissions {
        let mut markers = MarkerMap::new();
        for (name, value) in &sample.markers {
            let Some(raw) = raw_marker_text(value).filter(|raw| !raw.is_empty()) else {
                continue;
            };
            let name = name.trim();
            match normalize_marker_value(&raw) {
                Some(valid) if !name.is_empty() => {
                    markers.insert(name.to_string(), valid);
                }
                _ => cleaned_markers += 1,
            }
        }

        if markers.is_empty() {
            skipped += 1;
            continue;
        }

        let trim_or_empty = |field: Option<String>| field.map(|v| v.trim().to_string()).unwrap_or_default();
        profiles.push(
            Profile::new(sample.kit_number.trim(), markers)
                .with_name(trim_or_empty(sample.name))
                .with_country(trim_or_empty(sample.country))
                .with_haplogroup(trim_or_empty(sample.haplogroup)),
        );
    }

    CleanedBatch {
        profiles,
        skipped,
        cleaned_markers,
    }
}

/// Keep the last occurrence of every kit, at the position of its first
/// occurrence. Returns the survivors and the number removed.
pub fn dedupe(profiles: Vec<Profile>) -> (Vec<Profile>, usize) {
    let mut positions: HashMap<KitId, usize> = HashMap::with_capacity(profiles.len());
    let mut survivors: Vec<Profile> = Vec::with_capacity(profiles.len());
    let mut removed = 0;

    for profile in profiles {
        if let Some(&position) = positions.get(&profile.kit_number) {
            survivors[position] = profile;
            removed += 1;
        } else {
            positions.insert(profile.kit_number.clone(), survivors.len());
            survivors.push(profile);
        }
    }

    (survivors, removed)
}

/// Split into chunks of at most `chunk_size` profiles
pub fn split_into_chunks(profiles: Vec<Profile>, chunk_size: usize) -> Vec<Vec<Profile>> {
    let chunk_size = chunk_size.max(1);
    let mut chunks = Vec::with_capacity(profiles.len().div_ceil(chunk_size));
    let mut iter = profiles.into_iter().peekable();
    while iter.peek().is_some() {
        chunks.push(iter.by_ref().take(chunk_size).collect());
    }
    chunks
}

/// Drives the ingestion stages against a profile store
#[derive(Clone)]
pub struct BulkIngestor {
    store: Arc<dyn ProfileStore>,
    cache: ResultCache,
    chunk_size: usize,
    max_batch: usize,
    store_timeout: Duration,
}

impl BulkIngestor {
    pub fn new(store: Arc<dyn ProfileStore>, cache: ResultCache) -> Self {
        Self {
            store,
            cache,
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_batch: DEFAULT_MAX_BATCH,
            store_timeout: Duration::from_secs(30),
        }
    }

    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    #[must_use]
    pub fn with_max_batch(mut self, max_batch: usize) -> Self {
        self.max_batch = max_batch.max(1);
        self
    }

    #[must_use]
    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Ingest a submission.
    ///
    /// # Errors
    ///
    /// See [`bulk_upsert_with_progress`](Self::bulk_upsert_with_progress).
    pub async fn bulk_upsert(
        &self,
        submissions: Vec<ProfileSubmission>,
        options: &BulkOptions,
    ) -> Result<IngestReport, IngestError> {
        self.bulk_upsert_with_progress(submissions, options, &mut |_| ControlFlow::Continue(()))
            .await
    }

    /// Ingest a submission, reporting after every committed chunk.
    ///
    /// The result cache is invalidated once after the last chunk, or before
    /// the error is returned if a later chunk fails after earlier ones
    /// committed.
    ///
    /// # Errors
    ///
    /// Returns `InvalidBatch`/`InvalidSchema` for malformed input,
    /// `NoValidSamples` when cleaning leaves nothing (no store writes happen),
    /// or `ChunkUpsertFailed` carrying the progress made before the failure.
    pub async fn bulk_upsert_with_progress(
        &self,
        submissions: Vec<ProfileSubmission>,
        options: &BulkOptions,
        progress: &mut ProgressFn<'_>,
    ) -> Result<IngestReport, IngestError> {
        let started = Instant::now();
        let total = submissions.len();

        validate_schema(&submissions, self.max_batch)?;

        let cleaned = clean_markers(submissions);
        if cleaned.profiles.is_empty() {
            return Err(IngestError::NoValidSamples {
                skipped: cleaned.skipped,
                cleaned_markers: cleaned.cleaned_markers,
            });
        }

        let (profiles, duplicates_removed) = dedupe(cleaned.profiles);
        let chunks = split_into_chunks(profiles, self.chunk_size);
        let chunk_count = chunks.len();
        let mode = if options.replace_existing {
            UpsertMode::Replace
        } else {
            UpsertMode::InsertOnly
        };

        let mut inserted = 0;
        let mut committed = 0;
        let mut cancelled = false;

        for (chunk_index, chunk) in chunks.into_iter().enumerate() {
            let chunk_len = chunk.len();
            let first_kit = chunk[0].kit_number.clone();

            let written = match guarded(
                "batch_upsert",
                self.store_timeout,
                self.store.batch_upsert(chunk, mode),
            )
            .await
            {
                Ok(written) => written,
                Err(source) => {
                    tracing::error!(chunk_index, error = %source, "Bulk ingestion chunk failed");
                    if committed > 0 {
                        self.cache.invalidate_matches().await;
                    }
                    return Err(IngestError::ChunkUpsertFailed {
                        chunk_index,
                        chunk_len,
                        first_kit,
                        inserted_so_far: inserted,
                        source,
                    });
                }
            };

            inserted += written;
            committed += 1;
            tracing::debug!(chunk_index, chunk_len, written, "Committed chunk");

            let update = ChunkProgress {
                chunk_index,
                chunks: chunk_count,
                chunk_len,
                inserted_so_far: inserted,
            };
            if progress(&update).is_break() && committed < chunk_count {
                tracing::info!(committed, chunk_count, "Bulk ingestion cancelled at chunk boundary");
                cancelled = true;
                break;
            }
        }

        self.cache.invalidate_matches().await;

        let elapsed = started.elapsed();
        let seconds = elapsed.as_secs_f64();
        let report = IngestReport {
            inserted,
            skipped: cleaned.skipped,
            duplicates_removed,
            cleaned_markers: cleaned.cleaned_markers,
            total,
            chunks: committed,
            duration_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            profiles_per_second: if seconds > 0.0 {
                (count_to_f64(inserted) / seconds).round()
            } else {
                0.0
            },
            cancelled,
        };

        tracing::info!(
            inserted = report.inserted,
            skipped = report.skipped,
            duplicates_removed = report.duplicates_removed,
            chunks = report.chunks,
            duration_ms = report.duration_ms,
            "Bulk ingestion complete"
        );

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheSettings, InMemoryCacheBackend};
    use crate::catalog::memory::InMemoryProfileStore;
    use serde_json::json;

    fn sample(kit: &str, dys393: serde_json::Value) -> ProfileSubmission {
        ProfileSubmission::new(kit).with_marker("DYS393", dys393)
    }

    fn ingestor(store: &Arc<InMemoryProfileStore>) -> BulkIngestor {
        let cache = ResultCache::new(
            Arc::new(InMemoryCacheBackend::default()),
            CacheSettings::default(),
        );
        BulkIngestor::new(store.clone(), cache)
    }

    #[test]
    fn test_schema_limits() {
        assert!(matches!(
            validate_schema(&[], 10),
            Err(IngestError::InvalidBatch(_))
        ));

        let too_many: Vec<_> = (0..3).map(|i| sample(&format!("K{i}"), json!("13"))).collect();
        assert!(matches!(
            validate_schema(&too_many, 2),
            Err(IngestError::InvalidBatch(_))
        ));

        let batch = vec![
            sample("K1", json!("13")),
            sample(&"X".repeat(21), json!("13")),
        ];
        match validate_schema(&batch, 10) {
            Err(IngestError::InvalidSchema { index, reason }) => {
                assert_eq!(index, 1);
                assert!(reason.contains("kit number"));
            }
            other => panic!("expected schema error, got {other:?}"),
        }

        let no_markers = vec![ProfileSubmission::new("K1")];
        assert_eq!(
            validate_schema(&no_markers, 10).unwrap_err().kind(),
            ErrorKind::InvalidSchema
        );
    }

    #[test]
    fn test_clean_markers_counts_and_skips() {
        let batch = vec![
            ProfileSubmission::new("K1")
                .with_marker("DYS393", json!(13))
                .with_marker("DYS390", json!(" 24 "))
                .with_marker("DYS19", json!("abc"))
                .with_marker("DYS391", json!(""))
                .with_marker("DYS385", json!(null)),
            ProfileSubmission::new("K2")
                .with_marker("DYS393", json!("0"))
                .with_marker("DYS390", json!(true)),
        ];

        let cleaned = clean_markers(batch);
        assert_eq!(cleaned.profiles.len(), 1);
        assert_eq!(cleaned.skipped, 1);
        assert_eq!(cleaned.cleaned_markers, 3);

        let k1 = &cleaned.profiles[0];
        assert_eq!(k1.markers.len(), 2);
        assert_eq!(k1.markers["DYS393"], "13");
        assert_eq!(k1.markers["DYS390"], "24");
    }

    #[test]
    fn test_dedupe_keeps_last_occurrence_at_first_position() {
        let profiles = vec![
            Profile::new("A", MarkerMap::from([("DYS393".into(), "13".into())])).with_name("first"),
            Profile::new("B", MarkerMap::from([("DYS393".into(), "13".into())])),
            Profile::new("A", MarkerMap::from([("DYS393".into(), "14".into())])).with_name("second"),
        ];
        let (survivors, removed) = dedupe(profiles);
        assert_eq!(removed, 1);
        assert_eq!(survivors.len(), 2);
        assert_eq!(survivors[0].kit_number.as_str(), "A");
        assert_eq!(survivors[0].name, "second");
        assert_eq!(survivors[0].markers["DYS393"], "14");
    }

    #[test]
    fn test_split_into_chunks() {
        let profiles: Vec<_> = (0..1001)
            .map(|i| Profile::new(format!("K{i}"), MarkerMap::from([("DYS393".into(), "13".into())])))
            .collect();
        let chunks = split_into_chunks(profiles, 500);
        let sizes: Vec<usize> = chunks.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![500, 500, 1]);
    }

    #[tokio::test]
    async fn test_duplicate_kits_persist_later_entry() {
        let store = Arc::new(InMemoryProfileStore::new());
        let batch = vec![
            sample("K1", json!("13")).with_name("old"),
            sample("K1", json!("14")).with_name("new"),
        ];

        let report = ingestor(&store)
            .bulk_upsert(batch, &BulkOptions::default())
            .await
            .unwrap();
        assert_eq!(report.duplicates_removed, 1);
        assert_eq!(report.inserted, 1);

        let stored = store.get_profile(&KitId::from("K1")).await.unwrap().unwrap();
        assert_eq!(stored.name, "new");
        assert_eq!(stored.markers["DYS393"], "14");
    }

    #[tokio::test]
    async fn test_no_valid_samples_writes_nothing() {
        let store = Arc::new(InMemoryProfileStore::new());
        let batch = vec![sample("K1", json!("x")), sample("K2", json!("0"))];

        let err = ingestor(&store)
            .bulk_upsert(batch, &BulkOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoValidSamples);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_chunking_scenario() {
        // 5000 samples; 250 kits appear twice, so 500 samples carry a
        // duplicated kit and 250 are removed
        let store = Arc::new(InMemoryProfileStore::new());
        let batch: Vec<_> = (0..5000)
            .map(|i| {
                let kit = if i >= 4750 { i - 4750 } else { i };
                sample(&format!("K{kit}"), json!("13"))
            })
            .collect();

        let mut sizes = Vec::new();
        let report = ingestor(&store)
            .bulk_upsert_with_progress(batch, &BulkOptions::default(), &mut |p| {
                sizes.push(p.chunk_len);
                ControlFlow::Continue(())
            })
            .await
            .unwrap();

        assert_eq!(report.total, 5000);
        assert_eq!(report.duplicates_removed, 250);
        assert_eq!(report.chunks, 10);
        assert_eq!(sizes.len(), 10);
        assert!(sizes.iter().all(|&s| s <= 500));
        assert_eq!(report.inserted, 4750);
        assert_eq!(store.len(), 4750);
    }

    #[tokio::test]
    async fn test_insert_only_leaves_existing_kits() {
        let store = Arc::new(InMemoryProfileStore::new());
        let ingest = ingestor(&store);
        ingest
            .bulk_upsert(vec![sample("K1", json!("13"))], &BulkOptions::default())
            .await
            .unwrap();

        let report = ingest
            .bulk_upsert(
                vec![sample("K1", json!("15")), sample("K2", json!("15"))],
                &BulkOptions {
                    replace_existing: false,
                },
            )
            .await
            .unwrap();
        assert_eq!(report.inserted, 1);

        let k1 = store.get_profile(&KitId::from("K1")).await.unwrap().unwrap();
        assert_eq!(k1.markers["DYS393"], "13");
    }

    #[tokio::test]
    async fn test_cancel_at_chunk_boundary() {
        let store = Arc::new(InMemoryProfileStore::new());
        let batch: Vec<_> = (0..10).map(|i| sample(&format!("K{i}"), json!("13"))).collect();

        let report = ingestor(&store)
            .with_chunk_size(3)
            .bulk_upsert_with_progress(batch, &BulkOptions::default(), &mut |p| {
                if p.chunk_index == 1 {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            })
            .await
            .unwrap();

        assert!(report.cancelled);
        assert_eq!(report.chunks, 2);
        assert_eq!(report.inserted, 6);
        assert_eq!(store.len(), 6);
    }

    #[tokio::test]
    async fn test_break_after_last_chunk_is_not_a_cancel() {
        let store = Arc::new(InMemoryProfileStore::new());
        let report = ingestor(&store)
            .bulk_upsert_with_progress(
                vec![sample("K1", json!("13"))],
                &BulkOptions::default(),
                &mut |_| ControlFlow::Break(()),
            )
            .await
            .unwrap();
        assert!(!report.cancelled);
        assert_eq!(report.chunks, 1);
    }
}
