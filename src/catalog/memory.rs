use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use rayon::prelude::*;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::catalog::index::{CandidateFinder, IndexedProfile, ProfileCatalog};
use crate::catalog::snapshot::{read_snapshot, write_snapshot, SnapshotError};
use crate::catalog::store::{
    HaplogroupCount, MatchQuery, MatchRow, ProfileStore, ProfileSummary, SearchQuery,
    StoreError, StoreStatistics, UpsertAction, UpsertMode, UpsertOutcome,
};
use crate::core::marker::MarkerSet;
use crate::core::panel::MarkerPanels;
use crate::core::profile::{Profile, ProfilePatch};
use crate::core::types::{count_to_f64, KitId};
use crate::matching::distance::GeneticDistance;
use crate::matching::haplogroup::{normalize_haplogroup, HaplogroupFilter};

/// Number of haplogroups reported in statistics
const TOP_HAPLOGROUPS: usize = 10;

/// Profile store held in memory, optionally persisted to a snapshot file.
///
/// Every call takes the catalog lock once, so each call is atomic on its own
/// and a batch upsert is all-or-nothing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryProfileStore {
    catalog: Arc<RwLock<ProfileCatalog>>,
    snapshot_path: Option<PathBuf>,
}

impl InMemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_profiles(profiles: impl IntoIterator<Item = Profile>) -> Self {
        Self {
            catalog: Arc::new(RwLock::new(ProfileCatalog::from_profiles(profiles))),
            snapshot_path: None,
        }
    }

    /// Open a store backed by a snapshot file; a missing file starts empty.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing snapshot cannot be read or is invalid.
    pub fn open(path: &Path) -> Result<Self, SnapshotError> {
        let profiles = if path.exists() {
            read_snapshot(path)?
        } else {
            tracing::info!(path = %path.display(), "Snapshot not found, starting empty");
            Vec::new()
        };
        tracing::debug!(profiles = profiles.len(), path = %path.display(), "Loaded snapshot");

        Ok(Self {
            catalog: Arc::new(RwLock::new(ProfileCatalog::from_profiles(profiles))),
            snapshot_path: Some(path.to_path_buf()),
        })
    }

    pub fn snapshot_path(&self) -> Option<&Path> {
        self.snapshot_path.as_deref()
    }

    /// Persist the population to the snapshot file, if one is configured.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be written.
    pub fn save(&self) -> Result<(), SnapshotError> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };
        let profiles: Vec<Profile> = self
            .catalog
            .read()
            .iter()
            .map(|p| p.profile.clone())
            .collect();
        write_snapshot(path, &profiles)?;
        tracing::debug!(profiles = profiles.len(), path = %path.display(), "Saved snapshot");
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.catalog.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.catalog.read().is_empty()
    }
}

/// Insert or replace under an already-held lock, keeping the original
/// creation time on replace
fn upsert_locked(catalog: &mut ProfileCatalog, mut profile: Profile) -> UpsertOutcome {
    let now = Utc::now();
    profile.updated_at = now;
    match catalog.get(&profile.kit_number) {
        Some(existing) => profile.created_at = existing.profile.created_at,
        None => profile.created_at = now,
    }

    let previous = catalog.insert(profile.clone());
    let action = if previous.is_some() {
        UpsertAction::Updated
    } else {
        UpsertAction::Created
    };

    UpsertOutcome {
        action,
        previous,
        current: profile,
    }
}

/// Score every candidate admitted by the query's haplogroup filter.
///
/// Candidates sharing no marker with the query are not matches. Results are
/// ordered by distance then kit number and truncated to `max_results`.
pub fn scan_catalog(catalog: &ProfileCatalog, query: &MatchQuery) -> Vec<MatchRow> {
    let scoped = MarkerPanels::embedded().scope(query.panel, &query.markers);
    let query_set = MarkerSet::from_map(&scoped);
    let filter = query
        .haplogroup
        .as_deref()
        .and_then(|label| HaplogroupFilter::new(label, query.include_subclades));

    let candidates = CandidateFinder::new(catalog).find(filter.as_ref());

    let mut hits: Vec<(&IndexedProfile, GeneticDistance)> = candidates
        .par_iter()
        .filter_map(|candidate| {
            let gd = GeneticDistance::calculate(&query_set, &candidate.parsed);
            (gd.compared_markers > 0 && gd.distance <= query.max_distance)
                .then_some((*candidate, gd))
        })
        .collect();

    hits.sort_by(|a, b| {
        a.1.distance
            .cmp(&b.1.distance)
            .then_with(|| a.0.profile.kit_number.cmp(&b.0.profile.kit_number))
    });
    hits.truncate(query.max_results);

    hits.into_iter()
        .map(|(candidate, gd)| MatchRow {
            profile: candidate.profile.clone(),
            distance: gd.distance,
            compared_markers: gd.compared_markers,
        })
        .collect()
}

#[async_trait]
impl ProfileStore for InMemoryProfileStore {
    async fn get_profile(&self, kit: &KitId) -> Result<Option<Profile>, StoreError> {
        Ok(self.catalog.read().get(kit).map(|p| p.profile.clone()))
    }

    async fn upsert_profile(&self, mut profile: Profile) -> Result<UpsertOutcome, StoreError> {
        profile
            .validate()
            .map_err(|e| StoreError::Rejected(e.to_string()))?;
        Ok(upsert_locked(&mut self.catalog.write(), profile))
    }

    async fn update_profile(
        &self,
        kit: &KitId,
        patch: &ProfilePatch,
    ) -> Result<Option<UpsertOutcome>, StoreError> {
        let mut catalog = self.catalog.write();
        let Some(existing) = catalog.get(kit) else {
            return Ok(None);
        };

        let previous = existing.profile.clone();
        let mut updated = previous.clone();
        patch.apply(&mut updated, Utc::now());
        updated
            .validate()
            .map_err(|e| StoreError::Rejected(e.to_string()))?;

        catalog.insert(updated.clone());
        Ok(Some(UpsertOutcome {
            action: UpsertAction::Updated,
            previous: Some(previous),
            current: updated,
        }))
    }

    async fn delete_profile(&self, kit: &KitId) -> Result<Option<Profile>, StoreError> {
        Ok(self.catalog.write().remove(kit))
    }

    async fn batch_upsert(
        &self,
        mut profiles: Vec<Profile>,
        mode: UpsertMode,
    ) -> Result<usize, StoreError> {
        // Validate the whole batch before touching the catalog
        for profile in &mut profiles {
            profile.validate().map_err(|e| {
                StoreError::Rejected(format!("{}: {e}", profile.kit_number))
            })?;
        }

        let mut catalog = self.catalog.write();
        let mut written = 0;
        for profile in profiles {
            if mode == UpsertMode::InsertOnly && catalog.contains(&profile.kit_number) {
                continue;
            }
            upsert_locked(&mut catalog, profile);
            written += 1;
        }
        Ok(written)
    }

    async fn batch_match(&self, query: &MatchQuery) -> Result<Vec<MatchRow>, StoreError> {
        let catalog = Arc::clone(&self.catalog);
        let query = query.clone();
        tokio::task::spawn_blocking(move || scan_catalog(&catalog.read(), &query))
            .await
            .map_err(|e| StoreError::Unavailable(format!("match scan aborted: {e}")))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.catalog.read().len())
    }

    async fn statistics(&self) -> Result<StoreStatistics, StoreError> {
        let catalog = self.catalog.read();

        // Normalized label -> (first label seen, count)
        let mut groups: HashMap<String, (String, usize)> = HashMap::new();
        let mut marker_total = 0;
        for entry in catalog.iter() {
            marker_total += entry.profile.marker_count();
            let label = entry.profile.haplogroup.trim();
            if label.is_empty() {
                continue;
            }
            groups
                .entry(normalize_haplogroup(label))
                .or_insert_with(|| (label.to_string(), 0))
                .1 += 1;
        }

        let total = catalog.len();
        let avg = if total == 0 {
            0.0
        } else {
            (count_to_f64(marker_total) / count_to_f64(total) * 100.0).round() / 100.0
        };

        let mut top: Vec<HaplogroupCount> = groups
            .into_values()
            .map(|(haplogroup, count)| HaplogroupCount { haplogroup, count })
            .collect();
        let unique_haplogroups = top.len();
        top.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.haplogroup.cmp(&b.haplogroup)));
        top.truncate(TOP_HAPLOGROUPS);

        Ok(StoreStatistics {
            total_profiles: total,
            unique_haplogroups,
            avg_markers_per_profile: avg,
            top_haplogroups: top,
        })
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<ProfileSummary>, StoreError> {
        let catalog = self.catalog.read();
        let term = query
            .term
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase);
        let haplogroup = query
            .haplogroup
            .as_deref()
            .map(normalize_haplogroup)
            .filter(|h| !h.is_empty());

        let mut hits: Vec<&Profile> = catalog
            .iter()
            .map(|entry| &entry.profile)
            .filter(|p| {
                term.as_ref().is_none_or(|t| {
                    p.kit_number.as_str().to_lowercase().contains(t)
                        || p.name.to_lowercase().contains(t)
                })
            })
            .filter(|p| {
                haplogroup
                    .as_ref()
                    .is_none_or(|h| normalize_haplogroup(&p.haplogroup) == *h)
            })
            .collect();

        hits.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.kit_number.cmp(&b.kit_number))
        });

        Ok(hits
            .into_iter()
            .skip(query.offset)
            .take(query.limit)
            .map(ProfileSummary::from)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::marker::MarkerMap;
    use crate::core::panel::PanelSize;

    fn markers(pairs: &[(&str, &str)]) -> MarkerMap {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    fn query(pairs: &[(&str, &str)]) -> MatchQuery {
        MatchQuery {
            markers: markers(pairs),
            max_distance: 25,
            max_results: 1000,
            panel: PanelSize::Y111,
            haplogroup: None,
            include_subclades: false,
        }
    }

    fn sample_store() -> InMemoryProfileStore {
        InMemoryProfileStore::with_profiles([
            Profile::new("K1", markers(&[("DYS393", "13"), ("DYS390", "24")])).with_haplogroup("R1b"),
            Profile::new("K2", markers(&[("DYS393", "14"), ("DYS390", "24")])).with_haplogroup("R1b1a"),
            Profile::new("K3", markers(&[("DYS393", "17"), ("DYS390", "21")])).with_haplogroup("I2"),
            Profile::new("K4", markers(&[("DYS19", "14")])).with_haplogroup("R1b"),
        ])
    }

    #[tokio::test]
    async fn test_batch_match_orders_and_filters() {
        let store = sample_store();
        let rows = store
            .batch_match(&query(&[("DYS393", "13"), ("DYS390", "24")]))
            .await
            .unwrap();

        let got: Vec<(&str, u32)> = rows
            .iter()
            .map(|r| (r.profile.kit_number.as_str(), r.distance))
            .collect();
        // K4 shares no marker with the query
        assert_eq!(got, vec![("K1", 0), ("K2", 1), ("K3", 7)]);
    }

    #[tokio::test]
    async fn test_batch_match_threshold_and_limit() {
        let store = sample_store();
        let mut q = query(&[("DYS393", "13"), ("DYS390", "24")]);
        q.max_distance = 1;
        assert_eq!(store.batch_match(&q).await.unwrap().len(), 2);

        q.max_results = 1;
        let rows = store.batch_match(&q).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].profile.kit_number.as_str(), "K1");
    }

    #[tokio::test]
    async fn test_batch_match_haplogroup_filter() {
        let store = sample_store();
        let mut q = query(&[("DYS393", "13"), ("DYS390", "24")]);
        q.haplogroup = Some("R1b".to_string());
        assert_eq!(store.batch_match(&q).await.unwrap().len(), 1);

        q.include_subclades = true;
        assert_eq!(store.batch_match(&q).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_batch_match_respects_panel() {
        let store = InMemoryProfileStore::with_profiles([Profile::new(
            "K1",
            markers(&[("DYS393", "13"), ("DYS492", "15")]),
        )]);
        // DYS492 is a Y67 marker: out of scope for Y12
        let mut q = query(&[("DYS393", "13"), ("DYS492", "10")]);
        q.panel = PanelSize::Y12;
        let rows = store.batch_match(&q).await.unwrap();
        assert_eq!(rows[0].distance, 0);
        assert_eq!(rows[0].compared_markers, 1);
    }

    #[tokio::test]
    async fn test_upsert_preserves_created_at() {
        let store = InMemoryProfileStore::new();
        let first = store
            .upsert_profile(Profile::new("K1", markers(&[("DYS393", "13")])))
            .await
            .unwrap();
        assert_eq!(first.action, UpsertAction::Created);
        assert!(first.previous.is_none());

        let second = store
            .upsert_profile(Profile::new("K1", markers(&[("DYS393", "14")])))
            .await
            .unwrap();
        assert_eq!(second.action, UpsertAction::Updated);
        assert_eq!(second.previous.unwrap().markers["DYS393"], "13");
        assert_eq!(second.current.created_at, first.current.created_at);
    }

    #[tokio::test]
    async fn test_upsert_rejects_invalid_profile() {
        let store = InMemoryProfileStore::new();
        let err = store
            .upsert_profile(Profile::new("K1", markers(&[("DYS393", "x")])))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Rejected(_)));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_update_profile() {
        let store = sample_store();
        let patch = ProfilePatch {
            name: Some("Smith".to_string()),
            ..ProfilePatch::default()
        };
        let outcome = store
            .update_profile(&KitId::from("K1"), &patch)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome.current.name, "Smith");
        assert_eq!(outcome.current.haplogroup, "R1b");

        let missing = store.update_profile(&KitId::from("NOPE"), &patch).await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_batch_upsert_modes() {
        let store = sample_store();
        let batch = vec![
            Profile::new("K1", markers(&[("DYS393", "15")])),
            Profile::new("K9", markers(&[("DYS393", "15")])),
        ];

        let written = store
            .batch_upsert(batch.clone(), UpsertMode::InsertOnly)
            .await
            .unwrap();
        assert_eq!(written, 1);
        let k1 = store.get_profile(&KitId::from("K1")).await.unwrap().unwrap();
        assert_eq!(k1.markers["DYS393"], "13");

        let written = store.batch_upsert(batch, UpsertMode::Replace).await.unwrap();
        assert_eq!(written, 2);
        let k1 = store.get_profile(&KitId::from("K1")).await.unwrap().unwrap();
        assert_eq!(k1.markers["DYS393"], "15");
    }

    #[tokio::test]
    async fn test_batch_upsert_is_all_or_nothing() {
        let store = InMemoryProfileStore::new();
        let batch = vec![
            Profile::new("K1", markers(&[("DYS393", "13")])),
            Profile::new("K2", markers(&[("DYS393", "bad")])),
        ];
        assert!(store.batch_upsert(batch, UpsertMode::Replace).await.is_err());
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_statistics() {
        let store = sample_store();
        let stats = store.statistics().await.unwrap();
        assert_eq!(stats.total_profiles, 4);
        assert_eq!(stats.unique_haplogroups, 3);
        assert!((stats.avg_markers_per_profile - 1.75).abs() < 1e-9);
        assert_eq!(
            stats.top_haplogroups[0],
            HaplogroupCount {
                haplogroup: "R1b".to_string(),
                count: 2
            }
        );
    }

    #[tokio::test]
    async fn test_search() {
        let store = sample_store();
        let hits = store
            .search(&SearchQuery {
                haplogroup: Some("r1b".to_string()),
                ..SearchQuery::default()
            })
            .await
            .unwrap();
        let kits: Vec<&str> = hits.iter().map(|h| h.kit_number.as_str()).collect();
        assert_eq!(kits.len(), 2);
        assert!(kits.contains(&"K1") && kits.contains(&"K4"));

        let hits = store
            .search(&SearchQuery {
                term: Some("k3".to_string()),
                ..SearchQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);

        let page = store
            .search(&SearchQuery {
                limit: 2,
                offset: 3,
                ..SearchQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(page.len(), 1);
    }

    #[tokio::test]
    async fn test_open_and_save() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("profiles.json.gz");

        let store = InMemoryProfileStore::open(&path).unwrap();
        assert!(store.is_empty());
        store
            .upsert_profile(Profile::new("K1", markers(&[("DYS393", "13")])))
            .await
            .unwrap();
        store.save().unwrap();

        let reopened = InMemoryProfileStore::open(&path).unwrap();
        assert_eq!(reopened.len(), 1);
    }
}
