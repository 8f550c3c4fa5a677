//! Facade wiring the profile store, result cache, and engines together.
//!
//! Every write that reaches the store through this facade clears the cached
//! match results, so a query issued after a write always recomputes.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::cache::{CacheState, InMemoryCacheBackend, ResultCache};
use crate::catalog::store::{
    guarded, ProfileStore, ProfileSummary, SearchQuery, StoreError, StoreStatistics, UpsertOutcome,
};
use crate::config::AppConfig;
use crate::core::marker::MarkerMap;
use crate::core::profile::{Profile, ProfileError, ProfilePatch, ProfileSubmission};
use crate::core::types::{ErrorKind, KitId};
use crate::ingest::bulk::{BulkIngestor, BulkOptions, IngestError, IngestReport, ProgressFn};
use crate::matching::engine::{Match, MatchError, MatchOptions, MatchPage, MatchingEngine};
use crate::report::export::{ExportEngine, ExportError, ExportOptions, ExportReport};

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Profile not found: {0}")]
    NotFound(KitId),

    #[error(transparent)]
    Profile(#[from] ProfileError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Matching(#[from] MatchError),

    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Export(#[from] ExportError),
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput(_) | Self::Profile(_) => ErrorKind::InvalidInput,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Store(e) => e.kind(),
            Self::Matching(e) => e.kind(),
            Self::Ingest(e) => e.kind(),
            Self::Export(e) => e.kind(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreHealth {
    pub reachable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profiles: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Health snapshot; only an unreachable store makes it unhealthy
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub store: StoreHealth,
    pub cache: CacheState,
    pub timestamp: DateTime<Utc>,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}

/// Entry point for every profile and matching operation
#[derive(Clone)]
pub struct YstrService {
    store: Arc<dyn ProfileStore>,
    cache: ResultCache,
    matching: MatchingEngine,
    ingest: BulkIngestor,
    export: ExportEngine,
    store_timeout: Duration,
}

impl YstrService {
    pub fn new(store: Arc<dyn ProfileStore>, cache: ResultCache, config: &AppConfig) -> Self {
        let store_timeout = config.store_timeout();
        let matching = MatchingEngine::new(store.clone(), cache.clone())
            .with_store_timeout(store_timeout);
        let ingest = BulkIngestor::new(store.clone(), cache.clone())
            .with_chunk_size(config.ingest.chunk_size)
            .with_max_batch(config.ingest.max_batch)
            .with_store_timeout(store_timeout);
        let export = ExportEngine::new(matching.clone());

        Self {
            store,
            cache,
            matching,
            ingest,
            export,
            store_timeout,
        }
    }

    /// Build the service with the cache described by `config`
    pub fn from_config(store: Arc<dyn ProfileStore>, config: &AppConfig) -> Self {
        let cache = if config.cache.enabled {
            ResultCache::new(
                Arc::new(InMemoryCacheBackend::new(config.cache.max_entries)),
                config.cache_settings(),
            )
        } else {
            ResultCache::disabled()
        };
        Self::new(store, cache, config)
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    pub fn store(&self) -> &Arc<dyn ProfileStore> {
        &self.store
    }

    /// # Errors
    ///
    /// See [`MatchingEngine::find_matches`].
    pub async fn find_matches(
        &self,
        markers: &MarkerMap,
        options: &MatchOptions,
    ) -> Result<Vec<Match>, ServiceError> {
        Ok(self.matching.find_matches(markers, options).await?)
    }

    /// # Errors
    ///
    /// See [`MatchingEngine::find_matches`].
    pub async fn find_matches_page(
        &self,
        markers: &MarkerMap,
        options: &MatchOptions,
        offset: usize,
        limit: usize,
    ) -> Result<MatchPage, ServiceError> {
        Ok(self
            .matching
            .find_matches_page(markers, options, offset, limit)
            .await?)
    }

    /// # Errors
    ///
    /// Returns `NotFound` for an unknown kit or the store failure.
    pub async fn get_profile(&self, kit: &KitId) -> Result<Profile, ServiceError> {
        guarded("get_profile", self.store_timeout, self.store.get_profile(kit))
            .await?
            .ok_or_else(|| ServiceError::NotFound(kit.clone()))
    }

    /// Create or replace a profile.
    ///
    /// # Errors
    ///
    /// Returns `Marker` for a profile breaking the marker invariant, or the
    /// store failure.
    pub async fn upsert_profile(&self, mut profile: Profile) -> Result<UpsertOutcome, ServiceError> {
        profile.validate()?;
        let outcome = guarded(
            "upsert_profile",
            self.store_timeout,
            self.store.upsert_profile(profile),
        )
        .await?;
        self.cache.invalidate_matches().await;
        tracing::info!(kit = %outcome.current.kit_number, action = ?outcome.action, "Upserted profile");
        Ok(outcome)
    }

    /// Apply the fields present in `patch`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for an empty patch, `Marker` for invalid
    /// marker values, `NotFound` for an unknown kit, or the store failure.
    pub async fn update_profile(
        &self,
        kit: &KitId,
        mut patch: ProfilePatch,
    ) -> Result<UpsertOutcome, ServiceError> {
        if patch.is_empty() {
            return Err(ServiceError::InvalidInput(
                "at least one field must be updated".to_string(),
            ));
        }
        patch.validate()?;

        let outcome = guarded(
            "update_profile",
            self.store_timeout,
            self.store.update_profile(kit, &patch),
        )
        .await?
        .ok_or_else(|| ServiceError::NotFound(kit.clone()))?;
        self.cache.invalidate_matches().await;
        tracing::info!(kit = %kit, "Updated profile");
        Ok(outcome)
    }

    /// Delete a profile, returning it.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown kit or the store failure.
    pub async fn delete_profile(&self, kit: &KitId) -> Result<Profile, ServiceError> {
        let removed = guarded("delete_profile", self.store_timeout, self.store.delete_profile(kit))
            .await?
            .ok_or_else(|| ServiceError::NotFound(kit.clone()))?;
        self.cache.invalidate_matches().await;
        tracing::info!(kit = %kit, "Deleted profile");
        Ok(removed)
    }

    /// # Errors
    ///
    /// See [`BulkIngestor::bulk_upsert_with_progress`].
    pub async fn bulk_upsert(
        &self,
        submissions: Vec<ProfileSubmission>,
        options: &BulkOptions,
    ) -> Result<IngestReport, ServiceError> {
        Ok(self.ingest.bulk_upsert(submissions, options).await?)
    }

    /// # Errors
    ///
    /// See [`BulkIngestor::bulk_upsert_with_progress`].
    pub async fn bulk_upsert_with_progress(
        &self,
        submissions: Vec<ProfileSubmission>,
        options: &BulkOptions,
        progress: &mut ProgressFn<'_>,
    ) -> Result<IngestReport, ServiceError> {
        Ok(self
            .ingest
            .bulk_upsert_with_progress(submissions, options, progress)
            .await?)
    }

    /// # Errors
    ///
    /// See [`ExportEngine::export`].
    pub async fn export(&self, kit: &KitId, options: &ExportOptions) -> Result<ExportReport, ServiceError> {
        Ok(self.export.export(kit, options).await?)
    }

    /// # Errors
    ///
    /// Returns the store failure.
    pub async fn statistics(&self) -> Result<StoreStatistics, ServiceError> {
        Ok(guarded("statistics", self.store_timeout, self.store.statistics()).await?)
    }

    /// # Errors
    ///
    /// Returns the store failure.
    pub async fn search(&self, query: &SearchQuery) -> Result<Vec<ProfileSummary>, ServiceError> {
        Ok(guarded("search", self.store_timeout, self.store.search(query)).await?)
    }

    /// Probe the store and report the last observed cache state
    pub async fn health(&self) -> HealthReport {
        let ping = guarded("ping", self.store_timeout, self.store.ping()).await;
        let store = match ping {
            Ok(()) => StoreHealth {
                reachable: true,
                profiles: guarded("count", self.store_timeout, self.store.count())
                    .await
                    .ok(),
                error: None,
            },
            Err(e) => {
                tracing::error!(error = %e, "Profile store health check failed");
                StoreHealth {
                    reachable: false,
                    profiles: None,
                    error: Some(e.to_string()),
                }
            }
        };

        HealthReport {
            status: if store.reachable {
                HealthStatus::Healthy
            } else {
                HealthStatus::Unhealthy
            },
            store,
            cache: self.cache.state(),
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::memory::InMemoryProfileStore;

    fn markers(pairs: &[(&str, &str)]) -> MarkerMap {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    fn service() -> YstrService {
        YstrService::from_config(Arc::new(InMemoryProfileStore::new()), &AppConfig::default())
    }

    #[tokio::test]
    async fn test_write_invalidates_cached_matches() {
        let service = service();
        service
            .upsert_profile(Profile::new("K1", markers(&[("DYS393", "13")])))
            .await
            .unwrap();

        let query = markers(&[("DYS393", "13")]);
        let options = MatchOptions::default();
        assert_eq!(service.find_matches(&query, &options).await.unwrap().len(), 1);

        service
            .upsert_profile(Profile::new("K2", markers(&[("DYS393", "14")])))
            .await
            .unwrap();
        assert_eq!(service.find_matches(&query, &options).await.unwrap().len(), 2);

        service.delete_profile(&KitId::from("K1")).await.unwrap();
        assert_eq!(service.find_matches(&query, &options).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_update_profile_errors() {
        let service = service();
        let err = service
            .update_profile(&KitId::from("K1"), ProfilePatch::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);

        let patch = ProfilePatch {
            name: Some("Smith".to_string()),
            ..ProfilePatch::default()
        };
        let err = service
            .update_profile(&KitId::from("K1"), patch)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        service
            .upsert_profile(Profile::new("K1", markers(&[("DYS393", "13")])))
            .await
            .unwrap();
        let bad = ProfilePatch {
            markers: Some(markers(&[("DYS393", "x")])),
            ..ProfilePatch::default()
        };
        let err = service.update_profile(&KitId::from("K1"), bad).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn test_get_and_delete_unknown_kit() {
        let service = service();
        assert_eq!(
            service.get_profile(&KitId::from("X")).await.unwrap_err().kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            service.delete_profile(&KitId::from("X")).await.unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[tokio::test]
    async fn test_health_with_cache_disabled() {
        let mut config = AppConfig::default();
        config.cache.enabled = false;
        let service = YstrService::from_config(Arc::new(InMemoryProfileStore::new()), &config);

        let health = service.health().await;
        assert!(health.is_healthy());
        assert_eq!(health.store.profiles, Some(0));
        assert_eq!(health.cache, CacheState::Disabled);
    }
}
