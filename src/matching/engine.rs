use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::cache::{CacheKey, ResultCache};
use crate::catalog::store::{guarded, MatchQuery, MatchRow, ProfileStore, StoreError};
use crate::core::marker::{validate_marker_map, MarkerError, MarkerMap};
use crate::core::panel::{MarkerPanels, PanelSize};
use crate::core::types::{ErrorKind, KitId};
use crate::matching::distance::GeneticDistance;
use crate::matching::haplogroup::normalize_haplogroup;

/// Default maximum genetic distance of a match
pub const DEFAULT_MAX_DISTANCE: u32 = 25;

/// Default maximum number of matches returned
pub const DEFAULT_MAX_RESULTS: usize = 1000;

/// Default deadline for one profile store call
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Error, Debug)]
pub enum MatchError {
    #[error("Invalid query: {0}")]
    InvalidInput(#[from] MarkerError),

    #[error("Invalid match options: {0}")]
    InvalidOptions(String),

    #[error("Matching failed: {0}")]
    MatchingFailed(#[source] StoreError),
}

impl MatchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput(_) | Self::InvalidOptions(_) => ErrorKind::InvalidInput,
            Self::MatchingFailed(_) => ErrorKind::MatchingFailed,
        }
    }
}

/// Options of a match query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchOptions {
    /// Largest genetic distance still reported as a match
    pub max_distance: u32,

    /// Maximum number of matches returned
    pub max_results: usize,

    /// Panel bounding which standard markers of the query are in scope
    pub panel: PanelSize,

    /// Restrict candidates to this haplogroup
    pub haplogroup_filter: Option<String>,

    /// Also admit subclades of `haplogroup_filter`
    pub include_subclades: bool,

    /// Serve from and populate the result cache
    pub use_cache: bool,
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            max_distance: DEFAULT_MAX_DISTANCE,
            max_results: DEFAULT_MAX_RESULTS,
            panel: PanelSize::default(),
            haplogroup_filter: None,
            include_subclades: false,
            use_cache: true,
        }
    }
}

impl MatchOptions {
    /// Check option ranges.
    ///
    /// # Errors
    ///
    /// Returns `MatchError::InvalidOptions` when `max_results` is zero.
    pub fn validate(&self) -> Result<(), MatchError> {
        if self.max_results == 0 {
            return Err(MatchError::InvalidOptions(
                "max_results must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn with_haplogroup(mut self, haplogroup: impl Into<String>, include_subclades: bool) -> Self {
        self.haplogroup_filter = Some(haplogroup.into());
        self.include_subclades = include_subclades;
        self
    }
}

/// A candidate profile within the distance threshold of a query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub kit_number: KitId,
    pub name: String,
    pub country: String,
    pub haplogroup: String,
    pub markers: MarkerMap,
    pub distance: u32,
    pub compared_markers: u32,
    pub identical_markers: u32,
    pub percent_identical: f64,
}

impl From<MatchRow> for Match {
    fn from(row: MatchRow) -> Self {
        let gd = GeneticDistance {
            distance: row.distance,
            compared_markers: row.compared_markers,
        };
        Self {
            kit_number: row.profile.kit_number,
            name: row.profile.name,
            country: row.profile.country,
            haplogroup: row.profile.haplogroup,
            markers: row.profile.markers,
            distance: gd.distance,
            compared_markers: gd.compared_markers,
            identical_markers: gd.identical_markers(),
            percent_identical: gd.percent_identical(),
        }
    }
}

/// Sort by distance ascending, then kit number
pub fn sort_matches(matches: &mut [Match]) {
    matches.sort_by(|a, b| {
        a.distance
            .cmp(&b.distance)
            .then_with(|| a.kit_number.cmp(&b.kit_number))
    });
}

/// One page of an ordered match list
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchPage {
    /// Matches found before paging
    pub total: usize,
    pub offset: usize,
    pub limit: usize,
    pub matches: Vec<Match>,
}

impl MatchPage {
    pub fn new(mut matches: Vec<Match>, offset: usize, limit: usize) -> Self {
        sort_matches(&mut matches);
        let total = matches.len();
        let matches = matches.into_iter().skip(offset).take(limit).collect();
        Self {
            total,
            offset,
            limit,
            matches,
        }
    }
}

/// Main matching engine
#[derive(Clone)]
pub struct MatchingEngine {
    store: Arc<dyn ProfileStore>,
    cache: ResultCache,
    store_timeout: Duration,
}

impl MatchingEngine {
    pub fn new(store: Arc<dyn ProfileStore>, cache: ResultCache) -> Self {
        Self {
            store,
            cache,
            store_timeout: DEFAULT_STORE_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    pub fn store(&self) -> &Arc<dyn ProfileStore> {
        &self.store
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    pub fn store_timeout(&self) -> Duration {
        self.store_timeout
    }

    /// Find profiles within `options.max_distance` of the query markers.
    ///
    /// Every query value is validated before any store or cache work starts.
    /// Results come back in the order the store produced them; use
    /// [`MatchPage`] or [`sort_matches`] for a guaranteed order.
    ///
    /// # Errors
    ///
    /// Returns `MatchError::InvalidInput` naming the first malformed marker,
    /// or `MatchError::MatchingFailed` if the store call fails or times out.
    /// Cache failures never surface.
    pub async fn find_matches(
        &self,
        markers: &MarkerMap,
        options: &MatchOptions,
    ) -> Result<Vec<Match>, MatchError> {
        options.validate()?;
        let validated = validate_marker_map(markers)?;
        let query = MatchQuery {
            markers: MarkerPanels::embedded().scope(options.panel, &validated),
            max_distance: options.max_distance,
            max_results: options.max_results,
            panel: options.panel,
            haplogroup: options
                .haplogroup_filter
                .as_deref()
                .map(normalize_haplogroup)
                .filter(|h| !h.is_empty()),
            include_subclades: options.include_subclades,
        };

        let key = if options.use_cache {
            match CacheKey::for_matches(&query) {
                Ok(key) => Some(key),
                Err(e) => {
                    tracing::warn!(error = %e, "Could not derive cache key, bypassing cache");
                    None
                }
            }
        } else {
            None
        };

        // Read before the lookup so a write landing during the scan voids the fill
        let generation = self.cache.generation();
        if let Some(key) = &key {
            if let Some(cached) = self.cache.get_matches::<Vec<Match>>(key).await {
                tracing::debug!(key = key.as_str(), matches = cached.len(), "Cache hit");
                return Ok(cached);
            }
        }

        let rows = guarded("batch_match", self.store_timeout, self.store.batch_match(&query))
            .await
            .map_err(MatchError::MatchingFailed)?;

        let matches: Vec<Match> = rows
            .into_iter()
            .filter(|row| row.distance <= query.max_distance)
            .take(query.max_results)
            .map(Match::from)
            .collect();

        tracing::debug!(
            query_markers = query.markers.len(),
            matches = matches.len(),
            "Computed matches"
        );

        if let Some(key) = &key {
            if !matches.is_empty() {
                self.cache.put_matches(key, &matches, generation).await;
            }
        }

        Ok(matches)
    }

    /// Ordered, paginated view of [`find_matches`](Self::find_matches)
    ///
    /// # Errors
    ///
    /// Same as [`find_matches`](Self::find_matches).
    pub async fn find_matches_page(
        &self,
        markers: &MarkerMap,
        options: &MatchOptions,
        offset: usize,
        limit: usize,
    ) -> Result<MatchPage, MatchError> {
        let matches = self.find_matches(markers, options).await?;
        Ok(MatchPage::new(matches, offset, limit))
    }
}
