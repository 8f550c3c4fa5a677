use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

use crate::core::marker::MarkerMap;
use crate::core::panel::PanelSize;
use crate::core::profile::{Profile, ProfilePatch};
use crate::core::types::{ErrorKind, KitId};

#[derive(Error, Debug, Clone)]
pub enum StoreError {
    #[error("Profile store unavailable: {0}")]
    Unavailable(String),

    #[error("Profile store call '{operation}' timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },

    #[error("Profile rejected by store: {0}")]
    Rejected(String),
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Unavailable(_) | Self::Timeout { .. } => ErrorKind::StoreUnavailable,
            Self::Rejected(_) => ErrorKind::InvalidInput,
        }
    }
}

/// Run a store call under a deadline.
///
/// The store is not optional: a timeout is reported as a failure, never
/// swallowed.
///
/// # Errors
///
/// Returns `StoreError::Timeout` when the deadline passes, otherwise the
/// call's own result.
pub async fn guarded<T, F>(operation: &'static str, timeout: Duration, call: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout { operation, timeout }),
    }
}

/// How batch upserts treat kits that already exist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpsertMode {
    /// Overwrite existing kits
    #[default]
    Replace,
    /// Leave existing kits untouched
    InsertOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertAction {
    Created,
    Updated,
}

/// Prior and new state of an upserted profile, for audit by collaborators
#[derive(Debug, Clone, Serialize)]
pub struct UpsertOutcome {
    pub action: UpsertAction,
    pub previous: Option<Profile>,
    pub current: Profile,
}

/// Parameters of the batch matching primitive.
///
/// Serializes deterministically, so its JSON form doubles as the normalized
/// query behind cache keys.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchQuery {
    /// Validated query markers
    pub markers: MarkerMap,
    pub max_distance: u32,
    pub max_results: usize,
    pub panel: PanelSize,
    pub haplogroup: Option<String>,
    pub include_subclades: bool,
}

/// One candidate returned by the batch matching primitive
#[derive(Debug, Clone, PartialEq)]
pub struct MatchRow {
    pub profile: Profile,
    pub distance: u32,
    pub compared_markers: u32,
}

/// Population statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreStatistics {
    pub total_profiles: usize,
    pub unique_haplogroups: usize,
    pub avg_markers_per_profile: f64,
    /// Most common haplogroups, by count descending then label
    pub top_haplogroups: Vec<HaplogroupCount>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HaplogroupCount {
    pub haplogroup: String,
    pub count: usize,
}

/// Profile search parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    /// Case-insensitive substring of kit number or name
    pub term: Option<String>,
    /// Exact haplogroup label
    pub haplogroup: Option<String>,
    pub limit: usize,
    pub offset: usize,
}

impl Default for SearchQuery {
    fn default() -> Self {
        Self {
            term: None,
            haplogroup: None,
            limit: 100,
            offset: 0,
        }
    }
}

/// Search hit, without marker values
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfileSummary {
    pub kit_number: KitId,
    pub name: String,
    pub country: String,
    pub haplogroup: String,
    pub marker_count: usize,
    pub created_at: DateTime<Utc>,
}

impl From<&Profile> for ProfileSummary {
    fn from(profile: &Profile) -> Self {
        Self {
            kit_number: profile.kit_number.clone(),
            name: profile.name.clone(),
            country: profile.country.clone(),
            haplogroup: profile.haplogroup.clone(),
            marker_count: profile.marker_count(),
            created_at: profile.created_at,
        }
    }
}

/// Durable keyed storage of profiles.
///
/// Implementations must make every call atomic on its own; the core never
/// coordinates concurrent access beyond that.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn get_profile(&self, kit: &KitId) -> Result<Option<Profile>, StoreError>;

    /// Atomic create-or-replace. `created_at` survives a replace.
    async fn upsert_profile(&self, profile: Profile) -> Result<UpsertOutcome, StoreError>;

    /// Apply a partial update; `Ok(None)` when the kit does not exist
    async fn update_profile(
        &self,
        kit: &KitId,
        patch: &ProfilePatch,
    ) -> Result<Option<UpsertOutcome>, StoreError>;

    /// Remove a profile, returning it; `Ok(None)` when the kit does not exist
    async fn delete_profile(&self, kit: &KitId) -> Result<Option<Profile>, StoreError>;

    /// Write a batch in one transaction, returning the number of profiles written
    async fn batch_upsert(&self, profiles: Vec<Profile>, mode: UpsertMode)
        -> Result<usize, StoreError>;

    /// Scan the population for candidates within `max_distance` of the query
    async fn batch_match(&self, query: &MatchQuery) -> Result<Vec<MatchRow>, StoreError>;

    /// Trivial round trip used by health checks
    async fn ping(&self) -> Result<(), StoreError>;

    async fn count(&self) -> Result<usize, StoreError>;

    async fn statistics(&self) -> Result<StoreStatistics, StoreError>;

    async fn search(&self, query: &SearchQuery) -> Result<Vec<ProfileSummary>, StoreError>;
}
