use serde::{Deserialize, Serialize};

/// Unique, stable identifier of a profile (the kit number)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct KitId(pub String);

impl KitId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for KitId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for KitId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for KitId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Stable error classification shared by every public error type.
///
/// Callers (CLI, web adapter) map these to exit codes and status codes without
/// inspecting error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed marker value or request shape, always the caller's fault
    InvalidInput,
    /// Unknown kit identifier
    NotFound,
    /// Profile store call failed or timed out
    StoreUnavailable,
    /// Store failure while running a match query
    MatchingFailed,
    /// Cache failure; logged internally, never returned to callers
    CacheUnavailable,
    /// A bulk ingestion chunk failed to commit
    ChunkUpsertFailed,
    /// Every submitted profile was cleaned down to zero markers
    NoValidSamples,
    /// Bulk submission rejected before cleaning started
    InvalidSchema,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidInput => "invalid_input",
            Self::NotFound => "not_found",
            Self::StoreUnavailable => "store_unavailable",
            Self::MatchingFailed => "matching_failed",
            Self::CacheUnavailable => "cache_unavailable",
            Self::ChunkUpsertFailed => "chunk_upsert_failed",
            Self::NoValidSamples => "no_valid_samples",
            Self::InvalidSchema => "invalid_schema",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Safely convert usize to f64 for frequency and percentage calculations
#[inline]
pub(crate) fn count_to_f64(count: usize) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    {
        count as f64
    }
}
