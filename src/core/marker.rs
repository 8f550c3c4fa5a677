use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::LazyLock;
use thiserror::Error;

use crate::core::panel::MarkerPanels;

/// Marker name -> raw marker value, as stored and exchanged on the wire.
///
/// A `BTreeMap` keeps serialization order stable, which the cache key and
/// snapshot files rely on.
pub type MarkerMap = BTreeMap<String, String>;

/// Wire grammar for marker values. Must stay bit-exact for interoperability.
pub const MARKER_VALUE_PATTERN: &str = r"^[0-9]+(\.[0-9]+)?(-[0-9]+(\.[0-9]+)?)*$";

/// Separator between copies of a multi-copy marker value
pub const COPY_SEPARATOR: char = '-';

static MARKER_VALUE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(MARKER_VALUE_PATTERN).expect("marker value pattern is valid"));

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MarkerError {
    #[error("Invalid marker value for {marker}: \"{value}\" - must be numeric")]
    InvalidValue { marker: String, value: String },

    #[error("Marker name must not be empty")]
    EmptyName,

    #[error("Profile has no markers")]
    NoMarkers,
}

/// Check a raw value against the marker grammar.
///
/// Values whose components are all zero (`0`, `0.0`, `0-0`) are rejected as
/// well: a zero reading means "not tested" in exported spreadsheets.
///
/// # Examples
///
/// ```
/// use ystr_matcher::core::marker::is_valid_marker_value;
///
/// assert!(is_valid_marker_value("13"));
/// assert!(is_valid_marker_value("11-14"));
/// assert!(is_valid_marker_value("15-15-16.2-17"));
/// assert!(!is_valid_marker_value(""));
/// assert!(!is_valid_marker_value("0"));
/// assert!(!is_valid_marker_value("-"));
/// assert!(!is_valid_marker_value("13-"));
/// ```
#[must_use]
pub fn is_valid_marker_value(value: &str) -> bool {
    if !MARKER_VALUE_RE.is_match(value) {
        return false;
    }
    value
        .split(COPY_SEPARATOR)
        .any(|part| part.bytes().any(|b| b != b'0' && b != b'.'))
}

/// Trim a raw value and return it when it satisfies the grammar.
#[must_use]
pub fn normalize_marker_value(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    is_valid_marker_value(trimmed).then(|| trimmed.to_string())
}

/// Validate a whole marker map, returning a trimmed copy.
///
/// Fails on the first offending marker so the caller can report it by name.
///
/// # Errors
///
/// Returns `MarkerError::NoMarkers` for an empty map, `MarkerError::EmptyName`
/// for a blank marker name, or `MarkerError::InvalidValue` for the first value
/// failing the grammar.
pub fn validate_marker_map(markers: &MarkerMap) -> Result<MarkerMap, MarkerError> {
    if markers.is_empty() {
        return Err(MarkerError::NoMarkers);
    }

    let mut normalized = MarkerMap::new();
    for (name, value) in markers {
        let name = name.trim();
        if name.is_empty() {
            return Err(MarkerError::EmptyName);
        }
        let Some(value) = normalize_marker_value(value) else {
            return Err(MarkerError::InvalidValue {
                marker: name.to_string(),
                value: value.clone(),
            });
        };
        normalized.insert(name.to_string(), value);
    }

    Ok(normalized)
}

/// Parse a single (non multi-copy) value as a number, e.g. for per-marker diffs.
#[must_use]
pub fn parse_numeric(value: &str) -> Option<f64> {
    let trimmed = value.trim();
    if trimmed.contains(COPY_SEPARATOR) {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// A parsed, validated marker value ready for distance computation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MarkerValue {
    /// One repeat count
    Single(f64),
    /// Copies of a duplicated locus, sorted ascending
    MultiCopy(Vec<f64>),
}

impl MarkerValue {
    /// Parse a value for the given marker.
    ///
    /// Known multi-copy loci are always parsed as `MultiCopy`, even when only
    /// one copy was reported, so they are scored under the multi-copy rule.
    #[must_use]
    pub fn parse(marker: &str, value: &str) -> Option<Self> {
        let value = value.trim();
        if !is_valid_marker_value(value) {
            return None;
        }

        let mut copies = value
            .split(COPY_SEPARATOR)
            .map(str::parse::<f64>)
            .collect::<Result<Vec<_>, _>>()
            .ok()?;

        if copies.len() == 1 && !MarkerPanels::embedded().is_multi_copy(marker) {
            return Some(Self::Single(copies[0]));
        }

        copies.sort_by(f64::total_cmp);
        Some(Self::MultiCopy(copies))
    }

    /// All copies of this value
    pub fn copies(&self) -> &[f64] {
        match self {
            Self::Single(v) => std::slice::from_ref(v),
            Self::MultiCopy(values) => values,
        }
    }

    pub fn is_multi_copy(&self) -> bool {
        matches!(self, Self::MultiCopy(_))
    }
}

/// Parsed marker values of one profile, keyed by marker name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MarkerSet {
    values: BTreeMap<String, MarkerValue>,
}

impl MarkerSet {
    /// Parse every valid entry of a marker map; invalid entries are skipped.
    pub fn from_map(markers: &MarkerMap) -> Self {
        let values = markers
            .iter()
            .filter_map(|(name, value)| {
                MarkerValue::parse(name, value).map(|parsed| (name.clone(), parsed))
            })
            .collect();
        Self { values }
    }

    pub fn get(&self, marker: &str) -> Option<&MarkerValue> {
        self.values.get(marker)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &MarkerValue)> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
