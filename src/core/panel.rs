//! Standard marker panels (Y12 through Y111).
//!
//! Panels are immutable reference data compiled into the binary from
//! `panels/ftdna_panels.json`. The table lists, per panel, only the markers it
//! adds to the previous one; the cumulative lists built here are therefore
//! strictly nested and keep the testing-company ordering.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::str::FromStr;
use std::sync::LazyLock;
use thiserror::Error;

use crate::core::marker::MarkerMap;

#[derive(Error, Debug)]
pub enum PanelError {
    #[error("Failed to parse panel table: {0}")]
    ParseError(#[from] serde_json::Error),

    #[error("Unknown panel size: {0} (expected one of 12, 25, 37, 67, 111)")]
    UnknownSize(u32),

    #[error("Marker '{0}' is listed by more than one panel")]
    DuplicateMarker(String),

    #[error("Panel table does not define {0}")]
    MissingPanel(PanelSize),
}

/// Standard panel sizes
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(try_from = "u32", into = "u32")]
pub enum PanelSize {
    Y12,
    Y25,
    #[default]
    Y37,
    Y67,
    Y111,
}

impl PanelSize {
    pub const ALL: [PanelSize; 5] = [Self::Y12, Self::Y25, Self::Y37, Self::Y67, Self::Y111];

    pub fn marker_count(self) -> u32 {
        match self {
            Self::Y12 => 12,
            Self::Y25 => 25,
            Self::Y37 => 37,
            Self::Y67 => 67,
            Self::Y111 => 111,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Y12 => "Y12",
            Self::Y25 => "Y25",
            Self::Y37 => "Y37",
            Self::Y67 => "Y67",
            Self::Y111 => "Y111",
        }
    }

    /// The medium panel used when a caller does not ask for one
    pub fn medium() -> Self {
        Self::Y37
    }
}

impl std::fmt::Display for PanelSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl TryFrom<u32> for PanelSize {
    type Error = PanelError;

    fn try_from(count: u32) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|p| p.marker_count() == count)
            .ok_or(PanelError::UnknownSize(count))
    }
}

impl From<PanelSize> for u32 {
    fn from(size: PanelSize) -> Self {
        size.marker_count()
    }
}

impl FromStr for PanelSize {
    type Err = String;

    /// Accepts `37` as well as `Y37`/`y37`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.trim().trim_start_matches(['Y', 'y']);
        let count: u32 = digits
            .parse()
            .map_err(|_| format!("invalid panel '{s}': expected 12, 25, 37, 67 or 111"))?;
        Self::try_from(count).map_err(|e| e.to_string())
    }
}

/// One cumulative panel
#[derive(Debug, Clone)]
pub struct MarkerPanel {
    pub size: PanelSize,
    /// Markers in panel order, including those of every smaller panel
    pub markers: Vec<String>,
    lookup: HashSet<String>,
}

impl MarkerPanel {
    pub fn label(&self) -> &'static str {
        self.size.label()
    }

    pub fn contains(&self, marker: &str) -> bool {
        self.lookup.contains(marker)
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }
}

#[derive(Debug, Deserialize)]
struct PanelTable {
    panels: Vec<PanelBlock>,
    #[serde(default)]
    multi_copy: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct PanelBlock {
    size: u32,
    markers: Vec<String>,
}

/// The full set of standard panels plus multi-copy locus knowledge
#[derive(Debug, Clone)]
pub struct MarkerPanels {
    panels: Vec<MarkerPanel>,
    multi_copy: HashSet<String>,
}

static EMBEDDED_PANELS: LazyLock<MarkerPanels> = LazyLock::new(|| {
    // Validated at compile time by build.rs
    const EMBEDDED_TABLE: &str = include_str!("../../panels/ftdna_panels.json");
    MarkerPanels::from_json(EMBEDDED_TABLE).expect("embedded panel table is validated by build.rs")
});

impl MarkerPanels {
    /// The panel table compiled into the binary
    pub fn embedded() -> &'static MarkerPanels {
        &EMBEDDED_PANELS
    }

    /// Parse a panel table from JSON
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed, lists an unknown size,
    /// repeats a marker, or leaves a standard size undefined.
    pub fn from_json(json: &str) -> Result<Self, PanelError> {
        let table: PanelTable = serde_json::from_str(json)?;

        let mut seen: HashSet<String> = HashSet::new();
        let mut cumulative: Vec<String> = Vec::new();
        let mut panels = Vec::with_capacity(table.panels.len());

        for block in table.panels {
            let size = PanelSize::try_from(block.size)?;
            for marker in block.markers {
                if !seen.insert(marker.clone()) {
                    return Err(PanelError::DuplicateMarker(marker));
                }
                cumulative.push(marker);
            }
            panels.push(MarkerPanel {
                size,
                markers: cumulative.clone(),
                lookup: cumulative.iter().cloned().collect(),
            });
        }

        for size in PanelSize::ALL {
            if !panels.iter().any(|p| p.size == size) {
                return Err(PanelError::MissingPanel(size));
            }
        }

        Ok(Self {
            panels,
            multi_copy: table.multi_copy.into_iter().collect(),
        })
    }

    /// Get a panel by size
    #[allow(clippy::missing_panics_doc)] // from_json guarantees every size exists
    pub fn get(&self, size: PanelSize) -> &MarkerPanel {
        self.panels
            .iter()
            .find(|p| p.size == size)
            .expect("every standard panel size is present")
    }

    /// The largest panel, covering every standard marker
    pub fn largest(&self) -> &MarkerPanel {
        self.get(PanelSize::Y111)
    }

    pub fn panels(&self) -> &[MarkerPanel] {
        &self.panels
    }

    /// Known duplicated locus (scored under the multi-copy rule)
    pub fn is_multi_copy(&self, marker: &str) -> bool {
        self.multi_copy.contains(marker)
    }

    /// Whether a marker belongs to any standard panel
    pub fn is_standard(&self, marker: &str) -> bool {
        self.largest().contains(marker)
    }

    /// Restrict a query to the markers in scope for a panel.
    ///
    /// Standard markers beyond the selected panel are dropped; markers outside
    /// every standard panel are kept, since the panel says nothing about them.
    pub fn scope(&self, size: PanelSize, markers: &MarkerMap) -> MarkerMap {
        let panel = self.get(size);
        markers
            .iter()
            .filter(|(name, _)| panel.contains(name) || !self.is_standard(name))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_panels_are_nested() {
        let panels = MarkerPanels::embedded();
        for pair in panels.panels().windows(2) {
            let (smaller, larger) = (&pair[0], &pair[1]);
            assert!(smaller.size < larger.size);
            assert_eq!(
                &larger.markers[..smaller.markers.len()],
                smaller.markers.as_slice(),
                "{} must be a prefix of {}",
                smaller.label(),
                larger.label()
            );
        }
    }

    #[test]
    fn test_panel_lookup() {
        let panels = MarkerPanels::embedded();
        let y12 = panels.get(PanelSize::Y12);
        assert_eq!(y12.markers[0], "DYS393");
        assert!(y12.contains("DYS389ii"));
        assert!(!y12.contains("DYS458"));
        assert!(panels.get(PanelSize::Y37).contains("CDY"));
        assert!(panels.is_multi_copy("DYS464"));
        assert!(!panels.is_multi_copy("DYS393"));
    }

    #[test]
    fn test_panel_size_parsing() {
        assert_eq!("37".parse::<PanelSize>().unwrap(), PanelSize::Y37);
        assert_eq!("Y111".parse::<PanelSize>().unwrap(), PanelSize::Y111);
        assert!("40".parse::<PanelSize>().is_err());
        assert!(PanelSize::try_from(50).is_err());
        assert_eq!(PanelSize::default(), PanelSize::medium());
    }

    #[test]
    fn test_panel_size_serde_as_number() {
        let json = serde_json::to_string(&PanelSize::Y67).unwrap();
        assert_eq!(json, "67");
        let back: PanelSize = serde_json::from_str("25").unwrap();
        assert_eq!(back, PanelSize::Y25);
        assert!(serde_json::from_str::<PanelSize>("26").is_err());
    }

    #[test]
    fn test_scope_keeps_non_standard_markers() {
        let mut markers = MarkerMap::new();
        markers.insert("DYS393".to_string(), "13".to_string());
        markers.insert("DYS458".to_string(), "17".to_string());
        markers.insert("FGC-CUSTOM".to_string(), "9".to_string());

        let scoped = MarkerPanels::embedded().scope(PanelSize::Y12, &markers);
        assert!(scoped.contains_key("DYS393"));
        assert!(!scoped.contains_key("DYS458"));
        assert!(scoped.contains_key("FGC-CUSTOM"));
    }

    #[test]
    fn test_duplicate_marker_rejected() {
        let json = r#"{"panels": [
            {"label": "Y12", "size": 12, "markers": ["A"]},
            {"label": "Y25", "size": 25, "markers": ["A"]}
        ]}"#;
        assert!(matches!(
            MarkerPanels::from_json(json),
            Err(PanelError::DuplicateMarker(m)) if m == "A"
        ));
    }
}
