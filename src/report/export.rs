use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use thiserror::Error;

use crate::catalog::store::{guarded, StoreError};
use crate::core::marker::{parse_numeric, MarkerMap};
use crate::core::panel::{MarkerPanels, PanelSize};
use crate::core::types::{ErrorKind, KitId};
use crate::matching::engine::{sort_matches, Match, MatchError, MatchOptions, MatchingEngine};
use crate::report::rarity::rarity_scores;

/// Matches fetched to build the rarity context
pub const DEFAULT_CONTEXT_SIZE: usize = 5000;

/// Matches listed in the report
pub const DEFAULT_TOP_MATCHES: usize = 30;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Profile not found: {0}")]
    NotFound(KitId),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Matching(#[from] MatchError),
}

impl ExportError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Store(e) => e.kind(),
            Self::Matching(e) => e.kind(),
        }
    }
}

/// Options of one export
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportOptions {
    /// Panel the report covers; the medium panel when absent
    pub panel: Option<PanelSize>,
    pub max_distance: u32,
    /// Matches fetched for rarity statistics
    pub context_size: usize,
    /// Matches listed in the report
    pub top_matches: usize,
    pub use_cache: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            panel: None,
            max_distance: crate::matching::engine::DEFAULT_MAX_DISTANCE,
            context_size: DEFAULT_CONTEXT_SIZE,
            top_matches: DEFAULT_TOP_MATCHES,
            use_cache: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportMeta {
    pub query_identifier: KitId,
    pub query_name: String,
    pub query_haplogroup: String,
    pub panel_label: String,
    pub generated_at: DateTime<Utc>,
    pub total_matches_found: usize,
    pub matches_included: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportedMatch {
    pub identifier: KitId,
    pub name: String,
    pub country: String,
    pub haplogroup: String,
    pub genetic_distance: u32,
    pub compared_markers: u32,
    /// Candidate values of in-scope markers
    pub values: MarkerMap,
    /// `candidate - query` for in-scope markers where both are numeric and
    /// differ; absent when equal or missing on either side
    pub diffs: BTreeMap<String, f64>,
}

/// Rarity report of one profile's matches over one panel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportReport {
    pub meta: ReportMeta,
    /// In-scope markers, in panel order
    pub markers: Vec<String>,
    pub query_values: MarkerMap,
    pub rarity_scores: BTreeMap<String, u8>,
    pub matches: Vec<ExportedMatch>,
}

/// Numeric difference rounded to hundredths, so `9.3 - 9` reads `0.3`
fn numeric_diff(query: &str, candidate: &str) -> Option<f64> {
    let q = parse_numeric(query)?;
    let c = parse_numeric(candidate)?;
    let diff = ((c - q) * 100.0).round() / 100.0;
    (diff != 0.0).then_some(diff)
}

fn export_match(m: Match, markers: &[String], query_values: &MarkerMap) -> ExportedMatch {
    let values: MarkerMap = markers
        .iter()
        .filter_map(|marker| Some((marker.clone(), m.markers.get(marker)?.clone())))
        .collect();

    let diffs = markers
        .iter()
        .filter_map(|marker| {
            let diff = numeric_diff(query_values.get(marker)?, values.get(marker)?)?;
            Some((marker.clone(), diff))
        })
        .collect();

    ExportedMatch {
        identifier: m.kit_number,
        name: m.name,
        country: m.country,
        haplogroup: m.haplogroup,
        genetic_distance: m.distance,
        compared_markers: m.compared_markers,
        values,
        diffs,
    }
}

/// Builds rarity reports on top of the matching engine
#[derive(Clone)]
pub struct ExportEngine {
    engine: MatchingEngine,
}

impl ExportEngine {
    pub fn new(engine: MatchingEngine) -> Self {
        Self { engine }
    }

    /// Export the matches of a stored profile.
    ///
    /// The match context is fetched with the profile's own haplogroup
    /// (subclades included) and drives rarity; only the closest
    /// `top_matches` are listed.
    ///
    /// # Errors
    ///
    /// Returns `ExportError::NotFound` for an unknown kit, or the store or
    /// matching failure that stopped the export.
    pub async fn export(&self, kit: &KitId, options: &ExportOptions) -> Result<ExportReport, ExportError> {
        let store = self.engine.store();
        let profile = guarded("get_profile", self.engine.store_timeout(), store.get_profile(kit))
            .await?
            .ok_or_else(|| ExportError::NotFound(kit.clone()))?;

        let panel_size = options.panel.unwrap_or_else(PanelSize::medium);
        let panel = MarkerPanels::embedded().get(panel_size);

        let markers: Vec<String> = panel
            .markers
            .iter()
            .filter(|marker| profile.markers.contains_key(*marker))
            .cloned()
            .collect();
        let query_values: MarkerMap = markers
            .iter()
            .filter_map(|marker| Some((marker.clone(), profile.markers.get(marker)?.clone())))
            .collect();

        let mut match_options = MatchOptions {
            max_distance: options.max_distance,
            max_results: options.context_size.max(1),
            panel: panel_size,
            haplogroup_filter: None,
            include_subclades: true,
            use_cache: options.use_cache,
        };
        if !profile.haplogroup.trim().is_empty() {
            match_options.haplogroup_filter = Some(profile.haplogroup.clone());
        }

        let mut context = self.engine.find_matches(&profile.markers, &match_options).await?;
        let total_matches_found = context.len();
        let rarity = rarity_scores(&markers, &query_values, &context);

        sort_matches(&mut context);
        context.truncate(options.top_matches);
        let matches: Vec<ExportedMatch> = context
            .into_iter()
            .map(|m| export_match(m, &markers, &query_values))
            .collect();

        tracing::info!(
            kit = %kit,
            panel = panel.label(),
            total_matches_found,
            included = matches.len(),
            "Exported matches"
        );

        Ok(ExportReport {
            meta: ReportMeta {
                query_identifier: profile.kit_number.clone(),
                query_name: profile.name.clone(),
                query_haplogroup: profile.haplogroup.clone(),
                panel_label: panel.label().to_string(),
                generated_at: Utc::now(),
                total_matches_found,
                matches_included: matches.len(),
            },
            markers,
            query_values,
            rarity_scores: rarity,
            matches,
        })
    }
}

/// Write the report as pretty JSON.
///
/// # Errors
///
/// Returns any I/O or serialization error.
pub fn write_json<W: Write>(report: &ExportReport, mut out: W) -> std::io::Result<()> {
    serde_json::to_writer_pretty(&mut out, report)?;
    writeln!(out)
}

/// Write the report as TSV: a header, the query row, the rarity row, then
/// one row per match with its marker values.
///
/// # Errors
///
/// Returns any I/O error.
pub fn write_tsv<W: Write>(report: &ExportReport, mut out: W) -> std::io::Result<()> {
    let blank = String::new();

    write!(out, "kit\tname\tcountry\thaplogroup\tgd\tcompared")?;
    for marker in &report.markers {
        write!(out, "\t{marker}")?;
    }
    writeln!(out)?;

    write!(
        out,
        "{}\t{}\t\t{}\t0\t{}",
        report.meta.query_identifier,
        report.meta.query_name,
        report.meta.query_haplogroup,
        report.markers.len()
    )?;
    for marker in &report.markers {
        write!(out, "\t{}", report.query_values.get(marker).unwrap_or(&blank))?;
    }
    writeln!(out)?;

    write!(out, "rarity\t\t\t\t\t")?;
    for marker in &report.markers {
        match report.rarity_scores.get(marker) {
            Some(code) => write!(out, "\t{code}")?,
            None => write!(out, "\t")?,
        }
    }
    writeln!(out)?;

    for m in &report.matches {
        write!(
            out,
            "{}\t{}\t{}\t{}\t{}\t{}",
            m.identifier, m.name, m.country, m.haplogroup, m.genetic_distance, m.compared_markers
        )?;
        for marker in &report.markers {
            write!(out, "\t{}", m.values.get(marker).unwrap_or(&blank))?;
        }
        writeln!(out)?;
    }
    Ok(())
}

/// Write a human-readable summary of the report.
///
/// # Errors
///
/// Returns any I/O error.
pub fn write_text<W: Write>(report: &ExportReport, mut out: W) -> std::io::Result<()> {
    let meta = &report.meta;
    writeln!(out, "Kit {} ({})", meta.query_identifier, meta.panel_label)?;
    if !meta.query_name.is_empty() {
        writeln!(out, "   Name: {}", meta.query_name)?;
    }
    if !meta.query_haplogroup.is_empty() {
        writeln!(out, "   Haplogroup: {}", meta.query_haplogroup)?;
    }
    writeln!(
        out,
        "   Matches: {} shown of {} found",
        meta.matches_included, meta.total_matches_found
    )?;

    let rare: Vec<String> = report
        .rarity_scores
        .iter()
        .filter(|(_, code)| **code >= 3)
        .map(|(marker, code)| format!("{marker}={} ({code})", report.query_values[marker]))
        .collect();
    if !rare.is_empty() {
        writeln!(out, "   Rare values: {}", rare.join(", "))?;
    }

    if report.matches.is_empty() {
        writeln!(out, "\nNo matches found.")?;
        return Ok(());
    }

    writeln!(out, "\n{}", "─".repeat(60))?;
    for (i, m) in report.matches.iter().enumerate() {
        let label = if m.name.is_empty() {
            m.identifier.to_string()
        } else {
            format!("{} ({})", m.identifier, m.name)
        };
        writeln!(
            out,
            "#{:<3} {:<32} GD {:>2} over {:>3} markers  {}",
            i + 1,
            label,
            m.genetic_distance,
            m.compared_markers,
            m.haplogroup
        )?;
        if !m.diffs.is_empty() {
            let diffs: Vec<String> = m
                .diffs
                .iter()
                .map(|(marker, d)| format!("{marker} {d:+}"))
                .collect();
            writeln!(out, "     {}", diffs.join(", "))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ResultCache;
    use crate::catalog::memory::InMemoryProfileStore;
    use crate::core::profile::Profile;
    use std::sync::Arc;

    fn markers(pairs: &[(&str, &str)]) -> MarkerMap {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    fn export_engine(profiles: Vec<Profile>) -> ExportEngine {
        let store = Arc::new(InMemoryProfileStore::with_profiles(profiles));
        ExportEngine::new(MatchingEngine::new(store, ResultCache::disabled()))
    }

    #[test]
    fn test_numeric_diff() {
        assert_eq!(numeric_diff("13", "14"), Some(1.0));
        assert_eq!(numeric_diff("14", "13"), Some(-1.0));
        assert_eq!(numeric_diff("9", "9.3"), Some(0.3));
        assert_eq!(numeric_diff("13", "13"), None);
        assert_eq!(numeric_diff("24-25", "24"), None);
    }

    #[tokio::test]
    async fn test_unknown_kit() {
        let err = export_engine(vec![])
            .export(&KitId::from("NOPE"), &ExportOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_report_is_restricted_to_panel() {
        // DYS492 belongs to Y67, so a Y12 export never mentions it
        let engine = export_engine(vec![
            Profile::new("Q", markers(&[("DYS393", "13"), ("DYS390", "24"), ("DYS492", "12")]))
                .with_haplogroup("R1b"),
            Profile::new("M1", markers(&[("DYS393", "14"), ("DYS390", "24"), ("DYS492", "13")]))
                .with_haplogroup("R1b1a"),
        ]);
        let options = ExportOptions {
            panel: Some(PanelSize::Y12),
            ..ExportOptions::default()
        };
        let report = engine.export(&KitId::from("Q"), &options).await.unwrap();

        assert_eq!(report.meta.panel_label, "Y12");
        assert_eq!(report.markers, vec!["DYS393", "DYS390"]);
        assert!(!report.query_values.contains_key("DYS492"));
        assert_eq!(report.meta.total_matches_found, 2);

        let m1 = report
            .matches
            .iter()
            .find(|m| m.identifier.as_str() == "M1")
            .unwrap();
        assert_eq!(m1.genetic_distance, 1);
        assert_eq!(m1.diffs.len(), 1);
        assert_eq!(m1.diffs["DYS393"], 1.0);
        assert!(!m1.values.contains_key("DYS492"));
    }

    #[tokio::test]
    async fn test_writers() {
        let engine = export_engine(vec![
            Profile::new("Q", markers(&[("DYS393", "13")])),
            Profile::new("M1", markers(&[("DYS393", "14")])).with_name("Smith"),
        ]);
        let report = engine
            .export(&KitId::from("Q"), &ExportOptions::default())
            .await
            .unwrap();

        let mut json = Vec::new();
        write_json(&report, &mut json).unwrap();
        let back: ExportReport = serde_json::from_slice(&json).unwrap();
        assert_eq!(back.matches.len(), 2);

        let mut tsv = Vec::new();
        write_tsv(&report, &mut tsv).unwrap();
        let tsv = String::from_utf8(tsv).unwrap();
        let lines: Vec<&str> = tsv.lines().collect();
        assert_eq!(lines.len(), 5);
        assert!(lines[0].starts_with("kit\tname"));
        assert!(lines[4].starts_with("M1\tSmith"));

        let mut text = Vec::new();
        write_text(&report, &mut text).unwrap();
        let text = String::from_utf8(text).unwrap();
        assert!(text.contains("Kit Q (Y37)"));
        assert!(text.contains("M1 (Smith)"));
    }
}
