//! Rarity analysis and match export.
//!
//! [`ExportEngine`] matches a stored profile against its haplogroup, scores
//! how rare each of its values is within that context, and lists the
//! closest matches over exactly one panel. Reports render as JSON, TSV, or
//! text.

pub mod export;
pub mod rarity;

pub use export::{ExportEngine, ExportError, ExportOptions, ExportReport, ExportedMatch, ReportMeta};
pub use rarity::rarity_code;
