//! Y-STR matching: distance, haplogroup filtering, and the matching engine.
//!
//! - [`GeneticDistance`]: per-pair distance and compared-marker count
//! - [`HaplogroupFilter`]: candidate restriction by haplogroup and subclades
//! - [`MatchingEngine`]: validated, cached queries against a profile store
//!
//! ## Distance
//!
//! Only markers present in both profiles are compared. Single-copy markers
//! contribute their repeat-step difference, with intermediate readings
//! rounded up to a whole step. Multi-copy markers are paired at minimum cost,
//! charge 1 per unpaired copy, and contribute at most 2.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use ystr_matcher::cache::ResultCache;
//! use ystr_matcher::catalog::InMemoryProfileStore;
//! use ystr_matcher::core::marker::MarkerMap;
//! use ystr_matcher::matching::{MatchOptions, MatchingEngine};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(InMemoryProfileStore::new());
//! let engine = MatchingEngine::new(store, ResultCache::disabled());
//!
//! let mut query = MarkerMap::new();
//! query.insert("DYS393".to_string(), "13".to_string());
//! query.insert("DYS390".to_string(), "24".to_string());
//!
//! for m in engine.find_matches(&query, &MatchOptions::default()).await? {
//!     println!("{}: GD {} over {} markers", m.kit_number, m.distance, m.compared_markers);
//! }
//! # Ok(())
//! # }
//! ```

pub mod distance;
pub mod engine;
pub mod haplogroup;

pub use distance::GeneticDistance;
pub use engine::{Match, MatchError, MatchOptions, MatchPage, MatchingEngine};
pub use haplogroup::HaplogroupFilter;
