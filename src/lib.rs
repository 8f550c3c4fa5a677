//! # ystr-matcher
//!
//! A library for matching Y-STR marker profiles against a stored population.
//!
//! A Y-STR profile maps marker names (`DYS393`, `DYS464`, ...) to repeat
//! counts. Two men who share a recent paternal ancestor carry nearly the same
//! counts, so the sum of per-marker differences, the genetic distance, is a
//! proxy for how closely they are related.
//!
//! ## Features
//!
//! - **Genetic distance**: Single-copy and multi-copy markers, with capped
//!   multi-copy contributions
//! - **Panel scoping**: Compare over the standard 12/25/37/67/111 panels
//! - **Haplogroup filters**: Exact or subclade-aware candidate restriction
//! - **Result cache**: Fail-soft cache that never affects correctness
//! - **Bulk ingestion**: Validation, marker cleaning, deduplication, and
//!   chunked writes with progress
//! - **Rarity reports**: Per-marker rarity codes over a panel
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use ystr_matcher::{AppConfig, InMemoryProfileStore, MatchOptions, Profile, YstrService};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(InMemoryProfileStore::new());
//! let service = YstrService::from_config(store, &AppConfig::default());
//!
//! let markers = [("DYS393", "13"), ("DYS390", "24")]
//!     .into_iter()
//!     .map(|(k, v)| (k.to_string(), v.to_string()))
//!     .collect();
//! service.upsert_profile(Profile::new("B1234", markers)).await?;
//!
//! let query = [("DYS393", "13"), ("DYS390", "25")]
//!     .into_iter()
//!     .map(|(k, v)| (k.to_string(), v.to_string()))
//!     .collect();
//! for m in service.find_matches(&query, &MatchOptions::default()).await? {
//!     println!("{}: GD {}", m.kit_number, m.distance);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`core`]: Profiles, marker values, and standard panels
//! - [`matching`]: Genetic distance, haplogroup filters, and the matching engine
//! - [`catalog`]: Profile store trait, in-memory store, and snapshots
//! - [`cache`]: Fail-soft result cache
//! - [`ingest`]: Bulk ingestion pipeline
//! - [`report`]: Rarity scoring and report export
//! - [`service`]: Facade tying the store, cache, and engines together
//! - [`config`]: TOML configuration
//! - [`cli`]: Command-line interface implementation
//! - [`web`]: JSON web API

pub mod cache;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod core;
pub mod ingest;
pub mod matching;
pub mod report;
pub mod service;
pub mod web;

// Re-export commonly used types for convenience
pub use cache::{CacheState, ResultCache};
pub use catalog::memory::InMemoryProfileStore;
pub use catalog::store::{ProfileStore, StoreError};
pub use config::AppConfig;
pub use crate::core::marker::{MarkerError, MarkerMap};
pub use crate::core::panel::PanelSize;
pub use crate::core::profile::{Profile, ProfileError, ProfilePatch, ProfileSubmission};
pub use crate::core::types::*;
pub use matching::engine::{Match, MatchOptions, MatchingEngine};
pub use service::{ServiceError, YstrService};
