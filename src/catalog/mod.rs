//! Profile population storage and indexing.
//!
//! The engines talk to the population only through the [`ProfileStore`]
//! trait. [`InMemoryProfileStore`] is the bundled implementation: it keeps
//! the population in an indexed [`ProfileCatalog`], scans it in parallel for
//! matches, and persists it to a JSON snapshot (gzip-compressed when the path
//! ends in `.gz`).
//!
//! ## Example
//!
//! ```rust,no_run
//! use ystr_matcher::catalog::{InMemoryProfileStore, ProfileStore};
//! use ystr_matcher::core::types::KitId;
//! use std::path::Path;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let store = InMemoryProfileStore::open(Path::new("profiles.json.gz"))?;
//! if let Some(profile) = store.get_profile(&KitId::new("B1234")).await? {
//!     println!("{} has {} markers", profile.kit_number, profile.marker_count());
//! }
//! store.save()?;
//! # Ok(())
//! # }
//! ```

pub mod index;
pub mod memory;
pub mod snapshot;
pub mod store;

pub use index::{CandidateFinder, IndexedProfile, ProfileCatalog};
pub use memory::InMemoryProfileStore;
pub use snapshot::SnapshotError;
pub use store::{
    guarded, MatchQuery, MatchRow, ProfileStore, SearchQuery, StoreError, StoreStatistics,
    UpsertAction, UpsertMode, UpsertOutcome,
};
