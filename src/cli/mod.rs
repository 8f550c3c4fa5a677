//! Command-line interface for ystr-matcher.
//!
//! This module implements the CLI using clap. Available commands:
//!
//! - **match**: Find profiles within a genetic distance of a query
//! - **import**: Bulk-import profiles from a JSON file
//! - **export**: Write a rarity report for a stored profile
//! - **profile**: Show, search, or delete stored profiles
//! - **stats**: Summarize the stored population
//! - **serve**: Start the JSON web API
//!
//! ## Usage
//!
//! ```text
//! # Import profiles into the default database
//! ystr-matcher import samples.json
//!
//! # Match a marker list
//! ystr-matcher match --markers "DYS393=13,DYS390=24,DYS19=14"
//!
//! # Match a stored kit within its haplogroup, as JSON
//! ystr-matcher match --kit B1234 --haplogroup R1b --subclades --format json
//!
//! # Rarity report over the 67-marker panel
//! ystr-matcher export B1234 --panel 67 --format tsv
//! ```

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::catalog::memory::InMemoryProfileStore;
use crate::config::AppConfig;
use crate::core::marker::MarkerMap;
use crate::service::YstrService;

pub mod export;
pub mod import;
pub mod matches;
pub mod profile;
pub mod stats;

/// Snapshot used when `--db` is not given
pub const DEFAULT_DB_PATH: &str = "ystr_profiles.json.gz";

#[derive(Parser)]
#[command(name = "ystr-matcher")]
#[command(author = "Fulcrum Genomics")]
#[command(version)]
#[command(about = "Match Y-STR profiles and score marker rarity")]
#[command(
    long_about = "ystr-matcher compares Y-STR marker profiles against a stored population.\n\nIt provides:\n- Genetic distance matching with haplogroup filters\n- Bulk import with marker cleaning and deduplication\n- Rarity reports over standard marker panels"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format
    #[arg(short, long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Profile database snapshot (.json or .json.gz)
    #[arg(long, global = true, default_value = DEFAULT_DB_PATH)]
    pub db: PathBuf,

    /// Configuration file (TOML)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Find profiles close to a query
    Match(matches::MatchArgs),

    /// Bulk-import profiles from a JSON file
    Import(import::ImportArgs),

    /// Write a rarity report for a stored profile
    Export(export::ExportArgs),

    /// Show, search, or delete stored profiles
    Profile(profile::ProfileArgs),

    /// Summarize the stored population
    Stats,

    /// Start the web server
    Serve(ServeArgs),
}

#[derive(clap::Args)]
pub struct ServeArgs {
    /// Port to listen on (defaults to the configured port)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Address to bind to (defaults to the configured address)
    #[arg(short, long)]
    pub address: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
    Tsv,
}

/// Everything a command needs: configuration, the opened store, and the
/// service built over it
pub struct Session {
    pub config: AppConfig,
    pub store: Arc<InMemoryProfileStore>,
    pub service: YstrService,
}

impl Session {
    /// Load the configuration and open the profile database
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration or snapshot cannot be loaded.
    pub fn open(db: &Path, config: Option<&Path>) -> anyhow::Result<Self> {
        let config = AppConfig::load_or_default(config).context("Failed to load configuration")?;
        let store = Arc::new(
            InMemoryProfileStore::open(db)
                .with_context(|| format!("Failed to open profile database {}", db.display()))?,
        );
        let service = YstrService::from_config(store.clone(), &config);
        Ok(Self {
            config,
            store,
            service,
        })
    }

    /// Persist the profile database
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be written.
    pub fn save(&self) -> anyhow::Result<()> {
        self.store.save().context("Failed to save profile database")
    }
}

/// Run an async command body on a fresh runtime
///
/// # Errors
///
/// Returns an error if the runtime cannot be built or the body fails.
pub fn block_on<F>(body: F) -> anyhow::Result<()>
where
    F: std::future::Future<Output = anyhow::Result<()>>,
{
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(body)
}

/// Parse `DYS393=13,DYS390=24-25` into a marker map.
///
/// Values are not validated here; the engines reject bad values with the
/// offending marker named.
///
/// # Errors
///
/// Returns an error for entries without `=` or with an empty name.
pub fn parse_marker_list(text: &str) -> anyhow::Result<MarkerMap> {
    let mut markers = MarkerMap::new();
    for entry in text.split([',', ';']).map(str::trim).filter(|e| !e.is_empty()) {
        let (name, value) = entry
            .split_once(['=', ':'])
            .with_context(|| format!("Invalid marker entry '{entry}': expected NAME=VALUE"))?;
        let name = name.trim();
        anyhow::ensure!(!name.is_empty(), "Invalid marker entry '{entry}': empty marker name");
        markers.insert(name.to_string(), value.trim().to_string());
    }
    anyhow::ensure!(!markers.is_empty(), "No markers given");
    Ok(markers)
}
