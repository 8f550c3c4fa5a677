use clap::{Args, Subcommand};
use std::path::Path;

use crate::catalog::store::{ProfileSummary, SearchQuery};
use crate::cli::{block_on, OutputFormat, Session};
use crate::core::profile::Profile;
use crate::core::types::KitId;

#[derive(Args)]
pub struct ProfileArgs {
    #[command(subcommand)]
    pub command: ProfileCommands,
}

#[derive(Subcommand)]
pub enum ProfileCommands {
    /// Print one stored profile
    Show {
        /// Kit number
        kit: String,
    },

    /// Remove a stored profile
    Delete {
        /// Kit number
        kit: String,
    },

    /// List profiles by kit number, name, or haplogroup
    Search {
        /// Case-insensitive substring of kit number or name
        term: Option<String>,

        /// Only list this haplogroup
        #[arg(long)]
        haplogroup: Option<String>,

        /// Number of profiles to list
        #[arg(short = 'n', long, default_value = "100")]
        limit: usize,

        /// Skip this many profiles
        #[arg(long, default_value = "0")]
        offset: usize,
    },
}

/// Execute profile subcommands
///
/// # Errors
///
/// Returns an error if the kit is unknown or the database cannot be read or
/// saved.
pub fn run(
    args: ProfileArgs,
    format: OutputFormat,
    db: &Path,
    config: Option<&Path>,
) -> anyhow::Result<()> {
    let session = Session::open(db, config)?;
    block_on(async move {
        match args.command {
            ProfileCommands::Show { kit } => {
                let profile = session.service.get_profile(&KitId::new(kit)).await?;
                print_profile(&profile, format)?;
            }
            ProfileCommands::Delete { kit } => {
                let removed = session.service.delete_profile(&KitId::new(kit)).await?;
                session.save()?;
                println!("Deleted {}", removed.kit_number);
            }
            ProfileCommands::Search {
                term,
                haplogroup,
                limit,
                offset,
            } => {
                let query = SearchQuery {
                    term,
                    haplogroup,
                    limit,
                    offset,
                };
                let hits = session.service.search(&query).await?;
                print_summaries(&hits, format)?;
            }
        }
        Ok(())
    })
}

fn print_profile(profile: &Profile, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(profile)?),
        OutputFormat::Tsv => {
            println!("marker\tvalue");
            for (marker, value) in &profile.markers {
                println!("{marker}\t{value}");
            }
        }
        OutputFormat::Text => {
            println!("Kit {}", profile.kit_number);
            if !profile.name.is_empty() {
                println!("   Name: {}", profile.name);
            }
            if !profile.country.is_empty() {
                println!("   Country: {}", profile.country);
            }
            if !profile.haplogroup.is_empty() {
                println!("   Haplogroup: {}", profile.haplogroup);
            }
            println!("   Updated: {}", profile.updated_at.to_rfc3339());
            println!("   Markers ({}):", profile.marker_count());
            for (marker, value) in &profile.markers {
                println!("     {marker:<12} {value}");
            }
        }
    }
    Ok(())
}

fn print_summaries(hits: &[ProfileSummary], format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(hits)?),
        OutputFormat::Tsv => {
            println!("kit_number\tname\tcountry\thaplogroup\tmarker_count");
            for hit in hits {
                println!(
                    "{}\t{}\t{}\t{}\t{}",
                    hit.kit_number, hit.name, hit.country, hit.haplogroup, hit.marker_count
                );
            }
        }
        OutputFormat::Text => {
            if hits.is_empty() {
                println!("No profiles found.");
            }
            for hit in hits {
                println!(
                    "{:<20} {:<32} {:<12} {:>3} markers",
                    hit.kit_number.as_str(),
                    hit.name,
                    hit.haplogroup,
                    hit.marker_count
                );
            }
        }
    }
    Ok(())
}
