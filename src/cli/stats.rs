use std::path::Path;

use crate::cli::{block_on, OutputFormat, Session};

/// Execute stats command
///
/// # Errors
///
/// Returns an error if the database cannot be read.
pub fn run(format: OutputFormat, db: &Path, config: Option<&Path>) -> anyhow::Result<()> {
    let session = Session::open(db, config)?;
    block_on(async move {
        let stats = session.service.statistics().await?;
        match format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&stats)?),
            OutputFormat::Tsv => {
                println!("haplogroup\tcount");
                for entry in &stats.top_haplogroups {
                    println!("{}\t{}", entry.haplogroup, entry.count);
                }
            }
            OutputFormat::Text => {
                println!("Profiles: {}", stats.total_profiles);
                println!("Unique haplogroups: {}", stats.unique_haplogroups);
                println!("Average markers per profile: {:.2}", stats.avg_markers_per_profile);
                if !stats.top_haplogroups.is_empty() {
                    println!("\nTop haplogroups:");
                    for entry in &stats.top_haplogroups {
                        println!("   {:<20} {:>6}", entry.haplogroup, entry.count);
                    }
                }
            }
        }
        Ok(())
    })
}
