use anyhow::Context as _;
use clap::Args;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::cli::{block_on, OutputFormat, Session};
use crate::core::panel::PanelSize;
use crate::core::types::KitId;
use crate::report::export::{write_json, write_text, write_tsv};

#[derive(Args)]
pub struct ExportArgs {
    /// Kit number of the stored profile to report on
    #[arg(required = true)]
    pub kit: String,

    /// Panel the report covers (12, 25, 37, 67 or 111)
    #[arg(long)]
    pub panel: Option<PanelSize>,

    /// Number of matches listed in the report
    #[arg(long)]
    pub top: Option<usize>,

    /// Largest genetic distance of listed and context matches
    #[arg(long)]
    pub max_distance: Option<u32>,

    /// Write the report to this file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Execute export command
///
/// # Errors
///
/// Returns an error if the kit is unknown, matching fails, or the report
/// cannot be written.
pub fn run(
    args: ExportArgs,
    format: OutputFormat,
    verbose: bool,
    db: &Path,
    config: Option<&Path>,
) -> anyhow::Result<()> {
    let session = Session::open(db, config)?;

    let mut options = session.config.export_options();
    if let Some(panel) = args.panel {
        options.panel = Some(panel);
    }
    if let Some(top) = args.top {
        options.top_matches = top;
    }
    if let Some(max_distance) = args.max_distance {
        options.max_distance = max_distance;
    }

    block_on(async move {
        let kit = KitId::new(args.kit);
        let report = session.service.export(&kit, &options).await?;

        if verbose {
            eprintln!(
                "Report for {}: {} of {} matches over {} markers",
                kit,
                report.meta.matches_included,
                report.meta.total_matches_found,
                report.markers.len()
            );
        }

        let mut out: Box<dyn Write> = match &args.output {
            Some(path) => Box::new(BufWriter::new(
                File::create(path)
                    .with_context(|| format!("Failed to create {}", path.display()))?,
            )),
            None => Box::new(std::io::stdout().lock()),
        };
        match format {
            OutputFormat::Text => write_text(&report, &mut out)?,
            OutputFormat::Json => write_json(&report, &mut out)?,
            OutputFormat::Tsv => write_tsv(&report, &mut out)?,
        }
        out.flush()?;

        if let Some(path) = &args.output {
            eprintln!("Wrote report to {}", path.display());
        }
        Ok(())
    })
}
