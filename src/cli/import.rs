use anyhow::Context as _;
use clap::Args;
use serde::Deserialize;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};

use crate::cli::{block_on, OutputFormat, Session};
use crate::core::profile::ProfileSubmission;
use crate::ingest::bulk::{BulkOptions, ChunkProgress, IngestReport};

#[derive(Args)]
pub struct ImportArgs {
    /// JSON file: an array of samples, or an object with a "samples" array
    #[arg(required = true)]
    pub input: PathBuf,

    /// Leave kits that already exist untouched instead of replacing them
    #[arg(long)]
    pub keep_existing: bool,

    /// Profiles per store transaction (defaults to the configured size)
    #[arg(long)]
    pub chunk_size: Option<usize>,
}

/// Accepted shapes of an import file
#[derive(Deserialize)]
#[serde(untagged)]
enum ImportFile {
    Samples(Vec<ProfileSubmission>),
    Wrapped {
        samples: Vec<ProfileSubmission>,
        #[serde(default, alias = "replaceExisting")]
        replace_existing: Option<bool>,
        #[serde(default)]
        options: Option<BulkOptions>,
    },
}

impl ImportFile {
    fn into_parts(self) -> (Vec<ProfileSubmission>, Option<BulkOptions>) {
        match self {
            Self::Samples(samples) => (samples, None),
            Self::Wrapped {
                samples,
                replace_existing: None,
                options,
            } => (samples, options),
            Self::Wrapped {
                samples,
                replace_existing: Some(replace),
                options,
            } => {
                let mut options = options.unwrap_or_default();
                options.replace_existing = replace;
                (samples, Some(options))
            }
        }
    }
}

/// Execute import command
///
/// # Errors
///
/// Returns an error if the file cannot be parsed, the batch is rejected, or
/// the database cannot be saved.
pub fn run(
    args: ImportArgs,
    format: OutputFormat,
    verbose: bool,
    db: &Path,
    config: Option<&Path>,
) -> anyhow::Result<()> {
    let mut session = Session::open(db, config)?;
    if let Some(chunk_size) = args.chunk_size {
        anyhow::ensure!(chunk_size > 0, "--chunk-size must be at least 1");
        session.config.ingest.chunk_size = chunk_size;
        session.service =
            crate::service::YstrService::from_config(session.store.clone(), &session.config);
    }

    let content = std::fs::read_to_string(&args.input)
        .with_context(|| format!("Failed to read {}", args.input.display()))?;
    let (samples, file_options) = serde_json::from_str::<ImportFile>(&content)
        .with_context(|| format!("Failed to parse {}", args.input.display()))?
        .into_parts();

    let mut options = file_options.unwrap_or_default();
    if args.keep_existing {
        options.replace_existing = false;
    }

    if verbose {
        eprintln!(
            "Importing {} samples from {}",
            samples.len(),
            args.input.display()
        );
    }

    block_on(async {
        let mut progress = |p: &ChunkProgress| {
            if verbose {
                eprintln!(
                    "Chunk {}/{}: {} profiles ({} written so far)",
                    p.chunk_index + 1,
                    p.chunks,
                    p.chunk_len,
                    p.inserted_so_far
                );
            }
            ControlFlow::Continue(())
        };
        let result = session
            .service
            .bulk_upsert_with_progress(samples, &options, &mut progress)
            .await;

        // Chunks committed before a failure are kept, so save either way
        session.save()?;
        let report = result?;

        match format {
            OutputFormat::Text => print_text(&report, session.store.len()),
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
            OutputFormat::Tsv => print_tsv(&report),
        }
        Ok(())
    })
}

fn print_text(report: &IngestReport, stored: usize) {
    println!("Imported {} of {} samples", report.inserted, report.total);
    println!("   Skipped (no valid markers): {}", report.skipped);
    println!("   Duplicates removed: {}", report.duplicates_removed);
    println!("   Marker values cleaned: {}", report.cleaned_markers);
    println!(
        "   Chunks: {}, {} ms ({:.0} profiles/s)",
        report.chunks, report.duration_ms, report.profiles_per_second
    );
    println!("   Profiles in database: {stored}");
}

fn print_tsv(report: &IngestReport) {
    println!("inserted\tskipped\tduplicates_removed\tcleaned_markers\ttotal\tchunks\tduration_ms");
    println!(
        "{}\t{}\t{}\t{}\t{}\t{}\t{}",
        report.inserted,
        report.skipped,
        report.duplicates_removed,
        report.cleaned_markers,
        report.total,
        report.chunks,
        report.duration_ms
    );
}
