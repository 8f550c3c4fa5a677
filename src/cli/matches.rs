use clap::Args;
use std::path::Path;

use crate::cli::{block_on, parse_marker_list, OutputFormat, Session};
use crate::core::marker::MarkerMap;
use crate::core::panel::PanelSize;
use crate::core::types::KitId;
use crate::matching::engine::{Match, MatchOptions, MatchPage};

#[derive(Args)]
pub struct MatchArgs {
    /// Query markers as NAME=VALUE pairs, e.g. "DYS393=13,DYS390=24,DYS464=15-15-16-17"
    #[arg(short, long, required_unless_present = "kit", conflicts_with = "kit")]
    pub markers: Option<String>,

    /// Use the markers of a stored kit as the query
    #[arg(short, long)]
    pub kit: Option<String>,

    /// Largest genetic distance to report
    #[arg(long)]
    pub max_distance: Option<u32>,

    /// Maximum number of matches to compute
    #[arg(long)]
    pub max_results: Option<usize>,

    /// Panel bounding the compared standard markers (12, 25, 37, 67 or 111)
    #[arg(long)]
    pub panel: Option<PanelSize>,

    /// Only compare against this haplogroup
    #[arg(long)]
    pub haplogroup: Option<String>,

    /// Also admit subclades of --haplogroup
    #[arg(long, requires = "haplogroup")]
    pub subclades: bool,

    /// Bypass the result cache
    #[arg(long)]
    pub no_cache: bool,

    /// Number of matches to show
    #[arg(short = 'n', long, default_value = "20")]
    pub limit: usize,

    /// Skip this many matches before showing
    #[arg(long, default_value = "0")]
    pub offset: usize,
}

/// Execute match command
///
/// # Errors
///
/// Returns an error if the query is invalid or the store fails.
pub fn run(
    args: MatchArgs,
    format: OutputFormat,
    verbose: bool,
    db: &Path,
    config: Option<&Path>,
) -> anyhow::Result<()> {
    let session = Session::open(db, config)?;
    block_on(async move {
        let query = resolve_query(&session, &args).await?;
        let options = build_options(&session, &args);

        if verbose {
            eprintln!(
                "Matching {} markers on panel {} (max distance {})",
                query.len(),
                options.panel,
                options.max_distance
            );
        }

        let page = session
            .service
            .find_matches_page(&query, &options, args.offset, args.limit)
            .await?;

        match format {
            OutputFormat::Text => print_text(&page),
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&page)?),
            OutputFormat::Tsv => print_tsv(&page.matches),
        }
        Ok(())
    })
}

async fn resolve_query(session: &Session, args: &MatchArgs) -> anyhow::Result<MarkerMap> {
    if let Some(text) = &args.markers {
        return parse_marker_list(text);
    }
    let kit = KitId::new(args.kit.clone().unwrap_or_default());
    let profile = session.service.get_profile(&kit).await?;
    Ok(profile.markers)
}

fn build_options(session: &Session, args: &MatchArgs) -> MatchOptions {
    let mut options = session.config.match_options();
    if let Some(max_distance) = args.max_distance {
        options.max_distance = max_distance;
    }
    if let Some(max_results) = args.max_results {
        options.max_results = max_results;
    }
    if let Some(panel) = args.panel {
        options.panel = panel;
    }
    if let Some(haplogroup) = &args.haplogroup {
        options = options.with_haplogroup(haplogroup.clone(), args.subclades);
    }
    options.use_cache = !args.no_cache;
    options
}

fn print_text(page: &MatchPage) {
    if page.matches.is_empty() {
        println!("No matches found.");
        return;
    }

    println!(
        "Showing {}-{} of {} matches",
        page.offset + 1,
        page.offset + page.matches.len(),
        page.total
    );
    println!("\n{}", "─".repeat(60));
    for (i, m) in page.matches.iter().enumerate() {
        let label = if m.name.is_empty() {
            m.kit_number.to_string()
        } else {
            format!("{} ({})", m.kit_number, m.name)
        };
        println!(
            "#{:<3} {:<32} GD {:>2}  {:>3}/{:<3} identical ({:.1}%)  {}",
            page.offset + i + 1,
            label,
            m.distance,
            m.identical_markers,
            m.compared_markers,
            m.percent_identical,
            m.haplogroup
        );
    }
}

fn print_tsv(matches: &[Match]) {
    println!("kit_number\tname\tcountry\thaplogroup\tdistance\tcompared_markers\tidentical_markers\tpercent_identical");
    for m in matches {
        println!(
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{:.2}",
            m.kit_number,
            m.name,
            m.country,
            m.haplogroup,
            m.distance,
            m.compared_markers,
            m.identical_markers,
            m.percent_identical
        );
    }
}
