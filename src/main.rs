use clap::Parser;
use tracing_subscriber::EnvFilter;

use ystr_matcher::cli::{self, Cli, Commands};
use ystr_matcher::web;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins; otherwise verbosity picks the level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("ystr_matcher=debug,info")
        } else {
            EnvFilter::new("ystr_matcher=warn")
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    let db = cli.db.as_path();
    let config = cli.config.as_deref();

    match cli.command {
        Commands::Match(args) => {
            cli::matches::run(args, cli.format, cli.verbose, db, config)?;
        }
        Commands::Import(args) => {
            cli::import::run(args, cli.format, cli.verbose, db, config)?;
        }
        Commands::Export(args) => {
            cli::export::run(args, cli.format, cli.verbose, db, config)?;
        }
        Commands::Profile(args) => {
            cli::profile::run(args, cli.format, db, config)?;
        }
        Commands::Stats => {
            cli::stats::run(cli.format, db, config)?;
        }
        Commands::Serve(args) => {
            web::server::run(args, db, config)?;
        }
    }

    Ok(())
}
