//! Grove CLI
//!
//! Command-line access to Grove stores: status, seeding and queries

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use grove_core::logging_facility;
use grove_core::GroveConfig;
use grove_engine::StoreRegistry;
use std::path::PathBuf;

mod commands;

#[derive(Debug, Parser)]
#[command(name = "grove")]
#[command(about = "Grove - persistent object-graph stores", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, global = true, default_value = "grove.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Show where a model's store lives and what it holds
    Status(commands::status::StatusArgs),
    /// Install a pre-seeded store file
    Seed(commands::seed::SeedArgs),
    /// Print matching objects as JSON lines
    Fetch(commands::fetch::QueryArgs),
    /// Print the number of matching objects
    Count(commands::fetch::QueryArgs),
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = GroveConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    logging_facility::init(config.log_profile);
    tracing::debug!(data_dir = %config.data_dir.display(), "configuration loaded");

    let registry = StoreRegistry::from_config(&config);
    match cli.command {
        Commands::Status(args) => commands::status::execute(&registry, args),
        Commands::Seed(args) => commands::seed::execute(&registry, args),
        Commands::Fetch(args) => commands::fetch::execute_fetch(&registry, args),
        Commands::Count(args) => commands::fetch::execute_count(&registry, args),
    }
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
