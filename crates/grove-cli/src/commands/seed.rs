//! Seed install command
//!
//! Usage: grove seed --model <MODEL> (--from <PATH> | --bundle)

use anyhow::Result;
use clap::Args;
use grove_engine::StoreRegistry;
use grove_store::SeedOutcome;
use std::path::PathBuf;

#[derive(Debug, Args)]
pub struct SeedArgs {
    /// Model name
    #[arg(long)]
    pub model: String,

    /// Seed store file to install
    #[arg(long, conflicts_with = "bundle", required_unless_present = "bundle")]
    pub from: Option<PathBuf>,

    /// Install `<MODEL>.sqlite` from the configured resource bundle
    #[arg(long)]
    pub bundle: bool,
}

pub fn execute(registry: &StoreRegistry, args: SeedArgs) -> Result<()> {
    let store = registry.shared_for_model(&args.model)?;

    let outcome = match &args.from {
        Some(path) => store.use_pre_seeded_file(path)?,
        None => store.use_pre_seeded_file_from_bundle()?,
    };

    match outcome {
        SeedOutcome::Installed { bytes } => {
            println!("✓ Installed seed ({} bytes) at {}", bytes, store.store_path().display());
        }
        SeedOutcome::StoreAlreadyPresent => {
            println!(
                "Store already present at {}; seed skipped",
                store.store_path().display()
            );
        }
    }
    Ok(())
}
