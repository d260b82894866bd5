//! Store status command
//!
//! Usage: grove status --model <MODEL>

use anyhow::Result;
use clap::Args;
use grove_engine::StoreRegistry;

#[derive(Debug, Args)]
pub struct StatusArgs {
    /// Model name
    #[arg(long)]
    pub model: String,
}

/// Print store location and, when the store exists, per-entity counts.
/// A missing store is reported without being created.
pub fn execute(registry: &StoreRegistry, args: StatusArgs) -> Result<()> {
    let store = registry.shared_for_model(&args.model)?;
    let schema = store.schema();

    println!("model: {} (version {})", schema.name, schema.version);
    println!("store: {}", store.store_url());
    println!("encrypted: {}", store.is_store_encrypted());

    if !store.store_exists() {
        println!("exists: false");
        return Ok(());
    }
    println!("exists: true");

    let context = store.new_context()?;
    for entity in &schema.entities {
        let request = context.request(entity.name.as_str()).build()?;
        println!("{}: {}", entity.name, context.count(&request)?);
    }
    Ok(())
}
