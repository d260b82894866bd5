//! Fetch and count commands
//!
//! Usage: grove fetch --model <MODEL> --entity <ENTITY> [--where <PREDICATE>]
//!        [--sort <KEY>[:desc]]... [--limit <N>]

use anyhow::{bail, Result};
use clap::Args;
use grove_core::{FetchRequest, ObjectSnapshot};
use grove_engine::{Context, StoreRegistry};
use serde_json::{json, Map};

#[derive(Debug, Args)]
pub struct QueryArgs {
    /// Model name
    #[arg(long)]
    pub model: String,

    /// Entity to query
    #[arg(long)]
    pub entity: String,

    /// Predicate, e.g. "price > 10 AND name BEGINSWITH[c] 'a'"
    #[arg(long = "where")]
    pub predicate: Option<String>,

    /// Sort key, optionally suffixed with `:asc` or `:desc`; repeatable
    #[arg(long)]
    pub sort: Vec<String>,

    #[arg(long)]
    pub limit: Option<usize>,
}

fn parse_sort(raw: &str) -> Result<(&str, bool)> {
    match raw.split_once(':') {
        None => Ok((raw, true)),
        Some((key, "asc")) => Ok((key, true)),
        Some((key, "desc")) => Ok((key, false)),
        Some((_, direction)) => bail!("sort direction must be asc or desc, got '{}'", direction),
    }
}

fn build_request(context: &Context, args: &QueryArgs) -> Result<FetchRequest> {
    let mut builder = context.request(args.entity.as_str());
    if let Some(predicate) = &args.predicate {
        builder = builder.predicate(predicate);
    }
    for raw in &args.sort {
        let (key, ascending) = parse_sort(raw)?;
        builder = builder.sort_by(key, ascending);
    }
    if let Some(limit) = args.limit {
        builder = builder.fetch_limit(limit);
    }
    Ok(builder.build()?)
}

fn snapshot_json(snapshot: &ObjectSnapshot) -> serde_json::Value {
    let attributes: Map<String, serde_json::Value> = snapshot
        .attributes
        .iter()
        .map(|(name, value)| (name.clone(), value.to_json()))
        .collect();
    let relationships: Map<String, serde_json::Value> = snapshot
        .relationships
        .iter()
        .map(|(name, targets)| {
            let uris: Vec<String> = targets.iter().map(|t| t.to_uri()).collect();
            (name.clone(), json!(uris))
        })
        .collect();

    json!({
        "id": snapshot.id.to_uri(),
        "version": snapshot.version,
        "attributes": attributes,
        "relationships": relationships,
    })
}

pub fn execute_fetch(registry: &StoreRegistry, args: QueryArgs) -> Result<()> {
    let store = registry.shared_for_model(&args.model)?;
    let context = store.new_context()?;
    let request = build_request(&context, &args)?;

    let results = context.fetch(&request)?;
    for snapshot in results.snapshots()? {
        println!("{}", serde_json::to_string(&snapshot_json(&snapshot))?);
    }
    Ok(())
}

pub fn execute_count(registry: &StoreRegistry, args: QueryArgs) -> Result<()> {
    let store = registry.shared_for_model(&args.model)?;
    let context = store.new_context()?;
    let request = build_request(&context, &args)?;

    println!("{}", context.count(&request)?);
    Ok(())
}
