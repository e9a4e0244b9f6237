//! Scan command - rebuild the input maps and list what changed.

use super::{build_ingestor, load_config};
use anyhow::{Context, Result};
use colored::Colorize;
use std::collections::BTreeMap;
use std::path::Path;
use tokio::runtime::Runtime;

pub fn run(explicit: Option<&Path>, list: bool) -> Result<()> {
    let config = load_config(explicit)?;
    let (ingestor, _) = build_ingestor(config)?;

    let rt = Runtime::new().context("Failed to create async runtime")?;
    let items = rt.block_on(ingestor.scan()).context("Scan failed")?;

    if items.is_empty() {
        println!("{}", "Everything is up to date.".green());
        return Ok(());
    }

    let mut per_map: BTreeMap<String, usize> = BTreeMap::new();
    for item in &items {
        *per_map.entry(item.map.to_string()).or_default() += 1;
    }

    println!(
        "{} {} files to process",
        "Pending:".cyan().bold(),
        items.len()
    );
    for (map, count) in &per_map {
        println!("  {} {}: {}", "•".dimmed(), map, count);
    }

    if list {
        println!();
        for item in &items {
            println!(
                "  {} {} [{}]",
                "○".yellow(),
                ingestor.paths().display_relative(&item.path()),
                item.kind
            );
        }
    }

    Ok(())
}
