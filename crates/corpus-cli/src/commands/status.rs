//! Status command - last batch progress and map counts.

use super::load_config;
use anyhow::{Context, Result};
use colored::Colorize;
use corpus_core::{Generation, ProgressStatus};
use corpus_ingest::read_progress;
use corpus_maps::MapStore;
use std::path::Path;

pub fn run(explicit: Option<&Path>) -> Result<()> {
    let config = load_config(explicit)?;
    let paths = config
        .corpus_paths()
        .context("Failed to resolve corpus paths")?;

    println!("{}", "Corpus Status".cyan().bold());
    println!("{}", "─".repeat(50));
    println!("  Root: {}", paths.root.display());

    println!();
    println!("{}", "Last Batch".white().bold());
    match read_progress(&paths.progress_file) {
        Some(progress) => {
            let marker = match progress.status {
                ProgressStatus::Idle => "○".dimmed(),
                ProgressStatus::Running => "◐".blue(),
                ProgressStatus::Completed => "●".green(),
            };
            let status = format!("{:?}", progress.status).to_lowercase();
            println!(
                "  {} {}: {}/{} ({:.0}%)",
                marker,
                status,
                progress.current,
                progress.total,
                progress.percent()
            );
        }
        None => println!("  {}", "No batch has run yet.".dimmed()),
    }

    let store = MapStore::new(paths.maps_dir.clone());
    for generation in Generation::ALL {
        let counts = store
            .counts(generation)
            .with_context(|| format!("Failed to read {}", generation))?;
        println!();
        println!("{}", generation.to_string().white().bold());
        if counts.is_empty() {
            println!("  {}", "No maps.".dimmed());
            continue;
        }
        for (name, count) in &counts {
            println!("  {} {}: {}", "•".dimmed(), name, count);
        }
    }

    if !paths.maps_dir.exists() {
        println!();
        println!(
            "{}",
            "No maps yet. Use 'corpus scan' to build them.".dimmed()
        );
    }

    Ok(())
}
