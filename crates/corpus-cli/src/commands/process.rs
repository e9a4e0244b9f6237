//! Process command - run one file through the pipeline.

use super::{build_ingestor, disposition_label, load_config};
use anyhow::{Context, Result};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use tokio::runtime::Runtime;

pub fn run(explicit: Option<&Path>, file: &Path) -> Result<()> {
    if !file.exists() {
        anyhow::bail!("File does not exist: {}", file.display());
    }

    let config = load_config(explicit)?;
    let (ingestor, _) = build_ingestor(config)?;
    let rt = Runtime::new().context("Failed to create async runtime")?;

    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
    pb.set_message(format!("Processing {}", file.display()));
    pb.enable_steady_tick(std::time::Duration::from_millis(100));

    let outcome = rt
        .block_on(ingestor.process_file(file))
        .with_context(|| format!("Failed to process {}", file.display()))?;
    pb.finish_and_clear();

    println!(
        "{} {} ({})",
        "Processed:".cyan().bold(),
        file.display(),
        disposition_label(outcome.disposition)
    );
    println!("  Kind: {}", outcome.item.kind);
    println!(
        "  Stages: {}",
        outcome
            .state
            .stages
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(" -> ")
    );
    if let Some(out_path) = &outcome.state.out_path {
        println!("  Output: {}", out_path.display());
    }
    if let Some(error) = &outcome.state.error {
        println!("  {} {}", "Error:".red(), error);
    }
    for violation in &outcome.state.validation_errors {
        println!("  {} {}", "✗".red(), violation.dimmed());
    }

    Ok(())
}
