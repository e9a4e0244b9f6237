//! Run command - process every new or changed file.

use super::{build_ingestor, disposition_label, load_config, print_summary};
use anyhow::{Context, Result};
use colored::Colorize;
use corpus_core::{Disposition, ProgressReport};
use corpus_ingest::{PipelineOutcome, ProgressCallback};
use corpus_llm::LanguageModel;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::sync::Arc;
use tokio::runtime::Runtime;

pub fn run(explicit: Option<&Path>, workers: Option<usize>, check_model: bool) -> Result<()> {
    let mut config = load_config(explicit)?;
    if let Some(workers) = workers {
        config.pipeline.max_workers = Some(workers.max(1));
    }
    let host = config.llm.host.clone();
    let (ingestor, model) = build_ingestor(config)?;

    let rt = Runtime::new().context("Failed to create async runtime")?;

    if check_model {
        if !rt.block_on(model.client().is_available()) {
            anyhow::bail!(
                "Ollama is not running at {}. Start it with 'ollama serve'.",
                host
            );
        }
        let installed = rt
            .block_on(model.client().has_model(model.name()))
            .context("Failed to list Ollama models")?;
        if !installed {
            anyhow::bail!(
                "Model {} is not installed. Run 'ollama pull {}'.",
                model.name(),
                model.name()
            );
        }
    }

    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("#>-"),
    );

    let bar = pb.clone();
    let on_progress: ProgressCallback =
        Arc::new(move |progress: &ProgressReport, outcome: &PipelineOutcome| {
            bar.set_length(progress.total as u64);
            bar.set_position(progress.current as u64);
            bar.set_message(outcome.item.relative_name.clone());
        });
    let driver = ingestor.driver().on_progress(on_progress);

    let report = rt
        .block_on(ingestor.run_with(driver))
        .context("Batch failed")?;
    pb.finish_and_clear();

    if report.summary.processed == 0 {
        println!("{}", "Everything is up to date.".green());
        return Ok(());
    }

    print_summary(&report.summary);

    let problems: Vec<_> = report
        .outcomes
        .iter()
        .filter(|o| o.disposition != Disposition::Valid)
        .collect();
    if !problems.is_empty() {
        println!();
        println!("{}", "Needs attention".white().bold());
        for outcome in problems.iter().take(10) {
            println!(
                "  {} {} ({})",
                "✗".red(),
                outcome.item.relative_name,
                disposition_label(outcome.disposition)
            );
            let reason = outcome
                .state
                .error
                .clone()
                .or_else(|| outcome.state.validation_errors.first().cloned());
            if let Some(reason) = reason {
                println!("    {}", reason.dimmed());
            }
        }
        if problems.len() > 10 {
            println!("  {} ...and {} more", "".dimmed(), problems.len() - 10);
        }
        println!(
            "  Details in {}",
            ingestor
                .paths()
                .display_relative(&ingestor.paths().rejected_dir)
                .cyan()
        );
    }

    Ok(())
}
