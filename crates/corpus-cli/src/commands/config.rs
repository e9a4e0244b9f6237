//! Configuration commands.

use super::{config_file, load_config};
use anyhow::{Context, Result};
use colored::Colorize;
use std::path::Path;

pub fn show(explicit: Option<&Path>) -> Result<()> {
    let path = config_file(explicit)?;

    if !path.exists() {
        anyhow::bail!("Config file not found. Run 'corpus init' first.");
    }

    let contents = std::fs::read_to_string(&path).context("Failed to read config file")?;

    println!("{}", "Current Configuration".cyan().bold());
    println!("{}", path.display().to_string().dimmed());
    println!("{}", "─".repeat(50));
    println!("{}", contents);

    Ok(())
}

pub fn paths(explicit: Option<&Path>) -> Result<()> {
    let config = load_config(explicit)?;
    let paths = config
        .corpus_paths()
        .context("Failed to resolve corpus paths")?;

    println!("{}", "Corpus Locations".cyan().bold());
    println!("{}", "─".repeat(50));
    for (label, path) in [
        ("Root", &paths.root),
        ("Scraped sites", &paths.data_sites_dir),
        ("Manual PDFs", &paths.manual_pdf_dir),
        ("Valid output", &paths.valid_dir),
        ("Rejected output", &paths.rejected_dir),
        ("Syllabi", &paths.syllabus_dir),
        ("Maps", &paths.maps_dir),
        ("Prompts", &paths.prompts_dir),
        ("Schema", &paths.schema_path),
        ("Progress file", &paths.progress_file),
    ] {
        let marker = if path.exists() {
            "●".green()
        } else {
            "○".dimmed()
        };
        println!("  {} {:<16} {}", marker, label, path.display());
    }

    Ok(())
}
