//! Initialize a corpus: config file, schema, prompt templates, output dirs.

use super::config_file;
use anyhow::{Context, Result};
use colored::Colorize;
use corpus_config::Config;
use corpus_ingest::{PromptLibrary, BUILTIN_SCHEMA};
use std::path::{Path, PathBuf};

pub fn run(explicit: Option<&Path>, root: Option<PathBuf>, force: bool) -> Result<()> {
    let config_path = config_file(explicit)?;

    if config_path.exists() && !force {
        println!(
            "{} Config already exists: {}",
            "Note:".yellow().bold(),
            config_path.display()
        );
    } else {
        Config::create_default_file(&config_path).context("Failed to create config file")?;
        if let Some(root) = &root {
            let mut config = Config::load_from(&config_path).context("Failed to load config")?;
            config.corpus.root = root.to_string_lossy().into_owned();
            config
                .save_to(&config_path)
                .context("Failed to save config")?;
        }
        println!(
            "  {} Created config: {}",
            "✓".green(),
            config_path.display()
        );
    }

    let config = Config::load_from(&config_path).context("Failed to load config")?;
    let paths = config
        .corpus_paths()
        .context("Failed to resolve corpus paths")?;

    println!(
        "{} {}",
        "Initializing corpus in".cyan().bold(),
        paths.root.display()
    );

    paths
        .ensure_output_dirs()
        .context("Failed to create output directories")?;
    println!("  {} Created output directories", "✓".green());

    if paths.schema_path.exists() {
        println!(
            "  {} Keeping schema: {}",
            "•".dimmed(),
            paths.display_relative(&paths.schema_path)
        );
    } else {
        if let Some(parent) = paths.schema_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create schema directory")?;
        }
        std::fs::write(&paths.schema_path, BUILTIN_SCHEMA).context("Failed to write schema")?;
        println!(
            "  {} Wrote schema: {}",
            "✓".green(),
            paths.display_relative(&paths.schema_path)
        );
    }

    let installed = PromptLibrary::install_builtin(&paths.prompts_dir)
        .context("Failed to install prompt templates")?;
    println!(
        "  {} Installed {} prompt templates in {}",
        "✓".green(),
        installed,
        paths.display_relative(&paths.prompts_dir)
    );

    println!();
    println!("Next steps:");
    println!("  1. Check the corpus locations: {}", "corpus config paths".cyan());
    println!("  2. See what changed: {}", "corpus scan --list".cyan());
    println!("  3. Process it: {}", "corpus run".cyan());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_lays_out_corpus() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.toml");
        let root = dir.path().join("corpus");

        run(Some(config_path.as_path()), Some(root.clone()), false).unwrap();

        let config = Config::load_from(&config_path).unwrap();
        assert_eq!(config.corpus.root, root.to_string_lossy());
        assert!(root.join("schema/canonical_document.json").exists());
        assert!(root.join("prompts/globals/metadata.txt").exists());
        assert!(root.join("json_normalized/validated").is_dir());

        // A second init keeps the existing config.
        run(Some(config_path.as_path()), None, false).unwrap();
        let config = Config::load_from(&config_path).unwrap();
        assert_eq!(config.corpus.root, root.to_string_lossy());
    }
}
