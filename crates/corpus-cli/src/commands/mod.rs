//! CLI command implementations.

pub mod config;
pub mod init;
pub mod process;
pub mod run;
pub mod scan;
pub mod status;

use anyhow::{Context, Result};
use colored::Colorize;
use corpus_config::{AppPaths, Config};
use corpus_core::{BatchSummary, Disposition};
use corpus_ingest::Ingestor;
use corpus_llm::{LanguageModel, OllamaModel};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Config file in use: the one given on the command line, else the
/// platform default.
pub fn config_file(explicit: Option<&Path>) -> Result<PathBuf> {
    match explicit {
        Some(path) => Ok(path.to_path_buf()),
        None => AppPaths::new()
            .map(|paths| paths.config_file)
            .context("Failed to determine application directories"),
    }
}

/// Load and check the configuration.
pub fn load_config(explicit: Option<&Path>) -> Result<Config> {
    let path = config_file(explicit)?;
    let config = Config::load_from(&path)
        .with_context(|| format!("Failed to load config from {}", path.display()))?;
    config.validate().context("Invalid configuration")?;
    tracing::debug!("Loaded config from {:?}", path);
    Ok(config)
}

/// Ingestor wired to the configured Ollama model.
pub fn build_ingestor(config: Config) -> Result<(Ingestor, OllamaModel)> {
    let model = OllamaModel::from_config(&config.llm).context("Failed to create Ollama client")?;
    let shared: Arc<dyn LanguageModel> = Arc::new(model.clone());
    let ingestor = Ingestor::from_config(Arc::new(config), shared)
        .context("Failed to set up the pipeline. Run 'corpus init' first?")?;
    Ok((ingestor, model))
}

/// Colored label of a terminal state.
pub fn disposition_label(disposition: Disposition) -> colored::ColoredString {
    match disposition {
        Disposition::Valid => "valid".green(),
        Disposition::Rejected => "rejected".yellow(),
        Disposition::Errored => "errored".red(),
    }
}

pub fn print_summary(summary: &BatchSummary) {
    println!(
        "{} {} files",
        "Processed:".cyan().bold(),
        summary.processed
    );
    println!("  {} Valid: {}", "●".green(), summary.valid);
    if summary.rejected > 0 {
        println!("  {} Rejected: {}", "○".yellow(), summary.rejected);
    }
    if summary.errored > 0 {
        println!("  {} Errored: {}", "✗".red(), summary.errored);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_config_file_wins() {
        let path = Path::new("/tmp/corpus.toml");
        assert_eq!(config_file(Some(path)).unwrap(), path);
    }

    #[test]
    fn test_load_missing_config_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(Some(dir.path().join("absent.toml").as_path())).unwrap();
        assert_eq!(config.corpus.manual_pdf_dir, "pdf_man");
    }
}
