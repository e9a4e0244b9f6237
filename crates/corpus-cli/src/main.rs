//! Corpus CLI - Incremental normalization of the school document corpus

mod commands;

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Corpus - Turn scraped pages and uploaded PDFs into validated JSON documents
#[derive(Parser)]
#[command(name = "corpus")]
#[command(version)]
#[command(about = "Incremental normalization of the school document corpus", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file to use instead of the default location
    #[arg(short, long, global = true, env = "CORPUS_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the config file, the schema and the prompt templates
    Init {
        /// Corpus root directory
        #[arg(short, long)]
        root: Option<PathBuf>,

        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },

    /// Manage configuration
    #[command(subcommand)]
    Config(ConfigCommands),

    /// Rebuild the input maps and list the files that changed
    Scan {
        /// Print every pending file
        #[arg(short, long)]
        list: bool,
    },

    /// Process every new or changed file
    Run {
        /// Maximum number of files processed at once
        #[arg(short, long)]
        workers: Option<usize>,

        /// Skip the model server availability check
        #[arg(long)]
        no_check: bool,
    },

    /// Run a single file through the pipeline without updating the maps
    Process {
        /// Path to the file
        file: PathBuf,
    },

    /// Show the last batch progress and map counts
    Status,
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show current configuration
    Show,

    /// Print the resolved corpus locations
    Paths,
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("corpus=debug,info"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("corpus=info,warn"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let config_path = cli.config.as_deref();

    let result = match cli.command {
        Commands::Init { root, force } => commands::init::run(config_path, root, force),
        Commands::Config(cmd) => match cmd {
            ConfigCommands::Show => commands::config::show(config_path),
            ConfigCommands::Paths => commands::config::paths(config_path),
        },
        Commands::Scan { list } => commands::scan::run(config_path, list),
        Commands::Run { workers, no_check } => commands::run::run(config_path, workers, !no_check),
        Commands::Process { file } => commands::process::run(config_path, &file),
        Commands::Status => commands::status::run(config_path),
    };

    if let Err(e) = result {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}
