use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::debug;
use weft_cache::ArtifactCache;
use weft_core::{BuildConfig, BuildMode};

#[derive(Parser)]
#[command(name = "weft")]
#[command(about = "Inspect and manage a weft artifact cache", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Enable debug output
    #[arg(short, long)]
    debug: bool,

    /// Build configuration file (TOML)
    #[arg(short, long, env = "WEFT_CONFIG")]
    config: Option<PathBuf>,

    /// Cache directory, overriding the configuration
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Build mode whose artifacts to read
    #[arg(short, long, value_enum)]
    mode: Option<Mode>,

    /// Read the bundling variant of compiled outputs
    #[arg(long)]
    bundle: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Whole-cache operations
    Cache {
        #[command(subcommand)]
        command: CacheCommand,
    },

    /// Print the stored metadata sidecar of a module
    Inspect {
        /// Module specifier, e.g. /pages/index.tsx
        specifier: String,
    },

    /// Print the dependency closure of a module as recorded in sidecars
    Deps {
        /// Module specifier, e.g. /pages/index.tsx
        specifier: String,
    },
}

#[derive(Subcommand)]
enum CacheCommand {
    /// Show the manifest and per-mode artifact counts
    Info,
    /// Delete the whole cache directory
    Clean,
}

#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    Development,
    Production,
}

impl From<Mode> for BuildMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Development => BuildMode::Development,
            Mode::Production => BuildMode::Production,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.debug {
        tracing::Level::TRACE
    } else if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(cli.debug)
        .init();

    let config = load_config(&cli)?;
    debug!(cache_dir = %config.cache_dir.display(), mode = config.mode.as_str(), "Using cache");
    let cache = ArtifactCache::new(&config.cache_dir, config.mode, config.bundle);

    match cli.command {
        Commands::Cache {
            command: CacheCommand::Info,
        } => {
            print!("{}", weft_cli::cache_info(&config.cache_dir)?);
        }
        Commands::Cache {
            command: CacheCommand::Clean,
        } => {
            if weft_cli::clean(&config.cache_dir)? {
                println!("Removed {}", config.cache_dir.display());
            } else {
                println!("Nothing to remove at {}", config.cache_dir.display());
            }
        }
        Commands::Inspect { specifier } => {
            let meta = weft_cli::inspect(&cache, &specifier)?;
            println!("{}", serde_json::to_string_pretty(&meta)?);
            println!("compiled: {}", cache.compiled_path(&specifier).display());
        }
        Commands::Deps { specifier } => {
            for edge in weft_cli::dependency_closure(&cache, &specifier)? {
                println!("{edge}");
            }
        }
    }
    Ok(())
}

/// Configuration file if given, else project defaults for the working
/// directory; command-line flags override either
fn load_config(cli: &Cli) -> Result<BuildConfig> {
    let mut config = match &cli.config {
        Some(path) => BuildConfig::load(path)
            .with_context(|| format!("Failed to load configuration {}", path.display()))?,
        None => BuildConfig::for_project(std::env::current_dir()?),
    };
    if let Some(cache_dir) = &cli.cache_dir {
        config.cache_dir = cache_dir.clone();
    }
    if let Some(mode) = cli.mode {
        config.mode = mode.into();
    }
    config.bundle |= cli.bundle;
    Ok(config)
}
