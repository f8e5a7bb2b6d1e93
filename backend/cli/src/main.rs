mod plugins_cmd;
mod terminal_output;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::debug;

use plugdock_config::{config_dir, config_file_path, load_and_prepare, HostConfig};
use plugdock_logging::init_logger;

#[derive(Parser)]
#[command(name = "plugdock")]
#[command(about = "Inspect and validate plugdock plugin directories")]
#[command(version)]
struct Cli {
    /// Host config file (defaults to ~/.plugdock/config.yaml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check every plugin configuration in the plugins directory
    Validate {
        /// Plugins directory; overrides the config file
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },
    /// List valid plugins with their features and requested capabilities
    List {
        #[arg(short, long)]
        dir: Option<PathBuf>,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Print one plugin's configuration
    Inspect {
        id: String,
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| config_file_path(&config_dir()));
    let config = load_and_prepare(&config_path).await?;
    let _log_guard = init_logger(&config.logging());
    debug!(path = %config_path.display(), "Loaded host config");

    match cli.command {
        Commands::Validate { dir } => {
            plugins_cmd::validate(&plugins_dir(&config, dir)).await?;
        }
        Commands::List { dir, json } => {
            plugins_cmd::list(&plugins_dir(&config, dir), json).await?;
        }
        Commands::Inspect { id, dir } => {
            plugins_cmd::inspect(&plugins_dir(&config, dir), &id).await?;
        }
    }

    Ok(())
}

/// `--dir`, then the config file, then `<config dir>/plugins`.
fn plugins_dir(config: &HostConfig, flag: Option<PathBuf>) -> PathBuf {
    flag.or_else(|| config.plugins_dir.clone())
        .unwrap_or_else(|| config_dir().join("plugins"))
}
