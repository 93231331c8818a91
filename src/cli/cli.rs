use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::helpers::load_config::Config;
use crate::runtime;

#[derive(Parser)]
#[command(name = "threatlens-core", version, about = "ThreatLens real-time detection core")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the tailing/ingestion/fan-out/controller pipeline.
    Run {
        #[arg(short, long, default_value = "/etc/threatlens-core.toml")]
        config: PathBuf,
    },

    /// Validate a configuration file without starting the pipeline.
    Validate {
        #[arg(short, long, default_value = "/etc/threatlens-core.toml")]
        config: PathBuf,
    },

    /// Print version information.
    Version,
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config } => runtime::runtime::run(config).await?,
        Commands::Validate { config } => validate_config(config)?,
        Commands::Version => show_version(),
    }

    Ok(())
}

fn validate_config(config: PathBuf) -> Result<()> {
    println!("Validating configuration file: {:?}", config);
    let cfg = Config::load(&config)?;
    println!("Configuration valid:\n{:#?}", cfg);
    Ok(())
}

fn show_version() {
    println!("threatlens-core {}", env!("CARGO_PKG_VERSION"));
}
