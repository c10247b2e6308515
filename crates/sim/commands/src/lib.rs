//! CLI commands for the swarm-snapshot tool.
//!
//! - [`Cli`] - Top-level CLI parser
//! - [`Commands`] - `create` and `verify`
//!
//! Configuration is loaded using Figment with the following priority
//! (highest wins):
//!
//! 1. CLI arguments
//! 2. Config file (TOML, `--config`)
//! 3. Environment variables (`SWARM_SNAPSHOT_` prefix)
//! 4. Defaults

mod cli;
pub mod commands;
pub mod config;
pub mod logging;
pub mod path;

pub use cli::{Cli, Commands, CreateArgs, VerifyArgs};
pub use config::{ConfigError, SimConfig, SnapshotConfig};
pub use logging::LogArgs;

use clap::Parser;
use color_eyre::eyre;
use tracing::debug;

/// Run the tool with the process arguments.
///
/// This is the main entry point that should be called from the binary.
pub async fn run() -> eyre::Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    logging::init_logging(&cli.logs)?;

    let mut config = SnapshotConfig::load(cli.config.as_deref())?;
    match &cli.command {
        Commands::Create(args) => config.apply_create(args),
        Commands::Verify(args) => config.apply_verify(args),
    }
    debug!(?config, "loaded configuration");
    let config = config.validate()?;

    match cli.command {
        Commands::Create(args) => {
            commands::create::run(&config, &args.output).await?;
        }
        Commands::Verify(args) => {
            commands::verify::run(&config, &args.input).await?;
        }
    }

    Ok(())
}
