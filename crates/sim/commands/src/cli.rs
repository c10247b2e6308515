//! Command-line interface.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use vertex_sim_network::Topology;

use crate::logging::LogArgs;

/// Create and verify snapshots of simulated Swarm networks.
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Logging configuration.
    #[command(flatten)]
    pub logs: LogArgs,

    /// TOML configuration file.
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Build a network, wait for it to become healthy and write a snapshot.
    #[command(visible_alias = "c")]
    Create(CreateArgs),

    /// Load a snapshot and check the rebuilt network against it.
    #[command(visible_alias = "v")]
    Verify(VerifyArgs),
}

/// Arguments for the `create` command. Unset flags keep the configured value.
#[derive(Debug, Clone, Default, Args)]
pub struct CreateArgs {
    /// Initial wiring of the nodes.
    #[arg(long, value_enum)]
    pub topology: Option<Topology>,

    /// Index of the star centre.
    #[arg(long, value_name = "N")]
    pub pivot: Option<usize>,

    /// Number of nodes.
    #[arg(long, value_name = "N")]
    pub nodes: Option<usize>,

    /// Services to add (+name) or remove (-name) in the snapshot.
    #[arg(long, value_name = "FILTER", allow_hyphen_values = true)]
    pub services: Option<String>,

    /// Minimum peers per proximity bin.
    #[arg(long = "min-bin-size", value_name = "N")]
    pub min_prox_bin_size: Option<usize>,

    /// Seed for node identifiers.
    #[arg(long, value_name = "N")]
    pub seed: Option<u64>,

    /// Disable discovery (ignored for topology `none`).
    #[arg(long)]
    pub no_discovery: bool,

    /// Seconds to wait for the network to become healthy.
    #[arg(long, value_name = "SECS")]
    pub deadline: Option<u64>,

    /// Snapshot file to write.
    #[arg(value_name = "OUTPUT")]
    pub output: PathBuf,
}

/// Arguments for the `verify` command.
#[derive(Debug, Clone, Default, Args)]
pub struct VerifyArgs {
    /// Also wait for the loaded network to become healthy.
    #[arg(long)]
    pub check_health: bool,

    /// Seconds to wait for the network to become healthy.
    #[arg(long, value_name = "SECS")]
    pub deadline: Option<u64>,

    /// Snapshot file to read.
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,
}
