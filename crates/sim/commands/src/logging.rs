//! Logging arguments and subscriber set-up.

use clap::Args;
use eyre::{Result, eyre};
use tracing_subscriber::EnvFilter;

/// Logging configuration.
#[derive(Debug, Args, Clone, Default, PartialEq, Eq)]
#[command(next_help_heading = "Logging")]
pub struct LogArgs {
    /// Silence all output except errors.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose mode (-v, -vv).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbosity: u8,

    /// Log filter directive (e.g., "vertex_sim_health=debug").
    #[arg(long = "log.filter", global = true, value_name = "DIRECTIVE")]
    pub filter: Option<String>,

    /// Use JSON format for log output.
    #[arg(long = "log.json", global = true)]
    pub json: bool,
}

impl LogArgs {
    /// Filter for these arguments.
    ///
    /// `--quiet` shows errors only. Otherwise `RUST_LOG` is used when set,
    /// else the verbosity level; `--log.filter` directives are added last.
    pub fn env_filter(&self) -> EnvFilter {
        if self.quiet {
            return EnvFilter::new("error");
        }

        let level = match self.verbosity {
            0 => "info",
            1 => "debug",
            _ => "trace",
        };
        let mut filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

        if let Some(custom) = &self.filter {
            for directive in custom.split(',') {
                if let Ok(directive) = directive.trim().parse() {
                    filter = filter.add_directive(directive);
                }
            }
        }

        filter
    }
}

/// Install the global subscriber. Logs go to stderr.
pub fn init_logging(args: &LogArgs) -> Result<()> {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(args.env_filter())
        .with_writer(std::io::stderr);

    let installed = if args.json {
        builder.json().try_init()
    } else {
        builder.without_time().try_init()
    };
    installed.map_err(|error| eyre!(error))
}
