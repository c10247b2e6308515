//! Figment-based configuration loading.
//!
//! Configuration priority (highest wins):
//! 1. CLI arguments (applied after Figment load)
//! 2. Config file (TOML, `--config`)
//! 3. Environment variables (`SWARM_SNAPSHOT_` prefix, `__` nesting)
//! 4. Defaults

use std::{path::Path, time::Duration};

use eyre::{Result, WrapErr, ensure};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use vertex_sim_discovery::DiscoveryConfig;
use vertex_sim_health::HealthConfig;
use vertex_sim_network::{NetworkConfig, Topology};
use vertex_sim_snapshot::{FilterError, ServiceFilter};
use vertex_swarm_kademlia::DEFAULT_MIN_PROX_BIN_SIZE;

use crate::cli::{CreateArgs, VerifyArgs};

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "SWARM_SNAPSHOT_";

/// Health monitor settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthSettings {
    /// Seconds to wait for convergence.
    pub deadline_secs: u64,
    /// Milliseconds between periodic rechecks of a node.
    pub poll_interval_ms: u64,
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            deadline_secs: 30,
            poll_interval_ms: 1000,
        }
    }
}

/// Settings of the `verify` command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifySettings {
    /// Run the health monitor on the loaded network.
    pub check_health: bool,
}

/// Complete tool configuration, as loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    /// Number of nodes.
    pub nodes: usize,
    /// Initial wiring.
    pub topology: Topology,
    /// Star centre.
    pub pivot: usize,
    /// Service filter, e.g. `+extra,-discovery`.
    pub services: String,
    /// Minimum peers per proximity bin.
    pub min_prox_bin_size: usize,
    /// Run discovery.
    pub discovery: bool,
    /// Seed for node identifiers; random when unset.
    pub seed: Option<u64>,
    /// Silence required of freshly created nodes, in milliseconds.
    pub quiescence_window_ms: u64,
    /// Node tick interval, in milliseconds.
    pub tick_interval_ms: u64,
    /// Health monitor settings.
    pub health: HealthSettings,
    /// `verify` settings.
    pub verify: VerifySettings,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            nodes: 10,
            topology: Topology::None,
            pivot: 0,
            services: String::new(),
            min_prox_bin_size: DEFAULT_MIN_PROX_BIN_SIZE,
            discovery: true,
            seed: None,
            quiescence_window_ms: 1000,
            tick_interval_ms: 200,
            health: HealthSettings::default(),
            verify: VerifySettings::default(),
        }
    }
}

impl SnapshotConfig {
    /// Load configuration from defaults, environment, and config file.
    /// CLI overrides should be applied separately after loading.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));

        if let Some(path) = config_path {
            ensure!(path.exists(), "config file {} does not exist", path.display());
            figment = figment.merge(Toml::file(path));
        }

        figment.extract().wrap_err("Failed to load configuration")
    }

    /// Apply `create` flags.
    pub fn apply_create(&mut self, args: &CreateArgs) {
        if let Some(topology) = args.topology {
            self.topology = topology;
        }
        if let Some(pivot) = args.pivot {
            self.pivot = pivot;
        }
        if let Some(nodes) = args.nodes {
            self.nodes = nodes;
        }
        if let Some(services) = &args.services {
            self.services.clone_from(services);
        }
        if let Some(size) = args.min_prox_bin_size {
            self.min_prox_bin_size = size;
        }
        if args.seed.is_some() {
            self.seed = args.seed;
        }
        if args.no_discovery {
            self.discovery = false;
        }
        if let Some(secs) = args.deadline {
            self.health.deadline_secs = secs;
        }
    }

    /// Apply `verify` flags.
    pub fn apply_verify(&mut self, args: &VerifyArgs) {
        if args.check_health {
            self.verify.check_health = true;
        }
        if let Some(secs) = args.deadline {
            self.health.deadline_secs = secs;
        }
    }

    /// Validate into the value every phase runs with.
    pub fn validate(&self) -> Result<SimConfig, ConfigError> {
        if self.nodes == 0 {
            return Err(ConfigError::NoNodes);
        }
        if self.min_prox_bin_size == 0 {
            return Err(ConfigError::ZeroBinSize);
        }
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::ZeroTickInterval);
        }
        if self.health.poll_interval_ms == 0 {
            return Err(ConfigError::ZeroPollInterval);
        }
        if self.health.deadline_secs == 0 {
            return Err(ConfigError::ZeroDeadline);
        }
        if self.topology == Topology::Star && self.pivot >= self.nodes {
            return Err(ConfigError::PivotOutOfRange {
                pivot: self.pivot,
                nodes: self.nodes,
            });
        }
        let filter = self.services.parse()?;

        Ok(SimConfig {
            nodes: self.nodes,
            topology: self.topology,
            pivot: self.pivot,
            filter,
            discovery: DiscoveryConfig::default()
                .with_enabled(self.discovery || self.topology.forces_discovery())
                .with_min_prox_bin_size(self.min_prox_bin_size),
            seed: self.seed,
            quiescence_window: Duration::from_millis(self.quiescence_window_ms),
            network: NetworkConfig::default()
                .with_tick_interval(Duration::from_millis(self.tick_interval_ms)),
            health: HealthConfig::default()
                .with_deadline(Duration::from_secs(self.health.deadline_secs))
                .with_poll_interval(Duration::from_millis(self.health.poll_interval_ms)),
            check_health: self.verify.check_health,
        })
    }
}

/// Invalid configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A network needs at least one node.
    #[error("node count must be at least 1")]
    NoNodes,

    /// Bins cannot be saturated by zero peers.
    #[error("minimum bin size must be at least 1")]
    ZeroBinSize,

    /// Node ticks need a period.
    #[error("tick interval must be at least 1ms")]
    ZeroTickInterval,

    /// Health rechecks need a period.
    #[error("health poll interval must be at least 1ms")]
    ZeroPollInterval,

    /// No time to converge.
    #[error("health deadline must be at least 1s")]
    ZeroDeadline,

    /// The star centre is not a node.
    #[error("star pivot {pivot} is out of range for {nodes} nodes")]
    PivotOutOfRange {
        /// Configured pivot.
        pivot: usize,
        /// Configured node count.
        nodes: usize,
    },

    /// The service filter does not parse.
    #[error("invalid service filter")]
    Filter(#[from] FilterError),
}

/// Validated configuration shared by every phase of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimConfig {
    /// Number of nodes.
    pub nodes: usize,
    /// Initial wiring.
    pub topology: Topology,
    /// Star centre.
    pub pivot: usize,
    /// Snapshot service filter.
    pub filter: ServiceFilter,
    /// Discovery service configuration, including the kademlia bin size.
    pub discovery: DiscoveryConfig,
    /// Seed for node identifiers.
    pub seed: Option<u64>,
    /// Silence required of freshly created nodes.
    pub quiescence_window: Duration,
    /// Network runtime parameters.
    pub network: NetworkConfig,
    /// Health monitor parameters.
    pub health: HealthConfig,
    /// Whether `verify` runs the health monitor.
    pub check_health: bool,
}

impl SimConfig {
    /// Minimum peers per proximity bin.
    pub fn min_prox_bin_size(&self) -> usize {
        self.discovery.kademlia.min_prox_bin_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = SnapshotConfig::default().validate().unwrap();
        assert_eq!(config.nodes, 10);
        assert_eq!(config.topology, Topology::None);
        assert_eq!(config.min_prox_bin_size(), 2);
        assert!(config.discovery.enabled);
        assert!(config.filter.is_empty());
        assert!(!config.check_health);
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        fs::write(
            &config_path,
            r#"
nodes = 4
topology = "chain"
services = "-discovery"

[health]
deadline_secs = 5
"#,
        )
        .unwrap();

        let config = SnapshotConfig::load(Some(&config_path)).unwrap();
        assert_eq!(config.nodes, 4);
        assert_eq!(config.topology, Topology::Chain);
        assert_eq!(config.services, "-discovery");
        assert_eq!(config.health.deadline_secs, 5);
        assert_eq!(config.health.poll_interval_ms, 1000);
    }

    #[test]
    fn test_load_missing_file_fails() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nonexistent.toml");

        assert!(SnapshotConfig::load(Some(&config_path)).is_err());
    }

    #[test]
    fn test_cli_overrides_file() {
        let mut config = SnapshotConfig {
            nodes: 4,
            seed: Some(1),
            ..Default::default()
        };
        config.apply_create(&CreateArgs {
            nodes: Some(6),
            no_discovery: true,
            topology: Some(Topology::Ring),
            deadline: Some(3),
            ..Default::default()
        });

        assert_eq!(config.nodes, 6);
        assert_eq!(config.seed, Some(1));
        assert!(!config.discovery);
        assert_eq!(config.health.deadline_secs, 3);

        let config = config.validate().unwrap();
        assert!(!config.discovery.enabled);
        assert_eq!(config.health.deadline, Duration::from_secs(3));
    }

    #[test]
    fn test_topology_none_forces_discovery() {
        let config = SnapshotConfig {
            discovery: false,
            ..Default::default()
        };
        assert!(config.validate().unwrap().discovery.enabled);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = SnapshotConfig {
            nodes: 0,
            ..Default::default()
        };
        assert_matches!(config.validate(), Err(ConfigError::NoNodes));

        let config = SnapshotConfig {
            topology: Topology::Star,
            pivot: 10,
            ..Default::default()
        };
        assert_matches!(
            config.validate(),
            Err(ConfigError::PivotOutOfRange { pivot: 10, nodes: 10 })
        );

        let config = SnapshotConfig {
            services: "discovery".to_string(),
            ..Default::default()
        };
        assert_matches!(config.validate(), Err(ConfigError::Filter(_)));
    }

    #[test]
    fn test_validate_rejects_zero_tick_interval() {
        let config = SnapshotConfig {
            tick_interval_ms: 0,
            ..Default::default()
        };
        assert_matches!(config.validate(), Err(ConfigError::ZeroTickInterval));
    }

    #[test]
    fn test_validate_rejects_zero_poll_interval() {
        let mut config = SnapshotConfig::default();
        config.health.poll_interval_ms = 0;
        assert_matches!(config.validate(), Err(ConfigError::ZeroPollInterval));
    }

    #[test]
    fn test_validate_rejects_zero_deadline() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        fs::write(&config_path, "[health]\ndeadline_secs = 0\n").unwrap();

        let config = SnapshotConfig::load(Some(&config_path)).unwrap();
        assert_matches!(config.validate(), Err(ConfigError::ZeroDeadline));
    }
}
