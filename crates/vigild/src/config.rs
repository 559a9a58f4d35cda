//! Daemon configuration.
//!
//! One TOML file describes everything the daemon wires: data directory,
//! persistence debounce, the API listen address, and per-probe cadences,
//! timeouts, and pool/limit definitions. Probes receive explicit config
//! structs at construction; there is no ambient global configuration.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use vigil_failover::{HttpPoolSpec, PoolSpec};
use vigil_probes::BalanceLimit;

/// Top-level daemon configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Data directory for the snapshot database.
    pub data_dir: PathBuf,

    /// Persistence debounce window in milliseconds.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Operator API listen address.
    #[serde(default = "default_api_addr")]
    pub api_addr: SocketAddr,

    pub node_health: NodeHealthConfig,

    /// Optional balance monitoring; omitted when no balance source exists.
    pub balances: Option<BalanceConfig>,
}

/// Pool health probe configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeHealthConfig {
    /// Probe cadence in seconds.
    #[serde(default = "default_node_interval_secs")]
    pub interval_secs: u64,

    /// Upper bound for a whole probe cycle in seconds.
    #[serde(default = "default_node_cycle_timeout_secs")]
    pub cycle_timeout_secs: u64,

    /// Per-instance health check timeout in milliseconds.
    #[serde(default = "default_check_timeout_ms")]
    pub check_timeout_ms: u64,

    /// Health endpoint path probed on every instance.
    #[serde(default = "default_health_path")]
    pub health_path: String,

    pub pools: Vec<PoolConfig>,
}

/// One redundant pool. Instance order is the failover priority order.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PoolConfig {
    pub pool: String,
    pub instances: Vec<InstanceConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InstanceConfig {
    pub name: String,
    /// `host:port` of the instance's health endpoint.
    pub address: String,
}

/// Balance probe configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BalanceConfig {
    /// Probe cadence in seconds.
    #[serde(default = "default_balance_interval_secs")]
    pub interval_secs: u64,

    /// Upper bound for one balance cycle in seconds.
    #[serde(default = "default_balance_cycle_timeout_secs")]
    pub cycle_timeout_secs: u64,

    /// `host:port` of the balance report endpoint.
    pub address: String,

    /// Path of the balance report endpoint.
    #[serde(default = "default_balance_path")]
    pub path: String,

    #[serde(default)]
    pub minimums: Vec<MinimumConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MinimumConfig {
    pub account: String,
    pub minimum: f64,
}

fn default_debounce_ms() -> u64 {
    2000
}

fn default_api_addr() -> SocketAddr {
    "127.0.0.1:8090".parse().expect("valid default address")
}

fn default_node_interval_secs() -> u64 {
    60
}

fn default_node_cycle_timeout_secs() -> u64 {
    45
}

fn default_check_timeout_ms() -> u64 {
    2000
}

fn default_health_path() -> String {
    "/health".to_string()
}

fn default_balance_interval_secs() -> u64 {
    600
}

fn default_balance_cycle_timeout_secs() -> u64 {
    60
}

fn default_balance_path() -> String {
    "/balances".to_string()
}

impl Config {
    /// Load and parse the configuration file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&raw)?;
        Ok(config)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl NodeHealthConfig {
    /// Pool specs for the failover algorithm (names in priority order).
    pub fn pool_specs(&self) -> Vec<PoolSpec> {
        self.pools
            .iter()
            .map(|p| PoolSpec {
                pool: p.pool.clone(),
                instances: p.instances.iter().map(|i| i.name.clone()).collect(),
            })
            .collect()
    }

    /// Pool specs for the HTTP pool client (names + addresses).
    pub fn http_pool_specs(&self) -> Vec<HttpPoolSpec> {
        self.pools
            .iter()
            .map(|p| HttpPoolSpec {
                pool: p.pool.clone(),
                instances: p
                    .instances
                    .iter()
                    .map(|i| (i.name.clone(), i.address.clone()))
                    .collect(),
                path: self.health_path.clone(),
            })
            .collect()
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn cycle_timeout(&self) -> Duration {
        Duration::from_secs(self.cycle_timeout_secs)
    }

    pub fn check_timeout(&self) -> Duration {
        Duration::from_millis(self.check_timeout_ms)
    }
}

impl BalanceConfig {
    pub fn limits(&self) -> Vec<BalanceLimit> {
        self.minimums
            .iter()
            .map(|m| BalanceLimit {
                account: m.account.clone(),
                minimum: m.minimum,
            })
            .collect()
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn cycle_timeout(&self) -> Duration {
        Duration::from_secs(self.cycle_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
data_dir = "/var/lib/vigil"
debounce_ms = 1500
api_addr = "0.0.0.0:9000"

[node_health]
interval_secs = 30
health_path = "/healthz"

[[node_health.pools]]
pool = "btc"
instances = [
    { name = "active", address = "10.0.0.1:8332" },
    { name = "passive", address = "10.0.0.2:8332" },
]

[[node_health.pools]]
pool = "eth"
instances = [{ name = "active", address = "10.0.1.1:8545" }]

[balances]
address = "10.0.2.1:8080"
minimums = [{ account = "chf", minimum = 1000.0 }]
"#;

    #[test]
    fn parses_full_sample() {
        let config: Config = toml::from_str(SAMPLE).unwrap();

        assert_eq!(config.debounce(), Duration::from_millis(1500));
        assert_eq!(config.api_addr.port(), 9000);
        assert_eq!(config.node_health.interval(), Duration::from_secs(30));
        assert_eq!(config.node_health.pools.len(), 2);

        let specs = config.node_health.pool_specs();
        assert_eq!(specs[0].pool, "btc");
        assert_eq!(specs[0].instances, vec!["active", "passive"]);

        let http_specs = config.node_health.http_pool_specs();
        assert_eq!(http_specs[0].path, "/healthz");
        assert_eq!(http_specs[0].instances[1].1, "10.0.0.2:8332");

        let balances = config.balances.unwrap();
        assert_eq!(balances.path, "/balances");
        assert_eq!(balances.limits()[0].minimum, 1000.0);
    }

    #[test]
    fn defaults_apply_when_omitted() {
        let minimal = r#"
data_dir = "/tmp/vigil"

[node_health]
pools = []
"#;
        let config: Config = toml::from_str(minimal).unwrap();

        assert_eq!(config.debounce_ms, 2000);
        assert_eq!(config.api_addr.port(), 8090);
        assert_eq!(config.node_health.interval_secs, 60);
        assert_eq!(config.node_health.check_timeout_ms, 2000);
        assert_eq!(config.node_health.health_path, "/health");
        assert!(config.balances.is_none());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let bad = r#"
data_dir = "/tmp/vigil"
unknown_key = true

[node_health]
pools = []
"#;
        assert!(toml::from_str::<Config>(bad).is_err());
    }
}
