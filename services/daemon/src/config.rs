//! Daemon configuration
//!
//! Loaded from a TOML file; every field has a sensible default so a missing
//! file or a partial file still yields a runnable daemon.

use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

use types::DEFAULT_MAX_FLOATING_PACKETS;

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct DaemonConfig {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub netlet: NetletConfig,
    #[serde(default)]
    pub traffic: TrafficConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchedulerConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default)]
    pub detect_loops: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NetletConfig {
    #[serde(default = "default_netlet_id")]
    pub id: String,
    /// Building blocks in outgoing order, application side first.
    #[serde(default = "default_blocks")]
    pub blocks: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrafficConfig {
    /// Payloads to push through the stack before exiting.
    #[serde(default = "default_payloads")]
    pub payloads: u64,
    /// Outgoing floating-packet window of the connector's flow.
    #[serde(default = "default_window")]
    pub max_floating_packets: i64,
}

fn default_workers() -> usize {
    2
}

fn default_netlet_id() -> String {
    "netlet://netweave/crypt-test".to_owned()
}

fn default_blocks() -> Vec<String> {
    ["frag", "pad", "header", "crc"]
        .map(str::to_owned)
        .to_vec()
}

fn default_payloads() -> u64 {
    100
}

fn default_window() -> i64 {
    DEFAULT_MAX_FLOATING_PACKETS
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            workers: default_workers(),
            detect_loops: false,
        }
    }
}

impl Default for NetletConfig {
    fn default() -> Self {
        NetletConfig {
            id: default_netlet_id(),
            blocks: default_blocks(),
        }
    }
}

impl Default for TrafficConfig {
    fn default() -> Self {
        TrafficConfig {
            payloads: default_payloads(),
            max_floating_packets: default_window(),
        }
    }
}

impl DaemonConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let config: DaemonConfig = toml::from_str(&raw)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        Ok(config)
    }
}
