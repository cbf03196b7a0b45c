//! Node configuration
//!
//! Values are layered: optional TOML file, then `REPLOG_*` environment
//! variables, then command-line flags (applied by the binary).

use crate::common::raft::NodeIdentity;
use crate::common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

/// Environment variable naming the configuration file
pub const CONFIG_PATH_ENV: &str = "REPLOG_CONFIG";

/// Prefix for per-field environment overrides, e.g. `REPLOG_JOIN_ATTEMPTS`
pub const ENV_PREFIX: &str = "REPLOG";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Unique server id within the cluster (must be > 0)
    pub server_id: u64,

    /// HTTP listen port
    pub port: u16,

    /// HTTP listen interface
    pub bind_ip: IpAddr,

    /// Address advertised to peers in the cluster configuration
    pub address: String,

    /// Existing member to join; absent on the node that bootstraps the cluster
    pub leader: Option<String>,

    /// Runtime worker threads (defaults to the number of logical CPUs)
    pub worker_threads: Option<usize>,

    pub request_timeout_ms: u64,

    pub max_body_bytes: usize,

    /// Timeout of a single outbound join attempt
    pub join_timeout_ms: u64,

    /// Join attempts before startup fails (1 disables retry)
    pub join_attempts: usize,

    pub join_backoff_ms: u64,

    pub election_poll_initial_ms: u64,

    pub election_poll_max_ms: u64,

    /// Give up waiting for self-election after this long
    pub election_timeout_ms: u64,

    /// Self-election delay of the in-process engine
    pub election_delay_ms: u64,

    /// Remembered idempotency keys (0 disables deduplication)
    pub dedup_capacity: usize,

    pub log_level: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            server_id: 0,
            port: 12301,
            bind_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            address: String::new(),
            leader: None,
            worker_threads: None,
            request_timeout_ms: 60_000,
            max_body_bytes: 16 * 1024 * 1024,
            join_timeout_ms: 1_000,
            join_attempts: 5,
            join_backoff_ms: 100,
            election_poll_initial_ms: 1,
            election_poll_max_ms: 100,
            election_timeout_ms: 30_000,
            election_delay_ms: 0,
            dedup_capacity: 0,
            log_level: "info".to_string(),
        }
    }
}

impl NodeConfig {
    /// Load from `path` (or `$REPLOG_CONFIG` when `None`) and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = ::config::Config::builder();

        let env_path = std::env::var(CONFIG_PATH_ENV).ok();
        match (path, env_path) {
            (Some(p), _) => {
                builder = builder.add_source(::config::File::from(p).required(true));
            }
            (None, Some(p)) => {
                builder = builder.add_source(::config::File::with_name(&p).required(true));
            }
            (None, None) => {}
        }

        builder = builder.add_source(
            ::config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .try_parsing(true),
        );

        let config: NodeConfig = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.server_id == 0 {
            return Err(Error::InvalidConfig("server_id must be positive".into()));
        }
        if self.address.trim().is_empty() {
            return Err(Error::InvalidConfig("address must not be empty".into()));
        }
        if self.address.contains(',') {
            return Err(Error::InvalidConfig("address must not contain ','".into()));
        }
        if self.join_attempts == 0 {
            return Err(Error::InvalidConfig("join_attempts must be at least 1".into()));
        }
        if self.election_poll_initial_ms == 0 || self.election_poll_max_ms == 0 {
            return Err(Error::InvalidConfig(
                "election poll intervals must be positive".into(),
            ));
        }
        if self.worker_threads == Some(0) {
            return Err(Error::InvalidConfig("worker_threads must be positive".into()));
        }
        if matches!(&self.leader, Some(l) if l.trim().is_empty()) {
            return Err(Error::InvalidConfig("leader must not be empty".into()));
        }
        Ok(())
    }

    pub fn identity(&self) -> NodeIdentity {
        NodeIdentity::new(self.server_id, self.address.trim())
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_ip, self.port)
    }

    pub fn worker_threads(&self) -> usize {
        self.worker_threads.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }

    pub fn join_backoff(&self) -> Duration {
        Duration::from_millis(self.join_backoff_ms)
    }

    pub fn election_poll_initial(&self) -> Duration {
        Duration::from_millis(self.election_poll_initial_ms)
    }

    pub fn election_poll_max(&self) -> Duration {
        Duration::from_millis(self.election_poll_max_ms)
    }

    pub fn election_timeout(&self) -> Duration {
        Duration::from_millis(self.election_timeout_ms)
    }

    pub fn election_delay(&self) -> Duration {
        Duration::from_millis(self.election_delay_ms)
    }
}
