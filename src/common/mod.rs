//! Common utilities and types shared across replog

pub mod config;
pub mod error;
pub mod raft;
pub mod tracing_middleware;
pub mod utils;

pub use config::NodeConfig;
pub use error::{Error, Result};
pub use raft::{ClusterConfiguration, JoinRequest, LogEntry, NodeIdentity, Server, ServerId};
pub use utils::{peer_url, poll_until, retry_with_backoff, Backoff};
