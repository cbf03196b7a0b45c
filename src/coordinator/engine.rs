//! Consensus engine contract
//!
//! The replicated log (leader election, replication, configuration storage)
//! lives behind this trait. The front end only issues calls and relies on the
//! engine's own synchronization; implementations must be safe to call from
//! many threads at once.

use crate::common::raft::{ClusterConfiguration, Server};
use std::sync::Arc;
use thiserror::Error;

/// Non-success outcomes of an engine call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("not leader")]
    NotLeader,

    #[error("no quorum available, retry later")]
    Retry,

    #[error("engine operation timed out")]
    Timeout,

    #[error("configuration id is stale")]
    ConfigurationChanged,

    #[error("{0}")]
    Fail(String),
}

impl EngineError {
    /// Whether the same call may succeed later, possibly on another leader.
    pub fn is_transient(&self) -> bool {
        !matches!(self, EngineError::Fail(_))
    }
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Shared handle passed to every component at construction.
pub type SharedEngine = Arc<dyn ConsensusEngine>;

/// Calls may block until the engine reaches a decision. Async callers run
/// them on the blocking pool.
pub trait ConsensusEngine: Send + Sync + 'static {
    /// One-time startup, before any other call.
    fn init(&self) -> EngineResult<()>;

    /// Create a brand-new single-member cluster. Fails if a configuration
    /// already exists.
    fn bootstrap_configuration(&self) -> EngineResult<()>;

    fn last_commit_index(&self) -> EngineResult<u64>;

    fn configuration(&self) -> EngineResult<ClusterConfiguration>;

    /// Compare-and-set membership change. Rejected with
    /// [`EngineError::ConfigurationChanged`] unless `old_id` is the current
    /// configuration id. Returns the new configuration id.
    fn set_configuration(&self, old_id: u64, servers: Vec<Server>) -> EngineResult<u64>;

    /// Returns the log index once the entry is committed.
    fn replicate(&self, entry: &[u8]) -> EngineResult<u64>;
}

/// Run a blocking engine call without stalling the async worker.
pub(crate) async fn call<T, F>(engine: &SharedEngine, f: F) -> crate::Result<EngineResult<T>>
where
    T: Send + 'static,
    F: FnOnce(&dyn ConsensusEngine) -> EngineResult<T> + Send + 'static,
{
    let engine = engine.clone();
    Ok(tokio::task::spawn_blocking(move || f(&*engine)).await?)
}
