//! In-process consensus engine
//!
//! Single-process stand-in for the external replicated log. It keeps the
//! log and configuration in memory and elects itself once bootstrapped; it
//! does not talk to peers. Followers answer every read and write with
//! `NotLeader`.

use crate::common::raft::{ClusterConfiguration, LogEntry, NodeIdentity, Server};
use crate::coordinator::engine::{ConsensusEngine, EngineError, EngineResult};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RaftRole {
    Follower,
    Leader,
}

impl std::fmt::Display for RaftRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RaftRole::Follower => write!(f, "follower"),
            RaftRole::Leader => write!(f, "leader"),
        }
    }
}

struct RaftState {
    initialized: bool,
    role: RaftRole,
    /// Set by bootstrap; self-election completes `election_delay` later
    bootstrapped_at: Option<Instant>,
    configuration: Option<ClusterConfiguration>,
    log: Vec<LogEntry>,
    commit_index: u64,
    replicate_failure: Option<EngineError>,
}

impl RaftState {
    fn next_index(&self) -> u64 {
        self.log.last().map_or(1, |entry| entry.index() + 1)
    }
}

pub struct RaftNode {
    identity: NodeIdentity,
    election_delay: Duration,
    replicate_calls: AtomicU64,
    state: Mutex<RaftState>,
}

impl RaftNode {
    pub fn new(identity: NodeIdentity) -> Self {
        Self::with_election_delay(identity, Duration::ZERO)
    }

    pub fn with_election_delay(identity: NodeIdentity, election_delay: Duration) -> Self {
        Self {
            identity,
            election_delay,
            replicate_calls: AtomicU64::new(0),
            state: Mutex::new(RaftState {
                initialized: false,
                role: RaftRole::Follower,
                bootstrapped_at: None,
                configuration: None,
                log: Vec::new(),
                commit_index: 0,
                replicate_failure: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RaftState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Lock the state, completing a pending self-election first.
    fn leader_state(&self) -> EngineResult<MutexGuard<'_, RaftState>> {
        let mut state = self.lock();
        if !state.initialized {
            return Err(EngineError::Fail("engine not initialized".into()));
        }
        if state.role == RaftRole::Follower {
            match state.bootstrapped_at {
                Some(at) if at.elapsed() >= self.election_delay => {
                    state.role = RaftRole::Leader;
                    tracing::info!(
                        "Server {} elected itself leader",
                        self.identity.server_id
                    );
                }
                _ => return Err(EngineError::NotLeader),
            }
        }
        Ok(state)
    }

    pub fn identity(&self) -> &NodeIdentity {
        &self.identity
    }

    pub fn role(&self) -> RaftRole {
        self.lock().role
    }

    pub fn is_leader(&self) -> bool {
        self.role() == RaftRole::Leader
    }

    /// Snapshot of the log
    pub fn entries(&self) -> Vec<LogEntry> {
        self.lock().log.clone()
    }

    /// Number of `replicate` calls received, successful or not
    pub fn replicate_calls(&self) -> u64 {
        self.replicate_calls.load(Ordering::SeqCst)
    }

    /// Make subsequent `replicate` calls fail with `failure` (`None` clears it).
    pub fn set_replicate_failure(&self, failure: Option<EngineError>) {
        self.lock().replicate_failure = failure;
    }
}

impl ConsensusEngine for RaftNode {
    fn init(&self) -> EngineResult<()> {
        let mut state = self.lock();
        if !state.initialized {
            state.initialized = true;
            tracing::debug!("Engine initialized for server {}", self.identity.server_id);
        }
        Ok(())
    }

    fn bootstrap_configuration(&self) -> EngineResult<()> {
        let mut state = self.lock();
        if !state.initialized {
            return Err(EngineError::Fail("engine not initialized".into()));
        }
        if state.configuration.is_some() || !state.log.is_empty() {
            return Err(EngineError::Fail(
                "refusing to bootstrap: a configuration already exists".into(),
            ));
        }

        let index = state.next_index();
        let config = ClusterConfiguration {
            id: index,
            servers: vec![self.identity.as_server()],
        };
        state.log.push(LogEntry::Configuration {
            index,
            config: config.clone(),
        });
        state.commit_index = index;
        state.configuration = Some(config);
        state.bootstrapped_at = Some(Instant::now());
        Ok(())
    }

    fn last_commit_index(&self) -> EngineResult<u64> {
        Ok(self.leader_state()?.commit_index)
    }

    fn configuration(&self) -> EngineResult<ClusterConfiguration> {
        self.leader_state()?
            .configuration
            .clone()
            .ok_or_else(|| EngineError::Fail("no configuration".into()))
    }

    fn set_configuration(&self, old_id: u64, servers: Vec<Server>) -> EngineResult<u64> {
        let mut state = self.leader_state()?;
        let current = state
            .configuration
            .as_ref()
            .map(|c| c.id)
            .ok_or_else(|| EngineError::Fail("no configuration".into()))?;
        if current != old_id {
            return Err(EngineError::ConfigurationChanged);
        }
        if servers.is_empty() {
            return Err(EngineError::Fail("configuration must not be empty".into()));
        }

        let index = state.next_index();
        let config = ClusterConfiguration { id: index, servers };
        state.log.push(LogEntry::Configuration {
            index,
            config: config.clone(),
        });
        state.commit_index = index;
        state.configuration = Some(config);
        Ok(index)
    }

    fn replicate(&self, entry: &[u8]) -> EngineResult<u64> {
        self.replicate_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.leader_state()?;
        if let Some(failure) = state.replicate_failure.clone() {
            return Err(failure);
        }

        let index = state.next_index();
        state.log.push(LogEntry::Data {
            index,
            data: entry.to_vec(),
        });
        state.commit_index = index;
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leader() -> RaftNode {
        let node = RaftNode::new(NodeIdentity::new(1, "127.0.0.1:9001"));
        node.init().unwrap();
        node.bootstrap_configuration().unwrap();
        node
    }

    #[test]
    fn test_follower_rejects_everything() {
        let node = RaftNode::new(NodeIdentity::new(2, "127.0.0.1:9002"));
        node.init().unwrap();
        assert_eq!(node.role(), RaftRole::Follower);
        assert_eq!(node.last_commit_index(), Err(EngineError::NotLeader));
        assert_eq!(node.configuration(), Err(EngineError::NotLeader));
        assert_eq!(node.replicate(b"x"), Err(EngineError::NotLeader));
        assert!(node.entries().is_empty());
    }

    #[test]
    fn test_calls_before_init_fail() {
        let node = RaftNode::new(NodeIdentity::new(1, "a:1"));
        assert!(matches!(node.bootstrap_configuration(), Err(EngineError::Fail(_))));
        assert!(matches!(node.replicate(b"x"), Err(EngineError::Fail(_))));
    }

    #[test]
    fn test_bootstrap_elects_self() {
        let node = leader();
        assert_eq!(node.last_commit_index(), Ok(1));
        assert!(node.is_leader());
        let config = node.configuration().unwrap();
        assert_eq!(config.id, 1);
        assert_eq!(config.servers, vec![node.identity().as_server()]);
    }

    #[test]
    fn test_bootstrap_only_once() {
        let node = leader();
        node.replicate(b"entry").unwrap();
        assert!(node.bootstrap_configuration().is_err());
        let config = node.configuration().unwrap();
        assert_eq!(config.id, 1);
        assert_eq!(node.entries().len(), 2);
    }

    #[test]
    fn test_election_delay() {
        let node =
            RaftNode::with_election_delay(NodeIdentity::new(1, "a:1"), Duration::from_millis(30));
        node.init().unwrap();
        node.bootstrap_configuration().unwrap();
        assert_eq!(node.last_commit_index(), Err(EngineError::NotLeader));
        std::thread::sleep(Duration::from_millis(40));
        assert_eq!(node.last_commit_index(), Ok(1));
    }

    #[test]
    fn test_set_configuration_compare_and_set() {
        let node = leader();
        let config = node.configuration().unwrap();

        let two = config.with_server(NodeIdentity::new(2, "b:2").as_server());
        let new_id = node.set_configuration(config.id, two).unwrap();
        assert!(new_id > config.id);

        let three = config.with_server(NodeIdentity::new(3, "c:3").as_server());
        assert_eq!(
            node.set_configuration(config.id, three),
            Err(EngineError::ConfigurationChanged)
        );

        let current = node.configuration().unwrap();
        assert_eq!(current.id, new_id);
        assert!(current.contains(2));
        assert!(!current.contains(3));
    }

    #[test]
    fn test_replicate_appends_in_order() {
        let node = leader();
        assert_eq!(node.replicate(b"a"), Ok(2));
        assert_eq!(node.replicate(b"b"), Ok(3));
        assert_eq!(node.last_commit_index(), Ok(3));
        assert_eq!(
            node.entries()[2],
            LogEntry::Data {
                index: 3,
                data: b"b".to_vec()
            }
        );
        let indexes: Vec<u64> = node.entries().iter().map(LogEntry::index).collect();
        assert_eq!(indexes, vec![1, 2, 3]);
    }

    #[test]
    fn test_injected_replicate_failure() {
        let node = leader();
        node.set_replicate_failure(Some(EngineError::Retry));
        assert_eq!(node.replicate(b"a"), Err(EngineError::Retry));
        node.set_replicate_failure(None);
        assert_eq!(node.replicate(b"a"), Ok(2));
        assert_eq!(node.replicate_calls(), 2);
    }
}
