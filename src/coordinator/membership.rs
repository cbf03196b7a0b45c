//! Membership coordinator
//!
//! Brings a node into a cluster exactly once at startup, before any client
//! traffic is served:
//!
//! ```text
//!   Init ──(no leader)──▶ AwaitingSelfElection ──▶ Ready
//!     │
//!     └──(leader given)──▶ Joining ──(202)──▶ Ready
//!
//!   any failure ──▶ Failed (fatal, the node never serves)
//! ```
//!
//! It also serves `/join` for nodes joining through this one. Concurrent
//! joins are not serialized here: the engine's compare-and-set on the
//! configuration id is the only guard against lost updates.

use crate::common::{
    poll_until, retry_with_backoff, Backoff, Error, JoinRequest, NodeConfig, NodeIdentity,
    Result,
};
use crate::coordinator::engine::{self, SharedEngine};
use crate::coordinator::join_client::JoinClient;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupState {
    Init,
    AwaitingSelfElection,
    Joining,
    Ready,
    Failed,
}

impl std::fmt::Display for StartupState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StartupState::Init => write!(f, "init"),
            StartupState::AwaitingSelfElection => write!(f, "awaiting-self-election"),
            StartupState::Joining => write!(f, "joining"),
            StartupState::Ready => write!(f, "ready"),
            StartupState::Failed => write!(f, "failed"),
        }
    }
}

/// Startup and join tuning, usually derived from [`NodeConfig`]
#[derive(Debug, Clone)]
pub struct MembershipSettings {
    pub election_poll_initial: Duration,
    pub election_poll_max: Duration,
    pub election_timeout: Duration,
    pub join_timeout: Duration,
    pub join_attempts: usize,
    pub join_backoff: Duration,
}

impl Default for MembershipSettings {
    fn default() -> Self {
        Self::from(&NodeConfig::default())
    }
}

impl From<&NodeConfig> for MembershipSettings {
    fn from(config: &NodeConfig) -> Self {
        Self {
            election_poll_initial: config.election_poll_initial(),
            election_poll_max: config.election_poll_max(),
            election_timeout: config.election_timeout(),
            join_timeout: config.join_timeout(),
            join_attempts: config.join_attempts,
            join_backoff: config.join_backoff(),
        }
    }
}

/// Outcome of a handled join
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    /// A new configuration was committed
    Added { configuration_id: u64 },
    /// The server was already a member at that address
    AlreadyMember { configuration_id: u64 },
}

pub struct MembershipCoordinator {
    engine: SharedEngine,
    identity: NodeIdentity,
    settings: MembershipSettings,
}

impl MembershipCoordinator {
    pub fn new(engine: SharedEngine, identity: NodeIdentity, settings: MembershipSettings) -> Self {
        Self {
            engine,
            identity,
            settings,
        }
    }

    pub fn identity(&self) -> &NodeIdentity {
        &self.identity
    }

    /// Run bootstrap-or-join to completion. `leader` absent means this node
    /// creates a new cluster. Any error is fatal for the process.
    pub async fn start(&self, leader: Option<&str>) -> Result<()> {
        engine::call(&self.engine, |e| e.init())
            .await?
            .map_err(Error::EngineInit)?;

        let mut state = StartupState::Init;
        loop {
            let next = match self.step(state, leader).await {
                Ok(next) => next,
                Err(e) => {
                    tracing::error!(
                        "Server {} startup {} -> {}: {}",
                        self.identity.server_id,
                        state,
                        StartupState::Failed,
                        e
                    );
                    return Err(e);
                }
            };
            tracing::info!(
                "Server {} startup {} -> {}",
                self.identity.server_id,
                state,
                next
            );
            if next == StartupState::Ready {
                return Ok(());
            }
            state = next;
        }
    }

    async fn step(&self, state: StartupState, leader: Option<&str>) -> Result<StartupState> {
        match (state, leader) {
            (StartupState::Init, None) => {
                engine::call(&self.engine, |e| e.bootstrap_configuration())
                    .await?
                    .map_err(Error::Bootstrap)?;
                Ok(StartupState::AwaitingSelfElection)
            }
            (StartupState::Init, Some(_)) => Ok(StartupState::Joining),
            (StartupState::AwaitingSelfElection, _) => {
                let index = self.await_self_election().await?;
                tracing::info!("Self-election complete, commit index {}", index);
                Ok(StartupState::Ready)
            }
            (StartupState::Joining, Some(leader)) => {
                self.join(leader).await?;
                Ok(StartupState::Ready)
            }
            (state, _) => Err(Error::Internal(format!(
                "unexpected startup state {}",
                state
            ))),
        }
    }

    /// Poll the commit index until the engine reports it, with bounded
    /// exponential backoff.
    async fn await_self_election(&self) -> Result<u64> {
        let backoff = Backoff::new(
            self.settings.election_poll_initial,
            self.settings.election_poll_max,
        );
        poll_until(
            || async {
                match engine::call(&self.engine, |e| e.last_commit_index()).await {
                    Ok(Ok(index)) => Some(index),
                    Ok(Err(e)) => {
                        tracing::trace!("Commit index not available yet: {}", e);
                        None
                    }
                    Err(e) => {
                        tracing::warn!("Commit index poll failed: {}", e);
                        None
                    }
                }
            },
            backoff,
            self.settings.election_timeout,
        )
        .await
        .ok_or(Error::ElectionTimeout(self.settings.election_timeout))
    }

    async fn join(&self, leader: &str) -> Result<()> {
        let client = JoinClient::new(self.settings.join_timeout)?;
        let request = JoinRequest::from(&self.identity);
        tracing::info!(
            "Joining cluster via {} as {}",
            leader,
            request.encode()
        );
        retry_with_backoff(
            || client.join(leader, &request),
            self.settings.join_attempts,
            self.settings.join_backoff,
        )
        .await
    }

    /// Add the server described by a `/join` body to the configuration.
    pub async fn handle_join(&self, body: &[u8]) -> Result<JoinOutcome> {
        let request = JoinRequest::parse(body)?;

        let current = engine::call(&self.engine, |e| e.configuration())
            .await?
            .map_err(Error::ConfigurationRead)?;

        let new_server = request.into_server();
        if current.servers.contains(&new_server) {
            tracing::info!(
                "Server {} already a member of {}",
                new_server.server_id,
                current
            );
            return Ok(JoinOutcome::AlreadyMember {
                configuration_id: current.id,
            });
        }

        let old_id = current.id;
        let servers = current.with_server(new_server.clone());
        let configuration_id = engine::call(&self.engine, move |e| {
            e.set_configuration(old_id, servers)
        })
        .await?
        .map_err(Error::ConfigurationChange)?;

        tracing::info!(
            "Server {}@{} joined: configuration {} -> {}",
            new_server.server_id,
            new_server.addresses,
            old_id,
            configuration_id
        );
        Ok(JoinOutcome::Added { configuration_id })
    }
}
