//! Node orchestration around the consensus engine
//!
//! - Membership: bootstrap a new cluster or join an existing one, and
//!   serve joins from other nodes
//! - Writes: one request body, one replicated log entry
//! - HTTP routing between the two

pub mod dispatcher;
pub mod engine;
pub mod http;
pub mod join_client;
pub mod membership;
pub mod raft_node;
pub mod server;

pub use engine::{ConsensusEngine, EngineError, EngineResult, SharedEngine};
pub use server::Node;
