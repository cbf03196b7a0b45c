//! # replog
//!
//! HTTP front end for a replicated log:
//! - Cluster bootstrap on the first node, dynamic join for the others
//! - Compare-and-set membership changes through the consensus engine
//! - One HTTP request body, one linearizable log entry
//!
//! The consensus algorithm itself sits behind [`coordinator::ConsensusEngine`].
//!
//! ## Architecture
//!
//! ```text
//!   client ── POST /anything ──┐        peer ── POST /join ──┐
//!                              ▼                             ▼
//!                  ┌──────────────────────────────────────────────┐
//!                  │ Router (axum)                                │
//!                  │   WriteDispatcher      MembershipCoordinator │
//!                  └───────────┬─────────────────────┬────────────┘
//!                              │ replicate           │ configuration /
//!                              ▼                     ▼ set_configuration
//!                  ┌──────────────────────────────────────────────┐
//!                  │ ConsensusEngine (shared Arc handle)          │
//!                  └──────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ### Start the first node
//! ```bash
//! replog-node serve --id 1 --port 12301 --address 10.0.0.1:6001
//! ```
//!
//! ### Join a second node
//! ```bash
//! replog-node serve --id 2 --port 12302 --address 10.0.0.2:6002 \
//!   --leader 10.0.0.1:12301
//! ```
//!
//! ### Write an entry
//! ```bash
//! curl -i -X POST --data-binary 'hello' http://10.0.0.1:12301/
//! ```

pub mod common;
pub mod coordinator;

// Re-export commonly used types
pub use common::{Error, NodeConfig, Result};
pub use coordinator::Node;

/// Current version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build info
pub const BUILD_INFO: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("CARGO_PKG_NAME"), ")");
