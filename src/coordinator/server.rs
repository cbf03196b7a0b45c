//! Node server: startup membership, then serve HTTP

use crate::common::{NodeConfig, Result};
use crate::coordinator::dispatcher::WriteDispatcher;
use crate::coordinator::engine::SharedEngine;
use crate::coordinator::http::{create_router, NodeState, RouterSettings};
use crate::coordinator::membership::{MembershipCoordinator, MembershipSettings};
use axum::Router;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;

pub struct Node {
    config: NodeConfig,
    engine: SharedEngine,
}

impl Node {
    pub fn new(config: NodeConfig, engine: SharedEngine) -> Self {
        Self { config, engine }
    }

    /// Bootstrap or join, then build the router. Nothing is served until
    /// this returns `Ok`.
    pub async fn start(&self) -> Result<Router> {
        self.config.validate()?;

        let membership = Arc::new(MembershipCoordinator::new(
            self.engine.clone(),
            self.config.identity(),
            MembershipSettings::from(&self.config),
        ));
        membership.start(self.config.leader.as_deref()).await?;

        let state = NodeState {
            membership,
            dispatcher: Arc::new(WriteDispatcher::new(
                self.engine.clone(),
                self.config.dedup_capacity,
            )),
        };
        Ok(create_router(state, &RouterSettings::from(&self.config)))
    }

    /// Start, bind the configured address and serve until SIGINT/SIGTERM.
    pub async fn serve(self) -> Result<()> {
        let router = self.start().await?;
        let listener = TcpListener::bind(self.config.listen_addr()).await?;
        self.run(listener, router, shutdown_signal()).await
    }

    /// Start, then serve on an already bound listener until `shutdown` resolves.
    pub async fn serve_with_listener<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let router = self.start().await?;
        self.run(listener, router, shutdown).await
    }

    async fn run<F>(&self, listener: TcpListener, router: Router, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        tracing::info!("Starting node: {}", self.config.server_id);
        tracing::info!("  Build: {}", crate::BUILD_INFO);
        tracing::info!("  HTTP API: {}", listener.local_addr()?);
        tracing::info!("  Advertised address: {}", self.config.address);
        match &self.config.leader {
            Some(leader) => tracing::info!("  Joined via: {}", leader),
            None => tracing::info!("  Bootstrapped new cluster"),
        }

        tracing::info!("✓ Node ready");
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await?;
        tracing::info!("Node {} stopped", self.config.server_id);
        Ok(())
    }
}

/// Resolves on Ctrl-C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}
