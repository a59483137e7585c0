//! Router assembly and the listening task.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::routing::{get, post};
use botfleet_hub::BroadcastHub;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::ServerConfig;
use crate::directory::InstanceDirectory;
use crate::gateway;
use crate::shutdown::ShutdownCoordinator;

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    /// Event routing.
    pub hub: Arc<BroadcastHub>,
    /// Send capability per instance.
    pub directory: Arc<InstanceDirectory>,
    /// Ends open event streams on shutdown.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// Server start time, for uptime.
    pub start_time: Instant,
    /// SSE keep-alive interval.
    pub keep_alive: Duration,
}

/// The HTTP gateway.
pub struct GatewayServer {
    config: ServerConfig,
    hub: Arc<BroadcastHub>,
    directory: Arc<InstanceDirectory>,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
}

impl GatewayServer {
    /// New server over `hub` and `directory`.
    pub fn new(
        config: ServerConfig,
        hub: Arc<BroadcastHub>,
        directory: Arc<InstanceDirectory>,
    ) -> Self {
        Self {
            config,
            hub,
            directory,
            shutdown: Arc::new(ShutdownCoordinator::new()),
            start_time: Instant::now(),
        }
    }

    /// Build the router.
    pub fn router(&self) -> Router {
        let state = AppState {
            hub: Arc::clone(&self.hub),
            directory: Arc::clone(&self.directory),
            shutdown: Arc::clone(&self.shutdown),
            start_time: self.start_time,
            keep_alive: self.config.keep_alive(),
        };

        Router::new()
            .route("/instances", get(gateway::list_instances))
            .route("/events/{id}", get(gateway::events))
            .route("/send/{id}", post(gateway::send))
            .route("/health", get(gateway::health))
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// Configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Bind and start serving in the background.
    pub async fn start(self) -> std::io::Result<ServerHandle> {
        let router = self.router();
        let listener =
            tokio::net::TcpListener::bind((self.config.host.as_str(), self.config.port)).await?;
        let port = listener.local_addr()?.port();
        info!(host = %self.config.host, port, "gateway listening");

        let token = self.shutdown.token();
        let task = tokio::spawn(async move {
            let served = axum::serve(listener, router)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await;
            if let Err(e) = served {
                error!(error = %e, "gateway server error");
            }
        });

        Ok(ServerHandle {
            port,
            shutdown: self.shutdown,
            task,
        })
    }
}

/// A running gateway.
pub struct ServerHandle {
    port: u16,
    shutdown: Arc<ShutdownCoordinator>,
    task: JoinHandle<()>,
}

impl ServerHandle {
    /// Bound port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Stop accepting, end open event streams, and wait for the listener.
    pub async fn stop(self, timeout: Option<Duration>) -> bool {
        let drained = self.shutdown.graceful_shutdown(vec![self.task], timeout).await;
        info!(drained, "gateway stopped");
        drained
    }
}
