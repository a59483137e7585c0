//! # botfleet-server
//!
//! Thin HTTP adapter over the broadcast hub.
//!
//! - `GET /instances`: registered instances with their meta
//! - `GET /events/{id}`: server-sent events, `meta` then `status` first
//! - `POST /send/{id}`: deliver `{"message": ...}` through the instance
//! - `GET /health`: liveness and counters

pub mod config;
pub mod directory;
pub mod error;
pub mod gateway;
pub mod health;
pub mod server;
pub mod shutdown;

pub use config::ServerConfig;
pub use directory::{InstanceDirectory, MessageSender};
pub use error::GatewayError;
pub use server::{AppState, GatewayServer, ServerHandle};
pub use shutdown::ShutdownCoordinator;
