//! # huddle-server
//!
//! Realtime event delivery over server-sent events.
//!
//! - Connection registry: attach, detach, per-client subscriptions
//! - Topic broadcast with wildcard subscribers and per-client ordering
//! - Per-client heartbeat timers
//! - axum HTTP surface: `/events`, subscription endpoints, stats, health, metrics
//! - Graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod health;
pub mod metrics;
pub mod realtime;
pub mod server;
pub mod shutdown;

pub use auth::{AllowListValidator, TokenValidator};
pub use config::ServerConfig;
pub use error::ServerError;
pub use realtime::{ConnectionRegistry, Delivery, RegistryConfig, RegistryFull};
pub use server::{AppState, HuddleServer};
pub use shutdown::ShutdownCoordinator;
