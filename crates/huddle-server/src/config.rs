//! Server configuration.

use std::time::Duration;

use huddle_settings::HuddleSettings;
use serde::{Deserialize, Serialize};

use crate::realtime::RegistryConfig;

/// Configuration for the realtime server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Maximum concurrently attached clients.
    pub max_connections: usize,
    /// Heartbeat interval in milliseconds.
    pub heartbeat_interval_ms: u64,
    /// Per-client frame buffer.
    pub channel_capacity: usize,
}

impl ServerConfig {
    /// Build from loaded settings.
    pub fn from_settings(settings: &HuddleSettings) -> Self {
        Self {
            host: settings.server.host.clone(),
            port: settings.server.port,
            max_connections: settings.server.max_connections,
            heartbeat_interval_ms: settings.server.heartbeat_interval_ms,
            channel_capacity: settings.server.channel_capacity,
        }
    }

    /// Heartbeat interval as a [`Duration`].
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Registry tuning derived from this config.
    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig {
            heartbeat_interval: self.heartbeat_interval(),
            channel_capacity: self.channel_capacity,
            max_clients: self.max_connections,
            ..RegistryConfig::default()
        }
    }

    /// `host:port` bind address.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            max_connections: 1000,
            heartbeat_interval_ms: 30_000,
            channel_capacity: 64,
        }
    }
}
