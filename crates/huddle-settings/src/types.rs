//! Settings types.
//!
//! Every struct is `#[serde(default)]` so a partial settings file only needs
//! to name the values it changes.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings object.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HuddleSettings {
    /// Realtime server settings.
    pub server: ServerSettings,
    /// Bearer tokens accepted at connect time.
    pub auth: AuthSettings,
    /// Client connector defaults.
    pub client: ClientSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

impl HuddleSettings {
    /// Reject values that would make the server misbehave.
    pub fn validate(&self) -> Result<()> {
        if self.server.heartbeat_interval_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "server.heartbeatIntervalMs must be positive".into(),
            ));
        }
        if self.server.channel_capacity == 0 {
            return Err(SettingsError::InvalidValue(
                "server.channelCapacity must be positive".into(),
            ));
        }
        if self.client.reconnect_delay_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "client.reconnectDelayMs must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Server network and connection settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Listen port.
    pub port: u16,
    /// Interval between heartbeat frames, per client.
    pub heartbeat_interval_ms: u64,
    /// Frames buffered per client before new frames are dropped.
    pub channel_capacity: usize,
    /// Maximum simultaneously attached clients.
    pub max_connections: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            heartbeat_interval_ms: 30_000,
            channel_capacity: 64,
            max_connections: 1000,
        }
    }
}

/// Accepted bearer tokens. An empty list rejects every connection.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthSettings {
    /// Tokens accepted by the allow-list validator.
    pub tokens: Vec<String>,
}

/// Defaults for client connectors.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientSettings {
    /// Fixed delay before reconnecting after a transport error.
    pub reconnect_delay_ms: u64,
    /// Whether the realtime channel is enabled at all.
    pub enabled: bool,
}

impl ClientSettings {
    /// Reconnect delay as a [`Duration`].
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            reconnect_delay_ms: 5_000,
            enabled: true,
        }
    }
}

/// Logging settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let s = HuddleSettings::default();
        assert_eq!(s.server.host, "0.0.0.0");
        assert_eq!(s.server.port, 8080);
        assert_eq!(s.server.heartbeat_interval_ms, 30_000);
        assert_eq!(s.server.channel_capacity, 64);
        assert_eq!(s.client.reconnect_delay(), Duration::from_secs(5));
        assert!(s.client.enabled);
        assert!(s.auth.tokens.is_empty());
        assert_eq!(s.logging.level, "info");
    }

    #[test]
    fn defaults_validate() {
        assert!(HuddleSettings::default().validate().is_ok());
    }

    #[test]
    fn zero_heartbeat_rejected() {
        let mut s = HuddleSettings::default();
        s.server.heartbeat_interval_ms = 0;
        assert!(matches!(s.validate(), Err(SettingsError::InvalidValue(_))));
    }

    #[test]
    fn zero_reconnect_delay_rejected() {
        let mut s = HuddleSettings::default();
        s.client.reconnect_delay_ms = 0;
        assert!(s.validate().is_err());
    }

    #[test]
    fn camel_case_keys() {
        let json = serde_json::to_value(HuddleSettings::default()).unwrap();
        assert!(json["server"]["heartbeatIntervalMs"].is_number());
        assert!(json["client"]["reconnectDelayMs"].is_number());
    }

    #[test]
    fn partial_deserialize_fills_defaults() {
        let s: HuddleSettings = serde_json::from_str(r#"{"server":{"port":9000}}"#).unwrap();
        assert_eq!(s.server.port, 9000);
        assert_eq!(s.server.heartbeat_interval_ms, 30_000);
    }
}
