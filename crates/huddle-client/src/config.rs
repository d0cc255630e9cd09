//! Connector configuration.

use std::time::Duration;

use huddle_settings::ClientSettings;

/// Default delay before an automatic reconnect.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(5000);

/// Configuration for one [`Connector`](crate::Connector).
#[derive(Clone, Debug)]
pub struct ConnectorConfig {
    /// Server base URL, e.g. `http://127.0.0.1:8080`.
    pub base_url: String,
    /// Topics declared at connect time.
    pub topics: Vec<String>,
    /// Bearer token. `None` makes `connect` fail without any network attempt.
    pub token: Option<String>,
    /// Fixed delay between a connection failure and the next attempt.
    pub reconnect_delay: Duration,
    /// Feature switch; when `false`, `connect` does nothing.
    pub enabled: bool,
}

impl ConnectorConfig {
    /// Config with defaults for everything except the server URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            topics: Vec::new(),
            token: None,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            enabled: true,
        }
    }

    /// Apply the `client` settings section.
    #[must_use]
    pub fn with_settings(mut self, settings: &ClientSettings) -> Self {
        self.reconnect_delay = settings.reconnect_delay();
        self.enabled = settings.enabled;
        self
    }

    /// Add topics to subscribe to at connect time.
    #[must_use]
    pub fn with_topics<I, S>(mut self, topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.topics.extend(topics.into_iter().map(Into::into));
        self
    }

    /// Set the bearer token.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Set the reconnect delay.
    #[must_use]
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Token, if one is set and non-empty.
    pub(crate) fn usable_token(&self) -> Option<&str> {
        self.token.as_deref().filter(|t| !t.trim().is_empty())
    }
}
