//! Application callbacks.

use huddle_core::Frame;

use crate::error::ConnectorError;

/// Receives application events from a [`Connector`](crate::Connector).
///
/// Control frames (`connected`, `heartbeat`) are never passed to
/// `on_event`. Callbacks run on the connector's task and should not block.
pub trait ConnectorHandler: Send + Sync {
    /// An application event arrived.
    fn on_event(&self, frame: Frame);

    /// The transport opened.
    fn on_connect(&self) {}

    /// The connection failed; a reconnect is scheduled.
    fn on_error(&self, _error: &ConnectorError) {}
}
