//! Connector error types.

use huddle_core::FrameError;

/// Errors surfaced by the realtime connector.
#[derive(Debug, thiserror::Error)]
pub enum ConnectorError {
    /// No token configured; the transport is never opened.
    #[error("no auth token configured")]
    MissingToken,

    /// The transport could not be opened.
    #[error("failed to open event stream: {0}")]
    Open(String),

    /// The open stream failed.
    #[error("event stream error: {0}")]
    Stream(String),

    /// The server ended the stream.
    #[error("event stream closed by server")]
    Closed,

    /// An inbound frame could not be parsed.
    #[error("malformed frame: {0}")]
    Malformed(#[from] FrameError),

    /// No handshake has been received yet.
    #[error("not connected")]
    NotConnected,

    /// A subscription request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// A subscription request was rejected.
    #[error("server rejected request ({status}): {message}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Response body.
        message: String,
    },
}

impl ConnectorError {
    /// Whether a reconnect may fix this. Anything else stops the connector.
    pub fn is_connection_level(&self) -> bool {
        matches!(self, Self::Open(_) | Self::Stream(_) | Self::Closed)
    }
}
