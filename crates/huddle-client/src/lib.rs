//! # huddle-client
//!
//! Consumer side of the huddle realtime channel.
//!
//! - [`Connector`]: `disconnected → connecting → connected → error` state
//!   machine with fixed-delay reconnect and cancellable retry
//! - [`ConnectorHandler`]: application callbacks; control frames are filtered
//! - [`Transport`] seam with an HTTP server-sent-events implementation

#![deny(unsafe_code)]

pub mod config;
pub mod connector;
pub mod error;
pub mod handler;
pub mod transport;

pub use config::{ConnectorConfig, DEFAULT_RECONNECT_DELAY};
pub use connector::{ConnectionState, Connector};
pub use error::ConnectorError;
pub use handler::ConnectorHandler;
pub use transport::{ConnectRequest, FrameStream, SseTransport, Transport};
