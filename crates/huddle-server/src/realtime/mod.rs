//! Realtime event distribution: client registry, topic broadcast and
//! per-client heartbeats.

pub mod broadcast;
pub mod connection;
pub mod heartbeat;
pub mod registry;

pub use connection::Delivery;
pub use registry::{ConnectionRegistry, MIN_HEARTBEAT_INTERVAL, RegistryConfig, RegistryFull};
