//! # huddle-core
//!
//! Vocabulary shared by the realtime server and its clients.
//!
//! - [`ClientId`]: time-ordered id assigned at attach
//! - [`Frame`]: the JSON event frame and its SSE encoding
//! - [`topic`]: subscription matching and `subscribe` parameter parsing
//! - [`logging`]: `tracing` subscriber setup

#![deny(unsafe_code)]

pub mod frame;
pub mod ids;
pub mod logging;
pub mod topic;

pub use frame::{CONNECTED, Frame, FrameError, HEARTBEAT, decode_data, decode_sse_block, encode_sse};
pub use ids::ClientId;
pub use topic::WILDCARD;
