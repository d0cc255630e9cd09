//! Per-client keep-alive timer.
//!
//! Each attached client gets one heartbeat task. It sends a `heartbeat`
//! frame through the registry every `interval`, and it is also the client's
//! closure observer: when the read side of the transport is dropped it
//! detaches the client.

use std::sync::{Arc, Weak};
use std::time::Duration;

use huddle_core::{ClientId, Frame};
use metrics::counter;
use tokio::sync::mpsc;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::connection::Delivery;
use super::registry::{ConnectionRegistry, MIN_HEARTBEAT_INTERVAL};
use crate::metrics::SSE_HEARTBEATS_TOTAL;

/// Why the heartbeat loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeartbeatResult {
    /// The client was detached (token cancelled).
    Cancelled,
    /// The consumer went away; the client was detached by this task.
    TransportClosed,
    /// A heartbeat write found the client already gone.
    ClientGone,
}

/// Run the heartbeat for one client until it is detached.
///
/// The first heartbeat is sent one full `interval` after start, so the
/// handshake always precedes it. A zero interval is raised to
/// [`MIN_HEARTBEAT_INTERVAL`].
pub async fn run_heartbeat(
    registry: Weak<ConnectionRegistry>,
    client_id: ClientId,
    transport: mpsc::Sender<Arc<str>>,
    interval: Duration,
    cancel: CancellationToken,
) -> HeartbeatResult {
    let interval = interval.max(MIN_HEARTBEAT_INTERVAL);
    let mut ticker = time::interval_at(time::Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                return HeartbeatResult::Cancelled;
            }
            () = transport.closed() => {
                debug!(client_id = %client_id, "transport closed");
                if let Some(registry) = registry.upgrade() {
                    registry.detach(&client_id);
                }
                return HeartbeatResult::TransportClosed;
            }
            _ = ticker.tick() => {
                let Some(registry) = registry.upgrade() else {
                    return HeartbeatResult::ClientGone;
                };
                match registry.send_to_one(&client_id, &Frame::heartbeat()) {
                    Delivery::Gone => return HeartbeatResult::ClientGone,
                    Delivery::Delivered => {
                        counter!(SSE_HEARTBEATS_TOTAL).increment(1);
                        trace!(client_id = %client_id, "heartbeat sent");
                    }
                    Delivery::Dropped => {}
                }
            }
        }
    }
}
