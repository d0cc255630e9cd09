//! Per-client registry entry.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use huddle_core::{ClientId, topic};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;

/// Result of one non-blocking write to a client's transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The frame was queued on the client's stream.
    Delivered,
    /// The client's buffer was full; this frame was dropped.
    Dropped,
    /// The transport is closed, or the client is not registered.
    Gone,
}

/// One attached client: its transport, subscriptions and heartbeat timer.
///
/// Entries are owned by the registry map and only mutated under its lock.
pub struct ClientConnection {
    /// Unique connection ID.
    pub id: ClientId,
    /// Write side of the client's event stream.
    tx: mpsc::Sender<Arc<str>>,
    /// Topics this client receives.
    subscriptions: HashSet<String>,
    /// Cancels the heartbeat task. Cancelled once, when the entry is removed.
    heartbeat: CancellationToken,
    /// When this connection was established.
    pub connected_at: Instant,
    /// Frames dropped because the client's buffer was full.
    dropped_frames: u64,
}

impl ClientConnection {
    /// Create a new entry.
    pub fn new(
        id: ClientId,
        tx: mpsc::Sender<Arc<str>>,
        subscriptions: HashSet<String>,
        heartbeat: CancellationToken,
    ) -> Self {
        Self {
            id,
            tx,
            subscriptions,
            heartbeat,
            connected_at: Instant::now(),
            dropped_frames: 0,
        }
    }

    /// Queue a serialized frame without waiting.
    ///
    /// Writes are only attempted while the transport is still open. A full
    /// buffer drops the frame and bumps the drop counter.
    pub fn send(&mut self, body: Arc<str>) -> Delivery {
        if self.tx.is_closed() {
            return Delivery::Gone;
        }
        match self.tx.try_send(body) {
            Ok(()) => Delivery::Delivered,
            Err(TrySendError::Full(_)) => {
                self.dropped_frames += 1;
                Delivery::Dropped
            }
            Err(TrySendError::Closed(_)) => Delivery::Gone,
        }
    }

    /// Whether a broadcast on `topic` is meant for this client.
    pub fn wants(&self, topic_name: &str) -> bool {
        topic::matches(&self.subscriptions, topic_name)
    }

    /// Current subscription set.
    pub fn subscriptions(&self) -> &HashSet<String> {
        &self.subscriptions
    }

    /// Add a topic. Returns `false` if it was already present.
    pub fn subscribe(&mut self, topic_name: String) -> bool {
        self.subscriptions.insert(topic_name)
    }

    /// Remove a topic. Returns `false` if it was not present.
    pub fn unsubscribe(&mut self, topic_name: &str) -> bool {
        self.subscriptions.remove(topic_name)
    }

    /// Total frames dropped for this connection.
    pub fn drop_count(&self) -> u64 {
        self.dropped_frames
    }

    /// Stop the heartbeat timer.
    pub(crate) fn cancel_heartbeat(&self) {
        self.heartbeat.cancel();
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}
