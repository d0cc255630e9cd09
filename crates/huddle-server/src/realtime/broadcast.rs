//! Topic fan-out and direct delivery.

use std::sync::Arc;

use huddle_core::{ClientId, Frame};
use metrics::counter;
use serde_json::Value;
use tracing::{debug, warn};

use super::connection::{ClientConnection, Delivery};
use super::registry::ConnectionRegistry;
use crate::metrics::{SSE_BROADCASTS_TOTAL, SSE_FRAMES_DROPPED_TOTAL};

impl ConnectionRegistry {
    /// Publish `payload` on `topic` to every client subscribed to it or to
    /// the wildcard.
    ///
    /// Returns the number of clients the frame was queued for. Clients whose
    /// transport is closed are detached; the failure never reaches the
    /// caller.
    pub fn broadcast(&self, topic: &str, payload: Value) -> usize {
        let frame = Frame::event(topic, payload);
        let body: Arc<str> = match frame.to_json() {
            Ok(json) => Arc::from(json),
            Err(e) => {
                warn!(topic, error = %e, "failed to serialize event");
                return 0;
            }
        };
        counter!(SSE_BROADCASTS_TOTAL).increment(1);

        let mut reached = 0usize;
        let mut matched = 0usize;
        let removed = {
            let mut clients = self.clients.lock();
            let mut dead = Vec::new();
            for conn in clients.values_mut() {
                if !conn.wants(topic) {
                    continue;
                }
                matched += 1;
                match self.deliver(conn, Arc::clone(&body)) {
                    Delivery::Delivered => reached += 1,
                    Delivery::Dropped => {}
                    Delivery::Gone => dead.push(conn.id.clone()),
                }
            }
            dead.iter()
                .filter_map(|id| clients.remove(id))
                .collect::<Vec<_>>()
        };
        for conn in &removed {
            self.finish_detach(conn, "write failed");
        }

        debug!(
            topic,
            event_type = frame.event_type,
            matched,
            recipients = reached,
            "broadcast event"
        );
        reached
    }

    /// Deliver a frame to one client, bypassing topic matching.
    pub fn send_to_one(&self, id: &ClientId, frame: &Frame) -> Delivery {
        let body: Arc<str> = match frame.to_json() {
            Ok(json) => Arc::from(json),
            Err(e) => {
                warn!(client_id = %id, error = %e, "failed to serialize frame");
                return Delivery::Dropped;
            }
        };
        let removed = {
            let mut clients = self.clients.lock();
            let Some(conn) = clients.get_mut(id) else {
                return Delivery::Gone;
            };
            match self.deliver(conn, body) {
                Delivery::Gone => clients.remove(id),
                other => return other,
            }
        };
        if let Some(conn) = removed {
            self.finish_detach(&conn, "write failed");
        }
        Delivery::Gone
    }

    /// Write to one entry; a client over its drop limit counts as gone.
    fn deliver(&self, conn: &mut ClientConnection, body: Arc<str>) -> Delivery {
        match conn.send(body) {
            Delivery::Dropped => {
                counter!(SSE_FRAMES_DROPPED_TOTAL).increment(1);
                let drops = conn.drop_count();
                if drops >= self.config.max_dropped_frames {
                    warn!(client_id = %conn.id, drops, "disconnecting slow client");
                    Delivery::Gone
                } else {
                    warn!(client_id = %conn.id, total_drops = drops, "client buffer full, frame dropped");
                    Delivery::Dropped
                }
            }
            other => other,
        }
    }
}
