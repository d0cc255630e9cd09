//! Connection registry: the set of attached clients.
//!
//! All mutations and broadcast iterations go through one `parking_lot`
//! mutex. Nothing awaits while the lock is held; writes to clients are
//! `try_send` into per-client channels.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use huddle_core::{ClientId, Frame};
use metrics::{counter, gauge};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::connection::{ClientConnection, Delivery};
use super::heartbeat::run_heartbeat;
use crate::metrics::{
    SSE_CONNECTIONS_ACTIVE, SSE_CONNECTIONS_TOTAL, SSE_DISCONNECTIONS_TOTAL,
};

/// Shortest heartbeat period; a zero interval is raised to this.
pub const MIN_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(1);

/// Registry tuning.
#[derive(Clone, Debug)]
pub struct RegistryConfig {
    /// Interval between heartbeat frames to each client.
    pub heartbeat_interval: Duration,
    /// Per-client frame buffer used by [`ConnectionRegistry::open`].
    pub channel_capacity: usize,
    /// Lifetime dropped frames after which a slow client is detached.
    pub max_dropped_frames: u64,
    /// Attach limit.
    pub max_clients: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(30),
            channel_capacity: 64,
            max_dropped_frames: 100,
            max_clients: 1000,
        }
    }
}

/// The registry already holds `max_clients` entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("registry full ({limit} clients)")]
pub struct RegistryFull {
    /// Configured limit.
    pub limit: usize,
}

/// Owns every attached client.
pub struct ConnectionRegistry {
    pub(super) clients: Mutex<HashMap<ClientId, ClientConnection>>,
    pub(super) config: RegistryConfig,
    /// Parent of every heartbeat token.
    root: CancellationToken,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new(mut config: RegistryConfig) -> Self {
        config.heartbeat_interval = config.heartbeat_interval.max(MIN_HEARTBEAT_INTERVAL);
        config.channel_capacity = config.channel_capacity.max(1);
        Self {
            clients: Mutex::new(HashMap::new()),
            config,
            root: CancellationToken::new(),
        }
    }

    /// Registry configuration.
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Attach a client writing to `transport`.
    ///
    /// The limit check, the `connected` handshake and the insert happen in
    /// one critical section, so the handshake is always the first frame the
    /// client sees and concurrent attaches cannot overshoot `max_clients`.
    /// A heartbeat task is spawned that also watches the transport and
    /// detaches the client when the read side goes away.
    pub fn attach(
        self: &Arc<Self>,
        transport: mpsc::Sender<Arc<str>>,
        subscriptions: HashSet<String>,
    ) -> Result<ClientId, RegistryFull> {
        let id = ClientId::new();
        let heartbeat = self.root.child_token();
        let watcher = transport.clone();
        let mut conn = ClientConnection::new(id.clone(), transport, subscriptions, heartbeat.clone());
        let handshake = match Frame::connected(&id, conn.subscriptions()).to_json() {
            Ok(body) => Arc::<str>::from(body),
            Err(e) => {
                warn!(client_id = %id, error = %e, "failed to serialize handshake");
                heartbeat.cancel();
                return Ok(id);
            }
        };
        let topics = conn.subscriptions().len();

        let total = {
            let mut clients = self.clients.lock();
            if clients.len() >= self.config.max_clients {
                return Err(RegistryFull {
                    limit: self.config.max_clients,
                });
            }
            if conn.send(handshake) != Delivery::Delivered {
                // Transport died before it was ever registered.
                debug!(client_id = %id, "handshake not delivered, dropping client");
                heartbeat.cancel();
                return Ok(id);
            }
            let _ = clients.insert(id.clone(), conn);
            clients.len()
        };
        counter!(SSE_CONNECTIONS_TOTAL).increment(1);
        gauge!(SSE_CONNECTIONS_ACTIVE).set(total as f64);
        info!(client_id = %id, topics, total, "client attached");

        let _ = tokio::spawn(run_heartbeat(
            Arc::downgrade(self),
            id.clone(),
            watcher,
            self.config.heartbeat_interval,
            heartbeat,
        ));

        Ok(id)
    }

    /// Create a transport channel sized from the config and attach it.
    ///
    /// Dropping the returned receiver is the closure signal.
    pub fn open(
        self: &Arc<Self>,
        subscriptions: HashSet<String>,
    ) -> Result<(ClientId, mpsc::Receiver<Arc<str>>), RegistryFull> {
        let (tx, rx) = mpsc::channel(self.config.channel_capacity);
        let id = self.attach(tx, subscriptions)?;
        Ok((id, rx))
    }

    /// Remove a client and cancel its heartbeat.
    ///
    /// Unknown ids are ignored, so closure may be reported any number of
    /// times.
    pub fn detach(&self, id: &ClientId) {
        let removed = self.clients.lock().remove(id);
        if let Some(conn) = removed {
            self.finish_detach(&conn, "detached");
        }
    }

    /// Cancel the heartbeat and record the departure of a removed entry.
    pub(super) fn finish_detach(&self, conn: &ClientConnection, reason: &'static str) {
        conn.cancel_heartbeat();
        counter!(SSE_DISCONNECTIONS_TOTAL).increment(1);
        gauge!(SSE_CONNECTIONS_ACTIVE).set(self.client_count() as f64);
        info!(
            client_id = %conn.id,
            reason,
            age_ms = conn.age().as_millis() as u64,
            dropped = conn.drop_count(),
            "client detached"
        );
    }

    /// Add `topic` to a client's subscriptions.
    ///
    /// Returns `false` when the client is unknown.
    pub fn subscribe(&self, id: &ClientId, topic: &str) -> bool {
        let mut clients = self.clients.lock();
        let Some(conn) = clients.get_mut(id) else {
            return false;
        };
        if conn.subscribe(topic.to_owned()) {
            debug!(client_id = %id, topic, "subscribed");
        }
        true
    }

    /// Remove `topic` from a client's subscriptions.
    ///
    /// Returns `false` when the client is unknown.
    pub fn unsubscribe(&self, id: &ClientId, topic: &str) -> bool {
        let mut clients = self.clients.lock();
        let Some(conn) = clients.get_mut(id) else {
            return false;
        };
        if conn.unsubscribe(topic) {
            debug!(client_id = %id, topic, "unsubscribed");
        }
        true
    }

    /// Whether `id` is currently attached.
    pub fn contains(&self, id: &ClientId) -> bool {
        self.clients.lock().contains_key(id)
    }

    /// Number of attached clients.
    pub fn client_count(&self) -> usize {
        self.clients.lock().len()
    }

    /// Subscriber count per topic, computed from the live entries.
    pub fn subscription_stats(&self) -> BTreeMap<String, usize> {
        let clients = self.clients.lock();
        let mut stats = BTreeMap::new();
        for conn in clients.values() {
            for topic in conn.subscriptions() {
                *stats.entry(topic.clone()).or_insert(0) += 1;
            }
        }
        stats
    }

    /// Detach every client: cancels all heartbeats and drops all transports,
    /// which ends every open event stream.
    pub fn shutdown(&self) {
        let drained: Vec<ClientConnection> = {
            let mut clients = self.clients.lock();
            clients.drain().map(|(_, conn)| conn).collect()
        };
        self.root.cancel();
        for conn in &drained {
            self.finish_detach(conn, "shutdown");
        }
        info!(clients = drained.len(), "registry shut down");
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}
