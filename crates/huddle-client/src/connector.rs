//! Reconnecting event stream consumer.
//!
//! One [`Connector`] owns at most one live transport. A background task
//! drives the `connecting → connected → error → connecting` cycle with a
//! fixed delay between attempts; [`Connector::close`] cancels it.

use std::sync::Arc;

use futures::StreamExt;
use huddle_core::{CONNECTED, ClientId, decode_data};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::config::ConnectorConfig;
use crate::error::ConnectorError;
use crate::handler::ConnectorHandler;
use crate::transport::{ConnectRequest, SseTransport, Transport};

/// Connector lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Idle; also the state after `close()`.
    Disconnected,
    /// Opening a transport.
    Connecting,
    /// Transport open, frames flowing.
    Connected,
    /// Connection failed; a reconnect is pending.
    Error,
}

impl ConnectionState {
    /// `connecting` or `connected`.
    pub fn is_live(self) -> bool {
        matches!(self, Self::Connecting | Self::Connected)
    }
}

/// State shared between the connector handle and its driver task.
struct Shared {
    config: ConnectorConfig,
    transport: Arc<dyn Transport>,
    handler: Arc<dyn ConnectorHandler>,
    state: watch::Sender<ConnectionState>,
    client_id: Mutex<Option<ClientId>>,
}

impl Shared {
    /// Publish a state unless the session has been cancelled.
    fn transition(&self, cancel: &CancellationToken, next: ConnectionState) -> bool {
        let _ = self.state.send_if_modified(|state| {
            if cancel.is_cancelled() || *state == next {
                return false;
            }
            *state = next;
            true
        });
        !cancel.is_cancelled()
    }
}

/// One running driver task.
struct Session {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Consumer side of the realtime channel.
pub struct Connector {
    shared: Arc<Shared>,
    session: Mutex<Option<Session>>,
}

impl Connector {
    /// Create an idle connector over `transport`.
    pub fn new(
        config: ConnectorConfig,
        transport: Arc<dyn Transport>,
        handler: Arc<dyn ConnectorHandler>,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            shared: Arc::new(Shared {
                config,
                transport,
                handler,
                state,
                client_id: Mutex::new(None),
            }),
            session: Mutex::new(None),
        }
    }

    /// Create an idle connector speaking SSE to `config.base_url`.
    pub fn sse(
        config: ConnectorConfig,
        handler: Arc<dyn ConnectorHandler>,
    ) -> Result<Self, ConnectorError> {
        let transport = Arc::new(SseTransport::new(config.base_url.clone())?);
        Ok(Self::new(config, transport, handler))
    }

    /// Start connecting.
    ///
    /// Does nothing when disabled or when a transport is already connecting
    /// or connected. Called while a reconnect is pending, it reconnects now.
    /// Fails with [`ConnectorError::MissingToken`] before any network attempt
    /// if no token is configured.
    pub fn connect(&self) -> Result<(), ConnectorError> {
        if !self.shared.config.enabled {
            debug!("realtime disabled, not connecting");
            return Ok(());
        }
        let token = self
            .shared
            .config
            .usable_token()
            .ok_or(ConnectorError::MissingToken)?
            .to_owned();

        let mut session = self.session.lock();
        if self.state().is_live() {
            return Ok(());
        }
        if let Some(pending) = session.take() {
            // Manual reconnect supersedes the pending retry.
            pending.cancel.cancel();
        }

        let cancel = CancellationToken::new();
        let _ = self.shared.transition(&cancel, ConnectionState::Connecting);
        let request = ConnectRequest {
            topics: self.shared.config.topics.clone(),
            token,
        };
        let task = tokio::spawn(drive(
            Arc::clone(&self.shared),
            request,
            cancel.clone(),
        ));
        *session = Some(Session { cancel, task });
        Ok(())
    }

    /// Stop for good: cancel any pending reconnect, then drop the transport.
    ///
    /// Safe to call any number of times.
    pub fn close(&self) {
        let session = self.session.lock().take();
        if let Some(session) = session {
            session.cancel.cancel();
            session.task.abort();
            info!("realtime connector closed");
        }
        *self.shared.client_id.lock() = None;
        let _ = self.shared.state.send_replace(ConnectionState::Disconnected);
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    /// Observe state changes.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    /// Server-assigned id from the latest handshake.
    pub fn client_id(&self) -> Option<ClientId> {
        self.shared.client_id.lock().clone()
    }

    /// Add a topic to the live session.
    pub async fn subscribe(&self, topic: &str) -> Result<(), ConnectorError> {
        let (token, id) = self.session_credentials()?;
        self.shared.transport.subscribe(&token, &id, topic).await
    }

    /// Remove a topic from the live session.
    pub async fn unsubscribe(&self, topic: &str) -> Result<(), ConnectorError> {
        let (token, id) = self.session_credentials()?;
        self.shared.transport.unsubscribe(&token, &id, topic).await
    }

    fn session_credentials(&self) -> Result<(String, ClientId), ConnectorError> {
        let token = self
            .shared
            .config
            .usable_token()
            .ok_or(ConnectorError::MissingToken)?
            .to_owned();
        let id = self.client_id().ok_or(ConnectorError::NotConnected)?;
        Ok((token, id))
    }
}

impl Drop for Connector {
    fn drop(&mut self) {
        if let Some(session) = self.session.get_mut().take() {
            session.cancel.cancel();
            session.task.abort();
        }
    }
}

/// Connect, pump frames, and retry after the fixed delay until cancelled.
async fn drive(shared: Arc<Shared>, request: ConnectRequest, cancel: CancellationToken) {
    let delay = shared.config.reconnect_delay;
    loop {
        if !shared.transition(&cancel, ConnectionState::Connecting) {
            return;
        }
        let error = tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            error = run_session(&shared, &request, &cancel) => error,
        };

        *shared.client_id.lock() = None;
        if !error.is_connection_level() {
            // Rejected credentials will not get better by retrying.
            warn!(error = %error, "realtime connection refused, not retrying");
            shared.handler.on_error(&error);
            let _ = shared.transition(&cancel, ConnectionState::Disconnected);
            return;
        }
        if !shared.transition(&cancel, ConnectionState::Error) {
            return;
        }
        warn!(error = %error, delay_ms = delay.as_millis() as u64, "realtime connection lost, will reconnect");
        shared.handler.on_error(&error);

        tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            () = tokio::time::sleep(delay) => {}
        }
        debug!("reconnecting");
    }
}

/// Run one transport until it fails. Always ends in an error.
async fn run_session(
    shared: &Shared,
    request: &ConnectRequest,
    cancel: &CancellationToken,
) -> ConnectorError {
    let mut frames = match shared.transport.open(request).await {
        Ok(frames) => frames,
        Err(e) => return e,
    };
    if !shared.transition(cancel, ConnectionState::Connected) {
        return ConnectorError::Closed;
    }
    info!(topics = request.topics.len(), "realtime connected");
    shared.handler.on_connect();

    while let Some(item) = frames.next().await {
        let data = match item {
            Ok(data) => data,
            Err(e) => return e,
        };
        match decode_data(&data) {
            Ok(frame) if frame.is_control() => {
                if frame.event_type == CONNECTED {
                    if let Some(id) = frame.client_id() {
                        debug!(client_id = %id, "handshake received");
                        *shared.client_id.lock() = Some(id);
                    }
                } else {
                    trace!("heartbeat");
                }
            }
            Ok(frame) => shared.handler.on_event(frame),
            Err(e) => {
                let error = ConnectorError::from(e);
                warn!(error = %error, "dropping malformed frame");
            }
        }
    }
    ConnectorError::Closed
}
