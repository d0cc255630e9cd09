//! HTTP handlers for the realtime surface.

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use futures::StreamExt;
use huddle_core::{ClientId, topic};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

use crate::auth::bearer_token;
use crate::error::ServerError;
use crate::health::{self, HealthResponse};
use crate::realtime::ConnectionRegistry;
use crate::server::AppState;

/// Query string of `GET /events`.
#[derive(Debug, Default, Deserialize)]
pub struct EventsQuery {
    /// Comma-separated topics.
    #[serde(default)]
    pub subscribe: Option<String>,
    /// Token, when the client cannot set headers.
    #[serde(default)]
    pub token: Option<String>,
}

/// Body of the subscription endpoints.
#[derive(Debug, Deserialize)]
pub struct TopicRequest {
    /// Topic to add or remove.
    pub topic: String,
}

/// Body of `GET /events/stats`.
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    /// Attached clients.
    pub clients: usize,
    /// Subscribers per topic.
    pub topics: BTreeMap<String, usize>,
}

/// Detaches its client when the response body is dropped.
struct DetachGuard {
    registry: Arc<ConnectionRegistry>,
    id: ClientId,
}

impl Drop for DetachGuard {
    fn drop(&mut self) {
        debug!(client_id = %self.id, "event stream dropped");
        self.registry.detach(&self.id);
    }
}

async fn authorize(state: &AppState, token: Option<&str>) -> Result<(), ServerError> {
    let token = token.ok_or(ServerError::MissingToken)?;
    if state.validator.validate(token).await {
        Ok(())
    } else {
        warn!("rejected realtime credential");
        Err(ServerError::Unauthorized)
    }
}

/// `GET /events`: attach a client and stream its frames.
pub async fn events(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
    headers: HeaderMap,
) -> Result<Response, ServerError> {
    let token = query
        .token
        .as_deref()
        .filter(|t| !t.is_empty())
        .or_else(|| bearer_token(&headers));
    authorize(&state, token).await?;

    let subscriptions = query
        .subscribe
        .as_deref()
        .map(topic::parse_topic_list)
        .unwrap_or_default();
    let (id, rx) = state.registry.open(subscriptions).map_err(|full| {
        warn!(limit = full.limit, "connection limit reached");
        ServerError::TooManyConnections(full.limit)
    })?;

    let guard = DetachGuard {
        registry: Arc::clone(&state.registry),
        id,
    };
    let stream = ReceiverStream::new(rx).map(move |body| {
        let _guard = &guard;
        Ok::<_, Infallible>(Event::default().data(&*body))
    });

    Ok(([("x-accel-buffering", "no")], Sse::new(stream)).into_response())
}

/// `POST /events/{client_id}/subscribe`
pub async fn subscribe(
    State(state): State<AppState>,
    Path(client_id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<TopicRequest>,
) -> Result<Json<Value>, ServerError> {
    change_subscription(&state, &client_id, &headers, &req.topic, true).await
}

/// `POST /events/{client_id}/unsubscribe`
pub async fn unsubscribe(
    State(state): State<AppState>,
    Path(client_id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<TopicRequest>,
) -> Result<Json<Value>, ServerError> {
    change_subscription(&state, &client_id, &headers, &req.topic, false).await
}

async fn change_subscription(
    state: &AppState,
    client_id: &str,
    headers: &HeaderMap,
    topic_name: &str,
    add: bool,
) -> Result<Json<Value>, ServerError> {
    authorize(state, bearer_token(headers)).await?;

    let topic_name = topic_name.trim();
    if topic_name.is_empty() {
        return Err(ServerError::InvalidTopic);
    }
    let id = ClientId::from(client_id);
    let known = if add {
        state.registry.subscribe(&id, topic_name)
    } else {
        state.registry.unsubscribe(&id, topic_name)
    };
    if !known {
        return Err(ServerError::UnknownClient(client_id.to_owned()));
    }
    Ok(Json(json!({
        "clientId": client_id,
        "topic": topic_name,
        "subscribed": add,
    })))
}

/// `GET /events/stats`
pub async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse {
        clients: state.registry.client_count(),
        topics: state.registry.subscription_stats(),
    })
}

/// `GET /health`
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.registry.client_count(),
        &state.registry.subscription_stats(),
    ))
}

/// `GET /metrics`
pub async fn metrics(State(state): State<AppState>) -> String {
    state
        .metrics
        .as_ref()
        .map(metrics_exporter_prometheus::PrometheusHandle::render)
        .unwrap_or_default()
}
