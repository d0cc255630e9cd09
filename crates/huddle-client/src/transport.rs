//! Event stream transports.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::{Stream, StreamExt};
use huddle_core::{ClientId, topic};
use reqwest::StatusCode;
use reqwest::header::ACCEPT;
use serde_json::json;
use tracing::debug;

use crate::error::ConnectorError;

/// Stream of raw `data` bodies, one per received frame.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<String, ConnectorError>> + Send>>;

/// What a connector asks the server for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectRequest {
    /// Initial subscriptions.
    pub topics: Vec<String>,
    /// Bearer token.
    pub token: String,
}

impl ConnectRequest {
    /// Comma-separated `subscribe` value.
    pub fn subscribe_param(&self) -> String {
        topic::format_topic_list(self.topics.iter().map(String::as_str))
    }
}

/// Opens event streams and manages subscriptions on the server.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a stream. Returns once the server has accepted the request.
    async fn open(&self, request: &ConnectRequest) -> Result<FrameStream, ConnectorError>;

    /// Add a topic to an attached client.
    async fn subscribe(
        &self,
        token: &str,
        client_id: &ClientId,
        topic: &str,
    ) -> Result<(), ConnectorError>;

    /// Remove a topic from an attached client.
    async fn unsubscribe(
        &self,
        token: &str,
        client_id: &ClientId,
        topic: &str,
    ) -> Result<(), ConnectorError>;
}

/// HTTP server-sent-events transport.
#[derive(Clone, Debug)]
pub struct SseTransport {
    http: reqwest::Client,
    base_url: String,
}

impl SseTransport {
    /// Transport for the server at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Result<Self, ConnectorError> {
        // No overall timeout: the event stream is long-lived.
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn change_subscription(
        &self,
        action: &str,
        token: &str,
        client_id: &ClientId,
        topic: &str,
    ) -> Result<(), ConnectorError> {
        let resp = self
            .http
            .post(self.url(&format!("/events/{client_id}/{action}")))
            .bearer_auth(token)
            .json(&json!({ "topic": topic }))
            .send()
            .await?;
        let status = resp.status();
        if status.is_success() {
            debug!(client_id = %client_id, topic, action, "subscription updated");
            Ok(())
        } else {
            Err(ConnectorError::Rejected {
                status: status.as_u16(),
                message: resp.text().await.unwrap_or_default(),
            })
        }
    }
}

#[async_trait]
impl Transport for SseTransport {
    async fn open(&self, request: &ConnectRequest) -> Result<FrameStream, ConnectorError> {
        let resp = self
            .http
            .get(self.url("/events"))
            .query(&[("subscribe", request.subscribe_param())])
            .bearer_auth(&request.token)
            .header(ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(|e| ConnectorError::Open(e.to_string()))?;

        let status = resp.status();
        if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            return Err(ConnectorError::Rejected {
                status: status.as_u16(),
                message: resp.text().await.unwrap_or_default(),
            });
        }
        if !status.is_success() {
            return Err(ConnectorError::Open(format!("server returned {status}")));
        }

        let frames = resp.bytes_stream().eventsource().map(|item| match item {
            Ok(event) => Ok(event.data),
            Err(e) => Err(ConnectorError::Stream(e.to_string())),
        });
        Ok(Box::pin(frames))
    }

    async fn subscribe(
        &self,
        token: &str,
        client_id: &ClientId,
        topic: &str,
    ) -> Result<(), ConnectorError> {
        self.change_subscription("subscribe", token, client_id, topic)
            .await
    }

    async fn unsubscribe(
        &self,
        token: &str,
        client_id: &ClientId,
        topic: &str,
    ) -> Result<(), ConnectorError> {
        self.change_subscription("unsubscribe", token, client_id, topic)
            .await
    }
}
