//! Server error types.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Errors surfaced by the realtime HTTP server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Binding the listener failed.
    #[error("failed to bind listener: {0}")]
    Bind(#[source] std::io::Error),

    /// The accept loop failed.
    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),

    /// No credential was presented.
    #[error("missing auth token")]
    MissingToken,

    /// The credential was rejected by the validator.
    #[error("invalid auth token")]
    Unauthorized,

    /// The server is at its connection limit.
    #[error("connection limit reached ({0})")]
    TooManyConnections(usize),

    /// No attached client has this id.
    #[error("unknown client: {0}")]
    UnknownClient(String),

    /// A subscription request named an empty topic.
    #[error("topic must not be empty")]
    InvalidTopic,
}

impl ServerError {
    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Bind(_) | Self::Serve(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::MissingToken | Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::TooManyConnections(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::UnknownClient(_) => StatusCode::NOT_FOUND,
            Self::InvalidTopic => StatusCode::BAD_REQUEST,
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Bind(_) | Self::Serve(_) => "INTERNAL_ERROR",
            Self::MissingToken => "MISSING_TOKEN",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::TooManyConnections(_) => "TOO_MANY_CONNECTIONS",
            Self::UnknownClient(_) => "UNKNOWN_CLIENT",
            Self::InvalidTopic => "INVALID_TOPIC",
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.code(),
            "message": self.to_string(),
        }));
        (self.status(), body).into_response()
    }
}
