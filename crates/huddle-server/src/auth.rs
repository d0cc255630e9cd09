//! Credential validation for realtime connections.

use std::collections::HashSet;

use async_trait::async_trait;
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;

/// Decides whether a bearer token may open or modify a realtime session.
#[async_trait]
pub trait TokenValidator: Send + Sync {
    /// Returns `true` when `token` is accepted.
    async fn validate(&self, token: &str) -> bool;
}

/// Accepts tokens from a fixed list. An empty list rejects everything.
#[derive(Debug, Clone, Default)]
pub struct AllowListValidator {
    tokens: HashSet<String>,
}

impl AllowListValidator {
    /// Build from the configured tokens; blank entries are ignored.
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tokens = tokens
            .into_iter()
            .map(Into::into)
            .filter(|t: &String| !t.trim().is_empty())
            .collect();
        Self { tokens }
    }

    /// Number of accepted tokens.
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Whether no token is accepted.
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[async_trait]
impl TokenValidator for AllowListValidator {
    async fn validate(&self, token: &str) -> bool {
        self.tokens.contains(token)
    }
}

/// Extract the token from an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}
