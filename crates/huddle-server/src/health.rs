//! `/health` endpoint.

use std::collections::BTreeMap;
use std::time::Instant;

use huddle_core::WILDCARD;
use serde::Serialize;

/// Liveness plus a summary of realtime fan-out.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// `"ok"` while the server is accepting clients.
    pub status: String,
    pub uptime_secs: u64,
    /// Attached realtime clients.
    pub connections: usize,
    /// Distinct topics with at least one subscriber, wildcard excluded.
    pub topics: usize,
    /// Clients subscribed to every topic via `*`.
    pub wildcard_subscribers: usize,
}

/// Summarize registry counters; `subscriptions` is topic -> subscriber count.
pub fn health_check(
    start_time: Instant,
    connections: usize,
    subscriptions: &BTreeMap<String, usize>,
) -> HealthResponse {
    let wildcard_subscribers = subscriptions.get(WILDCARD).copied().unwrap_or(0);
    let topics = subscriptions.keys().filter(|t| t.as_str() != WILDCARD).count();
    HealthResponse {
        status: "ok".into(),
        uptime_secs: start_time.elapsed().as_secs(),
        connections,
        topics,
        wildcard_subscribers,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subs(entries: &[(&str, usize)]) -> BTreeMap<String, usize> {
        entries.iter().map(|(t, n)| ((*t).to_owned(), *n)).collect()
    }

    #[test]
    fn idle_server() {
        let resp = health_check(Instant::now(), 0, &BTreeMap::new());
        assert_eq!(resp.status, "ok");
        assert_eq!(resp.topics, 0);
        assert_eq!(resp.wildcard_subscribers, 0);
        assert!(resp.uptime_secs < 2);
    }

    #[test]
    fn wildcard_is_counted_apart_from_topics() {
        let resp = health_check(
            Instant::now(),
            3,
            &subs(&[("*", 2), ("match:1", 1), ("payments", 3)]),
        );
        assert_eq!(resp.connections, 3);
        assert_eq!(resp.topics, 2);
        assert_eq!(resp.wildcard_subscribers, 2);
    }

    #[test]
    fn serialized_shape() {
        let start = Instant::now()
            .checked_sub(std::time::Duration::from_secs(60))
            .unwrap();
        let parsed = serde_json::to_value(health_check(start, 1, &subs(&[("a", 1)]))).unwrap();
        assert_eq!(parsed["status"], "ok");
        assert_eq!(parsed["connections"], 1);
        assert_eq!(parsed["topics"], 1);
        assert_eq!(parsed["wildcard_subscribers"], 0);
        assert!(parsed["uptime_secs"].as_u64().unwrap() >= 59);
    }
}
