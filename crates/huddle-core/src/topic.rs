//! Topic matching.
//!
//! A topic is only a routing key. A client receives a broadcast on `topic`
//! when its subscription set contains that exact string or the wildcard.

use std::collections::{BTreeSet, HashSet};

/// Reserved topic that matches every broadcast.
pub const WILDCARD: &str = "*";

/// Whether a subscription set should receive an event published on `topic`.
pub fn matches(subscriptions: &HashSet<String>, topic: &str) -> bool {
    subscriptions.contains(topic) || subscriptions.contains(WILDCARD)
}

/// Parse a comma-separated `subscribe` parameter.
///
/// Entries are trimmed; empty entries are dropped. Duplicates collapse.
pub fn parse_topic_list(raw: &str) -> HashSet<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Render topics as a `subscribe` parameter (sorted for stable URLs).
pub fn format_topic_list<'a, I>(topics: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let sorted: BTreeSet<&str> = topics.into_iter().collect();
    sorted.into_iter().collect::<Vec<_>>().join(",")
}
