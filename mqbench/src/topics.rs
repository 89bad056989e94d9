//! Mapping of clients onto topics.

/// Topic a publisher sends to: publishers wrap around the topic space.
pub fn publisher_topic(prefix: &str, client: usize, topics: usize) -> String {
    format!("{prefix}{}", client % topics)
}

/// Topic filters for one subscriber.
///
/// With at least as many subscribers as topics, subscriber `n` listens on topic `n % topics`.
/// Otherwise the topics are split into contiguous blocks, e.g. 3 subscribers over 12 topics:
///
/// ```text
/// sub-0: [0, 1, 2, 3]
/// sub-1: [4, 5, 6, 7]
/// sub-2: [8, 9, 10, 11]
/// ```
///
/// When the split is uneven the first `topics % subscribers` subscribers take one extra topic so
/// that every topic has a listener.
pub fn subscriber_topics(
    prefix: &str,
    client: usize,
    subscribers: usize,
    topics: usize,
) -> Vec<String> {
    if subscribers >= topics {
        return vec![publisher_topic(prefix, client, topics)];
    }

    let per_subscriber = topics / subscribers;
    let remainder = topics % subscribers;
    let start = client * per_subscriber + client.min(remainder);
    let len = per_subscriber + usize::from(client < remainder);

    (start..start + len)
        .map(|topic| format!("{prefix}{topic}"))
        .collect()
}
