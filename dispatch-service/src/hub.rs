use std::collections::HashMap;

use dashmap::DashMap;
use shared::{Delta, Topic};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

pub type ConnectionId = Uuid;

/// Maintains the live set of subscriber connections per topic and fans
/// deltas out to them.
///
/// Each connection gets one unbounded outbox; the transport's write half
/// drains it. Sends never block, so a slow subscriber cannot delay others,
/// and each outbox is FIFO, so a connection observes every topic's deltas
/// in publish order. A send into a closed outbox counts as a delivery
/// failure: it is logged, the connection is pruned, and remaining
/// subscribers are unaffected.
pub struct BroadcastHub {
    connections: DashMap<ConnectionId, mpsc::UnboundedSender<Delta>>,
    topics: DashMap<Topic, HashMap<ConnectionId, mpsc::UnboundedSender<Delta>>>,
}

impl BroadcastHub {
    pub fn new() -> Self {
        BroadcastHub {
            connections: DashMap::new(),
            topics: DashMap::new(),
        }
    }

    /// Registers a connection and hands back its delta stream.
    pub fn connect(&self) -> (ConnectionId, mpsc::UnboundedReceiver<Delta>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.connections.insert(id, tx);
        (id, rx)
    }

    /// Registers interest in a topic. Re-subscribing is a no-op; returns
    /// false when the connection is already gone.
    pub fn subscribe(&self, conn: ConnectionId, topic: Topic) -> bool {
        let Some(tx) = self.connections.get(&conn) else {
            return false;
        };
        self.topics
            .entry(topic)
            .or_default()
            .insert(conn, tx.clone());
        true
    }

    pub fn unsubscribe(&self, conn: ConnectionId, topic: Topic) {
        if let Some(mut subscribers) = self.topics.get_mut(&topic) {
            subscribers.remove(&conn);
        }
    }

    /// Drops every topic membership of the connection. No delivery toward
    /// it is attempted afterwards.
    pub fn disconnect(&self, conn: ConnectionId) {
        self.connections.remove(&conn);
        for mut entry in self.topics.iter_mut() {
            entry.value_mut().remove(&conn);
        }
    }

    /// Delivers the delta to every subscriber of its topic, independently
    /// per connection. Returns the number of successful handoffs.
    pub fn publish(&self, delta: Delta) -> usize {
        let mut delivered = 0;
        let mut dead = Vec::new();
        if let Some(subscribers) = self.topics.get(&delta.topic) {
            for (conn, tx) in subscribers.iter() {
                if tx.send(delta.clone()).is_ok() {
                    delivered += 1;
                } else {
                    dead.push(*conn);
                }
            }
        }
        // Guard dropped above; pruning may lock other shards.
        for conn in dead {
            warn!("delivery to {} failed on {}, dropping connection", conn, delta.topic);
            self.disconnect(conn);
        }
        debug!("published {} to {} subscribers", delta.topic, delivered);
        delivered
    }

    #[cfg(test)]
    fn subscriber_count(&self, topic: Topic) -> usize {
        self.topics.get(&topic).map(|s| s.len()).unwrap_or(0)
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::EntityKind;
    use serde_json::json;

    fn delta(topic: Topic, id: i64) -> Delta {
        Delta::partial(topic, EntityKind::Order, json!({ "id": id }))
    }

    #[tokio::test]
    async fn per_topic_order_is_preserved_per_connection() {
        let hub = BroadcastHub::new();
        let (conn, mut rx) = hub.connect();
        hub.subscribe(conn, Topic::Orders);

        for id in 1..=5 {
            hub.publish(delta(Topic::Orders, id));
        }

        for expected in 1..=5 {
            let got = rx.recv().await.unwrap();
            assert_eq!(got.delta, Some(json!({ "id": expected })));
        }
    }

    #[tokio::test]
    async fn broken_subscriber_does_not_affect_others() {
        let hub = BroadcastHub::new();
        let (healthy, mut healthy_rx) = hub.connect();
        let (broken, broken_rx) = hub.connect();
        hub.subscribe(healthy, Topic::Orders);
        hub.subscribe(broken, Topic::Orders);
        drop(broken_rx);

        let delivered = hub.publish(delta(Topic::Orders, 1));
        assert_eq!(delivered, 1);
        assert!(healthy_rx.recv().await.is_some());

        // The dead connection was pruned from the topic.
        assert_eq!(hub.subscriber_count(Topic::Orders), 1);
        assert!(!hub.subscribe(broken, Topic::Orders));
    }

    #[tokio::test]
    async fn resubscribing_is_a_no_op() {
        let hub = BroadcastHub::new();
        let (conn, mut rx) = hub.connect();
        assert!(hub.subscribe(conn, Topic::Orders));
        assert!(hub.subscribe(conn, Topic::Orders));

        hub.publish(delta(Topic::Orders, 1));
        assert!(rx.recv().await.is_some());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn disconnect_drops_all_memberships() {
        let hub = BroadcastHub::new();
        let (conn, mut rx) = hub.connect();
        hub.subscribe(conn, Topic::Orders);
        hub.subscribe(conn, Topic::AdminNotifications);

        hub.disconnect(conn);
        assert_eq!(hub.publish(delta(Topic::Orders, 1)), 0);
        assert_eq!(hub.publish(delta(Topic::AdminNotifications, 2)), 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn topics_are_independent() {
        let hub = BroadcastHub::new();
        let (orders_conn, mut orders_rx) = hub.connect();
        let (feed_conn, mut feed_rx) = hub.connect();
        hub.subscribe(orders_conn, Topic::Orders);
        hub.subscribe(feed_conn, Topic::SpecialistFeed(7));

        hub.publish(delta(Topic::Orders, 1));
        assert!(orders_rx.recv().await.is_some());
        assert!(feed_rx.try_recv().is_err());
    }
}
