//! Registry of live outbound links with topic fan-out.

use std::collections::{HashMap, HashSet};

use crate::{ConnectionId, Outbound};

/// Every attached connection, plus which topics each one follows.
///
/// Owned by the reactor; not thread-safe and not meant to be.
#[derive(Debug, Default)]
pub struct Hub {
    links: HashMap<ConnectionId, Outbound>,
    topics: HashMap<String, HashSet<ConnectionId>>,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a link. Replaces any previous link with the same id.
    pub fn attach(&mut self, link: Outbound) {
        self.links.insert(link.id(), link);
    }

    /// Removes a link and all of its subscriptions.
    pub fn detach(&mut self, id: ConnectionId) -> Option<Outbound> {
        let link = self.links.remove(&id)?;
        self.topics.retain(|_, subscribers| {
            subscribers.remove(&id);
            !subscribers.is_empty()
        });
        Some(link)
    }

    pub fn is_attached(&self, id: ConnectionId) -> bool {
        self.links.contains_key(&id)
    }

    /// Sends to one connection. Returns `false` if it is unknown or gone.
    pub fn send(&self, id: ConnectionId, data: Vec<u8>) -> bool {
        match self.links.get(&id) {
            Some(link) => link.send(data),
            None => false,
        }
    }

    /// Closes a connection after its queued frames and detaches it.
    pub fn close(&mut self, id: ConnectionId) {
        if let Some(link) = self.detach(id) {
            link.close();
        }
    }

    /// Subscribes an attached connection to `topic`.
    pub fn subscribe(&mut self, id: ConnectionId, topic: &str) -> bool {
        if !self.links.contains_key(&id) {
            return false;
        }
        self.topics.entry(topic.to_string()).or_default().insert(id)
    }

    pub fn unsubscribe(&mut self, id: ConnectionId, topic: &str) -> bool {
        let Some(subscribers) = self.topics.get_mut(topic) else {
            return false;
        };
        let removed = subscribers.remove(&id);
        if subscribers.is_empty() {
            self.topics.remove(topic);
        }
        removed
    }

    /// Sends `data` to every subscriber of `topic`. Returns how many links
    /// accepted it.
    pub fn publish(&self, topic: &str, data: &[u8]) -> usize {
        let Some(subscribers) = self.topics.get(topic) else {
            return 0;
        };
        subscribers
            .iter()
            .filter_map(|id| self.links.get(id))
            .filter(|link| link.send(data.to_vec()))
            .count()
    }

    pub fn subscribers(&self, topic: &str) -> usize {
        self.topics.get(topic).map_or(0, HashSet::len)
    }

    pub fn is_subscribed(&self, id: ConnectionId, topic: &str) -> bool {
        self.topics.get(topic).is_some_and(|s| s.contains(&id))
    }

    /// Number of attached connections.
    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::OutboundReceiver;

    fn attach(hub: &mut Hub, n: u64) -> (ConnectionId, OutboundReceiver) {
        let id = ConnectionId::new(n);
        let (link, rx) = Outbound::channel(id);
        hub.attach(link);
        (id, rx)
    }

    #[test]
    fn test_send_reaches_only_target() {
        let mut hub = Hub::new();
        let (a, mut rx_a) = attach(&mut hub, 1);
        let (_b, mut rx_b) = attach(&mut hub, 2);

        assert!(hub.send(a, b"hi".to_vec()));
        assert_eq!(rx_a.drain(), vec![b"hi".to_vec()]);
        assert!(rx_b.drain().is_empty());
    }

    #[test]
    fn test_send_unknown_connection_returns_false() {
        let hub = Hub::new();
        assert!(!hub.send(ConnectionId::new(9), b"x".to_vec()));
    }

    #[test]
    fn test_publish_fans_out_to_subscribers() {
        let mut hub = Hub::new();
        let (a, mut rx_a) = attach(&mut hub, 1);
        let (b, mut rx_b) = attach(&mut hub, 2);
        let (_c, mut rx_c) = attach(&mut hub, 3);

        assert!(hub.subscribe(a, "17"));
        assert!(hub.subscribe(b, "17"));
        assert_eq!(hub.subscribers("17"), 2);

        assert_eq!(hub.publish("17", b"move"), 2);
        assert_eq!(rx_a.drain().len(), 1);
        assert_eq!(rx_b.drain().len(), 1);
        assert!(rx_c.drain().is_empty());
    }

    #[test]
    fn test_subscribe_requires_attached_link() {
        let mut hub = Hub::new();
        assert!(!hub.subscribe(ConnectionId::new(5), "1"));
        assert_eq!(hub.subscribers("1"), 0);
    }

    #[test]
    fn test_detach_drops_subscriptions() {
        let mut hub = Hub::new();
        let (a, _rx) = attach(&mut hub, 1);
        hub.subscribe(a, "4");
        hub.subscribe(a, "5");

        assert!(hub.detach(a).is_some());
        assert_eq!(hub.subscribers("4"), 0);
        assert_eq!(hub.subscribers("5"), 0);
        assert!(hub.is_empty());
    }

    #[test]
    fn test_unsubscribe_keeps_other_subscribers() {
        let mut hub = Hub::new();
        let (a, _ra) = attach(&mut hub, 1);
        let (b, _rb) = attach(&mut hub, 2);
        hub.subscribe(a, "8");
        hub.subscribe(b, "8");

        assert!(hub.unsubscribe(a, "8"));
        assert!(!hub.unsubscribe(a, "8"));
        assert!(hub.is_subscribed(b, "8"));
        assert_eq!(hub.subscribers("8"), 1);
    }

    #[test]
    fn test_close_sends_close_frame_and_detaches() {
        let mut hub = Hub::new();
        let (a, mut rx) = attach(&mut hub, 1);
        hub.close(a);
        assert!(!hub.is_attached(a));
        assert_eq!(rx.try_recv(), Some(crate::Frame::Close));
    }
}
