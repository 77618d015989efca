//! Change notification hub
//!
//! Ping long-polls suspend on a subscription here; whatever ingests mail
//! publishes (principal, collection) change events. Also tracks one
//! cancellation token per (principal, device) so a later Ping from the same
//! device can cancel a suspended one.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

use tracing::debug;

struct Subscriber {
    principal_id: i64,
    collections: Vec<String>,
    tx: async_channel::Sender<String>,
}

/// In-process publish/subscribe for mailbox changes
pub struct ChangeHub {
    subscribers: Mutex<Vec<Subscriber>>,
    ping_tokens: Mutex<HashMap<(i64, String), Arc<Notify>>>,
}

impl ChangeHub {
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            ping_tokens: Mutex::new(HashMap::new()),
        }
    }

    /// Subscribe to changes in any of the named collections. The receiver
    /// yields the collection id that changed; dropping it unsubscribes.
    pub fn subscribe(&self, principal_id: i64, collections: &[String]) -> async_channel::Receiver<String> {
        let (tx, rx) = async_channel::bounded(16);
        self.subscribers.lock().unwrap().push(Subscriber {
            principal_id,
            collections: collections.to_vec(),
            tx,
        });
        rx
    }

    /// Notify subscribers that a collection changed
    pub fn publish(&self, principal_id: i64, collection_id: &str) {
        let mut subscribers = self.subscribers.lock().unwrap();
        subscribers.retain(|sub| {
            if sub.tx.is_closed() {
                return false;
            }
            if sub.principal_id == principal_id
                && sub.collections.iter().any(|c| c == collection_id)
            {
                // A full channel already carries an unread wakeup
                let _ = sub.tx.try_send(collection_id.to_string());
            }
            true
        });
        debug!(principal_id, collection_id, "published store change");
    }

    /// Register a Ping for (principal, device), cancelling any Ping that is
    /// still suspended for the same device. Returns the cancellation token
    /// the new Ping should select on.
    pub fn register_ping(&self, principal_id: i64, device_id: &str) -> Arc<Notify> {
        let token = Arc::new(Notify::new());
        let previous = self
            .ping_tokens
            .lock()
            .unwrap()
            .insert((principal_id, device_id.to_string()), token.clone());
        if let Some(previous) = previous {
            previous.notify_waiters();
            debug!(principal_id, device_id, "cancelled suspended ping");
        }
        token
    }

    /// Drop the registration when a Ping completes, unless a newer Ping
    /// already replaced it.
    pub fn deregister_ping(&self, principal_id: i64, device_id: &str, token: &Arc<Notify>) {
        let mut tokens = self.ping_tokens.lock().unwrap();
        let key = (principal_id, device_id.to_string());
        if tokens.get(&key).is_some_and(|current| Arc::ptr_eq(current, token)) {
            tokens.remove(&key);
        }
    }
}

impl Default for ChangeHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribe_receives_matching_publish() {
        let hub = ChangeHub::new();
        let rx = hub.subscribe(1, &["1".to_string(), "4".to_string()]);
        hub.publish(1, "1");
        assert_eq!(rx.recv().await.unwrap(), "1");
    }

    #[tokio::test]
    async fn test_publish_filters_principal_and_collection() {
        let hub = ChangeHub::new();
        let rx = hub.subscribe(1, &["1".to_string()]);
        hub.publish(2, "1"); // other mailbox
        hub.publish(1, "4"); // other collection
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_dropped_subscriber_is_pruned() {
        let hub = ChangeHub::new();
        let rx = hub.subscribe(1, &["1".to_string()]);
        drop(rx);
        hub.publish(1, "1");
        assert!(hub.subscribers.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_new_ping_cancels_previous() {
        let hub = ChangeHub::new();
        let first = hub.register_ping(1, "DEV1");
        let mut cancelled = std::pin::pin!(first.notified());
        cancelled.as_mut().enable();

        let _second = hub.register_ping(1, "DEV1");
        // The first token was signalled
        tokio::time::timeout(std::time::Duration::from_millis(50), cancelled)
            .await
            .expect("first ping should be cancelled");
    }

    #[tokio::test]
    async fn test_deregister_only_removes_own_token() {
        let hub = ChangeHub::new();
        let first = hub.register_ping(1, "DEV1");
        let second = hub.register_ping(1, "DEV1");
        // A completed first ping must not evict the second's registration
        hub.deregister_ping(1, "DEV1", &first);
        assert!(hub.ping_tokens.lock().unwrap().contains_key(&(1, "DEV1".to_string())));
        hub.deregister_ping(1, "DEV1", &second);
        assert!(hub.ping_tokens.lock().unwrap().is_empty());
    }
}
