//! Change notification for binding layers.
//!
//! Every write to the result cache emits a [`CacheEvent`] on a broadcast
//! channel. Binding layers subscribe with [`ChangeNotifier::subscribe`] (or
//! through [`ServiceCache::changes`](crate::ServiceCache::changes)) and re-read
//! the keys they care about.

use crate::key::Namespace;
use tokio::sync::broadcast;

/// Default capacity of the change channel.
pub const DEFAULT_EVENT_BUFFER: usize = 256;

/// What happened to a cache line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheEventKind {
    /// A fetch completed and its outcome was written.
    Updated,
    /// The last subscriber left and the line was deleted.
    Evicted,
}

/// A change to one cache line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheEvent {
    pub namespace: Namespace,
    pub key: String,
    pub kind: CacheEventKind,
}

impl CacheEvent {
    pub fn updated(namespace: Namespace, key: &str) -> Self {
        CacheEvent {
            namespace,
            key: key.to_string(),
            kind: CacheEventKind::Updated,
        }
    }

    pub fn evicted(namespace: Namespace, key: &str) -> Self {
        CacheEvent {
            namespace,
            key: key.to_string(),
            kind: CacheEventKind::Evicted,
        }
    }

    /// Whether this event concerns the given line.
    pub fn is_for(&self, namespace: Namespace, key: &str) -> bool {
        self.namespace == namespace && self.key == key
    }
}

/// Broadcaster for cache events.
pub struct ChangeNotifier {
    sender: broadcast::Sender<CacheEvent>,
}

impl ChangeNotifier {
    /// Create a notifier with the given channel capacity (must be non-zero).
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        ChangeNotifier { sender }
    }

    /// Subscribe to cache events.
    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.sender.subscribe()
    }

    /// Number of active receivers.
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Emit an event to all receivers.
    pub fn notify(&self, event: CacheEvent) {
        // No receivers just means nobody is rendering right now.
        match self.sender.send(event) {
            Ok(count) => trace!("cache event sent to {} receivers", count),
            Err(_) => trace!("cache event dropped (no receivers)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notifier_delivers_events() {
        let notifier = ChangeNotifier::new(8);
        let mut receiver = notifier.subscribe();

        notifier.notify(CacheEvent::updated(Namespace::Collection, "{}"));
        notifier.notify(CacheEvent::evicted(Namespace::Entity, "1"));

        let first = receiver.try_recv().unwrap();
        assert_eq!(first.kind, CacheEventKind::Updated);
        assert!(first.is_for(Namespace::Collection, "{}"));

        let second = receiver.try_recv().unwrap();
        assert_eq!(second, CacheEvent::evicted(Namespace::Entity, "1"));
    }

    #[test]
    fn test_notify_without_receivers_is_ok() {
        let notifier = ChangeNotifier::new(8);
        assert_eq!(notifier.receiver_count(), 0);
        notifier.notify(CacheEvent::updated(Namespace::Entity, "1"));
    }
}
