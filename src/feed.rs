//! Feeds - subscription handles for binding layers.
//!
//! A [`Feed`] is what a rendering component holds while it is mounted: it
//! subscribes on creation, unsubscribes when dropped, reads the current value
//! synchronously and waits for changes to its own cache line.

use crate::cache::Outcome;
use crate::error::{Error, Result};
use crate::events::{CacheEvent, CacheEventKind};
use crate::key::Namespace;
use crate::remote::RemoteService;
use crate::service::ServiceCache;
use futures::stream::{self, Stream};
use tokio::sync::broadcast::{self, error::RecvError};

/// Live view of one cache line.
///
/// # Example
///
/// ```ignore
/// let mut feed = todos.watch_get(&"42".to_string());
/// loop {
///     render(feed.read());
///     feed.changed().await?;
/// }
/// ```
pub struct Feed<S: RemoteService> {
    service: ServiceCache<S>,
    namespace: Namespace,
    key: String,
    events: broadcast::Receiver<CacheEvent>,
}

impl<S: RemoteService> Feed<S> {
    /// Subscribe to `key` for the lifetime of the feed.
    pub(crate) fn new(service: ServiceCache<S>, namespace: Namespace, key: String) -> Self {
        // Listen before subscribing so the first completion is not missed.
        let events = service.changes();
        service.subscribe(namespace, &key);

        Feed {
            service,
            namespace,
            key,
            events,
        }
    }

    pub fn namespace(&self) -> Namespace {
        self.namespace
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Current payload, or the default value if none has arrived yet.
    pub fn read(&self) -> S::Value {
        self.service.read(self.namespace, &self.key)
    }

    /// Current outcome, including fetch errors.
    pub fn outcome(&self) -> Outcome<S::Value> {
        self.service.outcome(self.namespace, &self.key)
    }

    /// Wait for the next change to this feed's cache line.
    ///
    /// If the feed fell behind the event channel, returns `Updated` right
    /// away so the caller re-reads.
    ///
    /// # Errors
    ///
    /// Returns `Error::Other` if the event channel closed.
    pub async fn changed(&mut self) -> Result<CacheEventKind> {
        loop {
            match self.events.recv().await {
                Ok(event) if event.is_for(self.namespace, &self.key) => return Ok(event.kind),
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    debug!(
                        "Feed {}:{} lagged by {} events, re-reading",
                        self.namespace, self.key, skipped
                    );
                    return Ok(CacheEventKind::Updated);
                }
                Err(RecvError::Closed) => {
                    return Err(Error::Other(format!(
                        "change channel closed for {}:{}",
                        self.namespace, self.key
                    )))
                }
            }
        }
    }

    /// Turn the feed into a stream of values, one per change.
    ///
    /// The subscription is released when the stream is dropped.
    pub fn into_stream(self) -> impl Stream<Item = S::Value> {
        stream::unfold(self, |mut feed| async move {
            match feed.changed().await {
                Ok(_) => {
                    let value = feed.read();
                    Some((value, feed))
                }
                Err(_) => None,
            }
        })
    }
}

impl<S: RemoteService> Drop for Feed<S> {
    fn drop(&mut self) {
        if let Err(e) = self.service.unsubscribe(self.namespace, &self.key) {
            error!("Feed released an unknown subscription: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::InMemoryService;
    use futures::StreamExt;
    use serde_json::json;

    fn service() -> ServiceCache<InMemoryService> {
        let remote = InMemoryService::new();
        remote.insert("1", json!({"title": "a"}));
        ServiceCache::new(remote)
    }

    #[tokio::test]
    async fn test_feed_sees_first_result() {
        let service = service();
        let mut feed = service.watch_get(&"1".to_string());

        assert_eq!(feed.changed().await.unwrap(), CacheEventKind::Updated);
        assert_eq!(feed.read(), json!({"id": "1", "title": "a"}));
        assert!(feed.outcome().is_success());
    }

    #[tokio::test]
    async fn test_drop_releases_subscription() {
        let service = service();
        let feed = service.watch_find(&json!({}));
        let key = feed.key().to_string();
        service.wait_idle().await;

        assert_eq!(service.subscriber_count(Namespace::Collection, &key), 1);
        assert!(service.is_cached(Namespace::Collection, &key));

        drop(feed);
        assert_eq!(service.subscriber_count(Namespace::Collection, &key), 0);
        assert!(!service.is_cached(Namespace::Collection, &key));
    }

    #[tokio::test]
    async fn test_feeds_share_one_fetch() {
        let service = service();
        let first = service.watch_get(&"1".to_string());
        let second = service.watch_get(&"1".to_string());
        service.wait_idle().await;

        assert_eq!(service.remote().get_calls(), 1);
        assert_eq!(first.read(), second.read());

        drop(first);
        assert_eq!(second.read(), json!({"id": "1", "title": "a"}));
    }

    #[tokio::test]
    async fn test_stream_yields_after_mutation() {
        let service = service();
        let mut values = Box::pin(service.watch_find(&json!({})).into_stream());

        let initial = values.next().await.unwrap();
        assert_eq!(initial.as_array().map(Vec::len), Some(1));

        service.create(json!({"title": "b"})).await.unwrap();
        let refreshed = values.next().await.unwrap();
        assert_eq!(refreshed.as_array().map(Vec::len), Some(2));
    }
}
