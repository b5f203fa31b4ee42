//! Service cache - the public surface for binding layers.
//!
//! Composes the registry, coordinator and mutation gateway for one remote
//! service. This is the only place that decides "first subscriber → fetch"
//! and "last subscriber → delete the cache line".

use crate::cache::Outcome;
use crate::config::ServiceConfig;
use crate::coordinator::FetchCoordinator;
use crate::error::Result;
use crate::events::CacheEvent;
use crate::feed::Feed;
use crate::key::{KeyCodec, Namespace, Query};
use crate::mutation::MutationGateway;
use crate::observability::CacheMetrics;
use crate::remote::RemoteService;
use crate::strategy::{FetchTrigger, RefreshScope};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Shared, reference-counted cache for one remote service.
///
/// Cloning is cheap (an `Arc` increment) and every clone sees the same cache,
/// so construct one per remote service handle and pass clones to whatever
/// renders data from that service.
///
/// Subscriptions spawn fetches on the current Tokio runtime.
///
/// # Example
///
/// ```ignore
/// use live_cache::{ServiceCache, remote::InMemoryService};
/// use serde_json::json;
///
/// let todos = ServiceCache::new(InMemoryService::new());
///
/// // Mount: subscribe, then re-read on every change
/// let mut feed = todos.watch_find(&json!({"status": "open"}));
/// feed.changed().await?;
/// let open = feed.read();
///
/// // Write: the open-todos query is re-fetched automatically
/// todos.create(json!({"status": "open", "title": "write docs"})).await?;
///
/// // Unmount: dropping the feed releases the subscription
/// drop(feed);
/// ```
pub struct ServiceCache<S: RemoteService> {
    coordinator: Arc<FetchCoordinator<S>>,
    gateway: MutationGateway<S>,
}

impl<S: RemoteService> Clone for ServiceCache<S> {
    fn clone(&self) -> Self {
        ServiceCache {
            coordinator: Arc::clone(&self.coordinator),
            gateway: self.gateway.clone(),
        }
    }
}

impl<S: RemoteService> ServiceCache<S> {
    /// Create a service cache with the default configuration.
    pub fn new(remote: S) -> Self {
        Self::from_coordinator(FetchCoordinator::new(remote, ServiceConfig::default()))
    }

    /// Create a service cache with custom configuration.
    ///
    /// # Errors
    ///
    /// Returns `Error::ConfigError` if the configuration is invalid.
    pub fn with_config(remote: S, config: ServiceConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::from_coordinator(FetchCoordinator::new(remote, config)))
    }

    /// Create a service cache with custom configuration and metrics.
    ///
    /// # Errors
    ///
    /// Returns `Error::ConfigError` if the configuration is invalid.
    pub fn with_metrics(
        remote: S,
        config: ServiceConfig,
        metrics: Box<dyn CacheMetrics>,
    ) -> Result<Self> {
        config.validate()?;
        let coordinator = FetchCoordinator::new(remote, config).with_metrics(metrics);
        Ok(Self::from_coordinator(coordinator))
    }

    fn from_coordinator(coordinator: FetchCoordinator<S>) -> Self {
        let coordinator = Arc::new(coordinator);
        ServiceCache {
            gateway: MutationGateway::new(Arc::clone(&coordinator)),
            coordinator,
        }
    }

    /// Name of the remote service.
    pub fn name(&self) -> &str {
        &self.coordinator.config().service_name
    }

    // ------------------------------------------------------------------------
    // Subscriptions
    // ------------------------------------------------------------------------

    /// Register interest in a key. Fetches if this is the first subscriber.
    ///
    /// Returns `true` if this call started a fetch (or joined one still in
    /// flight from an earlier subscription).
    pub fn subscribe(&self, namespace: Namespace, key: &str) -> bool {
        let mut ledger = self.coordinator.ledger();
        let first = ledger.registry.subscribe(namespace, key);
        if first {
            self.coordinator
                .launch(&mut ledger, namespace, key, FetchTrigger::FirstSubscriber);
        }
        trace!(
            "subscribe {}:{} -> {} subscribers",
            namespace,
            key,
            ledger.registry.count(namespace, key)
        );
        first
    }

    /// Drop interest in a key. Deletes its cache line if this was the last
    /// subscriber.
    ///
    /// # Errors
    ///
    /// Returns `Error::Underflow` if the key has no subscribers.
    pub fn unsubscribe(&self, namespace: Namespace, key: &str) -> Result<bool> {
        let mut ledger = self.coordinator.ledger();
        let last = ledger.registry.unsubscribe(namespace, key).map_err(|e| {
            error!("{} on service {}", e, self.name());
            e
        })?;
        if last {
            self.coordinator.evict(&mut ledger, namespace, key);
        }
        Ok(last)
    }

    /// Subscribe to a collection query. Returns its cache key.
    pub fn subscribe_find(&self, params: &Query) -> String {
        let key = KeyCodec::encode(params);
        self.subscribe(Namespace::Collection, &key);
        key
    }

    /// Unsubscribe from a collection query.
    ///
    /// # Errors
    ///
    /// Returns `Error::Underflow` if the query has no subscribers.
    pub fn unsubscribe_find(&self, params: &Query) -> Result<bool> {
        self.unsubscribe(Namespace::Collection, &KeyCodec::encode(params))
    }

    /// Subscribe to an entity. Returns its cache key.
    pub fn subscribe_get(&self, id: &S::Id) -> String {
        let key = KeyCodec::encode_id(id);
        self.subscribe(Namespace::Entity, &key);
        key
    }

    /// Unsubscribe from an entity.
    ///
    /// # Errors
    ///
    /// Returns `Error::Underflow` if the entity has no subscribers.
    pub fn unsubscribe_get(&self, id: &S::Id) -> Result<bool> {
        self.unsubscribe(Namespace::Entity, &KeyCodec::encode_id(id))
    }

    /// Subscribe to a collection query for as long as the returned feed lives.
    pub fn watch_find(&self, params: &Query) -> Feed<S> {
        Feed::new(self.clone(), Namespace::Collection, KeyCodec::encode(params))
    }

    /// Subscribe to an entity for as long as the returned feed lives.
    pub fn watch_get(&self, id: &S::Id) -> Feed<S> {
        Feed::new(self.clone(), Namespace::Entity, KeyCodec::encode_id(id))
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    /// Current payload for a key, or `S::Value::default()` if the line is
    /// missing, pending or failed.
    pub fn read(&self, namespace: Namespace, key: &str) -> S::Value {
        self.outcome(namespace, key).into_value_or_default()
    }

    /// Current outcome for a key. A missing line reads as `Pending`.
    pub fn outcome(&self, namespace: Namespace, key: &str) -> Outcome<S::Value> {
        self.coordinator
            .cache()
            .get(namespace, key)
            .unwrap_or(Outcome::Pending)
    }

    /// Current payload for a collection query.
    pub fn find(&self, params: &Query) -> S::Value {
        self.read(Namespace::Collection, &KeyCodec::encode(params))
    }

    /// Current payload for an entity.
    pub fn get(&self, id: &S::Id) -> S::Value {
        self.read(Namespace::Entity, &KeyCodec::encode_id(id))
    }

    /// Number of subscribers for a key.
    pub fn subscriber_count(&self, namespace: Namespace, key: &str) -> usize {
        self.coordinator.ledger().registry.count(namespace, key)
    }

    /// Whether no key has subscribers and no fetch is in flight.
    pub fn is_settled(&self) -> bool {
        self.coordinator.is_settled()
    }

    /// Keys that currently have a cache line.
    pub fn cached_keys(&self, namespace: Namespace) -> Vec<String> {
        self.coordinator.cache().keys(namespace)
    }

    /// Whether a key has a cache line.
    pub fn is_cached(&self, namespace: Namespace, key: &str) -> bool {
        self.coordinator.cache().contains(namespace, key)
    }

    /// Receive an event after every cache write and eviction.
    pub fn changes(&self) -> broadcast::Receiver<CacheEvent> {
        self.coordinator.notifier().subscribe()
    }

    // ------------------------------------------------------------------------
    // Refresh and mutations
    // ------------------------------------------------------------------------

    /// Re-fetch every subscribed key. Returns the number of keys requested.
    pub fn refetch_all(&self) -> usize {
        self.coordinator
            .refresh(RefreshScope::Subscribed, FetchTrigger::Manual)
    }

    /// Create an entity, then refresh.
    ///
    /// # Errors
    ///
    /// Returns the remote error; the cache is not refreshed.
    pub async fn create(&self, data: S::Payload) -> Result<S::Value> {
        self.gateway.create(data).await
    }

    /// Replace an entity, then refresh.
    ///
    /// # Errors
    ///
    /// Returns the remote error; the cache is not refreshed.
    pub async fn update(&self, id: S::Id, data: S::Payload) -> Result<S::Value> {
        self.gateway.update(id, data).await
    }

    /// Merge fields into an entity, then refresh.
    ///
    /// # Errors
    ///
    /// Returns the remote error; the cache is not refreshed.
    pub async fn patch(&self, id: S::Id, data: S::Payload) -> Result<S::Value> {
        self.gateway.patch(id, data).await
    }

    /// Delete an entity, then refresh.
    ///
    /// # Errors
    ///
    /// Returns the remote error; the cache is not refreshed.
    pub async fn remove(&self, id: S::Id) -> Result<S::Value> {
        self.gateway.remove(id).await
    }

    /// The mutation gateway, for callers that only write.
    pub fn mutations(&self) -> &MutationGateway<S> {
        &self.gateway
    }

    /// Wait until no fetch is in flight.
    pub async fn wait_idle(&self) {
        self.coordinator.wait_idle().await
    }

    /// Number of fetches in flight.
    pub fn in_flight(&self) -> usize {
        self.coordinator.in_flight()
    }

    /// The remote service this cache fronts.
    pub fn remote(&self) -> &S {
        self.coordinator.remote()
    }

    /// Get a reference to the underlying coordinator.
    pub fn coordinator(&self) -> &FetchCoordinator<S> {
        &self.coordinator
    }
}
