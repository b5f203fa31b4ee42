//! Observability hooks for fetches, evictions and mutations.
//!
//! Implement the `CacheMetrics` trait to feed cache behavior into your
//! monitoring system:
//!
//! ```ignore
//! use live_cache::observability::CacheMetrics;
//! use live_cache::key::Namespace;
//! use std::time::Duration;
//!
//! struct PrometheusMetrics;
//!
//! impl CacheMetrics for PrometheusMetrics {
//!     fn record_fetch(&self, namespace: Namespace, _key: &str, duration: Duration) {
//!         // histogram!("fetch_latency", "namespace" => namespace.to_string()).record(duration);
//!     }
//!     // ... implement other methods
//! }
//!
//! // let cache = ServiceCache::with_metrics(remote, config, Box::new(PrometheusMetrics))?;
//! ```
//!
//! Every method has a default that logs through the `log` crate. The cache
//! uses `NoOpMetrics` unless told otherwise.
//!
//! Callbacks run after the cache's bookkeeping lock is released, so an
//! implementation may call back into the `ServiceCache` it observes.
//!
//! # Metrics Methods
//!
//! - `record_fetch()` - a fetch completed and its outcome was written
//! - `record_fetch_error()` - the remote failed a fetch (outcome is `Failure`)
//! - `record_dropped()` - a fetch completed for a key nobody subscribes to
//! - `record_eviction()` - the last subscriber left and the line was deleted
//! - `record_mutation()` - a write succeeded and triggered a refresh
//! - `record_mutation_error()` - a write failed; nothing was refreshed

use crate::key::Namespace;
use crate::mutation::MutationKind;
use std::time::Duration;

/// Trait for service cache metrics collection.
pub trait CacheMetrics: Send + Sync {
    /// Record a fetch whose outcome was written to the cache.
    fn record_fetch(&self, namespace: Namespace, key: &str, duration: Duration) {
        debug!("Fetch {}:{} took {:?}", namespace, key, duration);
    }

    /// Record a remote failure during a fetch.
    fn record_fetch_error(&self, namespace: Namespace, key: &str, error: &str) {
        warn!("Fetch ERROR for {}:{}: {}", namespace, key, error);
    }

    /// Record a completion that was discarded because the key lost its subscribers.
    fn record_dropped(&self, namespace: Namespace, key: &str) {
        debug!("Fetch DROPPED for {}:{} (no subscribers)", namespace, key);
    }

    /// Record a cache line deleted by the last unsubscribe.
    fn record_eviction(&self, namespace: Namespace, key: &str) {
        debug!("Cache EVICT {}:{}", namespace, key);
    }

    /// Record a successful mutation and the number of fetches it issued.
    fn record_mutation(&self, kind: MutationKind, duration: Duration, refreshed: usize) {
        debug!(
            "Mutation {} took {:?}, refreshing {} keys",
            kind, duration, refreshed
        );
    }

    /// Record a failed mutation.
    fn record_mutation_error(&self, kind: MutationKind, error: &str) {
        warn!("Mutation {} ERROR: {}", kind, error);
    }
}

/// Default metrics implementation (no-op).
#[derive(Clone, Default)]
pub struct NoOpMetrics;

impl CacheMetrics for NoOpMetrics {
    fn record_fetch(&self, _namespace: Namespace, _key: &str, _duration: Duration) {}
    fn record_fetch_error(&self, _namespace: Namespace, _key: &str, _error: &str) {}
    fn record_dropped(&self, _namespace: Namespace, _key: &str) {}
    fn record_eviction(&self, _namespace: Namespace, _key: &str) {}
    fn record_mutation(&self, _kind: MutationKind, _duration: Duration, _refreshed: usize) {}
    fn record_mutation_error(&self, _kind: MutationKind, _error: &str) {}
}

/// Metrics handler that only logs, using the trait defaults.
#[derive(Clone, Default)]
pub struct LogMetrics;

impl CacheMetrics for LogMetrics {}
