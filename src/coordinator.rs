//! Fetch coordinator - issues remote fetches and writes their outcomes.
//!
//! All bookkeeping (subscriber counts and the in-flight table) lives in one
//! `Ledger` behind a mutex. Every decision that touches the result cache
//! on behalf of a subscription (writing a completion, deleting a line on the
//! last unsubscribe) is made while that lock is held, so a completion can
//! never interleave with the unsubscribe that orphans it. Fetches themselves
//! run as spawned Tokio tasks with no lock held.
//!
//! # Ordering rules
//!
//! - At most one fetch per `(namespace, key)` is in flight.
//! - A first subscriber arriving while a fetch is in flight joins that fetch.
//! - A refresh arriving while a fetch is in flight schedules exactly one
//!   follow-up fetch, launched when the current one completes.
//! - A completion for a key with no subscribers is dropped.
//! - Cache writes carry a monotonically increasing sequence number and older
//!   sequences never overwrite newer ones.
//! - Every flight ends exactly once: a remote call that panics is recorded as
//!   a `TransportError`, and a task dropped by its runtime releases its key.
//!
//! Metrics callbacks and task spawns never run with the ledger locked; they
//! are buffered and run when the lock is released, so a `CacheMetrics`
//! implementation may call back into the cache.

use crate::cache::{Outcome, ResultCache};
use crate::config::ServiceConfig;
use crate::error::{Error, Result};
use crate::events::{CacheEvent, ChangeNotifier};
use crate::key::{KeyCodec, Namespace, Query};
use crate::observability::{CacheMetrics, NoOpMetrics};
use crate::registry::SubscriptionRegistry;
use crate::remote::RemoteService;
use crate::strategy::{FetchTrigger, RefreshScope};
use futures::FutureExt;
use std::any::Any;
use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::watch;

/// A fetch currently running for one key.
#[derive(Debug)]
struct InFlight {
    seq: u64,
    rerun: bool,
}

/// A metrics call deferred until the ledger is unlocked.
#[derive(Debug)]
enum Report {
    Fetch(Namespace, String, Duration),
    FetchError(Namespace, String, String),
    Dropped(Namespace, String),
    Eviction(Namespace, String),
}

impl Report {
    fn record(self, metrics: &dyn CacheMetrics) {
        match self {
            Report::Fetch(namespace, key, elapsed) => metrics.record_fetch(namespace, &key, elapsed),
            Report::FetchError(namespace, key, error) => {
                metrics.record_fetch_error(namespace, &key, &error)
            }
            Report::Dropped(namespace, key) => metrics.record_dropped(namespace, &key),
            Report::Eviction(namespace, key) => metrics.record_eviction(namespace, &key),
        }
    }
}

type Spawn = Box<dyn FnOnce() + Send>;

/// Subscription counts and in-flight fetches, guarded together.
#[derive(Default)]
pub(crate) struct Ledger {
    pub(crate) registry: SubscriptionRegistry,
    in_flight: HashMap<(Namespace, String), InFlight>,
    next_seq: u64,
    reports: Vec<Report>,
    spawns: Vec<Spawn>,
}

impl Ledger {
    fn in_flight_keys(&self, namespace: Namespace) -> Vec<String> {
        self.in_flight
            .keys()
            .filter(|(ns, _)| *ns == namespace)
            .map(|(_, key)| key.clone())
            .collect()
    }

    fn next_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    fn report(&mut self, report: Report) {
        self.reports.push(report);
    }
}

/// Locked ledger. Buffered metrics and spawns run after the lock is released.
pub(crate) struct LedgerGuard<'a> {
    // Field order matters: the mutex guard drops before the deferred work runs.
    ledger: MutexGuard<'a, Ledger>,
    deferred: Deferred<'a>,
}

struct Deferred<'a> {
    metrics: &'a dyn CacheMetrics,
    reports: Vec<Report>,
    spawns: Vec<Spawn>,
}

impl Deref for LedgerGuard<'_> {
    type Target = Ledger;

    fn deref(&self) -> &Ledger {
        &self.ledger
    }
}

impl DerefMut for LedgerGuard<'_> {
    fn deref_mut(&mut self) -> &mut Ledger {
        &mut self.ledger
    }
}

impl Drop for LedgerGuard<'_> {
    fn drop(&mut self) {
        self.deferred.reports = std::mem::take(&mut self.ledger.reports);
        self.deferred.spawns = std::mem::take(&mut self.ledger.spawns);
    }
}

impl Drop for Deferred<'_> {
    fn drop(&mut self) {
        for report in self.reports.drain(..) {
            report.record(self.metrics);
        }
        for spawn in self.spawns.drain(..) {
            spawn();
        }
    }
}

/// Decoded arguments for the remote call.
enum Request<I> {
    Find(Query),
    Get(I),
}

/// Issues fetches, tracks them, and writes their outcomes into the cache.
pub struct FetchCoordinator<S: RemoteService> {
    remote: S,
    cache: ResultCache<S::Value>,
    ledger: Mutex<Ledger>,
    notifier: ChangeNotifier,
    idle: watch::Sender<usize>,
    metrics: Box<dyn CacheMetrics>,
    config: ServiceConfig,
}

impl<S: RemoteService> FetchCoordinator<S> {
    /// Create a coordinator for `remote`.
    ///
    /// The configuration is not validated here; a zero event buffer is
    /// raised to one.
    pub fn new(remote: S, config: ServiceConfig) -> Self {
        let (idle, _) = watch::channel(0);

        FetchCoordinator {
            remote,
            cache: ResultCache::new(),
            ledger: Mutex::new(Ledger::default()),
            notifier: ChangeNotifier::new(config.event_buffer.max(1)),
            idle,
            metrics: Box::new(NoOpMetrics),
            config,
        }
    }

    /// Set custom metrics handler.
    pub fn with_metrics(mut self, metrics: Box<dyn CacheMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn remote(&self) -> &S {
        &self.remote
    }

    pub fn cache(&self) -> &ResultCache<S::Value> {
        &self.cache
    }

    pub fn notifier(&self) -> &ChangeNotifier {
        &self.notifier
    }

    pub fn metrics(&self) -> &dyn CacheMetrics {
        self.metrics.as_ref()
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Lock the bookkeeping.
    ///
    /// The critical sections never panic midway, so a poisoned lock still
    /// holds consistent state and is recovered.
    pub(crate) fn ledger(&self) -> LedgerGuard<'_> {
        LedgerGuard {
            ledger: self.ledger.lock().unwrap_or_else(PoisonError::into_inner),
            deferred: Deferred {
                metrics: self.metrics.as_ref(),
                reports: Vec::new(),
                spawns: Vec::new(),
            },
        }
    }

    /// Whether no key has subscribers and no fetch is running.
    pub fn is_settled(&self) -> bool {
        let ledger = self.ledger();
        ledger.registry.is_empty() && ledger.in_flight.is_empty()
    }

    /// Number of fetches currently running.
    pub fn in_flight(&self) -> usize {
        *self.idle.borrow()
    }

    /// Wait until no fetch is running.
    pub async fn wait_idle(&self) {
        let mut receiver = self.idle.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = receiver.wait_for(|running| *running == 0).await;
    }

    /// Fetch a collection query unless one is already in flight.
    pub fn fetch_collection(self: &Arc<Self>, key: &str, trigger: FetchTrigger) {
        let mut ledger = self.ledger();
        self.launch(&mut ledger, Namespace::Collection, key, trigger);
    }

    /// Fetch an entity unless a fetch for it is already in flight.
    pub fn fetch_entity(self: &Arc<Self>, id: &S::Id, trigger: FetchTrigger) {
        let key = KeyCodec::encode_id(id);
        let mut ledger = self.ledger();
        self.launch(&mut ledger, Namespace::Entity, &key, trigger);
    }

    /// Re-fetch every key in `scope`, in both namespaces.
    ///
    /// Returns the number of keys a fetch was requested for.
    pub fn refresh(self: &Arc<Self>, scope: RefreshScope, trigger: FetchTrigger) -> usize {
        let mut ledger = self.ledger();
        let mut requested = 0;

        for namespace in Namespace::ALL {
            let mut keys = match scope {
                RefreshScope::AllCached => {
                    let mut keys = self.cache.keys(namespace);
                    keys.extend(ledger.in_flight_keys(namespace));
                    keys
                }
                RefreshScope::Subscribed => ledger.registry.keys(namespace),
            };
            keys.sort();
            keys.dedup();

            for key in keys {
                self.launch(&mut ledger, namespace, &key, trigger);
                requested += 1;
            }
        }

        debug!(
            "» Refresh ({}, {}) requested {} fetches",
            scope, trigger, requested
        );
        requested
    }

    /// Start a fetch for `key` unless one is already running.
    ///
    /// Must be called with the ledger locked; the caller passes the guard in.
    pub(crate) fn launch(
        self: &Arc<Self>,
        ledger: &mut Ledger,
        namespace: Namespace,
        key: &str,
        trigger: FetchTrigger,
    ) {
        if let Some(flight) = ledger.in_flight.get_mut(&(namespace, key.to_string())) {
            if trigger.supersedes_in_flight() {
                flight.rerun = true;
            }
            debug!(
                "Fetch {}:{} already in flight (seq {}), {} joins it",
                namespace, key, flight.seq, trigger
            );
            return;
        }

        let seq = ledger.next_seq();

        let request = match self.decode(namespace, key) {
            Ok(request) => request,
            Err(e) => {
                ledger.report(Report::FetchError(namespace, key.to_string(), e.to_string()));
                self.write(ledger, namespace, key, Outcome::Failure(e), seq);
                return;
            }
        };

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                let error = Error::ConfigError(format!(
                    "fetch for {}:{} launched outside of a Tokio runtime: {}",
                    namespace, key, e
                ));
                error!("{}", error);
                self.write(ledger, namespace, key, Outcome::Failure(error), seq);
                return;
            }
        };

        ledger.in_flight.insert(
            (namespace, key.to_string()),
            InFlight { seq, rerun: false },
        );
        self.idle.send_modify(|running| *running += 1);

        debug!(
            "» Fetch {}:{} (seq {}, trigger: {}) on {}",
            namespace, key, seq, trigger, self.config.service_name
        );

        let flight = FlightGuard {
            coordinator: Arc::clone(self),
            namespace,
            key: key.to_string(),
            seq,
            finished: false,
        };
        let task = async move {
            let timer = Instant::now();
            let remote = &flight.coordinator.remote;
            let call = async move {
                match request {
                    Request::Find(params) => remote.find(params).await,
                    Request::Get(id) => remote.get(id).await,
                }
            };
            let result = AssertUnwindSafe(call)
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| {
                    Err(Error::TransportError(format!(
                        "remote call panicked: {}",
                        panic_message(panic.as_ref())
                    )))
                });
            flight.finish(result, timer);
        };
        // A runtime that is shutting down drops the task inside `spawn`, which
        // runs the flight guard; that must not happen under the ledger lock.
        ledger.spawns.push(Box::new(move || {
            runtime.spawn(task);
        }));
    }

    fn decode(&self, namespace: Namespace, key: &str) -> Result<Request<S::Id>> {
        match namespace {
            Namespace::Collection => KeyCodec::decode(key).map(Request::Find),
            Namespace::Entity => KeyCodec::decode_id::<S::Id>(key).map(Request::Get),
        }
    }

    /// Completion handler for a spawned fetch.
    fn complete(
        self: &Arc<Self>,
        namespace: Namespace,
        key: &str,
        seq: u64,
        result: Result<S::Value>,
        timer: Instant,
    ) {
        let mut ledger = self.ledger();
        let rerun = ledger
            .in_flight
            .remove(&(namespace, key.to_string()))
            .map(|flight| flight.rerun)
            .unwrap_or(false);

        if ledger.registry.is_subscribed(namespace, key) {
            let report = match &result {
                Ok(_) => Report::Fetch(namespace, key.to_string(), timer.elapsed()),
                Err(e) => {
                    warn!("✗ Fetch {}:{} failed: {}", namespace, key, e);
                    Report::FetchError(namespace, key.to_string(), e.to_string())
                }
            };
            ledger.report(report);
            self.write(&mut ledger, namespace, key, result.into(), seq);

            if rerun {
                debug!("Fetch {}:{} was superseded, fetching again", namespace, key);
                self.launch(&mut ledger, namespace, key, FetchTrigger::Refresh);
            }
        } else {
            ledger.report(Report::Dropped(namespace, key.to_string()));
            debug!(
                "✗ Fetch {}:{} completed with no subscribers, dropped",
                namespace, key
            );
        }

        drop(ledger);
        self.idle
            .send_modify(|running| *running = running.saturating_sub(1));
    }

    /// Release a flight whose task ended without a result.
    fn abandon(&self, namespace: Namespace, key: &str, seq: u64) {
        let mut ledger = self.ledger();
        let flight = (namespace, key.to_string());

        if ledger.in_flight.get(&flight).map(|f| f.seq) == Some(seq) {
            ledger.in_flight.remove(&flight);
            let error =
                Error::TransportError(format!("fetch for {}:{} was cancelled", namespace, key));
            warn!("✗ {}", error);
            if ledger.registry.is_subscribed(namespace, key) {
                let message = error.to_string();
                ledger.report(Report::FetchError(namespace, key.to_string(), message));
            }
            self.write(&mut ledger, namespace, key, Outcome::Failure(error), seq);
        }

        drop(ledger);
        self.idle
            .send_modify(|running| *running = running.saturating_sub(1));
    }

    /// Write an outcome for a subscribed key and notify.
    fn write(
        &self,
        ledger: &mut Ledger,
        namespace: Namespace,
        key: &str,
        outcome: Outcome<S::Value>,
        seq: u64,
    ) {
        if !ledger.registry.is_subscribed(namespace, key) {
            return;
        }
        if self.cache.store(namespace, key, outcome, seq) {
            self.notifier.notify(CacheEvent::updated(namespace, key));
        }
    }

    /// Delete the line for a key that just lost its last subscriber.
    ///
    /// Called with the ledger locked. A fetch still in flight keeps running;
    /// its completion is dropped.
    pub(crate) fn evict(&self, ledger: &mut Ledger, namespace: Namespace, key: &str) {
        if self.cache.delete(namespace, key) {
            ledger.report(Report::Eviction(namespace, key.to_string()));
            self.notifier.notify(CacheEvent::evicted(namespace, key));
        }
    }
}

/// Ends a spawned flight exactly once.
///
/// If the task is dropped before the remote call returns (runtime shutdown,
/// abort), the guard releases the in-flight marker and the idle count.
struct FlightGuard<S: RemoteService> {
    coordinator: Arc<FetchCoordinator<S>>,
    namespace: Namespace,
    key: String,
    seq: u64,
    finished: bool,
}

impl<S: RemoteService> FlightGuard<S> {
    fn finish(mut self, result: Result<S::Value>, timer: Instant) {
        self.finished = true;
        self.coordinator
            .complete(self.namespace, &self.key, self.seq, result, timer);
    }
}

impl<S: RemoteService> Drop for FlightGuard<S> {
    fn drop(&mut self) {
        if !self.finished {
            self.coordinator.abandon(self.namespace, &self.key, self.seq);
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
