//! Ordering tests for fetches that overlap subscription changes and writes.
//!
//! `GatedService` holds every `find` until the test releases it, so the
//! interleavings below are deterministic.

use live_cache::remote::InMemoryService;
use live_cache::{Error, Namespace, Outcome, Query, RemoteService, Result, ServiceCache};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

/// Remote whose queries block on a semaphore.
///
/// `find` snapshots the current version before waiting, the way a real
/// request observes the server state at the moment it is sent.
struct GatedService {
    gate: Semaphore,
    finds: AtomicUsize,
    version: AtomicU64,
}

impl GatedService {
    fn new() -> Self {
        GatedService {
            gate: Semaphore::new(0),
            finds: AtomicUsize::new(0),
            version: AtomicU64::new(0),
        }
    }

    fn release(&self, fetches: usize) {
        self.gate.add_permits(fetches);
    }

    fn finds(&self) -> usize {
        self.finds.load(Ordering::SeqCst)
    }
}

impl RemoteService for GatedService {
    type Id = String;
    type Value = Value;
    type Payload = Value;

    async fn find(&self, _params: Query) -> Result<Value> {
        self.finds.fetch_add(1, Ordering::SeqCst);
        let version = self.version.load(Ordering::SeqCst);
        if let Ok(permit) = self.gate.acquire().await {
            permit.forget();
        }
        Ok(json!({"version": version}))
    }

    async fn get(&self, id: String) -> Result<Value> {
        Ok(json!({"id": id}))
    }

    async fn create(&self, data: Value) -> Result<Value> {
        self.version.fetch_add(1, Ordering::SeqCst);
        Ok(data)
    }

    async fn update(&self, _id: String, data: Value) -> Result<Value> {
        self.version.fetch_add(1, Ordering::SeqCst);
        Ok(data)
    }

    async fn patch(&self, _id: String, data: Value) -> Result<Value> {
        self.version.fetch_add(1, Ordering::SeqCst);
        Ok(data)
    }

    async fn remove(&self, id: String) -> Result<Value> {
        self.version.fetch_add(1, Ordering::SeqCst);
        Ok(json!({"id": id}))
    }
}

/// Remote whose first query panics mid-request.
struct FlakyService {
    finds: AtomicUsize,
}

impl RemoteService for FlakyService {
    type Id = String;
    type Value = Value;
    type Payload = Value;

    async fn find(&self, _params: Query) -> Result<Value> {
        let attempt = self.finds.fetch_add(1, Ordering::SeqCst);
        if attempt == 0 {
            panic!("connection reset");
        }
        Ok(json!({"attempt": attempt}))
    }

    async fn get(&self, id: String) -> Result<Value> {
        Ok(json!({"id": id}))
    }

    async fn create(&self, data: Value) -> Result<Value> {
        Ok(data)
    }

    async fn update(&self, _id: String, data: Value) -> Result<Value> {
        Ok(data)
    }

    async fn patch(&self, _id: String, data: Value) -> Result<Value> {
        Ok(data)
    }

    async fn remove(&self, id: String) -> Result<Value> {
        Ok(json!({"id": id}))
    }
}

fn gated() -> ServiceCache<GatedService> {
    let _ = env_logger::builder().is_test(true).try_init();
    ServiceCache::new(GatedService::new())
}

/// Let spawned fetches run until `count` queries have been sent.
async fn sent(service: &ServiceCache<GatedService>, count: usize) {
    while service.remote().finds() < count {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn test_resubscribe_joins_in_flight_fetch() {
    let service = gated();
    let params = json!({});

    let key = service.subscribe_find(&params);
    sent(&service, 1).await;

    assert!(service.unsubscribe_find(&params).unwrap());
    service.subscribe_find(&params);
    assert_eq!(service.in_flight(), 1);

    service.remote().release(1);
    service.wait_idle().await;

    assert_eq!(service.remote().finds(), 1);
    assert_eq!(service.subscriber_count(Namespace::Collection, &key), 1);
    assert_eq!(service.find(&params), json!({"version": 0}));
}

#[tokio::test]
async fn test_orphaned_completion_is_dropped() {
    let service = gated();
    let params = json!({"done": false});

    let key = service.subscribe_find(&params);
    sent(&service, 1).await;
    service.unsubscribe_find(&params).unwrap();

    service.remote().release(1);
    service.wait_idle().await;

    assert!(!service.is_cached(Namespace::Collection, &key));
    assert_eq!(service.subscriber_count(Namespace::Collection, &key), 0);
}

#[tokio::test]
async fn test_resubscribe_after_orphan_fetches_again() {
    let service = gated();
    let params = json!({});

    service.subscribe_find(&params);
    sent(&service, 1).await;
    service.unsubscribe_find(&params).unwrap();
    service.remote().release(1);
    service.wait_idle().await;

    let key = service.subscribe_find(&params);
    service.remote().release(1);
    service.wait_idle().await;

    assert_eq!(service.remote().finds(), 2);
    assert!(service.outcome(Namespace::Collection, &key).is_success());
}

#[tokio::test]
async fn test_write_during_fetch_is_observed() {
    let service = gated();
    let params = json!({});

    service.subscribe_find(&params);
    sent(&service, 1).await;

    // The in-flight query already saw version 0.
    service.create(json!({"title": "a"})).await.unwrap();
    assert_eq!(service.in_flight(), 1);

    service.remote().release(2);
    service.wait_idle().await;

    assert_eq!(service.remote().finds(), 2);
    assert_eq!(service.find(&params), json!({"version": 1}));
}

#[tokio::test]
async fn test_many_writes_during_fetch_rerun_once() {
    let service = gated();
    let params = json!({});

    service.subscribe_find(&params);
    sent(&service, 1).await;

    for i in 0..5 {
        service.patch(i.to_string(), json!({})).await.unwrap();
    }

    service.remote().release(2);
    service.wait_idle().await;

    assert_eq!(service.remote().finds(), 2);
    assert_eq!(service.find(&params), json!({"version": 5}));
}

#[tokio::test]
async fn test_panicking_fetch_settles_and_retries() {
    let _ = env_logger::builder().is_test(true).try_init();
    let service = ServiceCache::new(FlakyService {
        finds: AtomicUsize::new(0),
    });
    let params = json!({});

    let key = service.subscribe_find(&params);
    service.unsubscribe_find(&params).unwrap();
    service.subscribe_find(&params);
    tokio::time::timeout(Duration::from_secs(5), service.wait_idle())
        .await
        .expect("a panicking fetch must still end its flight");

    assert_eq!(service.in_flight(), 0);
    match service.outcome(Namespace::Collection, &key) {
        Outcome::Failure(Error::TransportError(message)) => {
            assert!(message.contains("connection reset"), "unexpected message: {}", message)
        }
        other => panic!("expected a transport failure, got {:?}", other),
    }

    assert_eq!(service.refetch_all(), 1);
    tokio::time::timeout(Duration::from_secs(5), service.wait_idle())
        .await
        .expect("retry should complete");

    assert_eq!(service.remote().finds.load(Ordering::SeqCst), 2);
    assert_eq!(service.find(&params), json!({"attempt": 1}));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_churn_leaves_nothing_behind() {
    let _ = env_logger::builder().is_test(true).try_init();
    let remote = InMemoryService::new().with_latency(Duration::from_millis(1));
    for i in 0..4 {
        remote.insert(i.to_string(), json!({"n": i}));
    }
    let service = ServiceCache::new(remote);
    let rounds = Arc::new(AtomicUsize::new(0));

    let mut tasks = Vec::new();
    for worker in 0..8usize {
        let service = service.clone();
        let rounds = Arc::clone(&rounds);
        tasks.push(tokio::spawn(async move {
            for round in 0..50usize {
                let id = ((worker + round) % 4).to_string();
                let params = json!({"n": (worker * round) % 3});

                let entity = service.watch_get(&id);
                service.subscribe_find(&params);
                if round % 7 == 0 {
                    tokio::time::sleep(Duration::from_millis(2)).await;
                } else {
                    tokio::task::yield_now().await;
                }
                let _ = entity.read();
                service.unsubscribe_find(&params).unwrap();
                drop(entity);
                rounds.fetch_add(1, Ordering::SeqCst);
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }
    service.wait_idle().await;

    assert_eq!(rounds.load(Ordering::SeqCst), 400);
    assert!(service.cached_keys(Namespace::Collection).is_empty());
    assert!(service.cached_keys(Namespace::Entity).is_empty());
    assert!(service.is_settled());
}
