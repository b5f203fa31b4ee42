//! Basic usage example of the live cache.

use live_cache::{
    error::Result, observability::LogMetrics, remote::InMemoryService, Namespace, ServiceCache,
    ServiceConfig,
};
use serde_json::json;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Debug)
        .try_init()
        .ok();

    println!("\n=== Live Cache - Basic Example ===\n");

    // 1. Initialize the remote service and its cache
    println!("1. Initializing the todo service...");
    let remote = InMemoryService::new().with_latency(Duration::from_millis(50));
    remote.insert("1", json!({"title": "write docs", "status": "open"}));
    remote.insert("2", json!({"title": "fix bug", "status": "open"}));
    remote.insert("3", json!({"title": "release", "status": "done"}));

    let config = ServiceConfig::default().with_name("todos");
    let todos = ServiceCache::with_metrics(remote, config, Box::new(LogMetrics))?;
    println!("   ✓ Cache for '{}' ready\n", todos.name());

    // 2. A component mounts and watches the open todos
    println!("2. Watching open todos:");
    let open_query = json!({"status": "open"});
    let mut open = todos.watch_find(&open_query);
    println!("   Before the fetch lands: {}", open.read());
    open.changed().await?;
    println!("   ✓ Open todos: {}\n", open.read());

    // 3. A second component shares the same line
    println!("3. Second watcher on the same query:");
    let sidebar = todos.watch_find(&json!({"status": "open"}));
    println!(
        "   ✓ {} subscribers, {} remote queries so far\n",
        todos.subscriber_count(Namespace::Collection, sidebar.key()),
        todos.remote().find_calls()
    );

    // 4. Watch one entity, including one that does not exist
    println!("4. Watching single todos:");
    let mut first = todos.watch_get(&"1".to_string());
    let missing = todos.watch_get(&"42".to_string());
    first.changed().await?;
    todos.wait_idle().await;
    println!("   ✓ Todo 1: {}", first.read());
    println!("   ✓ Todo 42 reads as {} ({:?})\n", missing.read(), missing.outcome());

    // 5. Create a todo; every cached line is refreshed
    println!("5. Creating a todo:");
    let created = todos
        .create(json!({"title": "review PR", "status": "open"}))
        .await?;
    println!("   ✓ Created {}", created);
    open.changed().await?;
    println!("   ✓ Open todos now: {}\n", open.read());

    // 6. A failed write refreshes nothing
    println!("6. Patching a todo that does not exist:");
    match todos.patch("99".to_string(), json!({"status": "done"})).await {
        Ok(_) => println!("   ✗ Unexpected success\n"),
        Err(e) => println!("   ✓ Rejected: {}\n", e),
    }

    // 7. Components unmount; their lines are evicted
    println!("7. Unmounting everything:");
    drop(open);
    drop(sidebar);
    drop(first);
    drop(missing);
    todos.wait_idle().await;
    println!(
        "   ✓ Cached queries: {}, cached entities: {}\n",
        todos.cached_keys(Namespace::Collection).len(),
        todos.cached_keys(Namespace::Entity).len()
    );

    println!("=== Example Complete ===\n");

    Ok(())
}
