use super::*;
use serde_json::json;

fn cache() -> TtlCache {
    TtlCache::new(Duration::from_secs(60))
}

#[tokio::test(start_paused = true)]
async fn test_set_then_get() {
    let cache = cache();
    cache.set("latest-templates", json!({"templates": []}));
    assert_eq!(cache.get("latest-templates"), Some(json!({"templates": []})));
    assert_eq!(cache.get("missing"), None);
}

#[tokio::test(start_paused = true)]
async fn test_expired_entry_is_a_miss_before_sweep() {
    let cache = cache();
    cache.set("k", json!(1));

    tokio::time::advance(Duration::from_secs(59)).await;
    assert_eq!(cache.get("k"), Some(json!(1)));

    tokio::time::advance(Duration::from_secs(1)).await;
    assert_eq!(cache.get("k"), None);
    assert!(cache.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_per_entry_ttl() {
    let cache = cache();
    cache.set_with_ttl("tags", json!(["a"]), Duration::from_secs(300));
    cache.set("short", json!(0));

    tokio::time::advance(Duration::from_secs(120)).await;
    assert_eq!(cache.get("tags"), Some(json!(["a"])));
    assert_eq!(cache.get("short"), None);
}

#[tokio::test(start_paused = true)]
async fn test_del_and_flush_all() {
    let cache = cache();
    cache.set("a", json!(1));
    cache.set("b", json!(2));
    cache.set("c", json!(3));

    assert!(cache.del("a"));
    assert!(!cache.del("a"));
    assert_eq!(cache.len(), 2);

    cache.flush_all();
    assert!(cache.is_empty());
    assert_eq!(cache.get("b"), None);
}

#[tokio::test(start_paused = true)]
async fn test_purge_expired_counts() {
    let cache = cache();
    cache.set("old", json!(1));
    tokio::time::advance(Duration::from_secs(30)).await;
    cache.set("new", json!(2));
    tokio::time::advance(Duration::from_secs(31)).await;

    assert_eq!(cache.len(), 2);
    assert_eq!(cache.purge_expired(), 1);
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.get("new"), Some(json!(2)));
}

#[tokio::test(start_paused = true)]
async fn test_sweeper_removes_expired_entries() {
    let cache = Arc::new(cache());
    let cancel = CancellationToken::new();
    let sweeper = cache.spawn_sweeper(Duration::from_secs(120), cancel.clone());

    cache.set("k", json!("v"));
    assert_eq!(cache.len(), 1);

    tokio::time::sleep(Duration::from_secs(121)).await;
    assert_eq!(cache.len(), 0);

    cancel.cancel();
    sweeper.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_sweeper_with_zero_period_still_sweeps() {
    let cache = Arc::new(cache());
    let cancel = CancellationToken::new();
    let sweeper = cache.spawn_sweeper(Duration::ZERO, cancel.clone());

    cache.set("k", json!("v"));
    tokio::time::sleep(Duration::from_secs(61)).await;
    assert_eq!(cache.len(), 0);

    cancel.cancel();
    sweeper.await.unwrap();
}
