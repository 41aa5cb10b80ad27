use super::*;
use chrono::{Duration, TimeZone, Utc};
use tempfile::tempdir;

fn author(id: i64) -> CommentAuthor {
    CommentAuthor {
        id,
        name: Some(format!("user{id}")),
        email: Some(format!("user{id}@example.com")),
    }
}

#[tokio::test]
async fn test_sled_comments_are_chronological() {
    let dir = tempdir().unwrap();
    let store = SledStore::open(dir.path().to_str().unwrap()).unwrap();

    let first = store
        .insert_comment(NewComment::new(7, author(1), "first"))
        .unwrap();
    let second = store
        .insert_comment(NewComment::new(7, author(2), "second"))
        .unwrap();
    store
        .insert_comment(NewComment::new(8, author(1), "elsewhere"))
        .unwrap();

    let comments = store.comments(7).await.unwrap();
    assert_eq!(comments, vec![first, second]);
    assert!(comments[0].created_at <= comments[1].created_at);
}

#[tokio::test]
async fn test_sled_unknown_topic_is_empty() {
    let dir = tempdir().unwrap();
    let store = SledStore::open(dir.path().to_str().unwrap()).unwrap();
    assert!(store.comments(404).await.unwrap().is_empty());
    assert_eq!(store.template_stats(404).await.unwrap(), TemplateStats::empty(404));
}

#[tokio::test]
async fn test_sled_stats_follow_rebuild() {
    let dir = tempdir().unwrap();
    let store = SledStore::open(dir.path().to_str().unwrap()).unwrap();

    store
        .insert_comment(NewComment::new(3, author(1), "hello"))
        .unwrap();
    assert!(store.add_like(3, 1).unwrap());
    assert!(!store.add_like(3, 1).unwrap());
    assert!(store.add_like(3, 2).unwrap());
    store.record_answer(3, 2).unwrap();

    // The derived view is only as fresh as its last rebuild.
    assert_eq!(store.template_stats(3).await.unwrap().like_count, 0);

    store.rebuild_derived_view().await.unwrap();
    let stats = store.template_stats(3).await.unwrap();
    assert_eq!(stats.comment_count, 1);
    assert_eq!(stats.like_count, 2);
    assert_eq!(stats.answer_count, 1);
    assert!(stats.last_comment_at.is_some());

    assert!(store.remove_like(3, 2).unwrap());
    assert!(!store.remove_like(3, 2).unwrap());
    store.rebuild_derived_view().await.unwrap();
    assert_eq!(store.template_stats(3).await.unwrap().like_count, 1);
}

#[tokio::test]
async fn test_memory_store_orders_by_created_at() {
    let store = MemoryStore::new();
    let base = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();

    store
        .insert_comment_at(NewComment::new(1, author(1), "late"), base + Duration::minutes(5))
        .unwrap();
    store
        .insert_comment_at(NewComment::new(1, author(2), "early"), base)
        .unwrap();

    let contents: Vec<_> = store
        .comments(1)
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.content)
        .collect();
    assert_eq!(contents, vec!["early", "late"]);
}

#[tokio::test]
async fn test_memory_store_rebuild_replaces_view() {
    let store = MemoryStore::new();
    store.add_like(5, 1).unwrap();
    store.rebuild_derived_view().await.unwrap();
    assert_eq!(store.template_stats(5).await.unwrap().like_count, 1);

    store.remove_like(5, 1).unwrap();
    store.rebuild_derived_view().await.unwrap();
    assert_eq!(store.template_stats(5).await.unwrap().like_count, 0);
}

#[test]
fn test_comment_view_wire_shape() {
    let view = NewComment::new(42, author(9), "hi").into_view(1, Utc.timestamp_opt(0, 0).unwrap());
    let json = serde_json::to_value(&view).unwrap();
    assert_eq!(json["templateId"], 42);
    assert_eq!(json["userId"], 9);
    assert_eq!(json["user"]["email"], "user9@example.com");
    assert!(json.get("createdAt").is_some());
}

#[tokio::test]
async fn test_sled_reads_do_not_create_trees() {
    let dir = tempdir().unwrap();
    let store = SledStore::open(dir.path().to_str().unwrap()).unwrap();
    let before = store.tree_names();

    for topic_id in [999, 1000, 1001] {
        assert!(store.comments(topic_id).await.unwrap().is_empty());
        assert_eq!(
            store.template_stats(topic_id).await.unwrap(),
            TemplateStats::empty(topic_id)
        );
        assert!(!store.remove_like(topic_id, 1).unwrap());
    }
    assert_eq!(store.tree_names(), before);
}

#[tokio::test]
async fn test_sled_rebuild_skips_unknown_topics() {
    let dir = tempdir().unwrap();
    let store = SledStore::open(dir.path().to_str().unwrap()).unwrap();
    store
        .insert_comment(NewComment::new(1, author(1), "real"))
        .unwrap();

    store.comments(999).await.unwrap();
    store.rebuild_derived_view().await.unwrap();

    assert_eq!(store.derived_view_len().unwrap(), 1);
    assert_eq!(store.template_stats(1).await.unwrap().comment_count, 1);
    assert_eq!(
        store.template_stats(999).await.unwrap(),
        TemplateStats::empty(999)
    );
}
