use sqlx::AnyPool;
use sqlx::any::AnyPoolOptions;
use uuid::Uuid;

use store::kv::{KvStore, ListOptions, PutOptions, Ttl};
use store::{SqlKv, db};

/// Isolated in-memory DB per test.
/// Unique name prevents test interference during parallel execution;
/// `cache=shared` lets all pool connections see the same in-memory DB.
async fn setup_pool() -> AnyPool {
    sqlx::any::install_default_drivers();

    let db_name = Uuid::new_v4().to_string();
    let conn = format!("sqlite:file:{}?mode=memory&cache=shared", db_name);

    let pool = AnyPoolOptions::new()
        .max_connections(5)
        .connect(&conn)
        .await
        .expect("connect sqlite memory db");

    db::migrate(&pool).await.expect("migrate");
    pool
}

#[tokio::test]
async fn put_get_round_trip_with_metadata() {
    let kv = SqlKv::new(setup_pool().await);

    let opts = PutOptions {
        ttl: Some(Ttl::RelativeSeconds(60)),
        metadata: Some(serde_json::json!({"source": "test"})),
    };
    kv.put("session:abc", "payload", opts, 1_000).await.unwrap();

    let entry = kv
        .get_with_metadata("session:abc", 2_000)
        .await
        .unwrap()
        .expect("entry present");

    assert_eq!(entry.value, "payload");
    assert_eq!(entry.metadata.unwrap()["source"], "test");
    assert_eq!(entry.expires_at_ms, Some(61_000));
}

#[tokio::test]
async fn expired_rows_are_invisible_and_purgeable() {
    let kv = SqlKv::new(setup_pool().await);

    kv.put("rate:u1:1", "3", PutOptions::ttl_secs(10), 0)
        .await
        .unwrap();

    assert!(kv.get("rate:u1:1", 9_999).await.unwrap().is_some());
    assert!(kv.get("rate:u1:1", 10_000).await.unwrap().is_none());

    assert_eq!(kv.purge_expired(20_000).await.unwrap(), 1);
}

#[tokio::test]
async fn overwrite_replaces_value_and_ttl() {
    let kv = SqlKv::new(setup_pool().await);

    kv.put("k", "old", PutOptions::ttl_secs(5), 0).await.unwrap();
    kv.put("k", "new", PutOptions::default(), 6_000).await.unwrap();

    // The rewrite removed the ttl, so the entry survives the old expiry.
    assert_eq!(kv.get("k", 100_000).await.unwrap().as_deref(), Some("new"));
}

#[tokio::test]
async fn cas_contention_single_winner() {
    let kv = SqlKv::new(setup_pool().await);
    kv.put("counter", "0", PutOptions::default(), 0).await.unwrap();

    let first = kv
        .compare_and_swap("counter", Some("0"), "1", PutOptions::default(), 0)
        .await
        .unwrap();
    let second = kv
        .compare_and_swap("counter", Some("0"), "1", PutOptions::default(), 0)
        .await
        .unwrap();

    assert!(first);
    assert!(!second, "stale CAS must lose");
    assert_eq!(kv.get("counter", 0).await.unwrap().as_deref(), Some("1"));
}

#[tokio::test]
async fn cas_create_if_absent_respects_expiry() {
    let kv = SqlKv::new(setup_pool().await);

    kv.put("k", "stale", PutOptions::ttl_secs(1), 0).await.unwrap();

    // Entry expired; create-if-absent should win and replace the dead row.
    let applied = kv
        .compare_and_swap("k", None, "fresh", PutOptions::default(), 5_000)
        .await
        .unwrap();

    assert!(applied);
    assert_eq!(kv.get("k", 5_000).await.unwrap().as_deref(), Some("fresh"));
}

#[tokio::test]
async fn list_respects_prefix_and_cursor() {
    let kv = SqlKv::new(setup_pool().await);

    for i in 0..4 {
        kv.put(&format!("opp:active:{i}"), "x", PutOptions::default(), 0)
            .await
            .unwrap();
    }
    kv.put("zzz", "x", PutOptions::default(), 0).await.unwrap();

    let p1 = kv
        .list(
            ListOptions {
                prefix: "opp:active:".into(),
                cursor: None,
                limit: 3,
            },
            0,
        )
        .await
        .unwrap();

    assert_eq!(p1.keys.len(), 3);
    let p2 = kv
        .list(
            ListOptions {
                prefix: "opp:active:".into(),
                cursor: p1.cursor,
                limit: 3,
            },
            0,
        )
        .await
        .unwrap();

    assert_eq!(p2.keys.len(), 1);
    assert!(p2.cursor.is_none());
}

#[tokio::test]
async fn corrupted_json_reads_as_absent() {
    let kv = SqlKv::new(setup_pool().await);

    kv.put("ledger-cache:u:d:c", "{not json", PutOptions::default(), 0)
        .await
        .unwrap();

    let parsed: Option<serde_json::Value> =
        store::kv::get_json(&kv, "ledger-cache:u:d:c", 0).await.unwrap();

    assert!(parsed.is_none());
}
