//! Tests for `src/contacts/kv.rs` — key-value backends.

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

use safesearch::contacts::kv::{KeyValueStore, MemoryKeyValueStore, SqliteKeyValueStore};

async fn sqlite_store() -> SqliteKeyValueStore {
    let opts = SqliteConnectOptions::new()
        .filename(":memory:")
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(opts)
        .await
        .expect("pool should connect");
    SqliteKeyValueStore::with_pool(pool)
        .await
        .expect("schema should apply")
}

#[tokio::test]
async fn memory_store_missing_key_is_none() {
    let kv = MemoryKeyValueStore::new();
    let value = kv.get("absent").await.expect("get should succeed");
    assert!(value.is_none());
}

#[tokio::test]
async fn memory_store_overwrites() {
    let kv = MemoryKeyValueStore::new();
    kv.set("k", "one").await.expect("set should succeed");
    kv.set("k", "two").await.expect("set should succeed");
    assert_eq!(
        kv.get("k").await.expect("get should succeed").as_deref(),
        Some("two")
    );
}

#[tokio::test]
async fn sqlite_store_upserts() {
    let kv = sqlite_store().await;
    assert!(kv.get("k").await.expect("get should succeed").is_none());

    kv.set("k", "[]").await.expect("insert should succeed");
    kv.set("k", "[1]").await.expect("update should succeed");

    assert_eq!(
        kv.get("k").await.expect("get should succeed").as_deref(),
        Some("[1]")
    );
}

#[tokio::test]
async fn sqlite_store_persists_across_reopen() {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let path = dir.path().join("kv.db");

    {
        let kv = SqliteKeyValueStore::open(&path)
            .await
            .expect("open should succeed");
        kv.set("@contacts", "[]").await.expect("set should succeed");
        kv.pool().close().await;
    }

    let kv = SqliteKeyValueStore::open(&path)
        .await
        .expect("reopen should succeed");
    assert_eq!(
        kv.get("@contacts").await.expect("get should succeed").as_deref(),
        Some("[]")
    );
}
