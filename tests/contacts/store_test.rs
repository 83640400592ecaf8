//! Tests for `src/contacts/store.rs` — persistence and the writer actor.

use std::sync::Arc;

use chrono::Utc;

use safesearch::contacts::kv::{KeyValueStore, MemoryKeyValueStore};
use safesearch::contacts::store::ContactStore;
use safesearch::contacts::{ContactError, ContactPatch, HistoryEntry, HistoryKind, NewContact};

const KEY: &str = "@test_contacts";

fn new_contact(name: &str, phone: &str) -> NewContact {
    NewContact {
        name: name.to_owned(),
        phone: phone.to_owned(),
        ..NewContact::default()
    }
}

fn sms_entry(text: &str) -> HistoryEntry {
    HistoryEntry {
        timestamp: Utc::now(),
        delivered: true,
        kind: HistoryKind::Sms {
            message: text.to_owned(),
        },
    }
}

fn setup() -> (Arc<MemoryKeyValueStore>, ContactStore) {
    let kv = Arc::new(MemoryKeyValueStore::new());
    let store = ContactStore::new(Arc::clone(&kv) as Arc<dyn KeyValueStore>, KEY);
    (kv, store)
}

#[tokio::test]
async fn empty_store_lists_nothing() {
    let (_kv, store) = setup();
    let contacts = store.list().await.expect("list should succeed");
    assert!(contacts.is_empty());
}

#[tokio::test]
async fn create_assigns_id_and_empty_history() {
    let (_kv, store) = setup();
    let contact = store
        .create(new_contact("  Alice ", "+1 (555) 123-4567"))
        .await
        .expect("create should succeed");

    assert!(!contact.id.is_empty());
    assert_eq!(contact.name, "Alice");
    assert!(contact.history.is_empty());
    assert!(contact.updated_at.is_none());

    let listed = store.list().await.expect("list should succeed");
    assert_eq!(listed, vec![contact]);
}

#[tokio::test]
async fn create_rejects_invalid_fields() {
    let (_kv, store) = setup();

    let blank = store.create(new_contact("  ", "5551234567")).await;
    assert!(matches!(blank, Err(ContactError::Invalid(_))));

    let bad_phone = store.create(new_contact("Bob", "0123")).await;
    assert!(matches!(bad_phone, Err(ContactError::Invalid(_))));

    assert!(store.list().await.expect("list should succeed").is_empty());
}

#[tokio::test]
async fn list_preserves_insertion_order() {
    let (_kv, store) = setup();
    for name in ["A", "B", "C"] {
        store
            .create(new_contact(name, "5551234567"))
            .await
            .expect("create should succeed");
    }
    let names: Vec<String> = store
        .list()
        .await
        .expect("list should succeed")
        .into_iter()
        .map(|c| c.name)
        .collect();
    assert_eq!(names, ["A", "B", "C"]);
}

#[tokio::test]
async fn update_changes_only_given_fields() {
    let (_kv, store) = setup();
    let created = store
        .create(NewContact {
            name: "Alice".to_owned(),
            phone: "5551234567".to_owned(),
            relationship: Some("sister".to_owned()),
            ..NewContact::default()
        })
        .await
        .expect("create should succeed");

    let updated = store
        .update(
            &created.id,
            ContactPatch {
                phone: Some("5559876543".to_owned()),
                ..ContactPatch::default()
            },
        )
        .await
        .expect("update should succeed");

    assert_eq!(updated.id, created.id);
    assert_eq!(updated.name, "Alice");
    assert_eq!(updated.phone, "5559876543");
    assert_eq!(updated.relationship.as_deref(), Some("sister"));
    assert!(updated.updated_at.is_some());
}

#[tokio::test]
async fn update_unknown_id_is_not_found() {
    let (_kv, store) = setup();
    let result = store
        .update(
            "missing",
            ContactPatch {
                name: Some("X".to_owned()),
                ..ContactPatch::default()
            },
        )
        .await;
    assert!(matches!(result, Err(ContactError::NotFound(id)) if id == "missing"));
}

#[tokio::test]
async fn delete_removes_contact() {
    let (_kv, store) = setup();
    let a = store
        .create(new_contact("A", "5551234567"))
        .await
        .expect("create should succeed");
    let b = store
        .create(new_contact("B", "5557654321"))
        .await
        .expect("create should succeed");

    assert!(store.delete(&a.id).await.expect("delete should succeed"));
    assert!(!store.delete(&a.id).await.expect("second delete should succeed"));

    let listed = store.list().await.expect("list should succeed");
    assert_eq!(listed, vec![b]);
}

#[tokio::test]
async fn append_history_prepends_newest_first() {
    let (_kv, store) = setup();
    let contact = store
        .create(new_contact("A", "5551234567"))
        .await
        .expect("create should succeed");

    store
        .append_history(&contact.id, sms_entry("first"))
        .await
        .expect("append should succeed");
    store
        .append_history(&contact.id, sms_entry("second"))
        .await
        .expect("append should succeed");

    let stored = store
        .get(&contact.id)
        .await
        .expect("get should succeed")
        .expect("contact should exist");
    let messages: Vec<&str> = stored
        .history
        .iter()
        .filter_map(|e| match &e.kind {
            HistoryKind::Sms { message } => Some(message.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(messages, ["second", "first"]);
}

#[tokio::test]
async fn append_history_unknown_id_leaves_collection_untouched() {
    let (kv, store) = setup();
    store
        .create(new_contact("A", "5551234567"))
        .await
        .expect("create should succeed");
    let before = kv.get(KEY).await.expect("get should succeed");

    let result = store.append_history("missing", sms_entry("x")).await;
    assert!(matches!(result, Err(ContactError::NotFound(_))));

    let after = kv.get(KEY).await.expect("get should succeed");
    assert_eq!(before, after);
}

#[tokio::test]
async fn append_history_to_deleted_contact_leaves_collection_untouched() {
    let (kv, store) = setup();
    store
        .create(new_contact("A", "5551234567"))
        .await
        .expect("create should succeed");
    let removed = store
        .create(new_contact("B", "5559876543"))
        .await
        .expect("create should succeed");
    assert!(store.delete(&removed.id).await.expect("delete should succeed"));
    let before = kv.get(KEY).await.expect("get should succeed");

    let result = store.append_history(&removed.id, sms_entry("late")).await;
    assert!(matches!(result, Err(ContactError::NotFound(ref id)) if *id == removed.id));

    let after = kv.get(KEY).await.expect("get should succeed");
    assert_eq!(before, after);
    let contacts = store.list().await.expect("list should succeed");
    assert_eq!(contacts.len(), 1);
    assert!(contacts[0].history.is_empty());
}

#[tokio::test]
async fn concurrent_appends_are_not_lost() {
    let (_kv, store) = setup();
    let store = Arc::new(store);
    let contact = store
        .create(new_contact("A", "5551234567"))
        .await
        .expect("create should succeed");

    let mut handles = Vec::new();
    for i in 0..10 {
        let store = Arc::clone(&store);
        let id = contact.id.clone();
        handles.push(tokio::spawn(async move {
            store.append_history(&id, sms_entry(&format!("msg {i}"))).await
        }));
    }
    for handle in handles {
        handle
            .await
            .expect("task should not panic")
            .expect("append should succeed");
    }

    let stored = store
        .get(&contact.id)
        .await
        .expect("get should succeed")
        .expect("contact should exist");
    assert_eq!(stored.history.len(), 10);
}

#[tokio::test]
async fn corrupt_collection_is_reported() {
    let (kv, store) = setup();
    kv.set(KEY, "not json").await.expect("set should succeed");
    let result = store.list().await;
    assert!(matches!(result, Err(ContactError::Corrupt(_))));
}

#[tokio::test]
async fn persisted_layout_uses_camel_case_and_typed_history() {
    let (kv, store) = setup();
    let contact = store
        .create(new_contact("A", "5551234567"))
        .await
        .expect("create should succeed");
    store
        .append_history(
            &contact.id,
            HistoryEntry {
                timestamp: Utc::now(),
                delivered: false,
                kind: HistoryKind::Recording {
                    url: "https://x/a.m4a".to_owned(),
                    duration: 12.0,
                },
            },
        )
        .await
        .expect("append should succeed");

    let raw = kv
        .get(KEY)
        .await
        .expect("get should succeed")
        .expect("collection should be stored");
    let value: serde_json::Value = serde_json::from_str(&raw).expect("stored value is JSON");
    let entry = &value[0]["history"][0];
    assert!(value[0]["createdAt"].is_string());
    assert_eq!(entry["type"], "recording");
    assert_eq!(entry["url"], "https://x/a.m4a");
    assert_eq!(entry["delivered"], false);
}

#[tokio::test]
async fn shutdown_drains_writer() {
    let (kv, store) = setup();
    store
        .create(new_contact("A", "5551234567"))
        .await
        .expect("create should succeed");
    store.shutdown().await;
    assert!(kv.get(KEY).await.expect("get should succeed").is_some());
}
