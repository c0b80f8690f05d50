//! End-to-end workflow tests for the store.
//!
//! Exercises the full surface the way the session/auth/sharing subsystems
//! use it: single-key operations, prefix listing, transactions, encryption,
//! and migration.

use burrow::{StorageKey, Store, StoreConfig, StoreError};
use serde_json::{json, Value};

fn key(segments: &[&str]) -> StorageKey {
    StorageKey::new(segments.iter().copied()).unwrap()
}

fn plaintext_store(dir: &tempfile::TempDir) -> Store {
    let config = StoreConfig::new(dir.path()).with_master_key_env("BURROW_WORKFLOW_NO_KEY");
    Store::open(config).unwrap()
}

#[test]
fn full_workflow_plaintext() {
    let dir = tempfile::tempdir().unwrap();
    let store = plaintext_store(&dir);

    // Session subsystem writes a record, reads it back.
    let session = key(&["sessions", "2026", "abc"]);
    let record = json!({
        "model": "large",
        "turns": [{"role": "user", "text": "hi"}],
        "cost_cents": 12,
    });
    store.write(&session, &record).unwrap();
    assert_eq!(store.read::<Value>(&session).unwrap(), Some(record));

    // Reading a never-written key is a normal "not found" result.
    assert_eq!(
        store.read::<Value>(&key(&["sessions", "2026", "nope"])).unwrap(),
        None
    );

    // Removing twice in a row succeeds both times.
    store.remove(&session).unwrap();
    store.remove(&session).unwrap();
    assert_eq!(store.read::<Value>(&session).unwrap(), None);
}

#[test]
fn full_workflow_transaction() {
    let dir = tempfile::tempdir().unwrap();
    let store = plaintext_store(&dir);

    // Sharing subsystem: atomically publish a share and mark the session.
    store
        .write(&key(&["sessions", "abc"]), &json!({"shared": false}))
        .unwrap();

    let mut txn = store.begin_transaction();
    txn.stage_write(&key(&["share", "pending", "xyz"]), &json!({"session": "abc"}))
        .unwrap();
    txn.stage_write(&key(&["sessions", "abc"]), &json!({"shared": true}))
        .unwrap();
    txn.commit().unwrap();

    assert_eq!(
        store.read::<Value>(&key(&["share", "pending", "xyz"])).unwrap(),
        Some(json!({"session": "abc"}))
    );
    assert_eq!(
        store.read::<Value>(&key(&["sessions", "abc"])).unwrap(),
        Some(json!({"shared": true}))
    );
}

#[test]
fn rollback_then_commit_changes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let store = plaintext_store(&dir);

    let k = key(&["auth", "github"]);
    store.write(&k, &json!({"token": "old"})).unwrap();

    let mut txn = store.begin_transaction();
    txn.stage_write(&k, &json!({"token": "new"})).unwrap();
    txn.rollback().unwrap();

    assert!(matches!(
        txn.commit(),
        Err(StoreError::TransactionFinalized(_))
    ));
    assert_eq!(
        store.read::<Value>(&k).unwrap(),
        Some(json!({"token": "old"}))
    );
}

#[test]
fn first_write_creates_fresh_prefix() {
    let dir = tempfile::tempdir().unwrap();
    let store = plaintext_store(&dir);

    let k = key(&["new", "deep", "path"]);
    assert!(!dir.path().join("new").exists());
    store.write(&k, &json!("v")).unwrap();
    assert_eq!(store.read::<Value>(&k).unwrap(), Some(json!("v")));
}

#[test]
fn listing_reflects_writes_and_removes() {
    let dir = tempfile::tempdir().unwrap();
    let store = plaintext_store(&dir);

    for name in ["a", "b", "c"] {
        store.write(&key(&["sessions", name]), &json!(name)).unwrap();
    }
    store.write(&key(&["auth", "tok"]), &json!(1)).unwrap();

    let mut listed: Vec<String> = store
        .list(["sessions"])
        .unwrap()
        .map(|k| k.unwrap().to_string())
        .collect();
    listed.sort();
    assert_eq!(listed, ["sessions/a", "sessions/b", "sessions/c"]);

    store.remove(&key(&["sessions", "b"])).unwrap();
    assert_eq!(store.list(["sessions"]).unwrap().count(), 2);
}

#[test]
fn encrypted_workflow_and_wrong_key() {
    let dir = tempfile::tempdir().unwrap();
    let secret = "f0".repeat(32);

    {
        let store = Store::open_with_secret(StoreConfig::new(dir.path()), &secret).unwrap();
        assert!(store.is_encrypting());
        store
            .write(&key(&["auth", "api"]), &json!({"api_key": "sk-secret"}))
            .unwrap();

        // The raw file must not leak the plaintext.
        let raw = std::fs::read(dir.path().join("auth/api.json")).unwrap();
        assert!(!String::from_utf8_lossy(&raw).contains("sk-secret"));

        assert_eq!(
            store.read::<Value>(&key(&["auth", "api"])).unwrap(),
            Some(json!({"api_key": "sk-secret"}))
        );
    }

    // Same store, wrong key: authentication failure, never garbage.
    let wrong = Store::open_with_secret(StoreConfig::new(dir.path()), &"0f".repeat(32)).unwrap();
    let result = wrong.read::<Value>(&key(&["auth", "api"]));
    assert!(matches!(result, Err(StoreError::Authentication)));
}

#[test]
fn migration_upgrades_existing_data() {
    let dir = tempfile::tempdir().unwrap();

    {
        let store = plaintext_store(&dir);
        store.write(&key(&["sessions", "s1"]), &json!({"n": 1})).unwrap();
        store.write(&key(&["sessions", "s2"]), &json!({"n": 2})).unwrap();
    }

    let store =
        Store::open_with_secret(StoreConfig::new(dir.path()), "hunter2-passphrase").unwrap();

    // Plaintext data is still readable before migration.
    assert_eq!(
        store.read::<Value>(&key(&["sessions", "s1"])).unwrap(),
        Some(json!({"n": 1}))
    );

    assert_eq!(store.migrate_to_encrypted().unwrap(), 2);
    assert_eq!(store.migrate_to_encrypted().unwrap(), 0);

    assert_eq!(
        store.read::<Value>(&key(&["sessions", "s2"])).unwrap(),
        Some(json!({"n": 2}))
    );
}

#[test]
fn typed_records_round_trip() {
    #[derive(serde::Serialize, serde::Deserialize, Debug, PartialEq)]
    struct AuthRecord {
        provider: String,
        refresh_token: Option<String>,
        expires_at: u64,
    }

    let dir = tempfile::tempdir().unwrap();
    let store = plaintext_store(&dir);

    let record = AuthRecord {
        provider: "github".to_string(),
        refresh_token: Some("r0".to_string()),
        expires_at: 1_900_000_000,
    };
    let k = key(&["auth", "github"]);
    store.write(&k, &record).unwrap();

    let loaded: Option<AuthRecord> = store.read(&k).unwrap();
    assert_eq!(loaded, Some(record));
}
