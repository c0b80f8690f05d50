//! Scale tests: many records, deep prefixes, bulk migration.

use burrow::{StorageKey, Store, StoreConfig};
use serde_json::{json, Value};

fn key(segments: &[&str]) -> StorageKey {
    StorageKey::new(segments.iter().copied()).unwrap()
}

fn plaintext_store(dir: &tempfile::TempDir) -> Store {
    let config = StoreConfig::new(dir.path()).with_master_key_env("BURROW_SCALE_NO_KEY");
    Store::open(config).unwrap()
}

#[test]
fn stress_1000_records_write_list_read() {
    let dir = tempfile::tempdir().unwrap();
    let store = plaintext_store(&dir);

    for i in 0..1000 {
        let bucket = format!("{:02}", i % 10);
        let k = key(&["records", &bucket, &format!("r{i:04}")]);
        store.write(&k, &json!({"i": i})).unwrap();
    }

    assert_eq!(store.list(["records"]).unwrap().count(), 1000);
    assert_eq!(store.list(["records", "03"]).unwrap().count(), 100);

    // Spot-check reads across buckets.
    for i in [0, 123, 555, 999] {
        let bucket = format!("{:02}", i % 10);
        let k = key(&["records", &bucket, &format!("r{i:04}")]);
        let value: Option<Value> = store.read(&k).unwrap();
        assert_eq!(value, Some(json!({"i": i})));
    }
}

#[test]
fn stress_large_transaction_commits_atomically() {
    let dir = tempfile::tempdir().unwrap();
    let store = plaintext_store(&dir);

    let mut txn = store.begin_transaction();
    for i in 0..250 {
        txn.stage_write(&key(&["bulk", &format!("k{i:03}")]), &json!(i))
            .unwrap();
    }
    txn.commit().unwrap();

    assert_eq!(store.list(["bulk"]).unwrap().count(), 250);
    assert!(store.lock_diagnostics().is_empty());
}

#[test]
fn stress_bulk_migration() {
    let dir = tempfile::tempdir().unwrap();

    {
        let store = plaintext_store(&dir);
        for i in 0..200 {
            store
                .write(&key(&["m", &format!("{}", i % 4), &format!("r{i}")]), &json!({"i": i}))
                .unwrap();
        }
    }

    let store = Store::open_with_secret(StoreConfig::new(dir.path()), &"9a".repeat(32)).unwrap();
    assert_eq!(store.migrate_to_encrypted().unwrap(), 200);
    assert_eq!(store.migrate_to_encrypted().unwrap(), 0);

    for i in [0, 57, 199] {
        let k = key(&["m", &format!("{}", i % 4), &format!("r{i}")]);
        let value: Option<Value> = store.read(&k).unwrap();
        assert_eq!(value, Some(json!({"i": i})));
    }
}

#[test]
fn stress_deep_key_hierarchies() {
    let dir = tempfile::tempdir().unwrap();
    let store = plaintext_store(&dir);

    let segments: Vec<String> = (0..12).map(|i| format!("level{i}")).collect();
    let k = StorageKey::new(segments).unwrap();
    store.write(&k, &json!("deep")).unwrap();

    let value: Option<Value> = store.read(&k).unwrap();
    assert_eq!(value, Some(json!("deep")));
    assert_eq!(store.list(["level0"]).unwrap().count(), 1);
}

#[test]
fn stress_write_remove_churn_leaves_consistent_listing() {
    let dir = tempfile::tempdir().unwrap();
    let store = plaintext_store(&dir);

    for i in 0..300 {
        store.write(&key(&["churn", &format!("k{i}")]), &json!(i)).unwrap();
    }
    for i in (0..300).step_by(2) {
        store.remove(&key(&["churn", &format!("k{i}")])).unwrap();
    }

    let remaining = store.list(["churn"]).unwrap().count();
    assert_eq!(remaining, 150);
}
