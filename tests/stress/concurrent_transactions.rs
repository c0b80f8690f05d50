//! Concurrency tests: overlapping transactions, deadlock freedom, fairness.
//!
//! Validates the ordering guarantees of the lock manager and transaction
//! manager under parallel load.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use burrow::{StorageKey, Store, StoreConfig};
use serde_json::{json, Value};

fn key(segments: &[&str]) -> StorageKey {
    StorageKey::new(segments.iter().copied()).unwrap()
}

fn open_store(dir: &tempfile::TempDir) -> Arc<Store> {
    let config = StoreConfig::new(dir.path())
        .with_master_key_env("BURROW_STRESS_NO_KEY")
        .with_lock_timeout(Duration::from_secs(10));
    Arc::new(Store::open(config).unwrap())
}

#[test]
fn stress_reversed_key_orders_never_deadlock() {
    // T1 stages {A, B}, T2 stages {B, A}, repeatedly and concurrently.
    // Sorted lock acquisition means both must always complete.
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);

    let mut handles = Vec::new();
    for thread_id in 0..8 {
        let store = Arc::clone(&store);
        let handle = thread::spawn(move || {
            for i in 0..50 {
                let (first, second) = if thread_id % 2 == 0 {
                    (key(&["a"]), key(&["b"]))
                } else {
                    (key(&["b"]), key(&["a"]))
                };
                let mut txn = store.begin_transaction();
                txn.stage_write(&first, &json!({"thread": thread_id, "i": i}))
                    .unwrap();
                txn.stage_write(&second, &json!({"thread": thread_id, "i": i}))
                    .unwrap();
                txn.commit().expect("commit must not deadlock or time out");
            }
        });
        handles.push(handle);
    }

    for h in handles {
        h.join().unwrap();
    }

    // Both keys hold the same transaction's value: commits never interleave.
    let a: Value = store.read(&key(&["a"])).unwrap().unwrap();
    let b: Value = store.read(&key(&["b"])).unwrap().unwrap();
    assert_eq!(a, b, "overlapping transactions must serialize");
}

#[test]
fn stress_overlapping_commits_are_isolated() {
    // Every transaction writes its own id to the same three keys. After all
    // threads finish, the three keys must agree — a byte-mixed result would
    // mean two commits interleaved.
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);

    let keys = ["x", "y", "z"];
    let mut handles = Vec::new();
    for thread_id in 0..16 {
        let store = Arc::clone(&store);
        let handle = thread::spawn(move || {
            let mut txn = store.begin_transaction();
            for k in keys {
                txn.stage_write(&key(&["iso", k]), &json!(thread_id)).unwrap();
            }
            txn.commit().unwrap();
        });
        handles.push(handle);
    }

    for h in handles {
        h.join().unwrap();
    }

    let x: Value = store.read(&key(&["iso", "x"])).unwrap().unwrap();
    let y: Value = store.read(&key(&["iso", "y"])).unwrap().unwrap();
    let z: Value = store.read(&key(&["iso", "z"])).unwrap().unwrap();
    assert_eq!(x, y);
    assert_eq!(y, z);
}

#[test]
fn stress_disjoint_transactions_run_in_parallel() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);

    let mut handles = Vec::new();
    for thread_id in 0..16 {
        let store = Arc::clone(&store);
        let handle = thread::spawn(move || {
            for i in 0..25 {
                let k = key(&["disjoint", &format!("t{thread_id}"), &format!("r{i}")]);
                let mut txn = store.begin_transaction();
                txn.stage_write(&k, &json!({"i": i})).unwrap();
                txn.commit().unwrap();
            }
        });
        handles.push(handle);
    }

    for h in handles {
        h.join().unwrap();
    }

    let count = store.list(["disjoint"]).unwrap().count();
    assert_eq!(count, 16 * 25);
}

#[test]
fn stress_readers_and_writers_mixed() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);
    let k = key(&["hot"]);
    store.write(&k, &json!({"gen": 0})).unwrap();

    let mut handles = Vec::new();

    // 4 writer threads bumping the record.
    for writer_id in 0..4 {
        let store = Arc::clone(&store);
        let k = k.clone();
        handles.push(thread::spawn(move || {
            for i in 0..50 {
                store
                    .write(&k, &json!({"gen": i, "writer": writer_id}))
                    .unwrap();
            }
        }));
    }

    // 8 reader threads; every read must see a complete record.
    for _ in 0..8 {
        let store = Arc::clone(&store);
        let k = k.clone();
        handles.push(thread::spawn(move || {
            for _ in 0..100 {
                let value: Option<Value> = store.read(&k).unwrap();
                let value = value.expect("record exists throughout");
                assert!(value.get("gen").is_some(), "torn read: {value}");
                thread::yield_now();
            }
        }));
    }

    for h in handles {
        h.join().unwrap();
    }
}

#[test]
fn stress_no_lock_state_survives_the_storm() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir);

    let mut handles = Vec::new();
    for thread_id in 0..8 {
        let store = Arc::clone(&store);
        handles.push(thread::spawn(move || {
            for i in 0..50 {
                let k = key(&["churn", &format!("{}", (thread_id + i) % 5)]);
                let mut txn = store.begin_transaction();
                txn.stage_write(&k, &json!(i)).unwrap();
                txn.commit().unwrap();
            }
        }));
    }

    for h in handles {
        h.join().unwrap();
    }

    assert!(
        store.lock_diagnostics().is_empty(),
        "idle store must have an empty lock table"
    );
}
