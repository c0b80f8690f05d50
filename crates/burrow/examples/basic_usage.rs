//! Basic store usage: single-key operations and a transaction.
//!
//! Run with: `cargo run --example basic_usage`

use burrow::{StorageKey, Store};
use serde_json::json;

fn main() -> burrow::Result<()> {
    let dir = std::env::temp_dir().join("burrow-example");
    let store = Store::open_at(&dir)?;

    // Single-key write and read.
    let session = StorageKey::new(["sessions", "demo"])?;
    store.write(&session, &json!({"turns": 1, "model": "small"}))?;

    let record: Option<serde_json::Value> = store.read(&session)?;
    println!("session record: {record:?}");

    // Atomic multi-key update.
    let mut txn = store.begin_transaction();
    txn.stage_write(&StorageKey::new(["share", "demo"])?, &json!({"public": true}))?;
    txn.stage_write(&session, &json!({"turns": 1, "shared": true}))?;
    txn.commit()?;

    for key in store.list(Vec::<String>::new())? {
        println!("key: {}", key?);
    }

    store.remove(&session)?;
    Ok(())
}
