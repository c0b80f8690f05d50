//! Burrow — transactional, tamper-evident, file-backed record store.
//!
//! The persistence core for an AI coding assistant's session, auth, and
//! sharing state: atomic multi-record updates, safe concurrent access, and
//! authenticated encryption at rest with transparent plaintext migration.
//!
//! ```no_run
//! use burrow::{Store, StorageKey};
//! use serde_json::json;
//!
//! # fn main() -> burrow::Result<()> {
//! let store = Store::open_at("/tmp/burrow-data")?;
//!
//! let session = StorageKey::new(["sessions", "abc"])?;
//! store.write(&session, &json!({"turns": 3}))?;
//!
//! let mut txn = store.begin_transaction();
//! txn.stage_write(&StorageKey::new(["auth", "github"])?, &json!({"token": "…"}))?;
//! txn.stage_remove(&session)?;
//! txn.commit()?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod envelope;
pub mod error;
pub mod key;
pub mod lock;
pub mod store;
pub mod txn;

// Re-export primary types
pub use config::StoreConfig;
pub use envelope::MasterKey;
pub use error::{Result, StoreError};
pub use key::StorageKey;
pub use lock::{LockDiagnostics, LockGuard, LockManager, LockMode};
pub use store::{KeyWalk, Store};
pub use txn::Transaction;
