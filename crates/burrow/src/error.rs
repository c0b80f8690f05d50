//! Error types for Burrow.
//!
//! All errors are strongly typed and propagated without panicking.
//! Key material is never included in error messages.

/// Store error types covering all operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Record too large: {size} bytes (limit {limit})")]
    RecordTooLarge { size: usize, limit: usize },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Lock timeout on {resource} after {waited_ms} ms ({holders} holder(s) in {mode} mode, {waiters} waiting)")]
    LockTimeout {
        resource: String,
        waited_ms: u64,
        holders: usize,
        mode: &'static str,
        waiters: usize,
    },

    #[error("Authentication failed: ciphertext rejected (wrong key or tampered data)")]
    Authentication,

    #[error("Integrity check failed: {0}")]
    Integrity(String),

    #[error("Invalid envelope: {0}")]
    InvalidEnvelope(String),

    #[error("Transaction already finalized: {0}")]
    TransactionFinalized(&'static str),

    #[error("Partial commit: {applied} operation(s) applied before {key} failed: {source}")]
    PartialCommit {
        applied: usize,
        key: String,
        #[source]
        source: Box<StoreError>,
    },

    #[error("Master key error: {0}")]
    MasterKey(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience Result alias.
pub type Result<T> = std::result::Result<T, StoreError>;
