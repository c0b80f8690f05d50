//! Store configuration.
//!
//! All knobs have working defaults; a bare [`StoreConfig::new`] with a root
//! directory is a fully usable store. Encryption is opt-in through the
//! master-key environment variable (see
//! [`crate::envelope::master_key`]) — its absence means integrity-wrapped
//! plaintext, not an error.

use std::path::PathBuf;
use std::time::Duration;

/// Environment variable holding the master key (raw hex or passphrase).
pub const MASTER_KEY_ENV: &str = "BURROW_MASTER_KEY";

/// Default bounded wait for lock acquisition.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(30);

/// Default maximum serialized record size.
pub const DEFAULT_MAX_RECORD_BYTES: usize = 8 * 1024 * 1024; // 8 MiB

/// Namespaces (first key segment) written with owner-only permissions.
pub const DEFAULT_RESTRICTED_NAMESPACES: &[&str] = &["auth", "credentials"];

/// Configuration for a [`crate::Store`].
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Root data directory; created on open if missing.
    pub root: PathBuf,
    /// Bounded wait for every lock acquisition.
    pub lock_timeout: Duration,
    /// Serialized records larger than this are rejected pre-I/O.
    pub max_record_bytes: usize,
    /// First segments that get owner-only file permissions.
    pub restricted_namespaces: Vec<String>,
    /// Environment variable consulted for the master key.
    pub master_key_env: String,
}

impl StoreConfig {
    /// Defaults rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            max_record_bytes: DEFAULT_MAX_RECORD_BYTES,
            restricted_namespaces: DEFAULT_RESTRICTED_NAMESPACES
                .iter()
                .map(ToString::to_string)
                .collect(),
            master_key_env: MASTER_KEY_ENV.to_string(),
        }
    }

    /// Override the lock acquisition timeout.
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Override the maximum serialized record size.
    pub fn with_max_record_bytes(mut self, limit: usize) -> Self {
        self.max_record_bytes = limit;
        self
    }

    /// Replace the restricted namespace set.
    pub fn with_restricted_namespaces<I, S>(mut self, namespaces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.restricted_namespaces = namespaces.into_iter().map(Into::into).collect();
        self
    }

    /// Consult a different environment variable for the master key.
    pub fn with_master_key_env(mut self, var: impl Into<String>) -> Self {
        self.master_key_env = var.into();
        self
    }

    /// Is the given first segment a restricted namespace?
    pub fn is_restricted(&self, first_segment: &str) -> bool {
        self.restricted_namespaces
            .iter()
            .any(|ns| ns == first_segment)
    }
}
