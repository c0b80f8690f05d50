//! Filesystem-backed record store.
//!
//! One JSON record per [`StorageKey`], stored at
//! `root/<segment>/…/<segment>.json` inside a secure envelope (see
//! [`crate::envelope`]). Every operation takes the key's lock through the
//! store's [`LockManager`]; nothing touches a record file without holding
//! its lock.
//!
//! Writes are atomic: the sealed envelope is written to a sibling temp file
//! and renamed into place, so a concurrent reader never sees a partial
//! write. Parent directories are created before every write, so the first
//! write under a fresh key prefix succeeds.

use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::StoreConfig;
use crate::envelope::{self, MasterKey};
use crate::error::{Result, StoreError};
use crate::key::{validate_segment, StorageKey, RECORD_EXT};
use crate::lock::{LockDiagnostics, LockManager, LockMode};
use crate::txn::Transaction;

/// Suffix for in-flight temp files, skipped by [`KeyWalk`].
const TMP_SUFFIX: &str = "tmp";

/// A file-backed key-value store with locking, envelopes, and transactions.
pub struct Store {
    config: StoreConfig,
    locks: LockManager,
    master_key: Option<MasterKey>,
}

impl Store {
    /// Open a store with the given configuration.
    ///
    /// Creates the root directory if missing and loads the master key from
    /// the configured environment variable. An absent variable is not an
    /// error: the store writes integrity-wrapped plaintext.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Io` if the root cannot be created, or
    /// `StoreError::MasterKey` if the variable is set but unusable.
    pub fn open(config: StoreConfig) -> Result<Self> {
        fs::create_dir_all(&config.root)?;
        let master_key = MasterKey::from_env(&config.master_key_env, &config.root)?;
        if master_key.is_some() {
            log::debug!("store at {} opened with encryption", config.root.display());
        }
        Ok(Self {
            config,
            locks: LockManager::new(),
            master_key,
        })
    }

    /// Open a store rooted at `root` with default configuration.
    pub fn open_at(root: impl Into<PathBuf>) -> Result<Self> {
        Self::open(StoreConfig::new(root))
    }

    /// Open a store with an explicit master-key secret (raw hex key or
    /// passphrase) instead of consulting the environment.
    ///
    /// For callers that source key material from somewhere other than the
    /// process environment, e.g. an OS keychain.
    ///
    /// # Errors
    ///
    /// As [`Store::open`], plus `StoreError::MasterKey` if the secret is
    /// unusable.
    pub fn open_with_secret(config: StoreConfig, secret: &str) -> Result<Self> {
        fs::create_dir_all(&config.root)?;
        let master_key = MasterKey::from_secret(secret, &config.root)?;
        Ok(Self {
            config,
            locks: LockManager::new(),
            master_key: Some(master_key),
        })
    }

    /// The store's configuration.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Whether records are written encrypted.
    pub fn is_encrypting(&self) -> bool {
        self.master_key.is_some()
    }

    /// Begin a transaction for atomic multi-key updates.
    pub fn begin_transaction(&self) -> Transaction<'_> {
        Transaction::new(self)
    }

    /// Lock diagnostics for every currently-contended resource.
    pub fn lock_diagnostics(&self) -> Vec<LockDiagnostics> {
        self.locks.snapshot()
    }

    // ── Single-key operations ─────────────────────────────────────────────────

    /// Read the record at `key`, or `None` if it was never written.
    ///
    /// Takes a shared lock; a missing file is a normal result, not an error.
    ///
    /// # Errors
    ///
    /// `LockTimeout`, `Integrity`, `Authentication`, `InvalidEnvelope`,
    /// `Serialization`, or `Io` per the envelope and parse steps.
    pub fn read<T: DeserializeOwned>(&self, key: &StorageKey) -> Result<Option<T>> {
        let _guard = self.locks.acquire(
            &key.canonical(),
            LockMode::Shared,
            self.config.lock_timeout,
        )?;
        self.read_locked(key)
    }

    /// Write `value` at `key`, replacing any existing record.
    ///
    /// Takes an exclusive lock. The serialized record is size-checked before
    /// any I/O happens.
    ///
    /// # Errors
    ///
    /// `RecordTooLarge`, `Serialization`, `LockTimeout`, or `Io`.
    pub fn write<T: Serialize>(&self, key: &StorageKey, value: &T) -> Result<()> {
        let record = serde_json::to_vec(value)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.check_size(&record)?;

        let _guard = self.locks.acquire(
            &key.canonical(),
            LockMode::Exclusive,
            self.config.lock_timeout,
        )?;
        self.write_locked(key, &record)
    }

    /// Remove the record at `key`. Removing a missing key succeeds.
    ///
    /// # Errors
    ///
    /// `LockTimeout` or `Io`.
    pub fn remove(&self, key: &StorageKey) -> Result<()> {
        let _guard = self.locks.acquire(
            &key.canonical(),
            LockMode::Exclusive,
            self.config.lock_timeout,
        )?;
        self.remove_locked(key)
    }

    /// Lazily walk all keys under `prefix` (empty prefix walks everything).
    ///
    /// The returned iterator reflects on-disk state as it walks; re-creating
    /// it restarts the walk against current state. Non-record files (temp
    /// files, the salt file) are skipped.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::InvalidKey` if a prefix segment fails
    /// validation. I/O errors during the walk surface as `Err` items.
    pub fn list<I, S>(&self, prefix: I) -> Result<KeyWalk>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut dir = self.config.root.clone();
        for segment in prefix {
            let segment = segment.into();
            validate_segment(&segment)?;
            dir.push(&segment);
        }
        KeyWalk::start(self.config.root.clone(), dir)
    }

    // ── Lock-free internals (caller already holds the key's lock) ─────────────

    pub(crate) fn read_locked<T: DeserializeOwned>(&self, key: &StorageKey) -> Result<Option<T>> {
        let bytes = match self.read_raw(key)? {
            Some(bytes) => bytes,
            None => return Ok(None),
        };
        let record = envelope::open(&bytes, self.master_key.as_ref())?;
        let value = serde_json::from_slice(&record)
            .map_err(|e| StoreError::Serialization(format!("record at {key}: {e}")))?;
        Ok(Some(value))
    }

    /// Raw envelope bytes at `key`, without unwrapping. Used by migration.
    pub(crate) fn read_raw(&self, key: &StorageKey) -> Result<Option<Vec<u8>>> {
        let path = key.to_path(&self.config.root);
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    pub(crate) fn write_locked(&self, key: &StorageKey, record: &[u8]) -> Result<()> {
        let sealed = envelope::seal(record, self.master_key.as_ref())?;
        let path = key.to_path(&self.config.root);
        let restricted = self.config.is_restricted(&key.segments()[0]);

        // Parent directories must exist before the temp file is created;
        // first writes to a new key prefix land here.
        if let Some(parent) = path.parent() {
            create_dirs(parent, restricted)?;
        }

        let tmp_path = path.with_extension(format!("{RECORD_EXT}.{TMP_SUFFIX}"));
        if let Err(err) = write_tmp(&tmp_path, &sealed, restricted) {
            match fs::remove_file(&tmp_path) {
                Ok(()) => {}
                Err(cleanup) if cleanup.kind() == std::io::ErrorKind::NotFound => {}
                Err(cleanup) => log::debug!(
                    "failed to clean up temp file {}: {cleanup}",
                    tmp_path.display()
                ),
            }
            return Err(err);
        }
        fs::rename(&tmp_path, &path)?;
        Ok(())
    }

    pub(crate) fn remove_locked(&self, key: &StorageKey) -> Result<()> {
        let path = key.to_path(&self.config.root);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    pub(crate) fn check_size(&self, record: &[u8]) -> Result<()> {
        if record.len() > self.config.max_record_bytes {
            return Err(StoreError::RecordTooLarge {
                size: record.len(),
                limit: self.config.max_record_bytes,
            });
        }
        Ok(())
    }

    pub(crate) fn locks(&self) -> &LockManager {
        &self.locks
    }

    pub(crate) fn master_key(&self) -> Option<&MasterKey> {
        self.master_key.as_ref()
    }
}

/// Create `dir` and any missing parents; restricted namespaces get 0o700.
fn create_dirs(dir: &Path, restricted: bool) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        let mut builder = fs::DirBuilder::new();
        builder.recursive(true);
        if restricted {
            builder.mode(0o700);
        }
        builder.create(dir)?;
    }
    #[cfg(not(unix))]
    {
        let _ = restricted;
        fs::create_dir_all(dir)?;
    }
    Ok(())
}

/// Write the sealed envelope to the temp file; restricted records are
/// owner-only.
fn write_tmp(tmp_path: &Path, sealed: &[u8], restricted: bool) -> Result<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    if restricted {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    #[cfg(not(unix))]
    let _ = restricted;

    let mut file = options.open(tmp_path)?;
    file.write_all(sealed)?;
    file.sync_all()?;
    Ok(())
}

// ── Key walking ───────────────────────────────────────────────────────────────

/// Lazy iterator over the keys under a prefix directory.
///
/// Yields keys in directory order (unspecified). Entries that vanish while
/// walking are logged at debug level and skipped.
pub struct KeyWalk {
    root: PathBuf,
    stack: Vec<fs::ReadDir>,
}

impl KeyWalk {
    fn start(root: PathBuf, dir: PathBuf) -> Result<Self> {
        let stack = match fs::read_dir(&dir) {
            Ok(read_dir) => vec![read_dir],
            // A never-written prefix is an empty sequence, not an error.
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(err) => return Err(err.into()),
        };
        Ok(Self { root, stack })
    }

    /// Handle one directory entry; `Ok(None)` means "skip, keep walking".
    fn visit(&mut self, entry: fs::DirEntry) -> Result<Option<StorageKey>> {
        let path = entry.path();
        let file_type = match entry.file_type() {
            Ok(file_type) => file_type,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("entry vanished during walk: {}: {err}", path.display());
                return Ok(None);
            }
            Err(err) => return Err(err.into()),
        };

        if file_type.is_dir() {
            match fs::read_dir(&path) {
                Ok(read_dir) => self.stack.push(read_dir),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                    log::debug!("directory vanished during walk: {}: {err}", path.display());
                }
                Err(err) => return Err(err.into()),
            }
            return Ok(None);
        }

        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with('.') || !name.ends_with(&format!(".{RECORD_EXT}")) {
            return Ok(None);
        }

        let relative = path
            .strip_prefix(&self.root)
            .map_err(|_| StoreError::InvalidKey(format!("path escapes root: {}", path.display())))?;
        match StorageKey::from_relative(relative) {
            Ok(key) => Ok(Some(key)),
            Err(err) => {
                // A record-shaped file whose name is not a valid key is not
                // ours; skip it rather than fail the whole walk.
                log::debug!("skipping non-key file {}: {err}", path.display());
                Ok(None)
            }
        }
    }
}

impl Iterator for KeyWalk {
    type Item = Result<StorageKey>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let read_dir = self.stack.last_mut()?;
            match read_dir.next() {
                None => {
                    self.stack.pop();
                }
                Some(Err(err)) => return Some(Err(err.into())),
                Some(Ok(entry)) => match self.visit(entry) {
                    Ok(Some(key)) => return Some(Ok(key)),
                    Ok(None) => {}
                    Err(err) => return Some(Err(err)),
                },
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
