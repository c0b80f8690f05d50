//! Bulk migration of plaintext records to the encrypted envelope.
//!
//! Stores that predate a configured master key hold integrity-wrapped
//! plaintext (or legacy bare JSON). Once a key is available, migration
//! re-writes every such record through the encrypted path, key by key,
//! under the same exclusive locks normal writes take.

use crate::envelope;
use crate::error::{Result, StoreError};
use crate::key::StorageKey;
use crate::lock::LockMode;
use crate::store::Store;

impl Store {
    /// Re-write every unencrypted record through the encrypted path.
    ///
    /// Returns the number of records migrated. Records that are already
    /// encrypted are left untouched, so running this repeatedly is safe.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::MasterKey` if no master key is configured.
    /// Envelope and I/O errors on individual records abort the migration
    /// with the record's key in scope of the error; records migrated before
    /// the failure stay migrated.
    pub fn migrate_to_encrypted(&self) -> Result<usize> {
        if self.master_key().is_none() {
            return Err(StoreError::MasterKey(
                "cannot migrate: no master key is configured".to_string(),
            ));
        }

        let mut migrated = 0usize;
        let keys: Vec<StorageKey> = self
            .list(Vec::<String>::new())?
            .collect::<Result<Vec<_>>>()?;

        for key in keys {
            if self.migrate_one(&key)? {
                migrated += 1;
                log::debug!("migrated {key} to encrypted envelope");
            }
        }

        log::info!("migration complete: {migrated} record(s) re-encrypted");
        Ok(migrated)
    }

    /// Migrate a single record; `Ok(false)` when already encrypted or gone.
    fn migrate_one(&self, key: &StorageKey) -> Result<bool> {
        let _guard = self.locks().acquire(
            &key.canonical(),
            LockMode::Exclusive,
            self.config().lock_timeout,
        )?;

        // Re-check under the lock; the record may have been rewritten or
        // removed since the walk.
        let Some(bytes) = self.read_raw(key)? else {
            return Ok(false);
        };
        if envelope::is_encrypted(&bytes) {
            return Ok(false);
        }

        let record = envelope::open(&bytes, self.master_key())?;
        self.write_locked(key, &record)?;
        Ok(true)
    }
}
