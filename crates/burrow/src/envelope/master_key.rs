//! Master key sourcing and derivation.
//!
//! The store reads a single environment variable (`BURROW_MASTER_KEY` by
//! default). Its value is either a 64-character hex string (a raw 32-byte
//! key) or an arbitrary passphrase. A passphrase is stretched with Argon2id
//! against a per-store random salt persisted at `<root>/.burrow-salt`,
//! created on first use.
//!
//! The record-encryption key is then derived from the master key with
//! HKDF-SHA256 under a fixed context string, so any future key use gets its
//! own derivation context instead of reusing the master key directly.
//!
//! Absence of the variable is not an error: the store simply writes
//! integrity-wrapped plaintext.

use std::path::Path;

use argon2::{Algorithm, Argon2, Params, Version};
use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::envelope::random::random_salt_16;
use crate::error::{Result, StoreError};

/// Argon2id parameters for passphrase-based key derivation.
const ARGON2_M_COST: u32 = 65536; // 64 MiB
const ARGON2_T_COST: u32 = 3; // 3 iterations
const ARGON2_P_COST: u32 = 4; // 4 parallel lanes

/// HKDF context for the record-encryption key. Must remain stable across
/// versions or existing stores become unreadable.
const RECORD_ENCRYPTION_CONTEXT: &str = "burrow/record-encryption";

/// Filename of the per-store passphrase salt.
const SALT_FILE: &str = ".burrow-salt";

/// A derived 32-byte record-encryption key. Zeroized on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct MasterKey {
    key: [u8; 32],
}

impl MasterKey {
    /// The derived record-encryption key bytes.
    pub fn record_key(&self) -> &[u8; 32] {
        &self.key
    }

    /// Load the master key from the environment, if configured.
    ///
    /// Returns `Ok(None)` when `env_var` is unset or empty — the store then
    /// operates in integrity-wrapped plaintext mode.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::MasterKey` if the value looks like hex but has
    /// the wrong length, or if key stretching/derivation fails, and
    /// `StoreError::Io` if the salt file cannot be read or created.
    pub fn from_env(env_var: &str, root: &Path) -> Result<Option<Self>> {
        let Ok(mut value) = std::env::var(env_var) else {
            return Ok(None);
        };
        if value.is_empty() {
            return Ok(None);
        }

        let result = Self::from_secret(&value, root);
        value.zeroize();
        result.map(Some)
    }

    /// Build a master key from a secret string (raw hex key or passphrase).
    pub fn from_secret(secret: &str, root: &Path) -> Result<Self> {
        let mut master = if is_hex_key(secret) {
            decode_hex_key(secret)?
        } else {
            let salt = load_or_create_salt(root)?;
            stretch_passphrase(secret.as_bytes(), &salt)?
        };

        let key = derive_key(&master, RECORD_ENCRYPTION_CONTEXT)?;
        master.zeroize();
        Ok(Self { key })
    }
}

/// True if the value is exactly a 64-char hex string.
fn is_hex_key(value: &str) -> bool {
    value.len() == 64 && value.bytes().all(|b| b.is_ascii_hexdigit())
}

fn decode_hex_key(value: &str) -> Result<[u8; 32]> {
    let bytes = hex::decode(value)
        .map_err(|e| StoreError::MasterKey(format!("invalid hex key: {e}")))?;
    bytes
        .try_into()
        .map_err(|_| StoreError::MasterKey("hex key must be 32 bytes".to_string()))
}

/// Stretch a passphrase into a 32-byte master key with Argon2id.
fn stretch_passphrase(passphrase: &[u8], salt: &[u8; 16]) -> Result<[u8; 32]> {
    let params = Params::new(ARGON2_M_COST, ARGON2_T_COST, ARGON2_P_COST, Some(32))
        .map_err(|e| StoreError::MasterKey(format!("Argon2 params: {e}")))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut output = [0u8; 32];
    argon2
        .hash_password_into(passphrase, salt, &mut output)
        .map_err(|e| StoreError::MasterKey(format!("Argon2 hash: {e}")))?;

    Ok(output)
}

/// Derive a 32-byte child key from the master key and a context string.
///
/// Uses HKDF-SHA256 (RFC 5869) with the master key as IKM and the context
/// as info.
fn derive_key(master: &[u8; 32], context: &str) -> Result<[u8; 32]> {
    let hk = Hkdf::<Sha256>::new(None, master);
    let mut output = [0u8; 32];
    hk.expand(context.as_bytes(), &mut output)
        .map_err(|e| StoreError::MasterKey(format!("HKDF expand failed: {e}")))?;
    Ok(output)
}

/// Read the per-store salt, creating it on first use.
fn load_or_create_salt(root: &Path) -> Result<[u8; 16]> {
    let path = root.join(SALT_FILE);

    match std::fs::read(&path) {
        Ok(bytes) => bytes.try_into().map_err(|_| {
            StoreError::MasterKey(format!("salt file {} is corrupt", path.display()))
        }),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            let salt = random_salt_16();
            std::fs::create_dir_all(root)?;
            std::fs::write(&path, salt)?;
            log::debug!("created salt file {}", path.display());
            Ok(salt)
        }
        Err(err) => Err(err.into()),
    }
}
