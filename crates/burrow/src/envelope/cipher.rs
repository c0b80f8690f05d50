//! Symmetric encryption using ChaCha20-Poly1305.
//!
//! The AEAD tag is kept separate from the ciphertext so the envelope format
//! can store nonce, tag, and ciphertext as individually length-checked
//! components.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};

use crate::envelope::random::random_nonce_12;
use crate::error::{Result, StoreError};

/// ChaCha20-Poly1305 nonce length in bytes.
pub const NONCE_LEN: usize = 12;

/// Poly1305 authentication tag length in bytes.
pub const TAG_LEN: usize = 16;

/// Encrypt plaintext with ChaCha20-Poly1305.
///
/// Returns `(nonce, tag, ciphertext)`. A fresh nonce is generated per call
/// and must be stored alongside the ciphertext for decryption.
///
/// # Errors
///
/// Returns `StoreError::Serialization` if the cipher cannot be initialized
/// or the encryption itself fails (both indicate a programming error, not
/// bad data).
pub fn seal(key: &[u8; 32], plaintext: &[u8]) -> Result<([u8; NONCE_LEN], [u8; TAG_LEN], Vec<u8>)> {
    let nonce_bytes = random_nonce_12();
    let nonce = Nonce::from_slice(&nonce_bytes);
    let cipher = ChaCha20Poly1305::new_from_slice(key)
        .map_err(|e| StoreError::Serialization(format!("cipher init: {e}")))?;

    // The aead crate appends the 16-byte tag to the ciphertext; split it off.
    let mut combined = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| StoreError::Serialization(format!("encrypt: {e}")))?;
    let split_at = combined.len() - TAG_LEN;
    let tag_vec = combined.split_off(split_at);
    let tag: [u8; TAG_LEN] = tag_vec
        .try_into()
        .map_err(|_| StoreError::Serialization("tag length".to_string()))?;

    Ok((nonce_bytes, tag, combined))
}

/// Decrypt ciphertext with ChaCha20-Poly1305.
///
/// Fails closed: any tampering of nonce, tag, or ciphertext yields
/// `StoreError::Authentication`, never partially-decrypted data.
///
/// # Errors
///
/// Returns `StoreError::Authentication` if AEAD verification fails.
pub fn open(
    key: &[u8; 32],
    nonce: &[u8; NONCE_LEN],
    tag: &[u8; TAG_LEN],
    ciphertext: &[u8],
) -> Result<Vec<u8>> {
    let cipher = ChaCha20Poly1305::new_from_slice(key)
        .map_err(|e| StoreError::Serialization(format!("cipher init: {e}")))?;

    let mut combined = Vec::with_capacity(ciphertext.len() + TAG_LEN);
    combined.extend_from_slice(ciphertext);
    combined.extend_from_slice(tag);

    cipher
        .decrypt(Nonce::from_slice(nonce), combined.as_slice())
        .map_err(|_| StoreError::Authentication)
}
