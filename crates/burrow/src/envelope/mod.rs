//! Secure envelope — the self-describing on-disk byte format.
//!
//! Every record file is an ASCII envelope with two layers:
//!
//! ```text
//! b3c:<64-hex BLAKE3 of body>:<body>          integrity wrapper (outer)
//!
//! body :=
//!   enc:<24-hex nonce>:<32-hex tag>:<hex ct>  encrypted record
//!   plaintext:<raw JSON bytes>                unencrypted record
//! ```
//!
//! The outer checksum is verified before the body is even inspected, so
//! storage-level corruption surfaces as [`StoreError::Integrity`] and never
//! reaches the decryption step. Tampering inside an authenticated envelope
//! (wrong key, flipped ciphertext bit) surfaces as
//! [`StoreError::Authentication`].
//!
//! Bare JSON with no wrapper at all — data written before the envelope
//! existed — is accepted on read and upgraded on the next write or by
//! [`crate::Store::migrate_to_encrypted`].
//!
//! # Modules
//!
//! - [`cipher`] — ChaCha20-Poly1305 seal/open with split tag.
//! - [`integrity`] — outer BLAKE3 checksum wrap.
//! - [`master_key`] — env-sourced key material and derivation.
//! - [`random`] — nonce/salt generation.

pub mod cipher;
pub mod integrity;
pub mod master_key;
pub mod random;

pub use master_key::MasterKey;

use crate::error::{Result, StoreError};

/// Marker prefix for an encrypted body.
const ENCRYPTED_MARKER: &[u8] = b"enc:";

/// Marker prefix for an unencrypted body.
const PLAINTEXT_MARKER: &[u8] = b"plaintext:";

/// Hex length of the ChaCha20-Poly1305 nonce component.
const NONCE_HEX_LEN: usize = cipher::NONCE_LEN * 2;

/// Hex length of the Poly1305 tag component.
const TAG_HEX_LEN: usize = cipher::TAG_LEN * 2;

/// Seal record bytes into the full on-disk envelope.
///
/// With a key: encrypt, then integrity-wrap. Without: integrity-wrap the
/// plaintext. Writes are always wrapped; only reads accept legacy bare JSON.
///
/// # Errors
///
/// Returns `StoreError::Serialization` if encryption fails.
pub fn seal(record: &[u8], key: Option<&MasterKey>) -> Result<Vec<u8>> {
    let body = match key {
        Some(key) => {
            let (nonce, tag, ciphertext) = cipher::seal(key.record_key(), record)?;
            let mut body = Vec::with_capacity(
                ENCRYPTED_MARKER.len() + NONCE_HEX_LEN + TAG_HEX_LEN + 2 + ciphertext.len() * 2,
            );
            body.extend_from_slice(ENCRYPTED_MARKER);
            body.extend_from_slice(hex::encode(nonce).as_bytes());
            body.push(b':');
            body.extend_from_slice(hex::encode(tag).as_bytes());
            body.push(b':');
            body.extend_from_slice(hex::encode(&ciphertext).as_bytes());
            body
        }
        None => {
            let mut body = Vec::with_capacity(PLAINTEXT_MARKER.len() + record.len());
            body.extend_from_slice(PLAINTEXT_MARKER);
            body.extend_from_slice(record);
            body
        }
    };

    Ok(integrity::wrap(&body))
}

/// Open an on-disk envelope back into record bytes.
///
/// Accepts all three forms: integrity-wrapped encrypted, integrity-wrapped
/// plaintext, and legacy bare JSON.
///
/// # Errors
///
/// - `StoreError::Integrity` — outer checksum mismatch or malformed wrapper.
/// - `StoreError::InvalidEnvelope` — wrapped body with an unknown marker or
///   wrong component lengths.
/// - `StoreError::Authentication` — AEAD rejected the ciphertext.
/// - `StoreError::MasterKey` — encrypted record but no key configured.
pub fn open(bytes: &[u8], key: Option<&MasterKey>) -> Result<Vec<u8>> {
    if !integrity::is_wrapped(bytes) {
        // Legacy bare JSON, written before the envelope format existed.
        return Ok(bytes.to_vec());
    }

    let body = integrity::unwrap(bytes)?;

    if let Some(rest) = body.strip_prefix(PLAINTEXT_MARKER) {
        return Ok(rest.to_vec());
    }

    if let Some(rest) = body.strip_prefix(ENCRYPTED_MARKER) {
        let (nonce, tag, ciphertext) = decode_encrypted_components(rest)?;
        let key = key.ok_or_else(|| {
            StoreError::MasterKey("record is encrypted but no master key is configured".to_string())
        })?;
        return cipher::open(key.record_key(), &nonce, &tag, &ciphertext);
    }

    Err(StoreError::InvalidEnvelope(
        "wrapped body has no known marker".to_string(),
    ))
}

/// Structural check: is this envelope an encrypted record?
///
/// Checks marker presence, component count, fixed component lengths, and the
/// hex alphabet — never the checksum or the AEAD tag, so it cannot be fooled
/// by content that merely *looks* like JSON, and it never needs a key.
pub fn is_encrypted(bytes: &[u8]) -> bool {
    let Some(body) = structural_body(bytes) else {
        return false;
    };
    let Some(rest) = body.strip_prefix(ENCRYPTED_MARKER) else {
        return false;
    };
    decode_encrypted_components(rest).is_ok()
}

/// Extract the body from an integrity wrapper by structure alone (no
/// checksum verification).
fn structural_body(bytes: &[u8]) -> Option<&[u8]> {
    if !integrity::is_wrapped(bytes) {
        return None;
    }
    Some(&bytes[integrity::INTEGRITY_MARKER.len() + integrity::CHECKSUM_HEX_LEN + 1..])
}

/// Split and decode `nonce:tag:ciphertext`, validating each component's
/// length and alphabet before any decryption is attempted.
fn decode_encrypted_components(
    rest: &[u8],
) -> Result<([u8; cipher::NONCE_LEN], [u8; cipher::TAG_LEN], Vec<u8>)> {
    let mut parts = rest.splitn(3, |&b| b == b':');
    let nonce_hex = parts
        .next()
        .ok_or_else(|| StoreError::InvalidEnvelope("missing nonce".to_string()))?;
    let tag_hex = parts
        .next()
        .ok_or_else(|| StoreError::InvalidEnvelope("missing tag".to_string()))?;
    let ct_hex = parts
        .next()
        .ok_or_else(|| StoreError::InvalidEnvelope("missing ciphertext".to_string()))?;

    if nonce_hex.len() != NONCE_HEX_LEN {
        return Err(StoreError::InvalidEnvelope(format!(
            "nonce must be {NONCE_HEX_LEN} hex chars, got {}",
            nonce_hex.len()
        )));
    }
    if tag_hex.len() != TAG_HEX_LEN {
        return Err(StoreError::InvalidEnvelope(format!(
            "tag must be {TAG_HEX_LEN} hex chars, got {}",
            tag_hex.len()
        )));
    }
    if ct_hex.len() % 2 != 0 {
        return Err(StoreError::InvalidEnvelope(
            "ciphertext hex has odd length".to_string(),
        ));
    }

    let nonce: [u8; cipher::NONCE_LEN] = decode_hex(nonce_hex, "nonce")?
        .try_into()
        .map_err(|_| StoreError::InvalidEnvelope("nonce length".to_string()))?;
    let tag: [u8; cipher::TAG_LEN] = decode_hex(tag_hex, "tag")?
        .try_into()
        .map_err(|_| StoreError::InvalidEnvelope("tag length".to_string()))?;
    let ciphertext = decode_hex(ct_hex, "ciphertext")?;

    Ok((nonce, tag, ciphertext))
}

fn decode_hex(component: &[u8], name: &str) -> Result<Vec<u8>> {
    hex::decode(component)
        .map_err(|e| StoreError::InvalidEnvelope(format!("{name} is not hex: {e}")))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
