//! Outer integrity wrapping with BLAKE3.
//!
//! The integrity layer detects storage-level corruption (disk errors,
//! partial writes) before decryption or parsing is attempted. It is an
//! unkeyed checksum: it must be verifiable even when no encryption key is
//! configured, and its failures (`StoreError::Integrity`) are reported
//! distinctly from AEAD authentication failures.
//!
//! Wrapped form: `b3c:<64-hex BLAKE3 of body>:<body>`.

use crate::error::{Result, StoreError};

/// Marker prefix for integrity-wrapped payloads.
pub const INTEGRITY_MARKER: &[u8] = b"b3c:";

/// Hex length of a BLAKE3-256 checksum.
pub const CHECKSUM_HEX_LEN: usize = 64;

/// Wrap `body` with an outer BLAKE3 checksum.
pub fn wrap(body: &[u8]) -> Vec<u8> {
    let checksum = blake3::hash(body);
    let mut out = Vec::with_capacity(INTEGRITY_MARKER.len() + CHECKSUM_HEX_LEN + 1 + body.len());
    out.extend_from_slice(INTEGRITY_MARKER);
    out.extend_from_slice(checksum.to_hex().as_bytes());
    out.push(b':');
    out.extend_from_slice(body);
    out
}

/// Verify and strip the integrity wrapper, returning the body.
///
/// # Errors
///
/// Returns `StoreError::Integrity` if the marker is missing, the checksum
/// component is malformed, or the checksum does not match the body.
pub fn unwrap(wrapped: &[u8]) -> Result<&[u8]> {
    let rest = wrapped.strip_prefix(INTEGRITY_MARKER).ok_or_else(|| {
        StoreError::Integrity("missing integrity marker".to_string())
    })?;

    if rest.len() < CHECKSUM_HEX_LEN + 1 || rest[CHECKSUM_HEX_LEN] != b':' {
        return Err(StoreError::Integrity(
            "truncated integrity header".to_string(),
        ));
    }

    let checksum_hex = &rest[..CHECKSUM_HEX_LEN];
    if !checksum_hex.iter().all(u8::is_ascii_hexdigit) {
        return Err(StoreError::Integrity(
            "checksum is not hex".to_string(),
        ));
    }

    let body = &rest[CHECKSUM_HEX_LEN + 1..];
    let actual = blake3::hash(body);
    let expected = std::str::from_utf8(checksum_hex)
        .map_err(|_| StoreError::Integrity("checksum is not UTF-8".to_string()))?;

    if actual.to_hex().as_str() != expected.to_ascii_lowercase() {
        return Err(StoreError::Integrity("checksum mismatch".to_string()));
    }

    Ok(body)
}

/// Structural check: does `bytes` carry the integrity wrapper?
pub fn is_wrapped(bytes: &[u8]) -> bool {
    bytes.starts_with(INTEGRITY_MARKER)
        && bytes.len() > INTEGRITY_MARKER.len() + CHECKSUM_HEX_LEN
        && bytes[INTEGRITY_MARKER.len()..INTEGRITY_MARKER.len() + CHECKSUM_HEX_LEN]
            .iter()
            .all(u8::is_ascii_hexdigit)
        && bytes[INTEGRITY_MARKER.len() + CHECKSUM_HEX_LEN] == b':'
}
