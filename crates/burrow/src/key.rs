//! Storage keys — validated hierarchical names for records.
//!
//! A [`StorageKey`] is an ordered, non-empty sequence of path segments.
//! Validation here is the sole path-traversal defense in the crate: every
//! filesystem operation goes through [`StorageKey::to_path`], and a key can
//! only be constructed through [`StorageKey::new`].
//!
//! A key maps deterministically to a relative file path by joining its
//! segments and appending `.json`:
//!
//! ```text
//! ["sessions", "2024", "abc"]  →  sessions/2024/abc.json
//! ```
//!
//! The joined relative path (the *canonical* form) doubles as the resource
//! identifier for locking, so two callers naming the same logical key always
//! contend on the same lock.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};

/// File extension for all record files.
pub const RECORD_EXT: &str = "json";

/// A validated, ordered, non-empty sequence of path segments.
///
/// Two keys are equal iff their segment sequences are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct StorageKey {
    segments: Vec<String>,
}

impl StorageKey {
    /// Build a key from segments, validating every one.
    ///
    /// Rejects empty sequences, empty segments, `.` and `..` segments,
    /// and segments containing `/`, `\`, a NUL byte, or `..`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::InvalidKey` describing the first offending
    /// segment.
    pub fn new<I, S>(segments: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();

        if segments.is_empty() {
            return Err(StoreError::InvalidKey("key has no segments".to_string()));
        }

        for segment in &segments {
            validate_segment(segment)?;
        }

        Ok(Self { segments })
    }

    /// The key's segments in order.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Canonical relative path: segments joined with `/`, `.json` appended.
    ///
    /// Deterministic and injective over valid keys, which makes it usable as
    /// the lock-ordering resource identifier.
    pub fn canonical(&self) -> String {
        format!("{}.{RECORD_EXT}", self.segments.join("/"))
    }

    /// Absolute on-disk path for this key under `root`.
    pub fn to_path(&self, root: &Path) -> PathBuf {
        let mut path = root.to_path_buf();
        let (last, dirs) = self.segments.split_last().expect("key is non-empty");
        for segment in dirs {
            path.push(segment);
        }
        // Append the extension by hand: `set_extension` would swallow any
        // dot already present in the final segment and break injectivity.
        path.push(format!("{last}.{RECORD_EXT}"));
        path
    }

    /// Reconstruct a key from a relative path produced by [`Self::to_path`].
    ///
    /// Used by directory walks to turn `sessions/2024/abc.json` back into
    /// `["sessions", "2024", "abc"]`. Segments are re-validated, so a stray
    /// file with a traversal-shaped name is rejected rather than reflected
    /// back as a key.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::InvalidKey` if the path has no `.json` suffix or
    /// any component fails segment validation.
    pub fn from_relative(path: &Path) -> Result<Self> {
        let mut segments: Vec<String> = Vec::new();
        for component in path.components() {
            match component {
                std::path::Component::Normal(part) => {
                    segments.push(part.to_string_lossy().into_owned());
                }
                other => {
                    return Err(StoreError::InvalidKey(format!(
                        "unexpected path component {other:?} in {}",
                        path.display()
                    )));
                }
            }
        }

        let last = segments
            .pop()
            .ok_or_else(|| StoreError::InvalidKey("empty relative path".to_string()))?;
        let stem = last.strip_suffix(&format!(".{RECORD_EXT}")).ok_or_else(|| {
            StoreError::InvalidKey(format!("missing .{RECORD_EXT} suffix: {last}"))
        })?;
        segments.push(stem.to_string());

        Self::new(segments)
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("/"))
    }
}

impl TryFrom<Vec<String>> for StorageKey {
    type Error = StoreError;

    fn try_from(segments: Vec<String>) -> Result<Self> {
        Self::new(segments)
    }
}

impl From<StorageKey> for Vec<String> {
    fn from(key: StorageKey) -> Self {
        key.segments
    }
}

/// Validate a single segment. Also used for list prefixes, which are
/// segment sequences without the non-empty requirement.
pub(crate) fn validate_segment(segment: &str) -> Result<()> {
    if segment.is_empty() {
        return Err(StoreError::InvalidKey("empty segment".to_string()));
    }
    if segment == "." || segment == ".." || segment.contains("..") {
        return Err(StoreError::InvalidKey(format!(
            "segment must not traverse directories: {segment:?}"
        )));
    }
    if segment.contains('/') || segment.contains('\\') {
        return Err(StoreError::InvalidKey(format!(
            "segment must not contain path separators: {segment:?}"
        )));
    }
    if segment.contains('\0') {
        return Err(StoreError::InvalidKey(
            "segment must not contain NUL".to_string(),
        ));
    }
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
