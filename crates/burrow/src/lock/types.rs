//! Lock modes and diagnostics types.

use std::fmt;
use std::time::Duration;

/// Access mode for a resource lock.
///
/// At most one `Exclusive` holder may exist per resource, and it excludes
/// all `Shared` holders; any number of `Shared` holders may co-exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
}

impl LockMode {
    /// Short lowercase name, used in errors and diagnostics output.
    pub fn as_str(self) -> &'static str {
        match self {
            LockMode::Shared => "shared",
            LockMode::Exclusive => "exclusive",
        }
    }
}

impl fmt::Display for LockMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of one resource's lock state.
///
/// Produced by [`crate::lock::LockManager::diagnostics`] and
/// [`crate::lock::LockManager::snapshot`] for operational visibility into
/// contention.
#[derive(Debug, Clone)]
pub struct LockDiagnostics {
    /// Canonical resource path.
    pub resource: String,
    /// Number of current holders (0 or 1 for exclusive, any for shared).
    pub holders: usize,
    /// Mode of the current holders, `None` when the resource is idle.
    pub mode: Option<LockMode>,
    /// Number of queued waiters.
    pub waiters: usize,
    /// Time since the oldest current holder acquired the lock.
    pub held_for: Option<Duration>,
}

impl fmt::Display for LockDiagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = self.mode.map_or("idle", LockMode::as_str);
        let held = self
            .held_for
            .map_or_else(String::new, |d| format!(", held {} ms", d.as_millis()));
        write!(
            f,
            "{}: {} holder(s) [{mode}], {} waiting{held}",
            self.resource, self.holders, self.waiters
        )
    }
}
