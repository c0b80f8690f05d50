//! Per-resource shared/exclusive lock table with bounded FIFO waits.
//!
//! Resources are identified by canonical path strings (see
//! [`crate::key::StorageKey::canonical`]). Waiters queue as FIFO tickets:
//! `Shared` requests may be granted together, but never overtake an older
//! `Exclusive` ticket, so writers cannot starve under heavy read load.
//!
//! Acquisition blocks the calling thread on a `Condvar` with a deadline; on
//! timeout the ticket is withdrawn and no lock state is left behind for the
//! attempt. Release is bound to [`LockGuard`] drop, so it happens on every
//! exit path of the owning scope.
//!
//! The table is owned by the [`crate::Store`] that created it — there is no
//! process-global state. Idle entries (no holders, no waiters) are evicted
//! on release.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::error::{Result, StoreError};
use crate::lock::types::{LockDiagnostics, LockMode};

/// A queued acquisition request.
#[derive(Debug)]
struct Ticket {
    id: u64,
    mode: LockMode,
}

/// Mutable state of one resource.
#[derive(Debug, Default)]
struct ResourceState {
    readers: usize,
    writer: bool,
    queue: VecDeque<Ticket>,
    acquired_at: Option<Instant>,
}

impl ResourceState {
    fn holders(&self) -> usize {
        if self.writer {
            1
        } else {
            self.readers
        }
    }

    fn holder_mode(&self) -> Option<LockMode> {
        if self.writer {
            Some(LockMode::Exclusive)
        } else if self.readers > 0 {
            Some(LockMode::Shared)
        } else {
            None
        }
    }

    fn idle(&self) -> bool {
        self.holders() == 0 && self.queue.is_empty()
    }

    /// A ticket is grantable when the current holders are compatible and no
    /// incompatible ticket is queued ahead of it.
    fn grantable(&self, id: u64, mode: LockMode) -> bool {
        match mode {
            LockMode::Exclusive => {
                self.readers == 0
                    && !self.writer
                    && self.queue.front().map(|t| t.id) == Some(id)
            }
            LockMode::Shared => {
                !self.writer
                    && self
                        .queue
                        .iter()
                        .take_while(|t| t.id != id)
                        .all(|t| t.mode == LockMode::Shared)
            }
        }
    }

    fn remove_ticket(&mut self, id: u64) {
        if let Some(pos) = self.queue.iter().position(|t| t.id == id) {
            self.queue.remove(pos);
        }
    }
}

#[derive(Debug, Default)]
struct Resource {
    state: Mutex<ResourceState>,
    cond: Condvar,
}

impl Resource {
    fn state(&self) -> MutexGuard<'_, ResourceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

type Table = Mutex<HashMap<String, Arc<Resource>>>;

/// In-process lock table keyed by canonical resource path.
#[derive(Debug, Default)]
pub struct LockManager {
    table: Arc<Table>,
    next_ticket: AtomicU64,
}

impl LockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire `mode` on `resource`, waiting at most `timeout`.
    ///
    /// Returns a [`LockGuard`] that releases on drop. On timeout the ticket
    /// is withdrawn, other waiters are re-woken, and the error carries the
    /// resource's contention diagnostics.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::LockTimeout` if the mode was not grantable
    /// within `timeout`.
    pub fn acquire(&self, resource: &str, mode: LockMode, timeout: Duration) -> Result<LockGuard> {
        let id = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        let started = Instant::now();
        let deadline = started + timeout;

        // Get-or-create the entry and enqueue the ticket while still holding
        // the table lock, so eviction cannot race the new ticket away.
        let entry = {
            let mut table = self.lock_table();
            let entry = Arc::clone(table.entry(resource.to_string()).or_default());
            entry.state().queue.push_back(Ticket { id, mode });
            entry
        };

        let mut state = entry.state();
        loop {
            if state.grantable(id, mode) {
                state.remove_ticket(id);
                match mode {
                    LockMode::Shared => state.readers += 1,
                    LockMode::Exclusive => state.writer = true,
                }
                if state.acquired_at.is_none() {
                    state.acquired_at = Some(Instant::now());
                }
                // A shared grant can unblock further shared tickets behind it.
                entry.cond.notify_all();
                drop(state);
                return Ok(LockGuard {
                    table: Arc::clone(&self.table),
                    resource: entry,
                    name: resource.to_string(),
                    mode,
                });
            }

            let now = Instant::now();
            if now >= deadline {
                state.remove_ticket(id);
                let err = StoreError::LockTimeout {
                    resource: resource.to_string(),
                    waited_ms: started.elapsed().as_millis() as u64,
                    holders: state.holders(),
                    mode: state.holder_mode().map_or("idle", LockMode::as_str),
                    waiters: state.queue.len(),
                };
                entry.cond.notify_all();
                drop(state);
                log::warn!("lock timeout: {err}");
                return Err(err);
            }

            let (next, _) = entry
                .cond
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            state = next;
        }
    }

    /// Diagnostics for one resource, `None` if it has no entry (idle and
    /// evicted).
    pub fn diagnostics(&self, resource: &str) -> Option<LockDiagnostics> {
        let table = self.lock_table();
        let entry = table.get(resource)?;
        let state = entry.state();
        Some(Self::diag_of(resource, &state))
    }

    /// Diagnostics for every currently-tracked resource.
    pub fn snapshot(&self) -> Vec<LockDiagnostics> {
        let table = self.lock_table();
        let mut all: Vec<LockDiagnostics> = table
            .iter()
            .map(|(name, entry)| Self::diag_of(name, &entry.state()))
            .collect();
        all.sort_by(|a, b| a.resource.cmp(&b.resource));
        all
    }

    fn diag_of(resource: &str, state: &ResourceState) -> LockDiagnostics {
        LockDiagnostics {
            resource: resource.to_string(),
            holders: state.holders(),
            mode: state.holder_mode(),
            waiters: state.queue.len(),
            held_for: state.acquired_at.map(|t| t.elapsed()),
        }
    }

    fn lock_table(&self) -> MutexGuard<'_, HashMap<String, Arc<Resource>>> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Holds a granted lock; releases it on drop.
///
/// Release is tied to scope exit on every path. The explicit
/// [`LockGuard::release`] consumes the guard, so releasing twice is not
/// expressible.
#[derive(Debug)]
pub struct LockGuard {
    table: Arc<Table>,
    resource: Arc<Resource>,
    name: String,
    mode: LockMode,
}

impl LockGuard {
    /// The canonical resource path this guard holds.
    pub fn resource(&self) -> &str {
        &self.name
    }

    /// The granted mode.
    pub fn mode(&self) -> LockMode {
        self.mode
    }

    /// Release the lock now instead of at end of scope.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        // Table lock first, then state lock — same order as acquire — so
        // eviction cannot interleave with a new ticket.
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        let mut state = self.resource.state();
        match self.mode {
            LockMode::Shared => state.readers = state.readers.saturating_sub(1),
            LockMode::Exclusive => state.writer = false,
        }
        if state.holders() == 0 {
            state.acquired_at = None;
        }
        let idle = state.idle();
        self.resource.cond.notify_all();
        drop(state);

        if idle {
            table.remove(&self.name);
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
