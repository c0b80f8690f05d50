//! Multi-key transactions with ordered lock acquisition.
//!
//! A [`Transaction`] stages writes and removes in memory, then applies them
//! all-or-nothing on commit. Staged operations live in a `BTreeMap` keyed by
//! canonical path, which both dedups per key (the last staged operation
//! wins) and fixes the global lock-acquisition order: every transaction
//! requests its exclusive locks in sorted canonical-path order, so two
//! transactions with overlapping key sets can never hold-and-wait on each
//! other in opposite orders.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use crate::error::{Result, StoreError};
use crate::key::StorageKey;
use crate::lock::{LockGuard, LockMode};
use crate::store::Store;

/// Transaction lifecycle. `Committed` and `RolledBack` are terminal:
/// every staging or finalizing call on a terminal transaction fails with
/// [`StoreError::TransactionFinalized`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TxnState {
    Open,
    Committed,
    RolledBack,
}

impl TxnState {
    fn name(self) -> &'static str {
        match self {
            TxnState::Open => "open",
            TxnState::Committed => "committed",
            TxnState::RolledBack => "rolled back",
        }
    }
}

/// A staged operation against one key.
#[derive(Debug)]
enum StagedOp {
    Write { key: StorageKey, value: Value },
    Remove { key: StorageKey },
}

/// An open multi-key transaction against a [`Store`].
///
/// Created by [`Store::begin_transaction`]. Dropping an open transaction
/// discards its staged operations (equivalent to rollback).
pub struct Transaction<'s> {
    store: &'s Store,
    state: TxnState,
    staged: BTreeMap<String, StagedOp>,
}

impl<'s> Transaction<'s> {
    pub(crate) fn new(store: &'s Store) -> Self {
        Self {
            store,
            state: TxnState::Open,
            staged: BTreeMap::new(),
        }
    }

    /// Stage a write of `value` at `key`. Nothing touches disk until commit.
    ///
    /// # Errors
    ///
    /// `TransactionFinalized` if the transaction is terminal, or
    /// `Serialization` if `value` cannot be represented as JSON.
    pub fn stage_write<T: Serialize>(&mut self, key: &StorageKey, value: &T) -> Result<()> {
        self.ensure_open()?;
        let value = serde_json::to_value(value)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.staged.insert(
            key.canonical(),
            StagedOp::Write {
                key: key.clone(),
                value,
            },
        );
        Ok(())
    }

    /// Stage a removal of `key`. Nothing touches disk until commit.
    ///
    /// # Errors
    ///
    /// `TransactionFinalized` if the transaction is terminal.
    pub fn stage_remove(&mut self, key: &StorageKey) -> Result<()> {
        self.ensure_open()?;
        self.staged
            .insert(key.canonical(), StagedOp::Remove { key: key.clone() });
        Ok(())
    }

    /// Number of currently staged operations.
    pub fn staged_len(&self) -> usize {
        self.staged.len()
    }

    /// Apply all staged operations atomically.
    ///
    /// Acquires exclusive locks in sorted canonical-path order, validates
    /// every payload, then applies. On lock timeout or validation failure
    /// the transaction stays `Open` with zero side effects and the caller
    /// may retry or roll back.
    ///
    /// # Errors
    ///
    /// - `TransactionFinalized` — commit on a terminal transaction.
    /// - `LockTimeout` — a lock could not be acquired in time; everything
    ///   already acquired is released, no state was touched.
    /// - `RecordTooLarge` / `Serialization` — validation failed; no state
    ///   was touched.
    /// - `PartialCommit` — a mutation failed after validation passed. The
    ///   transaction is terminal; records applied before the failure stay
    ///   applied. This is fatal and also logged at error level.
    pub fn commit(&mut self) -> Result<()> {
        self.ensure_open()?;

        // 1+2. Lock everything in sorted order. BTreeMap iteration is the
        // sort; guards release on every exit path below.
        let mut guards: Vec<LockGuard> = Vec::with_capacity(self.staged.len());
        for canonical in self.staged.keys() {
            let guard = self.store.locks().acquire(
                canonical,
                LockMode::Exclusive,
                self.store.config().lock_timeout,
            )?;
            guards.push(guard);
        }

        // 3. Validate every payload before any mutation.
        let mut payloads: BTreeMap<&str, Vec<u8>> = BTreeMap::new();
        for (canonical, op) in &self.staged {
            if let StagedOp::Write { value, .. } = op {
                let record = serde_json::to_vec(value)
                    .map_err(|e| StoreError::Serialization(e.to_string()))?;
                self.store.check_size(&record)?;
                payloads.insert(canonical.as_str(), record);
            }
        }

        // 4. Apply sequentially. A failure past this point is a partial
        // commit: loudly reported, never silently swallowed.
        for (applied, (canonical, op)) in self.staged.iter().enumerate() {
            let result = match op {
                StagedOp::Write { key, .. } => {
                    let record = payloads
                        .get(canonical.as_str())
                        .expect("validated payload exists for every staged write");
                    self.store.write_locked(key, record)
                }
                StagedOp::Remove { key } => self.store.remove_locked(key),
            };

            if let Err(err) = result {
                self.state = TxnState::Committed;
                let err = StoreError::PartialCommit {
                    applied,
                    key: canonical.clone(),
                    source: Box::new(err),
                };
                log::error!("{err}");
                return Err(err);
            }
        }

        // 5. Terminal; guards drop here and release every lock.
        self.state = TxnState::Committed;
        Ok(())
    }

    /// Discard all staged operations and finalize the transaction.
    ///
    /// The terminal state is set before this returns: a later `commit` or
    /// `rollback` on the same transaction fails with
    /// `TransactionFinalized` and applies nothing.
    ///
    /// # Errors
    ///
    /// `TransactionFinalized` if the transaction is already terminal.
    pub fn rollback(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.staged.clear();
        self.state = TxnState::RolledBack;
        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        match self.state {
            TxnState::Open => Ok(()),
            state => Err(StoreError::TransactionFinalized(state.name())),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
