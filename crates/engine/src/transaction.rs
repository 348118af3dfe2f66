//! Coordinator-level transactions
//!
//! A [`Transaction`] fans one logical unit out across every registered store:
//! on creation it opens a nested level in each store, and commit/rollback are
//! applied to all of them together.
//!
//! There is no two-phase commit. Stores are committed one after another in
//! registration order; if a later store fails, stores already committed in the
//! same call stay committed.

use crate::coordinator::CoordinatorInner;
use crate::store::{LevelHandle, Participant};
use crate::trigger::{TriggerFn, TriggerKey};
use parking_lot::Mutex;
use polystore_core::{Error, Result, TransactionState};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Shared record of one coordinator-level transaction
///
/// Referenced by the coordinator's stack and, weakly, by each store level it
/// owns, so a store rollback can pull the whole transaction down. The record
/// keeps its coordinator alive; the reference cycle through the stack ends
/// when the transaction is committed or rolled back.
pub(crate) struct TransactionCore {
    id: u64,
    coordinator: Arc<CoordinatorInner>,
    state: Mutex<TransactionState>,
    members: Mutex<Vec<LevelHandle>>,
}

impl TransactionCore {
    /// Open one level in every store, in order
    ///
    /// If a store refuses, every level already obtained is rolled back and the
    /// original error is returned.
    pub(crate) fn open(
        coordinator: &Arc<CoordinatorInner>,
        id: u64,
        stores: &[Arc<dyn Participant>],
    ) -> Result<Arc<Self>> {
        let core = Arc::new(TransactionCore {
            id,
            coordinator: Arc::clone(coordinator),
            state: Mutex::new(TransactionState::Opened),
            members: Mutex::new(Vec::with_capacity(stores.len())),
        });

        let mut obtained = Vec::with_capacity(stores.len());
        for store in stores {
            match LevelHandle::begin(Arc::clone(store), Some(Arc::downgrade(&core))) {
                Ok(handle) => obtained.push(handle),
                Err(e) => {
                    // Never visible to the coordinator, so no bookkeeping to undo
                    core.set_state(TransactionState::RolledBack);
                    for handle in &obtained {
                        if let Err(release_err) = handle.rollback() {
                            warn!(
                                target: "polystore::txn",
                                txn = id,
                                store = %handle.store_name(),
                                error = %release_err,
                                "Failed to release store transaction after begin failure"
                            );
                        }
                    }
                    return Err(e);
                }
            }
        }

        *core.members.lock() = obtained;
        Ok(core)
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn state(&self) -> TransactionState {
        *self.state.lock()
    }

    fn set_state(&self, state: TransactionState) {
        *self.state.lock() = state;
    }

    fn members(&self) -> Vec<LevelHandle> {
        self.members.lock().clone()
    }

    pub(crate) fn commit(self: &Arc<Self>) -> Result<()> {
        match self.state() {
            TransactionState::Opened => {}
            TransactionState::Committed => {
                return Err(Error::protocol("Transaction is already committed"))
            }
            TransactionState::RolledBack => {
                return Err(Error::protocol("Transaction is already rolled back"))
            }
        }

        self.coordinator.ensure_top(self)?;

        // Every level must be committable before any store commits for real
        let members = self.members();
        for member in &members {
            member.ensure_committable()?;
        }
        for member in &members {
            member.commit()?;
        }

        self.coordinator.commit_transaction(self)?;
        self.set_state(TransactionState::Committed);
        debug!(target: "polystore::txn", txn = self.id, "Transaction committed");
        Ok(())
    }

    pub(crate) fn rollback(self: &Arc<Self>) -> Result<()> {
        {
            let mut state = self.state.lock();
            let current = *state;
            match current {
                TransactionState::RolledBack => return Ok(()),
                TransactionState::Committed => {
                    return Err(Error::protocol("Transaction is already committed"))
                }
                // Flip first so cascades re-entering through a store see a no-op
                TransactionState::Opened => *state = TransactionState::RolledBack,
            }
        }

        debug!(target: "polystore::txn", txn = self.id, "Rolling back transaction");

        let mut first_error: Option<Error> = None;
        for member in self.members() {
            // Left over from a commit that failed part way; nothing to undo
            if member.state() == TransactionState::Committed {
                continue;
            }
            if let Err(e) = member.rollback() {
                first_error.get_or_insert(e);
            }
        }

        if let Err(e) = self.coordinator.rollback_transactions(self) {
            first_error.get_or_insert(e);
        }

        match first_error {
            Some(e) => {
                warn!(target: "polystore::txn", txn = self.id, error = %e, "Rollback incomplete");
                Err(e.into_unknown_state())
            }
            None => Ok(()),
        }
    }

    /// Called by a store right before it physically commits on our behalf
    pub(crate) fn before_physical_commit(&self) -> Result<()> {
        self.coordinator.on_physical_commit()
    }

    fn add_trigger(&self, key: TriggerKey, body: TriggerFn) -> bool {
        self.coordinator.add_trigger(key, body)
    }
}

/// Handle to a coordinator-level transaction
///
/// Dropping an `Opened` handle rolls it back.
#[must_use = "dropping a Transaction without commit rolls it back"]
pub struct Transaction {
    core: Arc<TransactionCore>,
}

impl Transaction {
    pub(crate) fn new(core: Arc<TransactionCore>) -> Self {
        Self { core }
    }

    /// Identifier, unique within the coordinator
    pub fn id(&self) -> u64 {
        self.core.id()
    }

    /// Current state
    pub fn state(&self) -> TransactionState {
        self.core.state()
    }

    /// State of the level held in each store, in registration order
    pub fn store_states(&self) -> Vec<(String, TransactionState)> {
        self.core
            .members()
            .iter()
            .map(|m| (m.store_name().to_string(), m.state()))
            .collect()
    }

    /// Commit every store level, in registration order
    ///
    /// Must be the coordinator's innermost open transaction. Stops at the first
    /// failing store without compensating stores already committed; a failed
    /// physical commit is reported as [`Error::UnknownState`].
    pub fn commit(&self) -> Result<()> {
        self.core.commit()
    }

    /// Roll back every store level and every transaction opened after this one
    ///
    /// Attempts every step before reporting the first failure as
    /// [`Error::UnknownState`]. A no-op if already rolled back.
    pub fn rollback(&self) -> Result<()> {
        self.core.rollback()
    }

    /// Register a call to run once, right before the first physical commit
    ///
    /// Returns `false` if a trigger with the same key is already queued.
    pub fn add_trigger<F>(&self, key: TriggerKey, body: F) -> Result<bool>
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        let state = self.state();
        if state != TransactionState::Opened {
            return Err(Error::protocol(format!(
                "Cannot add trigger {} to a transaction that is {}",
                key, state
            )));
        }
        Ok(self.core.add_trigger(key, Box::new(body)))
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.core.state().is_opened() {
            warn!(
                target: "polystore::txn",
                txn = self.core.id(),
                "Transaction dropped without commit; rolling back"
            );
            if let Err(e) = self.core.rollback() {
                warn!(
                    target: "polystore::txn",
                    txn = self.core.id(),
                    error = %e,
                    "Rollback on scope exit failed"
                );
            }
        }
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id())
            .field("state", &self.state())
            .finish()
    }
}
