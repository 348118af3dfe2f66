//! Transaction coordinator for managing transactions across stores
//!
//! The coordinator owns:
//! - The registered stores, in registration order (names unique)
//! - The stack of open coordinator-level transactions
//! - The trigger queue flushed at the first physical commit
//! - Transaction metrics (started, committed, rolled back)
//!
//! ## Consistency check
//!
//! Every open coordinator-level transaction holds one level in every store,
//! so no store may be shallower than the coordinator's stack. A shallower
//! store means its session was disturbed out of band (for example a failed
//! physical commit); new transactions are refused with `UnknownState` until
//! the open ones are rolled back.

use crate::store::{Participant, Store};
use crate::transaction::{Transaction, TransactionCore};
use crate::trigger::{TriggerFn, TriggerKey, TriggerQueue};
use parking_lot::Mutex;
use polystore_core::{Driver, Error, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Shared state behind a [`Coordinator`]
///
/// No lock here is held while calling into a store, a trigger or another
/// transaction.
pub(crate) struct CoordinatorInner {
    stores: Mutex<Vec<Arc<dyn Participant>>>,
    stack: Mutex<Vec<Arc<TransactionCore>>>,
    triggers: Mutex<TriggerQueue>,
    next_txn_id: AtomicU64,
    /// Metric counters use Relaxed ordering; they synchronize nothing
    total_started: AtomicU64,
    total_committed: AtomicU64,
    total_rolled_back: AtomicU64,
}

impl CoordinatorInner {
    fn stores(&self) -> Vec<Arc<dyn Participant>> {
        self.stores.lock().clone()
    }

    fn check_state(&self) -> Result<()> {
        let active = self.stack.lock().len();
        for store in self.stores() {
            let depth = store.depth();
            if depth < active {
                error!(
                    target: "polystore::txn",
                    store = %store.name(),
                    depth,
                    active,
                    "Store is shallower than the coordinator stack"
                );
                return Err(Error::unknown_state(format!(
                    "Coordinator has [{}] open transactions, but store [{}] of kind [{}] has [{}]",
                    active,
                    store.name(),
                    store.kind(),
                    depth
                )));
            }
        }
        Ok(())
    }

    pub(crate) fn ensure_top(&self, txn: &Arc<TransactionCore>) -> Result<()> {
        match self.stack.lock().last() {
            None => Err(Error::protocol("There are no open transactions")),
            Some(top) if Arc::ptr_eq(top, txn) => Ok(()),
            Some(_) => Err(Error::protocol(
                "Transaction is not the innermost open transaction",
            )),
        }
    }

    pub(crate) fn commit_transaction(&self, txn: &Arc<TransactionCore>) -> Result<()> {
        let mut stack = self.stack.lock();
        match stack.last() {
            None => return Err(Error::protocol("There are no open transactions")),
            Some(top) if !Arc::ptr_eq(top, txn) => {
                return Err(Error::protocol(
                    "Transaction is not the innermost open transaction",
                ))
            }
            Some(_) => {}
        }
        stack.pop();
        self.total_committed.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Discard `txn` and everything opened after it
    ///
    /// Clears the trigger queue and rolls back every discarded transaction
    /// other than `txn`. A no-op if `txn` is no longer on the stack.
    pub(crate) fn rollback_transactions(&self, txn: &Arc<TransactionCore>) -> Result<()> {
        let discarded = {
            let mut stack = self.stack.lock();
            match stack.iter().position(|t| Arc::ptr_eq(t, txn)) {
                Some(pos) => stack.split_off(pos),
                None => return Ok(()),
            }
        };
        self.total_rolled_back
            .fetch_add(discarded.len() as u64, Ordering::Relaxed);

        // Bodies may own handles whose drop re-enters the coordinator
        let mut dropped = self.triggers.lock().take();
        if !dropped.is_empty() {
            debug!(target: "polystore::trigger", count = dropped.len(), "Discarding queued triggers");
            dropped.clear();
        }

        let mut first_error: Option<Error> = None;
        for item in discarded.iter().rev() {
            if Arc::ptr_eq(item, txn) {
                continue;
            }
            if let Err(e) = item.rollback() {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub(crate) fn add_trigger(&self, key: TriggerKey, body: TriggerFn) -> bool {
        self.triggers.lock().add(key, body)
    }

    /// Run and clear every queued trigger
    pub(crate) fn on_physical_commit(&self) -> Result<()> {
        let queue = self.triggers.lock().take();
        if queue.is_empty() {
            return Ok(());
        }
        info!(target: "polystore::trigger", count = queue.len(), "Flushing triggers before physical commit");
        queue.flush()
    }
}

/// Coordinates logical transactions across several independent stores
///
/// Cloning is cheap; clones refer to the same coordinator. Not intended for
/// concurrent use from several threads without external serialization.
///
/// # Usage
///
/// ```ignore
/// let coordinator = Coordinator::new();
/// coordinator.add_store(&orders)?;
/// coordinator.add_store(&billing)?;
///
/// let txn = coordinator.begin()?;
/// orders.execute(|conn| insert_order(conn, &order))?;
/// billing.execute(|conn| insert_invoice(conn, &invoice))?;
/// txn.commit()?;
/// ```
#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<CoordinatorInner>,
}

impl Coordinator {
    /// Create a coordinator with no stores
    pub fn new() -> Self {
        Self {
            inner: Arc::new(CoordinatorInner {
                stores: Mutex::new(Vec::new()),
                stack: Mutex::new(Vec::new()),
                triggers: Mutex::new(TriggerQueue::new()),
                next_txn_id: AtomicU64::new(1),
                total_started: AtomicU64::new(0),
                total_committed: AtomicU64::new(0),
                total_rolled_back: AtomicU64::new(0),
            }),
        }
    }

    /// Register a store
    ///
    /// # Errors
    ///
    /// Configuration error if this store instance or a store with the same
    /// name is already registered, or if any transaction is open.
    pub fn add_store<D: Driver>(&self, store: &Store<D>) -> Result<()> {
        self.register(store.participant())
    }

    pub(crate) fn register(&self, participant: Arc<dyn Participant>) -> Result<()> {
        let mut stores = self.inner.stores.lock();

        if stores.iter().any(|s| s.store_id() == participant.store_id()) {
            return Err(Error::configuration(format!(
                "Store instance [{}] is already registered",
                participant.name()
            )));
        }
        if stores.iter().any(|s| s.name() == participant.name()) {
            return Err(Error::configuration(format!(
                "Store with name [{}] is already registered",
                participant.name()
            )));
        }
        if !self.inner.stack.lock().is_empty() {
            return Err(Error::configuration(
                "Cannot register a store while transactions are open",
            ));
        }

        debug!(target: "polystore::txn", store = %participant.name(), kind = participant.kind(), "Store registered");
        stores.push(participant);
        Ok(())
    }

    /// Open a transaction spanning every registered store
    ///
    /// No backend is touched until work is executed against a store.
    pub fn begin(&self) -> Result<Transaction> {
        self.inner.check_state()?;

        let id = self.inner.next_txn_id.fetch_add(1, Ordering::Relaxed);
        let stores = self.inner.stores();
        let core = TransactionCore::open(&self.inner, id, &stores)?;

        let depth = {
            let mut stack = self.inner.stack.lock();
            stack.push(Arc::clone(&core));
            stack.len()
        };
        self.inner.total_started.fetch_add(1, Ordering::Relaxed);

        debug!(target: "polystore::txn", txn = id, depth, "Transaction started");
        Ok(Transaction::new(core))
    }

    /// Run `f` inside a transaction
    ///
    /// Commits if `f` returns `Ok`, rolls back otherwise. The error returned by
    /// `f` is preserved; a rollback failure is only logged.
    pub fn transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Transaction) -> Result<T>,
    {
        let txn = self.begin()?;
        match f(&txn) {
            Ok(value) => {
                txn.commit()?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback_err) = txn.rollback() {
                    warn!(
                        target: "polystore::txn",
                        txn = txn.id(),
                        error = %rollback_err,
                        "Rollback after failed transaction body failed"
                    );
                }
                Err(e)
            }
        }
    }

    /// Number of open coordinator-level transactions
    pub fn transactions_count(&self) -> usize {
        self.inner.stack.lock().len()
    }

    /// Registered store names, in registration order
    pub fn store_names(&self) -> Vec<String> {
        self.inner
            .stores()
            .iter()
            .map(|s| s.name().to_string())
            .collect()
    }

    /// True if a store with this name is registered
    pub fn contains_store(&self, name: &str) -> bool {
        self.inner.stores().iter().any(|s| s.name() == name)
    }

    /// Logical nesting depth of the named store
    pub fn store_depth(&self, name: &str) -> Result<usize> {
        self.inner
            .stores()
            .iter()
            .find(|s| s.name() == name)
            .map(|s| s.depth())
            .ok_or_else(|| Error::configuration(format!("Store with name [{}] not found", name)))
    }

    /// Number of queued triggers
    pub fn pending_triggers(&self) -> usize {
        self.inner.triggers.lock().len()
    }

    /// Get transaction metrics
    pub fn metrics(&self) -> CoordinatorMetrics {
        CoordinatorMetrics {
            active_count: self.transactions_count() as u64,
            total_started: self.inner.total_started.load(Ordering::Relaxed),
            total_committed: self.inner.total_committed.load(Ordering::Relaxed),
            total_rolled_back: self.inner.total_rolled_back.load(Ordering::Relaxed),
        }
    }
}

impl Default for Coordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("stores", &self.store_names())
            .field("active", &self.transactions_count())
            .finish()
    }
}

/// Transaction metrics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorMetrics {
    /// Number of currently open transactions
    pub active_count: u64,
    /// Total number of transactions started
    pub total_started: u64,
    /// Total number of transactions committed
    pub total_committed: u64,
    /// Total number of transactions rolled back
    pub total_rolled_back: u64,
}

impl CoordinatorMetrics {
    /// Total transactions that completed (committed + rolled back)
    pub fn total_completed(&self) -> u64 {
        self.total_committed + self.total_rolled_back
    }
}
