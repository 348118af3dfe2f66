//! Per-store transaction management
//!
//! A [`Store`] owns one backend and the stack of logical transactions layered
//! over it. Logical levels nest freely; at most one physical transaction backs
//! all of them, and it is opened lazily the first time work actually reaches
//! the backend.
//!
//! ## Stack discipline
//!
//! ```text
//! begin()            push level            (never touches the backend)
//! execute(f)         push ad-hoc level, materialize physical, run f, commit level
//! commit(level)      level must be top; pop; at depth 1→0 commit physical
//! rollback(level)    roll back physical, discard the WHOLE stack,
//!                    cascade into every discarded level's parent transaction
//! ```
//!
//! Because a single physical transaction cannot be partially undone, rolling
//! back any level collapses every level of the store. The cascade keeps the
//! sibling levels of the same coordinator-level transaction in other stores in
//! lockstep.

use crate::transaction::TransactionCore;
use parking_lot::Mutex;
use polystore_core::{Driver, Error, Result, TransactionState};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, error, info, warn};

/// Source of instance identities, so two stores with equal names stay distinct
static NEXT_STORE_ID: AtomicU64 = AtomicU64::new(1);

/// One nesting level inside a store
pub(crate) struct Level {
    id: u64,
    parent: Option<Weak<TransactionCore>>,
    state: Mutex<TransactionState>,
}

impl Level {
    pub(crate) fn state(&self) -> TransactionState {
        *self.state.lock()
    }

    fn set_state(&self, state: TransactionState) {
        *self.state.lock() = state;
    }

    fn parent(&self) -> Option<Arc<TransactionCore>> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }
}

/// Type-erased view of a store, as seen by the coordinator and by handles
pub(crate) trait Participant: Send + Sync {
    fn store_id(&self) -> u64;
    fn name(&self) -> &str;
    fn kind(&self) -> &'static str;
    fn depth(&self) -> usize;
    fn has_physical(&self) -> bool;
    fn begin_level(&self, parent: Option<Weak<TransactionCore>>) -> Result<Arc<Level>>;
    /// Protocol error unless `level` is this store's innermost open level
    fn ensure_top(&self, level: &Arc<Level>) -> Result<()>;
    fn commit_level(&self, level: &Arc<Level>) -> Result<()>;
    fn rollback_level(&self, level: &Arc<Level>) -> Result<()>;
}

/// Reference to one level of one store, without scope-exit behavior
#[derive(Clone)]
pub(crate) struct LevelHandle {
    store: Arc<dyn Participant>,
    level: Arc<Level>,
}

impl LevelHandle {
    pub(crate) fn begin(
        store: Arc<dyn Participant>,
        parent: Option<Weak<TransactionCore>>,
    ) -> Result<Self> {
        let level = store.begin_level(parent)?;
        Ok(Self { store, level })
    }

    pub(crate) fn state(&self) -> TransactionState {
        self.level.state()
    }

    pub(crate) fn store_name(&self) -> &str {
        self.store.name()
    }

    /// Check that a commit of this level would be accepted, without changing anything
    pub(crate) fn ensure_committable(&self) -> Result<()> {
        let state = self.level.state();
        if state != TransactionState::Opened {
            return Err(Error::protocol(format!(
                "Transaction in store [{}] is already {}",
                self.store.name(),
                state
            )));
        }
        self.store.ensure_top(&self.level)
    }

    pub(crate) fn commit(&self) -> Result<()> {
        self.ensure_committable()?;
        self.store.commit_level(&self.level)
    }

    pub(crate) fn rollback(&self) -> Result<()> {
        match self.level.state() {
            TransactionState::RolledBack => Ok(()),
            TransactionState::Committed => Err(Error::protocol(format!(
                "Transaction in store [{}] is already committed",
                self.store.name()
            ))),
            TransactionState::Opened => {
                self.level.set_state(TransactionState::RolledBack);
                self.store.rollback_level(&self.level)
            }
        }
    }
}

struct StoreState<C> {
    levels: Vec<Arc<Level>>,
    physical: Option<C>,
    next_level_id: u64,
}

struct StoreInner<D: Driver> {
    id: u64,
    name: String,
    driver: D,
    state: Mutex<StoreState<D::Connection>>,
}

impl<D: Driver> StoreInner<D> {
    /// A store with no open level must not hold a physical transaction
    fn check_state(&self, st: &StoreState<D::Connection>) -> Result<()> {
        if st.levels.is_empty() && st.physical.is_some() {
            error!(target: "polystore::store", store = %self.name, "Physical transaction cached with no open level");
            return Err(Error::unknown_state(format!(
                "Store [{}] of kind [{}] has 0 open transactions but holds a physical transaction",
                self.name,
                self.driver.kind()
            )));
        }
        Ok(())
    }

    fn check_top(&self, st: &StoreState<D::Connection>, level: &Arc<Level>) -> Result<()> {
        match st.levels.last() {
            None => Err(Error::protocol(format!(
                "Store [{}] has no open transactions",
                self.name
            ))),
            Some(top) if Arc::ptr_eq(top, level) => Ok(()),
            Some(_) => Err(Error::protocol(format!(
                "Transaction is not the innermost open transaction of store [{}]",
                self.name
            ))),
        }
    }

    fn open_physical(&self) -> Result<D::Connection> {
        let mut conn = self.driver.connect().map_err(Error::driver)?;
        if let Err(e) = self.driver.begin(&mut conn) {
            self.driver.dispose(conn);
            return Err(Error::driver(e));
        }
        info!(
            target: "polystore::store",
            store = %self.name,
            descriptor = %self.driver.descriptor(),
            "Physical transaction opened"
        );
        Ok(conn)
    }

    /// Run `f` against the physical transaction, opening it if needed
    fn with_connection<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut D::Connection) -> std::result::Result<T, D::Error>,
    {
        let mut st = self.state.lock();
        self.check_state(&st)?;
        if st.levels.is_empty() {
            return Err(Error::unknown_state(format!(
                "Store [{}] of kind [{}] has 0 open transactions but a physical transaction was requested",
                self.name,
                self.driver.kind()
            )));
        }
        let conn = match st.physical.take() {
            Some(conn) => conn,
            None => self.open_physical()?,
        };
        let conn = st.physical.insert(conn);
        f(conn).map_err(Error::driver)
    }

    fn commit_physical(&self, mut conn: D::Connection, level: &Level) -> Result<()> {
        match self.driver.commit(&mut conn) {
            Ok(()) => {
                level.set_state(TransactionState::Committed);
                info!(target: "polystore::store", store = %self.name, "Physical transaction committed");
                if let Err(e) = self.driver.close(conn) {
                    warn!(
                        target: "polystore::store",
                        store = %self.name,
                        error = %e,
                        "Failed to close connection after commit"
                    );
                }
                Ok(())
            }
            Err(e) => {
                self.driver.dispose(conn);
                level.set_state(TransactionState::RolledBack);
                error!(
                    target: "polystore::store",
                    store = %self.name,
                    error = %e,
                    "Physical commit failed; backend outcome unknown"
                );
                Err(Error::unknown_state_from(e))
            }
        }
    }

    fn rollback_physical(&self, mut conn: D::Connection) -> Option<Error> {
        match self.driver.rollback(&mut conn) {
            Ok(()) => {
                info!(target: "polystore::store", store = %self.name, "Physical transaction rolled back");
                self.driver.close(conn).err().map(Error::unknown_state_from)
            }
            Err(e) => {
                self.driver.dispose(conn);
                Some(Error::unknown_state_from(e))
            }
        }
    }
}

impl<D: Driver> Participant for StoreInner<D> {
    fn store_id(&self) -> u64 {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        self.driver.kind()
    }

    fn depth(&self) -> usize {
        self.state.lock().levels.len()
    }

    fn has_physical(&self) -> bool {
        self.state.lock().physical.is_some()
    }

    fn begin_level(&self, parent: Option<Weak<TransactionCore>>) -> Result<Arc<Level>> {
        let mut st = self.state.lock();
        self.check_state(&st)?;

        st.next_level_id += 1;
        let level = Arc::new(Level {
            id: st.next_level_id,
            parent,
            state: Mutex::new(TransactionState::Opened),
        });
        st.levels.push(Arc::clone(&level));

        debug!(
            target: "polystore::store",
            store = %self.name,
            level = level.id,
            depth = st.levels.len(),
            "Transaction started"
        );
        Ok(level)
    }

    fn ensure_top(&self, level: &Arc<Level>) -> Result<()> {
        let st = self.state.lock();
        self.check_top(&st, level)
    }

    fn commit_level(&self, level: &Arc<Level>) -> Result<()> {
        let outermost_with_physical = {
            let st = self.state.lock();
            self.check_top(&st, level)?;
            st.levels.len() == 1 && st.physical.is_some()
        };

        // Triggers run while this level is still open, so they can do nested
        // work inside the physical transaction that is about to commit.
        if outermost_with_physical {
            if let Some(parent) = level.parent() {
                parent.before_physical_commit()?;
            }
        }

        let physical = {
            let mut st = self.state.lock();
            self.check_top(&st, level)?;
            st.levels.pop();
            if st.levels.is_empty() {
                st.physical.take()
            } else {
                None
            }
        };

        match physical {
            Some(conn) => self.commit_physical(conn, level),
            None => {
                level.set_state(TransactionState::Committed);
                debug!(target: "polystore::store", store = %self.name, level = level.id, "Transaction committed");
                Ok(())
            }
        }
    }

    fn rollback_level(&self, level: &Arc<Level>) -> Result<()> {
        let (physical, discarded) = {
            let mut st = self.state.lock();
            (st.physical.take(), std::mem::take(&mut st.levels))
        };

        debug!(
            target: "polystore::store",
            store = %self.name,
            level = level.id,
            discarded = discarded.len(),
            "Rolling back store"
        );

        let mut first_error = physical.and_then(|conn| self.rollback_physical(conn));

        for item in discarded.iter().rev() {
            item.set_state(TransactionState::RolledBack);
            if let Some(parent) = item.parent() {
                if let Err(e) = parent.rollback() {
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => {
                error!(target: "polystore::store", store = %self.name, error = %e, "Rollback incomplete");
                Err(e.into_unknown_state())
            }
            None => Ok(()),
        }
    }
}

/// Handle to one backend and its nested logical transactions
///
/// Cloning is cheap; clones refer to the same store.
pub struct Store<D: Driver> {
    inner: Arc<StoreInner<D>>,
}

impl<D: Driver> Clone for Store<D> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<D: Driver> Store<D> {
    /// Create a store over `driver`; no connection is opened
    pub fn new(name: impl Into<String>, driver: D) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                id: NEXT_STORE_ID.fetch_add(1, Ordering::Relaxed),
                name: name.into(),
                driver,
                state: Mutex::new(StoreState {
                    levels: Vec::new(),
                    physical: None,
                    next_level_id: 0,
                }),
            }),
        }
    }

    /// Store name
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Backend kind reported by the driver
    pub fn kind(&self) -> &'static str {
        self.inner.driver.kind()
    }

    /// Underlying driver
    pub fn driver(&self) -> &D {
        &self.inner.driver
    }

    /// Current logical nesting depth
    pub fn transactions_count(&self) -> usize {
        self.inner.depth()
    }

    /// True while a physical transaction is cached
    pub fn has_physical_transaction(&self) -> bool {
        self.inner.has_physical()
    }

    /// Open a nested logical transaction with no coordinator-level parent
    ///
    /// Never touches the backend.
    pub fn begin(&self) -> Result<StoreTransaction> {
        LevelHandle::begin(self.participant(), None).map(StoreTransaction::new)
    }

    /// Run `f` against the physical transaction inside an ad-hoc nested level
    ///
    /// The physical transaction is opened on first use. A driver error from
    /// `f` is returned unchanged as [`Error::Driver`]; the ad-hoc level is then
    /// rolled back, which collapses the whole store.
    ///
    /// `f` must not call back into this store.
    pub fn execute<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut D::Connection) -> std::result::Result<T, D::Error>,
    {
        let txn = self.begin()?;
        let value = self.inner.with_connection(f)?;
        txn.commit()?;
        Ok(value)
    }

    pub(crate) fn participant(&self) -> Arc<dyn Participant> {
        Arc::clone(&self.inner) as Arc<dyn Participant>
    }
}

impl<D: Driver> fmt::Debug for Store<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("name", &self.inner.name)
            .field("kind", &self.inner.driver.kind())
            .field("depth", &self.transactions_count())
            .field("physical", &self.has_physical_transaction())
            .finish()
    }
}

/// One nesting level inside a store
///
/// Dropping an `Opened` handle rolls it back.
#[must_use = "dropping a StoreTransaction without commit rolls it back"]
pub struct StoreTransaction {
    handle: LevelHandle,
}

impl StoreTransaction {
    fn new(handle: LevelHandle) -> Self {
        Self { handle }
    }

    /// Current state
    pub fn state(&self) -> TransactionState {
        self.handle.state()
    }

    /// Name of the owning store
    pub fn store_name(&self) -> &str {
        self.handle.store_name()
    }

    /// Commit this level
    ///
    /// Fails with a protocol error unless this is the store's innermost open
    /// level. Physical commit happens only when the outermost level closes.
    pub fn commit(&self) -> Result<()> {
        self.handle.commit()
    }

    /// Roll back this level and, with it, every level of the store
    ///
    /// A no-op if already rolled back.
    pub fn rollback(&self) -> Result<()> {
        self.handle.rollback()
    }
}

impl Drop for StoreTransaction {
    fn drop(&mut self) {
        if self.handle.state().is_opened() {
            warn!(
                target: "polystore::store",
                store = %self.handle.store_name(),
                "Transaction dropped without commit; rolling back"
            );
            if let Err(e) = self.handle.rollback() {
                warn!(
                    target: "polystore::store",
                    store = %self.handle.store_name(),
                    error = %e,
                    "Rollback on scope exit failed"
                );
            }
        }
    }
}

impl fmt::Debug for StoreTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreTransaction")
            .field("store", &self.handle.store_name())
            .field("state", &self.state())
            .finish()
    }
}
