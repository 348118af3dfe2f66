//! Polystore - logical transactions spanning several independent SQL stores
//!
//! A [`Coordinator`] groups any number of [`Store`]s, each backed by its own
//! database connection. A coordinator-level [`Transaction`] opens one nested
//! logical transaction in every store; physical transactions are only started
//! when work actually reaches a store, and only committed when the outermost
//! level closes.
//!
//! # Quick Start
//!
//! ```ignore
//! use polystore::{Coordinator, SqliteDriver, Store};
//!
//! let orders = Store::new("orders", SqliteDriver::new("orders.db"));
//! let billing = Store::new("billing", SqliteDriver::new("billing.db"));
//!
//! let coordinator = Coordinator::new();
//! coordinator.add_store(&orders)?;
//! coordinator.add_store(&billing)?;
//!
//! coordinator.transaction(|_txn| {
//!     orders.execute(|conn| conn.execute("INSERT INTO Test VALUES (1)", []))?;
//!     billing.execute(|conn| conn.execute("INSERT INTO Test VALUES (1)", []))?;
//!     Ok(())
//! })?;
//! ```
//!
//! # Guarantees
//!
//! There is no two-phase commit. Stores commit one after another in
//! registration order; a failure part way leaves earlier stores committed and
//! is reported as [`Error::UnknownState`] when the backend outcome cannot be
//! known.

pub use polystore_core::{
    config, BoxError, Driver, Error, Result, StoreConfig, StoresConfig, TransactionState,
};
pub use polystore_engine::{
    Coordinator, CoordinatorMetrics, Store, StoreTransaction, Transaction, TriggerArg, TriggerFn,
    TriggerKey, TriggerQueue,
};

#[cfg(feature = "sqlite")]
pub use polystore_sqlite::{open_stores, SqliteDriver};
