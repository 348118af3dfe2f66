//! Transaction engine for Polystore
//!
//! This crate owns the runtime side of the system:
//! - Store: one backend plus its stack of nested logical transactions
//! - Transaction coordination across every registered store
//! - Trigger queue flushed at the first physical commit
//!
//! Backends plug in through [`polystore_core::Driver`]; the engine never
//! issues statements of its own beyond begin/commit/rollback.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod coordinator;
pub mod store;
pub mod transaction;
pub mod trigger;

#[cfg(test)]
mod testing;

pub use coordinator::{Coordinator, CoordinatorMetrics};
pub use polystore_core::{Driver, Error, Result, TransactionState};
pub use store::{Store, StoreTransaction};
pub use transaction::Transaction;
pub use trigger::{TriggerArg, TriggerFn, TriggerKey, TriggerQueue};
