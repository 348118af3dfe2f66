//! Core types and traits for Polystore
//!
//! This crate defines the foundational types shared by every layer:
//! - TransactionState: lifecycle of every transaction-like handle
//! - Error: Error type hierarchy (configuration, protocol, unknown state, driver)
//! - Driver: the capability contract a backend must satisfy
//! - StoresConfig: declarative store configuration loaded from TOML

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod driver;
pub mod error;
pub mod state;

pub use config::{StoreConfig, StoresConfig};
pub use driver::Driver;
pub use error::{BoxError, Error, Result};
pub use state::TransactionState;
