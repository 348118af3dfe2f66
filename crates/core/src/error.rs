//! Error types for Polystore
//!
//! This module defines all error types used throughout the system.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.
//!
//! Three kinds belong to the transaction protocol itself:
//! - `Configuration`: invalid setup, surfaced at the call that caused it
//! - `Protocol`: the caller broke the LIFO or state discipline
//! - `UnknownState`: a physical commit/rollback failed or an internal invariant
//!   was violated, so the backend outcome is indeterminate
//!
//! Errors raised by a backend during ordinary statement execution are carried
//! as `Driver` and are never reinterpreted.

use thiserror::Error;

/// Boxed error used for opaque driver failures
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type alias for Polystore operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for Polystore
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid setup (duplicate store, membership change mid-transaction, bad config)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Commit/rollback out of order or on a closed transaction
    #[error("Transaction protocol error: {0}")]
    Protocol(String),

    /// Backend outcome cannot be determined from the client side
    #[error("Unknown transaction state: {message}")]
    UnknownState {
        /// Human-readable description
        message: String,
        /// Underlying failure, if any
        #[source]
        source: Option<BoxError>,
    },

    /// Pass-through backend error from statement execution or connection setup
    #[error(transparent)]
    Driver(BoxError),
}

impl Error {
    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Error::Configuration(message.into())
    }

    /// Create a protocol error
    pub fn protocol(message: impl Into<String>) -> Self {
        Error::Protocol(message.into())
    }

    /// Create an unknown-state error without an underlying cause
    pub fn unknown_state(message: impl Into<String>) -> Self {
        Error::UnknownState {
            message: message.into(),
            source: None,
        }
    }

    /// Wrap any failure as `UnknownState`, keeping it as the source
    ///
    /// An error that already is `UnknownState` is returned unchanged.
    pub fn into_unknown_state(self) -> Self {
        match self {
            err @ Error::UnknownState { .. } => err,
            other => Error::UnknownState {
                message: other.to_string(),
                source: Some(Box::new(other)),
            },
        }
    }

    /// Wrap a raw driver failure as `UnknownState`
    pub fn unknown_state_from<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::UnknownState {
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }

    /// Wrap a driver failure for pass-through
    pub fn driver<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::Driver(Box::new(err))
    }

    /// True for `Configuration`
    pub fn is_configuration(&self) -> bool {
        matches!(self, Error::Configuration(_))
    }

    /// True for `Protocol`
    pub fn is_protocol(&self) -> bool {
        matches!(self, Error::Protocol(_))
    }

    /// True for `UnknownState`
    pub fn is_unknown_state(&self) -> bool {
        matches!(self, Error::UnknownState { .. })
    }

    /// True for `Driver`
    pub fn is_driver(&self) -> bool {
        matches!(self, Error::Driver(_))
    }

    /// Recover the original driver error of a pass-through failure
    pub fn downcast_driver<E>(&self) -> Option<&E>
    where
        E: std::error::Error + 'static,
    {
        match self {
            Error::Driver(inner) => inner.downcast_ref::<E>(),
            _ => None,
        }
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Configuration(e.to_string())
    }
}
