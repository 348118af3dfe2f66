//! Store configuration via `polystore.toml`
//!
//! Each `[[store]]` entry declares one backend the coordinator manages.
//! Stores are registered in declaration order, which is also the order
//! coordinator-level transactions commit them in.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Conventional config file name.
pub const CONFIG_FILE_NAME: &str = "polystore.toml";

/// Drivers the bundled assembly code knows how to build.
pub const SUPPORTED_DRIVERS: &[&str] = &["sqlite"];

/// One backend connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoreConfig {
    /// Store name, unique within a coordinator
    pub name: String,
    /// Driver identity (e.g. `"sqlite"`)
    pub driver: String,
    /// Connection descriptor; for SQLite this is the database path
    pub connection: String,
    /// How long a connection waits on a locked database, in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub busy_timeout_ms: Option<u64>,
}

/// Configuration for a whole coordinator.
///
/// # Example
///
/// ```toml
/// [[store]]
/// name = "orders"
/// driver = "sqlite"
/// connection = "data/orders.db"
///
/// [[store]]
/// name = "billing"
/// driver = "sqlite"
/// connection = "data/billing.db"
/// busy_timeout_ms = 2000
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoresConfig {
    /// Stores in registration order
    #[serde(default, rename = "store")]
    pub stores: Vec<StoreConfig>,
}

impl StoresConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: StoresConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a config file.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::configuration(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content).map_err(|e| match e {
            Error::Configuration(msg) => Error::configuration(format!(
                "Invalid config file '{}': {}",
                path.display(),
                msg
            )),
            other => other,
        })
    }

    /// Check names are unique and non-empty and drivers are supported.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for store in &self.stores {
            if store.name.trim().is_empty() {
                return Err(Error::configuration("Store name must not be empty"));
            }
            if !seen.insert(store.name.as_str()) {
                return Err(Error::configuration(format!(
                    "Store with name [{}] declared more than once",
                    store.name
                )));
            }
            if !SUPPORTED_DRIVERS.contains(&store.driver.as_str()) {
                return Err(Error::configuration(format!(
                    "Unsupported driver '{}' for store [{}]. Expected one of: {}",
                    store.driver,
                    store.name,
                    SUPPORTED_DRIVERS.join(", ")
                )));
            }
        }
        Ok(())
    }

    /// Look up a store by name.
    pub fn store(&self, name: &str) -> Option<&StoreConfig> {
        self.stores.iter().find(|s| s.name == name)
    }
}
