//! SQLite backend for Polystore
//!
//! Each store gets its own `rusqlite::Connection`, opened lazily when work
//! first reaches the store and closed again after the physical transaction
//! ends. Physical transactions use plain `BEGIN`/`COMMIT`/`ROLLBACK`.
//!
//! ```ignore
//! let config = StoresConfig::from_file(Path::new("polystore.toml"))?;
//! let (coordinator, stores) = open_stores(&config)?;
//!
//! let txn = coordinator.begin()?;
//! stores[0].execute(|conn| conn.execute("INSERT INTO Test VALUES (1)", []))?;
//! txn.commit()?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

use polystore_core::{Driver, Error, Result, StoreConfig, StoresConfig};
use polystore_engine::{Coordinator, Store};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Driver name used in configuration files
pub const DRIVER_NAME: &str = "sqlite";

/// Connection string that opens a private in-memory database
pub const IN_MEMORY: &str = ":memory:";

/// Driver for one SQLite database file
#[derive(Debug, Clone)]
pub struct SqliteDriver {
    path: PathBuf,
    descriptor: String,
    busy_timeout: Option<Duration>,
}

impl SqliteDriver {
    /// Driver for the database at `path`
    ///
    /// Nothing is opened until a connection is requested.
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        Self {
            descriptor: path.display().to_string(),
            path,
            busy_timeout: None,
        }
    }

    /// Set how long a connection waits on a locked database
    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = Some(timeout);
        self
    }

    /// Build a driver from one `[[store]]` entry
    pub fn from_config(config: &StoreConfig) -> Result<Self> {
        if config.driver != DRIVER_NAME {
            return Err(Error::configuration(format!(
                "Store [{}] uses driver [{}], expected [{}]",
                config.name, config.driver, DRIVER_NAME
            )));
        }
        if config.connection.is_empty() {
            return Err(Error::configuration(format!(
                "Store [{}] has an empty connection string",
                config.name
            )));
        }
        let mut driver = SqliteDriver::new(&config.connection);
        if let Some(ms) = config.busy_timeout_ms {
            driver = driver.with_busy_timeout(Duration::from_millis(ms));
        }
        Ok(driver)
    }

    /// Database path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Configured busy timeout, if any
    pub fn busy_timeout(&self) -> Option<Duration> {
        self.busy_timeout
    }
}

impl Driver for SqliteDriver {
    type Connection = Connection;
    type Error = rusqlite::Error;

    fn kind(&self) -> &'static str {
        DRIVER_NAME
    }

    fn descriptor(&self) -> &str {
        &self.descriptor
    }

    fn connect(&self) -> std::result::Result<Connection, rusqlite::Error> {
        let conn = if self.descriptor == IN_MEMORY {
            Connection::open_in_memory()?
        } else {
            Connection::open(&self.path)?
        };
        if let Some(timeout) = self.busy_timeout {
            conn.busy_timeout(timeout)?;
        }
        debug!(target: "polystore::store", path = %self.descriptor, "SQLite connection opened");
        Ok(conn)
    }

    fn begin(&self, conn: &mut Connection) -> std::result::Result<(), rusqlite::Error> {
        conn.execute_batch("BEGIN")
    }

    fn commit(&self, conn: &mut Connection) -> std::result::Result<(), rusqlite::Error> {
        conn.execute_batch("COMMIT")
    }

    fn rollback(&self, conn: &mut Connection) -> std::result::Result<(), rusqlite::Error> {
        conn.execute_batch("ROLLBACK")
    }

    fn close(&self, conn: Connection) -> std::result::Result<(), rusqlite::Error> {
        conn.close().map_err(|(_, e)| e)
    }
}

/// Build a coordinator over every store in `config`, in file order
///
/// The returned stores are registered with the coordinator and listed in the
/// same order. No database is opened.
pub fn open_stores(config: &StoresConfig) -> Result<(Coordinator, Vec<Store<SqliteDriver>>)> {
    config.validate()?;

    let coordinator = Coordinator::new();
    let mut stores = Vec::with_capacity(config.stores.len());
    for entry in &config.stores {
        let store = Store::new(entry.name.clone(), SqliteDriver::from_config(entry)?);
        coordinator.add_store(&store)?;
        stores.push(store);
    }

    info!(target: "polystore::store", count = stores.len(), "SQLite stores configured");
    Ok((coordinator, stores))
}
