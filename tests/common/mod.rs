//! Shared test utilities for the scenario suites.
//!
//! Import via `mod common;` from the suite's main.rs.

#![allow(dead_code)]

use polystore::{Coordinator, SqliteDriver, Store};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

// ============================================================================
// TwoStores - coordinator over two SQLite files
// ============================================================================

/// Two SQLite stores, each with an empty `Test` table, registered on one coordinator
pub struct TwoStores {
    pub coordinator: Coordinator,
    pub store1: Store<SqliteDriver>,
    pub store2: Store<SqliteDriver>,
    pub dir: TempDir,
}

impl TwoStores {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("create temp dir");
        let store1 = Store::new("test1", SqliteDriver::new(create_db(dir.path(), "test1.db")));
        let store2 = Store::new("test2", SqliteDriver::new(create_db(dir.path(), "test2.db")));

        let coordinator = Coordinator::new();
        coordinator.add_store(&store1).expect("register test1");
        coordinator.add_store(&store2).expect("register test2");

        Self {
            coordinator,
            store1,
            store2,
            dir,
        }
    }

    /// Committed row ids of the store's `Test` table, ascending
    pub fn rows(&self, store: &Store<SqliteDriver>) -> Vec<i64> {
        rows(store.driver().path())
    }

    pub fn assert_idle(&self) {
        assert_eq!(self.coordinator.transactions_count(), 0);
        for store in [&self.store1, &self.store2] {
            assert_eq!(store.transactions_count(), 0, "store {}", store.name());
            assert!(!store.has_physical_transaction(), "store {}", store.name());
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Create a database file holding an empty `Test` table
pub fn create_db(dir: &Path, file: &str) -> PathBuf {
    let path = dir.join(file);
    let conn = Connection::open(&path).expect("open database");
    conn.execute_batch("CREATE TABLE Test (id INTEGER PRIMARY KEY)")
        .expect("create table");
    path
}

/// Read committed rows through a separate connection
pub fn rows(path: &Path) -> Vec<i64> {
    let conn = Connection::open(path).expect("open database");
    let mut stmt = conn
        .prepare("SELECT id FROM Test ORDER BY id")
        .expect("prepare");
    let ids = stmt
        .query_map([], |row| row.get(0))
        .expect("query")
        .collect::<Result<Vec<i64>, _>>()
        .expect("read rows");
    ids
}

/// Insert `id` into the store's `Test` table
pub fn insert(store: &Store<SqliteDriver>, id: i64) -> polystore::Result<()> {
    store.execute(|conn| conn.execute("INSERT INTO Test (id) VALUES (?1)", [id]).map(|_| ()))
}
