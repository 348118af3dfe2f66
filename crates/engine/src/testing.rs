//! In-memory driver for engine unit tests
//!
//! Models a single table of integer primary keys. Rows become visible in
//! `rows()` only after a physical commit. Each counter records how often the
//! engine reached the corresponding driver operation.

use parking_lot::Mutex;
use polystore_core::Driver;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub(crate) enum MemoryError {
    #[error("duplicate key {0}")]
    Duplicate(i64),
    #[error("connection is closed")]
    Closed,
    #[error("injected {0} failure")]
    Injected(&'static str),
}

#[derive(Default)]
struct Backend {
    rows: Vec<i64>,
    connects: usize,
    commits: usize,
    rollbacks: usize,
    disposals: usize,
    fail_connect: bool,
    fail_commit: bool,
    fail_rollback: bool,
}

#[derive(Clone)]
pub(crate) struct MemoryDriver {
    descriptor: String,
    backend: Arc<Mutex<Backend>>,
}

pub(crate) struct MemoryConnection {
    backend: Arc<Mutex<Backend>>,
    pending: Vec<i64>,
    open: bool,
}

impl MemoryConnection {
    pub(crate) fn insert(&mut self, id: i64) -> Result<(), MemoryError> {
        if !self.open {
            return Err(MemoryError::Closed);
        }
        if self.pending.contains(&id) || self.backend.lock().rows.contains(&id) {
            return Err(MemoryError::Duplicate(id));
        }
        self.pending.push(id);
        Ok(())
    }

    /// Drop the session server-side, losing pending work
    pub(crate) fn terminate(&mut self) -> Result<(), MemoryError> {
        self.pending.clear();
        self.open = false;
        Ok(())
    }
}

impl MemoryDriver {
    pub(crate) fn new(descriptor: &str) -> Self {
        Self {
            descriptor: descriptor.to_string(),
            backend: Arc::new(Mutex::new(Backend::default())),
        }
    }

    pub(crate) fn rows(&self) -> Vec<i64> {
        let mut rows = self.backend.lock().rows.clone();
        rows.sort_unstable();
        rows
    }

    pub(crate) fn connects(&self) -> usize {
        self.backend.lock().connects
    }

    pub(crate) fn commits(&self) -> usize {
        self.backend.lock().commits
    }

    pub(crate) fn rollbacks(&self) -> usize {
        self.backend.lock().rollbacks
    }

    pub(crate) fn disposals(&self) -> usize {
        self.backend.lock().disposals
    }

    pub(crate) fn fail_next_connect(&self) {
        self.backend.lock().fail_connect = true;
    }

    pub(crate) fn fail_next_commit(&self) {
        self.backend.lock().fail_commit = true;
    }

    pub(crate) fn fail_next_rollback(&self) {
        self.backend.lock().fail_rollback = true;
    }
}

impl Driver for MemoryDriver {
    type Connection = MemoryConnection;
    type Error = MemoryError;

    fn kind(&self) -> &'static str {
        "memory"
    }

    fn descriptor(&self) -> &str {
        &self.descriptor
    }

    fn connect(&self) -> Result<MemoryConnection, MemoryError> {
        let mut backend = self.backend.lock();
        if std::mem::take(&mut backend.fail_connect) {
            return Err(MemoryError::Injected("connect"));
        }
        backend.connects += 1;
        Ok(MemoryConnection {
            backend: Arc::clone(&self.backend),
            pending: Vec::new(),
            open: true,
        })
    }

    fn begin(&self, _conn: &mut MemoryConnection) -> Result<(), MemoryError> {
        Ok(())
    }

    fn commit(&self, conn: &mut MemoryConnection) -> Result<(), MemoryError> {
        let mut backend = self.backend.lock();
        if std::mem::take(&mut backend.fail_commit) {
            return Err(MemoryError::Injected("commit"));
        }
        if !conn.open {
            return Err(MemoryError::Closed);
        }
        backend.rows.append(&mut conn.pending);
        backend.commits += 1;
        Ok(())
    }

    fn rollback(&self, conn: &mut MemoryConnection) -> Result<(), MemoryError> {
        let mut backend = self.backend.lock();
        conn.pending.clear();
        if std::mem::take(&mut backend.fail_rollback) {
            return Err(MemoryError::Injected("rollback"));
        }
        if !conn.open {
            return Err(MemoryError::Closed);
        }
        backend.rollbacks += 1;
        Ok(())
    }

    fn close(&self, mut conn: MemoryConnection) -> Result<(), MemoryError> {
        conn.open = false;
        Ok(())
    }

    fn dispose(&self, conn: MemoryConnection) {
        self.backend.lock().disposals += 1;
        drop(conn);
    }
}
