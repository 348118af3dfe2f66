//! Deferred calls fired at the first physical commit
//!
//! A trigger is registered against a coordinator-level transaction and runs
//! exactly once, right before the first participating store physically
//! commits. Rollback discards every queued trigger without running it.
//!
//! Triggers are deduplicated by [`TriggerKey`]: a target name plus the
//! argument values captured at registration time. Registering the same key
//! twice keeps the first body and drops the second.

use polystore_core::Result;
use std::collections::HashSet;
use std::fmt;
use tracing::debug;

/// Body of a deferred call
pub type TriggerFn = Box<dyn FnOnce() -> Result<()> + Send + 'static>;

/// One argument value in a trigger's dedup key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TriggerArg {
    /// Absent value
    Null,
    /// Boolean
    Bool(bool),
    /// Signed integer
    Int(i64),
    /// Unsigned integer
    UInt(u64),
    /// UTF-8 text
    Text(String),
    /// Raw bytes
    Bytes(Vec<u8>),
}

impl From<bool> for TriggerArg {
    fn from(v: bool) -> Self {
        TriggerArg::Bool(v)
    }
}

impl From<i32> for TriggerArg {
    fn from(v: i32) -> Self {
        TriggerArg::Int(v.into())
    }
}

impl From<i64> for TriggerArg {
    fn from(v: i64) -> Self {
        TriggerArg::Int(v)
    }
}

impl From<u32> for TriggerArg {
    fn from(v: u32) -> Self {
        TriggerArg::UInt(v.into())
    }
}

impl From<u64> for TriggerArg {
    fn from(v: u64) -> Self {
        TriggerArg::UInt(v)
    }
}

impl From<&str> for TriggerArg {
    fn from(v: &str) -> Self {
        TriggerArg::Text(v.to_string())
    }
}

impl From<String> for TriggerArg {
    fn from(v: String) -> Self {
        TriggerArg::Text(v)
    }
}

impl From<Vec<u8>> for TriggerArg {
    fn from(v: Vec<u8>) -> Self {
        TriggerArg::Bytes(v)
    }
}

impl<T: Into<TriggerArg>> From<Option<T>> for TriggerArg {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(TriggerArg::Null)
    }
}

/// Identity of a deferred call: target name and positional argument values
///
/// ```ignore
/// let key = TriggerKey::new("orders::refresh_totals").arg(order_id);
/// txn.add_trigger(key, move || refresh_totals(order_id))?;
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TriggerKey {
    target: String,
    args: Vec<TriggerArg>,
}

impl TriggerKey {
    /// Key with no arguments
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            args: Vec::new(),
        }
    }

    /// Append a positional argument
    pub fn arg(mut self, value: impl Into<TriggerArg>) -> Self {
        self.args.push(value.into());
        self
    }

    /// Target name
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Positional arguments
    pub fn args(&self) -> &[TriggerArg] {
        &self.args
    }
}

impl fmt::Display for TriggerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.target)?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{:?}", arg)?;
        }
        f.write_str(")")
    }
}

/// Insertion-ordered, deduplicated list of deferred calls
#[derive(Default)]
pub struct TriggerQueue {
    keys: HashSet<TriggerKey>,
    entries: Vec<(TriggerKey, TriggerFn)>,
}

impl TriggerQueue {
    /// Empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `body` unless an entry with the same key is already queued.
    ///
    /// Returns `true` if the entry was added.
    pub fn add(&mut self, key: TriggerKey, body: TriggerFn) -> bool {
        if self.keys.contains(&key) {
            debug!(target: "polystore::trigger", key = %key, "Duplicate trigger ignored");
            return false;
        }
        self.keys.insert(key.clone());
        self.entries.push((key, body));
        true
    }

    /// Number of queued entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing is queued
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry without running it
    pub fn clear(&mut self) {
        self.keys.clear();
        self.entries.clear();
    }

    /// Detach all entries, leaving the queue empty
    pub fn take(&mut self) -> TriggerQueue {
        std::mem::take(self)
    }

    /// Run every entry once, in registration order
    ///
    /// Stops at the first failing entry; entries after it are dropped.
    pub fn flush(self) -> Result<()> {
        for (key, body) in self.entries {
            debug!(target: "polystore::trigger", key = %key, "Running trigger");
            body()?;
        }
        Ok(())
    }
}

impl fmt::Debug for TriggerQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|(key, _)| key))
            .finish()
    }
}
