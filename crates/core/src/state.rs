//! Transaction lifecycle state

use std::fmt;

/// State of a transaction handle
///
/// State transitions:
/// - `Opened` → `Committed` (explicit commit)
/// - `Opened` → `RolledBack` (explicit rollback, scope exit, or cascade)
///
/// Terminal states (no transitions allowed):
/// - `Committed`
/// - `RolledBack`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionState {
    /// Transaction is open and accepts work
    Opened,
    /// Transaction was committed
    Committed,
    /// Transaction was rolled back
    RolledBack,
}

impl TransactionState {
    /// True while the transaction accepts work
    pub fn is_opened(&self) -> bool {
        matches!(self, TransactionState::Opened)
    }

    /// True for `Committed` and `RolledBack`
    pub fn is_terminal(&self) -> bool {
        !self.is_opened()
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransactionState::Opened => "opened",
            TransactionState::Committed => "committed",
            TransactionState::RolledBack => "rolled back",
        };
        f.write_str(s)
    }
}
