//! Backend capability contract
//!
//! The coordination engine never depends on a concrete backend. Everything it
//! needs from a database is expressed by [`Driver`]: open a connection, drive
//! one physical transaction on it, and close it again.

/// Capability interface implemented once per backend
///
/// A driver is stateless with respect to transactions: the engine owns the
/// connection for as long as a physical transaction is cached and hands it back
/// to the driver for every operation.
///
/// Errors returned by the driver are opaque to the engine. It only decides
/// whether they happened during a physical commit/rollback (reported as
/// unknown state) or during ordinary work (passed through unchanged).
pub trait Driver: Send + Sync + 'static {
    /// Physical connection type
    type Connection: Send + 'static;

    /// Driver error type
    type Error: std::error::Error + Send + Sync + 'static;

    /// Short identity of the backend, used in diagnostics (e.g. `"sqlite"`)
    fn kind(&self) -> &'static str;

    /// Connection descriptor, used in diagnostics
    fn descriptor(&self) -> &str;

    /// Open a physical connection
    fn connect(&self) -> Result<Self::Connection, Self::Error>;

    /// Begin a physical transaction on `conn`
    fn begin(&self, conn: &mut Self::Connection) -> Result<(), Self::Error>;

    /// Commit the physical transaction open on `conn`
    fn commit(&self, conn: &mut Self::Connection) -> Result<(), Self::Error>;

    /// Roll back the physical transaction open on `conn`
    fn rollback(&self, conn: &mut Self::Connection) -> Result<(), Self::Error>;

    /// Close the connection gracefully
    fn close(&self, conn: Self::Connection) -> Result<(), Self::Error>;

    /// Force-close a connection whose state is already broken
    ///
    /// Must not fail; secondary errors are swallowed.
    fn dispose(&self, conn: Self::Connection) {
        drop(conn);
    }
}
