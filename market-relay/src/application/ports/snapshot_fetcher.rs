use crate::domain::{FetchError, Snapshot, Symbol};

/// Source of market data snapshots.
///
/// Called from worker threads; implementations may block on network I/O.
/// The pool size bounds how many fetches are outstanding at once.
pub trait SnapshotFetcher: Send + Sync {
    fn fetch(&self, symbol: &Symbol) -> Result<Snapshot, FetchError>;
}

impl<F> SnapshotFetcher for F
where
    F: Fn(&Symbol) -> Result<Snapshot, FetchError> + Send + Sync,
{
    fn fetch(&self, symbol: &Symbol) -> Result<Snapshot, FetchError> {
        self(symbol)
    }
}
