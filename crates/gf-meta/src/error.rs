//! Error types for the execution ledger.

use thiserror::Error;

/// Ledger errors.
#[derive(Error, Debug)]
pub enum MetaError {
    /// Schema migration failed (M002).
    #[error("[M002] Ledger migration failed: {0}")]
    MigrationError(String),

    /// Ledger written by a newer build (M004).
    #[error("[M004] Ledger version {found} is newer than this build supports (v{supported})")]
    UnsupportedVersion { found: u32, supported: u32 },

    /// SQL execution error against the ledger tables (M003).
    #[error("[M003] Ledger query failed: {0}")]
    QueryError(String),

    /// DuckDB driver error with preserved source chain (M007).
    #[error("[M007] DuckDB error")]
    DuckDb(#[source] duckdb::Error),
}

/// Result type alias for [`MetaError`].
pub type MetaResult<T> = Result<T, MetaError>;

impl From<duckdb::Error> for MetaError {
    fn from(err: duckdb::Error) -> Self {
        MetaError::DuckDb(err)
    }
}
