//! Ledger schema versions.
//!
//! The warehouse and every transform unit carry the same `gf_meta` tables,
//! and a merge copies a unit's ledger rows straight into the warehouse. Both
//! sides must therefore be on the version this build writes. A database whose
//! ledger is newer than [`LEDGER_VERSION`] is refused instead of written with
//! an older layout.

use crate::error::{MetaError, MetaResult};
use duckdb::Connection;

/// Ledger layouts in order; entry `i` brings a ledger to version `i + 1`
const LAYOUTS: &[&str] = &[include_str!("ledger_v001.sql")];

/// Ledger version written by this build
pub const LEDGER_VERSION: u32 = LAYOUTS.len() as u32;

/// Version change made by [`migrate_ledger`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerUpgrade {
    pub from: u32,
    pub to: u32,
}

impl LedgerUpgrade {
    /// The database had no ledger before
    pub fn is_fresh(&self) -> bool {
        self.from == 0
    }

    /// Layouts applied by this call
    pub fn applied(&self) -> u32 {
        self.to - self.from
    }
}

/// Ledger version of a database; 0 when it has no ledger yet.
///
/// Read-only: nothing is created.
pub fn ledger_version(conn: &Connection) -> MetaResult<u32> {
    let has_table: bool = conn
        .query_row(
            "SELECT COUNT(*) > 0 FROM information_schema.tables
             WHERE table_schema = 'gf_meta' AND table_name = 'schema_version'",
            [],
            |row| row.get(0),
        )
        .map_err(|e| MetaError::MigrationError(format!("inspect ledger: {e}")))?;
    if !has_table {
        return Ok(0);
    }
    let version: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM gf_meta.schema_version",
            [],
            |row| row.get(0),
        )
        .map_err(|e| MetaError::MigrationError(format!("read ledger version: {e}")))?;
    Ok(u32::try_from(version).unwrap_or(0))
}

/// Bring a database's ledger to [`LEDGER_VERSION`].
///
/// Each layout and its version row are applied as one batch.
pub fn migrate_ledger(conn: &Connection) -> MetaResult<LedgerUpgrade> {
    let from = ledger_version(conn)?;
    if from > LEDGER_VERSION {
        return Err(MetaError::UnsupportedVersion {
            found: from,
            supported: LEDGER_VERSION,
        });
    }
    if from == 0 {
        conn.execute_batch(
            "CREATE SCHEMA IF NOT EXISTS gf_meta;
             CREATE TABLE IF NOT EXISTS gf_meta.schema_version (
                 version    INTEGER   NOT NULL,
                 applied_at TIMESTAMP NOT NULL DEFAULT now()
             );",
        )
        .map_err(|e| MetaError::MigrationError(format!("create ledger schema: {e}")))?;
    }

    for (version, layout) in (1..=LEDGER_VERSION).zip(LAYOUTS).skip(from as usize) {
        log::debug!("Applying ledger layout v{:03}", version);
        conn.execute_batch(&format!(
            "{layout}\nINSERT INTO gf_meta.schema_version (version) VALUES ({version});"
        ))
        .map_err(|e| MetaError::MigrationError(format!("ledger layout v{version:03}: {e}")))?;
    }

    Ok(LedgerUpgrade {
        from,
        to: LEDGER_VERSION,
    })
}
