//! Execution tracker: which templates have been applied to which datasets.
//!
//! The tracker borrows a connection (or a transaction, through deref) so the
//! same code serves the warehouse ledger and each unit's private ledger.

use crate::error::{MetaError, MetaResult};
use chrono::Utc;
use duckdb::Connection;
use serde::Serialize;
use std::collections::HashMap;

const SELECT_RECORD: &str = "SELECT template_id, dataset_id, checksum, \
     strftime(applied_at, '%Y-%m-%d %H:%M:%S.%f') FROM gf_meta.template_runs";

/// `applied_at` text form, UTC with microseconds
const APPLIED_AT_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// One ledger row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionRecord {
    pub template_id: String,
    pub dataset_id: String,
    pub checksum: String,
    pub applied_at: String,
}

impl ExecutionRecord {
    fn from_row(row: &duckdb::Row<'_>) -> duckdb::Result<Self> {
        Ok(Self {
            template_id: row.get(0)?,
            dataset_id: row.get(1)?,
            checksum: row.get(2)?,
            applied_at: row.get(3)?,
        })
    }
}

/// In-memory copy of the ledger taken before a phase starts
#[derive(Debug, Clone, Default)]
pub struct LedgerSnapshot {
    checksums: HashMap<(String, String), String>,
}

impl LedgerSnapshot {
    /// Stored checksum of a pair
    pub fn checksum(&self, template_id: &str, dataset_id: &str) -> Option<&str> {
        self.checksums
            .get(&(template_id.to_string(), dataset_id.to_string()))
            .map(String::as_str)
    }

    /// A record exists and carries `checksum`
    pub fn is_current(&self, template_id: &str, dataset_id: &str, checksum: &str) -> bool {
        self.checksum(template_id, dataset_id) == Some(checksum)
    }

    /// A record exists at all
    pub fn has_run(&self, template_id: &str, dataset_id: &str) -> bool {
        self.checksum(template_id, dataset_id).is_some()
    }

    /// Drop the records of a dataset (mirrors a `clear_dataset` on the ledger)
    pub fn forget_dataset(&mut self, dataset_id: &str) {
        self.checksums.retain(|(_, d), _| d != dataset_id);
    }

    pub fn len(&self) -> usize {
        self.checksums.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checksums.is_empty()
    }
}

/// Ledger operations on `gf_meta.template_runs`
pub struct ExecutionTracker<'a> {
    conn: &'a Connection,
}

impl<'a> ExecutionTracker<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Whether a record exists for the pair
    pub fn has_run(&self, template_id: &str, dataset_id: &str) -> MetaResult<bool> {
        Ok(self.lookup(template_id, dataset_id)?.is_some())
    }

    /// The record for a pair, if any
    pub fn lookup(&self, template_id: &str, dataset_id: &str) -> MetaResult<Option<ExecutionRecord>> {
        let sql = format!("{SELECT_RECORD} WHERE template_id = ? AND dataset_id = ?");
        match self.conn.query_row(
            &sql,
            duckdb::params![template_id, dataset_id],
            ExecutionRecord::from_row,
        ) {
            Ok(record) => Ok(Some(record)),
            Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(MetaError::QueryError(format!("lookup template run: {e}"))),
        }
    }

    /// Whether the stored record carries `checksum`
    pub fn is_current(&self, template_id: &str, dataset_id: &str, checksum: &str) -> MetaResult<bool> {
        Ok(self
            .lookup(template_id, dataset_id)?
            .is_some_and(|r| r.checksum == checksum))
    }

    /// Insert or supersede the record for a pair.
    ///
    /// `applied_at` is taken when the call is made, not at transaction start,
    /// so records written one after another inside a transaction stay ordered.
    pub fn record(&self, template_id: &str, dataset_id: &str, checksum: &str) -> MetaResult<()> {
        let applied_at = Utc::now().format(APPLIED_AT_FORMAT).to_string();
        self.conn
            .execute(
                "INSERT INTO gf_meta.template_runs (template_id, dataset_id, checksum, applied_at)
                 VALUES (?, ?, ?, CAST(? AS TIMESTAMP))
                 ON CONFLICT (template_id, dataset_id)
                 DO UPDATE SET checksum = EXCLUDED.checksum, applied_at = EXCLUDED.applied_at",
                duckdb::params![template_id, dataset_id, checksum, applied_at],
            )
            .map_err(|e| MetaError::QueryError(format!("record template run: {e}")))?;
        Ok(())
    }

    /// Remove the record of a pair; returns whether one existed
    pub fn force_clear(&self, template_id: &str, dataset_id: &str) -> MetaResult<bool> {
        let n = self
            .conn
            .execute(
                "DELETE FROM gf_meta.template_runs WHERE template_id = ? AND dataset_id = ?",
                duckdb::params![template_id, dataset_id],
            )
            .map_err(|e| MetaError::QueryError(format!("clear template run: {e}")))?;
        Ok(n > 0)
    }

    /// Remove every record of a dataset
    pub fn clear_dataset(&self, dataset_id: &str) -> MetaResult<usize> {
        self.conn
            .execute(
                "DELETE FROM gf_meta.template_runs WHERE dataset_id = ?",
                duckdb::params![dataset_id],
            )
            .map_err(|e| MetaError::QueryError(format!("clear dataset runs: {e}")))
    }

    /// Remove every record of a template
    pub fn clear_template(&self, template_id: &str) -> MetaResult<usize> {
        self.conn
            .execute(
                "DELETE FROM gf_meta.template_runs WHERE template_id = ?",
                duckdb::params![template_id],
            )
            .map_err(|e| MetaError::QueryError(format!("clear template runs: {e}")))
    }

    /// Records of a dataset ordered by template id
    pub fn records_for_dataset(&self, dataset_id: &str) -> MetaResult<Vec<ExecutionRecord>> {
        let sql = format!("{SELECT_RECORD} WHERE dataset_id = ? ORDER BY template_id");
        self.collect(&sql, duckdb::params![dataset_id])
    }

    /// All records ordered by dataset then template
    pub fn list(&self) -> MetaResult<Vec<ExecutionRecord>> {
        let sql = format!("{SELECT_RECORD} ORDER BY dataset_id, template_id");
        self.collect(&sql, duckdb::params![])
    }

    /// Copy of the whole ledger
    pub fn snapshot(&self) -> MetaResult<LedgerSnapshot> {
        let checksums = self
            .list()?
            .into_iter()
            .map(|r| ((r.template_id, r.dataset_id), r.checksum))
            .collect();
        Ok(LedgerSnapshot { checksums })
    }

    /// Upsert every record of an attached database's ledger into this one.
    ///
    /// `catalog` is the alias the other database was attached under.
    pub fn import_from(&self, catalog: &str) -> MetaResult<usize> {
        let sql = format!(
            "INSERT INTO gf_meta.template_runs (template_id, dataset_id, checksum, applied_at)
             SELECT template_id, dataset_id, checksum, applied_at
             FROM \"{}\".gf_meta.template_runs
             ON CONFLICT (template_id, dataset_id)
             DO UPDATE SET checksum = EXCLUDED.checksum, applied_at = EXCLUDED.applied_at",
            catalog.replace('"', "\"\"")
        );
        self.conn
            .execute(&sql, [])
            .map_err(|e| MetaError::QueryError(format!("import ledger from {catalog}: {e}")))
    }

    fn collect(&self, sql: &str, params: &[&dyn duckdb::ToSql]) -> MetaResult<Vec<ExecutionRecord>> {
        let mut stmt = self
            .conn
            .prepare(sql)
            .map_err(|e| MetaError::QueryError(format!("prepare ledger query: {e}")))?;
        let rows = stmt
            .query_map(params, ExecutionRecord::from_row)
            .map_err(|e| MetaError::QueryError(format!("ledger query: {e}")))?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }
}

#[cfg(test)]
#[path = "tracker_test.rs"]
mod tests;
