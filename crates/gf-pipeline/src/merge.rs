//! Merge coordinator: folds closed transform units into the warehouse.
//!
//! Merges run one at a time. Each unit file is attached read-only, its data
//! tables and ledger rows are copied in a single warehouse transaction, and
//! the file is detached again whatever the outcome.

use crate::error::{PipelineError, PipelineResult};
use gf_core::sql_utils::{quote_ident, quote_table};
use gf_core::template::{MART_SCHEMA, RAW_SCHEMA, STAGING_SCHEMA};
use gf_db::duckdb::list_tables_sync;
use gf_db::{Database, DuckDbBackend, TableRef};
use gf_meta::ExecutionTracker;
use std::path::Path;

/// Catalog alias a unit is attached under during its merge
const UNIT_ALIAS: &str = "gf_unit";

/// What one merge copied
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub tables: Vec<TableRef>,
    pub ledger_rows: usize,
}

/// Whether a unit schema holds data that belongs in the warehouse
pub fn is_data_schema(schema: &str) -> bool {
    schema == RAW_SCHEMA || schema == MART_SCHEMA || schema.starts_with(STAGING_SCHEMA)
}

/// Copy every data table and ledger row of a unit into the warehouse.
///
/// Existing warehouse tables with the same name are replaced. On any error
/// the transaction is rolled back, so the warehouse holds either all of the
/// unit's tables and records or none of them.
pub async fn merge_unit(
    warehouse: &DuckDbBackend,
    unit_path: &Path,
    dataset_id: &str,
) -> PipelineResult<MergeReport> {
    let merge_error = |message: String| PipelineError::Merge {
        dataset: dataset_id.to_string(),
        message,
    };

    warehouse
        .attach(unit_path, UNIT_ALIAS, true)
        .await
        .map_err(|e| merge_error(e.to_string()))?;

    let result = warehouse
        .transaction(|tx| -> PipelineResult<MergeReport> {
            let tables: Vec<TableRef> = list_tables_sync(tx, Some(UNIT_ALIAS))?
                .into_iter()
                .filter(|t| is_data_schema(&t.schema))
                .collect();
            for table in &tables {
                tx.execute_batch(&format!(
                    "CREATE SCHEMA IF NOT EXISTS {schema};
                     CREATE OR REPLACE TABLE {target} AS SELECT * FROM {alias}.{source}",
                    schema = quote_ident(&table.schema),
                    target = quote_table(&table.schema, &table.table),
                    alias = quote_ident(UNIT_ALIAS),
                    source = quote_table(&table.schema, &table.table),
                ))?;
            }
            let ledger_rows = ExecutionTracker::new(tx).import_from(UNIT_ALIAS)?;
            Ok(MergeReport {
                tables,
                ledger_rows,
            })
        })
        .await;

    if let Err(e) = warehouse.detach(UNIT_ALIAS).await {
        log::warn!("Failed to detach unit of '{}': {}", dataset_id, e);
    }

    match result {
        Ok(report) => {
            log::debug!(
                "[{}] merged {} tables and {} ledger rows",
                dataset_id,
                report.tables.len(),
                report.ledger_rows
            );
            Ok(report)
        }
        Err(e) => Err(merge_error(e.to_string())),
    }
}

#[cfg(test)]
#[path = "merge_test.rs"]
mod tests;
