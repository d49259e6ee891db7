//! Snapshot writing shared by the built-in connectors

use super::{ExtractContext, SnapshotResult};
use crate::cancel::CancellationFlag;
use crate::error::ConnectorError;
use duckdb::Connection;
use gf_core::sql_utils::escape_sql_string;
use gf_db::{Database, DbError, DuckDbBackend};
use std::path::Path;

/// Materialize `select_sql` into the context's snapshot path.
///
/// Runs in a scratch in-memory database with `extensions` loaded and the
/// optional `setup` batch executed first. The parquet file is written next to
/// its final location and renamed into place, so a failed extract never
/// leaves a partial snapshot behind.
///
/// The write outlives the calling future when that future is dropped (an
/// extract timeout). The blocking side therefore checks `ctx.cancel` once the
/// COPY returns and, when set, deletes the temporary file instead of renaming.
pub async fn write_snapshot(
    ctx: &ExtractContext,
    extensions: &[String],
    setup: Option<&str>,
    select_sql: &str,
) -> Result<SnapshotResult, ConnectorError> {
    ctx.check_cancelled()?;

    let backend = DuckDbBackend::in_memory()?;
    let failed = backend.load_extensions(extensions).await;
    if !failed.is_empty() {
        ctx.log
            .warn(&format!("extensions not available: {}", failed.join(", ")));
    }

    if let Some(parent) = ctx.snapshot_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp_path = ctx.snapshot_path.with_extension("parquet.tmp");
    let copy_sql = format!(
        "COPY ({}) TO '{}' (FORMAT PARQUET)",
        select_sql,
        escape_sql_string(&tmp_path.display().to_string())
    );
    let count_sql = format!(
        "SELECT COUNT(*) FROM read_parquet('{}')",
        escape_sql_string(&tmp_path.display().to_string())
    );
    let setup = setup.map(str::to_string);
    let cancel = ctx.cancel.clone();
    let final_path = ctx.snapshot_path.clone();

    ctx.progress.report("writing snapshot");
    let row_count = backend
        .run(move |conn| -> Result<u64, ConnectorError> {
            let written = copy_to_tmp(
                conn,
                setup.as_deref(),
                &copy_sql,
                &count_sql,
                &cancel,
            )
            .and_then(|count| {
                std::fs::rename(&tmp_path, &final_path)?;
                Ok(count)
            });
            if written.is_err() {
                remove_if_exists(&tmp_path);
            }
            written
        })
        .await?;

    ctx.log.debug(&format!(
        "wrote {} rows to {}",
        row_count,
        ctx.snapshot_path.display()
    ));

    Ok(SnapshotResult {
        row_count,
        snapshot_path: ctx.snapshot_path.clone(),
        message: None,
    })
}

/// Run the COPY and count its rows; `Cancelled` when the job was abandoned
/// while the COPY ran.
fn copy_to_tmp(
    conn: &Connection,
    setup: Option<&str>,
    copy_sql: &str,
    count_sql: &str,
    cancel: &CancellationFlag,
) -> Result<u64, ConnectorError> {
    if cancel.is_cancelled() {
        return Err(ConnectorError::Cancelled);
    }
    if let Some(setup) = setup {
        conn.execute_batch(setup).map_err(DbError::from)?;
    }
    conn.execute_batch(copy_sql).map_err(DbError::from)?;
    let count: i64 = conn
        .query_row(count_sql, [], |row| row.get(0))
        .map_err(DbError::from)?;
    if cancel.is_cancelled() {
        return Err(ConnectorError::Cancelled);
    }
    Ok(count.max(0) as u64)
}

fn remove_if_exists(path: &Path) {
    if path.exists() {
        if let Err(e) = std::fs::remove_file(path) {
            log::warn!("Failed to remove {}: {}", path.display(), e);
        }
    }
}
