//! Run history: one row per run and per (run, dataset, phase).

use crate::error::{MetaError, MetaResult};
use duckdb::Connection;
use serde::Serialize;

/// Outcome of one dataset in one phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatasetRunRecord {
    pub run_id: String,
    pub dataset_id: String,
    pub phase: String,
    pub status: String,
    pub error: Option<String>,
    pub row_count: Option<i64>,
    pub duration_ms: i64,
}

/// One orchestrator invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunRecord {
    pub run_id: String,
    pub mode: String,
    pub status: String,
    pub started_at: String,
    pub finished_at: String,
}

/// Append the outcome of one dataset phase
pub fn record_dataset_run(conn: &Connection, record: &DatasetRunRecord) -> MetaResult<()> {
    conn.execute(
        "INSERT INTO gf_meta.dataset_runs
             (run_id, dataset_id, phase, status, error, row_count, duration_ms)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
        duckdb::params![
            record.run_id,
            record.dataset_id,
            record.phase,
            record.status,
            record.error,
            record.row_count,
            record.duration_ms,
        ],
    )
    .map_err(|e| MetaError::QueryError(format!("record dataset run: {e}")))?;
    Ok(())
}

/// Record a finished run; `started_at` is a UTC `YYYY-MM-DD HH:MM:SS` timestamp
pub fn record_run(
    conn: &Connection,
    run_id: &str,
    mode: &str,
    status: &str,
    started_at: &str,
) -> MetaResult<()> {
    conn.execute(
        "INSERT INTO gf_meta.runs (run_id, mode, status, started_at)
         VALUES (?, ?, ?, CAST(? AS TIMESTAMP))",
        duckdb::params![run_id, mode, status, started_at],
    )
    .map_err(|e| MetaError::QueryError(format!("record run: {e}")))?;
    Ok(())
}

/// Most recent runs, newest first
pub fn recent_runs(conn: &Connection, limit: usize) -> MetaResult<Vec<RunRecord>> {
    let mut stmt = conn
        .prepare(
            "SELECT run_id, mode, status,
                    strftime(started_at, '%Y-%m-%d %H:%M:%S'),
                    strftime(finished_at, '%Y-%m-%d %H:%M:%S')
             FROM gf_meta.runs ORDER BY finished_at DESC, run_id LIMIT ?",
        )
        .map_err(|e| MetaError::QueryError(format!("prepare recent runs: {e}")))?;
    let rows = stmt.query_map(duckdb::params![limit as i64], |row| {
        Ok(RunRecord {
            run_id: row.get(0)?,
            mode: row.get(1)?,
            status: row.get(2)?,
            started_at: row.get(3)?,
            finished_at: row.get(4)?,
        })
    })?;
    let mut runs = Vec::new();
    for row in rows {
        runs.push(row?);
    }
    Ok(runs)
}

/// Phase outcomes of one run, ordered by dataset then phase
pub fn dataset_runs_for(conn: &Connection, run_id: &str) -> MetaResult<Vec<DatasetRunRecord>> {
    let mut stmt = conn
        .prepare(
            "SELECT run_id, dataset_id, phase, status, error, row_count, duration_ms
             FROM gf_meta.dataset_runs WHERE run_id = ?
             ORDER BY dataset_id, finished_at",
        )
        .map_err(|e| MetaError::QueryError(format!("prepare dataset runs: {e}")))?;
    let rows = stmt.query_map(duckdb::params![run_id], |row| {
        Ok(DatasetRunRecord {
            run_id: row.get(0)?,
            dataset_id: row.get(1)?,
            phase: row.get(2)?,
            status: row.get(3)?,
            error: row.get(4)?,
            row_count: row.get(5)?,
            duration_ms: row.get(6)?,
        })
    })?;
    let mut records = Vec::new();
    for row in rows {
        records.push(row?);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::migrate_ledger;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        migrate_ledger(&conn).unwrap();
        conn
    }

    #[test]
    fn test_record_and_read_dataset_runs() {
        let conn = conn();
        for (ds, status) in [("a", "success"), ("b", "failed")] {
            record_dataset_run(
                &conn,
                &DatasetRunRecord {
                    run_id: "r1".to_string(),
                    dataset_id: ds.to_string(),
                    phase: "transform".to_string(),
                    status: status.to_string(),
                    error: (status == "failed").then(|| "boom".to_string()),
                    row_count: Some(3),
                    duration_ms: 12,
                },
            )
            .unwrap();
        }

        let records = dataset_runs_for(&conn, "r1").unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].dataset_id, "a");
        assert_eq!(records[1].error.as_deref(), Some("boom"));
        assert!(dataset_runs_for(&conn, "r2").unwrap().is_empty());
    }

    #[test]
    fn test_record_run() {
        let conn = conn();
        record_run(&conn, "r1", "full", "success", "2024-05-01 10:00:00").unwrap();
        let runs = recent_runs(&conn, 10).unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].mode, "full");
        assert_eq!(runs[0].started_at, "2024-05-01 10:00:00");
    }
}
