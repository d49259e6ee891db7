//! Status command implementation

use anyhow::{Context, Result};
use gf_core::Project;
use gf_db::{Database, DuckDbBackend};
use gf_meta::history::recent_runs;
use gf_meta::{ExecutionRecord, ExecutionTracker, RunRecord, META_SCHEMA};
use serde::Serialize;

use crate::cli::{GlobalArgs, OutputFormat, StatusArgs};
use crate::commands::common::{load_project, print_json, print_table};

/// Checksum characters shown in the ledger table
const CHECKSUM_DISPLAY_LEN: usize = 12;

#[derive(Debug, Serialize)]
struct Status {
    records: Vec<ExecutionRecord>,
    runs: Vec<RunRecord>,
}

/// Execute the status command
pub async fn execute(args: &StatusArgs, global: &GlobalArgs) -> Result<()> {
    let project = load_project(global)?;
    let Some(warehouse) = open_existing_warehouse(&project)? else {
        println!(
            "No warehouse at {}; nothing has run yet",
            project.warehouse_path().display()
        );
        return Ok(());
    };

    let status = load_status(&warehouse, args.dataset.clone(), args.runs).await?;
    if args.output == OutputFormat::Json {
        return print_json(&status);
    }

    if status.records.is_empty() {
        println!("Ledger is empty");
    } else {
        let rows: Vec<Vec<String>> = status
            .records
            .iter()
            .map(|r| {
                vec![
                    r.template_id.clone(),
                    r.dataset_id.clone(),
                    r.checksum.chars().take(CHECKSUM_DISPLAY_LEN).collect(),
                    r.applied_at.clone(),
                ]
            })
            .collect();
        print_table(&["TEMPLATE", "DATASET", "CHECKSUM", "APPLIED_AT"], &rows);
    }

    if !status.runs.is_empty() {
        println!();
        let rows: Vec<Vec<String>> = status
            .runs
            .iter()
            .map(|r| {
                vec![
                    r.run_id.clone(),
                    r.mode.clone(),
                    r.status.clone(),
                    r.started_at.clone(),
                    r.finished_at.clone(),
                ]
            })
            .collect();
        print_table(&["RUN", "MODE", "STATUS", "STARTED", "FINISHED"], &rows);
    }
    Ok(())
}

/// The project's warehouse, or `None` when it was never created
pub(crate) fn open_existing_warehouse(project: &Project) -> Result<Option<DuckDbBackend>> {
    let path = project.warehouse_path();
    if path.as_os_str() != ":memory:" && !path.exists() {
        return Ok(None);
    }
    let warehouse = DuckDbBackend::new(&path)
        .with_context(|| format!("Failed to open warehouse {}", path.display()))?;
    Ok(Some(warehouse))
}

async fn load_status(
    warehouse: &DuckDbBackend,
    dataset: Option<String>,
    runs: usize,
) -> Result<Status> {
    if !warehouse.relation_exists(META_SCHEMA, "template_runs").await? {
        return Ok(Status {
            records: Vec::new(),
            runs: Vec::new(),
        });
    }
    warehouse
        .run(move |conn| -> Result<Status> {
            let tracker = ExecutionTracker::new(conn);
            let records = match &dataset {
                Some(id) => tracker.records_for_dataset(id)?,
                None => tracker.list()?,
            };
            Ok(Status {
                records,
                runs: recent_runs(conn, runs)?,
            })
        })
        .await
}
