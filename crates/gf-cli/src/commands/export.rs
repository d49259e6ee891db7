//! Export command implementation

use anyhow::{bail, Result};
use gf_db::Database;
use gf_pipeline::{export_mart, ExportFormat, ExportOptions, ExportReport};

use crate::cli::{ExportArgs, ExportFormatArg, GlobalArgs, OutputFormat};
use crate::commands::common::{load_project, print_json, print_table, ExitCode};
use crate::commands::status::open_existing_warehouse;

/// Default output directory, relative to the project root
const DEFAULT_EXPORT_DIR: &str = "data/export";

/// Some tables failed to export
const EXPORT_PARTIAL: i32 = 1;

/// No table could be exported
const EXPORT_FAILED: i32 = 2;

/// Execute the export command
pub async fn execute(args: &ExportArgs, global: &GlobalArgs) -> Result<()> {
    let project = load_project(global)?;
    let Some(warehouse) = open_existing_warehouse(&project)? else {
        bail!(
            "No warehouse at {}; run the pipeline first",
            project.warehouse_path().display()
        );
    };

    let failed = warehouse
        .load_extensions(&project.config.database.extensions)
        .await;
    if !failed.is_empty() {
        log::warn!("Extensions not available: {}", failed.join(", "));
    }

    let output_dir = match &args.output_dir {
        Some(dir) => project.root.join(dir),
        None => project.root.join(DEFAULT_EXPORT_DIR),
    };
    let options = ExportOptions {
        format: export_format(args.format),
        output_dir,
        tables: args.tables.clone(),
        srs: args.srs.clone(),
        limit: args.limit,
    };
    let report = export_mart(&warehouse, &options).await?;

    if args.output == OutputFormat::Json {
        print_json(&report)?;
    } else {
        print_report(&report, &options);
    }

    match (report.exported.len(), report.failed.len()) {
        (_, 0) => Ok(()),
        (0, _) => Err(ExitCode(EXPORT_FAILED).into()),
        _ => Err(ExitCode(EXPORT_PARTIAL).into()),
    }
}

fn export_format(arg: ExportFormatArg) -> ExportFormat {
    match arg {
        ExportFormatArg::Parquet => ExportFormat::GeoParquet,
        ExportFormatArg::Gpkg => ExportFormat::GeoPackage,
        ExportFormatArg::Fgb => ExportFormat::FlatGeobuf,
        ExportFormatArg::Csv => ExportFormat::Csv,
    }
}

fn print_report(report: &ExportReport, options: &ExportOptions) {
    if !report.exported.is_empty() {
        let rows: Vec<Vec<String>> = report
            .exported
            .iter()
            .map(|e| {
                vec![
                    e.table.clone(),
                    e.format.to_string(),
                    e.rows.to_string(),
                    e.path.display().to_string(),
                ]
            })
            .collect();
        print_table(&["TABLE", "FORMAT", "ROWS", "FILE"], &rows);
        println!();
    }
    for skipped in &report.skipped {
        println!("Skipped mart.{}: {}", skipped.table, skipped.reason);
    }
    for failed in &report.failed {
        println!("FAILED mart.{}: {}", failed.table, failed.error);
    }
    println!(
        "Exported {} table{} to {}",
        report.exported.len(),
        if report.exported.len() == 1 { "" } else { "s" },
        options.output_dir.display()
    );
}
