//! Export of warehouse mart tables to files for GIS tools.
//!
//! Each mart table becomes one file in the output directory. Geometry
//! tables go to the chosen vector format through DuckDB's `COPY`, GDAL
//! formats included when the spatial extension is loaded. Tables that only
//! carry H3 cell ids fall back to CSV, which map viewers read directly.

use crate::error::{PipelineError, PipelineResult};
use duckdb::Connection;
use gf_core::sql_utils::{escape_sql_string, quote_ident, quote_table};
use gf_core::template::MART_SCHEMA;
use gf_db::DuckDbBackend;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

/// Columns holding H3 cell ids
const H3_COLUMNS: &[&str] = &["h3_cell", "h3_center", "h3_cells"];

/// Column the exported geometry is written under
const GEOMETRY_COLUMN: &str = "geometry";

/// Target file format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    GeoParquet,
    GeoPackage,
    FlatGeobuf,
    Csv,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::GeoParquet => "parquet",
            ExportFormat::GeoPackage => "gpkg",
            ExportFormat::FlatGeobuf => "fgb",
            ExportFormat::Csv => "csv",
        }
    }

    /// GDAL driver for formats written through the spatial extension
    fn gdal_driver(self) -> Option<&'static str> {
        match self {
            ExportFormat::GeoPackage => Some("GPKG"),
            ExportFormat::FlatGeobuf => Some("FlatGeobuf"),
            ExportFormat::GeoParquet | ExportFormat::Csv => None,
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// What to export and where
#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub format: ExportFormat,
    pub output_dir: PathBuf,
    /// Mart tables to export; every mart table when empty
    pub tables: Vec<String>,
    /// Spatial reference written into GDAL outputs, e.g. `EPSG:3006`
    pub srs: Option<String>,
    pub limit: Option<u64>,
}

/// One written file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportedTable {
    pub table: String,
    pub path: PathBuf,
    pub format: ExportFormat,
    pub rows: u64,
}

/// A table left out, with the reason
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedTable {
    pub table: String,
    pub reason: String,
}

/// A table whose COPY failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedTable {
    pub table: String,
    pub error: String,
}

/// Result of one export
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExportReport {
    pub exported: Vec<ExportedTable>,
    pub skipped: Vec<SkippedTable>,
    pub failed: Vec<FailedTable>,
}

/// A mart column with its DuckDB type name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub data_type: String,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
        }
    }

    fn is_geometry(&self) -> bool {
        self.data_type.to_uppercase().contains("GEOMETRY")
    }

    fn is_list(&self) -> bool {
        self.data_type.ends_with("[]")
    }
}

/// How one table is written
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TablePlan {
    Write {
        format: ExportFormat,
        select: String,
    },
    Skip(String),
}

/// Decide the output format and select list of one mart table.
///
/// More than one geometry column is refused: every vector format holds a
/// single geometry per layer.
pub fn plan_table(columns: &[Column], format: ExportFormat) -> TablePlan {
    let geometries: Vec<&Column> = columns.iter().filter(|c| c.is_geometry()).collect();
    if geometries.len() > 1 {
        let names: Vec<&str> = geometries.iter().map(|c| c.name.as_str()).collect();
        return TablePlan::Skip(format!(
            "{} geometry columns ({}); keep one with SELECT * EXCLUDE (...)",
            names.len(),
            names.join(", ")
        ));
    }
    let geometry = geometries.first().map(|c| c.name.as_str());
    let has_h3_cell = columns.iter().any(|c| c.name == "h3_cell");
    let has_h3 = columns
        .iter()
        .any(|c| H3_COLUMNS.contains(&c.name.as_str()));

    if format == ExportFormat::Csv {
        return TablePlan::Write {
            format,
            select: select_list(columns, geometry, true, GeometrySource::AsText),
        };
    }

    let gdal = format.gdal_driver().is_some();
    let source = match geometry {
        Some(_) => GeometrySource::Column,
        None if has_h3_cell => GeometrySource::H3Boundary,
        None => GeometrySource::None,
    };
    match source {
        GeometrySource::None if gdal && has_h3 => TablePlan::Write {
            format: ExportFormat::Csv,
            select: select_list(columns, None, true, GeometrySource::None),
        },
        GeometrySource::None if gdal => {
            let preview: Vec<&str> = columns.iter().take(5).map(|c| c.name.as_str()).collect();
            TablePlan::Skip(format!(
                "no geometry or H3 column (has {}{})",
                preview.join(", "),
                if columns.len() > 5 { ", ..." } else { "" }
            ))
        }
        source => TablePlan::Write {
            format,
            select: select_list(columns, geometry, gdal, source),
        },
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GeometrySource {
    None,
    Column,
    /// Hexagon outline derived from `h3_cell`
    H3Boundary,
    /// WKT text for formats without a geometry type
    AsText,
}

fn select_list(
    columns: &[Column],
    geometry: Option<&str>,
    lists_as_text: bool,
    source: GeometrySource,
) -> String {
    let mut items = Vec::with_capacity(columns.len() + 1);
    for column in columns {
        let ident = quote_ident(&column.name);
        if Some(column.name.as_str()) == geometry {
            if source == GeometrySource::AsText {
                items.push(format!("ST_AsText({ident}) AS {ident}"));
            }
            continue;
        }
        // replaced by the derived geometry below
        if column.name == GEOMETRY_COLUMN
            && matches!(source, GeometrySource::Column | GeometrySource::H3Boundary)
        {
            continue;
        }
        if lists_as_text && column.is_list() {
            items.push(format!("CAST({ident} AS VARCHAR) AS {ident}"));
        } else {
            items.push(ident);
        }
    }
    let target = quote_ident(GEOMETRY_COLUMN);
    match (source, geometry) {
        (GeometrySource::Column, Some(name)) => {
            items.push(format!("{} AS {}", quote_ident(name), target))
        }
        (GeometrySource::H3Boundary, _) => items.push(format!(
            "ST_GeomFromText(h3_cell_to_boundary_wkt(\"h3_cell\")) AS {target}"
        )),
        _ => {}
    }
    items.join(", ")
}

/// `COPY` statement writing `select` from `table` to `path`
fn copy_sql(
    table: &str,
    select: &str,
    path: &Path,
    format: ExportFormat,
    options: &ExportOptions,
) -> String {
    let limit = options
        .limit
        .map(|n| format!(" LIMIT {n}"))
        .unwrap_or_default();
    let target = escape_sql_string(&path.display().to_string());
    let copy_options = match format.gdal_driver() {
        Some(driver) => match &options.srs {
            Some(srs) => format!(
                "FORMAT GDAL, DRIVER '{driver}', SRS '{}'",
                escape_sql_string(srs)
            ),
            None => format!("FORMAT GDAL, DRIVER '{driver}'"),
        },
        None if format == ExportFormat::Csv => "HEADER, DELIMITER ','".to_string(),
        None => "FORMAT PARQUET".to_string(),
    };
    format!(
        "COPY (SELECT {select} FROM {source}{limit}) TO '{target}' ({copy_options})",
        source = quote_table(MART_SCHEMA, table),
    )
}

/// Export mart tables of `warehouse` into `options.output_dir`.
///
/// Unknown table names are an error before anything is written. A COPY that
/// fails is recorded in the report and the remaining tables still export.
pub async fn export_mart(
    warehouse: &DuckDbBackend,
    options: &ExportOptions,
) -> PipelineResult<ExportReport> {
    std::fs::create_dir_all(&options.output_dir)?;
    let options = options.clone();
    warehouse
        .run(move |conn| export_tables(conn, &options))
        .await
}

fn export_tables(conn: &Connection, options: &ExportOptions) -> PipelineResult<ExportReport> {
    let available = mart_tables(conn)?;
    let tables = if options.tables.is_empty() {
        available
    } else {
        for table in &options.tables {
            if !available.contains(table) {
                return Err(PipelineError::Export {
                    table: table.clone(),
                    message: format!("no such table in schema {MART_SCHEMA}"),
                });
            }
        }
        options.tables.clone()
    };
    log::info!(
        "Exporting {} mart tables as {} to {}",
        tables.len(),
        options.format,
        options.output_dir.display()
    );

    conn.execute_batch("SET preserve_insertion_order = false")?;
    let mut report = ExportReport::default();
    for table in tables {
        let rows: i64 = conn.query_row(
            &format!("SELECT count(*) FROM {}", quote_table(MART_SCHEMA, &table)),
            [],
            |r| r.get(0),
        )?;
        if rows == 0 {
            log::warn!("Skipping {}.{}: empty table", MART_SCHEMA, table);
            report.skipped.push(SkippedTable {
                table,
                reason: "empty table".to_string(),
            });
            continue;
        }

        let columns = column_types(conn, &table)?;
        let (format, select) = match plan_table(&columns, options.format) {
            TablePlan::Write { format, select } => (format, select),
            TablePlan::Skip(reason) => {
                log::warn!("Skipping {}.{}: {}", MART_SCHEMA, table, reason);
                report.skipped.push(SkippedTable { table, reason });
                continue;
            }
        };

        let path = options
            .output_dir
            .join(format!("{}.{}", table, format.extension()));
        // GDAL refuses to overwrite
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        match conn.execute_batch(&copy_sql(&table, &select, &path, format, options)) {
            Ok(()) => {
                let rows = match options.limit {
                    Some(limit) => (rows.max(0) as u64).min(limit),
                    None => rows.max(0) as u64,
                };
                log::info!(
                    "Exported {}.{} ({} rows) to {}",
                    MART_SCHEMA,
                    table,
                    rows,
                    path.display()
                );
                report.exported.push(ExportedTable {
                    table,
                    path,
                    format,
                    rows,
                });
            }
            Err(e) => {
                log::error!("Export of {}.{} failed: {}", MART_SCHEMA, table, e);
                report.failed.push(FailedTable {
                    table,
                    error: e.to_string(),
                });
            }
        }
    }
    Ok(report)
}

fn mart_tables(conn: &Connection) -> PipelineResult<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT table_name FROM information_schema.tables \
         WHERE table_catalog = current_database() AND table_schema = ? \
         ORDER BY table_name",
    )?;
    let rows = stmt.query_map([MART_SCHEMA], |row| row.get::<_, String>(0))?;
    let mut tables = Vec::new();
    for row in rows {
        tables.push(row?);
    }
    Ok(tables)
}

fn column_types(conn: &Connection, table: &str) -> PipelineResult<Vec<Column>> {
    let mut stmt = conn.prepare(
        "SELECT column_name, data_type FROM information_schema.columns \
         WHERE table_catalog = current_database() AND table_schema = ? AND table_name = ? \
         ORDER BY ordinal_position",
    )?;
    let rows = stmt.query_map(duckdb::params![MART_SCHEMA, table], |row| {
        Ok(Column::new(
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
        ))
    })?;
    let mut columns = Vec::new();
    for row in rows {
        columns.push(row?);
    }
    Ok(columns)
}

#[cfg(test)]
#[path = "export_test.rs"]
mod tests;
