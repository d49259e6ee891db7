//! CLI argument definitions using clap derive API

use clap::{ArgGroup, Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Geoflow - extract, transform and merge geospatial datasets into DuckDB
#[derive(Parser, Debug)]
#[command(name = "gf")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Global options
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Global arguments available to all commands
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Path to project directory
    #[arg(short = 'p', long, global = true, default_value = ".", env = "GEOFLOW_PROJECT_DIR")]
    pub project_dir: PathBuf,

    /// Also write logs to a timestamped file in this directory
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Extract, transform and merge datasets, then run post-merge templates
    Run(RunArgs),

    /// List datasets, pipelines, templates or dataset types
    Ls(LsArgs),

    /// Print the SQL a template renders to
    Render(RenderArgs),

    /// Show the execution ledger and recent runs
    Status(StatusArgs),

    /// Forget ledger records so templates run again
    Reset(ResetArgs),

    /// Remove transform unit leftovers and other generated files
    Clean(CleanArgs),

    /// Export warehouse mart tables to files for GIS tools
    Export(ExportArgs),
}

/// Arguments for the run command
#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Dataset ids to run (comma-separated, default: all enabled)
    #[arg(short, long, value_delimiter = ',')]
    pub datasets: Vec<String>,

    /// Only datasets of this type
    #[arg(short = 't', long = "type")]
    pub typ: Option<String>,

    /// Only datasets of this pipeline
    #[arg(long)]
    pub pipeline: Option<String>,

    /// Only extract snapshots
    #[arg(long, conflicts_with = "transform_only")]
    pub extract_only: bool,

    /// Skip extract and transform the existing snapshots
    #[arg(long)]
    pub transform_only: bool,

    /// Ignore the ledger for every dataset and post-merge template
    #[arg(short, long, conflicts_with = "force_datasets")]
    pub force: bool,

    /// Ignore the ledger for these datasets (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub force_datasets: Vec<String>,

    /// Max concurrent extracts (default: from geoflow.yml or core count)
    #[arg(long)]
    pub extract_concurrency: Option<usize>,

    /// Max concurrent transform units
    #[arg(long)]
    pub transform_concurrency: Option<usize>,

    /// Output format of the run summary
    #[arg(short, long, value_enum, default_value = "text")]
    pub output: OutputFormat,

    /// Suppress progress bars
    #[arg(short, long)]
    pub quiet: bool,
}

/// Output formats for reporting commands
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable text
    #[default]
    Text,
    /// JSON on stdout
    Json,
}

/// Arguments for the ls command
#[derive(Args, Debug)]
pub struct LsArgs {
    /// What to list
    #[arg(value_enum, default_value = "datasets")]
    pub resource: LsResource,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub output: OutputFormat,
}

/// Listable project resources
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LsResource {
    Datasets,
    Pipelines,
    Templates,
    /// Distinct dataset types with counts
    Types,
}

/// Arguments for the render command
#[derive(Args, Debug)]
pub struct RenderArgs {
    /// Template id (e.g. `shared/004_staging_transform`, `global/x01_h3_union`)
    pub template: String,

    /// Dataset to render a per-dataset template for
    #[arg(short, long)]
    pub dataset: Option<String>,
}

/// Arguments for the status command
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Only ledger records of this dataset
    #[arg(short, long)]
    pub dataset: Option<String>,

    /// Number of recent runs to show
    #[arg(long, default_value_t = 5)]
    pub runs: usize,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub output: OutputFormat,
}

/// Arguments for the reset command
#[derive(Args, Debug)]
#[command(group(ArgGroup::new("target").required(true).multiple(true).args(["dataset", "template"])))]
pub struct ResetArgs {
    /// Forget every record of this dataset
    #[arg(short, long)]
    pub dataset: Option<String>,

    /// Forget every record of this template
    #[arg(short, long)]
    pub template: Option<String>,
}

/// Arguments for the clean command
#[derive(Args, Debug)]
pub struct CleanArgs {
    /// Show what would be removed without removing it
    #[arg(long)]
    pub dry_run: bool,

    /// Also remove extracted snapshots
    #[arg(long)]
    pub snapshots: bool,
}

/// Arguments for the export command
#[derive(Args, Debug)]
pub struct ExportArgs {
    /// File format; tables with only H3 ids are written as CSV for GDAL formats
    #[arg(short, long, value_enum, default_value = "parquet")]
    pub format: ExportFormatArg,

    /// Output directory (default: data/export in the project)
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Mart tables to export (comma-separated, default: all)
    #[arg(short, long, value_delimiter = ',')]
    pub tables: Vec<String>,

    /// Spatial reference for GeoPackage and FlatGeobuf, e.g. EPSG:3006
    #[arg(long)]
    pub srs: Option<String>,

    /// Write at most this many rows per table
    #[arg(long)]
    pub limit: Option<u64>,

    /// Output format of the export report
    #[arg(short, long, value_enum, default_value = "text")]
    pub output: OutputFormat,
}

/// Export file formats
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormatArg {
    /// GeoParquet
    Parquet,
    /// GeoPackage (spatial extension)
    Gpkg,
    /// FlatGeobuf (spatial extension)
    Fgb,
    Csv,
}

#[cfg(test)]
#[path = "cli_test.rs"]
mod tests;
