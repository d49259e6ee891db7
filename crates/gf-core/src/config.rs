//! Configuration types and parsing for geoflow.yml

use crate::dataset::FieldValue;
use crate::error::{CoreError, CoreResult};
use crate::serde_helpers::default_true;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main project configuration from geoflow.yml
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Project name
    pub name: String,

    /// Directory holding `migrations/` with SQL templates
    #[serde(default = "default_sql_dir")]
    pub sql_dir: String,

    /// Directory holding extracted snapshots (`<id>.parquet`)
    #[serde(default = "default_raw_dir")]
    pub raw_dir: String,

    /// Directory holding per-dataset transform unit databases
    #[serde(default = "default_temp_dir")]
    pub temp_dir: String,

    /// Output directory for run results
    #[serde(default = "default_target_dir")]
    pub target_dir: String,

    /// Path of the dataset catalog
    #[serde(default = "default_datasets_path")]
    pub datasets: String,

    /// Warehouse and unit database settings
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Concurrency, timeouts and unit retention
    #[serde(default)]
    pub execution: ExecutionConfig,

    /// Placeholder values used when a dataset's field mapping does not set them
    #[serde(default = "default_template_defaults")]
    pub template_defaults: BTreeMap<String, FieldValue>,
}

/// Database configuration shared by the warehouse and transform units
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    /// Warehouse database file path
    #[serde(default = "default_warehouse_path")]
    pub path: String,

    /// DuckDB extensions installed and loaded on every connection (best effort)
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// Base schemas created on every connection
    #[serde(default = "default_schemas")]
    pub schemas: Vec<String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_warehouse_path(),
            extensions: default_extensions(),
            schemas: default_schemas(),
        }
    }
}

/// Execution settings as written in geoflow.yml; unset values are auto-detected
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExecutionConfig {
    /// Max concurrent extract tasks (I/O bound)
    #[serde(default)]
    pub extract_concurrency: Option<usize>,

    /// Max concurrent transform units (CPU bound)
    #[serde(default)]
    pub transform_concurrency: Option<usize>,

    /// Deadline for a single connector invocation
    #[serde(default)]
    pub extract_timeout_secs: Option<u64>,

    /// Deadline for the whole extract phase
    #[serde(default)]
    pub extract_batch_timeout_secs: Option<u64>,

    /// Keep unit databases of failed datasets for inspection
    #[serde(default = "default_true")]
    pub retain_failed_units: bool,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            extract_concurrency: None,
            transform_concurrency: None,
            extract_timeout_secs: None,
            extract_batch_timeout_secs: None,
            retain_failed_units: true,
        }
    }
}

/// Resolved execution settings handed to the scheduler at construction.
///
/// Built once at startup; nothing reads concurrency limits from global state
/// during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionSettings {
    pub extract_concurrency: usize,
    pub transform_concurrency: usize,
    pub extract_timeout: Duration,
    pub extract_batch_timeout: Option<Duration>,
    pub retain_failed_units: bool,
}

/// Default per-connector deadline
pub const DEFAULT_EXTRACT_TIMEOUT_SECS: u64 = 300;

impl ExecutionSettings {
    /// Defaults derived from the available parallelism of the host.
    ///
    /// Extract is I/O bound and uses one task per core. Transform gets half the
    /// cores, at least two, and stays below extract whenever there is more
    /// than one core, since DuckDB parallelizes inside each query.
    pub fn detect() -> Self {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        Self::for_cores(cores)
    }

    /// Defaults for a given core count
    pub fn for_cores(cores: usize) -> Self {
        let cores = cores.max(1);
        Self {
            extract_concurrency: cores,
            transform_concurrency: (cores / 2).max(2).min(cores - 1).max(1),
            extract_timeout: Duration::from_secs(DEFAULT_EXTRACT_TIMEOUT_SECS),
            extract_batch_timeout: None,
            retain_failed_units: true,
        }
    }
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self::detect()
    }
}

impl ExecutionConfig {
    /// Resolve the configured values on top of detected defaults.
    pub fn resolve(&self) -> ExecutionSettings {
        let detected = ExecutionSettings::detect();
        ExecutionSettings {
            extract_concurrency: self
                .extract_concurrency
                .unwrap_or(detected.extract_concurrency)
                .max(1),
            transform_concurrency: self
                .transform_concurrency
                .unwrap_or(detected.transform_concurrency)
                .max(1),
            extract_timeout: self
                .extract_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(detected.extract_timeout),
            extract_batch_timeout: self.extract_batch_timeout_secs.map(Duration::from_secs),
            retain_failed_units: self.retain_failed_units,
        }
    }
}

fn default_sql_dir() -> String {
    "sql".to_string()
}

fn default_raw_dir() -> String {
    "data/raw".to_string()
}

fn default_temp_dir() -> String {
    "data/temp".to_string()
}

fn default_target_dir() -> String {
    "target".to_string()
}

fn default_datasets_path() -> String {
    "config/datasets.yml".to_string()
}

fn default_warehouse_path() -> String {
    "data/warehouse.duckdb".to_string()
}

fn default_extensions() -> Vec<String> {
    ["spatial", "parquet", "httpfs", "json", "h3"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_schemas() -> Vec<String> {
    vec!["raw".to_string(), "mart".to_string()]
}

/// Built-in placeholder defaults (H3 resolutions and geometry column name)
pub fn default_template_defaults() -> BTreeMap<String, FieldValue> {
    let mut defaults = BTreeMap::new();
    defaults.insert(
        "geometry_column".to_string(),
        FieldValue::Literal("geom".to_string()),
    );
    for (key, value) in [
        ("h3_center_resolution", "13"),
        ("h3_polyfill_resolution", "11"),
        ("h3_line_resolution", "12"),
        ("h3_point_resolution", "13"),
        ("h3_line_buffer_meters", "10"),
    ] {
        defaults.insert(key.to_string(), FieldValue::Literal(value.to_string()));
    }
    defaults
}

impl Config {
    /// Load configuration from a file path
    pub fn load(path: &Path) -> CoreResult<Self> {
        if !path.exists() {
            return Err(CoreError::ConfigNotFound {
                path: path.display().to_string(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| CoreError::IoWithPath {
            path: path.display().to_string(),
            source: e,
        })?;
        let mut config: Config =
            serde_yaml::from_str(&content).map_err(|e| CoreError::ConfigParseError {
                message: format!("{}: {}", path.display(), e),
            })?;
        config.fill_template_defaults();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a project directory (geoflow.yml or geoflow.yaml)
    pub fn load_from_dir(dir: &Path) -> CoreResult<Self> {
        let yml_path = dir.join("geoflow.yml");
        let yaml_path = dir.join("geoflow.yaml");

        if yml_path.exists() {
            Self::load(&yml_path)
        } else if yaml_path.exists() {
            Self::load(&yaml_path)
        } else {
            Err(CoreError::ConfigNotFound {
                path: yml_path.display().to_string(),
            })
        }
    }

    /// A configuration with every default, used by tests and `gf init`-style setups
    pub fn with_name(name: &str) -> Self {
        Self {
            name: name.to_string(),
            sql_dir: default_sql_dir(),
            raw_dir: default_raw_dir(),
            temp_dir: default_temp_dir(),
            target_dir: default_target_dir(),
            datasets: default_datasets_path(),
            database: DatabaseConfig::default(),
            execution: ExecutionConfig::default(),
            template_defaults: default_template_defaults(),
        }
    }

    /// User-provided defaults override the built-in ones key by key
    fn fill_template_defaults(&mut self) {
        for (key, value) in default_template_defaults() {
            self.template_defaults.entry(key).or_insert(value);
        }
    }

    fn validate(&self) -> CoreResult<()> {
        if self.name.trim().is_empty() {
            return Err(CoreError::ConfigInvalid {
                message: "project name must not be empty".to_string(),
            });
        }
        if self.execution.extract_concurrency == Some(0) {
            return Err(CoreError::ConfigInvalid {
                message: "execution.extract_concurrency must be at least 1".to_string(),
            });
        }
        if self.execution.transform_concurrency == Some(0) {
            return Err(CoreError::ConfigInvalid {
                message: "execution.transform_concurrency must be at least 1".to_string(),
            });
        }
        for schema in &self.database.schemas {
            if !crate::newtype_string::is_valid_ident(schema) {
                return Err(CoreError::ConfigInvalid {
                    message: format!("invalid schema name '{}'", schema),
                });
            }
        }
        Ok(())
    }

    fn absolute(root: &Path, path: &str) -> PathBuf {
        let p = Path::new(path);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            root.join(p)
        }
    }

    /// Absolute path of the SQL directory
    pub fn sql_dir_absolute(&self, root: &Path) -> PathBuf {
        Self::absolute(root, &self.sql_dir)
    }

    /// Absolute path of the template directory (`<sql_dir>/migrations`)
    pub fn migrations_dir_absolute(&self, root: &Path) -> PathBuf {
        self.sql_dir_absolute(root).join("migrations")
    }

    /// Absolute path of the snapshot directory
    pub fn raw_dir_absolute(&self, root: &Path) -> PathBuf {
        Self::absolute(root, &self.raw_dir)
    }

    /// Absolute path of the unit directory
    pub fn temp_dir_absolute(&self, root: &Path) -> PathBuf {
        Self::absolute(root, &self.temp_dir)
    }

    /// Absolute path of the target directory
    pub fn target_dir_absolute(&self, root: &Path) -> PathBuf {
        Self::absolute(root, &self.target_dir)
    }

    /// Absolute path of the dataset catalog
    pub fn datasets_path_absolute(&self, root: &Path) -> PathBuf {
        Self::absolute(root, &self.datasets)
    }

    /// Absolute path of the warehouse (`:memory:` is passed through)
    pub fn warehouse_path_absolute(&self, root: &Path) -> PathBuf {
        if self.database.path == ":memory:" {
            PathBuf::from(":memory:")
        } else {
            Self::absolute(root, &self.database.path)
        }
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
