//! Error types for gf-core

use thiserror::Error;

/// Core error type for Geoflow
#[derive(Error, Debug)]
pub enum CoreError {
    /// E001: Configuration file not found
    #[error("[E001] Config file not found: {path}")]
    ConfigNotFound { path: String },

    /// E002: Failed to parse configuration file
    #[error("[E002] Failed to parse config: {message}")]
    ConfigParseError { message: String },

    /// E003: Invalid configuration value
    #[error("[E003] Invalid config: {message}")]
    ConfigInvalid { message: String },

    /// E004: Project directory not found
    #[error("[E004] Project directory not found: {path}")]
    ProjectNotFound { path: String },

    // Dataset catalog errors (DS001-DS004)
    /// DS001: Datasets file not found
    #[error("[DS001] Datasets file not found: {path}")]
    DatasetsNotFound { path: String },

    /// DS002: Duplicate dataset id
    #[error("[DS002] Duplicate dataset id '{id}' (pipelines '{first}' and '{second}')")]
    DuplicateDataset {
        id: String,
        first: String,
        second: String,
    },

    /// DS003: Dataset is missing a required field
    #[error("[DS003] Dataset '{id}' is missing required field '{field}'")]
    DatasetMissingField { id: String, field: String },

    /// DS004: Unknown dataset requested by selection
    #[error("[DS004] Unknown dataset '{id}'")]
    UnknownDataset { id: String },

    // Template discovery errors (T001-T004)
    /// T001: Template file name has no ordering prefix
    #[error("[T001] Template '{path}' has no ordering prefix (expected NNN_name)")]
    TemplateMissingPrefix { path: String },

    /// T002: Merged template found at the migrations root
    #[error("[T002] Merged template '{path}' must live in a pipeline directory or in _global/")]
    RootMergedTemplate { path: String },

    /// T003: Two templates share a prefix inside the same group
    #[error("[T003] Templates '{first}' and '{second}' share ordering prefix '{prefix}'")]
    DuplicateTemplatePrefix {
        prefix: String,
        first: String,
        second: String,
    },

    /// T004: Two pipeline directories resolve to the same pipeline name
    #[error("[T004] Directories '{first}' and '{second}' both map to pipeline '{pipeline}'")]
    DuplicatePipelineDir {
        pipeline: String,
        first: String,
        second: String,
    },

    /// T005: Pipeline directory name does not yield a valid pipeline name
    #[error("[T005] Directory '{dir}' does not map to a valid pipeline name")]
    InvalidPipelineDir { dir: String },

    /// E015: IO error
    #[error("[E015] IO error: {0}")]
    Io(#[from] std::io::Error),

    /// E016: IO error with file path context
    #[error("[E016] Failed to read '{path}': {source}")]
    IoWithPath {
        path: String,
        source: std::io::Error,
    },

    /// YAML parsing error
    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),
}

/// Result type alias for CoreError
pub type CoreResult<T> = Result<T, CoreError>;
