//! Error types for gf-pipeline

use gf_db::DbError;
use gf_jinja::TemplateError;
use gf_meta::MetaError;
use thiserror::Error;

/// Errors raised by source connectors while extracting a dataset
#[derive(Error, Debug)]
pub enum ConnectorError {
    /// No connector registered under the dataset's plugin name (C001)
    #[error("[C001] Unknown connector plugin '{0}'")]
    UnknownPlugin(String),

    /// Required connector parameter missing (C002)
    #[error("[C002] Dataset '{dataset}' is missing connector parameter '{param}'")]
    MissingParam { dataset: String, param: String },

    /// Source could not be read (C003)
    #[error("[C003] Extract of '{dataset}' failed: {message}")]
    Extract { dataset: String, message: String },

    /// Snapshot database error (C004)
    #[error("[C004] {0}")]
    Db(#[from] DbError),

    /// Snapshot file error (C005)
    #[error("[C005] Snapshot I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Cancellation observed before or during extract (C006)
    #[error("[C006] Extract cancelled")]
    Cancelled,
}

/// Pipeline engine errors.
///
/// Each failure is attached to one unit of work (a dataset or a post-merge
/// template) and collected into the phase summary.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Extract failure (P001)
    #[error("[P001] {0}")]
    Connector(#[from] ConnectorError),

    /// Template could not be rendered (P002)
    #[error("[P002] {source}")]
    TemplateRender {
        template: String,
        #[source]
        source: TemplateError,
    },

    /// Template SQL failed inside a transform unit (P003)
    #[error("[P003] Template '{template}' failed: {message}")]
    TransformExecution { template: String, message: String },

    /// Unit could not be folded into the warehouse (P004)
    #[error("[P004] Merge of '{dataset}' failed: {message}")]
    Merge { dataset: String, message: String },

    /// Post-merge template failed against the warehouse (P005)
    #[error("[P005] Post-merge template '{template}' failed: {message}")]
    PostMerge { template: String, message: String },

    /// Cancellation flag was set (P006)
    #[error("[P006] Cancelled")]
    Cancelled,

    /// Connector exceeded its deadline (P007)
    #[error("[P007] Timed out after {millis}ms")]
    Timeout { millis: u64 },

    /// Engine error (P008)
    #[error("[P008] {0}")]
    Db(#[from] DbError),

    /// Ledger error (P009)
    #[error("[P009] {0}")]
    Meta(#[from] MetaError),

    /// File system error (P010)
    #[error("[P010] I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Mart table could not be selected for export (P011)
    #[error("[P011] Export of '{table}' failed: {message}")]
    Export { table: String, message: String },
}

/// Result type alias for PipelineError
pub type PipelineResult<T> = Result<T, PipelineError>;

impl From<duckdb::Error> for PipelineError {
    fn from(err: duckdb::Error) -> Self {
        PipelineError::Db(DbError::from(err))
    }
}

impl PipelineError {
    /// Whether this error stems from cancellation rather than a real failure
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            PipelineError::Cancelled | PipelineError::Connector(ConnectorError::Cancelled)
        )
    }
}
