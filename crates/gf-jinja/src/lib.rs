//! gf-jinja - Template rendering for Geoflow
//!
//! Expands `{{ placeholder }}` markers in SQL templates against a dataset's
//! field mapping (or, for post-merge templates, the pipeline only). Rendering
//! is strict: a placeholder without a value is an error, never an empty string.

pub mod context;
pub mod environment;
pub mod error;

pub use context::{RenderContext, WAREHOUSE_DATASET_ID};
pub use environment::TemplateRenderer;
pub use error::{TemplateError, TemplateResult};
