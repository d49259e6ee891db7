//! gf-core - Core library for Geoflow
//!
//! Shared types for the Geoflow workspace: project configuration, the dataset
//! catalog with its field mappings, identifier newtypes, template discovery
//! and checksums.

pub mod checksum;
pub mod config;
pub mod dataset;
pub mod error;
pub mod names;
mod newtype_string;
pub mod project;
pub(crate) mod serde_helpers;
pub mod sql_utils;
pub mod template;

pub use checksum::{combine_checksums, compute_checksum, compute_file_checksum};
pub use config::{Config, DatabaseConfig, ExecutionConfig, ExecutionSettings};
pub use dataset::{DatasetCatalog, DatasetConfig, DatasetSelection, FieldValue, PipelineInfo};
pub use error::{CoreError, CoreResult};
pub use names::{DatasetId, PipelineName};
pub use project::Project;
pub use template::{
    ChainStep, PipelineTemplates, Template, TemplateId, TemplateIndex, TemplateKind,
    TemplatePrefix,
};
