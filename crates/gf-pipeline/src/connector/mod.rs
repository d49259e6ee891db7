//! Source connectors.
//!
//! A connector extracts one dataset into a parquet snapshot at
//! `<raw_dir>/<dataset_id>.parquet`. Connectors are looked up by the dataset's
//! `plugin` name in a [`ConnectorRegistry`].

mod builtin;
mod snapshot;

pub use builtin::{DuckDbQueryConnector, GeoParquetConnector, SpatialFileConnector};
pub use snapshot::write_snapshot;

use crate::cancel::CancellationFlag;
use crate::error::ConnectorError;
use crate::observer::PhaseObserver;
use crate::summary::Phase;
use async_trait::async_trait;
use gf_core::{DatasetConfig, DatasetId};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Result of a successful extract
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotResult {
    pub row_count: u64,
    pub snapshot_path: PathBuf,
    pub message: Option<String>,
}

/// Log lines from a connector, tagged with the dataset id
#[derive(Debug, Clone)]
pub struct LogSink {
    dataset: DatasetId,
}

impl LogSink {
    pub fn new(dataset: DatasetId) -> Self {
        Self { dataset }
    }

    pub fn info(&self, message: &str) {
        log::info!("[{}] {}", self.dataset, message);
    }

    pub fn warn(&self, message: &str) {
        log::warn!("[{}] {}", self.dataset, message);
    }

    pub fn debug(&self, message: &str) {
        log::debug!("[{}] {}", self.dataset, message);
    }
}

/// Progress messages from a connector, forwarded to the phase observer
#[derive(Clone)]
pub struct ProgressSink {
    dataset: DatasetId,
    observer: Arc<dyn PhaseObserver>,
}

impl ProgressSink {
    pub fn new(dataset: DatasetId, observer: Arc<dyn PhaseObserver>) -> Self {
        Self { dataset, observer }
    }

    pub fn report(&self, message: &str) {
        self.observer
            .progress(Phase::Extract, self.dataset.as_str(), message);
    }
}

impl std::fmt::Debug for ProgressSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressSink")
            .field("dataset", &self.dataset)
            .finish_non_exhaustive()
    }
}

/// Everything a connector needs for one extract
#[derive(Debug, Clone)]
pub struct ExtractContext {
    pub dataset: DatasetConfig,
    /// Final snapshot location
    pub snapshot_path: PathBuf,
    /// Base for relative source paths
    pub project_root: PathBuf,
    pub log: LogSink,
    pub progress: ProgressSink,
    pub cancel: CancellationFlag,
}

impl ExtractContext {
    /// Required string parameter of the dataset
    pub fn require_param(&self, key: &str) -> Result<&str, ConnectorError> {
        self.dataset
            .param_str(key)
            .ok_or_else(|| ConnectorError::MissingParam {
                dataset: self.dataset.id.to_string(),
                param: key.to_string(),
            })
    }

    /// Resolve a source location: URLs and absolute paths pass through,
    /// relative paths are taken from the project root
    pub fn resolve_location(&self, location: &str) -> String {
        if location.contains("://") || Path::new(location).is_absolute() {
            location.to_string()
        } else {
            self.project_root.join(location).display().to_string()
        }
    }

    /// `Err(Cancelled)` once cancellation was requested
    pub fn check_cancelled(&self) -> Result<(), ConnectorError> {
        if self.cancel.is_cancelled() {
            Err(ConnectorError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Extracts one dataset into a columnar snapshot file
#[async_trait]
pub trait SourceConnector: Send + Sync {
    /// Plugin name datasets refer to
    fn name(&self) -> &str;

    async fn extract(&self, ctx: &ExtractContext) -> Result<SnapshotResult, ConnectorError>;
}

/// Connectors by plugin name
#[derive(Clone, Default)]
pub struct ConnectorRegistry {
    connectors: BTreeMap<String, Arc<dyn SourceConnector>>,
}

impl ConnectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in connectors; `extensions` are loaded into
    /// each extract's scratch database
    pub fn with_builtins(extensions: &[String]) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(GeoParquetConnector::new(extensions.to_vec())));
        registry.register(Arc::new(SpatialFileConnector::new(extensions.to_vec())));
        registry.register(Arc::new(DuckDbQueryConnector::new(extensions.to_vec())));
        registry
    }

    /// Add or replace a connector under its own name
    pub fn register(&mut self, connector: Arc<dyn SourceConnector>) {
        self.connectors
            .insert(connector.name().to_string(), connector);
    }

    pub fn get(&self, plugin: &str) -> Result<Arc<dyn SourceConnector>, ConnectorError> {
        self.connectors
            .get(plugin)
            .cloned()
            .ok_or_else(|| ConnectorError::UnknownPlugin(plugin.to_string()))
    }

    /// Registered plugin names, sorted
    pub fn names(&self) -> Vec<&str> {
        self.connectors.keys().map(String::as_str).collect()
    }
}

impl std::fmt::Debug for ConnectorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectorRegistry")
            .field("connectors", &self.names())
            .finish()
    }
}

#[cfg(test)]
#[path = "connector_test.rs"]
mod tests;
