//! Project loading: configuration, dataset catalog and template index

use crate::config::Config;
use crate::dataset::DatasetCatalog;
use crate::error::{CoreError, CoreResult};
use crate::template::TemplateIndex;
use std::path::{Path, PathBuf};

/// A loaded Geoflow project
#[derive(Debug, Clone)]
pub struct Project {
    /// Project root directory
    pub root: PathBuf,

    /// Project configuration
    pub config: Config,

    /// Datasets from the catalog file
    pub catalog: DatasetCatalog,

    /// Templates discovered under `<sql_dir>/migrations/`
    pub templates: TemplateIndex,
}

impl Project {
    /// Load a project from a directory
    pub fn load(path: &Path) -> CoreResult<Self> {
        let root = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()?.join(path)
        };

        if !root.exists() {
            return Err(CoreError::ProjectNotFound {
                path: root.display().to_string(),
            });
        }

        let config = Config::load_from_dir(&root)?;
        let catalog = DatasetCatalog::load(&config.datasets_path_absolute(&root))?;
        let templates = TemplateIndex::discover(&config.migrations_dir_absolute(&root))?;

        log::debug!(
            "Loaded project '{}': {} datasets, {} templates",
            config.name,
            catalog.datasets.len(),
            templates.len()
        );

        Ok(Self {
            root,
            config,
            catalog,
            templates,
        })
    }

    /// Snapshot directory
    pub fn raw_dir(&self) -> PathBuf {
        self.config.raw_dir_absolute(&self.root)
    }

    /// Unit directory
    pub fn temp_dir(&self) -> PathBuf {
        self.config.temp_dir_absolute(&self.root)
    }

    /// Target directory for run results
    pub fn target_dir(&self) -> PathBuf {
        self.config.target_dir_absolute(&self.root)
    }

    /// Warehouse database path
    pub fn warehouse_path(&self) -> PathBuf {
        self.config.warehouse_path_absolute(&self.root)
    }
}

#[cfg(test)]
#[path = "project_test.rs"]
mod tests;
