//! Dataset catalog: datasets.yml loading, field mappings and selection.
//!
//! Two layouts are accepted. The grouped layout nests datasets under the
//! pipeline they belong to:
//!
//! ```yaml
//! pipelines:
//!   - id: ext_restr
//!     datasets:
//!       - id: naturreservat
//!         plugin: wfs
//! ```
//!
//! The flat layout lists datasets directly and names the pipeline per dataset:
//!
//! ```yaml
//! datasets:
//!   - id: naturreservat
//!     plugin: wfs
//!     pipeline: ext_restr
//! ```

use crate::error::{CoreError, CoreResult};
use crate::names::{DatasetId, PipelineName};
use crate::serde_helpers::default_true;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::path::Path;

/// Sigil marking a field-mapping value as a column reference in YAML
pub const COLUMN_REF_SIGIL: char = '$';

/// A field-mapping value: a literal or a reference to a source column.
///
/// The `$` sigil is interpreted once, when the catalog is parsed; nothing
/// downstream of loading looks at it again.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldValue {
    /// Literal value, rendered as a quoted SQL string in `_expr` placeholders
    Literal(String),
    /// Column of the source table, rendered as a column expression
    ColumnRef(String),
}

impl FieldValue {
    /// Parse a YAML scalar string, honoring the `$` column sigil
    pub fn parse(raw: &str) -> Self {
        match raw.strip_prefix(COLUMN_REF_SIGIL) {
            Some(col) if !col.is_empty() => FieldValue::ColumnRef(col.to_string()),
            _ => FieldValue::Literal(raw.to_string()),
        }
    }

    /// Convert a YAML value; `None` for nulls, error for sequences and mappings
    fn from_yaml(key: &str, value: &serde_yaml::Value) -> Result<Option<Self>, String> {
        match value {
            serde_yaml::Value::Null => Ok(None),
            serde_yaml::Value::String(s) => Ok(Some(Self::parse(s))),
            serde_yaml::Value::Number(n) => Ok(Some(FieldValue::Literal(n.to_string()))),
            serde_yaml::Value::Bool(b) => Ok(Some(FieldValue::Literal(b.to_string()))),
            _ => Err(format!(
                "field_mapping '{}' must be a scalar (string, number or boolean)",
                key
            )),
        }
    }

    /// The bare value: the literal text or the column name
    pub fn raw(&self) -> &str {
        match self {
            FieldValue::Literal(s) | FieldValue::ColumnRef(s) => s,
        }
    }

    pub fn is_column_ref(&self) -> bool {
        matches!(self, FieldValue::ColumnRef(_))
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Literal(s) => f.write_str(s),
            FieldValue::ColumnRef(c) => write!(f, "{}{}", COLUMN_REF_SIGIL, c),
        }
    }
}

impl Serialize for FieldValue {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for FieldValue {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_yaml::Value::deserialize(deserializer)?;
        match FieldValue::from_yaml("value", &value) {
            Ok(Some(v)) => Ok(v),
            Ok(None) => Err(serde::de::Error::custom("field value must not be null")),
            Err(e) => Err(serde::de::Error::custom(e)),
        }
    }
}

/// Configuration of one dataset
#[derive(Debug, Clone, Serialize)]
pub struct DatasetConfig {
    /// Unique dataset id
    pub id: DatasetId,

    /// Human-readable name
    pub name: Option<String>,

    /// Disabled datasets are never selected unless asked for explicitly
    pub enabled: bool,

    /// Source connector name
    pub plugin: String,

    /// Pipeline whose templates apply to this dataset (shared only when unset)
    pub pipeline: Option<PipelineName>,

    /// Category used for `--type` filtering
    pub typ: Option<String>,

    /// Template parameters
    pub field_mapping: BTreeMap<String, FieldValue>,

    /// Connector-specific parameters (path, url, layer, query, ...)
    pub params: BTreeMap<String, serde_yaml::Value>,
}

/// On-disk shape of a dataset entry
#[derive(Debug, Deserialize)]
struct RawDataset {
    id: DatasetId,
    #[serde(default)]
    name: Option<String>,
    #[serde(default = "default_true")]
    enabled: bool,
    #[serde(default)]
    plugin: Option<String>,
    #[serde(default)]
    pipeline: Option<PipelineName>,
    #[serde(default)]
    typ: Option<String>,
    #[serde(default)]
    field_mapping: BTreeMap<String, serde_yaml::Value>,
    #[serde(flatten)]
    params: BTreeMap<String, serde_yaml::Value>,
}

#[derive(Debug, Deserialize)]
struct RawPipeline {
    id: PipelineName,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    datasets: Vec<RawDataset>,
}

#[derive(Debug, Deserialize)]
struct RawCatalog {
    #[serde(default)]
    pipelines: Option<Vec<RawPipeline>>,
    #[serde(default)]
    datasets: Option<Vec<RawDataset>>,
}

impl RawDataset {
    fn into_config(self, pipeline: Option<PipelineName>) -> CoreResult<DatasetConfig> {
        let plugin = self.plugin.ok_or_else(|| CoreError::DatasetMissingField {
            id: self.id.to_string(),
            field: "plugin".to_string(),
        })?;

        let mut field_mapping = BTreeMap::new();
        for (key, value) in &self.field_mapping {
            // data_mappings: {data_1: col} always names source columns
            if key == "data_mappings" {
                let serde_yaml::Value::Mapping(map) = value else {
                    return Err(CoreError::ConfigInvalid {
                        message: format!("dataset '{}': data_mappings must be a mapping", self.id),
                    });
                };
                for (target, source) in map {
                    let (Some(target), Some(source)) = (target.as_str(), source.as_str()) else {
                        return Err(CoreError::ConfigInvalid {
                            message: format!(
                                "dataset '{}': data_mappings entries must be strings",
                                self.id
                            ),
                        });
                    };
                    let column = source.trim_start_matches(COLUMN_REF_SIGIL);
                    field_mapping.insert(
                        target.to_string(),
                        FieldValue::ColumnRef(column.to_string()),
                    );
                }
                continue;
            }
            let parsed = FieldValue::from_yaml(key, value).map_err(|message| {
                CoreError::ConfigInvalid {
                    message: format!("dataset '{}': {}", self.id, message),
                }
            })?;
            if let Some(v) = parsed {
                field_mapping.insert(key.clone(), v);
            }
        }

        Ok(DatasetConfig {
            id: self.id,
            name: self.name,
            enabled: self.enabled,
            plugin,
            pipeline: pipeline.or(self.pipeline),
            typ: self.typ,
            field_mapping,
            params: self.params,
        })
    }
}

impl DatasetConfig {
    /// Display name, falling back to the id
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(self.id.as_str())
    }

    /// Connector parameter as a string
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(|v| v.as_str())
    }

    /// Minimal dataset used by tests and programmatic callers
    pub fn new(id: DatasetId, plugin: &str, pipeline: Option<PipelineName>) -> Self {
        Self {
            id,
            name: None,
            enabled: true,
            plugin: plugin.to_string(),
            pipeline,
            typ: None,
            field_mapping: BTreeMap::new(),
            params: BTreeMap::new(),
        }
    }
}

/// Pipeline metadata from the grouped layout
#[derive(Debug, Clone, Serialize)]
pub struct PipelineInfo {
    pub id: PipelineName,
    pub name: String,
    pub dataset_count: usize,
    pub enabled_count: usize,
}

/// Criteria for choosing which datasets a run processes
#[derive(Debug, Clone, Default)]
pub struct DatasetSelection {
    /// Explicit dataset ids (all when `None`)
    pub ids: Option<Vec<String>>,
    /// Only datasets with this `typ`
    pub typ: Option<String>,
    /// Only datasets of this pipeline
    pub pipeline: Option<String>,
}

/// All datasets of a project, in file order
#[derive(Debug, Clone, Default)]
pub struct DatasetCatalog {
    pub datasets: Vec<DatasetConfig>,
    pub pipelines: Vec<PipelineInfo>,
}

impl DatasetCatalog {
    /// Load the catalog from a YAML file; a missing file is an error
    pub fn load(path: &Path) -> CoreResult<Self> {
        if !path.exists() {
            return Err(CoreError::DatasetsNotFound {
                path: path.display().to_string(),
            });
        }
        let content = std::fs::read_to_string(path).map_err(|e| CoreError::IoWithPath {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_yaml_str(&content)
    }

    /// Parse a catalog from YAML text
    pub fn from_yaml_str(content: &str) -> CoreResult<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let raw: RawCatalog = serde_yaml::from_str(content)?;

        let mut datasets = Vec::new();
        let mut pipelines = Vec::new();

        if let Some(raw_pipelines) = raw.pipelines {
            for p in raw_pipelines {
                let dataset_count = p.datasets.len();
                let enabled_count = p.datasets.iter().filter(|d| d.enabled).count();
                pipelines.push(PipelineInfo {
                    name: p.name.clone().unwrap_or_else(|| p.id.to_string()),
                    id: p.id.clone(),
                    dataset_count,
                    enabled_count,
                });
                for ds in p.datasets {
                    datasets.push(ds.into_config(Some(p.id.clone()))?);
                }
            }
        }
        if let Some(raw_datasets) = raw.datasets {
            for ds in raw_datasets {
                datasets.push(ds.into_config(None)?);
            }
        }

        let mut seen: HashMap<&str, &str> = HashMap::new();
        for ds in &datasets {
            let pipeline = ds.pipeline.as_deref().unwrap_or("-");
            if let Some(first) = seen.insert(ds.id.as_str(), pipeline) {
                return Err(CoreError::DuplicateDataset {
                    id: ds.id.to_string(),
                    first: first.to_string(),
                    second: pipeline.to_string(),
                });
            }
        }

        Ok(Self {
            datasets,
            pipelines,
        })
    }

    /// Look up a dataset by id
    pub fn get(&self, id: &str) -> Option<&DatasetConfig> {
        self.datasets.iter().find(|d| d.id == id)
    }

    /// Apply a selection. Disabled datasets are skipped with a log line;
    /// unknown explicit ids are an error.
    pub fn select(&self, selection: &DatasetSelection) -> CoreResult<Vec<DatasetConfig>> {
        let wanted: Option<HashSet<&str>> = selection
            .ids
            .as_ref()
            .map(|ids| ids.iter().map(String::as_str).collect());

        if let Some(wanted) = &wanted {
            for id in wanted {
                if self.get(id).is_none() {
                    return Err(CoreError::UnknownDataset { id: id.to_string() });
                }
            }
        }

        let mut selected = Vec::new();
        for ds in &self.datasets {
            if let Some(typ) = &selection.typ {
                if ds.typ.as_deref() != Some(typ.as_str()) {
                    continue;
                }
            }
            if let Some(pipeline) = &selection.pipeline {
                if ds.pipeline.as_deref() != Some(pipeline.as_str()) {
                    continue;
                }
            }
            if let Some(wanted) = &wanted {
                if !wanted.contains(ds.id.as_str()) {
                    continue;
                }
            }
            if !ds.enabled {
                log::info!("Skipping disabled dataset {}", ds.id);
                continue;
            }
            selected.push(ds.clone());
        }
        Ok(selected)
    }

    /// Distinct `typ` values with their dataset counts, sorted by type
    pub fn types(&self) -> BTreeMap<String, usize> {
        let mut types = BTreeMap::new();
        for ds in &self.datasets {
            if let Some(t) = &ds.typ {
                *types.entry(t.clone()).or_insert(0) += 1;
            }
        }
        types
    }
}

#[cfg(test)]
#[path = "dataset_test.rs"]
mod tests;
