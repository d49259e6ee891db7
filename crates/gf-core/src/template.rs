//! Template discovery and the immutable template index.
//!
//! Templates live under `<sql_dir>/migrations/`:
//!
//! | location | kind |
//! |---|---|
//! | `NNN_<name>_template.sql` | shared, runs for every dataset |
//! | `<dir>/NNN_<name>_template.sql` | pipeline, runs for datasets of that pipeline |
//! | `<dir>/NNN_<name>_merged.sql` | pipeline-merged, runs once against the warehouse |
//! | `_global/<prefix>_<name>.sql` | global, runs after every pipeline-merged template |
//!
//! Pipeline directories may carry a three-letter ordering prefix
//! (`aab_ext_restr` is pipeline `ext_restr`). Other files are ignored.

use crate::error::{CoreError, CoreResult};
use crate::names::PipelineName;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Directory holding global post-pipeline templates
pub const GLOBAL_DIR: &str = "_global";

const TEMPLATE_SUFFIX: &str = "_template";
const MERGED_SUFFIX: &str = "_merged";
const MIGRATE_UP: &str = "-- migrate:up";
const MIGRATE_DOWN: &str = "-- migrate:down";

/// Schema every chain starts from
pub const RAW_SCHEMA: &str = "raw";
/// Target of `_mart_` templates
pub const MART_SCHEMA: &str = "mart";
/// Target of templates that are neither staging nor mart
pub const STAGING_SCHEMA: &str = "staging";

/// Kind of a template
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateKind {
    Shared,
    Pipeline,
    PipelineMerged,
    Global,
}

impl TemplateKind {
    /// Whether templates of this kind run against the warehouse after merge
    pub fn is_post_merge(self) -> bool {
        matches!(self, TemplateKind::PipelineMerged | TemplateKind::Global)
    }
}

impl fmt::Display for TemplateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TemplateKind::Shared => "shared",
            TemplateKind::Pipeline => "pipeline",
            TemplateKind::PipelineMerged => "pipeline_merged",
            TemplateKind::Global => "global",
        };
        f.write_str(s)
    }
}

/// Ordering prefix of a template file (`004`, `x01`).
///
/// All-digit prefixes compare numerically and sort before any other prefix;
/// the rest compare lexicographically.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct TemplatePrefix(String);

impl TemplatePrefix {
    /// Parse the prefix of a file stem: the token before the first `_`.
    ///
    /// The token must be alphanumeric and contain at least one digit.
    pub fn from_stem(stem: &str) -> Option<Self> {
        let (token, rest) = stem.split_once('_')?;
        if token.is_empty()
            || rest.is_empty()
            || !token.chars().all(|c| c.is_ascii_alphanumeric())
            || !token.chars().any(|c| c.is_ascii_digit())
        {
            return None;
        }
        Some(Self(token.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn numeric(&self) -> Option<u64> {
        if self.0.chars().all(|c| c.is_ascii_digit()) {
            self.0.parse().ok()
        } else {
            None
        }
    }
}

impl Ord for TemplatePrefix {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.numeric(), other.numeric()) {
            (Some(a), Some(b)) => a.cmp(&b).then_with(|| self.0.cmp(&other.0)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => self.0.cmp(&other.0),
        }
    }
}

impl PartialOrd for TemplatePrefix {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for TemplatePrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Stable template identifier used as the ledger key.
///
/// Formats: `shared/004_staging_transform`, `P1/001_staging_norm`,
/// `P1/merged/003_mart_union`, `global/x01_h3_union`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TemplateId(String);

impl TemplateId {
    fn for_template(kind: TemplateKind, pipeline: Option<&PipelineName>, name: &str) -> Self {
        let id = match (kind, pipeline) {
            (TemplateKind::Shared, _) => format!("shared/{}", name),
            (TemplateKind::Pipeline, Some(p)) => format!("{}/{}", p, name),
            (TemplateKind::PipelineMerged, Some(p)) => format!("{}/merged/{}", p, name),
            (TemplateKind::Global, _) => format!("global/{}", name),
            (_, None) => format!("unassigned/{}", name),
        };
        Self(id)
    }

    /// Wrap an id read back from the ledger
    pub fn from_raw(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TemplateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for TemplateId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::borrow::Borrow<str> for TemplateId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// A discovered SQL template
#[derive(Debug, Clone, Serialize)]
pub struct Template {
    pub id: TemplateId,
    pub prefix: TemplatePrefix,
    /// File stem without the kind suffix, e.g. `004_staging_transform`
    pub name: String,
    pub kind: TemplateKind,
    pub pipeline: Option<PipelineName>,
    /// Schema the template writes into
    pub schema: String,
    #[serde(skip)]
    pub path: PathBuf,
    /// Body of the `migrate:up` section
    #[serde(skip)]
    pub sql: String,
}

impl Template {
    fn load(
        path: &Path,
        stem: &str,
        name: &str,
        kind: TemplateKind,
        pipeline: Option<PipelineName>,
    ) -> CoreResult<Self> {
        let prefix =
            TemplatePrefix::from_stem(stem).ok_or_else(|| CoreError::TemplateMissingPrefix {
                path: path.display().to_string(),
            })?;
        let content = std::fs::read_to_string(path).map_err(|e| CoreError::IoWithPath {
            path: path.display().to_string(),
            source: e,
        })?;
        let schema = schema_name(stem, &prefix, pipeline.as_ref());
        Ok(Self {
            id: TemplateId::for_template(kind, pipeline.as_ref(), name),
            prefix,
            name: name.to_string(),
            kind,
            pipeline,
            schema,
            path: path.to_path_buf(),
            sql: extract_up_section(&content),
        })
    }

    /// Whether the template builds a staging schema
    pub fn is_staging(&self) -> bool {
        self.schema != MART_SCHEMA
    }
}

/// Keep only the `migrate:up` section of a migration-style file.
pub fn extract_up_section(content: &str) -> String {
    let content = match content.split_once(MIGRATE_DOWN) {
        Some((up, _)) => up,
        None => content,
    };
    let content = match content.split_once(MIGRATE_UP) {
        Some((_, body)) => body,
        None => content,
    };
    content.trim().to_string()
}

/// Target schema of a template.
///
/// `_staging_` templates get a numbered schema (`staging_004`, or
/// `staging_<pipeline>_001` inside a pipeline), `_mart_` templates target
/// `mart`, everything else `staging`.
pub fn schema_name(stem: &str, prefix: &TemplatePrefix, pipeline: Option<&PipelineName>) -> String {
    let lower = stem.to_lowercase();
    if lower.contains("_staging_") {
        match pipeline {
            Some(p) => format!("staging_{}_{}", p, prefix),
            None => format!("staging_{}", prefix),
        }
    } else if lower.contains("_mart_") {
        MART_SCHEMA.to_string()
    } else {
        STAGING_SCHEMA.to_string()
    }
}

/// Pipeline name for a directory, stripping a three-letter ordering prefix.
///
/// `aab_ext_restr` becomes `ext_restr`, `aaa_avdelning` becomes `avdelning`.
pub fn pipeline_name_for_dir(dir: &str) -> &str {
    match dir.split_once('_') {
        Some((head, rest))
            if head.len() == 3 && head.chars().all(|c| c.is_ascii_alphabetic()) && !rest.is_empty() =>
        {
            rest
        }
        _ => dir,
    }
}

/// One step of an executable chain with its resolved input schema
#[derive(Debug, Clone)]
pub struct ChainStep {
    pub template: Arc<Template>,
    pub prev_schema: String,
}

/// Templates of one pipeline directory
#[derive(Debug, Clone, Default)]
pub struct PipelineTemplates {
    /// Directory name under `migrations/`
    pub dir_name: String,
    /// Per-dataset templates in execution order
    pub templates: Vec<Arc<Template>>,
    /// Post-merge templates in execution order
    pub merged: Vec<Arc<Template>>,
}

/// Immutable index of all templates, built once at startup
#[derive(Debug, Clone, Default)]
pub struct TemplateIndex {
    root: PathBuf,
    shared: Vec<Arc<Template>>,
    pipelines: BTreeMap<PipelineName, PipelineTemplates>,
    /// Pipelines in directory order, which is their execution order
    pipeline_order: Vec<PipelineName>,
    global: Vec<Arc<Template>>,
}

impl TemplateIndex {
    /// Discover every template under a migrations directory.
    ///
    /// A missing directory yields an empty index.
    pub fn discover(root: &Path) -> CoreResult<Self> {
        let mut index = TemplateIndex {
            root: root.to_path_buf(),
            ..Default::default()
        };
        if !root.is_dir() {
            log::warn!("Template directory {} does not exist", root.display());
            return Ok(index);
        }

        for entry in sorted_entries(root)? {
            let file_name = entry
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default()
                .to_string();

            if entry.is_dir() {
                if file_name == GLOBAL_DIR {
                    index.global = discover_global(&entry)?;
                } else if !file_name.starts_with('.') && !file_name.starts_with('_') {
                    index.add_pipeline_dir(&entry, &file_name)?;
                }
                continue;
            }

            let Some(stem) = sql_stem(&entry) else {
                continue;
            };
            if stem.ends_with(MERGED_SUFFIX) {
                return Err(CoreError::RootMergedTemplate {
                    path: entry.display().to_string(),
                });
            }
            if let Some(name) = stem.strip_suffix(TEMPLATE_SUFFIX) {
                let template = Template::load(&entry, stem, name, TemplateKind::Shared, None)?;
                index.shared.push(Arc::new(template));
            } else {
                log::debug!("Ignoring non-template file {}", entry.display());
            }
        }

        sort_and_check(&mut index.shared)?;
        log::debug!(
            "Discovered {} shared, {} pipeline and {} global templates",
            index.shared.len(),
            index.pipelines.len(),
            index.global.len()
        );
        Ok(index)
    }

    fn add_pipeline_dir(&mut self, dir: &Path, dir_name: &str) -> CoreResult<()> {
        let pipeline = PipelineName::try_new(pipeline_name_for_dir(dir_name)).ok_or_else(|| {
            CoreError::InvalidPipelineDir {
                dir: dir.display().to_string(),
            }
        })?;
        if let Some(existing) = self.pipelines.get(&pipeline) {
            return Err(CoreError::DuplicatePipelineDir {
                pipeline: pipeline.to_string(),
                first: existing.dir_name.clone(),
                second: dir_name.to_string(),
            });
        }

        let mut group = PipelineTemplates {
            dir_name: dir_name.to_string(),
            ..Default::default()
        };
        for entry in sorted_entries(dir)? {
            let Some(stem) = sql_stem(&entry) else {
                continue;
            };
            if let Some(name) = stem.strip_suffix(TEMPLATE_SUFFIX) {
                let t = Template::load(
                    &entry,
                    stem,
                    name,
                    TemplateKind::Pipeline,
                    Some(pipeline.clone()),
                )?;
                group.templates.push(Arc::new(t));
            } else if let Some(name) = stem.strip_suffix(MERGED_SUFFIX) {
                let t = Template::load(
                    &entry,
                    stem,
                    name,
                    TemplateKind::PipelineMerged,
                    Some(pipeline.clone()),
                )?;
                group.merged.push(Arc::new(t));
            } else {
                log::debug!("Ignoring non-template file {}", entry.display());
            }
        }
        sort_and_check(&mut group.templates)?;
        sort_and_check(&mut group.merged)?;
        self.pipeline_order.push(pipeline.clone());
        self.pipelines.insert(pipeline, group);
        Ok(())
    }

    /// Root the index was discovered from
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Shared templates in execution order
    pub fn shared(&self) -> &[Arc<Template>] {
        &self.shared
    }

    /// Global templates in execution order
    pub fn global(&self) -> &[Arc<Template>] {
        &self.global
    }

    /// Templates of a pipeline directory
    pub fn pipeline(&self, name: &str) -> Option<&PipelineTemplates> {
        self.pipelines.get(name)
    }

    /// Pipelines with a template directory, in directory order.
    ///
    /// The directory prefix (`aaa_`, `aab_`) orders pipelines even though it
    /// is not part of the pipeline name.
    pub fn pipeline_names(&self) -> impl Iterator<Item = &PipelineName> {
        self.pipeline_order.iter()
    }

    fn pipeline_groups(&self) -> impl Iterator<Item = &PipelineTemplates> {
        self.pipeline_order
            .iter()
            .filter_map(|name| self.pipelines.get(name))
    }

    /// Every template: shared, pipeline groups in directory order, then global
    pub fn all(&self) -> Vec<Arc<Template>> {
        let mut all: Vec<Arc<Template>> = self.shared.clone();
        for group in self.pipeline_groups() {
            all.extend(group.templates.iter().cloned());
            all.extend(group.merged.iter().cloned());
        }
        all.extend(self.global.iter().cloned());
        all
    }

    /// Look up a template by id
    pub fn get(&self, id: &str) -> Option<Arc<Template>> {
        self.all().into_iter().find(|t| t.id.as_str() == id)
    }

    /// Total number of templates
    pub fn len(&self) -> usize {
        self.all().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Per-dataset chain: shared templates, then the pipeline's templates.
    ///
    /// `prev_schema` starts at `raw` and follows the most recent staging
    /// schema, so a mart step reads the last staging schema before it.
    pub fn chain_for(&self, pipeline: Option<&PipelineName>) -> Vec<ChainStep> {
        let mut templates: Vec<Arc<Template>> = self.shared.clone();
        if let Some(group) = pipeline.and_then(|p| self.pipelines.get(p)) {
            templates.extend(group.templates.iter().cloned());
        }
        link_steps(templates, RAW_SCHEMA)
    }

    /// Post-merge chain of one pipeline; reads start from `mart`
    pub fn merged_chain_for(&self, pipeline: &PipelineName) -> Vec<ChainStep> {
        let templates = self
            .pipelines
            .get(pipeline)
            .map(|g| g.merged.clone())
            .unwrap_or_default();
        link_steps(templates, MART_SCHEMA)
    }

    /// Global post-merge chain; reads start from `mart`
    pub fn global_chain(&self) -> Vec<ChainStep> {
        link_steps(self.global.clone(), MART_SCHEMA)
    }
}

fn link_steps(templates: Vec<Arc<Template>>, start: &str) -> Vec<ChainStep> {
    let mut last_staging = start.to_string();
    templates
        .into_iter()
        .map(|template| {
            let prev_schema = last_staging.clone();
            if template.is_staging() {
                last_staging = template.schema.clone();
            }
            ChainStep {
                template,
                prev_schema,
            }
        })
        .collect()
}

fn discover_global(dir: &Path) -> CoreResult<Vec<Arc<Template>>> {
    let mut templates = Vec::new();
    for entry in sorted_entries(dir)? {
        let Some(stem) = sql_stem(&entry) else {
            continue;
        };
        let template = Template::load(&entry, stem, stem, TemplateKind::Global, None)?;
        templates.push(Arc::new(template));
    }
    sort_and_check(&mut templates)?;
    Ok(templates)
}

/// File stem of a `.sql` file
fn sql_stem(path: &Path) -> Option<&str> {
    if !path.is_file() || !path.extension().is_some_and(|e| e == "sql") {
        return None;
    }
    path.file_stem().and_then(|s| s.to_str())
}

fn sorted_entries(dir: &Path) -> CoreResult<Vec<PathBuf>> {
    let mut entries = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(|e| CoreError::IoWithPath {
        path: dir.display().to_string(),
        source: e,
    })? {
        let entry = entry.map_err(|e| CoreError::IoWithPath {
            path: dir.display().to_string(),
            source: e,
        })?;
        entries.push(entry.path());
    }
    entries.sort();
    Ok(entries)
}

fn sort_and_check(templates: &mut [Arc<Template>]) -> CoreResult<()> {
    templates.sort_by(|a, b| a.prefix.cmp(&b.prefix).then_with(|| a.name.cmp(&b.name)));
    for pair in templates.windows(2) {
        if pair[0].prefix == pair[1].prefix {
            return Err(CoreError::DuplicateTemplatePrefix {
                prefix: pair[0].prefix.to_string(),
                first: pair[0].path.display().to_string(),
                second: pair[1].path.display().to_string(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "template_test.rs"]
mod tests;
