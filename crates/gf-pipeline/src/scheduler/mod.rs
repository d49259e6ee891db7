//! Pipeline scheduler.
//!
//! Drives the extract, transform, merge and post-merge phases. Extract and
//! transform fan out over bounded worker pools; merge and post-merge run
//! sequentially against the warehouse. Every phase awaits all of its tasks
//! before the next one starts, and a phase where nothing succeeded skips the
//! phases that depend on it.

mod extract;
mod transform;

use crate::cancel::CancellationFlag;
use crate::connector::ConnectorRegistry;
use crate::error::PipelineResult;
use crate::merge::merge_unit;
use crate::observer::{NoopObserver, PhaseObserver};
use crate::post_merge::{plan_post_merge, PostMergeAggregator, PostMergeTrigger};
use crate::summary::{Outcome, Phase, PhaseSummary, RunMode, RunStatus, RunSummary};
use crate::unit::TransformUnit;
use chrono::Utc;
use gf_core::template::{MART_SCHEMA, RAW_SCHEMA};
use gf_core::{DatasetConfig, DatasetId, ExecutionSettings, Project, TemplateIndex};
use gf_db::{Database, DuckDbBackend};
use gf_jinja::TemplateRenderer;
use gf_meta::history::{record_dataset_run, record_run};
use gf_meta::{migrate_ledger, DatasetRunRecord, LedgerUpgrade};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Instant;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Datasets whose ledger records are ignored for this run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ForceSelection {
    #[default]
    None,
    /// Every dataset and every post-merge template
    All,
    Datasets(BTreeSet<DatasetId>),
}

impl ForceSelection {
    pub fn includes(&self, dataset: &DatasetId) -> bool {
        match self {
            ForceSelection::None => false,
            ForceSelection::All => true,
            ForceSelection::Datasets(ids) => ids.contains(dataset),
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, ForceSelection::All)
    }
}

/// Options of one orchestrator invocation
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub mode: RunMode,
    pub force: ForceSelection,
}

/// Orchestrates the phases of a run against one warehouse
pub struct Scheduler {
    warehouse: DuckDbBackend,
    registry: Arc<ConnectorRegistry>,
    renderer: Arc<TemplateRenderer>,
    templates: Arc<TemplateIndex>,
    settings: ExecutionSettings,
    project_root: PathBuf,
    raw_dir: PathBuf,
    temp_dir: PathBuf,
    extensions: Arc<Vec<String>>,
    schemas: Arc<Vec<String>>,
    cancel: CancellationFlag,
    observer: Arc<dyn PhaseObserver>,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("warehouse", &self.warehouse)
            .field("settings", &self.settings)
            .field("raw_dir", &self.raw_dir)
            .field("temp_dir", &self.temp_dir)
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    /// Scheduler for a project over an already opened warehouse
    pub fn new(project: &Project, warehouse: DuckDbBackend, settings: ExecutionSettings) -> Self {
        let extensions = project.config.database.extensions.clone();
        Self {
            warehouse,
            registry: Arc::new(ConnectorRegistry::with_builtins(&extensions)),
            renderer: Arc::new(TemplateRenderer::new(
                project.config.template_defaults.clone(),
            )),
            templates: Arc::new(project.templates.clone()),
            settings,
            project_root: project.root.clone(),
            raw_dir: project.raw_dir(),
            temp_dir: project.temp_dir(),
            extensions: Arc::new(extensions),
            schemas: Arc::new(project.config.database.schemas.clone()),
            cancel: CancellationFlag::new(),
            observer: Arc::new(NoopObserver),
        }
    }

    /// Open the project's warehouse and build a scheduler over it
    pub fn open(project: &Project, settings: ExecutionSettings) -> PipelineResult<Self> {
        let warehouse = DuckDbBackend::new(&project.warehouse_path())?;
        Ok(Self::new(project, warehouse, settings))
    }

    pub fn with_registry(mut self, registry: ConnectorRegistry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn PhaseObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation(&self) -> &CancellationFlag {
        &self.cancel
    }

    pub fn warehouse(&self) -> &DuckDbBackend {
        &self.warehouse
    }

    pub fn settings(&self) -> &ExecutionSettings {
        &self.settings
    }

    /// Snapshot location of a dataset
    pub fn snapshot_path(&self, dataset: &DatasetId) -> PathBuf {
        self.raw_dir.join(format!("{}.parquet", dataset))
    }

    /// Existing snapshots of the given datasets in the raw directory
    pub fn discover_snapshots(&self, datasets: &[DatasetConfig]) -> BTreeMap<DatasetId, PathBuf> {
        datasets
            .iter()
            .map(|d| (d.id.clone(), self.snapshot_path(&d.id)))
            .filter(|(_, path)| path.is_file())
            .collect()
    }

    /// Load extensions (best effort), create base schemas and migrate the ledger
    pub async fn init_warehouse(&self) -> PipelineResult<()> {
        let failed = self.warehouse.load_extensions(&self.extensions).await;
        if !failed.is_empty() {
            log::warn!("Warehouse extensions not loaded: {}", failed.join(", "));
        }
        let mut schemas: Vec<&str> = vec![RAW_SCHEMA, MART_SCHEMA];
        schemas.extend(self.schemas.iter().map(String::as_str));
        for schema in schemas {
            self.warehouse.create_schema_if_not_exists(schema).await?;
        }
        let ledger = self
            .warehouse
            .run(|conn| -> PipelineResult<LedgerUpgrade> { Ok(migrate_ledger(conn)?) })
            .await?;
        if ledger.is_fresh() {
            log::info!("Initialized warehouse ledger v{}", ledger.to);
        } else if ledger.applied() > 0 {
            log::info!("Upgraded warehouse ledger v{} -> v{}", ledger.from, ledger.to);
        }
        Ok(())
    }

    /// Fold transform units into the warehouse one at a time.
    ///
    /// Returns the phase summary and the datasets that were merged.
    pub async fn run_merge(&self, mut units: Vec<TransformUnit>) -> (PhaseSummary, Vec<DatasetConfig>) {
        let started = Instant::now();
        units.sort_by(|a, b| a.dataset().id.cmp(&b.dataset().id));
        self.observer.phase_started(Phase::Merge, units.len());
        log::info!("Merging {} units", units.len());

        let mut items = Vec::with_capacity(units.len());
        let mut merged = Vec::new();
        for mut unit in units {
            let id = unit.dataset().id.to_string();
            self.observer.item_started(Phase::Merge, &id);
            let item_started = Instant::now();

            let outcome = match self.cancel.check() {
                Err(e) => {
                    unit.mark_failed();
                    Outcome::failed(&id, e)
                }
                Ok(()) => match merge_unit(&self.warehouse, unit.path(), &id).await {
                    Ok(report) => {
                        unit.mark_merged();
                        merged.push(unit.dataset().clone());
                        Outcome::success(&id)
                            .with_rows(unit.row_count())
                            .with_message(format!("{} tables", report.tables.len()))
                    }
                    Err(e) => {
                        log::error!("{}", e);
                        unit.mark_failed();
                        Outcome::failed(&id, e)
                    }
                },
            }
            .with_duration(item_started.elapsed());

            unit.dispose(self.settings.retain_failed_units);
            self.observer.item_finished(Phase::Merge, &outcome);
            items.push(outcome);
        }

        let summary = PhaseSummary::new(Phase::Merge, items, started.elapsed());
        self.observer.phase_finished(&summary);
        (summary, merged)
    }

    /// Run pipeline-merged then global templates against the warehouse
    pub async fn run_post_merge(&self, trigger: &PostMergeTrigger) -> PipelineResult<PhaseSummary> {
        let started = Instant::now();
        let steps = plan_post_merge(&self.templates);
        self.observer.phase_started(Phase::PostMerge, steps.len());
        log::info!("Running {} post-merge templates", steps.len());

        let items = PostMergeAggregator::new(
            &self.warehouse,
            &self.renderer,
            &self.cancel,
            self.observer.as_ref(),
        )
        .run(&steps, trigger)
        .await?;

        let summary = PhaseSummary::new(Phase::PostMerge, items, started.elapsed());
        self.observer.phase_finished(&summary);
        Ok(summary)
    }

    /// Run the phases selected by `options.mode` for the given datasets
    pub async fn run_full(
        &self,
        datasets: &[DatasetConfig],
        options: &RunOptions,
    ) -> PipelineResult<RunSummary> {
        let run_id = uuid::Uuid::new_v4().to_string();
        let started_at = Utc::now().format(TIMESTAMP_FORMAT).to_string();
        let clock = Instant::now();
        log::info!(
            "Run {} ({}) over {} datasets",
            run_id,
            options.mode,
            datasets.len()
        );
        self.init_warehouse().await?;

        let mut summary = RunSummary {
            run_id: run_id.clone(),
            mode: options.mode,
            started_at: started_at.clone(),
            finished_at: String::new(),
            duration_ms: 0,
            status: RunStatus::Success,
            extract: None,
            transform: None,
            merge: None,
            post_merge: None,
            skipped_phases: Vec::new(),
        };

        let transform_input = match options.mode {
            RunMode::TransformOnly => Some((datasets.to_vec(), self.discover_snapshots(datasets))),
            RunMode::Full | RunMode::ExtractOnly => {
                let extract = self.run_extract(datasets).await;
                self.write_history(&run_id, &extract).await;
                let next = if options.mode != RunMode::Full {
                    None
                } else if extract.is_total_failure() {
                    log::error!("Extract failed for every dataset; skipping later phases");
                    summary
                        .skipped_phases
                        .extend([Phase::Transform, Phase::Merge, Phase::PostMerge]);
                    None
                } else {
                    let extracted: BTreeSet<&str> = extract.succeeded_ids().collect();
                    let selected: Vec<DatasetConfig> = datasets
                        .iter()
                        .filter(|d| extracted.contains(d.id.as_str()))
                        .cloned()
                        .collect();
                    let snapshots = selected
                        .iter()
                        .map(|d| (d.id.clone(), self.snapshot_path(&d.id)))
                        .collect();
                    Some((selected, snapshots))
                };
                summary.extract = Some(extract);
                next
            }
        };

        if let Some((selected, snapshots)) = transform_input {
            self.run_transform_and_merge(&selected, &snapshots, options, &run_id, &mut summary)
                .await?;
        }

        summary.finished_at = Utc::now().format(TIMESTAMP_FORMAT).to_string();
        summary.duration_ms = clock.elapsed().as_millis() as u64;
        summary.status = summary.compute_status();

        let (mode, status) = (options.mode.to_string(), summary.status.to_string());
        let recorded = self
            .warehouse
            .run(move |conn| -> PipelineResult<()> {
                record_run(conn, &run_id, &mode, &status, &started_at)?;
                Ok(())
            })
            .await;
        if let Err(e) = recorded {
            log::warn!("Failed to record run history: {}", e);
        }

        log::info!(
            "Run {} finished: {} in {}ms",
            summary.run_id,
            summary.status,
            summary.duration_ms
        );
        Ok(summary)
    }

    async fn run_transform_and_merge(
        &self,
        datasets: &[DatasetConfig],
        snapshots: &BTreeMap<DatasetId, PathBuf>,
        options: &RunOptions,
        run_id: &str,
        summary: &mut RunSummary,
    ) -> PipelineResult<()> {
        let (transform, units) = self
            .run_transform(datasets, snapshots, &options.force)
            .await?;
        self.write_history(run_id, &transform).await;
        let transform_failed = transform.is_total_failure();
        summary.transform = Some(transform);
        if transform_failed {
            log::error!("Transform failed for every dataset; skipping merge");
            for unit in units {
                unit.dispose(self.settings.retain_failed_units);
            }
            summary.skipped_phases.extend([Phase::Merge, Phase::PostMerge]);
            return Ok(());
        }

        let (merge, merged) = self.run_merge(units).await;
        self.write_history(run_id, &merge).await;
        let merge_failed = merge.is_total_failure();
        summary.merge = Some(merge);
        if merge_failed {
            log::error!("Every merge failed; skipping post-merge templates");
            summary.skipped_phases.push(Phase::PostMerge);
            return Ok(());
        }

        let trigger = PostMergeTrigger {
            merged_pipelines: merged.iter().filter_map(|d| d.pipeline.clone()).collect(),
            any_merged: !merged.is_empty(),
            force: options.force.is_all(),
        };
        let post_merge = self.run_post_merge(&trigger).await?;
        self.write_history(run_id, &post_merge).await;
        summary.post_merge = Some(post_merge);
        Ok(())
    }

    /// Append the outcomes of a finished phase to the run history
    async fn write_history(&self, run_id: &str, summary: &PhaseSummary) {
        let records: Vec<DatasetRunRecord> = summary
            .items
            .iter()
            .map(|o| DatasetRunRecord {
                run_id: run_id.to_string(),
                dataset_id: o.id.clone(),
                phase: summary.phase.to_string(),
                status: o.status.to_string(),
                error: o.error.clone(),
                row_count: o.rows.map(|r| r as i64),
                duration_ms: o.duration_ms as i64,
            })
            .collect();
        let result = self
            .warehouse
            .run(move |conn| -> PipelineResult<()> {
                for record in &records {
                    record_dataset_run(conn, record)?;
                }
                Ok(())
            })
            .await;
        if let Err(e) = result {
            log::warn!("Failed to record {} history: {}", summary.phase, e);
        }
    }
}

/// Drain the shared outcome list of a finished phase
fn take_outcomes(results: &Mutex<Vec<Outcome>>) -> Vec<Outcome> {
    std::mem::take(&mut *results.lock().unwrap_or_else(|p| p.into_inner()))
}

#[cfg(test)]
#[path = "scheduler_test.rs"]
mod tests;
