//! Transform phase: one isolated unit per dataset

use super::{take_outcomes, ForceSelection, Scheduler};
use crate::cancel::CancellationFlag;
use crate::error::{PipelineError, PipelineResult};
use crate::observer::PhaseObserver;
use crate::summary::{Outcome, OutcomeStatus, Phase, PhaseSummary, TemplateOutcome};
use crate::unit::{plan_chain, remove_database_files, PlannedStep, TransformUnit};
use gf_core::{compute_file_checksum, ChainStep, DatasetConfig, DatasetId};
use gf_jinja::TemplateRenderer;
use gf_meta::{ExecutionTracker, LedgerSnapshot};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::Semaphore;

/// How a dataset's transform ended
enum TransformResult {
    /// Every chain step already has a current ledger record
    UpToDate(Vec<TemplateOutcome>),
    /// Chain applied and the unit closed, ready for merge
    Ready(TransformUnit),
    Failed(PipelineError, Vec<TemplateOutcome>),
}

/// Everything one transform task owns
struct TransformTask {
    dataset: DatasetConfig,
    snapshot: PathBuf,
    chain: Vec<ChainStep>,
    renderer: Arc<TemplateRenderer>,
    ledger: Arc<LedgerSnapshot>,
    forced: bool,
    temp_dir: PathBuf,
    extensions: Arc<Vec<String>>,
    schemas: Arc<Vec<String>>,
    retain_failed: bool,
    cancel: CancellationFlag,
    observer: Arc<dyn PhaseObserver>,
}

impl TransformTask {
    async fn run(self, semaphore: Arc<Semaphore>) -> (Outcome, Option<TransformUnit>) {
        let id = self.dataset.id.to_string();
        let _permit = match semaphore.acquire().await {
            Ok(permit) => permit,
            Err(_) => return (Outcome::failed(id, PipelineError::Cancelled), None),
        };
        if let Err(e) = self.cancel.check() {
            return (Outcome::failed(id, e), None);
        }

        self.observer.item_started(Phase::Transform, &id);
        let started = Instant::now();
        let (outcome, unit) = match self.transform().await {
            TransformResult::UpToDate(templates) => (
                Outcome::skipped(&id, "all templates up to date").with_templates(templates),
                None,
            ),
            TransformResult::Ready(unit) => {
                log::info!(
                    "[{}] transformed ({} templates)",
                    id,
                    unit.template_outcomes().len()
                );
                let outcome = Outcome::success(&id)
                    .with_rows(unit.row_count())
                    .with_templates(unit.template_outcomes().to_vec());
                (outcome, Some(unit))
            }
            TransformResult::Failed(e, templates) => {
                log::warn!("[{}] transform failed: {}", id, e);
                (Outcome::failed(&id, e).with_templates(templates), None)
            }
        };
        (outcome.with_duration(started.elapsed()), unit)
    }

    async fn transform(&self) -> TransformResult {
        let steps = match self.plan().await {
            Ok(steps) => steps,
            Err(e) => return TransformResult::Failed(e, Vec::new()),
        };

        if !self.forced && !steps.is_empty() && self.all_current(&steps) {
            log::info!("[{}] all templates up to date, skipping", self.dataset.id);
            let templates = steps
                .iter()
                .map(|s| TemplateOutcome {
                    template_id: s.template.id.to_string(),
                    status: OutcomeStatus::Skipped,
                    duration_ms: 0,
                    error: None,
                })
                .collect();
            return TransformResult::UpToDate(templates);
        }

        let mut unit = match TransformUnit::create(
            self.dataset.clone(),
            &self.temp_dir,
            &self.extensions,
            &self.schemas,
            self.cancel.clone(),
        )
        .await
        {
            Ok(unit) => unit,
            Err(e) => {
                if !self.retain_failed {
                    let path = self.temp_dir.join(format!("{}.duckdb", self.dataset.id));
                    if let Err(err) = remove_database_files(&path) {
                        log::warn!("Failed to remove {}: {}", path.display(), err);
                    }
                }
                return TransformResult::Failed(e, Vec::new());
            }
        };

        match drive(&mut unit, &self.snapshot, &steps).await {
            Ok(()) => TransformResult::Ready(unit),
            Err(e) => {
                let templates = unit.template_outcomes().to_vec();
                unit.mark_failed();
                unit.dispose(self.retain_failed);
                TransformResult::Failed(e, templates)
            }
        }
    }

    /// Hash the snapshot and render the chain
    async fn plan(&self) -> PipelineResult<Vec<PlannedStep>> {
        let snapshot = self.snapshot.clone();
        let digest = tokio::task::spawn_blocking(move || compute_file_checksum(&snapshot))
            .await
            .map_err(|e| PipelineError::Io(std::io::Error::other(e.to_string())))??;
        plan_chain(&self.chain, &self.renderer, &self.dataset, &digest)
    }

    fn all_current(&self, steps: &[PlannedStep]) -> bool {
        steps.iter().all(|s| {
            self.ledger
                .is_current(s.template.id.as_str(), self.dataset.id.as_str(), &s.checksum)
        })
    }
}

async fn drive(
    unit: &mut TransformUnit,
    snapshot: &std::path::Path,
    steps: &[PlannedStep],
) -> PipelineResult<()> {
    unit.seed(snapshot).await?;
    unit.apply_chain(steps).await?;
    unit.close().await
}

impl Scheduler {
    /// Run each dataset's chain in its own unit.
    ///
    /// Datasets without a snapshot fail. A dataset whose every chain step has
    /// a current ledger record is skipped unless forced; forced datasets have
    /// their warehouse records cleared first. Returns the phase summary and
    /// the closed units ready for merge.
    pub async fn run_transform(
        &self,
        datasets: &[DatasetConfig],
        snapshots: &BTreeMap<DatasetId, PathBuf>,
        force: &ForceSelection,
    ) -> PipelineResult<(PhaseSummary, Vec<TransformUnit>)> {
        let started = Instant::now();
        self.observer.phase_started(Phase::Transform, datasets.len());
        log::info!(
            "Transforming {} datasets ({} concurrent)",
            datasets.len(),
            self.settings.transform_concurrency
        );

        self.clear_forced(datasets, force).await?;
        let ledger = Arc::new(
            self.warehouse
                .run(|conn| -> PipelineResult<LedgerSnapshot> {
                    Ok(ExecutionTracker::new(conn).snapshot()?)
                })
                .await?,
        );

        std::fs::create_dir_all(&self.temp_dir)?;
        let semaphore = Arc::new(Semaphore::new(self.settings.transform_concurrency));
        let results = Arc::new(Mutex::new(Vec::with_capacity(datasets.len())));
        let ready = Arc::new(Mutex::new(Vec::new()));

        let mut ids = Vec::with_capacity(datasets.len());
        let mut handles = Vec::with_capacity(datasets.len());
        for dataset in datasets {
            let Some(snapshot) = snapshots.get(&dataset.id) else {
                let outcome = Outcome::failed(
                    dataset.id.as_str(),
                    format!(
                        "no snapshot found at {}",
                        self.snapshot_path(&dataset.id).display()
                    ),
                );
                self.observer.item_finished(Phase::Transform, &outcome);
                results
                    .lock()
                    .unwrap_or_else(|p| p.into_inner())
                    .push(outcome);
                continue;
            };

            let task = TransformTask {
                dataset: dataset.clone(),
                snapshot: snapshot.clone(),
                chain: self.templates.chain_for(dataset.pipeline.as_ref()),
                renderer: Arc::clone(&self.renderer),
                ledger: Arc::clone(&ledger),
                forced: force.includes(&dataset.id),
                temp_dir: self.temp_dir.clone(),
                extensions: Arc::clone(&self.extensions),
                schemas: Arc::clone(&self.schemas),
                retain_failed: self.settings.retain_failed_units,
                cancel: self.cancel.clone(),
                observer: Arc::clone(&self.observer),
            };
            let semaphore = Arc::clone(&semaphore);
            let results = Arc::clone(&results);
            let ready = Arc::clone(&ready);
            let observer = Arc::clone(&self.observer);

            ids.push(dataset.id.to_string());
            handles.push(tokio::spawn(async move {
                let (outcome, unit) = task.run(semaphore).await;
                observer.item_finished(Phase::Transform, &outcome);
                if let Some(unit) = unit {
                    ready.lock().unwrap_or_else(|p| p.into_inner()).push(unit);
                }
                results
                    .lock()
                    .unwrap_or_else(|p| p.into_inner())
                    .push(outcome);
            }));
        }

        let joined = futures::future::join_all(handles).await;
        for (id, result) in ids.into_iter().zip(joined) {
            if let Err(e) = result {
                log::error!("[{}] transform task failed: {}", id, e);
                results
                    .lock()
                    .unwrap_or_else(|p| p.into_inner())
                    .push(Outcome::failed(id, format!("task failed: {}", e)));
            }
        }

        let mut items = take_outcomes(&results);
        items.sort_by(|a, b| a.id.cmp(&b.id));
        let units = std::mem::take(&mut *ready.lock().unwrap_or_else(|p| p.into_inner()));
        let summary = PhaseSummary::new(Phase::Transform, items, started.elapsed());
        log::info!(
            "Transform finished: {} succeeded, {} skipped, {} failed",
            summary.succeeded,
            summary.skipped,
            summary.failed
        );
        self.observer.phase_finished(&summary);
        Ok((summary, units))
    }

    /// Drop the warehouse records of forced datasets for their chain templates
    async fn clear_forced(
        &self,
        datasets: &[DatasetConfig],
        force: &ForceSelection,
    ) -> PipelineResult<()> {
        let pairs: Vec<(String, String)> = datasets
            .iter()
            .filter(|d| force.includes(&d.id))
            .flat_map(|d| {
                self.templates
                    .chain_for(d.pipeline.as_ref())
                    .into_iter()
                    .map(|step| (step.template.id.to_string(), d.id.to_string()))
                    .collect::<Vec<_>>()
            })
            .collect();
        if pairs.is_empty() {
            return Ok(());
        }

        let cleared = self
            .warehouse
            .run(move |conn| -> PipelineResult<usize> {
                let tracker = ExecutionTracker::new(conn);
                let mut cleared = 0;
                for (template_id, dataset_id) in &pairs {
                    if tracker.force_clear(template_id, dataset_id)? {
                        cleared += 1;
                    }
                }
                Ok(cleared)
            })
            .await?;
        log::info!("Cleared {} ledger records of forced datasets", cleared);
        Ok(())
    }
}
