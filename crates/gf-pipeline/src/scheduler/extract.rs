//! Extract phase: one connector task per dataset

use super::{take_outcomes, Scheduler};
use crate::cancel::CancellationFlag;
use crate::connector::{ConnectorRegistry, ExtractContext, LogSink, ProgressSink, SnapshotResult};
use crate::error::{PipelineError, PipelineResult};
use crate::observer::PhaseObserver;
use crate::summary::{Outcome, Phase, PhaseSummary};
use gf_core::DatasetConfig;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

const DEADLINE_MESSAGE: &str = "extract batch deadline reached before the dataset started";

/// Everything one extract task owns
struct ExtractTask {
    dataset: DatasetConfig,
    registry: Arc<ConnectorRegistry>,
    snapshot_path: PathBuf,
    project_root: PathBuf,
    timeout: Duration,
    deadline: Option<tokio::time::Instant>,
    cancel: CancellationFlag,
    observer: Arc<dyn PhaseObserver>,
}

impl ExtractTask {
    async fn run(self, semaphore: Arc<Semaphore>) -> Outcome {
        let id = self.dataset.id.to_string();

        let acquired = match self.deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, semaphore.acquire()).await,
            None => Ok(semaphore.acquire().await),
        };
        let _permit = match acquired {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Outcome::failed(id, PipelineError::Cancelled),
            Err(_) => return Outcome::failed(id, DEADLINE_MESSAGE),
        };
        if self
            .deadline
            .is_some_and(|d| tokio::time::Instant::now() >= d)
        {
            return Outcome::failed(id, DEADLINE_MESSAGE);
        }
        if let Err(e) = self.cancel.check() {
            return Outcome::failed(id, e);
        }

        self.observer.item_started(Phase::Extract, &id);
        let started = Instant::now();
        match self.extract().await {
            Ok(result) => {
                log::info!("[{}] extracted {} rows", id, result.row_count);
                let outcome = Outcome::success(&id).with_rows(result.row_count);
                match result.message {
                    Some(message) => outcome.with_message(message),
                    None => outcome,
                }
            }
            Err(e) => {
                log::warn!("[{}] extract failed: {}", id, e);
                Outcome::failed(&id, e)
            }
        }
        .with_duration(started.elapsed())
    }

    async fn extract(&self) -> PipelineResult<SnapshotResult> {
        let connector = self.registry.get(&self.dataset.plugin)?;
        // Cancelled on timeout so work left on the blocking pool discards its output
        let job = self.cancel.child();
        let ctx = ExtractContext {
            dataset: self.dataset.clone(),
            snapshot_path: self.snapshot_path.clone(),
            project_root: self.project_root.clone(),
            log: LogSink::new(self.dataset.id.clone()),
            progress: ProgressSink::new(self.dataset.id.clone(), Arc::clone(&self.observer)),
            cancel: job.clone(),
        };
        match tokio::time::timeout(self.timeout, connector.extract(&ctx)).await {
            Ok(result) => Ok(result?),
            Err(_) => {
                job.cancel();
                Err(PipelineError::Timeout {
                    millis: self.timeout.as_millis() as u64,
                })
            }
        }
    }
}

impl Scheduler {
    /// Extract every dataset into `<raw_dir>/<id>.parquet`.
    ///
    /// At most `extract_concurrency` connectors run at once. Each connector
    /// call is bounded by `extract_timeout`; once `extract_batch_timeout`
    /// elapses no further dataset is started.
    pub async fn run_extract(&self, datasets: &[DatasetConfig]) -> PhaseSummary {
        let started = Instant::now();
        self.observer.phase_started(Phase::Extract, datasets.len());
        log::info!(
            "Extracting {} datasets ({} concurrent)",
            datasets.len(),
            self.settings.extract_concurrency
        );

        let semaphore = Arc::new(Semaphore::new(self.settings.extract_concurrency));
        let results = Arc::new(Mutex::new(Vec::with_capacity(datasets.len())));
        let deadline = self
            .settings
            .extract_batch_timeout
            .map(|d| tokio::time::Instant::now() + d);

        let mut ids = Vec::with_capacity(datasets.len());
        let mut handles = Vec::with_capacity(datasets.len());
        for dataset in datasets {
            let task = ExtractTask {
                dataset: dataset.clone(),
                registry: Arc::clone(&self.registry),
                snapshot_path: self.snapshot_path(&dataset.id),
                project_root: self.project_root.clone(),
                timeout: self.settings.extract_timeout,
                deadline,
                cancel: self.cancel.clone(),
                observer: Arc::clone(&self.observer),
            };
            let semaphore = Arc::clone(&semaphore);
            let results = Arc::clone(&results);
            let observer = Arc::clone(&self.observer);

            ids.push(dataset.id.to_string());
            handles.push(tokio::spawn(async move {
                let outcome = task.run(semaphore).await;
                observer.item_finished(Phase::Extract, &outcome);
                results
                    .lock()
                    .unwrap_or_else(|p| p.into_inner())
                    .push(outcome);
            }));
        }

        let joined = futures::future::join_all(handles).await;
        for (id, result) in ids.into_iter().zip(joined) {
            if let Err(e) = result {
                log::error!("[{}] extract task failed: {}", id, e);
                results
                    .lock()
                    .unwrap_or_else(|p| p.into_inner())
                    .push(Outcome::failed(id, format!("task failed: {}", e)));
            }
        }

        let mut items = take_outcomes(&results);
        items.sort_by(|a, b| a.id.cmp(&b.id));
        let summary = PhaseSummary::new(Phase::Extract, items, started.elapsed());
        log::info!(
            "Extract finished: {} succeeded, {} failed",
            summary.succeeded,
            summary.failed
        );
        self.observer.phase_finished(&summary);
        summary
    }
}
