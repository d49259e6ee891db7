//! Post-merge aggregation against the warehouse.
//!
//! Pipeline-merged templates run pipeline by pipeline, in template directory
//! order (`aaa_` before `aab_`), then global templates. Each template is
//! rendered with the pipeline context only and executed directly against the
//! warehouse. The first failure stops the phase: later aggregates would read
//! stale data.

use crate::cancel::CancellationFlag;
use crate::error::{PipelineError, PipelineResult};
use crate::observer::PhaseObserver;
use crate::summary::{Outcome, Phase};
use gf_core::{compute_checksum, ChainStep, PipelineName, TemplateIndex};
use gf_db::{Database, DuckDbBackend};
use gf_jinja::{TemplateRenderer, WAREHOUSE_DATASET_ID};
use gf_meta::{ExecutionTracker, LedgerSnapshot};
use std::collections::BTreeSet;
use std::time::Instant;

/// Which merged datasets a post-merge template depends on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostMergeScope {
    Pipeline(PipelineName),
    Global,
}

/// One post-merge template with its resolved input schema
#[derive(Debug, Clone)]
pub struct PostMergeStep {
    pub scope: PostMergeScope,
    pub step: ChainStep,
}

impl PostMergeStep {
    pub fn template_id(&self) -> &str {
        self.step.template.id.as_str()
    }

    fn pipeline(&self) -> Option<&PipelineName> {
        match &self.scope {
            PostMergeScope::Pipeline(p) => Some(p),
            PostMergeScope::Global => None,
        }
    }
}

/// Every post-merge step in execution order
pub fn plan_post_merge(index: &TemplateIndex) -> Vec<PostMergeStep> {
    let mut steps = Vec::new();
    for pipeline in index.pipeline_names() {
        steps.extend(
            index
                .merged_chain_for(pipeline)
                .into_iter()
                .map(|step| PostMergeStep {
                    scope: PostMergeScope::Pipeline(pipeline.clone()),
                    step,
                }),
        );
    }
    steps.extend(index.global_chain().into_iter().map(|step| PostMergeStep {
        scope: PostMergeScope::Global,
        step,
    }));
    steps
}

/// What this batch merged, deciding which post-merge templates must run
#[derive(Debug, Clone, Default)]
pub struct PostMergeTrigger {
    pub merged_pipelines: BTreeSet<PipelineName>,
    pub any_merged: bool,
    pub force: bool,
}

impl PostMergeTrigger {
    fn scope_merged(&self, scope: &PostMergeScope) -> bool {
        match scope {
            PostMergeScope::Pipeline(p) => self.merged_pipelines.contains(p),
            PostMergeScope::Global => self.any_merged,
        }
    }
}

/// Runs post-merge templates against the warehouse
pub struct PostMergeAggregator<'a> {
    warehouse: &'a DuckDbBackend,
    renderer: &'a TemplateRenderer,
    cancel: &'a CancellationFlag,
    observer: &'a dyn PhaseObserver,
}

impl<'a> PostMergeAggregator<'a> {
    pub fn new(
        warehouse: &'a DuckDbBackend,
        renderer: &'a TemplateRenderer,
        cancel: &'a CancellationFlag,
        observer: &'a dyn PhaseObserver,
    ) -> Self {
        Self {
            warehouse,
            renderer,
            cancel,
            observer,
        }
    }

    /// Execute the steps in order, one outcome per step.
    ///
    /// A step runs when its scope merged in this batch, when it has no current
    /// ledger record, or when forced. After a failure the remaining steps are
    /// reported as skipped.
    pub async fn run(
        &self,
        steps: &[PostMergeStep],
        trigger: &PostMergeTrigger,
    ) -> PipelineResult<Vec<Outcome>> {
        let snapshot = self
            .warehouse
            .run(|conn| -> PipelineResult<LedgerSnapshot> {
                Ok(ExecutionTracker::new(conn).snapshot()?)
            })
            .await?;

        let mut outcomes = Vec::with_capacity(steps.len());
        let mut halted_by: Option<String> = None;
        for step in steps {
            let id = step.template_id();
            if let Some(failed) = &halted_by {
                outcomes.push(Outcome::skipped(id, format!("not run after {} failed", failed)));
                continue;
            }

            self.observer.item_started(Phase::PostMerge, id);
            let started = Instant::now();
            let outcome = match self.run_step(step, trigger, &snapshot).await {
                Ok(true) => Outcome::success(id),
                Ok(false) => Outcome::skipped(id, "up to date"),
                Err(e) => {
                    log::error!("Post-merge template {} failed: {}", id, e);
                    halted_by = Some(id.to_string());
                    Outcome::failed(id, e)
                }
            }
            .with_duration(started.elapsed());
            self.observer.item_finished(Phase::PostMerge, &outcome);
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    /// Returns whether the step was executed
    async fn run_step(
        &self,
        step: &PostMergeStep,
        trigger: &PostMergeTrigger,
        snapshot: &LedgerSnapshot,
    ) -> PipelineResult<bool> {
        self.cancel.check()?;
        let template_id = step.template_id().to_string();
        let post_merge_error = |message: String| PipelineError::PostMerge {
            template: template_id.clone(),
            message,
        };

        let sql = self
            .renderer
            .render_for_pipeline(&step.step, step.pipeline())
            .map_err(|e| post_merge_error(e.to_string()))?;
        let checksum = compute_checksum(&sql);

        if !trigger.force
            && !trigger.scope_merged(&step.scope)
            && snapshot.is_current(&template_id, WAREHOUSE_DATASET_ID, &checksum)
        {
            log::debug!("Post-merge template {} is up to date", template_id);
            return Ok(false);
        }

        self.warehouse
            .create_schema_if_not_exists(&step.step.template.schema)
            .await
            .map_err(|e| post_merge_error(e.to_string()))?;

        let id = template_id.clone();
        self.warehouse
            .transaction(move |tx| -> PipelineResult<()> {
                tx.execute_batch(&sql)
                    .map_err(|e| PipelineError::PostMerge {
                        template: id.clone(),
                        message: e.to_string(),
                    })?;
                ExecutionTracker::new(tx).record(&id, WAREHOUSE_DATASET_ID, &checksum)?;
                Ok(())
            })
            .await
            .map_err(|e| match e {
                e @ PipelineError::PostMerge { .. } => e,
                other => post_merge_error(other.to_string()),
            })?;
        log::info!("Post-merge template {} applied", template_id);
        Ok(true)
    }
}

#[cfg(test)]
#[path = "post_merge_test.rs"]
mod tests;
