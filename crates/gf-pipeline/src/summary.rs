//! Phase and run outcome reports.
//!
//! Every unit of work (a dataset in extract/transform/merge, a template in
//! post-merge) produces one [`Outcome`]. Outcomes are gathered per phase into
//! a [`PhaseSummary`], and the phases of one invocation into a [`RunSummary`]
//! that the CLI writes to `run_results.json`.

use serde::Serialize;
use std::fmt;

/// Result of one unit of work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Success,
    Skipped,
    Failed,
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutcomeStatus::Success => write!(f, "success"),
            OutcomeStatus::Skipped => write!(f, "skipped"),
            OutcomeStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Orchestrator phases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Extract,
    Transform,
    Merge,
    PostMerge,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Extract => "extract",
            Phase::Transform => "transform",
            Phase::Merge => "merge",
            Phase::PostMerge => "post_merge",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one template inside a dataset chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TemplateOutcome {
    pub template_id: String,
    pub status: OutcomeStatus,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outcome of one dataset (or post-merge template) in one phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Outcome {
    /// Dataset id, or template id for post-merge outcomes
    pub id: String,
    pub status: OutcomeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows: Option<u64>,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub templates: Vec<TemplateOutcome>,
}

impl Outcome {
    fn new(id: impl Into<String>, status: OutcomeStatus) -> Self {
        Self {
            id: id.into(),
            status,
            rows: None,
            duration_ms: 0,
            message: None,
            error: None,
            templates: Vec::new(),
        }
    }

    pub fn success(id: impl Into<String>) -> Self {
        Self::new(id, OutcomeStatus::Success)
    }

    pub fn skipped(id: impl Into<String>, message: impl Into<String>) -> Self {
        let mut outcome = Self::new(id, OutcomeStatus::Skipped);
        outcome.message = Some(message.into());
        outcome
    }

    pub fn failed(id: impl Into<String>, error: impl fmt::Display) -> Self {
        let mut outcome = Self::new(id, OutcomeStatus::Failed);
        outcome.error = Some(error.to_string());
        outcome
    }

    pub fn with_rows(mut self, rows: u64) -> Self {
        self.rows = Some(rows);
        self
    }

    pub fn with_duration(mut self, duration: std::time::Duration) -> Self {
        self.duration_ms = duration.as_millis() as u64;
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_templates(mut self, templates: Vec<TemplateOutcome>) -> Self {
        self.templates = templates;
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Success
    }

    pub fn is_failed(&self) -> bool {
        self.status == OutcomeStatus::Failed
    }
}

/// Outcomes of one phase with their counts
#[derive(Debug, Clone, Serialize)]
pub struct PhaseSummary {
    pub phase: Phase,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub duration_ms: u64,
    pub items: Vec<Outcome>,
}

impl PhaseSummary {
    pub fn new(phase: Phase, items: Vec<Outcome>, duration: std::time::Duration) -> Self {
        let count = |status| items.iter().filter(|o| o.status == status).count();
        Self {
            phase,
            succeeded: count(OutcomeStatus::Success),
            skipped: count(OutcomeStatus::Skipped),
            failed: count(OutcomeStatus::Failed),
            duration_ms: duration.as_millis() as u64,
            items,
        }
    }

    /// Items that did work, successfully or not
    pub fn attempted(&self) -> usize {
        self.succeeded + self.failed
    }

    /// Work was attempted and nothing succeeded
    pub fn is_total_failure(&self) -> bool {
        self.attempted() > 0 && self.succeeded == 0
    }

    pub fn outcome(&self, id: &str) -> Option<&Outcome> {
        self.items.iter().find(|o| o.id == id)
    }

    /// Ids of successful items in report order
    pub fn succeeded_ids(&self) -> impl Iterator<Item = &str> {
        self.items
            .iter()
            .filter(|o| o.is_success())
            .map(|o| o.id.as_str())
    }

    pub fn failures(&self) -> impl Iterator<Item = &Outcome> {
        self.items.iter().filter(|o| o.is_failed())
    }
}

/// Which phases an invocation runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunMode {
    #[default]
    Full,
    ExtractOnly,
    TransformOnly,
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunMode::Full => write!(f, "full"),
            RunMode::ExtractOnly => write!(f, "extract-only"),
            RunMode::TransformOnly => write!(f, "transform-only"),
        }
    }
}

/// Overall result of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Success,
    Partial,
    Failed,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Success => write!(f, "success"),
            RunStatus::Partial => write!(f, "partial"),
            RunStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Report of one orchestrator invocation
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub mode: RunMode,
    pub started_at: String,
    pub finished_at: String,
    pub duration_ms: u64,
    pub status: RunStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extract: Option<PhaseSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transform: Option<PhaseSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merge: Option<PhaseSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_merge: Option<PhaseSummary>,
    /// Phases not run because an earlier phase failed completely
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped_phases: Vec<Phase>,
}

impl RunSummary {
    /// Phases that ran, in execution order
    pub fn phases(&self) -> impl Iterator<Item = &PhaseSummary> {
        [&self.extract, &self.transform, &self.merge, &self.post_merge]
            .into_iter()
            .flatten()
    }

    pub fn phase(&self, phase: Phase) -> Option<&PhaseSummary> {
        self.phases().find(|p| p.phase == phase)
    }

    /// Derive the run status from the phase summaries.
    ///
    /// Post-merge failures and phases where nothing succeeded fail the run;
    /// any other failure makes it partial.
    pub fn compute_status(&self) -> RunStatus {
        let post_merge_failed = self.post_merge.as_ref().is_some_and(|p| p.failed > 0);
        if post_merge_failed || self.phases().any(PhaseSummary::is_total_failure) {
            RunStatus::Failed
        } else if self.phases().any(|p| p.failed > 0) {
            RunStatus::Partial
        } else {
            RunStatus::Success
        }
    }

    /// Process exit code for this run (0 success, 1 partial, 2 failed)
    pub fn exit_code(&self) -> i32 {
        match self.status {
            RunStatus::Success => 0,
            RunStatus::Partial => 1,
            RunStatus::Failed => 2,
        }
    }

    /// Every failed item with its phase
    pub fn failures(&self) -> Vec<(Phase, &Outcome)> {
        self.phases()
            .flat_map(|p| p.failures().map(move |o| (p.phase, o)))
            .collect()
    }
}

#[cfg(test)]
#[path = "summary_test.rs"]
mod tests;
