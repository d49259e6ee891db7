//! Progress hooks for front-ends

use crate::summary::{Outcome, Phase, PhaseSummary};

/// Receives phase and item events from the scheduler.
///
/// Called from worker tasks, so implementations must be cheap and thread-safe.
/// Every method has a no-op default.
pub trait PhaseObserver: Send + Sync {
    fn phase_started(&self, _phase: Phase, _total: usize) {}

    fn item_started(&self, _phase: Phase, _id: &str) {}

    /// Free-form progress message from inside a unit of work
    fn progress(&self, _phase: Phase, _id: &str, _message: &str) {}

    fn item_finished(&self, _phase: Phase, _outcome: &Outcome) {}

    fn phase_finished(&self, _summary: &PhaseSummary) {}
}

/// Observer that ignores every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl PhaseObserver for NoopObserver {}
