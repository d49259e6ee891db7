//! Cooperative cancellation shared by the orchestrator and every task

use crate::error::{PipelineError, PipelineResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared flag checked at task boundaries.
///
/// Clones observe the same flag. Once set it stays set for the rest of the run.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag {
    flag: Arc<AtomicBool>,
    parent: Option<Box<CancellationFlag>>,
}

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// A flag scoped to one job: cancelled with its parent, or on its own
    /// without affecting the parent.
    pub fn child(&self) -> Self {
        Self {
            flag: Arc::default(),
            parent: Some(Box::new(self.clone())),
        }
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
            || self.parent.as_ref().is_some_and(|p| p.is_cancelled())
    }

    /// `Err(Cancelled)` once cancellation was requested
    pub fn check(&self) -> PipelineResult<()> {
        if self.is_cancelled() {
            Err(PipelineError::Cancelled)
        } else {
            Ok(())
        }
    }
}
