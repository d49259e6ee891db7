//! Terminal progress for `gf run`

use gf_pipeline::summary::{Outcome, Phase, PhaseSummary};
use gf_pipeline::PhaseObserver;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Mutex;

use super::common::format_duration_ms;

/// One progress bar per phase, failures printed above the bar
#[derive(Default)]
pub(crate) struct ProgressObserver {
    bar: Mutex<Option<ProgressBar>>,
}

impl ProgressObserver {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn with_bar(&self, f: impl FnOnce(&ProgressBar)) {
        let guard = self.bar.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(bar) = guard.as_ref() {
            f(bar);
        }
    }
}

impl PhaseObserver for ProgressObserver {
    fn phase_started(&self, phase: Phase, total: usize) {
        let bar = ProgressBar::new(total as u64);
        bar.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} {prefix:>10} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({msg})",
                )
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        bar.set_prefix(phase.as_str());
        *self.bar.lock().unwrap_or_else(|p| p.into_inner()) = Some(bar);
    }

    fn item_started(&self, _phase: Phase, id: &str) {
        self.with_bar(|bar| bar.set_message(id.to_string()));
    }

    fn progress(&self, _phase: Phase, id: &str, message: &str) {
        self.with_bar(|bar| bar.set_message(format!("{}: {}", id, message)));
    }

    fn item_finished(&self, phase: Phase, outcome: &Outcome) {
        self.with_bar(|bar| {
            if outcome.is_failed() {
                bar.println(format!(
                    "  [FAIL] {} {}: {}",
                    phase,
                    outcome.id,
                    outcome.error.as_deref().unwrap_or("unknown error")
                ));
            }
            bar.inc(1);
        });
    }

    fn phase_finished(&self, summary: &PhaseSummary) {
        if let Some(bar) = self.bar.lock().unwrap_or_else(|p| p.into_inner()).take() {
            bar.finish_and_clear();
        }
        eprintln!(
            "{:>10}: {} succeeded, {} skipped, {} failed in {}",
            summary.phase.as_str(),
            summary.succeeded,
            summary.skipped,
            summary.failed,
            format_duration_ms(summary.duration_ms)
        );
    }
}
