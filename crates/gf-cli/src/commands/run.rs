//! Run command implementation

use anyhow::{bail, Context, Result};
use gf_core::{DatasetConfig, DatasetSelection, ExecutionSettings, Project};
use gf_pipeline::summary::{RunMode, RunSummary};
use gf_pipeline::{
    CancellationFlag, ForceSelection, NoopObserver, PhaseObserver, RunOptions, Scheduler,
};
use std::sync::Arc;

use crate::cli::{GlobalArgs, OutputFormat, RunArgs};
use crate::commands::common::{
    format_duration_ms, load_project, print_json, print_table, write_json_results, ExitCode,
};
use crate::commands::progress::ProgressObserver;

/// Exit status when the run could not complete at all
const RUN_FAILED: i32 = 2;

/// Execute the run command
pub async fn execute(args: &RunArgs, global: &GlobalArgs) -> Result<()> {
    let project = load_project(global)?;
    let datasets = select_datasets(&project, args)?;
    if datasets.is_empty() {
        println!("No datasets selected");
        return Ok(());
    }

    let options = RunOptions {
        mode: run_mode(args),
        force: force_selection(args, &datasets)?,
    };
    let settings = resolve_settings(&project, args);
    log::info!(
        "Running {} datasets ({} mode, extract x{}, transform x{})",
        datasets.len(),
        options.mode,
        settings.extract_concurrency,
        settings.transform_concurrency
    );

    let observer: Arc<dyn PhaseObserver> = if args.quiet || args.output == OutputFormat::Json {
        Arc::new(NoopObserver)
    } else {
        Arc::new(ProgressObserver::new())
    };
    let cancel = CancellationFlag::new();
    let scheduler = Scheduler::open(&project, settings)
        .context("Failed to open warehouse")?
        .with_observer(observer)
        .with_cancellation(cancel.clone());

    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupted, cancelling run");
            eprintln!("Interrupted, finishing in-flight work...");
            cancel.cancel();
        }
    });
    let result = scheduler.run_full(&datasets, &options).await;
    interrupt.abort();

    let summary = match result {
        Ok(summary) => summary,
        Err(e) => {
            log::error!("Run aborted: {}", e);
            eprintln!("Run aborted: {}", e);
            return Err(ExitCode(RUN_FAILED).into());
        }
    };

    let results_path = project.target_dir().join("run_results.json");
    write_json_results(&results_path, &summary)?;

    match args.output {
        OutputFormat::Json => print_json(&summary)?,
        OutputFormat::Text => print_summary(&summary),
    }

    match summary.exit_code() {
        0 => Ok(()),
        code => Err(ExitCode(code).into()),
    }
}

fn run_mode(args: &RunArgs) -> RunMode {
    if args.extract_only {
        RunMode::ExtractOnly
    } else if args.transform_only {
        RunMode::TransformOnly
    } else {
        RunMode::Full
    }
}

fn select_datasets(project: &Project, args: &RunArgs) -> Result<Vec<DatasetConfig>> {
    let selection = DatasetSelection {
        ids: (!args.datasets.is_empty()).then(|| args.datasets.clone()),
        typ: args.typ.clone(),
        pipeline: args.pipeline.clone(),
    };
    project
        .catalog
        .select(&selection)
        .context("Invalid dataset selection")
}

/// `--force` forces everything; `--force-datasets` must name selected datasets
fn force_selection(args: &RunArgs, datasets: &[DatasetConfig]) -> Result<ForceSelection> {
    if args.force {
        return Ok(ForceSelection::All);
    }
    if args.force_datasets.is_empty() {
        return Ok(ForceSelection::None);
    }
    let mut forced = std::collections::BTreeSet::new();
    for id in &args.force_datasets {
        let Some(dataset) = datasets.iter().find(|d| d.id == id.as_str()) else {
            bail!("--force-datasets names '{}', which is not selected for this run", id);
        };
        forced.insert(dataset.id.clone());
    }
    Ok(ForceSelection::Datasets(forced))
}

/// geoflow.yml settings with CLI overrides applied
fn resolve_settings(project: &Project, args: &RunArgs) -> ExecutionSettings {
    let mut settings = project.config.execution.resolve();
    if let Some(n) = args.extract_concurrency {
        settings.extract_concurrency = n.max(1);
    }
    if let Some(n) = args.transform_concurrency {
        settings.transform_concurrency = n.max(1);
    }
    settings
}

fn print_summary(summary: &RunSummary) {
    println!();
    let rows: Vec<Vec<String>> = summary
        .phases()
        .map(|p| {
            vec![
                p.phase.to_string(),
                p.succeeded.to_string(),
                p.skipped.to_string(),
                p.failed.to_string(),
                format_duration_ms(p.duration_ms),
            ]
        })
        .collect();
    print_table(&["PHASE", "SUCCEEDED", "SKIPPED", "FAILED", "DURATION"], &rows);

    let failures = summary.failures();
    if !failures.is_empty() {
        println!();
        println!("Failures:");
        for (phase, outcome) in failures {
            println!(
                "  {} {}: {}",
                phase,
                outcome.id,
                outcome.error.as_deref().unwrap_or("unknown error")
            );
        }
    }
    for phase in &summary.skipped_phases {
        println!("Skipped {} (previous phase had no successes)", phase);
    }

    println!();
    println!(
        "Run {} finished: {} in {}",
        summary.run_id,
        summary.status,
        format_duration_ms(summary.duration_ms)
    );
}

#[cfg(test)]
#[path = "run_test.rs"]
mod tests;
