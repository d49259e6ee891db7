//! Clean command implementation

use anyhow::Result;
use std::fs;
use std::path::PathBuf;

use crate::cli::{CleanArgs, GlobalArgs};
use crate::commands::common::load_project;

/// Outcome counts of a clean pass
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct CleanReport {
    pub(crate) removed: usize,
    pub(crate) skipped: usize,
    pub(crate) failed: usize,
}

/// Execute the clean command
pub async fn execute(args: &CleanArgs, global: &GlobalArgs) -> Result<()> {
    let project = load_project(global)?;

    // The warehouse is never a clean target
    let mut targets: Vec<PathBuf> = vec![project.temp_dir(), project.target_dir()];
    if args.snapshots {
        targets.push(project.raw_dir());
    }

    if args.dry_run {
        println!("Dry run - would clean the following directories:");
    } else {
        println!("Cleaning project: {}", project.config.name);
    }

    let report = clean_dirs(&targets, args.dry_run, global.verbose > 0);

    println!();
    let noun = if report.removed == 1 { "y" } else { "ies" };
    if args.dry_run {
        println!(
            "Would clean {} director{}, {} not found",
            report.removed, noun, report.skipped
        );
    } else {
        println!(
            "Cleaned {} director{}, {} skipped, {} failed",
            report.removed, noun, report.skipped, report.failed
        );
    }
    Ok(())
}

pub(crate) fn clean_dirs(targets: &[PathBuf], dry_run: bool, verbose: bool) -> CleanReport {
    let mut report = CleanReport::default();
    for target in targets {
        if !target.exists() {
            if verbose {
                println!("  Skipping (not found): {}", target.display());
            }
            report.skipped += 1;
            continue;
        }

        if dry_run {
            println!("  Would remove: {}", target.display());
            report.removed += 1;
            continue;
        }

        match fs::remove_dir_all(target) {
            Ok(()) => {
                println!("  Removed: {}", target.display());
                report.removed += 1;
            }
            Err(e) => {
                log::warn!("Failed to remove {}: {}", target.display(), e);
                eprintln!("  Failed to remove {}: {}", target.display(), e);
                report.failed += 1;
            }
        }
    }
    report
}

#[cfg(test)]
#[path = "clean_test.rs"]
mod tests;
