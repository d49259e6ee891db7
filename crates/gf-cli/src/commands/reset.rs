//! Reset command implementation

use anyhow::Result;
use gf_db::Database;
use gf_meta::{ExecutionTracker, META_SCHEMA};

use crate::cli::{GlobalArgs, ResetArgs};
use crate::commands::common::load_project;
use crate::commands::status::open_existing_warehouse;

/// Execute the reset command
pub async fn execute(args: &ResetArgs, global: &GlobalArgs) -> Result<()> {
    let project = load_project(global)?;
    let Some(warehouse) = open_existing_warehouse(&project)? else {
        println!("No warehouse yet; nothing to reset");
        return Ok(());
    };
    if !warehouse.relation_exists(META_SCHEMA, "template_runs").await? {
        println!("Ledger is empty; nothing to reset");
        return Ok(());
    }

    let dataset = args.dataset.clone();
    let template = args.template.clone();
    let removed = warehouse
        .run(move |conn| -> Result<usize> {
            let tracker = ExecutionTracker::new(conn);
            let removed = match (&template, &dataset) {
                (Some(t), Some(d)) => usize::from(tracker.force_clear(t, d)?),
                (None, Some(d)) => tracker.clear_dataset(d)?,
                (Some(t), None) => tracker.clear_template(t)?,
                (None, None) => 0,
            };
            Ok(removed)
        })
        .await?;

    log::info!("Removed {} ledger records", removed);
    println!(
        "Removed {} ledger record{}",
        removed,
        if removed == 1 { "" } else { "s" }
    );
    Ok(())
}
