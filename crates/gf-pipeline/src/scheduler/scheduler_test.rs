use super::*;
use gf_core::Config;
use std::fs;
use tempfile::TempDir;

fn project(dir: &TempDir) -> Project {
    Project {
        root: dir.path().to_path_buf(),
        config: Config::with_name("test"),
        catalog: Default::default(),
        templates: TemplateIndex::default(),
    }
}

fn settings() -> ExecutionSettings {
    ExecutionSettings::for_cores(2)
}

#[test]
fn test_force_selection() {
    let a = DatasetId::new("a");
    let b = DatasetId::new("b");
    assert!(!ForceSelection::None.includes(&a));
    assert!(ForceSelection::All.includes(&a));
    assert!(ForceSelection::All.is_all());

    let some = ForceSelection::Datasets([a.clone()].into_iter().collect());
    assert!(some.includes(&a));
    assert!(!some.includes(&b));
    assert!(!some.is_all());
}

#[test]
fn test_snapshot_paths() {
    let dir = TempDir::new().unwrap();
    let project = project(&dir);
    let scheduler = Scheduler::new(&project, DuckDbBackend::in_memory().unwrap(), settings());
    let a = DatasetId::new("a");
    assert_eq!(
        scheduler.snapshot_path(&a),
        dir.path().join("data/raw/a.parquet")
    );

    fs::create_dir_all(dir.path().join("data/raw")).unwrap();
    fs::write(dir.path().join("data/raw/a.parquet"), b"x").unwrap();
    let datasets = vec![
        DatasetConfig::new(a.clone(), "geoparquet", None),
        DatasetConfig::new(DatasetId::new("b"), "geoparquet", None),
    ];
    let found = scheduler.discover_snapshots(&datasets);
    assert_eq!(found.len(), 1);
    assert!(found.contains_key(&a));
}

#[tokio::test]
async fn test_init_warehouse_creates_schemas_and_ledger() {
    let dir = TempDir::new().unwrap();
    let mut project = project(&dir);
    project.config.database.extensions.clear();
    project.config.database.schemas.push("extra".to_string());
    let scheduler = Scheduler::new(&project, DuckDbBackend::in_memory().unwrap(), settings());

    scheduler.init_warehouse().await.unwrap();
    // idempotent
    scheduler.init_warehouse().await.unwrap();

    let wh = scheduler.warehouse();
    assert!(wh
        .relation_exists("gf_meta", "template_runs")
        .await
        .unwrap());
    wh.execute_batch("CREATE TABLE extra.t AS SELECT 1 AS x; CREATE TABLE raw.t AS SELECT 1 AS x")
        .await
        .unwrap();
}

#[tokio::test]
async fn test_merge_of_nothing_is_not_a_failure() {
    let dir = TempDir::new().unwrap();
    let project = project(&dir);
    let scheduler = Scheduler::new(&project, DuckDbBackend::in_memory().unwrap(), settings());
    let (summary, merged) = scheduler.run_merge(Vec::new()).await;
    assert!(summary.items.is_empty());
    assert!(!summary.is_total_failure());
    assert!(merged.is_empty());
}

#[tokio::test]
async fn test_init_warehouse_refuses_newer_ledger() {
    let dir = TempDir::new().unwrap();
    let mut project = project(&dir);
    project.config.database.extensions.clear();
    let scheduler = Scheduler::new(&project, DuckDbBackend::in_memory().unwrap(), settings());
    scheduler.init_warehouse().await.unwrap();
    scheduler
        .warehouse()
        .execute_batch("INSERT INTO gf_meta.schema_version (version) VALUES (99)")
        .await
        .unwrap();

    let err = scheduler.init_warehouse().await.unwrap_err();
    assert!(err.to_string().contains("M004"), "{}", err);
}
