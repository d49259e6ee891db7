use super::*;
use gf_core::{DatasetId, TemplateIndex};
use std::fs;
use tempfile::TempDir;

fn write_parquet(path: &Path, select: &str) {
    let conn = duckdb::Connection::open_in_memory().unwrap();
    conn.execute_batch(&format!(
        "COPY ({}) TO '{}' (FORMAT PARQUET)",
        select,
        path.display()
    ))
    .unwrap();
}

fn write_template(root: &Path, rel: &str, sql: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, sql).unwrap();
}

fn dataset() -> DatasetConfig {
    DatasetConfig::new(DatasetId::new("roads"), "duckdb_query", None)
}

async fn seeded_unit(dir: &TempDir) -> TransformUnit {
    let snapshot = dir.path().join("roads.parquet");
    write_parquet(
        &snapshot,
        "SELECT range AS id, 'POINT (' || range || ' 0)' AS Geometry FROM range(3)",
    );
    let mut unit = TransformUnit::create(
        dataset(),
        &dir.path().join("temp"),
        &[],
        &[],
        CancellationFlag::new(),
    )
    .await
    .unwrap();
    unit.seed(&snapshot).await.unwrap();
    unit
}

fn planned(dir: &TempDir, templates: &[(&str, &str)]) -> Vec<PlannedStep> {
    let root = dir.path().join("migrations");
    for (name, sql) in templates {
        write_template(&root, name, sql);
    }
    let index = TemplateIndex::discover(&root).unwrap();
    let chain = index.chain_for(None);
    plan_chain(&chain, &TemplateRenderer::default(), &dataset(), "digest").unwrap()
}

#[test]
fn test_geometry_rename() {
    let cols = |names: &[&str]| names.iter().map(|s| s.to_string()).collect::<Vec<_>>();
    assert_eq!(geometry_rename(&cols(&["id", "SHAPE"])), Some("SHAPE"));
    assert_eq!(
        geometry_rename(&cols(&["geometri", "geometry"])),
        Some("geometry")
    );
    assert_eq!(geometry_rename(&cols(&["id", "geom", "shape"])), None);
    assert_eq!(geometry_rename(&cols(&["id"])), None);
}

#[test]
fn test_step_checksum_depends_on_snapshot() {
    assert_eq!(step_checksum("SELECT 1", "a"), step_checksum("SELECT 1", "a"));
    assert_ne!(step_checksum("SELECT 1", "a"), step_checksum("SELECT 1", "b"));
    assert_ne!(step_checksum("SELECT 1", "a"), step_checksum("SELECT 2", "a"));
}

#[tokio::test]
async fn test_seed_loads_raw_and_renames_geometry() {
    let dir = TempDir::new().unwrap();
    let unit = seeded_unit(&dir).await;
    assert_eq!(unit.state(), UnitState::Seeded);
    assert_eq!(unit.row_count(), 3);
    assert_eq!(unit.path(), dir.path().join("temp").join("roads.duckdb"));

    let backend = unit.storage.backend().unwrap();
    let columns = backend.table_columns("raw", "roads").await.unwrap();
    assert_eq!(columns, vec!["id".to_string(), "geom".to_string()]);
}

#[tokio::test]
async fn test_apply_chain_records_unit_ledger() {
    let dir = TempDir::new().unwrap();
    let steps = planned(
        &dir,
        &[
            (
                "001_staging_clean_template.sql",
                "CREATE OR REPLACE TABLE {{ schema }}.{{ dataset_id }} AS SELECT * FROM {{ prev_schema }}.{{ dataset_id }}",
            ),
            (
                "002_mart_out_template.sql",
                "CREATE OR REPLACE TABLE {{ schema }}.{{ dataset_id }} AS SELECT s.id, {{ klass_expr }} AS klass FROM {{ prev_schema }}.{{ dataset_id }} s",
            ),
        ],
    );
    let mut unit = seeded_unit(&dir).await;
    unit.apply_chain(&steps).await.unwrap();
    assert_eq!(unit.template_outcomes().len(), 2);
    assert!(unit
        .template_outcomes()
        .iter()
        .all(|o| o.status == OutcomeStatus::Success));

    let backend = unit.storage.backend().unwrap().clone();
    assert!(backend.relation_exists("staging_001", "roads").await.unwrap());
    assert_eq!(
        backend.query_count("SELECT * FROM mart.roads").await.unwrap(),
        3
    );
    let records: Vec<gf_meta::ExecutionRecord> = backend
        .run(|conn| -> PipelineResult<_> { Ok(ExecutionTracker::new(conn).list()?) })
        .await
        .unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].template_id, "shared/001_staging_clean");
    assert_eq!(records[0].checksum, steps[0].checksum);

    unit.close().await.unwrap();
    assert_eq!(unit.state(), UnitState::Ready);
}

#[tokio::test]
async fn test_failing_template_stops_chain() {
    let dir = TempDir::new().unwrap();
    let steps = planned(
        &dir,
        &[
            ("001_staging_bad_template.sql", "SELECT * FROM no_such_table"),
            (
                "002_mart_out_template.sql",
                "CREATE TABLE {{ schema }}.{{ dataset_id }} AS SELECT 1 AS x",
            ),
        ],
    );
    let mut unit = seeded_unit(&dir).await;
    let err = unit.apply_chain(&steps).await.unwrap_err();
    assert!(matches!(err, PipelineError::TransformExecution { ref template, .. } if template == "shared/001_staging_bad"));
    assert_eq!(unit.state(), UnitState::Failed);
    assert_eq!(unit.failed_template(), Some("shared/001_staging_bad"));
    assert_eq!(unit.template_outcomes().len(), 1);

    let backend = unit.storage.backend().unwrap().clone();
    assert!(!backend.relation_exists("mart", "roads").await.unwrap());
    assert!(unit.close().await.is_err());
}

#[tokio::test]
async fn test_cancellation_fails_unit_between_templates() {
    let dir = TempDir::new().unwrap();
    let steps = planned(
        &dir,
        &[(
            "001_staging_a_template.sql",
            "CREATE TABLE {{ schema }}.t AS SELECT 1 AS x",
        )],
    );
    let mut unit = seeded_unit(&dir).await;
    unit.cancel.cancel();
    let err = unit.apply_chain(&steps).await.unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(unit.state(), UnitState::Failed);
}

#[tokio::test]
async fn test_dispose_removes_or_retains_files() {
    let dir = TempDir::new().unwrap();
    let mut unit = seeded_unit(&dir).await;
    unit.close().await.unwrap();
    let path = unit.path().to_path_buf();
    unit.mark_failed();
    unit.dispose(true);
    assert!(path.exists());

    let mut unit = seeded_unit(&dir).await;
    unit.close().await.unwrap();
    unit.mark_merged();
    unit.dispose(true);
    assert!(!path.exists());
}

#[tokio::test]
async fn test_seed_requires_created_state() {
    let dir = TempDir::new().unwrap();
    let mut unit = seeded_unit(&dir).await;
    let snapshot = dir.path().join("roads.parquet");
    assert!(unit.seed(&snapshot).await.is_err());
}

#[test]
fn test_plan_chain_reports_render_errors() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("migrations");
    write_template(&root, "001_staging_a_template.sql", "SELECT {{ nope }}");
    let index = TemplateIndex::discover(&root).unwrap();
    let err = plan_chain(
        &index.chain_for(None),
        &TemplateRenderer::default(),
        &dataset(),
        "d",
    )
    .unwrap_err();
    assert!(matches!(err, PipelineError::TemplateRender { ref template, .. } if template == "shared/001_staging_a"));
}
