use super::*;
use std::fs;
use tempfile::TempDir;

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

#[test]
fn test_load_project() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "geoflow.yml", "name: demo\n");
    write(
        dir.path(),
        "config/datasets.yml",
        r#"
pipelines:
  - id: ext_restr
    datasets:
      - id: naturreservat
        plugin: geoparquet
        path: data/nr.parquet
"#,
    );
    write(
        dir.path(),
        "sql/migrations/004_staging_transform_template.sql",
        "SELECT 1",
    );

    let project = Project::load(dir.path()).unwrap();
    assert_eq!(project.config.name, "demo");
    assert_eq!(project.catalog.datasets.len(), 1);
    assert_eq!(project.templates.shared().len(), 1);
    assert_eq!(project.raw_dir(), dir.path().join("data/raw"));
    assert_eq!(
        project.warehouse_path(),
        dir.path().join("data/warehouse.duckdb")
    );
}

#[test]
fn test_missing_project_dir() {
    let dir = TempDir::new().unwrap();
    let err = Project::load(&dir.path().join("nope")).unwrap_err();
    assert!(matches!(err, CoreError::ProjectNotFound { .. }));
}

#[test]
fn test_missing_catalog_is_an_error() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "geoflow.yml", "name: demo\n");
    let err = Project::load(dir.path()).unwrap_err();
    assert!(matches!(err, CoreError::DatasetsNotFound { .. }));
}
