use super::*;
use std::fs;
use tempfile::TempDir;

fn write(dir: &TempDir, rel: &str, content: &str) {
    let path = dir.path().join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn project(dir: &TempDir) -> Project {
    write(dir, "geoflow.yml", "name: test\n");
    write(
        dir,
        "config/datasets.yml",
        r#"
pipelines:
  - id: parks
    datasets:
      - id: a
        plugin: geoparquet
        field_mapping:
          klass: Park
          grupp: $category
datasets:
  - id: b
    plugin: geoparquet
"#,
    );
    write(
        dir,
        "sql/migrations/001_staging_norm_template.sql",
        "-- migrate:up\nSELECT {{ klass_expr }} AS klass, {{ grupp_expr }} AS grupp \
         FROM {{ prev_schema }}.{{ dataset_id }}\n-- migrate:down\nDROP TABLE x\n",
    );
    write(
        dir,
        "sql/migrations/aaa_parks/002_mart_parks_template.sql",
        "CREATE TABLE {{ schema }}.{{ dataset_id }} AS SELECT * FROM {{ prev_schema }}.{{ dataset_id }}",
    );
    write(
        dir,
        "sql/migrations/aaa_parks/001_mart_union_merged.sql",
        "SELECT '{{ pipeline }}' AS pipeline FROM {{ prev_schema }}.x",
    );
    Project::load(dir.path()).unwrap()
}

#[test]
fn test_render_shared_template_for_dataset() {
    let dir = TempDir::new().unwrap();
    let project = project(&dir);
    let sql = render(&project, "shared/001_staging_norm", Some("a")).unwrap();
    assert_eq!(
        sql,
        "SELECT 'Park' AS klass, COALESCE(s.\"category\"::VARCHAR, '') AS grupp FROM raw.a"
    );
}

#[test]
fn test_render_pipeline_template_reads_previous_staging() {
    let dir = TempDir::new().unwrap();
    let project = project(&dir);
    let sql = render(&project, "parks/002_mart_parks", Some("a")).unwrap();
    assert_eq!(sql, "CREATE TABLE mart.a AS SELECT * FROM staging_001.a");
}

#[test]
fn test_render_post_merge_template() {
    let dir = TempDir::new().unwrap();
    let project = project(&dir);
    let sql = render(&project, "parks/merged/001_mart_union", None).unwrap();
    assert_eq!(sql, "SELECT 'parks' AS pipeline FROM mart.x");
}

#[test]
fn test_render_errors() {
    let dir = TempDir::new().unwrap();
    let project = project(&dir);
    assert!(render(&project, "shared/999_nope", Some("a")).is_err());
    assert!(render(&project, "shared/001_staging_norm", None).is_err());
    assert!(render(&project, "shared/001_staging_norm", Some("zzz")).is_err());
    // b has no pipeline, so parks templates are not in its chain
    assert!(render(&project, "parks/002_mart_parks", Some("b")).is_err());
}
