use super::*;
use tempfile::TempDir;

#[test]
fn test_parse_minimal_config() {
    let config: Config = serde_yaml::from_str("name: test_project").unwrap();
    assert_eq!(config.name, "test_project");
    assert_eq!(config.sql_dir, "sql");
    assert_eq!(config.raw_dir, "data/raw");
    assert_eq!(config.database.path, "data/warehouse.duckdb");
    assert_eq!(config.database.schemas, vec!["raw", "mart"]);
    assert!(config.execution.retain_failed_units);

    let root = PathBuf::from("/tmp/proj");
    assert_eq!(
        config.migrations_dir_absolute(&root),
        root.join("sql").join("migrations")
    );
    assert_eq!(config.temp_dir_absolute(&root), root.join("data/temp"));
}

#[test]
fn test_parse_full_config() {
    let yaml = r#"
name: g_etl
sql_dir: sql
raw_dir: /data/raw
datasets: config/datasets.yml
database:
  path: ":memory:"
  extensions: [spatial]
  schemas: [raw, mart, export]
execution:
  extract_concurrency: 8
  transform_concurrency: 3
  extract_timeout_secs: 60
  extract_batch_timeout_secs: 900
  retain_failed_units: false
template_defaults:
  h3_center_resolution: 10
"#;
    let config: Config = serde_yaml::from_str(yaml).unwrap();
    let root = PathBuf::from("/tmp/proj");
    assert_eq!(config.raw_dir_absolute(&root), PathBuf::from("/data/raw"));
    assert_eq!(config.warehouse_path_absolute(&root), PathBuf::from(":memory:"));
    assert_eq!(config.database.extensions, vec!["spatial"]);

    let settings = config.execution.resolve();
    assert_eq!(settings.extract_concurrency, 8);
    assert_eq!(settings.transform_concurrency, 3);
    assert_eq!(settings.extract_timeout, Duration::from_secs(60));
    assert_eq!(settings.extract_batch_timeout, Some(Duration::from_secs(900)));
    assert!(!settings.retain_failed_units);
}

#[test]
fn test_unknown_field_is_rejected() {
    let result: Result<Config, _> = serde_yaml::from_str("name: x\nmodel_paths: [a]");
    assert!(result.is_err());
}

#[test]
fn test_execution_defaults_from_cores() {
    let s = ExecutionSettings::for_cores(8);
    assert_eq!(s.extract_concurrency, 8);
    assert_eq!(s.transform_concurrency, 4);
    assert_eq!(s.extract_timeout, Duration::from_secs(300));
    assert!(s.retain_failed_units);

    // a single core cannot be split
    let s = ExecutionSettings::for_cores(1);
    assert_eq!(s.extract_concurrency, 1);
    assert_eq!(s.transform_concurrency, 1);
}

#[test]
fn test_transform_narrower_than_extract() {
    for cores in 2..=16 {
        let s = ExecutionSettings::for_cores(cores);
        assert!(
            s.transform_concurrency < s.extract_concurrency,
            "{} cores: transform {} >= extract {}",
            cores,
            s.transform_concurrency,
            s.extract_concurrency
        );
    }
    assert_eq!(ExecutionSettings::for_cores(2).transform_concurrency, 1);
    assert_eq!(ExecutionSettings::for_cores(3).transform_concurrency, 2);
    assert_eq!(ExecutionSettings::for_cores(4).transform_concurrency, 2);
}

#[test]
fn test_load_fills_template_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("geoflow.yml");
    std::fs::write(
        &path,
        "name: demo\ntemplate_defaults:\n  h3_center_resolution: 9\n  geometry_column: $the_geom\n",
    )
    .unwrap();

    let config = Config::load(&path).unwrap();
    let defaults = &config.template_defaults;
    assert_eq!(
        defaults.get("h3_center_resolution"),
        Some(&FieldValue::Literal("9".to_string()))
    );
    assert_eq!(
        defaults.get("geometry_column"),
        Some(&FieldValue::ColumnRef("the_geom".to_string()))
    );
    assert_eq!(
        defaults.get("h3_polyfill_resolution"),
        Some(&FieldValue::Literal("11".to_string()))
    );
}

#[test]
fn test_load_from_dir_accepts_yaml_extension() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("geoflow.yaml"), "name: demo").unwrap();
    assert_eq!(Config::load_from_dir(dir.path()).unwrap().name, "demo");
}

#[test]
fn test_load_missing_config() {
    let dir = TempDir::new().unwrap();
    let err = Config::load_from_dir(dir.path()).unwrap_err();
    assert!(matches!(err, CoreError::ConfigNotFound { .. }));
}

#[test]
fn test_validation_rejects_zero_concurrency() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("geoflow.yml");
    std::fs::write(&path, "name: demo\nexecution:\n  transform_concurrency: 0\n").unwrap();
    let err = Config::load(&path).unwrap_err();
    assert!(matches!(err, CoreError::ConfigInvalid { .. }));
}

#[test]
fn test_validation_rejects_bad_schema_name() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("geoflow.yml");
    std::fs::write(&path, "name: demo\ndatabase:\n  schemas: [\"raw; drop\"]\n").unwrap();
    let err = Config::load(&path).unwrap_err();
    assert!(matches!(err, CoreError::ConfigInvalid { .. }));
}

#[test]
fn test_parse_error_is_reported() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("geoflow.yml");
    std::fs::write(&path, "name: [unclosed").unwrap();
    let err = Config::load(&path).unwrap_err();
    assert!(matches!(err, CoreError::ConfigParseError { .. }));
}
