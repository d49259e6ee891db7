use super::*;
use gf_core::{Config, DatasetId, TemplateIndex};
use std::path::PathBuf;

fn project() -> Project {
    let mut config = Config::with_name("test");
    config.execution.extract_concurrency = Some(6);
    config.execution.transform_concurrency = Some(3);
    Project {
        root: PathBuf::from("/tmp/geoflow-test"),
        config,
        catalog: Default::default(),
        templates: TemplateIndex::default(),
    }
}

fn datasets() -> Vec<DatasetConfig> {
    vec![
        DatasetConfig::new(DatasetId::new("a"), "geoparquet", None),
        DatasetConfig::new(DatasetId::new("b"), "geoparquet", None),
    ]
}

#[test]
fn test_run_mode() {
    assert_eq!(run_mode(&RunArgs::default()), RunMode::Full);
    let args = RunArgs {
        extract_only: true,
        ..Default::default()
    };
    assert_eq!(run_mode(&args), RunMode::ExtractOnly);
    let args = RunArgs {
        transform_only: true,
        ..Default::default()
    };
    assert_eq!(run_mode(&args), RunMode::TransformOnly);
}

#[test]
fn test_force_selection() {
    let datasets = datasets();
    assert_eq!(
        force_selection(&RunArgs::default(), &datasets).unwrap(),
        ForceSelection::None
    );

    let all = RunArgs {
        force: true,
        ..Default::default()
    };
    assert_eq!(force_selection(&all, &datasets).unwrap(), ForceSelection::All);

    let some = RunArgs {
        force_datasets: vec!["b".to_string()],
        ..Default::default()
    };
    let ForceSelection::Datasets(ids) = force_selection(&some, &datasets).unwrap() else {
        panic!("expected a dataset selection");
    };
    assert_eq!(ids.len(), 1);
    assert!(ids.contains(&DatasetId::new("b")));

    let unknown = RunArgs {
        force_datasets: vec!["zzz".to_string()],
        ..Default::default()
    };
    assert!(force_selection(&unknown, &datasets).is_err());
}

#[test]
fn test_cli_overrides_settings() {
    let project = project();
    let settings = resolve_settings(&project, &RunArgs::default());
    assert_eq!(settings.extract_concurrency, 6);
    assert_eq!(settings.transform_concurrency, 3);

    let args = RunArgs {
        transform_concurrency: Some(0),
        extract_concurrency: Some(12),
        ..Default::default()
    };
    let settings = resolve_settings(&project, &args);
    assert_eq!(settings.extract_concurrency, 12);
    assert_eq!(settings.transform_concurrency, 1);
}
