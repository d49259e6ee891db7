use super::*;

const GROUPED: &str = r#"
pipelines:
  - id: ext_restr
    name: Extra restrictions
    datasets:
      - id: naturreservat
        name: Naturreservat
        plugin: wfs
        typ: skyddad_natur
        url: https://example.com/wfs
        layer: nr
        field_mapping:
          source_id_column: $objekt_id
          klass: naturreservat
          grupp: $category
          leverantor: "it's"
          h3_center_resolution: 12
          data_mappings:
            data_1: $namn
            data_2: beslutsdatum
      - id: nationalpark
        plugin: wfs
        typ: skyddad_natur
        enabled: false
  - id: avdelning
    datasets:
      - id: vagar
        plugin: geoparquet
        typ: infrastruktur
        path: data/vagar.parquet
"#;

#[test]
fn test_field_value_parse() {
    assert_eq!(FieldValue::parse("$col"), FieldValue::ColumnRef("col".to_string()));
    assert_eq!(FieldValue::parse("plain"), FieldValue::Literal("plain".to_string()));
    // A lone sigil is not a column reference
    assert_eq!(FieldValue::parse("$"), FieldValue::Literal("$".to_string()));
}

#[test]
fn test_field_value_display_restores_sigil() {
    assert_eq!(FieldValue::ColumnRef("c".to_string()).to_string(), "$c");
    assert_eq!(FieldValue::Literal("x".to_string()).to_string(), "x");
}

#[test]
fn test_grouped_layout() {
    let catalog = DatasetCatalog::from_yaml_str(GROUPED).unwrap();
    assert_eq!(catalog.datasets.len(), 3);
    assert_eq!(catalog.pipelines.len(), 2);
    assert_eq!(catalog.pipelines[0].name, "Extra restrictions");
    assert_eq!(catalog.pipelines[0].dataset_count, 2);
    assert_eq!(catalog.pipelines[0].enabled_count, 1);

    let nr = catalog.get("naturreservat").unwrap();
    assert_eq!(nr.pipeline.as_deref(), Some("ext_restr"));
    assert_eq!(nr.display_name(), "Naturreservat");
    assert_eq!(nr.param_str("layer"), Some("nr"));
    assert!(!nr.params.contains_key("field_mapping"));

    let fm = &nr.field_mapping;
    assert_eq!(fm["source_id_column"], FieldValue::ColumnRef("objekt_id".to_string()));
    assert_eq!(fm["klass"], FieldValue::Literal("naturreservat".to_string()));
    assert_eq!(fm["grupp"], FieldValue::ColumnRef("category".to_string()));
    assert_eq!(fm["h3_center_resolution"], FieldValue::Literal("12".to_string()));
    assert_eq!(fm["data_1"], FieldValue::ColumnRef("namn".to_string()));
    assert_eq!(fm["data_2"], FieldValue::ColumnRef("beslutsdatum".to_string()));
    assert!(!fm.contains_key("data_mappings"));
}

#[test]
fn test_flat_layout() {
    let yaml = r#"
datasets:
  - id: roads
    plugin: geoparquet
    pipeline: infra
    path: roads.parquet
  - id: loose
    plugin: duckdb_query
    query: SELECT 1 AS x
"#;
    let catalog = DatasetCatalog::from_yaml_str(yaml).unwrap();
    assert_eq!(catalog.datasets.len(), 2);
    assert!(catalog.pipelines.is_empty());
    assert_eq!(catalog.get("roads").unwrap().pipeline.as_deref(), Some("infra"));
    assert!(catalog.get("loose").unwrap().pipeline.is_none());
}

#[test]
fn test_empty_catalog() {
    let catalog = DatasetCatalog::from_yaml_str("").unwrap();
    assert!(catalog.datasets.is_empty());
}

#[test]
fn test_duplicate_ids_are_rejected() {
    let yaml = r#"
pipelines:
  - id: a
    datasets:
      - id: same
        plugin: wfs
  - id: b
    datasets:
      - id: same
        plugin: wfs
"#;
    let err = DatasetCatalog::from_yaml_str(yaml).unwrap_err();
    assert!(matches!(err, CoreError::DuplicateDataset { .. }));
}

#[test]
fn test_missing_plugin_is_rejected() {
    let err = DatasetCatalog::from_yaml_str("datasets:\n  - id: x\n").unwrap_err();
    assert!(matches!(err, CoreError::DatasetMissingField { .. }));
}

#[test]
fn test_non_scalar_field_mapping_is_rejected() {
    let yaml = "datasets:\n  - id: x\n    plugin: wfs\n    field_mapping:\n      klass: [a, b]\n";
    let err = DatasetCatalog::from_yaml_str(yaml).unwrap_err();
    assert!(matches!(err, CoreError::ConfigInvalid { .. }));
}

#[test]
fn test_invalid_id_is_rejected() {
    let result = DatasetCatalog::from_yaml_str("datasets:\n  - id: \"a b\"\n    plugin: wfs\n");
    assert!(result.is_err());
}

#[test]
fn test_select_skips_disabled() {
    let catalog = DatasetCatalog::from_yaml_str(GROUPED).unwrap();
    let selected = catalog.select(&DatasetSelection::default()).unwrap();
    let ids: Vec<&str> = selected.iter().map(|d| d.id.as_str()).collect();
    assert_eq!(ids, vec!["naturreservat", "vagar"]);
}

#[test]
fn test_select_by_type_and_ids() {
    let catalog = DatasetCatalog::from_yaml_str(GROUPED).unwrap();

    let by_type = catalog
        .select(&DatasetSelection {
            typ: Some("infrastruktur".to_string()),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(by_type.len(), 1);
    assert_eq!(by_type[0].id, "vagar");

    let by_id = catalog
        .select(&DatasetSelection {
            ids: Some(vec!["naturreservat".to_string()]),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(by_id.len(), 1);

    let by_pipeline = catalog
        .select(&DatasetSelection {
            pipeline: Some("avdelning".to_string()),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(by_pipeline.len(), 1);
}

#[test]
fn test_select_unknown_id_fails() {
    let catalog = DatasetCatalog::from_yaml_str(GROUPED).unwrap();
    let err = catalog
        .select(&DatasetSelection {
            ids: Some(vec!["missing".to_string()]),
            ..Default::default()
        })
        .unwrap_err();
    assert!(matches!(err, CoreError::UnknownDataset { .. }));
}

#[test]
fn test_types() {
    let catalog = DatasetCatalog::from_yaml_str(GROUPED).unwrap();
    let types = catalog.types();
    assert_eq!(types.get("skyddad_natur"), Some(&2));
    assert_eq!(types.get("infrastruktur"), Some(&1));
}
