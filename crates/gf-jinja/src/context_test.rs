use super::*;
use gf_core::config::default_template_defaults;
use gf_core::DatasetId;

fn dataset() -> DatasetConfig {
    let mut ds = DatasetConfig::new(
        DatasetId::new("naturreservat"),
        "wfs",
        Some(PipelineName::new("ext_restr")),
    );
    ds.field_mapping.insert(
        "source_id_column".to_string(),
        FieldValue::ColumnRef("objekt_id".to_string()),
    );
    ds.field_mapping.insert(
        "klass".to_string(),
        FieldValue::Literal("naturreservat".to_string()),
    );
    ds.field_mapping.insert(
        "grupp".to_string(),
        FieldValue::ColumnRef("category".to_string()),
    );
    ds.field_mapping.insert(
        "leverantor".to_string(),
        FieldValue::Literal("it's".to_string()),
    );
    ds.field_mapping.insert(
        "data_1".to_string(),
        FieldValue::ColumnRef("namn".to_string()),
    );
    ds
}

#[test]
fn test_dataset_context_values() {
    let ctx = RenderContext::for_dataset(
        &dataset(),
        "staging_004",
        "raw",
        &default_template_defaults(),
    );
    assert_eq!(ctx.get("dataset_id"), Some("naturreservat"));
    assert_eq!(ctx.get("pipeline"), Some("ext_restr"));
    assert_eq!(ctx.get("schema"), Some("staging_004"));
    assert_eq!(ctx.get("prev_schema"), Some("raw"));

    assert_eq!(ctx.get("klass"), Some("naturreservat"));
    assert_eq!(ctx.get("klass_expr"), Some("'naturreservat'"));
    assert_eq!(ctx.get("grupp"), Some("category"));
    assert_eq!(
        ctx.get("grupp_expr"),
        Some(r#"COALESCE(s."category"::VARCHAR, '')"#)
    );
    assert_eq!(ctx.get("leverantor_expr"), Some("'it''s'"));
    assert_eq!(ctx.get("source_id_expr"), Some(r#"s."objekt_id"::VARCHAR"#));
}

#[test]
fn test_unmapped_slots_default_to_empty_literal() {
    let ctx = RenderContext::for_dataset(
        &dataset(),
        "staging_004",
        "raw",
        &default_template_defaults(),
    );
    assert_eq!(
        ctx.get("data_1_expr"),
        Some(r#"COALESCE(s."namn"::VARCHAR, '')"#)
    );
    assert_eq!(ctx.get("data_2_expr"), Some("''"));
    assert_eq!(ctx.get("data_5_expr"), Some("''"));
    assert_eq!(ctx.get("typ"), Some(""));
    assert_eq!(ctx.get("typ_expr"), Some("''"));
    assert!(ctx.get("data_6_expr").is_none());
}

#[test]
fn test_source_id_expr_without_mapping() {
    let ds = DatasetConfig::new(DatasetId::new("roads"), "geoparquet", None);
    let ctx = RenderContext::for_dataset(&ds, "staging_004", "raw", &BTreeMap::new());
    assert_eq!(ctx.get("source_id_expr"), Some("''"));
    assert_eq!(ctx.get("pipeline"), Some(""));
}

#[test]
fn test_field_mapping_overrides_defaults() {
    let mut ds = dataset();
    ds.field_mapping.insert(
        "h3_center_resolution".to_string(),
        FieldValue::Literal("9".to_string()),
    );
    let ctx = RenderContext::for_dataset(&ds, "mart", "staging", &default_template_defaults());
    assert_eq!(ctx.get("h3_center_resolution"), Some("9"));
    assert_eq!(ctx.get("h3_polyfill_resolution"), Some("11"));
    assert_eq!(ctx.get("geometry_column"), Some("geom"));
}

#[test]
fn test_pipeline_context_has_no_dataset_fields() {
    let pipeline = PipelineName::new("ext_restr");
    let ctx = RenderContext::for_pipeline(
        Some(&pipeline),
        "mart",
        "mart",
        &default_template_defaults(),
    );
    assert_eq!(ctx.get("pipeline"), Some("ext_restr"));
    assert!(ctx.get("dataset_id").is_none());
    assert!(ctx.get("klass").is_none());
    assert_eq!(ctx.get("h3_line_resolution"), Some("12"));
}

#[test]
fn test_iteration_is_ordered() {
    let ctx = RenderContext::for_pipeline(None, "mart", "mart", &BTreeMap::new());
    let keys: Vec<&str> = ctx.iter().map(|(k, _)| k).collect();
    assert_eq!(keys, vec!["pipeline", "prev_schema", "schema"]);
    assert_eq!(ctx.len(), 3);
}
