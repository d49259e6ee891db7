use super::*;
use std::fs;
use tempfile::TempDir;

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

fn sample_tree() -> TempDir {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write(root, "004_staging_transform_template.sql", "SELECT 4");
    write(root, "005_staging2_normalisering_template.sql", "SELECT 5");
    write(root, "001_init.sql", "CREATE SCHEMA x");
    write(root, "aab_ext_restr/001_staging_normalisering_template.sql", "SELECT 1");
    write(root, "aab_ext_restr/002_staging_h3_template.sql", "SELECT 2");
    write(root, "aab_ext_restr/003_mart_h3_cells_template.sql", "SELECT 3");
    write(root, "aab_ext_restr/004_mart_union_merged.sql", "SELECT 4");
    write(root, "aaa_avdelning/001_staging_x_template.sql", "SELECT 1");
    write(root, "_global/x01_h3_union.sql", "SELECT 'g1'");
    write(root, "_global/x02_summary.sql", "SELECT 'g2'");
    dir
}

#[test]
fn test_prefix_parsing() {
    assert_eq!(
        TemplatePrefix::from_stem("004_staging_transform").unwrap().as_str(),
        "004"
    );
    assert_eq!(TemplatePrefix::from_stem("x01_h3").unwrap().as_str(), "x01");
    assert!(TemplatePrefix::from_stem("staging_transform").is_none());
    assert!(TemplatePrefix::from_stem("004").is_none());
}

#[test]
fn test_prefix_ordering() {
    let p = |s: &str| TemplatePrefix(s.to_string());
    assert!(p("2") < p("10"));
    assert!(p("009") < p("010"));
    assert!(p("999") < p("x01"));
    assert!(p("x01") < p("x02"));
}

#[test]
fn test_extract_up_section() {
    let content = "-- migrate:up\nCREATE TABLE a AS SELECT 1;\n-- migrate:down\nDROP TABLE a;";
    assert_eq!(extract_up_section(content), "CREATE TABLE a AS SELECT 1;");
    assert_eq!(extract_up_section("  SELECT 1  "), "SELECT 1");
}

#[test]
fn test_schema_name() {
    let prefix = TemplatePrefix("004".to_string());
    assert_eq!(
        schema_name("004_staging_transform_template", &prefix, None),
        "staging_004"
    );
    let prefix = TemplatePrefix("001".to_string());
    let p = PipelineName::new("ext_restr");
    assert_eq!(
        schema_name("001_staging_norm_template", &prefix, Some(&p)),
        "staging_ext_restr_001"
    );
    assert_eq!(schema_name("003_mart_h3_template", &prefix, Some(&p)), "mart");
    assert_eq!(schema_name("005_cleanup_template", &prefix, None), "staging");
}

#[test]
fn test_pipeline_name_for_dir() {
    assert_eq!(pipeline_name_for_dir("aab_ext_restr"), "ext_restr");
    assert_eq!(pipeline_name_for_dir("aaa_avdelning"), "avdelning");
    assert_eq!(pipeline_name_for_dir("roads"), "roads");
    assert_eq!(pipeline_name_for_dir("a1b_roads"), "a1b_roads");
}

#[test]
fn test_discover_classifies_templates() {
    let dir = sample_tree();
    let index = TemplateIndex::discover(dir.path()).unwrap();

    let shared: Vec<&str> = index.shared().iter().map(|t| t.id.as_str()).collect();
    assert_eq!(
        shared,
        vec!["shared/004_staging_transform", "shared/005_staging2_normalisering"]
    );

    let names: Vec<&str> = index.pipeline_names().map(|p| p.as_str()).collect();
    assert_eq!(names, vec!["avdelning", "ext_restr"]);

    let ext = index.pipeline("ext_restr").unwrap();
    assert_eq!(ext.dir_name, "aab_ext_restr");
    assert_eq!(ext.templates.len(), 3);
    assert_eq!(ext.merged.len(), 1);
    assert_eq!(ext.merged[0].id.as_str(), "ext_restr/merged/004_mart_union");
    assert_eq!(ext.merged[0].kind, TemplateKind::PipelineMerged);

    let global: Vec<&str> = index.global().iter().map(|t| t.id.as_str()).collect();
    assert_eq!(global, vec!["global/x01_h3_union", "global/x02_summary"]);

    // 2 shared + 3 + 1 in ext_restr + 1 in avdelning + 2 global
    assert_eq!(index.len(), 9);
    assert!(index.get("global/x02_summary").is_some());
}

#[test]
fn test_chain_for_pipeline_links_schemas() {
    let dir = sample_tree();
    let index = TemplateIndex::discover(dir.path()).unwrap();
    let pipeline = PipelineName::new("ext_restr");
    let chain = index.chain_for(Some(&pipeline));

    let steps: Vec<(&str, &str, &str)> = chain
        .iter()
        .map(|s| (s.template.name.as_str(), s.template.schema.as_str(), s.prev_schema.as_str()))
        .collect();
    assert_eq!(
        steps,
        vec![
            ("004_staging_transform", "staging_004", "raw"),
            ("005_staging2_normalisering", "staging", "staging_004"),
            ("001_staging_normalisering", "staging_ext_restr_001", "staging"),
            ("002_staging_h3", "staging_ext_restr_002", "staging_ext_restr_001"),
            ("003_mart_h3_cells", "mart", "staging_ext_restr_002"),
        ]
    );
}

#[test]
fn test_chain_for_unknown_pipeline_is_shared_only() {
    let dir = sample_tree();
    let index = TemplateIndex::discover(dir.path()).unwrap();
    let chain = index.chain_for(Some(&PipelineName::new("nope")));
    assert_eq!(chain.len(), 2);
    assert!(chain.iter().all(|s| s.template.kind == TemplateKind::Shared));
}

#[test]
fn test_post_merge_chains_start_from_mart() {
    let dir = sample_tree();
    let index = TemplateIndex::discover(dir.path()).unwrap();
    let merged = index.merged_chain_for(&PipelineName::new("ext_restr"));
    assert_eq!(merged.len(), 1);
    assert_eq!(merged[0].prev_schema, "mart");
    assert_eq!(index.global_chain()[0].prev_schema, "mart");
}

#[test]
fn test_root_merged_template_is_rejected() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "010_mart_union_merged.sql", "SELECT 1");
    let err = TemplateIndex::discover(dir.path()).unwrap_err();
    assert!(matches!(err, CoreError::RootMergedTemplate { .. }));
}

#[test]
fn test_duplicate_prefix_is_rejected() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "004_staging_a_template.sql", "SELECT 1");
    write(dir.path(), "004_staging_b_template.sql", "SELECT 2");
    let err = TemplateIndex::discover(dir.path()).unwrap_err();
    assert!(matches!(err, CoreError::DuplicateTemplatePrefix { .. }));
}

#[test]
fn test_duplicate_pipeline_dirs_are_rejected() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "aaa_roads/001_staging_a_template.sql", "SELECT 1");
    write(dir.path(), "aab_roads/001_staging_a_template.sql", "SELECT 1");
    let err = TemplateIndex::discover(dir.path()).unwrap_err();
    assert!(matches!(err, CoreError::DuplicatePipelineDir { .. }));
}

#[test]
fn test_missing_prefix_is_rejected() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "staging_transform_template.sql", "SELECT 1");
    let err = TemplateIndex::discover(dir.path()).unwrap_err();
    assert!(matches!(err, CoreError::TemplateMissingPrefix { .. }));
}

#[test]
fn test_missing_directory_gives_empty_index() {
    let dir = TempDir::new().unwrap();
    let index = TemplateIndex::discover(&dir.path().join("missing")).unwrap();
    assert!(index.is_empty());
}

#[test]
fn test_template_body_uses_up_section() {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "004_staging_a_template.sql",
        "-- migrate:up\nSELECT {{ dataset_id }};\n-- migrate:down\nSELECT 0;",
    );
    let index = TemplateIndex::discover(dir.path()).unwrap();
    assert_eq!(index.shared()[0].sql, "SELECT {{ dataset_id }};");
}

#[test]
fn test_pipelines_keep_directory_order() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write(root, "aaa_zeta/001_mart_z_merged.sql", "SELECT 1");
    write(root, "aab_alpha/001_mart_a_merged.sql", "SELECT 2");
    let index = TemplateIndex::discover(root).unwrap();

    let names: Vec<&str> = index.pipeline_names().map(|p| p.as_str()).collect();
    assert_eq!(names, vec!["zeta", "alpha"]);
    let ids: Vec<String> = index.all().iter().map(|t| t.id.to_string()).collect();
    assert_eq!(ids, vec!["zeta/merged/001_mart_z", "alpha/merged/001_mart_a"]);
    assert!(index.pipeline("alpha").is_some());
}
