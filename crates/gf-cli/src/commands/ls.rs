//! List command implementation

use anyhow::Result;
use gf_core::Project;
use serde::Serialize;

use crate::cli::{GlobalArgs, LsArgs, LsResource, OutputFormat};
use crate::commands::common::{load_project, print_json, print_table};

/// Pipeline row: catalog metadata joined with the template index
#[derive(Debug, Serialize)]
struct PipelineRow {
    id: String,
    name: String,
    datasets: usize,
    enabled: usize,
    templates: usize,
    merged_templates: usize,
}

/// Execute the ls command
pub async fn execute(args: &LsArgs, global: &GlobalArgs) -> Result<()> {
    let project = load_project(global)?;
    match args.resource {
        LsResource::Datasets => list_datasets(&project, args.output),
        LsResource::Pipelines => list_pipelines(&project, args.output),
        LsResource::Templates => list_templates(&project, args.output),
        LsResource::Types => list_types(&project, args.output),
    }
}

fn list_datasets(project: &Project, output: OutputFormat) -> Result<()> {
    let datasets = &project.catalog.datasets;
    if output == OutputFormat::Json {
        return print_json(datasets);
    }
    let rows: Vec<Vec<String>> = datasets
        .iter()
        .map(|d| {
            vec![
                d.id.to_string(),
                d.pipeline.as_deref().unwrap_or("-").to_string(),
                d.plugin.clone(),
                d.typ.clone().unwrap_or_default(),
                if d.enabled { "yes" } else { "no" }.to_string(),
            ]
        })
        .collect();
    print_table(&["ID", "PIPELINE", "PLUGIN", "TYPE", "ENABLED"], &rows);
    println!("\n{} datasets", datasets.len());
    Ok(())
}

fn pipeline_rows(project: &Project) -> Vec<PipelineRow> {
    let mut rows: Vec<PipelineRow> = project
        .catalog
        .pipelines
        .iter()
        .map(|p| {
            let group = project.templates.pipeline(p.id.as_str());
            PipelineRow {
                id: p.id.to_string(),
                name: p.name.clone(),
                datasets: p.dataset_count,
                enabled: p.enabled_count,
                templates: group.map_or(0, |g| g.templates.len()),
                merged_templates: group.map_or(0, |g| g.merged.len()),
            }
        })
        .collect();

    // template directories without catalog entries
    for name in project.templates.pipeline_names() {
        if rows.iter().any(|r| r.id == name.as_str()) {
            continue;
        }
        let group = project.templates.pipeline(name.as_str());
        rows.push(PipelineRow {
            id: name.to_string(),
            name: name.to_string(),
            datasets: 0,
            enabled: 0,
            templates: group.map_or(0, |g| g.templates.len()),
            merged_templates: group.map_or(0, |g| g.merged.len()),
        });
    }
    rows
}

fn list_pipelines(project: &Project, output: OutputFormat) -> Result<()> {
    let rows = pipeline_rows(project);
    if output == OutputFormat::Json {
        return print_json(&rows);
    }
    let table: Vec<Vec<String>> = rows
        .iter()
        .map(|r| {
            vec![
                r.id.clone(),
                r.name.clone(),
                format!("{}/{}", r.enabled, r.datasets),
                r.templates.to_string(),
                r.merged_templates.to_string(),
            ]
        })
        .collect();
    print_table(&["ID", "NAME", "ENABLED", "TEMPLATES", "MERGED"], &table);
    Ok(())
}

fn list_templates(project: &Project, output: OutputFormat) -> Result<()> {
    let templates = project.templates.all();
    if output == OutputFormat::Json {
        let plain: Vec<&gf_core::Template> = templates.iter().map(|t| t.as_ref()).collect();
        return print_json(&plain);
    }
    let rows: Vec<Vec<String>> = templates
        .iter()
        .map(|t| {
            vec![
                t.id.to_string(),
                t.kind.to_string(),
                t.schema.clone(),
                t.path
                    .strip_prefix(&project.root)
                    .unwrap_or(&t.path)
                    .display()
                    .to_string(),
            ]
        })
        .collect();
    print_table(&["ID", "KIND", "SCHEMA", "PATH"], &rows);
    println!("\n{} templates", templates.len());
    Ok(())
}

fn list_types(project: &Project, output: OutputFormat) -> Result<()> {
    let types = project.catalog.types();
    if output == OutputFormat::Json {
        return print_json(&types);
    }
    let rows: Vec<Vec<String>> = types
        .iter()
        .map(|(typ, count)| vec![typ.clone(), count.to_string()])
        .collect();
    print_table(&["TYPE", "DATASETS"], &rows);
    Ok(())
}
