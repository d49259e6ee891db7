//! Render command implementation

use anyhow::{anyhow, bail, Context, Result};
use gf_core::Project;
use gf_jinja::TemplateRenderer;
use gf_pipeline::post_merge::{plan_post_merge, PostMergeScope};

use crate::cli::{GlobalArgs, RenderArgs};
use crate::commands::common::load_project;

/// Execute the render command
pub async fn execute(args: &RenderArgs, global: &GlobalArgs) -> Result<()> {
    let project = load_project(global)?;
    let sql = render(&project, &args.template, args.dataset.as_deref())?;
    println!("{}", sql);
    Ok(())
}

/// Render one template exactly as a run would.
///
/// Per-dataset templates need a dataset whose chain contains them;
/// post-merge templates render with their pipeline context only.
pub(crate) fn render(project: &Project, template_id: &str, dataset: Option<&str>) -> Result<String> {
    let template = project
        .templates
        .get(template_id)
        .ok_or_else(|| anyhow!("Unknown template '{}'", template_id))?;
    let renderer = TemplateRenderer::new(project.config.template_defaults.clone());

    if template.kind.is_post_merge() {
        if dataset.is_some() {
            log::warn!("{} runs against the warehouse; --dataset is ignored", template_id);
        }
        let step = plan_post_merge(&project.templates)
            .into_iter()
            .find(|s| s.template_id() == template_id)
            .ok_or_else(|| anyhow!("Template '{}' is not part of the post-merge plan", template_id))?;
        let pipeline = match &step.scope {
            PostMergeScope::Pipeline(p) => Some(p),
            PostMergeScope::Global => None,
        };
        return renderer
            .render_for_pipeline(&step.step, pipeline)
            .with_context(|| format!("Failed to render {}", template_id));
    }

    let Some(dataset_id) = dataset else {
        bail!("Template '{}' runs per dataset; pass --dataset", template_id);
    };
    let dataset = project
        .catalog
        .get(dataset_id)
        .ok_or_else(|| anyhow!("Unknown dataset '{}'", dataset_id))?;
    let step = project
        .templates
        .chain_for(dataset.pipeline.as_ref())
        .into_iter()
        .find(|s| s.template.id.as_str() == template_id)
        .ok_or_else(|| {
            anyhow!(
                "Template '{}' is not in the chain of dataset '{}'",
                template_id,
                dataset_id
            )
        })?;
    renderer
        .render_for_dataset(&step, dataset)
        .with_context(|| format!("Failed to render {} for {}", template_id, dataset_id))
}

#[cfg(test)]
#[path = "render_test.rs"]
mod tests;
