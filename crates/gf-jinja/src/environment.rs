//! Template renderer

use crate::context::RenderContext;
use crate::error::{TemplateError, TemplateResult};
use gf_core::{ChainStep, DatasetConfig, FieldValue, PipelineName};
use minijinja::{Environment, UndefinedBehavior};
use std::collections::BTreeMap;

/// Renders SQL templates with strict placeholder checking.
///
/// Rendering is a pure function of the template text and the context.
pub struct TemplateRenderer {
    env: Environment<'static>,
    defaults: BTreeMap<String, FieldValue>,
}

impl TemplateRenderer {
    /// Create a renderer using the project's template defaults
    pub fn new(defaults: BTreeMap<String, FieldValue>) -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.set_keep_trailing_newline(true);
        Self { env, defaults }
    }

    /// Template defaults applied before each dataset's field mapping
    pub fn defaults(&self) -> &BTreeMap<String, FieldValue> {
        &self.defaults
    }

    /// Render raw template text against a context
    pub fn render_str(&self, name: &str, source: &str, ctx: &RenderContext) -> TemplateResult<String> {
        self.env
            .render_named_str(name, source, ctx)
            .map_err(|e| TemplateError::from_minijinja(name, e))
    }

    /// Context for one dataset chain step
    pub fn dataset_context(&self, step: &ChainStep, dataset: &DatasetConfig) -> RenderContext {
        RenderContext::for_dataset(
            dataset,
            &step.template.schema,
            &step.prev_schema,
            &self.defaults,
        )
    }

    /// Context for one post-merge step
    pub fn pipeline_context(&self, step: &ChainStep, pipeline: Option<&PipelineName>) -> RenderContext {
        RenderContext::for_pipeline(
            pipeline,
            &step.template.schema,
            &step.prev_schema,
            &self.defaults,
        )
    }

    /// Render a chain step for a dataset
    pub fn render_for_dataset(&self, step: &ChainStep, dataset: &DatasetConfig) -> TemplateResult<String> {
        let ctx = self.dataset_context(step, dataset);
        self.render_str(step.template.id.as_str(), &step.template.sql, &ctx)
    }

    /// Render a post-merge step with the pipeline context only
    pub fn render_for_pipeline(
        &self,
        step: &ChainStep,
        pipeline: Option<&PipelineName>,
    ) -> TemplateResult<String> {
        let ctx = self.pipeline_context(step, pipeline);
        self.render_str(step.template.id.as_str(), &step.template.sql, &ctx)
    }
}

impl Default for TemplateRenderer {
    fn default() -> Self {
        Self::new(gf_core::config::default_template_defaults())
    }
}

#[cfg(test)]
#[path = "environment_test.rs"]
mod tests;
