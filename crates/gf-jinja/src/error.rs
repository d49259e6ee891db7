//! Error types for gf-jinja

use thiserror::Error;

/// Template rendering errors
#[derive(Error, Debug)]
pub enum TemplateError {
    /// Template render error (J001)
    #[error("[J001] Render of '{template}' failed: {message}")]
    RenderError { template: String, message: String },

    /// Placeholder without a value (J002)
    #[error("[J002] Undefined placeholder in '{template}': {message}. Add it to field_mapping or template_defaults")]
    UndefinedPlaceholder { template: String, message: String },
}

/// Result type alias for TemplateError
pub type TemplateResult<T> = Result<T, TemplateError>;

impl TemplateError {
    pub(crate) fn from_minijinja(template: &str, err: minijinja::Error) -> Self {
        let message = err.to_string();
        if err.kind() == minijinja::ErrorKind::UndefinedError {
            TemplateError::UndefinedPlaceholder {
                template: template.to_string(),
                message,
            }
        } else {
            TemplateError::RenderError {
                template: template.to_string(),
                message,
            }
        }
    }
}
