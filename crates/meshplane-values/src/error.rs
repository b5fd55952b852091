//! Template error types

use std::fmt;

/// Errors that can occur while producing a values document
#[derive(Debug)]
pub enum TemplateError {
    /// The chart does not embed the requested template
    NotFound {
        /// Chart name
        chart: String,
        /// Template name
        template: String,
    },
    /// Template execution failed
    Render {
        /// Template that failed (may be a nested include)
        template: String,
        /// Source of the failing template
        body: String,
        /// Underlying engine error
        source: minijinja::Error,
    },
    /// The template input could not be serialized
    Input {
        /// Template name
        template: String,
        /// Serialization failure
        message: String,
    },
    /// The template output is not a YAML mapping
    Decode {
        /// Template name
        template: String,
        /// Decode failure
        message: String,
    },
}

impl TemplateError {
    /// Name of the template the error relates to
    pub fn template(&self) -> &str {
        match self {
            Self::NotFound { template, .. }
            | Self::Render { template, .. }
            | Self::Input { template, .. }
            | Self::Decode { template, .. } => template,
        }
    }
}

impl fmt::Display for TemplateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { chart, template } => {
                write!(f, "chart {} has no template {}", chart, template)
            }
            Self::Render {
                template,
                body,
                source,
            } => write!(
                f,
                "template {} failed: {}\n--- template body ---\n{}",
                template, source, body
            ),
            Self::Input { template, message } => {
                write!(f, "cannot serialize input for {}: {}", template, message)
            }
            Self::Decode { template, message } => {
                write!(f, "output of {} is not a values document: {}", template, message)
            }
        }
    }
}

impl std::error::Error for TemplateError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Render { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<TemplateError> for meshplane_common::Error {
    fn from(err: TemplateError) -> Self {
        match err {
            TemplateError::Input { template, message }
            | TemplateError::Decode { template, message } => {
                meshplane_common::Error::serialization_for_kind(template, message)
            }
            other => meshplane_common::Error::Template {
                template: other.template().to_string(),
                message: other.to_string(),
            },
        }
    }
}
