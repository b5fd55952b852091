//! Error types for the meshplane operator
//!
//! Errors are structured with fields to aid debugging in production.
//! Each variant carries the resource, release or template it relates to
//! and the underlying cause.

use thiserror::Error;

/// Default context value when no specific context is available
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// Main error type for meshplane operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// Validation error for a custom resource spec
    #[error("validation error for {resource}: {message}")]
    Validation {
        /// `namespace/name` of the resource with invalid configuration
        resource: String,
        /// Description of what's invalid
        message: String,
        /// The invalid field path (e.g., "spec.version")
        field: Option<String>,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
        /// The resource kind, template or field being processed (if known)
        kind: Option<String>,
    },

    /// A component adapter received an object it does not handle
    #[error("wrong resource kind for component {component}: expected {expected}, got {found}")]
    WrongResourceKind {
        /// Component that rejected the object
        component: String,
        /// Kind the component handles
        expected: String,
        /// Description of the object that was passed in
        found: String,
    },

    /// Values template could not be rendered
    #[error("template error [{template}]: {message}")]
    Template {
        /// Name of the template that failed
        template: String,
        /// Rendering failure, including the template body
        message: String,
    },

    /// Chart rendering (helm template) failed
    #[error("render error for release {release}: {message}")]
    Render {
        /// Release being rendered
        release: String,
        /// Description of what failed
        message: String,
    },

    /// One or more rendered objects could not be applied
    #[error("apply error for release {release}: {message}")]
    Apply {
        /// Release being applied
        release: String,
        /// Aggregated failures
        message: String,
    },

    /// A referenced resource does not exist (yet)
    #[error("{kind} {namespace}/{name} not found")]
    NotFound {
        /// Kind of the referenced resource
        kind: String,
        /// Name of the referenced resource
        name: String,
        /// Namespace of the referenced resource
        namespace: String,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred (e.g., "reconciler", "renderer")
        context: String,
    },
}

impl Error {
    /// Create a validation error with the given message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            resource: UNKNOWN_CONTEXT.to_string(),
            message: msg.into(),
            field: None,
        }
    }

    /// Create a validation error with resource context
    pub fn validation_for(resource: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation {
            resource: resource.into(),
            message: msg.into(),
            field: None,
        }
    }

    /// Create a validation error with resource context and field path
    pub fn validation_for_field(
        resource: impl Into<String>,
        field: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Validation {
            resource: resource.into(),
            message: msg.into(),
            field: Some(field.into()),
        }
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: None,
        }
    }

    /// Create a serialization error with kind context
    pub fn serialization_for_kind(kind: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: Some(kind.into()),
        }
    }

    /// Create a wrong-resource-kind error
    pub fn wrong_resource_kind(
        component: impl Into<String>,
        expected: impl Into<String>,
        found: impl Into<String>,
    ) -> Self {
        Self::WrongResourceKind {
            component: component.into(),
            expected: expected.into(),
            found: found.into(),
        }
    }

    /// Create a render error for a release
    pub fn render(release: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Render {
            release: release.into(),
            message: msg.into(),
        }
    }

    /// Create an apply error for a release
    pub fn apply(release: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Apply {
            release: release.into(),
            message: msg.into(),
        }
    }

    /// Create a not-found error for a referenced resource
    pub fn not_found(
        kind: impl Into<String>,
        name: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Self {
        Self::NotFound {
            kind: kind.into(),
            name: name.into(),
            namespace: namespace.into(),
        }
    }

    /// Create an internal error with the given message
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: UNKNOWN_CONTEXT.to_string(),
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// Check if this error is retryable
    ///
    /// Validation, serialization, template and wiring errors are not
    /// retryable (the resource or the operator build must change).
    /// Kubernetes errors depend on the status code.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube { source } => {
                !matches!(
                    source,
                    kube::Error::Api(ae) if (400..500).contains(&ae.code) && ae.code != 409 && ae.code != 429
                )
            }
            Error::Validation { .. } => false,
            Error::Serialization { .. } => false,
            Error::WrongResourceKind { .. } => false,
            Error::Template { .. } => false,
            Error::Render { .. } => true,
            Error::Apply { .. } => true,
            Error::NotFound { .. } => true,
            Error::Internal { .. } => true,
        }
    }

    /// Get the resource this error is associated with, if any
    pub fn resource(&self) -> Option<&str> {
        match self {
            Error::Validation { resource, .. } => Some(resource),
            _ => None,
        }
    }

    /// Get the context if this error has one
    pub fn context(&self) -> Option<&str> {
        match self {
            Error::Internal { context, .. } => Some(context),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_are_terminal() {
        let err = Error::validation_for_field("istio-system/icp", "spec.version", "is required");
        assert!(!err.is_retryable());
        assert_eq!(err.resource(), Some("istio-system/icp"));
        match &err {
            Error::Validation { field, .. } => assert_eq!(field.as_deref(), Some("spec.version")),
            _ => panic!("Expected Validation variant"),
        }
        assert!(err.to_string().contains("istio-system/icp"));
    }

    #[test]
    fn wrong_resource_kind_is_terminal_and_descriptive() {
        let err = Error::wrong_resource_kind("base", "IstioControlPlane", "MeshGateway default/gw");
        assert!(!err.is_retryable());
        let msg = err.to_string();
        assert!(msg.contains("base"));
        assert!(msg.contains("MeshGateway default/gw"));
    }

    #[test]
    fn transient_errors_are_retryable() {
        assert!(Error::render("istio-base", "helm exited with 1").is_retryable());
        assert!(Error::apply("istio-base", "1 object failed").is_retryable());
        assert!(Error::not_found("IstioControlPlane", "icp", "istio-system").is_retryable());
        assert!(Error::internal("boom").is_retryable());
    }

    #[test]
    fn serialization_errors_keep_kind() {
        let err = Error::serialization_for_kind("values.yaml.tpl", "not a mapping");
        match &err {
            Error::Serialization { kind, .. } => assert_eq!(kind.as_deref(), Some("values.yaml.tpl")),
            _ => panic!("Expected Serialization variant"),
        }
        assert!(!err.is_retryable());
    }

    #[test]
    fn kube_client_errors_are_classified_by_status() {
        let not_found = Error::from(kube::Error::Api(kube::error::ErrorResponse {
            status: "Failure".to_string(),
            message: "not found".to_string(),
            reason: "NotFound".to_string(),
            code: 404,
        }));
        assert!(!not_found.is_retryable());

        let conflict = Error::from(kube::Error::Api(kube::error::ErrorResponse {
            status: "Failure".to_string(),
            message: "conflict".to_string(),
            reason: "Conflict".to_string(),
            code: 409,
        }));
        assert!(conflict.is_retryable());
    }

    #[test]
    fn internal_error_default_context() {
        let err = Error::internal("unexpected state");
        assert_eq!(err.context(), Some(UNKNOWN_CONTEXT));
        assert!(err.to_string().contains("[unknown]"));
    }
}
