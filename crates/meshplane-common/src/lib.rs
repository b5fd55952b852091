//! Common types for meshplane: CRDs, errors, and utilities

#![deny(missing_docs)]

pub mod crd;
pub mod error;
pub mod kube_utils;
pub mod telemetry;
pub mod version;
pub mod yaml;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// API group of every meshplane custom resource
pub const API_GROUP: &str = "servicemesh.cisco.com";

/// Field manager used for server-side apply
pub const FIELD_MANAGER: &str = "meshplane-operator";

/// Annotation that opts a resource out of reconciliation when set to "false"
pub const RECONCILE_ANNOTATION: &str = "servicemesh.cisco.com/reconcile";

/// Standard label for the component that manages a resource
pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";

/// Value of [`LABEL_MANAGED_BY`] for resources applied by meshplane
pub const LABEL_MANAGED_BY_MESHPLANE: &str = "meshplane";

/// Label carrying the Helm release a rendered object belongs to
pub const LABEL_RELEASE: &str = "servicemesh.cisco.com/release";

/// Label carrying the name of the custom resource that owns a rendered object
pub const LABEL_OWNER_NAME: &str = "servicemesh.cisco.com/owner-name";

/// Label carrying the namespace of the custom resource that owns a rendered object
pub const LABEL_OWNER_NAMESPACE: &str = "servicemesh.cisco.com/owner-namespace";

/// Istio revision label
pub const ISTIO_REVISION_LABEL: &str = "istio.io/rev";

/// Pod annotation carrying the sidecar injection checksum
pub const INJECTION_CHECKSUM_ANNOTATION: &str = "checksum/sidecar-injector";

/// Pod annotation carrying the mesh config checksum
pub const MESH_CONFIG_CHECKSUM_ANNOTATION: &str = "checksum/mesh-config";
