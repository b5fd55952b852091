//! Kubernetes utilities shared by the release reconciler and controllers
//!
//! Rendered chart output is handled as `serde_json::Value` until it is
//! applied, so most helpers here work on values rather than typed objects.

use std::time::Duration;

use kube::api::{Api, Patch, PatchParams};
use kube::discovery::ApiResource;
use kube::{Client, Config};
use serde_json::Value;

use crate::Error;

/// Default connection timeout for kube clients
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Default read timeout for kube clients. Watch timeouts must stay below this.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Create a kube client from the ambient configuration.
///
/// `api_server` overrides the cluster URL from the inferred config.
pub async fn create_client(api_server: Option<&str>) -> Result<Client, Error> {
    let mut config = Config::infer().await.map_err(|e| {
        Error::internal_with_context("create_client", format!("failed to infer config: {}", e))
    })?;
    if let Some(url) = api_server {
        config.cluster_url = url.parse().map_err(|e| {
            Error::internal_with_context(
                "create_client",
                format!("invalid API server URL {}: {}", url, e),
            )
        })?;
    }
    config.connect_timeout = Some(DEFAULT_CONNECT_TIMEOUT);
    config.read_timeout = Some(DEFAULT_READ_TIMEOUT);
    Client::try_from(config).map_err(|e| {
        Error::internal_with_context("create_client", format!("failed to create client: {}", e))
    })
}

/// Parse apiVersion into (group, version)
///
/// # Examples
/// ```
/// use meshplane_common::kube_utils::parse_api_version;
///
/// let (group, version) = parse_api_version("admissionregistration.k8s.io/v1");
/// assert_eq!(group, "admissionregistration.k8s.io");
/// assert_eq!(version, "v1");
///
/// let (group, version) = parse_api_version("v1");
/// assert_eq!(group, "");
/// assert_eq!(version, "v1");
/// ```
pub fn parse_api_version(api_version: &str) -> (String, String) {
    match api_version.split_once('/') {
        Some((group, version)) => (group.to_string(), version.to_string()),
        None => (String::new(), api_version.to_string()),
    }
}

/// Build an ApiResource from apiVersion and kind without discovery
pub fn build_api_resource(api_version: &str, kind: &str) -> ApiResource {
    let (group, version) = parse_api_version(api_version);
    ApiResource {
        group,
        version,
        kind: kind.to_string(),
        api_version: api_version.to_string(),
        plural: pluralize_kind(kind),
    }
}

/// Kinds whose plural is not derivable by the fallback rules
const KIND_PLURALS: &[(&str, &str)] = &[
    ("endpoints", "endpoints"),
    ("podsecuritypolicy", "podsecuritypolicies"),
    ("networkpolicy", "networkpolicies"),
    ("ingress", "ingresses"),
    ("meshgateway", "meshgateways"),
    ("istiomeshgateway", "istiomeshgateways"),
    ("istiomesh", "istiomeshes"),
];

/// Pluralize a Kubernetes resource kind
pub fn pluralize_kind(kind: &str) -> String {
    let lower = kind.to_lowercase();

    for (singular, plural) in KIND_PLURALS {
        if *singular == lower {
            return (*plural).to_string();
        }
    }

    if lower.ends_with('s') || lower.ends_with("ch") || lower.ends_with("sh") {
        format!("{}es", lower)
    } else if lower.ends_with('y') && !lower.ends_with("ay") && !lower.ends_with("ey") {
        format!("{}ies", &lower[..lower.len() - 1])
    } else {
        format!("{}s", lower)
    }
}

/// Kinds that charts render without a namespace and that must stay cluster-scoped
pub fn is_cluster_scoped_kind(kind: &str) -> bool {
    matches!(
        kind,
        "Namespace"
            | "CustomResourceDefinition"
            | "ClusterRole"
            | "ClusterRoleBinding"
            | "ValidatingWebhookConfiguration"
            | "MutatingWebhookConfiguration"
            | "PodSecurityPolicy"
            | "PriorityClass"
            | "StorageClass"
            | "APIService"
    )
}

/// Apply priority for a kind (lower = earlier)
///
/// CRDs and RBAC go first so the objects that depend on them validate.
/// Webhook configurations go last so they never block the pods that serve them.
pub fn kind_priority(kind: &str) -> u8 {
    match kind {
        "Namespace" => 0,
        "CustomResourceDefinition" => 1,
        "ServiceAccount" => 2,
        "ClusterRole" | "Role" => 3,
        "ClusterRoleBinding" | "RoleBinding" => 4,
        "ConfigMap" | "Secret" => 5,
        "Service" => 6,
        "Deployment" | "DaemonSet" | "StatefulSet" => 7,
        "ValidatingWebhookConfiguration" | "MutatingWebhookConfiguration" => 9,
        _ => 8,
    }
}

/// Parsed manifest metadata for applying to Kubernetes
#[derive(Debug, Clone)]
pub struct ManifestMetadata {
    /// The parsed JSON value
    pub value: Value,
    /// Resource name
    pub name: String,
    /// Optional namespace
    pub namespace: Option<String>,
    /// API resource definition
    pub api_resource: ApiResource,
}

impl ManifestMetadata {
    /// Object kind
    pub fn kind(&self) -> &str {
        &self.api_resource.kind
    }

    /// `Kind namespace/name` (or `Kind name` when cluster-scoped), for logs and errors
    pub fn describe(&self) -> String {
        match &self.namespace {
            Some(ns) => format!("{} {}/{}", self.api_resource.kind, ns, self.name),
            None => format!("{} {}", self.api_resource.kind, self.name),
        }
    }
}

/// Extract apply metadata from a parsed manifest
pub fn manifest_metadata(value: Value) -> Result<ManifestMetadata, Error> {
    let api_version = value
        .get("apiVersion")
        .and_then(|v| v.as_str())
        .ok_or_else(|| Error::internal_with_context("parse_manifest", "Manifest missing apiVersion"))?
        .to_string();

    let kind = value
        .get("kind")
        .and_then(|v| v.as_str())
        .ok_or_else(|| Error::internal_with_context("parse_manifest", "Manifest missing kind"))?
        .to_string();

    let name = value
        .pointer("/metadata/name")
        .and_then(|v| v.as_str())
        .ok_or_else(|| {
            Error::internal_with_context("parse_manifest", "Manifest missing metadata.name")
        })?
        .to_string();

    let namespace = value
        .pointer("/metadata/namespace")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());

    let api_resource = build_api_resource(&api_version, &kind);

    Ok(ManifestMetadata {
        value,
        name,
        namespace,
        api_resource,
    })
}

/// Patch the status sub-resource of a namespaced Kubernetes resource.
///
/// Serializes `status` into `{ "status": <status> }` and applies it via
/// merge-patch.
pub async fn patch_resource_status<T>(
    client: &Client,
    name: &str,
    namespace: &str,
    status: &impl serde::Serialize,
    field_manager: &str,
) -> std::result::Result<(), kube::Error>
where
    T: kube::Resource<Scope = k8s_openapi::NamespaceResourceScope>
        + Clone
        + serde::de::DeserializeOwned
        + std::fmt::Debug,
    <T as kube::Resource>::DynamicType: Default,
{
    let api: Api<T> = Api::namespaced(client.clone(), namespace);
    let patch = serde_json::json!({ "status": status });
    api.patch_status(name, &PatchParams::apply(field_manager), &Patch::Merge(&patch))
        .await?;
    Ok(())
}

/// Hex SHA-256 of the input.
///
/// Used for checksum annotations, which must stay stable across builds.
pub fn sha256_hex(input: &[u8]) -> String {
    use aws_lc_rs::digest;
    let hash = digest::digest(&digest::SHA256, input);
    hash.as_ref()
        .iter()
        .fold(String::with_capacity(64), |mut s, b| {
            use std::fmt::Write;
            let _ = write!(s, "{:02x}", b);
            s
        })
}

/// Checksum of a serializable value.
///
/// serde_json maps are ordered, so equal values always hash equally.
pub fn checksum_of(value: &impl serde::Serialize) -> Result<String, Error> {
    let bytes = serde_json::to_vec(value)
        .map_err(|e| Error::serialization_for_kind("checksum", e.to_string()))?;
    Ok(sha256_hex(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case::service("Service", "services")]
    #[case::policy("PodSecurityPolicy", "podsecuritypolicies")]
    #[case::webhook("MutatingWebhookConfiguration", "mutatingwebhookconfigurations")]
    #[case::gateway("MeshGateway", "meshgateways")]
    #[case::mesh("IstioMesh", "istiomeshes")]
    #[case::endpoints("Endpoints", "endpoints")]
    #[case::ingress("Ingress", "ingresses")]
    #[case::entry("ServiceEntry", "serviceentries")]
    fn pluralizes_kinds(#[case] kind: &str, #[case] plural: &str) {
        assert_eq!(pluralize_kind(kind), plural);
    }

    #[test]
    fn builds_api_resource_for_core_and_grouped_kinds() {
        let ar = build_api_resource("v1", "ConfigMap");
        assert_eq!(ar.group, "");
        assert_eq!(ar.plural, "configmaps");

        let ar = build_api_resource("networking.istio.io/v1alpha3", "EnvoyFilter");
        assert_eq!(ar.group, "networking.istio.io");
        assert_eq!(ar.version, "v1alpha3");
        assert_eq!(ar.plural, "envoyfilters");
    }

    #[test]
    fn manifest_metadata_extracts_identity() {
        let meta = manifest_metadata(json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": {"name": "istiod", "namespace": "istio-system"}
        }))
        .unwrap();
        assert_eq!(meta.name, "istiod");
        assert_eq!(meta.namespace.as_deref(), Some("istio-system"));
        assert_eq!(meta.kind(), "Deployment");
        assert_eq!(meta.describe(), "Deployment istio-system/istiod");
    }

    #[test]
    fn manifest_metadata_requires_name() {
        let err = manifest_metadata(json!({"apiVersion": "v1", "kind": "ConfigMap"})).unwrap_err();
        assert!(err.to_string().contains("metadata.name"));
    }

    #[test]
    fn webhooks_apply_after_workloads() {
        assert!(kind_priority("Deployment") < kind_priority("MutatingWebhookConfiguration"));
        assert!(kind_priority("CustomResourceDefinition") < kind_priority("ServiceAccount"));
        assert!(kind_priority("EnvoyFilter") < kind_priority("ValidatingWebhookConfiguration"));
    }

    #[test]
    fn cluster_scoped_kinds() {
        assert!(is_cluster_scoped_kind("ClusterRole"));
        assert!(is_cluster_scoped_kind("ValidatingWebhookConfiguration"));
        assert!(!is_cluster_scoped_kind("Deployment"));
    }

    #[test]
    fn checksum_is_stable_and_order_insensitive() {
        let a = checksum_of(&json!({"a": 1, "b": 2})).unwrap();
        let b = checksum_of(&json!({"b": 2, "a": 1})).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(a, checksum_of(&json!({"a": 2, "b": 1})).unwrap());
    }

    #[test]
    fn sha256_known_vector() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
