//! MeshGateway and IstioMeshGateway CRDs
//!
//! Both describe an ingress or egress gateway bound to an IstioControlPlane
//! and render through the meshgateway chart. IstioMeshGateway additionally
//! accepts resource overlays.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::control_plane::ServiceConfig;
use super::types::{ConfigStatus, DeploymentConfig, K8sResourceOverlay, NamespacedName};

/// Direction of a gateway
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GatewayType {
    /// Traffic entering the mesh
    #[default]
    Ingress,
    /// Traffic leaving the mesh
    Egress,
}

impl GatewayType {
    /// Lower-case name used in labels and values
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ingress => "ingress",
            Self::Egress => "egress",
        }
    }
}

/// Gateway settings shared by both gateway kinds
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Deployment settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment: Option<DeploymentConfig>,
    /// Service settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<ServiceConfig>,
    /// Run the gateway as root (needed for ports below 1024)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_as_root: Option<bool>,
    /// Gateway direction
    #[serde(rename = "type", default)]
    pub gateway_type: GatewayType,
    /// Control plane this gateway is attached to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub istio_control_plane: Option<NamespacedName>,
}

/// Spec for a MeshGateway
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "servicemesh.cisco.com",
    version = "v1alpha1",
    kind = "MeshGateway",
    plural = "meshgateways",
    shortname = "mgw",
    namespaced,
    status = "ConfigStatus",
    printcolumn = r#"{"name":"Type","type":"string","jsonPath":".spec.type"}"#,
    printcolumn = r#"{"name":"Status","type":"string","jsonPath":".status.status"}"#,
    printcolumn = r#"{"name":"Error","type":"string","jsonPath":".status.errorMessage"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct MeshGatewaySpec {
    /// Gateway settings
    #[serde(flatten)]
    pub gateway: GatewayConfig,
}

/// Spec for an IstioMeshGateway
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "servicemesh.cisco.com",
    version = "v1alpha1",
    kind = "IstioMeshGateway",
    plural = "istiomeshgateways",
    shortname = "imgw",
    namespaced,
    status = "ConfigStatus",
    printcolumn = r#"{"name":"Type","type":"string","jsonPath":".spec.type"}"#,
    printcolumn = r#"{"name":"Status","type":"string","jsonPath":".status.status"}"#,
    printcolumn = r#"{"name":"Error","type":"string","jsonPath":".status.errorMessage"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct IstioMeshGatewaySpec {
    /// Gateway settings
    #[serde(flatten)]
    pub gateway: GatewayConfig,
    /// Patches applied to rendered objects
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub k8s_resource_overlays: Vec<K8sResourceOverlay>,
}
