//! Custom Resource Definitions for meshplane
//!
//! All resources live in the `servicemesh.cisco.com/v1alpha1` group.

mod control_plane;
mod mesh;
mod mesh_gateway;
mod types;

pub use control_plane::{
    CertProvider, CniConfiguration, CniRepairConfiguration, ControlPlaneMode,
    ExposeConfiguration, ExternalIstiodConfiguration, IstioControlPlane, IstioControlPlaneSpec,
    IstioControlPlaneStatus, IstiodConfiguration, JwtPolicy, LoggingConfiguration,
    MeshExpansionConfiguration, MeshExpansionGateway, ProxyConfiguration,
    ProxyInitConfiguration, SdsConfiguration, ServiceConfig, SidecarInjectionTemplates,
    SidecarInjectorConfiguration, StatusChecksums, TelemetryV2Configuration,
    DEFAULT_TRUST_DOMAIN,
};
pub use mesh::{IstioMesh, IstioMeshSpec};
pub use mesh_gateway::{
    GatewayConfig, GatewayType, IstioMeshGateway, IstioMeshGatewaySpec, MeshGateway,
    MeshGatewaySpec,
};
pub use types::{
    preserve_unknown_fields, BaseKubernetesResourceConfig, ConfigState, ConfigStatus,
    ContainerImageConfiguration, DeploymentConfig, GroupVersionKind, K8sObjectMeta,
    K8sResourceOverlay, K8sResourceOverlayPatch, NamespacedName, ObjectKey, OverlayPatchType,
    ProtoDuration, Replicas,
};

/// Whether a resource's annotations opt it out of reconciliation
pub fn is_reconcile_disabled(
    annotations: Option<&std::collections::BTreeMap<String, String>>,
) -> bool {
    annotations
        .and_then(|a| a.get(crate::RECONCILE_ANNOTATION))
        .is_some_and(|v| v.eq_ignore_ascii_case("false"))
}
