//! Reconciler-computed data handed to the values templates next to the spec
//!
//! Properties are rebuilt on every reconcile and never persisted. Templates
//! see them under `properties`; a missing field renders as an omitted value.

use serde::Serialize;
use serde_json::{Map, Value};

use meshplane_common::crd::{
    BaseKubernetesResourceConfig, ContainerImageConfiguration, GatewayConfig, IstioControlPlane,
    IstioMesh, DEFAULT_TRUST_DOMAIN,
};
use meshplane_common::kube_utils::checksum_of;
use meshplane_common::{Error, INJECTION_CHECKSUM_ANNOTATION, MESH_CONFIG_CHECKSUM_ANNOTATION};
use meshplane_values::Values;

/// Summary of the control plane a gateway is attached to
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlPlaneReference {
    /// Control plane name
    pub name: String,
    /// Control plane namespace
    pub namespace: String,
    /// Istio revision
    pub revision: String,
    /// Revision qualified with the namespace
    pub namespaced_revision: String,
    /// Network of the control plane
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_name: Option<String>,
    /// Cluster identifier of the control plane
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster_id: Option<String>,
    /// Image defaults inherited by the gateway
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_image_configuration: Option<ContainerImageConfiguration>,
    /// Proxy image used by the gateway
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy_image: Option<String>,
}

impl From<&IstioControlPlane> for ControlPlaneReference {
    fn from(icp: &IstioControlPlane) -> Self {
        Self {
            name: icp.metadata.name.clone().unwrap_or_default(),
            namespace: icp.metadata.namespace.clone().unwrap_or_default(),
            revision: icp.revision(),
            namespaced_revision: icp.namespaced_revision(),
            network_name: icp.spec.network_name.clone(),
            cluster_id: icp.spec.cluster_id.clone(),
            container_image_configuration: icp.spec.container_image_configuration.clone(),
            proxy_image: icp.spec.proxy.as_ref().and_then(|p| p.image.clone()),
        }
    }
}

/// Auxiliary template input
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Properties {
    /// Istio revision
    pub revision: String,
    /// Revision qualified with the namespace
    pub namespaced_revision: String,
    /// Trust domain of the mesh
    pub trust_domain: String,
    /// Checksum of everything that shapes sidecar injection
    #[serde(skip_serializing_if = "Option::is_none")]
    pub injection_checksum: Option<String>,
    /// Checksum of the effective mesh config
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mesh_config_checksum: Option<String>,
    /// Effective mesh config: the IstioMesh config overlaid with the
    /// control plane's own, trust domain and drain duration filled in
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mesh_config: Option<Map<String, Value>>,
    /// Control plane a gateway is attached to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub control_plane: Option<ControlPlaneReference>,
    /// Render the gateway's Service
    pub generate_external_service: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InjectionInputs<'a> {
    sidecar_injector: &'a Option<meshplane_common::crd::SidecarInjectorConfiguration>,
    proxy: &'a Option<meshplane_common::crd::ProxyConfiguration>,
    proxy_init: &'a Option<meshplane_common::crd::ProxyInitConfiguration>,
    container_image_configuration: &'a Option<ContainerImageConfiguration>,
    mesh_config: &'a Map<String, Value>,
}

impl Properties {
    /// Properties of a control plane, with the config of the IstioMesh it
    /// references when there is one
    pub fn for_control_plane(icp: &IstioControlPlane, mesh: Option<&IstioMesh>) -> Result<Self, Error> {
        let mesh_config = effective_mesh_config(icp, mesh);
        let trust_domain = mesh_config
            .get("trustDomain")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_TRUST_DOMAIN)
            .to_string();

        let injection_checksum = checksum_of(&InjectionInputs {
            sidecar_injector: &icp.spec.sidecar_injector,
            proxy: &icp.spec.proxy,
            proxy_init: &icp.spec.proxy_init,
            container_image_configuration: &icp.spec.container_image_configuration,
            mesh_config: &mesh_config,
        })?;
        let mesh_config_checksum = checksum_of(&mesh_config)?;

        Ok(Self {
            revision: icp.revision(),
            namespaced_revision: icp.namespaced_revision(),
            trust_domain,
            injection_checksum: Some(injection_checksum),
            mesh_config_checksum: Some(mesh_config_checksum),
            mesh_config: Some(mesh_config),
            control_plane: None,
            generate_external_service: false,
        })
    }

    /// Properties of a gateway attached to `icp`
    ///
    /// The injection checksum comes from the control plane's status so that
    /// gateway pods roll when the injection inputs of their control plane
    /// change.
    pub fn for_gateway(gateway: &GatewayConfig, icp: &IstioControlPlane) -> Self {
        let injection_checksum = icp
            .status
            .as_ref()
            .and_then(|s| s.checksums.as_ref())
            .and_then(|c| c.sidecar_injector.clone());

        Self {
            revision: icp.revision(),
            namespaced_revision: icp.namespaced_revision(),
            trust_domain: icp.spec.trust_domain(),
            injection_checksum,
            mesh_config_checksum: None,
            mesh_config: None,
            control_plane: Some(ControlPlaneReference::from(icp)),
            generate_external_service: gateway
                .service
                .as_ref()
                .is_some_and(|s| !s.ports.is_empty()),
        }
    }

    /// Write the checksum annotations into a workload's pod metadata
    pub fn apply_checksums(&self, workload: &mut BaseKubernetesResourceConfig) {
        if let Some(checksum) = &self.injection_checksum {
            workload.set_pod_annotation(INJECTION_CHECKSUM_ANNOTATION, checksum.clone());
        }
        if let Some(checksum) = &self.mesh_config_checksum {
            workload.set_pod_annotation(MESH_CONFIG_CHECKSUM_ANNOTATION, checksum.clone());
        }
    }
}

fn effective_mesh_config(icp: &IstioControlPlane, mesh: Option<&IstioMesh>) -> Map<String, Value> {
    let mut merged = Values::from(
        mesh.and_then(|m| m.spec.config.clone())
            .unwrap_or_default(),
    );
    if let Some(own) = &icp.spec.mesh_config {
        merged.merge(Values::from(own.clone()));
    }

    if merged.get("trustDomain").and_then(Value::as_str).unwrap_or_default().is_empty() {
        merged.set("trustDomain", Value::String(DEFAULT_TRUST_DOMAIN.to_string()));
    }
    if let Some(drain) = icp.spec.proxy.as_ref().and_then(|p| p.drain_duration) {
        if merged.get("defaultConfig.drainDuration").is_none() {
            merged.set("defaultConfig.drainDuration", Value::String(drain.to_string()));
        }
    }
    merged.into_map()
}
