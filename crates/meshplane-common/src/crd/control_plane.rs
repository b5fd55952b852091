//! IstioControlPlane CRD
//!
//! One resource describes one revisioned Istio control plane. Its spec is
//! fed to the values templates of the base, CNI, discovery, mesh-expansion
//! and resource-sync-rule charts.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{ResourceRequirements, ServicePort};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::types::{
    preserve_unknown_fields, BaseKubernetesResourceConfig, ConfigState,
    ContainerImageConfiguration, DeploymentConfig, K8sObjectMeta, K8sResourceOverlay,
    ProtoDuration,
};

/// Default trust domain when the mesh config does not set one
pub const DEFAULT_TRUST_DOMAIN: &str = "cluster.local";

/// Spec for an IstioControlPlane
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "servicemesh.cisco.com",
    version = "v1alpha1",
    kind = "IstioControlPlane",
    plural = "istiocontrolplanes",
    shortname = "icp",
    namespaced,
    status = "IstioControlPlaneStatus",
    printcolumn = r#"{"name":"Mode","type":"string","jsonPath":".spec.mode"}"#,
    printcolumn = r#"{"name":"Network","type":"string","jsonPath":".spec.networkName"}"#,
    printcolumn = r#"{"name":"Status","type":"string","jsonPath":".status.status"}"#,
    printcolumn = r#"{"name":"Error","type":"string","jsonPath":".status.errorMessage"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct IstioControlPlaneSpec {
    /// Istio version (`1.11`, `1.11.N` or `1.11.N-qualifier`)
    #[serde(default)]
    pub version: String,

    /// Control plane mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<ControlPlaneMode>,

    /// Control plane logging
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfiguration>,

    /// Mount user supplied CA certificates into istiod
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mount_mtls_certs: Option<bool>,

    /// istiod settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub istiod: Option<IstiodConfiguration>,

    /// Patches applied to rendered objects
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub k8s_resource_overlays: Vec<K8sResourceOverlay>,

    /// Istio mesh config, merged over the referenced IstioMesh config
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "preserve_unknown_fields")]
    pub mesh_config: Option<Map<String, Value>>,

    /// Mesh expansion settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mesh_expansion: Option<MeshExpansionConfiguration>,

    /// Cluster identifier in a multi-cluster mesh
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_id: Option<String>,

    /// Network name in a multi-network mesh
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_name: Option<String>,

    /// JWT policy for service account tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwt_policy: Option<JwtPolicy>,

    /// Sidecar injector settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sidecar_injector: Option<SidecarInjectorConfiguration>,

    /// Sidecar proxy settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<ProxyConfiguration>,

    /// Proxy init settings, including the CNI plugin
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_init: Option<ProxyInitConfiguration>,

    /// Telemetry v2 settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telemetry_v2: Option<TelemetryV2Configuration>,

    /// SDS settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sds: Option<SdsConfiguration>,

    /// Global image defaults
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_image_configuration: Option<ContainerImageConfiguration>,

    /// Name of the IstioMesh in this namespace whose config this control plane uses
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mesh_id: Option<String>,
}

/// Control plane mode
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlPlaneMode {
    /// Runs istiod in this cluster
    #[default]
    Active,
    /// Uses istiod of an active control plane in another cluster
    Passive,
}

/// JWT policy
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JwtPolicy {
    /// Projected service account tokens
    ThirdPartyJwt,
    /// Legacy service account tokens
    FirstPartyJwt,
}

/// Logging configuration
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LoggingConfiguration {
    /// Scoped log levels, e.g. `default:info`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
}

/// istiod configuration
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IstiodConfiguration {
    /// Deployment settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment: Option<DeploymentConfig>,
    /// Enable configuration analysis
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_analysis: Option<bool>,
    /// Write distribution status into config resources
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_status: Option<bool>,
    /// Serve this control plane to remote clusters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_istiod: Option<ExternalIstiodConfiguration>,
    /// Trace sampling percentage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_sampling: Option<f32>,
    /// Outbound protocol sniffing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_protocol_sniffing_outbound: Option<bool>,
    /// Inbound protocol sniffing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_protocol_sniffing_inbound: Option<bool>,
    /// Certificate provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cert_provider: Option<CertProvider>,
}

/// External istiod settings
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExternalIstiodConfiguration {
    /// Whether istiod is exposed to remote clusters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
}

/// Certificate provider for workload certificates
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CertProvider {
    /// istiod's built-in CA
    Istiod,
    /// Kubernetes CSR API
    Kubernetes,
}

/// Mesh expansion configuration
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MeshExpansionConfiguration {
    /// Deploy the mesh expansion gateway
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    /// Mesh expansion gateway settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway: Option<MeshExpansionGateway>,
    /// Expose istiod through the gateway
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub istiod: Option<ExposeConfiguration>,
    /// Expose the injection webhook through the gateway
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook: Option<ExposeConfiguration>,
    /// Expose cluster services through the gateway
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_services: Option<ExposeConfiguration>,
}

impl MeshExpansionConfiguration {
    /// True when the mesh expansion gateway is requested
    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(false)
    }
}

/// Gateway settings for mesh expansion
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MeshExpansionGateway {
    /// Deployment settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment: Option<DeploymentConfig>,
    /// Service settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<ServiceConfig>,
    /// Run the gateway as root
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_as_root: Option<bool>,
}

/// Exposure toggle
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExposeConfiguration {
    /// Expose through the mesh expansion gateway
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expose: Option<bool>,
}

/// Service configuration for gateways
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceConfig {
    /// Service metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<K8sObjectMeta>,
    /// Service type (`ClusterIP`, `NodePort`, `LoadBalancer`)
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub service_type: Option<String>,
    /// Service ports
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<ServicePort>,
    /// Requested load balancer IP
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_balancer_ip: Option<String>,
    /// External traffic policy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_traffic_policy: Option<String>,
    /// Extra selector labels
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub selector: BTreeMap<String, String>,
}

/// Sidecar injector configuration
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SidecarInjectorConfiguration {
    /// Rewrite application HTTP probes through the sidecar
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rewrite_app_http_probe: Option<bool>,
    /// Annotations added to every injected pod
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub injected_annotations: BTreeMap<String, String>,
    /// Custom injection templates
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub templates: Option<SidecarInjectionTemplates>,
}

/// Custom injection templates
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SidecarInjectionTemplates {
    /// Template for regular sidecars
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sidecar: Option<String>,
    /// Template for gateway pods
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway: Option<String>,
}

/// Proxy configuration
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProxyConfiguration {
    /// Proxy image
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Run the proxy privileged
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub privileged: Option<bool>,
    /// Enable core dumps
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_core_dump: Option<bool>,
    /// Proxy log level
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
    /// Per component log levels
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component_log_level: Option<String>,
    /// Cluster DNS domain
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_domain: Option<String>,
    /// Hold application start until the proxy is ready
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hold_application_until_proxy_starts: Option<bool>,
    /// Outbound IP ranges captured by the proxy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_ip_ranges: Option<String>,
    /// Outbound IP ranges bypassing the proxy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude_ip_ranges: Option<String>,
    /// Drain duration on shutdown
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drain_duration: Option<ProtoDuration>,
    /// Proxy compute resources
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,
}

/// Proxy init configuration
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProxyInitConfiguration {
    /// Init container image
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Init container resources
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,
    /// CNI plugin settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cni: Option<CniConfiguration>,
}

/// CNI plugin configuration
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CniConfiguration {
    /// Install the CNI plugin instead of the init container
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    /// Chain onto the existing CNI configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chained: Option<bool>,
    /// CNI binary directory on the host
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bin_dir: Option<String>,
    /// CNI config directory on the host
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conf_dir: Option<String>,
    /// Namespaces excluded from redirection
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude_namespaces: Vec<String>,
    /// Namespaces included in redirection
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub include_namespaces: Vec<String>,
    /// Plugin log level
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
    /// DaemonSet settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub daemonset: Option<BaseKubernetesResourceConfig>,
    /// Race repair settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repair: Option<CniRepairConfiguration>,
}

impl CniConfiguration {
    /// True when the CNI plugin is requested
    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(false)
    }
}

/// CNI race repair configuration
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CniRepairConfiguration {
    /// Enable repair
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    /// Delete broken pods
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete_pods: Option<bool>,
    /// Label broken pods
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_pods: Option<bool>,
}

/// Telemetry v2 configuration
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryV2Configuration {
    /// Enable in-proxy telemetry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
}

/// SDS configuration
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SdsConfiguration {
    /// Audience of the projected token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_audience: Option<String>,
}

/// Status checksums, used to restart workloads when injected config changes
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatusChecksums {
    /// Checksum of the sidecar injection configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sidecar_injector: Option<String>,
    /// Checksum of the effective mesh config
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mesh_config: Option<String>,
}

/// Status of an IstioControlPlane
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IstioControlPlaneStatus {
    /// Reconciliation state
    #[serde(default)]
    pub status: ConfigState,
    /// Reason for the last failure, cleared on success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Checksums of the last applied configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksums: Option<StatusChecksums>,
}

impl IstioControlPlaneSpec {
    /// Effective mode
    pub fn mode(&self) -> ControlPlaneMode {
        self.mode.unwrap_or_default()
    }

    /// True when the mesh expansion gateway is requested
    pub fn mesh_expansion_enabled(&self) -> bool {
        self.mesh_expansion
            .as_ref()
            .is_some_and(MeshExpansionConfiguration::is_enabled)
    }

    /// True when the CNI plugin is requested
    pub fn cni_enabled(&self) -> bool {
        self.proxy_init
            .as_ref()
            .and_then(|p| p.cni.as_ref())
            .is_some_and(CniConfiguration::is_enabled)
    }

    /// Trust domain from the mesh config, or the default
    pub fn trust_domain(&self) -> String {
        self.mesh_config
            .as_ref()
            .and_then(|m| m.get("trustDomain"))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_TRUST_DOMAIN)
            .to_string()
    }

    /// Mutable istiod deployment settings, created on demand
    pub fn istiod_deployment_mut(&mut self) -> &mut DeploymentConfig {
        self.istiod
            .get_or_insert_with(IstiodConfiguration::default)
            .deployment
            .get_or_insert_with(DeploymentConfig::default)
    }
}

impl IstioControlPlane {
    /// Istio revision served by this control plane
    pub fn revision(&self) -> String {
        self.metadata.name.clone().unwrap_or_default()
    }

    /// Revision qualified with the namespace, unique within the cluster
    pub fn namespaced_revision(&self) -> String {
        format!(
            "{}.{}",
            self.revision(),
            self.metadata.namespace.as_deref().unwrap_or_default()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_minimal_resource() {
        let spec: IstioControlPlaneSpec = serde_json::from_value(json!({
            "version": "1.11.1",
            "mode": "ACTIVE",
            "meshExpansion": {"enabled": true},
            "proxyInit": {"cni": {"enabled": true, "chained": true}}
        }))
        .unwrap();
        assert_eq!(spec.version, "1.11.1");
        assert_eq!(spec.mode(), ControlPlaneMode::Active);
        assert!(spec.mesh_expansion_enabled());
        assert!(spec.cni_enabled());
    }

    #[test]
    fn empty_spec_serializes_without_optional_fields() {
        let value = serde_json::to_value(IstioControlPlaneSpec::default()).unwrap();
        assert_eq!(value, json!({"version": ""}));
    }

    #[test]
    fn enums_are_upper_case() {
        let spec = IstioControlPlaneSpec {
            mode: Some(ControlPlaneMode::Passive),
            jwt_policy: Some(JwtPolicy::ThirdPartyJwt),
            ..Default::default()
        };
        let value = serde_json::to_value(&spec).unwrap();
        assert_eq!(value["mode"], "PASSIVE");
        assert_eq!(value["jwtPolicy"], "THIRD_PARTY_JWT");
    }

    #[test]
    fn trust_domain_defaults() {
        let mut spec = IstioControlPlaneSpec::default();
        assert_eq!(spec.trust_domain(), DEFAULT_TRUST_DOMAIN);

        let mut mesh_config = Map::new();
        mesh_config.insert("trustDomain".to_string(), json!("example.org"));
        spec.mesh_config = Some(mesh_config);
        assert_eq!(spec.trust_domain(), "example.org");
    }

    #[test]
    fn revision_is_namespaced() {
        let mut icp = IstioControlPlane::new("cp-v111x", IstioControlPlaneSpec::default());
        icp.metadata.namespace = Some("istio-system".to_string());
        assert_eq!(icp.revision(), "cp-v111x");
        assert_eq!(icp.namespaced_revision(), "cp-v111x.istio-system");
    }

    #[test]
    fn mesh_config_keeps_unknown_fields() {
        let spec: IstioControlPlaneSpec = serde_json::from_value(json!({
            "version": "1.11",
            "meshConfig": {"defaultConfig": {"proxyMetadata": {"ISTIO_META_DNS_CAPTURE": "true"}}}
        }))
        .unwrap();
        let mesh = spec.mesh_config.unwrap();
        assert_eq!(
            mesh["defaultConfig"]["proxyMetadata"]["ISTIO_META_DNS_CAPTURE"],
            "true"
        );
    }
}
