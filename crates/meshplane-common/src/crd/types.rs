//! Shared types used across the meshplane CRDs

use std::collections::BTreeMap;
use std::time::Duration;

use k8s_openapi::api::core::v1::{
    Affinity, EnvVar, LocalObjectReference, PodSecurityContext, ResourceRequirements,
    SecurityContext, Toleration, Volume, VolumeMount,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

// =============================================================================
// Status
// =============================================================================

/// Reconciliation state reported on every meshplane resource
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ConfigState {
    /// Not yet observed by the operator
    #[default]
    Unspecified,
    /// Observed, no reconcile has run yet
    Created,
    /// A reconcile pass is in progress
    Reconciling,
    /// All releases are applied
    Available,
    /// The last reconcile pass failed; see the error message
    ReconcileFailed,
    /// Opted out of reconciliation through the reconcile annotation
    Unmanaged,
}

impl std::fmt::Display for ConfigState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unspecified => write!(f, "Unspecified"),
            Self::Created => write!(f, "Created"),
            Self::Reconciling => write!(f, "Reconciling"),
            Self::Available => write!(f, "Available"),
            Self::ReconcileFailed => write!(f, "ReconcileFailed"),
            Self::Unmanaged => write!(f, "Unmanaged"),
        }
    }
}

/// Status shared by the mesh and gateway resources
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConfigStatus {
    /// Reconciliation state
    #[serde(default)]
    pub status: ConfigState,
    /// Reason for the last failure, cleared on success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl ConfigStatus {
    /// Status with the given state and no error
    pub fn with_state(status: ConfigState) -> Self {
        Self {
            status,
            error_message: None,
        }
    }

    /// `ReconcileFailed` with a message
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: ConfigState::ReconcileFailed,
            error_message: Some(message.into()),
        }
    }
}

// =============================================================================
// Resource overlays
// =============================================================================

/// Group/version/kind selector for an overlay
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct GroupVersionKind {
    /// API group (empty for the core group)
    #[serde(default)]
    pub group: String,
    /// API version
    #[serde(default)]
    pub version: String,
    /// Kind
    #[serde(default)]
    pub kind: String,
}

impl GroupVersionKind {
    /// Build a selector from parts
    pub fn new(group: impl Into<String>, version: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
            kind: kind.into(),
        }
    }

    /// Selector for a rendered object's `apiVersion` and `kind`
    pub fn from_api_version(api_version: &str, kind: &str) -> Self {
        let (group, version) = crate::kube_utils::parse_api_version(api_version);
        Self {
            group,
            version,
            kind: kind.to_string(),
        }
    }
}

impl std::fmt::Display for GroupVersionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.group.is_empty() {
            write!(f, "{}/{}", self.version, self.kind)
        } else {
            write!(f, "{}/{}/{}", self.group, self.version, self.kind)
        }
    }
}

/// Name and optional namespace of an object
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct ObjectKey {
    /// Object name
    pub name: String,
    /// Object namespace (unset for cluster-scoped objects)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl ObjectKey {
    /// Key for a namespaced object
    pub fn namespaced(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: Some(namespace.into()),
        }
    }

    /// Key for a cluster-scoped object
    pub fn cluster(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: None,
        }
    }
}

/// Reference to a namespaced resource
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NamespacedName {
    /// Resource name
    pub name: String,
    /// Resource namespace (defaults to the referencing resource's namespace)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

/// Overlay patch operation
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OverlayPatchType {
    /// Set the value at the path, creating intermediate objects
    #[default]
    Replace,
    /// Remove the value at the path
    Remove,
}

/// One patch of a resource overlay
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct K8sResourceOverlayPatch {
    /// Patch operation
    #[serde(rename = "type", default)]
    pub patch_type: OverlayPatchType,
    /// Slash separated path into the object (e.g. `/spec/replicas`)
    pub path: String,
    /// Value for `replace`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Parse `value` as YAML instead of using it as a string
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub parse_value: bool,
}

/// User supplied patches for rendered objects
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct K8sResourceOverlay {
    /// Kind of objects to patch
    pub group_version_kind: GroupVersionKind,
    /// Object to patch
    pub object_key: ObjectKey,
    /// Patches applied in order
    #[serde(default)]
    pub patches: Vec<K8sResourceOverlayPatch>,
}

// =============================================================================
// Kubernetes resource configuration
// =============================================================================

/// Labels and annotations for generated objects
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct K8sObjectMeta {
    /// Labels
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// Annotations
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

/// Settings common to every workload the charts render
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BaseKubernetesResourceConfig {
    /// Metadata of the workload object itself
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<K8sObjectMeta>,
    /// Container image override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Extra environment variables
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVar>,
    /// Compute resources
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,
    /// Node selector
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub node_selector: BTreeMap<String, String>,
    /// Affinity rules
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affinity: Option<Affinity>,
    /// Tolerations
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tolerations: Vec<Toleration>,
    /// Pod template metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_metadata: Option<K8sObjectMeta>,
    /// Image pull policy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_pull_policy: Option<String>,
    /// Image pull secrets
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub image_pull_secrets: Vec<LocalObjectReference>,
    /// Priority class
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority_class_name: Option<String>,
    /// Container security context
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_context: Option<SecurityContext>,
    /// Pod security context
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_security_context: Option<PodSecurityContext>,
    /// Extra volumes
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<Volume>,
    /// Extra volume mounts
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volume_mounts: Vec<VolumeMount>,
}

impl BaseKubernetesResourceConfig {
    /// Set a pod template annotation, creating the metadata block if needed
    pub fn set_pod_annotation(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.pod_metadata
            .get_or_insert_with(K8sObjectMeta::default)
            .annotations
            .insert(key.into(), value.into());
    }
}

/// Replica and autoscaling settings
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Replicas {
    /// Fixed replica count
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<i32>,
    /// Autoscaler minimum
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<i32>,
    /// Autoscaler maximum
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<i32>,
    /// Autoscaler CPU target
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_cpu_utilization_percentage: Option<i32>,
}

/// Deployment settings
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentConfig {
    /// Common workload settings
    #[serde(flatten)]
    pub base: BaseKubernetesResourceConfig,
    /// Replicas
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<Replicas>,
}

/// Global image defaults
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContainerImageConfiguration {
    /// Registry and repository prefix
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hub: Option<String>,
    /// Image tag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    /// Image pull policy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_pull_policy: Option<String>,
    /// Image pull secrets
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub image_pull_secrets: Vec<LocalObjectReference>,
}

// =============================================================================
// Durations
// =============================================================================

/// Duration carried as a `"<seconds>s"` string (`"90s"`, `"1.5s"`)
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProtoDuration(pub Duration);

impl ProtoDuration {
    /// Duration from whole seconds
    pub fn from_secs(secs: u64) -> Self {
        Self(Duration::from_secs(secs))
    }
}

impl std::fmt::Display for ProtoDuration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let secs = self.0.as_secs();
        let nanos = self.0.subsec_nanos();
        if nanos == 0 {
            return write!(f, "{}s", secs);
        }
        let frac = format!("{:09}", nanos);
        write!(f, "{}.{}s", secs, frac.trim_end_matches('0'))
    }
}

impl std::str::FromStr for ProtoDuration {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let number = s
            .strip_suffix('s')
            .ok_or_else(|| format!("duration {:?} must end with 's'", s))?;
        let secs: f64 = number
            .parse()
            .map_err(|e| format!("invalid duration {:?}: {}", s, e))?;
        if !secs.is_finite() || secs < 0.0 {
            return Err(format!("invalid duration {:?}: must be non-negative", s));
        }
        Duration::try_from_secs_f64(secs)
            .map(Self)
            .map_err(|e| format!("invalid duration {:?}: {}", s, e))
    }
}

impl Serialize for ProtoDuration {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ProtoDuration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

impl JsonSchema for ProtoDuration {
    fn schema_name() -> String {
        "Duration".to_string()
    }

    fn json_schema(_gen: &mut schemars::gen::SchemaGenerator) -> schemars::schema::Schema {
        schemars::schema::Schema::Object(schemars::schema::SchemaObject {
            instance_type: Some(schemars::schema::InstanceType::String.into()),
            metadata: Some(Box::new(schemars::schema::Metadata {
                description: Some("Duration in seconds with an 's' suffix, e.g. '90s'".to_string()),
                ..Default::default()
            })),
            ..Default::default()
        })
    }
}

/// Schema for free-form objects (mesh config) the API server must not prune
pub fn preserve_unknown_fields(_gen: &mut schemars::gen::SchemaGenerator) -> schemars::schema::Schema {
    let mut schema = schemars::schema::SchemaObject {
        instance_type: Some(schemars::schema::InstanceType::Object.into()),
        ..Default::default()
    };
    schema.extensions.insert(
        "x-kubernetes-preserve-unknown-fields".to_string(),
        serde_json::Value::Bool(true),
    );
    schemars::schema::Schema::Object(schema)
}
