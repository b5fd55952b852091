//! IstioMesh CRD
//!
//! Mesh-wide config shared by every control plane whose `meshId` names
//! this resource.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::types::{preserve_unknown_fields, ConfigStatus};

/// Spec for an IstioMesh
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "servicemesh.cisco.com",
    version = "v1alpha1",
    kind = "IstioMesh",
    plural = "istiomeshes",
    shortname = "im",
    namespaced,
    status = "ConfigStatus",
    printcolumn = r#"{"name":"Status","type":"string","jsonPath":".status.status"}"#,
    printcolumn = r#"{"name":"Error","type":"string","jsonPath":".status.errorMessage"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct IstioMeshSpec {
    /// Istio mesh config
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "preserve_unknown_fields")]
    pub config: Option<Map<String, Value>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn config_is_free_form() {
        let spec: IstioMeshSpec = serde_json::from_value(json!({
            "config": {"enableAutoMtls": true, "outboundTrafficPolicy": {"mode": "REGISTRY_ONLY"}}
        }))
        .unwrap();
        let config = spec.config.unwrap();
        assert_eq!(config["outboundTrafficPolicy"]["mode"], "REGISTRY_ONLY");
    }
}
