//! istiod, the sidecar injector and the mesh config

use std::sync::Arc;

use meshplane_common::crd::{ControlPlaneMode, GroupVersionKind};
use meshplane_common::Error;
use meshplane_diff::IgnoreWebhookFailurePolicy;

use super::control_plane;
use crate::charts;
use crate::component::{render_values, Component};
use crate::object::ManagedObject;
use crate::properties::Properties;
use crate::release::{DesiredState, DesiredStateOverrides, OverrideKey, ReleaseData};

const NAME: &str = "discovery";
const RELEASE_NAME: &str = "istio-discovery";

const ADMISSION_GROUP: &str = "admissionregistration.k8s.io";

/// Renders the `discovery` chart for a control plane
///
/// istiod patches the failure policy of its own webhooks once it is ready,
/// so both webhook kinds ignore `failurePolicy` differences.
#[derive(Clone, Copy, Debug, Default)]
pub struct DiscoveryComponent;

fn webhook_overrides() -> DesiredStateOverrides {
    let ignore_failure_policy =
        DesiredState::CalculateOptions(vec![Arc::new(IgnoreWebhookFailurePolicy)]);
    DesiredStateOverrides::default()
        .with(
            OverrideKey::kind(GroupVersionKind::new(
                ADMISSION_GROUP,
                "v1",
                "ValidatingWebhookConfiguration",
            )),
            ignore_failure_policy.clone(),
        )
        .with(
            OverrideKey::kind(GroupVersionKind::new(
                ADMISSION_GROUP,
                "v1",
                "MutatingWebhookConfiguration",
            )),
            ignore_failure_policy,
        )
}

impl Component for DiscoveryComponent {
    fn name(&self) -> &'static str {
        NAME
    }

    fn enabled(&self, object: &ManagedObject) -> bool {
        matches!(object, ManagedObject::ControlPlane(_)) && !object.is_deleting()
    }

    fn release_data(
        &self,
        object: &ManagedObject,
        properties: &Properties,
    ) -> Result<ReleaseData, Error> {
        let icp = control_plane(NAME, object)?;

        let mut spec = icp.spec.clone();
        if spec.mode() == ControlPlaneMode::Active {
            properties.apply_checksums(&mut spec.istiod_deployment_mut().base);
        }

        let values = render_values(charts::DISCOVERY, object, &spec, properties)?;
        Ok(ReleaseData {
            chart: charts::DISCOVERY,
            values,
            namespace: object.namespace(),
            chart_name: charts::DISCOVERY.name.to_string(),
            release_name: RELEASE_NAME.to_string(),
            overrides: webhook_overrides(),
            layers: spec.k8s_resource_overlays,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::test_support;
    use meshplane_common::crd::{
        ContainerImageConfiguration, DeploymentConfig, IstioControlPlaneSpec,
        IstiodConfiguration, JwtPolicy, ObjectKey, ProxyConfiguration, Replicas,
        SidecarInjectionTemplates, SidecarInjectorConfiguration,
    };
    use meshplane_common::{INJECTION_CHECKSUM_ANNOTATION, MESH_CONFIG_CHECKSUM_ANNOTATION};
    use k8s_openapi::api::core::v1::ResourceRequirements;
    use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
    use serde_json::json;
    use std::collections::BTreeMap;

    #[test]
    fn minimal_spec_omits_unset_fields() {
        let (object, props) = test_support::control_plane(IstioControlPlaneSpec {
            version: "1.11.1".to_string(),
            ..Default::default()
        });
        let release = DiscoveryComponent.release_data(&object, &props).unwrap();
        let values = &release.values;

        assert_eq!(values.get("revision"), Some(&json!("cp-v111x")));
        assert_eq!(values.get("global.istioNamespace"), Some(&json!("istio-system")));
        for absent in [
            "global.hub",
            "global.jwtPolicy",
            "global.proxy",
            "global.logging",
            "global.multiCluster",
            "sidecarInjectorWebhook",
            "telemetry",
            "istiodRemote",
            "pilot.replicaCount",
            "pilot.resources",
            "pilot.enabled",
        ] {
            assert!(values.get(absent).is_none(), "{absent} should be omitted: {values:?}");
        }
        assert_eq!(values.get("meshConfig.trustDomain"), Some(&json!("cluster.local")));
    }

    #[test]
    fn checksums_land_in_istiod_pod_annotations() {
        let (object, props) = test_support::control_plane(IstioControlPlaneSpec::default());
        let release = DiscoveryComponent.release_data(&object, &props).unwrap();
        let annotations = release.values.get("pilot.podAnnotations").unwrap();
        assert_eq!(
            annotations[INJECTION_CHECKSUM_ANNOTATION].as_str(),
            props.injection_checksum.as_deref()
        );
        assert_eq!(
            annotations[MESH_CONFIG_CHECKSUM_ANNOTATION].as_str(),
            props.mesh_config_checksum.as_deref()
        );
    }

    #[test]
    fn renders_istiod_and_proxy_settings() {
        let mut limits = BTreeMap::new();
        limits.insert("memory".to_string(), Quantity("1Gi".to_string()));
        let (object, props) = test_support::control_plane(IstioControlPlaneSpec {
            jwt_policy: Some(JwtPolicy::FirstPartyJwt),
            cluster_id: Some("cluster-a".to_string()),
            container_image_configuration: Some(ContainerImageConfiguration {
                hub: Some("gcr.io/istio-release".to_string()),
                tag: Some("1.11.4".to_string()),
                ..Default::default()
            }),
            istiod: Some(IstiodConfiguration {
                deployment: Some(DeploymentConfig {
                    replicas: Some(Replicas {
                        count: Some(2),
                        ..Default::default()
                    }),
                    ..Default::default()
                }),
                enable_protocol_sniffing_outbound: Some(false),
                ..Default::default()
            }),
            proxy: Some(ProxyConfiguration {
                log_level: Some("warning".to_string()),
                hold_application_until_proxy_starts: Some(true),
                resources: Some(ResourceRequirements {
                    limits: Some(limits),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            sidecar_injector: Some(SidecarInjectorConfiguration {
                templates: Some(SidecarInjectionTemplates {
                    sidecar: Some("spec:\n  containers: []\n".to_string()),
                    gateway: None,
                }),
                ..Default::default()
            }),
            ..Default::default()
        });
        let values = DiscoveryComponent.release_data(&object, &props).unwrap().values;

        assert_eq!(values.get("global.jwtPolicy"), Some(&json!("first-party-jwt")));
        assert_eq!(values.get("global.multiCluster.clusterName"), Some(&json!("cluster-a")));
        assert_eq!(values.get("global.hub"), Some(&json!("gcr.io/istio-release")));
        assert_eq!(values.get("global.tag"), Some(&json!("1.11.4")));
        assert_eq!(values.get("global.proxy.logLevel"), Some(&json!("warning")));
        assert_eq!(
            values.get("global.proxy.holdApplicationUntilProxyStarts"),
            Some(&json!(true))
        );
        assert_eq!(values.get("global.proxy.resources.limits.memory"), Some(&json!("1Gi")));
        assert_eq!(values.get("pilot.replicaCount"), Some(&json!(2)));
        assert!(values.get("pilot.enableProtocolSniffingForOutbound").is_none());
        assert_eq!(
            values.get("sidecarInjectorWebhook.templates.sidecar"),
            Some(&json!("spec:\n  containers: []\n"))
        );
    }

    #[test]
    fn passive_mode_uses_remote_istiod() {
        let (object, props) = test_support::control_plane(IstioControlPlaneSpec {
            mode: Some(ControlPlaneMode::Passive),
            ..Default::default()
        });
        let values = DiscoveryComponent.release_data(&object, &props).unwrap().values;
        assert_eq!(values.get("pilot.enabled"), Some(&json!(false)));
        assert_eq!(values.get("istiodRemote.enabled"), Some(&json!(true)));
        assert!(values.get("pilot.podAnnotations").is_none());
    }

    #[test]
    fn webhooks_ignore_failure_policy() {
        let (object, props) = test_support::control_plane(IstioControlPlaneSpec::default());
        let release = DiscoveryComponent.release_data(&object, &props).unwrap();
        for kind in ["ValidatingWebhookConfiguration", "MutatingWebhookConfiguration"] {
            let gvk = GroupVersionKind::new(ADMISSION_GROUP, "v1", kind);
            let state = release
                .overrides
                .lookup(&gvk, &ObjectKey::cluster("istio-sidecar-injector-cp-v111x-istio-system"));
            match state {
                Some(DesiredState::CalculateOptions(options)) => {
                    assert_eq!(options[0].name(), "ignore_webhook_failure_policy")
                }
                other => panic!("unexpected override for {kind}: {other:?}"),
            }
        }
    }

    #[test]
    fn wrong_kind_is_rejected() {
        let object = test_support::gateway(Default::default());
        let err = DiscoveryComponent
            .release_data(&object, &Properties::default())
            .unwrap_err();
        assert!(matches!(err, Error::WrongResourceKind { .. }));
        assert!(err.to_string().contains("MeshGateway istio-system/ingress"));
        assert!(!err.is_retryable());
    }
}
