//! Ingress and egress gateways

use meshplane_common::crd::{GatewayConfig, GroupVersionKind};
use meshplane_common::Error;

use crate::charts;
use crate::component::{render_values, wrong_kind, Component};
use crate::object::ManagedObject;
use crate::properties::Properties;
use crate::release::{DesiredState, DesiredStateOverrides, OverrideKey, ReleaseData};

const NAME: &str = "mesh-gateway";
const RELEASE_NAME: &str = "istio-meshgateway";

/// Renders the `meshgateway` chart for MeshGateway and IstioMeshGateway
#[derive(Clone, Copy, Debug, Default)]
pub struct MeshGatewayComponent;

/// With an autoscaler in charge the replica count of the live Deployment is
/// not ours to reset.
fn overrides(gateway: &GatewayConfig) -> DesiredStateOverrides {
    let autoscaled = gateway
        .deployment
        .as_ref()
        .and_then(|d| d.replicas.as_ref())
        .is_some_and(|r| r.max.is_some_and(|max| max > r.min.unwrap_or(1)));
    if !autoscaled {
        return DesiredStateOverrides::default();
    }
    DesiredStateOverrides::default().with(
        OverrideKey::kind(GroupVersionKind::new("apps", "v1", "Deployment")),
        DesiredState::IgnoreFields(vec!["/spec/replicas"]),
    )
}

impl Component for MeshGatewayComponent {
    fn name(&self) -> &'static str {
        NAME
    }

    fn enabled(&self, object: &ManagedObject) -> bool {
        object.gateway().is_some() && !object.is_deleting()
    }

    fn release_data(
        &self,
        object: &ManagedObject,
        properties: &Properties,
    ) -> Result<ReleaseData, Error> {
        let (mut gateway, layers) = match object {
            ManagedObject::MeshGateway(gw) => (gw.spec.gateway.clone(), Vec::new()),
            ManagedObject::IstioMeshGateway(gw) => (
                gw.spec.gateway.clone(),
                gw.spec.k8s_resource_overlays.clone(),
            ),
            other => return Err(wrong_kind(NAME, "MeshGateway", other)),
        };
        if properties.control_plane.is_none() {
            return Err(Error::validation_for(
                object.describe(),
                "gateway properties carry no control plane",
            ));
        }

        if let Some(deployment) = gateway.deployment.as_mut() {
            properties.apply_checksums(&mut deployment.base);
        }

        let values = render_values(charts::MESH_GATEWAY, object, &gateway, properties)?;
        Ok(ReleaseData {
            chart: charts::MESH_GATEWAY,
            values,
            namespace: object.namespace(),
            chart_name: charts::MESH_GATEWAY.name.to_string(),
            release_name: RELEASE_NAME.to_string(),
            overrides: overrides(&gateway),
            layers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use crate::components::test_support;
    use k8s_openapi::api::core::v1::ServicePort;
    use meshplane_common::crd::{
        DeploymentConfig, GatewayType, IstioControlPlane, IstioControlPlaneSpec, IstioMeshGateway,
        IstioMeshGatewaySpec, K8sResourceOverlay, ObjectKey, Replicas, ServiceConfig,
    };
    use serde_json::json;

    fn control_plane() -> IstioControlPlane {
        let mut icp = IstioControlPlane::new("cp-v111x", IstioControlPlaneSpec::default());
        icp.metadata.namespace = Some("istio-system".to_string());
        icp
    }

    fn service() -> ServiceConfig {
        ServiceConfig {
            service_type: Some("LoadBalancer".to_string()),
            ports: vec![ServicePort {
                name: Some("http2".to_string()),
                port: 80,
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    #[test]
    fn renders_gateway_with_control_plane_reference() {
        let config = GatewayConfig {
            gateway_type: GatewayType::Egress,
            service: Some(service()),
            ..Default::default()
        };
        let props = Properties::for_gateway(&config, &control_plane());
        let object = test_support::gateway(config);

        let release = MeshGatewayComponent.release_data(&object, &props).unwrap();
        assert_eq!(release.release_name, "istio-meshgateway");
        assert_eq!(release.chart_name, "meshgateway");
        let values = &release.values;
        assert_eq!(values.get("name"), Some(&json!("ingress")));
        assert_eq!(values.get("type"), Some(&json!("egress")));
        assert_eq!(values.get("revision"), Some(&json!("cp-v111x")));
        assert_eq!(values.get("istioControlPlane.namespace"), Some(&json!("istio-system")));
        assert_eq!(values.get("global.trustDomain"), Some(&json!("cluster.local")));
        assert_eq!(values.get("service.enabled"), Some(&json!(true)));
        assert_eq!(values.get("service.type"), Some(&json!("LoadBalancer")));
        assert_eq!(values.get("service.ports"), Some(&json!([{"name": "http2", "port": 80}])));
        assert!(release.overrides.is_empty());
    }

    #[test]
    fn service_is_omitted_without_ports() {
        let config = GatewayConfig::default();
        let props = Properties::for_gateway(&config, &control_plane());
        let values = MeshGatewayComponent
            .release_data(&test_support::gateway(config), &props)
            .unwrap()
            .values;
        assert!(values.get("service").is_none());
        assert!(values.get("deployment").is_none());
    }

    #[test]
    fn istio_mesh_gateway_carries_overlays() {
        let overlay = K8sResourceOverlay {
            group_version_kind: GroupVersionKind::new("apps", "v1", "Deployment"),
            object_key: ObjectKey {
                name: "egress".to_string(),
                namespace: None,
            },
            patches: vec![],
        };
        let spec = IstioMeshGatewaySpec {
            gateway: GatewayConfig::default(),
            k8s_resource_overlays: vec![overlay.clone()],
        };
        let props = Properties::for_gateway(&spec.gateway, &control_plane());
        let object = ManagedObject::IstioMeshGateway(Arc::new(IstioMeshGateway::new("egress", spec)));
        let release = MeshGatewayComponent.release_data(&object, &props).unwrap();
        assert_eq!(release.layers, vec![overlay]);
    }

    #[test]
    fn autoscaled_gateway_ignores_replica_drift() {
        let config = GatewayConfig {
            deployment: Some(DeploymentConfig {
                replicas: Some(Replicas {
                    min: Some(2),
                    max: Some(5),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        };
        let props = Properties::for_gateway(&config, &control_plane());
        let release = MeshGatewayComponent
            .release_data(&test_support::gateway(config), &props)
            .unwrap();

        let gvk = GroupVersionKind::new("apps", "v1", "Deployment");
        let state = release
            .overrides
            .lookup(&gvk, &ObjectKey::namespaced("ingress", "istio-system"));
        assert!(matches!(
            state,
            Some(DesiredState::IgnoreFields(paths)) if paths == &vec!["/spec/replicas"]
        ));
    }

    #[test]
    fn fixed_replica_count_stays_ours() {
        let config = GatewayConfig {
            deployment: Some(DeploymentConfig {
                replicas: Some(Replicas {
                    min: Some(3),
                    max: Some(3),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        };
        let props = Properties::for_gateway(&config, &control_plane());
        let release = MeshGatewayComponent
            .release_data(&test_support::gateway(config), &props)
            .unwrap();
        assert!(release.overrides.is_empty());
    }

    #[test]
    fn control_plane_is_required() {
        let object = test_support::gateway(GatewayConfig::default());
        let err = MeshGatewayComponent
            .release_data(&object, &Properties::default())
            .unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[test]
    fn control_plane_object_is_rejected() {
        let (object, props) = test_support::control_plane(IstioControlPlaneSpec::default());
        assert!(!MeshGatewayComponent.enabled(&object));
        let err = MeshGatewayComponent.release_data(&object, &props).unwrap_err();
        assert!(matches!(err, Error::WrongResourceKind { .. }));
    }
}
