//! Mesh expansion gateway exposing istiod, webhooks and cluster services

use meshplane_common::Error;

use super::control_plane;
use crate::charts;
use crate::component::{render_values, Component};
use crate::object::ManagedObject;
use crate::properties::Properties;
use crate::release::{DesiredStateOverrides, ReleaseData};

const NAME: &str = "mesh-expansion";
const RELEASE_NAME: &str = "istio-meshexpansion";

/// Renders the `istio-meshexpansion` chart when `spec.meshExpansion.enabled`
/// is set
///
/// A passive control plane has no istiod of its own, so the template never
/// exposes istiod for it.
#[derive(Clone, Copy, Debug, Default)]
pub struct MeshExpansionComponent;

impl Component for MeshExpansionComponent {
    fn name(&self) -> &'static str {
        NAME
    }

    fn enabled(&self, object: &ManagedObject) -> bool {
        match object {
            ManagedObject::ControlPlane(icp) => {
                !object.is_deleting() && icp.spec.mesh_expansion_enabled()
            }
            _ => false,
        }
    }

    fn release_data(
        &self,
        object: &ManagedObject,
        properties: &Properties,
    ) -> Result<ReleaseData, Error> {
        let icp = control_plane(NAME, object)?;

        let mut spec = icp.spec.clone();
        if let Some(deployment) = spec
            .mesh_expansion
            .as_mut()
            .and_then(|m| m.gateway.as_mut())
            .and_then(|g| g.deployment.as_mut())
        {
            properties.apply_checksums(&mut deployment.base);
        }

        let values = render_values(charts::MESH_EXPANSION, object, &spec, properties)?;
        Ok(ReleaseData {
            chart: charts::MESH_EXPANSION,
            values,
            namespace: object.namespace(),
            chart_name: charts::MESH_EXPANSION.name.to_string(),
            release_name: RELEASE_NAME.to_string(),
            overrides: DesiredStateOverrides::default(),
            layers: spec.k8s_resource_overlays,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::test_support;
    use meshplane_common::crd::{
        ControlPlaneMode, ExposeConfiguration, IstioControlPlaneSpec, MeshExpansionConfiguration,
    };
    use rstest::rstest;
    use serde_json::json;

    fn expansion(enabled: bool, mode: ControlPlaneMode) -> IstioControlPlaneSpec {
        IstioControlPlaneSpec {
            version: "1.11.4".to_string(),
            mode: Some(mode),
            mesh_expansion: Some(MeshExpansionConfiguration {
                enabled: Some(enabled),
                istiod: Some(ExposeConfiguration { expose: Some(true) }),
                webhook: Some(ExposeConfiguration { expose: Some(true) }),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[rstest]
    #[case(true, true)]
    #[case(false, false)]
    fn enabled_follows_flag(#[case] flag: bool, #[case] expected: bool) {
        let (object, _) = test_support::control_plane(expansion(flag, ControlPlaneMode::Active));
        assert_eq!(MeshExpansionComponent.enabled(&object), expected);
    }

    #[test]
    fn release_uses_meshexpansion_names() {
        let (object, props) = test_support::control_plane(expansion(true, ControlPlaneMode::Active));
        assert!(MeshExpansionComponent.enabled(&object));

        let release = MeshExpansionComponent.release_data(&object, &props).unwrap();
        assert_eq!(release.release_name, "istio-meshexpansion");
        assert_eq!(release.chart_name, "istio-meshexpansion");
        assert_eq!(release.namespace, "istio-system");
        assert_eq!(release.values.get("expose.istiod"), Some(&json!(true)));
        assert_eq!(release.values.get("expose.webhook"), Some(&json!(true)));
        assert!(release.values.get("expose.clusterServices").is_none());
        assert_eq!(release.values.get("istioControlPlane.name"), Some(&json!("cp-v111x")));
    }

    #[test]
    fn passive_control_plane_does_not_expose_istiod() {
        let (object, props) = test_support::control_plane(expansion(true, ControlPlaneMode::Passive));
        let values = MeshExpansionComponent.release_data(&object, &props).unwrap().values;
        assert!(values.get("expose.istiod").is_none());
        assert_eq!(values.get("expose.webhook"), Some(&json!(true)));
    }

    #[test]
    fn rendering_twice_is_identical() {
        let (object, props) = test_support::control_plane(expansion(true, ControlPlaneMode::Active));
        let first = MeshExpansionComponent.release_data(&object, &props).unwrap();
        let second = MeshExpansionComponent.release_data(&object, &props).unwrap();
        assert_eq!(first.values, second.values);
    }
}
