//! Istio CNI node agent

use meshplane_common::Error;

use super::control_plane;
use crate::charts;
use crate::component::{render_values, Component};
use crate::object::ManagedObject;
use crate::properties::Properties;
use crate::release::{DesiredStateOverrides, ReleaseData};

const NAME: &str = "cni";
const RELEASE_NAME: &str = "istio-cni";

/// Renders the `cni` chart when `spec.proxyInit.cni.enabled` is set
#[derive(Clone, Copy, Debug, Default)]
pub struct CniComponent;

impl Component for CniComponent {
    fn name(&self) -> &'static str {
        NAME
    }

    fn enabled(&self, object: &ManagedObject) -> bool {
        match object {
            ManagedObject::ControlPlane(icp) => !object.is_deleting() && icp.spec.cni_enabled(),
            _ => false,
        }
    }

    fn release_data(
        &self,
        object: &ManagedObject,
        properties: &Properties,
    ) -> Result<ReleaseData, Error> {
        let icp = control_plane(NAME, object)?;
        let values = render_values(charts::CNI, object, &icp.spec, properties)?;
        Ok(ReleaseData {
            chart: charts::CNI,
            values,
            namespace: object.namespace(),
            chart_name: charts::CNI.name.to_string(),
            release_name: RELEASE_NAME.to_string(),
            overrides: DesiredStateOverrides::default(),
            layers: icp.spec.k8s_resource_overlays.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::test_support;
    use meshplane_common::crd::{
        BaseKubernetesResourceConfig, CniConfiguration, IstioControlPlaneSpec,
        ProxyInitConfiguration,
    };
    use serde_json::json;

    fn spec(cni: CniConfiguration) -> IstioControlPlaneSpec {
        IstioControlPlaneSpec {
            proxy_init: Some(ProxyInitConfiguration {
                cni: Some(cni),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn enabled_only_with_cni_flag() {
        let (object, _) = test_support::control_plane(IstioControlPlaneSpec::default());
        assert!(!CniComponent.enabled(&object));

        let (object, _) = test_support::control_plane(spec(CniConfiguration {
            enabled: Some(true),
            ..Default::default()
        }));
        assert!(CniComponent.enabled(&object));
    }

    #[test]
    fn renders_cni_settings() {
        let (object, props) = test_support::control_plane(spec(CniConfiguration {
            enabled: Some(true),
            chained: Some(true),
            bin_dir: Some("/opt/cni/bin".to_string()),
            exclude_namespaces: vec!["kube-system".to_string()],
            daemonset: Some(BaseKubernetesResourceConfig {
                priority_class_name: Some("system-node-critical".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        }));
        let release = CniComponent.release_data(&object, &props).unwrap();
        assert_eq!(release.release_name, "istio-cni");
        assert_eq!(release.values.get("cni.chained"), Some(&json!(true)));
        assert_eq!(release.values.get("cni.cniBinDir"), Some(&json!("/opt/cni/bin")));
        assert_eq!(release.values.get("cni.excludeNamespaces"), Some(&json!(["kube-system"])));
        assert_eq!(
            release.values.get("cni.priorityClassName"),
            Some(&json!("system-node-critical"))
        );
        assert!(release.values.get("cni.repair").is_none());
        assert!(release.values.get("cni.enabled").is_none());
    }
}
