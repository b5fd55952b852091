//! Istio CRDs and cluster-wide RBAC

use meshplane_common::Error;

use super::control_plane;
use crate::charts;
use crate::component::{render_values, Component};
use crate::object::ManagedObject;
use crate::properties::Properties;
use crate::release::{DesiredStateOverrides, ReleaseData};

const NAME: &str = "base";
const RELEASE_NAME: &str = "istio-base";

/// Renders the `base` chart for a control plane
#[derive(Clone, Copy, Debug, Default)]
pub struct BaseComponent;

impl Component for BaseComponent {
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
        let values = render_values(charts::BASE, object, &icp.spec, properties)?;
        Ok(ReleaseData {
            chart: charts::BASE,
            values,
            namespace: object.namespace(),
            chart_name: charts::BASE.name.to_string(),
            release_name: RELEASE_NAME.to_string(),
            overrides: DesiredStateOverrides::default(),
            layers: icp.spec.k8s_resource_overlays.clone(),
        })
    }
}
