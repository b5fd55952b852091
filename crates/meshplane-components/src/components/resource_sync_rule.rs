//! Cluster registry resource sync rules for a control plane

use meshplane_common::Error;

use super::control_plane;
use crate::charts;
use crate::component::{render_values, Component};
use crate::object::ManagedObject;
use crate::properties::Properties;
use crate::release::{DesiredStateOverrides, ReleaseData};

const NAME: &str = "resource-sync-rule";

/// Renders the `resource-sync-rule` chart when the operator runs with the
/// cluster registry integration
#[derive(Clone, Copy, Debug)]
pub struct ResourceSyncRuleComponent {
    cluster_registry_enabled: bool,
}

impl ResourceSyncRuleComponent {
    /// Component gated by the operator-wide cluster registry flag
    pub fn new(cluster_registry_enabled: bool) -> Self {
        Self {
            cluster_registry_enabled,
        }
    }
}

impl Component for ResourceSyncRuleComponent {
    fn name(&self) -> &'static str {
        NAME
    }

    fn enabled(&self, object: &ManagedObject) -> bool {
        self.cluster_registry_enabled
            && matches!(object, ManagedObject::ControlPlane(_))
            && !object.is_deleting()
    }

    fn release_data(
        &self,
        object: &ManagedObject,
        properties: &Properties,
    ) -> Result<ReleaseData, Error> {
        let icp = control_plane(NAME, object)?;
        let values = render_values(charts::RESOURCE_SYNC_RULE, object, &icp.spec, properties)?;
        Ok(ReleaseData {
            chart: charts::RESOURCE_SYNC_RULE,
            values,
            namespace: object.namespace(),
            chart_name: charts::RESOURCE_SYNC_RULE.name.to_string(),
            release_name: NAME.to_string(),
            overrides: DesiredStateOverrides::default(),
            layers: Vec::new(),
        })
    }
}
