//! The set of components the operator reconciles, built once at startup

use std::sync::Arc;

use crate::component::Component;
use crate::components::{
    BaseComponent, CniComponent, DiscoveryComponent, MeshExpansionComponent,
    MeshGatewayComponent, ResourceSyncRuleComponent,
};
use crate::object::ManagedObject;

/// Operator-wide switches that shape the registry
#[derive(Clone, Copy, Debug, Default)]
pub struct ComponentOptions {
    /// Render resource sync rules for the cluster registry
    pub cluster_registry_enabled: bool,
}

/// Components per resource kind, in reconcile order
#[derive(Clone)]
pub struct ComponentRegistry {
    control_plane: Vec<Arc<dyn Component>>,
    gateway: Vec<Arc<dyn Component>>,
}

impl std::fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names = |c: &[Arc<dyn Component>]| c.iter().map(|c| c.name()).collect::<Vec<_>>();
        f.debug_struct("ComponentRegistry")
            .field("control_plane", &names(&self.control_plane))
            .field("gateway", &names(&self.gateway))
            .finish()
    }
}

impl ComponentRegistry {
    /// Registry with every component
    ///
    /// CRDs come first so that later releases can use Istio kinds.
    pub fn new(options: ComponentOptions) -> Self {
        Self {
            control_plane: vec![
                Arc::new(BaseComponent),
                Arc::new(CniComponent),
                Arc::new(DiscoveryComponent),
                Arc::new(MeshExpansionComponent),
                Arc::new(ResourceSyncRuleComponent::new(
                    options.cluster_registry_enabled,
                )),
            ],
            gateway: vec![Arc::new(MeshGatewayComponent)],
        }
    }

    /// Components that reconcile `object`
    pub fn for_object(&self, object: &ManagedObject) -> &[Arc<dyn Component>] {
        match object {
            ManagedObject::ControlPlane(_) => &self.control_plane,
            ManagedObject::MeshGateway(_) | ManagedObject::IstioMeshGateway(_) => &self.gateway,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::test_support;
    use meshplane_common::crd::IstioControlPlaneSpec;

    #[test]
    fn control_plane_components_in_order() {
        let registry = ComponentRegistry::new(ComponentOptions::default());
        let (object, _) = test_support::control_plane(IstioControlPlaneSpec::default());
        let names: Vec<_> = registry.for_object(&object).iter().map(|c| c.name()).collect();
        assert_eq!(
            names,
            vec!["base", "cni", "discovery", "mesh-expansion", "resource-sync-rule"]
        );
        let enabled: Vec<_> = registry
            .for_object(&object)
            .iter()
            .filter(|c| c.enabled(&object))
            .map(|c| c.name())
            .collect();
        assert_eq!(enabled, vec!["base", "discovery"]);
    }

    #[test]
    fn gateways_use_gateway_component() {
        let registry = ComponentRegistry::new(ComponentOptions {
            cluster_registry_enabled: true,
        });
        let object = test_support::gateway(Default::default());
        let names: Vec<_> = registry.for_object(&object).iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["mesh-gateway"]);
    }
}
