//! Component implementations

mod base;
mod cni;
mod discovery;
mod mesh_expansion;
mod mesh_gateway;
mod resource_sync_rule;

pub use base::BaseComponent;
pub use cni::CniComponent;
pub use discovery::DiscoveryComponent;
pub use mesh_expansion::MeshExpansionComponent;
pub use mesh_gateway::MeshGatewayComponent;
pub use resource_sync_rule::ResourceSyncRuleComponent;

use std::sync::Arc;

use meshplane_common::crd::IstioControlPlane;
use meshplane_common::Error;

use crate::component::wrong_kind;
use crate::object::ManagedObject;

/// The control plane wrapped by `object`, or a wrong-kind error
fn control_plane<'a>(
    component: &str,
    object: &'a ManagedObject,
) -> Result<&'a Arc<IstioControlPlane>, Error> {
    match object {
        ManagedObject::ControlPlane(icp) => Ok(icp),
        other => Err(wrong_kind(component, "IstioControlPlane", other)),
    }
}
