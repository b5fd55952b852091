//! IstioMesh controller
//!
//! An IstioMesh renders nothing itself. Its config is merged into the mesh
//! config of every control plane whose `meshId` names it, so changes are
//! propagated by requeueing those control planes.

use std::sync::Arc;

use kube::runtime::controller::Action;
use kube::runtime::reflector::ObjectRef;
use kube::ResourceExt;
use tracing::{info, instrument};

use meshplane_common::crd::{
    is_reconcile_disabled, ConfigState, ConfigStatus, IstioControlPlane, IstioMesh,
};
use meshplane_common::Error;

use super::{Context, ResourceKind, ResourceTarget};

/// Reconcile an IstioMesh
#[instrument(skip(mesh, ctx), fields(mesh = %mesh.name_any()))]
pub async fn reconcile(mesh: Arc<IstioMesh>, ctx: Arc<Context>) -> Result<Action, Error> {
    let target = ResourceTarget {
        kind: ResourceKind::Mesh,
        name: mesh.name_any(),
        namespace: mesh.namespace().unwrap_or_default(),
    };
    let state = if is_reconcile_disabled(mesh.metadata.annotations.as_ref()) {
        info!("reconciliation disabled by annotation");
        ConfigState::Unmanaged
    } else {
        ConfigState::Available
    };

    let status = ConfigStatus::with_state(state);
    if mesh.status.as_ref() != Some(&status) {
        ctx.client.patch_status(&target, &status).await?;
    }
    Ok(Action::await_change())
}

/// Control planes in the mesh's namespace whose `meshId` names it
pub fn control_planes_for_mesh(
    mesh: &IstioMesh,
    control_planes: &[Arc<IstioControlPlane>],
) -> Vec<ObjectRef<IstioControlPlane>> {
    let name = mesh.name_any();
    let namespace = mesh.namespace();
    control_planes
        .iter()
        .filter(|icp| icp.namespace() == namespace)
        .filter(|icp| icp.spec.mesh_id.as_deref() == Some(name.as_str()))
        .map(|icp| ObjectRef::from_obj(icp.as_ref()))
        .collect()
}
