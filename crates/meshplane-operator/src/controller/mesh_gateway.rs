//! MeshGateway and IstioMeshGateway controller
//!
//! Both kinds share the gateway settings and the release; they differ only
//! in overlays, which the component reads from the object itself.

use std::sync::Arc;

use kube::runtime::controller::Action;
use kube::runtime::reflector::ObjectRef;
use kube::ResourceExt;
use tracing::{info, instrument, warn};

use meshplane_common::crd::{
    is_reconcile_disabled, ConfigState, ConfigStatus, GatewayConfig, IstioControlPlane,
    IstioMeshGateway, MeshGateway,
};
use meshplane_common::Error;
use meshplane_components::{ManagedObject, Properties};

use super::control_plane::validate_version;
use super::{
    apply_components, ensure_finalizer, failure_message, release_finalizer, remove_components,
    Context, ResourceTarget, FINALIZER, RESYNC_INTERVAL,
};

/// Reconcile a MeshGateway
#[instrument(skip(gateway, ctx), fields(gateway = %gateway.name_any()))]
pub async fn reconcile_mesh_gateway(
    gateway: Arc<MeshGateway>,
    ctx: Arc<Context>,
) -> Result<Action, Error> {
    let finalizers = gateway.finalizers().to_vec();
    let status = gateway.status.clone().unwrap_or_default();
    reconcile_gateway(ManagedObject::MeshGateway(gateway), &finalizers, status, &ctx).await
}

/// Reconcile an IstioMeshGateway
#[instrument(skip(gateway, ctx), fields(gateway = %gateway.name_any()))]
pub async fn reconcile_istio_mesh_gateway(
    gateway: Arc<IstioMeshGateway>,
    ctx: Arc<Context>,
) -> Result<Action, Error> {
    let finalizers = gateway.finalizers().to_vec();
    let status = gateway.status.clone().unwrap_or_default();
    reconcile_gateway(ManagedObject::IstioMeshGateway(gateway), &finalizers, status, &ctx).await
}

async fn reconcile_gateway(
    object: ManagedObject,
    finalizers: &[String],
    current: ConfigStatus,
    ctx: &Context,
) -> Result<Action, Error> {
    let target = ResourceTarget::of(&object);
    let Some(gateway) = object.gateway() else {
        return Err(Error::wrong_resource_kind(
            "mesh-gateway",
            "MeshGateway",
            object.describe(),
        ));
    };

    if is_reconcile_disabled(Some(object.annotations())) {
        info!("reconciliation disabled by annotation");
        update_status(ctx, &target, &current, ConfigStatus::with_state(ConfigState::Unmanaged))
            .await?;
        return Ok(Action::await_change());
    }

    if object.is_deleting() {
        if finalizers.iter().any(|f| f == FINALIZER) {
            match resolve_control_plane(ctx, &object, gateway).await {
                Ok(icp) => {
                    let properties = Properties::for_gateway(gateway, &icp);
                    remove_components(ctx, &object, &properties).await?;
                }
                Err(Error::NotFound { .. }) => {
                    warn!("control plane already gone, leaving gateway objects to garbage collection");
                }
                Err(e) => return Err(e),
            }
            release_finalizer(ctx, &target, finalizers).await?;
        }
        return Ok(Action::await_change());
    }

    let result = async {
        let icp = resolve_control_plane(ctx, &object, gateway).await?;
        validate_version(&icp)?;
        ensure_finalizer(ctx, &target, finalizers).await?;
        update_status(ctx, &target, &current, ConfigStatus::with_state(ConfigState::Reconciling))
            .await?;
        let properties = Properties::for_gateway(gateway, &icp);
        apply_components(ctx, &object, &properties).await
    }
    .await;

    match result {
        Ok(()) => {
            update_status(ctx, &target, &current, ConfigStatus::with_state(ConfigState::Available))
                .await?;
            info!("gateway available");
            Ok(Action::requeue(RESYNC_INTERVAL))
        }
        Err(error) => {
            if let Some(message) = failure_message(&error) {
                if let Err(e) =
                    update_status(ctx, &target, &current, ConfigStatus::failed(message)).await
                {
                    warn!(error = %e, "failed to record reconcile failure");
                }
            }
            Err(error)
        }
    }
}

/// The control plane a gateway is attached to
///
/// The reference namespace defaults to the gateway's own. A missing control
/// plane is retryable: it may simply not have been created yet.
async fn resolve_control_plane(
    ctx: &Context,
    object: &ManagedObject,
    gateway: &GatewayConfig,
) -> Result<IstioControlPlane, Error> {
    let reference = gateway
        .istio_control_plane
        .as_ref()
        .filter(|r| !r.name.is_empty())
        .ok_or_else(|| {
            Error::validation_for_field(
                format!("{}/{}", object.namespace(), object.name()),
                "spec.istioControlPlane",
                "control plane reference is required",
            )
        })?;
    let namespace = reference
        .namespace
        .clone()
        .filter(|ns| !ns.is_empty())
        .unwrap_or_else(|| object.namespace());

    ctx.client
        .get_control_plane(&reference.name, &namespace)
        .await?
        .ok_or_else(|| Error::not_found("IstioControlPlane", &reference.name, namespace))
}

/// Gateways of `gateways` attached to `icp`, for requeueing on control plane changes
pub fn gateways_for_control_plane<K>(
    icp: &IstioControlPlane,
    gateways: &[Arc<K>],
    config: impl Fn(&K) -> &GatewayConfig,
) -> Vec<ObjectRef<K>>
where
    K: kube::Resource<DynamicType = ()> + ResourceExt,
{
    let icp_namespace = icp.namespace().unwrap_or_default();
    let icp_name = icp.name_any();
    gateways
        .iter()
        .filter(|gw| {
            let Some(reference) = config(gw).istio_control_plane.as_ref() else {
                return false;
            };
            let namespace = reference
                .namespace
                .clone()
                .filter(|ns| !ns.is_empty())
                .or_else(|| gw.namespace())
                .unwrap_or_default();
            reference.name == icp_name && namespace == icp_namespace
        })
        .map(|gw| ObjectRef::from_obj(gw.as_ref()))
        .collect()
}

async fn update_status(
    ctx: &Context,
    target: &ResourceTarget,
    current: &ConfigStatus,
    status: ConfigStatus,
) -> Result<(), Error> {
    if &status == current {
        return Ok(());
    }
    ctx.client.patch_status(target, &status).await
}
