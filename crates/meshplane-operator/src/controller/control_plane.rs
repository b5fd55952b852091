//! IstioControlPlane controller

use std::sync::Arc;

use kube::runtime::controller::Action;
use kube::ResourceExt;
use tracing::{info, instrument, warn};

use meshplane_common::crd::{
    is_reconcile_disabled, ConfigState, IstioControlPlane, IstioControlPlaneStatus, IstioMesh,
    StatusChecksums,
};
use meshplane_common::version::{is_supported_version, SUPPORTED_MAJOR, SUPPORTED_MINOR};
use meshplane_common::Error;
use meshplane_components::{ManagedObject, Properties};

use super::{
    apply_components, ensure_finalizer, failure_message, release_finalizer, remove_components,
    Context, ResourceTarget, RESYNC_INTERVAL,
};

/// Reconcile an IstioControlPlane
#[instrument(skip(icp, ctx), fields(control_plane = %icp.name_any()))]
pub async fn reconcile(icp: Arc<IstioControlPlane>, ctx: Arc<Context>) -> Result<Action, Error> {
    let object = ManagedObject::ControlPlane(icp.clone());
    let target = ResourceTarget::of(&object);
    let current = icp.status.clone().unwrap_or_default();

    if is_reconcile_disabled(icp.metadata.annotations.as_ref()) {
        info!("reconciliation disabled by annotation");
        let checksums = current.checksums.clone();
        update_status(&ctx, &target, &current, ConfigState::Unmanaged, None, checksums).await?;
        return Ok(Action::await_change());
    }

    if object.is_deleting() {
        if icp.finalizers().iter().any(|f| f == super::FINALIZER) {
            let mesh = find_mesh(&ctx, &icp).await?;
            let properties = Properties::for_control_plane(&icp, mesh.as_ref())?;
            remove_components(&ctx, &object, &properties).await?;
            release_finalizer(&ctx, &target, icp.finalizers()).await?;
        }
        return Ok(Action::await_change());
    }

    validate_version(&icp)?;
    ensure_finalizer(&ctx, &target, icp.finalizers()).await?;

    let result = reconcile_releases(&ctx, &icp, &object, &target, &current).await;
    match result {
        Ok(checksums) => {
            update_status(
                &ctx,
                &target,
                &current,
                ConfigState::Available,
                None,
                Some(checksums),
            )
            .await?;
            info!("control plane available");
            Ok(Action::requeue(RESYNC_INTERVAL))
        }
        Err(error) => {
            if let Some(message) = failure_message(&error) {
                let checksums = current.checksums.clone();
                if let Err(e) = update_status(
                    &ctx,
                    &target,
                    &current,
                    ConfigState::ReconcileFailed,
                    Some(message),
                    checksums,
                )
                .await
                {
                    warn!(error = %e, "failed to record reconcile failure");
                }
            }
            Err(error)
        }
    }
}

/// Render and apply every component, returning the checksums to publish
async fn reconcile_releases(
    ctx: &Context,
    icp: &IstioControlPlane,
    object: &ManagedObject,
    target: &ResourceTarget,
    current: &IstioControlPlaneStatus,
) -> Result<StatusChecksums, Error> {
    let mesh = find_mesh(ctx, icp).await?;
    let properties = Properties::for_control_plane(icp, mesh.as_ref())?;
    update_status(
        ctx,
        target,
        current,
        ConfigState::Reconciling,
        None,
        current.checksums.clone(),
    )
    .await?;

    apply_components(ctx, object, &properties).await?;

    Ok(StatusChecksums {
        sidecar_injector: properties.injection_checksum.clone(),
        mesh_config: properties.mesh_config_checksum.clone(),
    })
}

/// The IstioMesh named by `spec.meshId`, in the control plane's namespace
async fn find_mesh(ctx: &Context, icp: &IstioControlPlane) -> Result<Option<IstioMesh>, Error> {
    let Some(mesh_id) = icp.spec.mesh_id.as_deref().filter(|id| !id.is_empty()) else {
        return Ok(None);
    };
    let namespace = icp.namespace().unwrap_or_default();
    let mesh = ctx.client.get_mesh(mesh_id, &namespace).await?;
    if mesh.is_none() {
        warn!(mesh = %mesh_id, "referenced IstioMesh not found, using control plane mesh config only");
    }
    Ok(mesh)
}

/// Reject control planes whose version has no embedded charts
pub fn validate_version(icp: &IstioControlPlane) -> Result<(), Error> {
    let resource = format!(
        "{}/{}",
        icp.namespace().unwrap_or_default(),
        icp.name_any()
    );
    let version = icp.spec.version.trim();
    if version.is_empty() {
        return Err(Error::validation_for_field(
            resource,
            "spec.version",
            "version is required",
        ));
    }
    if !is_supported_version(version) {
        return Err(Error::validation_for_field(
            resource,
            "spec.version",
            format!(
                "unsupported version {}, supported: {}.{}.x",
                version, SUPPORTED_MAJOR, SUPPORTED_MINOR
            ),
        ));
    }
    Ok(())
}

/// Patch the status unless it would not change
async fn update_status(
    ctx: &Context,
    target: &ResourceTarget,
    current: &IstioControlPlaneStatus,
    state: ConfigState,
    error_message: Option<String>,
    checksums: Option<StatusChecksums>,
) -> Result<(), Error> {
    let status = IstioControlPlaneStatus {
        status: state,
        error_message,
        checksums,
    };
    if &status == current {
        return Ok(());
    }
    ctx.client
        .patch_control_plane_status(&target.name, &target.namespace, &status)
        .await
}
