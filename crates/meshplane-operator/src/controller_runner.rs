//! Controller runner - builds controller futures for each resource kind
//!
//! Each `build_*` function returns a Vec of boxed futures that can be composed
//! by the caller. This keeps controller construction pure and testable.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures::StreamExt;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client};

use meshplane_common::crd::{IstioControlPlane, IstioMesh, IstioMeshGateway, MeshGateway};

use crate::controller::mesh::control_planes_for_mesh;
use crate::controller::mesh_gateway::gateways_for_control_plane;
use crate::controller::{control_plane, error_policy, mesh, mesh_gateway, Context};

/// Boxed controller future
pub type ControllerFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Build the IstioControlPlane and IstioMesh controllers
///
/// Control planes are requeued when the IstioMesh named by their `meshId`
/// changes.
pub fn build_control_plane_controllers(
    client: Client,
    ctx: Arc<Context>,
    watch_timeout_secs: u32,
) -> Vec<ControllerFuture> {
    let control_planes: Api<IstioControlPlane> = Api::all(client.clone());
    let meshes: Api<IstioMesh> = Api::all(client);

    let icp_controller = Controller::new(
        control_planes,
        WatcherConfig::default().timeout(watch_timeout_secs),
    );
    let icp_store = icp_controller.store();
    let icp_ctrl = icp_controller
        .watches(
            meshes.clone(),
            WatcherConfig::default().timeout(watch_timeout_secs),
            move |mesh| {
                let affected = control_planes_for_mesh(&mesh, &icp_store.state());
                tracing::debug!(
                    mesh = ?mesh.metadata.name,
                    affected_count = affected.len(),
                    "Triggering re-reconciliation of control planes"
                );
                affected
            },
        )
        .shutdown_on_signal()
        .run(control_plane::reconcile, error_policy, ctx.clone())
        .for_each(log_reconcile_result("IstioControlPlane"));

    let mesh_ctrl = Controller::new(meshes, WatcherConfig::default().timeout(watch_timeout_secs))
        .shutdown_on_signal()
        .run(mesh::reconcile, error_policy, ctx)
        .for_each(log_reconcile_result("IstioMesh"));

    tracing::info!("- IstioControlPlane controller");
    tracing::info!("- IstioMesh controller");

    vec![Box::pin(icp_ctrl), Box::pin(mesh_ctrl)]
}

/// Build the MeshGateway and IstioMeshGateway controllers
///
/// Gateways are requeued when their control plane changes, so that a new
/// injection checksum rolls the gateway pods.
pub fn build_gateway_controllers(
    client: Client,
    ctx: Arc<Context>,
    watch_timeout_secs: u32,
) -> Vec<ControllerFuture> {
    let gateways: Api<MeshGateway> = Api::all(client.clone());
    let istio_gateways: Api<IstioMeshGateway> = Api::all(client.clone());
    let control_planes: Api<IstioControlPlane> = Api::all(client);

    let gw_controller =
        Controller::new(gateways, WatcherConfig::default().timeout(watch_timeout_secs));
    let gw_store = gw_controller.store();
    let gw_ctrl = gw_controller
        .watches(
            control_planes.clone(),
            WatcherConfig::default().timeout(watch_timeout_secs),
            move |icp| {
                gateways_for_control_plane(&icp, &gw_store.state(), |gw: &MeshGateway| {
                    &gw.spec.gateway
                })
            },
        )
        .shutdown_on_signal()
        .run(mesh_gateway::reconcile_mesh_gateway, error_policy, ctx.clone())
        .for_each(log_reconcile_result("MeshGateway"));

    let igw_controller = Controller::new(
        istio_gateways,
        WatcherConfig::default().timeout(watch_timeout_secs),
    );
    let igw_store = igw_controller.store();
    let igw_ctrl = igw_controller
        .watches(
            control_planes,
            WatcherConfig::default().timeout(watch_timeout_secs),
            move |icp| {
                gateways_for_control_plane(&icp, &igw_store.state(), |gw: &IstioMeshGateway| {
                    &gw.spec.gateway
                })
            },
        )
        .shutdown_on_signal()
        .run(mesh_gateway::reconcile_istio_mesh_gateway, error_policy, ctx)
        .for_each(log_reconcile_result("IstioMeshGateway"));

    tracing::info!("- MeshGateway controller");
    tracing::info!("- IstioMeshGateway controller");

    vec![Box::pin(gw_ctrl), Box::pin(igw_ctrl)]
}

/// Creates a closure for logging reconciliation results.
fn log_reconcile_result<T: std::fmt::Debug, E: std::fmt::Debug>(
    controller_name: &'static str,
) -> impl Fn(Result<T, E>) -> std::future::Ready<()> {
    move |result| {
        match result {
            Ok(action) => tracing::debug!(?action, "{} reconciliation completed", controller_name),
            Err(e) => tracing::error!(error = ?e, "{} reconciliation error", controller_name),
        }
        std::future::ready(())
    }
}
