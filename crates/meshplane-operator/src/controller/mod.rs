//! Controllers for the meshplane custom resources
//!
//! Every controller follows the same shape: honor the reconcile opt-out
//! annotation, clean up behind a finalizer on deletion, validate, mark the
//! resource `Reconciling`, reconcile each component's release and report
//! `Available` or `ReconcileFailed`.

pub mod control_plane;
pub mod mesh;
pub mod mesh_gateway;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kube::api::{Api, DynamicObject, Patch, PatchParams};
use kube::discovery::ApiResource;
use kube::runtime::controller::Action;
use kube::Client;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

#[cfg(test)]
use mockall::automock;

use meshplane_common::crd::{
    ConfigStatus, IstioControlPlane, IstioControlPlaneStatus, IstioMesh, IstioMeshGateway,
    MeshGateway,
};
use meshplane_common::kube_utils::patch_resource_status;
use meshplane_common::{Error, FIELD_MANAGER};
use meshplane_components::{ComponentRegistry, ManagedObject, Properties};

use crate::reconciler::{ReleaseOwner, ReleaseReconciler};

/// Finalizer guarding cleanup of rendered cluster-scoped objects
pub const FINALIZER: &str = "servicemesh.cisco.com/finalizer";

/// Periodic resync so drift in rendered objects gets corrected
pub const RESYNC_INTERVAL: Duration = Duration::from_secs(300);

/// Requeue delay after a retryable failure
pub const RETRY_INTERVAL: Duration = Duration::from_secs(30);

// =============================================================================
// Kubernetes access
// =============================================================================

/// Kinds the operator writes status and finalizers for
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResourceKind {
    /// IstioControlPlane
    ControlPlane,
    /// IstioMesh
    Mesh,
    /// MeshGateway
    MeshGateway,
    /// IstioMeshGateway
    IstioMeshGateway,
}

impl ResourceKind {
    fn api_resource(self) -> ApiResource {
        match self {
            Self::ControlPlane => ApiResource::erase::<IstioControlPlane>(&()),
            Self::Mesh => ApiResource::erase::<IstioMesh>(&()),
            Self::MeshGateway => ApiResource::erase::<MeshGateway>(&()),
            Self::IstioMeshGateway => ApiResource::erase::<IstioMeshGateway>(&()),
        }
    }
}

/// A namespaced meshplane resource
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceTarget {
    /// Resource kind
    pub kind: ResourceKind,
    /// Resource name
    pub name: String,
    /// Resource namespace
    pub namespace: String,
}

impl ResourceTarget {
    /// Target for a managed object
    pub fn of(object: &ManagedObject) -> Self {
        let kind = match object {
            ManagedObject::ControlPlane(_) => ResourceKind::ControlPlane,
            ManagedObject::MeshGateway(_) => ResourceKind::MeshGateway,
            ManagedObject::IstioMeshGateway(_) => ResourceKind::IstioMeshGateway,
        };
        Self {
            kind,
            name: object.name(),
            namespace: object.namespace(),
        }
    }
}

/// Trait abstracting the Kubernetes operations of the controllers
#[cfg_attr(test, automock)]
#[async_trait]
pub trait MeshKubeClient: Send + Sync {
    /// Get an IstioControlPlane by name and namespace
    async fn get_control_plane(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<Option<IstioControlPlane>, Error>;

    /// Get an IstioMesh by name and namespace
    async fn get_mesh(&self, name: &str, namespace: &str) -> Result<Option<IstioMesh>, Error>;

    /// Patch the status of an IstioControlPlane
    async fn patch_control_plane_status(
        &self,
        name: &str,
        namespace: &str,
        status: &IstioControlPlaneStatus,
    ) -> Result<(), Error>;

    /// Patch the status of a mesh or gateway resource
    async fn patch_status(&self, target: &ResourceTarget, status: &ConfigStatus)
        -> Result<(), Error>;

    /// Replace the finalizer list of a resource
    async fn patch_finalizers(
        &self,
        target: &ResourceTarget,
        finalizers: &[String],
    ) -> Result<(), Error>;
}

/// Real Kubernetes client implementation
pub struct MeshKubeClientImpl {
    client: Client,
}

impl MeshKubeClientImpl {
    /// Wrap a kube client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl MeshKubeClient for MeshKubeClientImpl {
    async fn get_control_plane(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<Option<IstioControlPlane>, Error> {
        let api: Api<IstioControlPlane> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn get_mesh(&self, name: &str, namespace: &str) -> Result<Option<IstioMesh>, Error> {
        let api: Api<IstioMesh> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn patch_control_plane_status(
        &self,
        name: &str,
        namespace: &str,
        status: &IstioControlPlaneStatus,
    ) -> Result<(), Error> {
        patch_resource_status::<IstioControlPlane>(
            &self.client,
            name,
            namespace,
            status,
            FIELD_MANAGER,
        )
        .await?;
        Ok(())
    }

    async fn patch_status(
        &self,
        target: &ResourceTarget,
        status: &ConfigStatus,
    ) -> Result<(), Error> {
        let (name, namespace) = (target.name.as_str(), target.namespace.as_str());
        match target.kind {
            ResourceKind::Mesh => {
                patch_resource_status::<IstioMesh>(&self.client, name, namespace, status, FIELD_MANAGER)
                    .await?
            }
            ResourceKind::MeshGateway => {
                patch_resource_status::<MeshGateway>(
                    &self.client,
                    name,
                    namespace,
                    status,
                    FIELD_MANAGER,
                )
                .await?
            }
            ResourceKind::IstioMeshGateway => {
                patch_resource_status::<IstioMeshGateway>(
                    &self.client,
                    name,
                    namespace,
                    status,
                    FIELD_MANAGER,
                )
                .await?
            }
            ResourceKind::ControlPlane => {
                return Err(Error::internal_with_context(
                    "patch_status",
                    "control plane status carries checksums, use patch_control_plane_status",
                ))
            }
        }
        Ok(())
    }

    async fn patch_finalizers(
        &self,
        target: &ResourceTarget,
        finalizers: &[String],
    ) -> Result<(), Error> {
        let api: Api<DynamicObject> = Api::namespaced_with(
            self.client.clone(),
            &target.namespace,
            &target.kind.api_resource(),
        );
        let patch = serde_json::json!({
            "metadata": {
                "finalizers": finalizers
            }
        });
        api.patch(
            &target.name,
            &PatchParams::apply(FIELD_MANAGER),
            &Patch::Merge(&patch),
        )
        .await?;
        Ok(())
    }
}

// =============================================================================
// Context
// =============================================================================

/// Shared state of every controller
pub struct Context {
    /// Kubernetes access for status, finalizers and lookups
    pub client: Arc<dyn MeshKubeClient>,
    /// Components per resource kind
    pub registry: ComponentRegistry,
    /// Renders and applies releases
    pub releases: Arc<ReleaseReconciler>,
    /// Cancelled on shutdown
    pub cancel: CancellationToken,
}

impl Context {
    /// Create a context
    pub fn new(
        client: Arc<dyn MeshKubeClient>,
        registry: ComponentRegistry,
        releases: Arc<ReleaseReconciler>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            client,
            registry,
            releases,
            cancel,
        }
    }
}

// =============================================================================
// Shared reconcile steps
// =============================================================================

/// Add the finalizer when it is missing
pub(crate) async fn ensure_finalizer(
    ctx: &Context,
    target: &ResourceTarget,
    finalizers: &[String],
) -> Result<(), Error> {
    if finalizers.iter().any(|f| f == FINALIZER) {
        return Ok(());
    }
    let mut updated = finalizers.to_vec();
    updated.push(FINALIZER.to_string());
    ctx.client.patch_finalizers(target, &updated).await?;
    debug!(resource = %target.name, "added finalizer");
    Ok(())
}

/// Drop the finalizer so deletion can complete
pub(crate) async fn release_finalizer(
    ctx: &Context,
    target: &ResourceTarget,
    finalizers: &[String],
) -> Result<(), Error> {
    if !finalizers.iter().any(|f| f == FINALIZER) {
        return Ok(());
    }
    let remaining: Vec<String> = finalizers
        .iter()
        .filter(|f| *f != FINALIZER)
        .cloned()
        .collect();
    ctx.client.patch_finalizers(target, &remaining).await
}

/// Reconcile every component of `object`: enabled releases are applied,
/// disabled ones removed
pub(crate) async fn apply_components(
    ctx: &Context,
    object: &ManagedObject,
    properties: &Properties,
) -> Result<(), Error> {
    let owner = ReleaseOwner::of(object);
    for component in ctx.registry.for_object(object) {
        let release = component.release_data(object, properties)?;
        if component.enabled(object) {
            ctx.releases.reconcile(&release, &owner, &ctx.cancel).await?;
        } else {
            let removed = ctx.releases.remove(&release, &owner, &ctx.cancel).await?;
            if removed > 0 {
                info!(
                    component = component.name(),
                    release = %release.release_name,
                    removed,
                    "removed disabled component"
                );
            }
        }
    }
    Ok(())
}

/// Remove every component of `object`, last reconciled first
pub(crate) async fn remove_components(
    ctx: &Context,
    object: &ManagedObject,
    properties: &Properties,
) -> Result<(), Error> {
    let owner = ReleaseOwner::of(object);
    for component in ctx.registry.for_object(object).iter().rev() {
        let release = component.release_data(object, properties)?;
        ctx.releases.remove(&release, &owner, &ctx.cancel).await?;
    }
    info!(resource = %object.describe(), "removed all components");
    Ok(())
}

/// Status message for a failed reconcile, `None` when status stays untouched
///
/// Validation failures leave the status alone: the resource has to change
/// before anything else can happen.
pub(crate) fn failure_message(error: &Error) -> Option<String> {
    match error {
        Error::Validation { .. } => None,
        other => Some(other.to_string()),
    }
}

/// Error policy shared by all controllers
///
/// Retryable errors requeue after [`RETRY_INTERVAL`]; anything else waits
/// for the resource to change.
pub fn error_policy<K>(object: Arc<K>, error: &Error, _ctx: Arc<Context>) -> Action
where
    K: kube::Resource,
{
    let name = object.meta().name.clone().unwrap_or_default();
    error!(
        ?error,
        resource = %name,
        retryable = error.is_retryable(),
        "reconciliation failed"
    );
    if error.is_retryable() {
        Action::requeue(RETRY_INTERVAL)
    } else {
        Action::await_change()
    }
}
