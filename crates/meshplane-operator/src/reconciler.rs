//! Release reconciler
//!
//! Renders a release, prepares every object (namespace, overlays, ownership
//! labels and references), then compares each one against its live
//! counterpart and applies it with server-side apply when they differ.
//! Every object is attempted; failures are collected into a single error.

use std::borrow::Cow;
use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::{Api, DeleteParams, DynamicObject, Patch, PatchParams};
use kube::discovery::ApiResource;
use kube::{Client, Resource};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[cfg(test)]
use mockall::automock;

use meshplane_common::crd::{GroupVersionKind, ObjectKey};
use meshplane_common::kube_utils::{
    is_cluster_scoped_kind, kind_priority, manifest_metadata, ManifestMetadata,
};
use meshplane_common::{
    Error, FIELD_MANAGER, LABEL_MANAGED_BY, LABEL_MANAGED_BY_MESHPLANE, LABEL_OWNER_NAME,
    LABEL_OWNER_NAMESPACE, LABEL_RELEASE,
};
use meshplane_components::{DesiredState, ManagedObject, ReleaseData};
use meshplane_diff::calculator::project;
use meshplane_diff::{
    CalculateOption, IgnoreManagedFields, IgnoreMetadataAnnotations, IgnoreStatusFields,
    PatchCalculator,
};

use crate::overlay::apply_overlays;
use crate::render::ChartRenderer;

/// Annotation prefixes written by controllers and tooling, never by charts
pub const IGNORED_ANNOTATION_PREFIXES: &[&str] = &[
    "deployment.kubernetes.io/",
    "kubectl.kubernetes.io/",
    "autoscaling.alpha.kubernetes.io/",
];

/// Address of one object in the cluster
#[derive(Clone, Debug, PartialEq)]
pub struct ObjectAddress {
    /// API resource of the object
    pub resource: ApiResource,
    /// Object name
    pub name: String,
    /// Namespace, unset for cluster-scoped objects
    pub namespace: Option<String>,
}

impl From<&ManifestMetadata> for ObjectAddress {
    fn from(meta: &ManifestMetadata) -> Self {
        Self {
            resource: meta.api_resource.clone(),
            name: meta.name.clone(),
            namespace: meta.namespace.clone(),
        }
    }
}

/// Read and write access to arbitrary objects
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch an object, `None` when it does not exist
    async fn get(&self, address: &ObjectAddress) -> Result<Option<Value>, Error>;

    /// Server-side apply an object
    async fn apply(&self, address: &ObjectAddress, object: &Value) -> Result<(), Error>;

    /// Delete an object; deleting a missing object succeeds
    async fn delete(&self, address: &ObjectAddress) -> Result<(), Error>;
}

/// [`ObjectStore`] backed by the dynamic kube API
pub struct KubeObjectStore {
    client: Client,
}

impl KubeObjectStore {
    /// Create a store using the given client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, address: &ObjectAddress) -> Api<DynamicObject> {
        match &address.namespace {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, &address.resource),
            None => Api::all_with(self.client.clone(), &address.resource),
        }
    }
}

#[async_trait]
impl ObjectStore for KubeObjectStore {
    async fn get(&self, address: &ObjectAddress) -> Result<Option<Value>, Error> {
        match self.api(address).get_opt(&address.name).await? {
            Some(object) => serde_json::to_value(object)
                .map(Some)
                .map_err(|e| Error::serialization_for_kind(&address.resource.kind, e.to_string())),
            None => Ok(None),
        }
    }

    async fn apply(&self, address: &ObjectAddress, object: &Value) -> Result<(), Error> {
        let params = PatchParams::apply(FIELD_MANAGER).force();
        self.api(address)
            .patch(&address.name, &params, &Patch::Apply(object))
            .await?;
        Ok(())
    }

    async fn delete(&self, address: &ObjectAddress) -> Result<(), Error> {
        match self
            .api(address)
            .delete(&address.name, &DeleteParams::default())
            .await
        {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// The custom resource a release belongs to
#[derive(Clone, Debug)]
pub struct ReleaseOwner {
    /// Owner name
    pub name: String,
    /// Owner namespace
    pub namespace: String,
    /// Controller reference set on namespaced objects in the owner's namespace
    pub reference: Option<OwnerReference>,
}

impl ReleaseOwner {
    /// Owner for a managed object
    pub fn of(object: &ManagedObject) -> Self {
        let reference = match object {
            ManagedObject::ControlPlane(o) => o.controller_owner_ref(&()),
            ManagedObject::MeshGateway(o) => o.controller_owner_ref(&()),
            ManagedObject::IstioMeshGateway(o) => o.controller_owner_ref(&()),
        };
        Self {
            name: object.name(),
            namespace: object.namespace(),
            reference,
        }
    }
}

/// Counts of what a reconcile pass did
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReleaseOutcome {
    /// Objects that did not exist
    pub created: usize,
    /// Objects that were applied because they differed
    pub updated: usize,
    /// Objects left alone
    pub unchanged: usize,
}

enum ObjectOutcome {
    Created,
    Updated,
    Unchanged,
}

/// Calculate options every comparison starts with
pub fn default_options() -> Vec<Arc<dyn CalculateOption>> {
    vec![
        Arc::new(IgnoreManagedFields),
        Arc::new(IgnoreStatusFields),
        Arc::new(IgnoreMetadataAnnotations::new(
            IGNORED_ANNOTATION_PREFIXES.iter().copied(),
        )),
    ]
}

/// Reconciles rendered releases against the cluster
pub struct ReleaseReconciler {
    renderer: Arc<dyn ChartRenderer>,
    store: Arc<dyn ObjectStore>,
    options: Vec<Arc<dyn CalculateOption>>,
}

impl ReleaseReconciler {
    /// Reconciler comparing objects with `options`
    pub fn new(
        renderer: Arc<dyn ChartRenderer>,
        store: Arc<dyn ObjectStore>,
        options: Vec<Arc<dyn CalculateOption>>,
    ) -> Self {
        Self {
            renderer,
            store,
            options,
        }
    }

    /// Render the release and bring every object up to date
    pub async fn reconcile(
        &self,
        release: &ReleaseData,
        owner: &ReleaseOwner,
        cancel: &CancellationToken,
    ) -> Result<ReleaseOutcome, Error> {
        let objects = self.prepare(release, owner).await?;
        let mut outcome = ReleaseOutcome::default();
        let mut failures = Vec::new();

        for meta in &objects {
            if cancel.is_cancelled() {
                return Err(Error::internal_with_context(
                    "release_reconciler",
                    format!("reconcile of {} cancelled", release.release_name),
                ));
            }
            match self.reconcile_object(release, meta, cancel).await {
                Ok(ObjectOutcome::Created) => outcome.created += 1,
                Ok(ObjectOutcome::Updated) => outcome.updated += 1,
                Ok(ObjectOutcome::Unchanged) => outcome.unchanged += 1,
                Err(e) => {
                    warn!(
                        release = %release.release_name,
                        object = %meta.describe(),
                        error = %e,
                        "failed to reconcile object"
                    );
                    failures.push(format!("{}: {}", meta.describe(), e));
                }
            }
        }

        if !failures.is_empty() {
            return Err(Error::apply(&release.release_name, failures.join("; ")));
        }

        info!(
            release = %release.release_name,
            created = outcome.created,
            updated = outcome.updated,
            unchanged = outcome.unchanged,
            "release reconciled"
        );
        Ok(outcome)
    }

    /// Delete every object the release renders, dependents first
    ///
    /// Only live objects labelled with this release are deleted.
    pub async fn remove(
        &self,
        release: &ReleaseData,
        owner: &ReleaseOwner,
        cancel: &CancellationToken,
    ) -> Result<usize, Error> {
        let objects = self.prepare(release, owner).await?;
        let mut failures = Vec::new();
        let mut removed = 0;

        for meta in objects.iter().rev() {
            if cancel.is_cancelled() {
                return Err(Error::internal_with_context(
                    "release_reconciler",
                    format!("removal of {} cancelled", release.release_name),
                ));
            }
            match self.remove_object(release, meta).await {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(e) => failures.push(format!("{}: {}", meta.describe(), e)),
            }
        }

        if !failures.is_empty() {
            return Err(Error::apply(&release.release_name, failures.join("; ")));
        }
        debug!(release = %release.release_name, removed, "release removed");
        Ok(removed)
    }

    /// Delete one object if it exists and belongs to the release
    async fn remove_object(
        &self,
        release: &ReleaseData,
        meta: &ManifestMetadata,
    ) -> Result<bool, Error> {
        let address = ObjectAddress::from(meta);
        let Some(live) = self.store.get(&address).await? else {
            return Ok(false);
        };
        let owning_release = live
            .pointer("/metadata/labels")
            .and_then(|labels| labels.get(LABEL_RELEASE))
            .and_then(Value::as_str);
        if owning_release != Some(release.release_name.as_str()) {
            debug!(object = %meta.describe(), "not part of the release, keeping");
            return Ok(false);
        }
        self.store.delete(&address).await?;
        debug!(object = %meta.describe(), "deleted");
        Ok(true)
    }

    /// Rendered objects ready to apply, in apply order
    async fn prepare(
        &self,
        release: &ReleaseData,
        owner: &ReleaseOwner,
    ) -> Result<Vec<ManifestMetadata>, Error> {
        let rendered = self.renderer.render(release).await?;
        let mut objects = rendered
            .into_iter()
            .map(|object| prepare_object(object, release, owner))
            .collect::<Result<Vec<_>, _>>()?;
        objects.sort_by_key(|meta| kind_priority(meta.kind()));
        Ok(objects)
    }

    async fn reconcile_object(
        &self,
        release: &ReleaseData,
        meta: &ManifestMetadata,
        cancel: &CancellationToken,
    ) -> Result<ObjectOutcome, Error> {
        let address = ObjectAddress::from(meta);
        let gvk = GroupVersionKind::from_api_version(&meta.api_resource.api_version, meta.kind());
        let key = ObjectKey {
            name: meta.name.clone(),
            namespace: meta.namespace.clone(),
        };
        let state = release.overrides.lookup(&gvk, &key);
        let desired = match state {
            Some(DesiredState::IgnoreFields(paths)) => {
                Cow::Owned(without_fields(&meta.value, paths))
            }
            _ => Cow::Borrowed(&meta.value),
        };

        let Some(live) = self.store.get(&address).await? else {
            self.store.apply(&address, &desired).await?;
            debug!(object = %meta.describe(), "created");
            return Ok(ObjectOutcome::Created);
        };

        let calculator = PatchCalculator::new(self.options.clone());
        let changed = match state {
            Some(DesiredState::Predicate(differs)) => {
                let result = calculator.calculate(&live, &desired, cancel).await?;
                differs(&project(&result.current, &result.modified), &result.modified)
            }
            Some(DesiredState::CalculateOptions(extra)) => {
                let result = calculator
                    .with_options(extra.iter().cloned())
                    .calculate(&live, &desired, cancel)
                    .await?;
                !result.is_empty()
            }
            Some(DesiredState::IgnoreFields(paths)) => !calculator
                .calculate(&without_fields(&live, paths), &desired, cancel)
                .await?
                .is_empty(),
            Some(DesiredState::Present) | None => {
                !calculator.calculate(&live, &desired, cancel).await?.is_empty()
            }
        };

        if !changed {
            return Ok(ObjectOutcome::Unchanged);
        }
        self.store.apply(&address, &desired).await?;
        debug!(object = %meta.describe(), "updated");
        Ok(ObjectOutcome::Updated)
    }
}

/// Copy of `object` without the fields at the given JSON pointers
fn without_fields(object: &Value, paths: &[&str]) -> Value {
    let mut object = object.clone();
    for path in paths {
        let Some((parent, field)) = path.rsplit_once('/') else {
            continue;
        };
        if let Some(Value::Object(map)) = object.pointer_mut(parent) {
            map.remove(&field.replace("~1", "/").replace("~0", "~"));
        }
    }
    object
}

/// Default the namespace, apply overlays and mark ownership
fn prepare_object(
    mut object: Value,
    release: &ReleaseData,
    owner: &ReleaseOwner,
) -> Result<ManifestMetadata, Error> {
    let kind = object
        .get("kind")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let cluster_scoped = is_cluster_scoped_kind(&kind);

    let metadata = metadata_mut(&mut object, &kind)?;
    if !cluster_scoped && !metadata.contains_key("namespace") {
        metadata.insert(
            "namespace".to_string(),
            Value::String(release.namespace.clone()),
        );
    }

    apply_overlays(&mut object, &release.layers)?;

    let metadata = metadata_mut(&mut object, &kind)?;
    let labels = metadata
        .entry("labels")
        .or_insert_with(|| Value::Object(Map::new()));
    if !labels.is_object() {
        *labels = Value::Object(Map::new());
    }
    if let Some(labels) = labels.as_object_mut() {
        for (key, value) in [
            (LABEL_MANAGED_BY, LABEL_MANAGED_BY_MESHPLANE),
            (LABEL_RELEASE, release.release_name.as_str()),
            (LABEL_OWNER_NAME, owner.name.as_str()),
            (LABEL_OWNER_NAMESPACE, owner.namespace.as_str()),
        ] {
            labels.insert(key.to_string(), Value::String(value.to_string()));
        }
    }

    let same_namespace = metadata.get("namespace").and_then(Value::as_str)
        == Some(owner.namespace.as_str());
    if let (Some(reference), false, true) = (&owner.reference, cluster_scoped, same_namespace) {
        let reference = serde_json::to_value(reference)
            .map_err(|e| Error::serialization_for_kind("OwnerReference", e.to_string()))?;
        metadata.insert("ownerReferences".to_string(), Value::Array(vec![reference]));
    }

    manifest_metadata(object)
}

fn metadata_mut<'a>(object: &'a mut Value, kind: &str) -> Result<&'a mut Map<String, Value>, Error> {
    let map = object
        .as_object_mut()
        .ok_or_else(|| Error::serialization_for_kind(kind, "rendered object is not a mapping"))?;
    let metadata = map
        .entry("metadata")
        .or_insert_with(|| Value::Object(Map::new()));
    metadata
        .as_object_mut()
        .ok_or_else(|| Error::serialization_for_kind(kind, "metadata is not a mapping"))
}
