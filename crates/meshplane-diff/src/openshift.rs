//! OpenShift managed secret filtering
//!
//! OpenShift adds a dockercfg and a token secret to the `secrets` and
//! `imagePullSecrets` of every ServiceAccount. Those entries are not part of
//! the rendered manifests, so they are removed from both sides before the
//! comparison.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::api::Api;
use kube::Client;
#[cfg(test)]
use mockall::automock;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::DiffError;
use crate::option::{cancellable, decode, encode, CalculateOption};

/// Annotation OpenShift sets on the token secrets it manages
pub const OPENSHIFT_TOKEN_SECRET_ANNOTATION: &str = "openshift.io/token-secret.name";
/// Annotation naming the controller that created a secret
pub const CREATED_BY_ANNOTATION: &str = "kubernetes.io/created-by";
/// Value of [`CREATED_BY_ANNOTATION`] on OpenShift dockercfg secrets
pub const OPENSHIFT_DOCKERCFG_CREATOR: &str = "openshift.io/create-dockercfg-secrets";

/// API group only present on OpenShift clusters
const OPENSHIFT_CONFIG_GROUP: &str = "config.openshift.io";

/// Secret reference lists OpenShift appends to
const SECRET_LISTS: [&str; 2] = ["secrets", "imagePullSecrets"];

/// Kubernetes distribution
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Distribution {
    /// Any distribution without special handling
    Generic,
    /// Red Hat OpenShift
    OpenShift,
}

/// Reports which distribution the operator runs on
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterMetadataProvider: Send + Sync {
    /// Detect the distribution
    async fn distribution(&self) -> Result<Distribution, meshplane_common::Error>;
}

/// Fetches secrets by name
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SecretLookup: Send + Sync {
    /// Get a secret, `None` when it does not exist
    ///
    /// The policy treats a missing referenced secret as a lookup failure.
    async fn get_secret(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<Option<Secret>, meshplane_common::Error>;
}

/// Distribution detection through the API group list
pub struct KubeClusterMetadata {
    client: Client,
}

impl KubeClusterMetadata {
    /// Create a new provider
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ClusterMetadataProvider for KubeClusterMetadata {
    async fn distribution(&self) -> Result<Distribution, meshplane_common::Error> {
        let groups = self.client.list_api_groups().await?;
        let openshift = groups
            .groups
            .iter()
            .any(|g| g.name == OPENSHIFT_CONFIG_GROUP);
        Ok(if openshift {
            Distribution::OpenShift
        } else {
            Distribution::Generic
        })
    }
}

/// Secret lookup through the API server
pub struct KubeSecretLookup {
    client: Client,
}

impl KubeSecretLookup {
    /// Create a new lookup
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SecretLookup for KubeSecretLookup {
    async fn get_secret(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<Option<Secret>, meshplane_common::Error> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }
}

/// Whether a secret was created by OpenShift for a service account
pub fn is_openshift_managed_secret(secret: &Secret) -> bool {
    let Some(annotations) = secret.metadata.annotations.as_ref() else {
        return false;
    };
    annotations.contains_key(OPENSHIFT_TOKEN_SECRET_ANNOTATION)
        || annotations
            .get(CREATED_BY_ANNOTATION)
            .is_some_and(|v| v == OPENSHIFT_DOCKERCFG_CREATOR)
}

/// Removes OpenShift managed entries from `secrets` and `imagePullSecrets`
pub struct IgnoreOpenShiftManagedSecrets {
    metadata: Arc<dyn ClusterMetadataProvider>,
    secrets: Arc<dyn SecretLookup>,
}

impl IgnoreOpenShiftManagedSecrets {
    /// Create the policy
    pub fn new(
        metadata: Arc<dyn ClusterMetadataProvider>,
        secrets: Arc<dyn SecretLookup>,
    ) -> Self {
        Self { metadata, secrets }
    }

    /// Names referenced by the secret lists of an object
    fn referenced_names(object: &Value) -> Vec<String> {
        SECRET_LISTS
            .iter()
            .filter_map(|list| object.get(*list).and_then(Value::as_array))
            .flatten()
            .filter_map(|entry| entry.get("name").and_then(Value::as_str))
            .map(str::to_string)
            .collect()
    }

    async fn classify(
        &self,
        names: Vec<String>,
        namespace: &str,
        cancel: &CancellationToken,
    ) -> Result<HashMap<String, bool>, DiffError> {
        let mut managed = HashMap::with_capacity(names.len());
        for name in names {
            if managed.contains_key(&name) {
                continue;
            }
            let secret = cancellable(cancel, async {
                self.secrets
                    .get_secret(&name, namespace)
                    .await
                    .map_err(|source| DiffError::Lookup {
                        option: self.name(),
                        source,
                    })
            })
            .await?;
            let Some(secret) = secret else {
                return Err(DiffError::Lookup {
                    option: self.name(),
                    source: meshplane_common::Error::not_found("Secret", name, namespace),
                });
            };
            managed.insert(name, is_openshift_managed_secret(&secret));
        }
        Ok(managed)
    }
}

/// Keep only entries whose referenced secret is not OpenShift managed.
///
/// Builds a new list, so adjacent managed entries are all removed.
fn remove_managed(object: &mut Value, managed: &HashMap<String, bool>) {
    for list in SECRET_LISTS {
        if let Some(entries) = object.get_mut(list).and_then(Value::as_array_mut) {
            entries.retain(|entry| {
                let name = entry.get("name").and_then(Value::as_str);
                !name.is_some_and(|n| managed.get(n).copied().unwrap_or(false))
            });
        }
    }
}

#[async_trait]
impl CalculateOption for IgnoreOpenShiftManagedSecrets {
    fn name(&self) -> &'static str {
        "ignore_openshift_managed_secrets"
    }

    async fn apply(
        &self,
        current: Vec<u8>,
        modified: Vec<u8>,
        cancel: &CancellationToken,
    ) -> Result<(Vec<u8>, Vec<u8>), DiffError> {
        let mut current_obj = decode(self.name(), &current)?;
        let mut modified_obj = decode(self.name(), &modified)?;

        let mut names = Self::referenced_names(&current_obj);
        names.extend(Self::referenced_names(&modified_obj));
        if names.is_empty() {
            return Ok((current, modified));
        }

        let distribution = cancellable(cancel, async {
            self.metadata
                .distribution()
                .await
                .map_err(|source| DiffError::Lookup {
                    option: self.name(),
                    source,
                })
        })
        .await?;
        if distribution != Distribution::OpenShift {
            return Ok((current, modified));
        }

        let namespace = current_obj
            .pointer("/metadata/namespace")
            .or_else(|| modified_obj.pointer("/metadata/namespace"))
            .and_then(Value::as_str)
            .unwrap_or("default")
            .to_string();

        let managed = self.classify(names, &namespace, cancel).await?;
        debug!(
            namespace = %namespace,
            managed = managed.values().filter(|m| **m).count(),
            "filtering OpenShift managed secrets"
        );

        remove_managed(&mut current_obj, &managed);
        remove_managed(&mut modified_obj, &managed);
        Ok((
            encode(self.name(), &current_obj)?,
            encode(self.name(), &modified_obj)?,
        ))
    }
}
