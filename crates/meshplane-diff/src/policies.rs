//! Field-ignoring policies that need no cluster access

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::DiffError;
use crate::option::{rewrite_both, CalculateOption};

/// Strips `failurePolicy` from every entry of `webhooks`
///
/// Istio rewrites the failure policy of its webhooks at runtime, so the
/// field would otherwise cause an update on every reconcile.
#[derive(Clone, Copy, Debug, Default)]
pub struct IgnoreWebhookFailurePolicy;

#[async_trait]
impl CalculateOption for IgnoreWebhookFailurePolicy {
    fn name(&self) -> &'static str {
        "ignore_webhook_failure_policy"
    }

    async fn apply(
        &self,
        current: Vec<u8>,
        modified: Vec<u8>,
        _cancel: &CancellationToken,
    ) -> Result<(Vec<u8>, Vec<u8>), DiffError> {
        rewrite_both(self.name(), &current, &modified, strip_failure_policy)
    }
}

fn strip_failure_policy(object: &mut Value) {
    if let Some(webhooks) = object.get_mut("webhooks").and_then(Value::as_array_mut) {
        for webhook in webhooks.iter_mut().filter_map(Value::as_object_mut) {
            webhook.remove("failurePolicy");
        }
    }
}

/// Strips annotations whose key starts with any of the prefixes
#[derive(Clone, Debug, Default)]
pub struct IgnoreMetadataAnnotations {
    prefixes: Vec<String>,
}

impl IgnoreMetadataAnnotations {
    /// Policy for the given key prefixes
    pub fn new<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            prefixes: prefixes.into_iter().map(Into::into).collect(),
        }
    }

    fn strip(&self, object: &mut Value) {
        let Some(metadata) = object.get_mut("metadata").and_then(Value::as_object_mut) else {
            return;
        };
        let Some(annotations) = metadata
            .get_mut("annotations")
            .and_then(Value::as_object_mut)
        else {
            return;
        };
        annotations.retain(|key, _| !self.prefixes.iter().any(|p| key.starts_with(p.as_str())));
        if annotations.is_empty() {
            metadata.remove("annotations");
        }
    }
}

#[async_trait]
impl CalculateOption for IgnoreMetadataAnnotations {
    fn name(&self) -> &'static str {
        "ignore_metadata_annotations"
    }

    async fn apply(
        &self,
        current: Vec<u8>,
        modified: Vec<u8>,
        _cancel: &CancellationToken,
    ) -> Result<(Vec<u8>, Vec<u8>), DiffError> {
        rewrite_both(self.name(), &current, &modified, |object| self.strip(object))
    }
}

/// Drops `metadata.managedFields`
#[derive(Clone, Copy, Debug, Default)]
pub struct IgnoreManagedFields;

#[async_trait]
impl CalculateOption for IgnoreManagedFields {
    fn name(&self) -> &'static str {
        "ignore_managed_fields"
    }

    async fn apply(
        &self,
        current: Vec<u8>,
        modified: Vec<u8>,
        _cancel: &CancellationToken,
    ) -> Result<(Vec<u8>, Vec<u8>), DiffError> {
        rewrite_both(self.name(), &current, &modified, |object| {
            if let Some(metadata) = object.get_mut("metadata").and_then(Value::as_object_mut) {
                metadata.remove("managedFields");
            }
        })
    }
}

/// Drops the top-level `status`
#[derive(Clone, Copy, Debug, Default)]
pub struct IgnoreStatusFields;

#[async_trait]
impl CalculateOption for IgnoreStatusFields {
    fn name(&self) -> &'static str {
        "ignore_status_fields"
    }

    async fn apply(
        &self,
        current: Vec<u8>,
        modified: Vec<u8>,
        _cancel: &CancellationToken,
    ) -> Result<(Vec<u8>, Vec<u8>), DiffError> {
        rewrite_both(self.name(), &current, &modified, |object| {
            if let Some(map) = object.as_object_mut() {
                map.remove("status");
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn run(option: &dyn CalculateOption, current: Value, modified: Value) -> (Value, Value) {
        let (c, m) = option
            .apply(
                serde_json::to_vec(&current).unwrap(),
                serde_json::to_vec(&modified).unwrap(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        (
            serde_json::from_slice(&c).unwrap(),
            serde_json::from_slice(&m).unwrap(),
        )
    }

    fn webhook_config(policy: &str, side_effects: &str) -> Value {
        json!({
            "apiVersion": "admissionregistration.k8s.io/v1",
            "kind": "ValidatingWebhookConfiguration",
            "metadata": {"name": "istio-validator-cp-v111x-istio-system"},
            "webhooks": [
                {"name": "rev.validation.istio.io", "failurePolicy": policy, "sideEffects": side_effects},
                {"name": "rev.namespace.validation.istio.io", "failurePolicy": policy, "sideEffects": side_effects}
            ]
        })
    }

    #[tokio::test]
    async fn failure_policy_is_stripped_from_every_webhook() {
        let (current, modified) = run(
            &IgnoreWebhookFailurePolicy,
            webhook_config("Fail", "None"),
            webhook_config("Ignore", "None"),
        )
        .await;
        assert_eq!(current, modified);
        for webhook in current["webhooks"].as_array().unwrap() {
            assert!(webhook.get("failurePolicy").is_none());
            assert_eq!(webhook["sideEffects"], "None");
        }
    }

    #[tokio::test]
    async fn failure_policy_tolerates_objects_without_webhooks() {
        let cm = json!({"apiVersion": "v1", "kind": "ConfigMap", "data": {"a": "b"}});
        let (current, modified) = run(&IgnoreWebhookFailurePolicy, cm.clone(), cm.clone()).await;
        assert_eq!(current, cm);
        assert_eq!(modified, cm);
    }

    #[tokio::test]
    async fn annotation_prefixes_strip_only_matching_keys() {
        let option = IgnoreMetadataAnnotations::new(["foo.example.com/"]);
        let current = json!({"metadata": {"annotations": {
            "foo.example.com/revision": "3",
            "bar.example.com/owner": "team-a",
            "foo.example.com.other/keep": "x"
        }}});
        let modified = json!({"metadata": {"annotations": {
            "foo.example.com/revision": "1",
            "bar.example.com/owner": "team-a"
        }}});
        let (current, modified) = run(&option, current, modified).await;
        assert_eq!(
            current["metadata"]["annotations"],
            json!({"bar.example.com/owner": "team-a", "foo.example.com.other/keep": "x"})
        );
        assert_eq!(
            modified["metadata"]["annotations"],
            json!({"bar.example.com/owner": "team-a"})
        );
    }

    #[tokio::test]
    async fn annotation_stripping_drops_emptied_map() {
        let option = IgnoreMetadataAnnotations::new(["deployment.kubernetes.io/"]);
        let current = json!({"metadata": {"name": "istiod", "annotations": {"deployment.kubernetes.io/revision": "4"}}});
        let (current, _) = run(&option, current, json!({"kind": "Deployment"})).await;
        assert_eq!(current, json!({"metadata": {"name": "istiod"}}));
    }

    #[tokio::test]
    async fn managed_fields_and_status_are_dropped() {
        let live = json!({
            "metadata": {"name": "istiod", "managedFields": [{"manager": "kubectl"}]},
            "spec": {"replicas": 1},
            "status": {"readyReplicas": 1}
        });
        let (current, _) = run(&IgnoreManagedFields, live.clone(), json!({})).await;
        assert!(current["metadata"].get("managedFields").is_none());
        assert_eq!(current["status"]["readyReplicas"], 1);

        let (current, _) = run(&IgnoreStatusFields, live, json!({})).await;
        assert!(current.get("status").is_none());
        assert_eq!(current["spec"]["replicas"], 1);
    }
}
