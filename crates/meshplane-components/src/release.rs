//! Release descriptions produced by components

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use meshplane_common::crd::{GroupVersionKind, K8sResourceOverlay, ObjectKey};
use meshplane_diff::CalculateOption;
use meshplane_values::{Chart, Values};

/// Decides whether a live object (first) differs meaningfully from the
/// desired one (second)
pub type DesiredStatePredicate = Arc<dyn Fn(&Value, &Value) -> bool + Send + Sync>;

/// How the reconciler treats one rendered object
#[derive(Clone, Default)]
pub enum DesiredState {
    /// Apply whenever the default patch calculation reports a difference
    #[default]
    Present,
    /// Run these options after the defaults before calculating the patch
    CalculateOptions(Vec<Arc<dyn CalculateOption>>),
    /// Apply only when the predicate reports a difference
    Predicate(DesiredStatePredicate),
    /// Fields at these JSON pointers belong to another writer. They are left
    /// out of the comparison and of every apply.
    IgnoreFields(Vec<&'static str>),
}

impl fmt::Debug for DesiredState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Present => f.write_str("Present"),
            Self::CalculateOptions(options) => f
                .debug_tuple("CalculateOptions")
                .field(&options.iter().map(|o| o.name()).collect::<Vec<_>>())
                .finish(),
            Self::Predicate(_) => f.write_str("Predicate"),
            Self::IgnoreFields(paths) => f.debug_tuple("IgnoreFields").field(paths).finish(),
        }
    }
}

/// Selects the objects an override applies to
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct OverrideKey {
    /// Kind of the objects
    pub gvk: GroupVersionKind,
    /// One object, or every object of the kind when unset
    pub object: Option<ObjectKey>,
}

impl OverrideKey {
    /// Every object of a kind
    pub fn kind(gvk: GroupVersionKind) -> Self {
        Self { gvk, object: None }
    }

    /// A single object
    pub fn object(gvk: GroupVersionKind, object: ObjectKey) -> Self {
        Self {
            gvk,
            object: Some(object),
        }
    }
}

/// Per-kind and per-object desired state overrides
#[derive(Clone, Debug, Default)]
pub struct DesiredStateOverrides(HashMap<OverrideKey, DesiredState>);

impl DesiredStateOverrides {
    /// Add an override
    pub fn with(mut self, key: OverrideKey, state: DesiredState) -> Self {
        self.0.insert(key, state);
        self
    }

    /// Override for an object: an exact object match wins over a kind match
    pub fn lookup(&self, gvk: &GroupVersionKind, object: &ObjectKey) -> Option<&DesiredState> {
        self.0
            .get(&OverrideKey::object(gvk.clone(), object.clone()))
            .or_else(|| self.0.get(&OverrideKey::kind(gvk.clone())))
    }

    /// Number of overrides
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when there are no overrides
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Everything needed to render and reconcile one Helm release
#[derive(Clone, Debug)]
pub struct ReleaseData {
    /// Embedded values templates of the chart
    pub chart: Chart,
    /// Rendered values
    pub values: Values,
    /// Namespace objects are installed into
    pub namespace: String,
    /// Chart directory name under the charts root
    pub chart_name: String,
    /// Helm release name
    pub release_name: String,
    /// Desired state overrides
    pub overrides: DesiredStateOverrides,
    /// User patches applied to rendered objects
    pub layers: Vec<K8sResourceOverlay>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshplane_diff::IgnoreWebhookFailurePolicy;

    fn webhook_gvk() -> GroupVersionKind {
        GroupVersionKind::new("admissionregistration.k8s.io", "v1", "MutatingWebhookConfiguration")
    }

    #[test]
    fn exact_object_override_wins_over_kind() {
        let overrides = DesiredStateOverrides::default()
            .with(
                OverrideKey::kind(webhook_gvk()),
                DesiredState::CalculateOptions(vec![Arc::new(IgnoreWebhookFailurePolicy)]),
            )
            .with(
                OverrideKey::object(webhook_gvk(), ObjectKey::cluster("istio-sidecar-injector")),
                DesiredState::Present,
            );

        let exact = overrides.lookup(&webhook_gvk(), &ObjectKey::cluster("istio-sidecar-injector"));
        assert!(matches!(exact, Some(DesiredState::Present)));

        let by_kind = overrides.lookup(&webhook_gvk(), &ObjectKey::cluster("other"));
        assert!(matches!(by_kind, Some(DesiredState::CalculateOptions(o)) if o.len() == 1));

        let other_kind = GroupVersionKind::new("", "v1", "ConfigMap");
        assert!(overrides
            .lookup(&other_kind, &ObjectKey::namespaced("istio", "istio-system"))
            .is_none());
        assert_eq!(overrides.len(), 2);
    }

    #[test]
    fn debug_names_options() {
        let state = DesiredState::CalculateOptions(vec![Arc::new(IgnoreWebhookFailurePolicy)]);
        assert_eq!(
            format!("{state:?}"),
            r#"CalculateOptions(["ignore_webhook_failure_policy"])"#
        );
    }
}
