//! User overlays applied to rendered objects
//!
//! An overlay selects objects by group/version/kind and name (optionally
//! namespace) and carries JSON pointer patches. `replace` sets a value,
//! creating missing intermediate mappings; `remove` deletes a value and is
//! a no-op when the path does not exist.

use json_patch::{AddOperation, PatchOperation, RemoveOperation, ReplaceOperation};
use jsonptr::PointerBuf;
use serde_json::{Map, Value};
use tracing::debug;

use meshplane_common::crd::{
    GroupVersionKind, K8sResourceOverlay, K8sResourceOverlayPatch, OverlayPatchType,
};
use meshplane_common::yaml::parse_yaml;
use meshplane_common::Error;

/// Whether `overlay` selects `object`
///
/// An empty name in the overlay selects every object of the kind.
pub fn matches(overlay: &K8sResourceOverlay, object: &Value) -> bool {
    let api_version = object.get("apiVersion").and_then(Value::as_str).unwrap_or_default();
    let kind = object.get("kind").and_then(Value::as_str).unwrap_or_default();
    if GroupVersionKind::from_api_version(api_version, kind) != overlay.group_version_kind {
        return false;
    }

    let key = &overlay.object_key;
    let name = object.pointer("/metadata/name").and_then(Value::as_str);
    if !key.name.is_empty() && name != Some(key.name.as_str()) {
        return false;
    }
    match key.namespace.as_deref() {
        Some(ns) if !ns.is_empty() => {
            object.pointer("/metadata/namespace").and_then(Value::as_str) == Some(ns)
        }
        _ => true,
    }
}

/// Apply every matching overlay to `object`, in order
pub fn apply_overlays(object: &mut Value, overlays: &[K8sResourceOverlay]) -> Result<(), Error> {
    for overlay in overlays {
        if !matches(overlay, object) {
            continue;
        }
        for patch in &overlay.patches {
            apply_patch(object, patch).map_err(|message| {
                Error::validation_for_field(
                    describe(object),
                    "spec.k8sResourceOverlays",
                    message,
                )
            })?;
        }
    }
    Ok(())
}

fn describe(object: &Value) -> String {
    let kind = object.get("kind").and_then(Value::as_str).unwrap_or_default();
    let name = object.pointer("/metadata/name").and_then(Value::as_str).unwrap_or_default();
    match object.pointer("/metadata/namespace").and_then(Value::as_str) {
        Some(ns) => format!("{} {}/{}", kind, ns, name),
        None => format!("{} {}", kind, name),
    }
}

fn patch_value(patch: &K8sResourceOverlayPatch) -> Result<Value, String> {
    let raw = patch.value.clone().unwrap_or_default();
    if patch.parse_value {
        parse_yaml(&raw).map_err(|e| format!("invalid value for {}: {}", patch.path, e))
    } else {
        Ok(Value::String(raw))
    }
}

fn apply_patch(object: &mut Value, patch: &K8sResourceOverlayPatch) -> Result<(), String> {
    let path = PointerBuf::parse(&patch.path)
        .map_err(|e| format!("invalid path {:?}: {}", patch.path, e))?;
    let exists = object.pointer(path.as_str()).is_some();

    let operation = match patch.patch_type {
        OverlayPatchType::Remove if !exists => {
            debug!(path = %patch.path, "overlay remove path not present");
            return Ok(());
        }
        OverlayPatchType::Remove => PatchOperation::Remove(RemoveOperation { path }),
        OverlayPatchType::Replace if exists => PatchOperation::Replace(ReplaceOperation {
            path,
            value: patch_value(patch)?,
        }),
        OverlayPatchType::Replace => {
            create_parents(object, &path)?;
            PatchOperation::Add(AddOperation {
                path,
                value: patch_value(patch)?,
            })
        }
    };

    json_patch::patch(object, &[operation])
        .map_err(|e| format!("cannot apply {}: {}", patch.path, e))
}

/// Create the mappings leading up to the last token of `path`
fn create_parents(object: &mut Value, path: &PointerBuf) -> Result<(), String> {
    let tokens: Vec<String> = path.tokens().map(|t| t.decoded().into_owned()).collect();
    let Some((_, parents)) = tokens.split_last() else {
        return Ok(());
    };

    let mut node = object;
    for token in parents {
        if node.is_null() {
            *node = Value::Object(Map::new());
        }
        node = match node {
            Value::Object(map) => map
                .entry(token.clone())
                .or_insert_with(|| Value::Object(Map::new())),
            Value::Array(items) => {
                let index: usize = token
                    .parse()
                    .map_err(|_| format!("{:?} is not an index into a list", token))?;
                items
                    .get_mut(index)
                    .ok_or_else(|| format!("index {} is out of range", index))?
            }
            _ => return Err(format!("cannot descend into scalar at {:?}", token)),
        };
    }
    if node.is_null() {
        *node = Value::Object(Map::new());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshplane_common::crd::ObjectKey;
    use serde_json::json;

    fn deployment() -> Value {
        json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": {"name": "istiod", "namespace": "istio-system"},
            "spec": {
                "replicas": 1,
                "template": {"spec": {"containers": [{"name": "discovery", "image": "pilot"}]}}
            }
        })
    }

    fn overlay(name: &str, patches: Vec<K8sResourceOverlayPatch>) -> K8sResourceOverlay {
        K8sResourceOverlay {
            group_version_kind: GroupVersionKind::new("apps", "v1", "Deployment"),
            object_key: ObjectKey {
                name: name.to_string(),
                namespace: None,
            },
            patches,
        }
    }

    fn replace(path: &str, value: &str, parse_value: bool) -> K8sResourceOverlayPatch {
        K8sResourceOverlayPatch {
            patch_type: OverlayPatchType::Replace,
            path: path.to_string(),
            value: Some(value.to_string()),
            parse_value,
        }
    }

    fn remove(path: &str) -> K8sResourceOverlayPatch {
        K8sResourceOverlayPatch {
            patch_type: OverlayPatchType::Remove,
            path: path.to_string(),
            value: None,
            parse_value: false,
        }
    }

    #[test]
    fn selects_by_kind_name_and_namespace() {
        let object = deployment();
        assert!(matches(&overlay("istiod", vec![]), &object));
        assert!(matches(&overlay("", vec![]), &object));
        assert!(!matches(&overlay("other", vec![]), &object));

        let mut wrong_ns = overlay("istiod", vec![]);
        wrong_ns.object_key.namespace = Some("default".to_string());
        assert!(!matches(&wrong_ns, &object));

        let mut wrong_kind = overlay("istiod", vec![]);
        wrong_kind.group_version_kind = GroupVersionKind::new("", "v1", "Service");
        assert!(!matches(&wrong_kind, &object));
    }

    #[test]
    fn replace_existing_and_parsed_values() {
        let mut object = deployment();
        apply_overlays(
            &mut object,
            &[overlay(
                "istiod",
                vec![
                    replace("/spec/replicas", "3", true),
                    replace("/spec/template/spec/containers/0/image", "pilot:1.11", false),
                ],
            )],
        )
        .unwrap();
        assert_eq!(object["spec"]["replicas"], 3);
        assert_eq!(
            object["spec"]["template"]["spec"]["containers"][0]["image"],
            "pilot:1.11"
        );
    }

    #[test]
    fn replace_creates_missing_parents() {
        let mut object = deployment();
        apply_overlays(
            &mut object,
            &[overlay(
                "istiod",
                vec![replace(
                    "/spec/template/metadata/annotations/sidecar.istio.io~1inject",
                    "false",
                    false,
                )],
            )],
        )
        .unwrap();
        assert_eq!(
            object["spec"]["template"]["metadata"]["annotations"]["sidecar.istio.io/inject"],
            "false"
        );
    }

    #[test]
    fn remove_is_tolerant_of_missing_paths() {
        let mut object = deployment();
        apply_overlays(
            &mut object,
            &[overlay(
                "istiod",
                vec![remove("/spec/replicas"), remove("/spec/strategy")],
            )],
        )
        .unwrap();
        assert!(object["spec"].get("replicas").is_none());
    }

    #[test]
    fn non_matching_overlays_leave_object_alone() {
        let mut object = deployment();
        let before = object.clone();
        apply_overlays(&mut object, &[overlay("other", vec![remove("/spec")])]).unwrap();
        assert_eq!(object, before);
    }

    #[test]
    fn invalid_paths_are_validation_errors() {
        let mut object = deployment();
        let err = apply_overlays(
            &mut object,
            &[overlay("istiod", vec![replace("spec/replicas", "2", true)])],
        )
        .unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
        assert!(err.to_string().contains("Deployment istio-system/istiod"));

        let err = apply_overlays(
            &mut object,
            &[overlay(
                "istiod",
                vec![replace("/spec/template/spec/containers/7/image", "x", false)],
            )],
        )
        .unwrap_err();
        assert!(!err.is_retryable());
    }
}
