//! Chart rendering
//!
//! Rendered values are piped into `helm template` and the manifest stream
//! it prints is split into one JSON value per object.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use meshplane_common::yaml::parse_yaml_multi;
use meshplane_common::Error;
use meshplane_components::ReleaseData;

/// Renders a release into Kubernetes manifests
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ChartRenderer: Send + Sync {
    /// Render every object of the release
    async fn render(&self, release: &ReleaseData) -> Result<Vec<Value>, Error>;
}

/// Renders charts from a local directory with the helm CLI
#[derive(Clone, Debug)]
pub struct HelmCliRenderer {
    helm: PathBuf,
    charts_dir: PathBuf,
}

impl HelmCliRenderer {
    /// Renderer using `helm` to render charts under `charts_dir`
    pub fn new(helm: impl Into<PathBuf>, charts_dir: impl Into<PathBuf>) -> Self {
        Self {
            helm: helm.into(),
            charts_dir: charts_dir.into(),
        }
    }

    /// Arguments passed to `helm` for a release; values are read from stdin
    fn args(&self, release: &ReleaseData) -> Vec<String> {
        vec![
            "template".to_string(),
            release.release_name.clone(),
            self.charts_dir
                .join(&release.chart_name)
                .to_string_lossy()
                .into_owned(),
            "--namespace".to_string(),
            release.namespace.clone(),
            "--include-crds".to_string(),
            "--values".to_string(),
            "-".to_string(),
        ]
    }
}

#[async_trait]
impl ChartRenderer for HelmCliRenderer {
    async fn render(&self, release: &ReleaseData) -> Result<Vec<Value>, Error> {
        let values = release
            .values
            .to_yaml()
            .map_err(|e| Error::serialization_for_kind("values", e.to_string()))?;

        let mut child = Command::new(&self.helm)
            .args(self.args(release))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                Error::render(
                    &release.release_name,
                    format!("failed to run {}: {}", self.helm.display(), e),
                )
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(values.as_bytes()).await.map_err(|e| {
                Error::render(&release.release_name, format!("failed to write values: {}", e))
            })?;
        }

        let output = child.wait_with_output().await.map_err(|e| {
            Error::render(&release.release_name, format!("helm did not finish: {}", e))
        })?;

        if !output.status.success() {
            return Err(Error::render(
                &release.release_name,
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        let stdout = String::from_utf8(output.stdout).map_err(|e| {
            Error::render(&release.release_name, format!("invalid UTF-8 output: {}", e))
        })?;
        let objects = split_manifests(&stdout)
            .map_err(|e| Error::render(&release.release_name, e.to_string()))?;

        debug!(
            release = %release.release_name,
            chart = %release.chart_name,
            objects = objects.len(),
            "rendered chart"
        );
        Ok(objects)
    }
}

/// Split a multi-document manifest stream into objects
///
/// Empty documents, `List` wrappers and anything that is not a mapping with
/// a kind are flattened or dropped.
pub fn split_manifests(input: &str) -> Result<Vec<Value>, meshplane_common::yaml::YamlError> {
    let mut objects = Vec::new();
    for doc in parse_yaml_multi(input)? {
        collect_objects(doc, &mut objects);
    }
    Ok(objects)
}

fn collect_objects(doc: Value, out: &mut Vec<Value>) {
    let Value::Object(map) = doc else {
        return;
    };
    match map.get("kind").and_then(Value::as_str) {
        Some(kind) if kind.ends_with("List") && map.get("items").is_some_and(Value::is_array) => {
            if let Some(Value::Array(items)) = map.get("items") {
                for item in items {
                    collect_objects(item.clone(), out);
                }
            }
        }
        Some(_) => out.push(Value::Object(map)),
        None => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::release;

    #[test]
    fn helm_arguments() {
        let renderer = HelmCliRenderer::new("helm", "/charts");
        assert_eq!(
            renderer.args(&release()),
            vec![
                "template",
                "istio-base",
                "/charts/base",
                "--namespace",
                "istio-system",
                "--include-crds",
                "--values",
                "-",
            ]
        );
    }

    #[test]
    fn split_drops_empty_documents_and_flattens_lists() {
        let input = r#"---
# Source: base/templates/empty.yaml
---
apiVersion: v1
kind: ServiceAccount
metadata:
  name: istiod
---
apiVersion: v1
kind: List
items:
- apiVersion: v1
  kind: ConfigMap
  metadata:
    name: istio
- apiVersion: v1
  kind: Secret
  metadata:
    name: cacerts
---
just a string
"#;
        let objects = split_manifests(input).unwrap();
        let kinds: Vec<_> = objects.iter().map(|o| o["kind"].as_str().unwrap()).collect();
        assert_eq!(kinds, vec!["ServiceAccount", "ConfigMap", "Secret"]);
    }

    #[test]
    fn split_reports_invalid_yaml() {
        assert!(split_manifests("a: [unclosed").is_err());
    }

    #[tokio::test]
    async fn missing_helm_binary_is_render_error() {
        let renderer = HelmCliRenderer::new("/nonexistent/helm-binary", "/charts");
        let err = renderer.render(&release()).await.unwrap_err();
        assert!(matches!(err, Error::Render { .. }));
        assert!(err.is_retryable());
    }
}
