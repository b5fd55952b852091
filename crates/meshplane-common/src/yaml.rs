//! YAML utilities for rendered chart output and values documents
//!
//! Parsing goes through yaml-rust2 into `serde_json::Value` so every
//! downstream comparison (values trees, rendered manifests, diffs) happens
//! on one structural representation. Emission goes through serde_yaml.

use serde::Serialize;
use serde_json::{Map, Number, Value};
use yaml_rust2::{Yaml, YamlLoader};

/// Error type for YAML parsing and emission
#[derive(Debug, Clone)]
pub struct YamlError(String);

impl std::fmt::Display for YamlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for YamlError {}

impl From<YamlError> for crate::Error {
    fn from(e: YamlError) -> Self {
        crate::Error::serialization_for_kind("yaml", e.0)
    }
}

/// Parse a YAML string into a serde_json::Value.
///
/// For multi-document YAML, returns only the first document.
/// Returns `Value::Null` for empty input.
pub fn parse_yaml(input: &str) -> Result<Value, YamlError> {
    let docs = YamlLoader::load_from_str(input).map_err(|e| YamlError(e.to_string()))?;
    match docs.into_iter().next() {
        Some(doc) => yaml_to_json(doc),
        None => Ok(Value::Null),
    }
}

/// Parse a multi-document YAML stream (e.g. `helm template` output).
///
/// Empty documents (a bare `---`, or a template that rendered nothing)
/// are dropped.
pub fn parse_yaml_multi(input: &str) -> Result<Vec<Value>, YamlError> {
    let docs = YamlLoader::load_from_str(input).map_err(|e| YamlError(e.to_string()))?;
    let mut out = Vec::with_capacity(docs.len());
    for doc in docs {
        match yaml_to_json(doc)? {
            Value::Null => continue,
            v => out.push(v),
        }
    }
    Ok(out)
}

/// Serialize any value as a YAML document (without the leading `---`).
pub fn to_yaml_string<T: Serialize + ?Sized>(value: &T) -> Result<String, YamlError> {
    serde_yaml::to_string(value).map_err(|e| YamlError(e.to_string()))
}

fn yaml_to_json(yaml: Yaml) -> Result<Value, YamlError> {
    match yaml {
        Yaml::Null => Ok(Value::Null),
        Yaml::Boolean(b) => Ok(Value::Bool(b)),
        Yaml::Integer(i) => Ok(Value::Number(i.into())),
        Yaml::Real(s) => {
            let f: f64 = s
                .parse()
                .map_err(|e: std::num::ParseFloatError| YamlError(e.to_string()))?;
            Ok(Number::from_f64(f)
                .map(Value::Number)
                .unwrap_or(Value::Null))
        }
        Yaml::String(s) => Ok(Value::String(s)),
        Yaml::Array(arr) => arr
            .into_iter()
            .map(yaml_to_json)
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Yaml::Hash(map) => map
            .into_iter()
            .map(|(k, v)| {
                let key = match k {
                    Yaml::String(s) => s,
                    Yaml::Integer(i) => i.to_string(),
                    Yaml::Real(r) => r,
                    Yaml::Boolean(b) => b.to_string(),
                    Yaml::Null => "null".to_string(),
                    _ => return Err(YamlError("unsupported YAML key type".to_string())),
                };
                yaml_to_json(v).map(|v| (key, v))
            })
            .collect::<Result<Map<String, Value>, _>>()
            .map(Value::Object),
        Yaml::Alias(_) => Err(YamlError("YAML aliases not supported".to_string())),
        Yaml::BadValue => Err(YamlError("bad YAML value".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_values_document() {
        let yaml = r#"
global:
  hub: gcr.io/istio-release
  tag: 1.11.1
pilot:
  replicaCount: 2
  enabled: true
"#;
        let result = parse_yaml(yaml).unwrap();
        assert_eq!(result["global"]["hub"], "gcr.io/istio-release");
        assert_eq!(result["global"]["tag"], "1.11.1");
        assert_eq!(result["pilot"]["replicaCount"], 2);
        assert_eq!(result["pilot"]["enabled"], true);
    }

    #[test]
    fn empty_input_is_null() {
        assert_eq!(parse_yaml("").unwrap(), Value::Null);
    }

    #[test]
    fn invalid_yaml_is_an_error() {
        assert!(parse_yaml("not: valid: yaml: {{").is_err());
    }

    #[test]
    fn multi_document_skips_empty_documents() {
        let yaml = r#"
---
# Source: base/templates/serviceaccount.yaml
apiVersion: v1
kind: ServiceAccount
metadata:
  name: istio-reader-service-account
---
---
apiVersion: v1
kind: ConfigMap
metadata:
  name: istio
"#;
        let docs = parse_yaml_multi(yaml).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0]["kind"], "ServiceAccount");
        assert_eq!(docs[1]["metadata"]["name"], "istio");
    }

    #[test]
    fn floats_and_nulls() {
        let result = parse_yaml("ratio: 1.5\nmissing: null").unwrap();
        assert!((result["ratio"].as_f64().unwrap() - 1.5).abs() < 0.0001);
        assert!(result["missing"].is_null());
    }

    #[test]
    fn emits_yaml_that_parses_back() {
        let value = json!({"meshConfig": {"enableTracing": true, "accessLogFile": "/dev/stdout"}});
        let text = to_yaml_string(&value).unwrap();
        assert_eq!(parse_yaml(&text).unwrap(), value);
    }
}
