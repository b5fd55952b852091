//! Template function library
//!
//! Filters: `toYaml`, `fromYaml`, `toJson`, `fromJson`, `toJsonPb`,
//! `indent`, `nindent`.
//! Functions: `include`, `valueIf`, `toYamlIf`.
//!
//! `valueIf` and `toYamlIf` emit `key: value` only when the value is not
//! zero, so unset spec fields never reach the values document.

use meshplane_common::yaml::to_yaml_string;
use minijinja::{Error, ErrorKind, State, Value};

use crate::values::prune_zero;

fn to_json_value(value: &Value) -> Result<serde_json::Value, Error> {
    serde_json::to_value(value).map_err(|e| {
        Error::new(
            ErrorKind::InvalidOperation,
            format!("cannot convert value: {}", e),
        )
    })
}

fn yaml_text(value: &serde_json::Value) -> Result<String, Error> {
    let text = to_yaml_string(value).map_err(|e| {
        Error::new(
            ErrorKind::InvalidOperation,
            format!("cannot encode YAML: {}", e),
        )
    })?;
    Ok(text.trim_end_matches('\n').to_string())
}

/// Serialize to YAML without the trailing newline
///
/// Usage: `{{ spec.resources | toYaml }}`
pub fn to_yaml(value: Value) -> Result<String, Error> {
    yaml_text(&to_json_value(&value)?)
}

/// Parse a YAML string
///
/// Usage: `{{ (text | fromYaml).key }}`
pub fn from_yaml(text: &str) -> Result<Value, Error> {
    let parsed = meshplane_common::yaml::parse_yaml(text).map_err(|e| {
        Error::new(
            ErrorKind::InvalidOperation,
            format!("cannot decode YAML: {}", e),
        )
    })?;
    Ok(Value::from_serialize(&parsed))
}

/// Serialize to compact JSON
pub fn to_json(value: Value) -> Result<String, Error> {
    serde_json::to_string(&to_json_value(&value)?).map_err(|e| {
        Error::new(
            ErrorKind::InvalidOperation,
            format!("cannot encode JSON: {}", e),
        )
    })
}

/// Parse a JSON string
pub fn from_json(text: &str) -> Result<Value, Error> {
    let parsed: serde_json::Value = serde_json::from_str(text).map_err(|e| {
        Error::new(
            ErrorKind::InvalidOperation,
            format!("cannot decode JSON: {}", e),
        )
    })?;
    Ok(Value::from_serialize(&parsed))
}

/// Proto-style JSON of a sub-message: zero fields are dropped
///
/// A fully zero message encodes as `{}`.
pub fn to_json_pb(value: Value) -> Result<String, Error> {
    let pruned = prune_zero(&to_json_value(&value)?)
        .unwrap_or_else(|| serde_json::Value::Object(serde_json::Map::new()));
    serde_json::to_string(&pruned).map_err(|e| {
        Error::new(
            ErrorKind::InvalidOperation,
            format!("cannot encode JSON: {}", e),
        )
    })
}

/// Prefix every non-empty line with `width` spaces
pub fn indent(text: &str, width: usize) -> String {
    let pad = " ".repeat(width);
    text.lines()
        .map(|line| {
            if line.is_empty() {
                String::new()
            } else {
                format!("{}{}", pad, line)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// `indent` preceded by a newline
pub fn nindent(text: &str, width: usize) -> String {
    format!("\n{}", indent(text, width))
}

/// Render another template of the chart with the given context
///
/// A missing context renders against an empty mapping.
///
/// Usage: `{{ include("_global.tpl", spec.containerImageConfiguration) }}`
pub fn include(state: &State, name: &str, ctx: Value) -> Result<String, Error> {
    let template = state.env().get_template(name)?;
    if ctx.is_undefined() || ctx.is_none() {
        return template.render(Value::from_serialize(serde_json::Map::new()));
    }
    template.render(ctx)
}

/// Single-line YAML flow rendering; JSON scalars are valid YAML scalars
fn flow(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Object(map) => format!(
            "{{{}}}",
            map.iter()
                .map(|(k, v)| format!("{}: {}", serde_json::Value::String(k.clone()), flow(v)))
                .collect::<Vec<_>>()
                .join(", ")
        ),
        serde_json::Value::Array(items) => format!(
            "[{}]",
            items.iter().map(flow).collect::<Vec<_>>().join(", ")
        ),
        scalar => scalar.to_string(),
    }
}

/// `key: value` on one line when value is not zero, otherwise nothing
///
/// Zero fields of nested mappings are dropped.
///
/// Usage: `{{ valueIf("replicaCount", spec.istiod.deployment.replicas.count) }}`
pub fn value_if(key: &str, value: Value) -> Result<String, Error> {
    let json = to_json_value(&value)?;
    match prune_zero(&json) {
        Some(pruned) => Ok(format!("{}: {}", key, flow(&pruned))),
        None => Ok(String::new()),
    }
}

/// `key:` followed by the YAML block of value when not zero, otherwise nothing
///
/// Scalars are emitted inline. Zero fields of nested mappings are dropped.
/// The block is indented by two spaces relative to the key, so the result
/// composes with `nindent`.
///
/// Usage: `{{- toYamlIf("resources", spec.resources) | nindent(2) }}`
pub fn to_yaml_if(key: &str, value: Value) -> Result<String, Error> {
    let json = to_json_value(&value)?;
    let Some(pruned) = prune_zero(&json) else {
        return Ok(String::new());
    };
    match pruned {
        serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
            Ok(format!("{}:\n{}", key, indent(&yaml_text(&pruned)?, 2)))
        }
        scalar => Ok(format!("{}: {}", key, flow(&scalar))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn v(json: serde_json::Value) -> Value {
        Value::from_serialize(&json)
    }

    #[test]
    fn to_yaml_trims_trailing_newline() {
        let out = to_yaml(v(json!({"cpu": "100m"}))).unwrap();
        assert_eq!(out, "cpu: 100m");
    }

    #[test]
    fn yaml_and_json_parse_back() {
        let parsed = from_yaml("a:\n  b: 1").unwrap();
        assert_eq!(to_json(parsed).unwrap(), r#"{"a":{"b":1}}"#);

        let parsed = from_json(r#"{"x":[1,2]}"#).unwrap();
        assert_eq!(to_yaml(parsed).unwrap(), "x:\n- 1\n- 2");

        assert!(from_json("{").is_err());
    }

    #[test]
    fn to_json_pb_drops_zero_fields() {
        let out = to_json_pb(v(json!({
            "holdApplicationUntilProxyStarts": true,
            "proxyMetadata": {},
            "concurrency": 0,
            "image": ""
        })))
        .unwrap();
        assert_eq!(out, r#"{"holdApplicationUntilProxyStarts":true}"#);
        assert_eq!(to_json_pb(v(json!({"a": false}))).unwrap(), "{}");
    }

    #[test]
    fn indent_and_nindent() {
        assert_eq!(indent("a: 1\nb:\n  c: 2", 4), "    a: 1\n    b:\n      c: 2");
        assert_eq!(nindent("a: 1", 2), "\n  a: 1");
        assert_eq!(indent("a\n\nb", 2), "  a\n\n  b");
    }

    #[test]
    fn value_if_omits_zero_values() {
        assert_eq!(value_if("enabled", v(json!(false))).unwrap(), "");
        assert_eq!(value_if("hub", v(json!(""))).unwrap(), "");
        assert_eq!(value_if("hub", Value::UNDEFINED).unwrap(), "");
        assert_eq!(value_if("enabled", v(json!(true))).unwrap(), "enabled: true");
        assert_eq!(value_if("replicaCount", v(json!(2))).unwrap(), "replicaCount: 2");
        assert_eq!(
            value_if("env", v(json!({"A": "1", "B": ""}))).unwrap(),
            r#"env: {"A": "1"}"#
        );
        assert_eq!(
            value_if("imagePullSecrets", v(json!([{"name": "regcred"}]))).unwrap(),
            r#"imagePullSecrets: [{"name": "regcred"}]"#
        );
    }

    #[test]
    fn value_if_output_is_single_line_yaml() {
        assert_eq!(value_if("tag", v(json!("1.11"))).unwrap(), r#"tag: "1.11""#);
        let out = value_if("sidecar", v(json!("line one\nline: two"))).unwrap();
        assert_eq!(out.lines().count(), 1);
        let parsed = meshplane_common::yaml::parse_yaml(&out).unwrap();
        assert_eq!(parsed["sidecar"], "line one\nline: two");
    }

    #[test]
    fn to_yaml_if_nested_default_message_is_omitted() {
        let out = to_yaml_if("resources", v(json!({"limits": {}, "requests": {"cpu": ""}}))).unwrap();
        assert_eq!(out, "");
    }

    #[test]
    fn to_yaml_if_emits_block() {
        let out = to_yaml_if(
            "resources",
            v(json!({"limits": {"cpu": "2"}, "requests": {"cpu": ""}})),
        )
        .unwrap();
        assert_eq!(out, "resources:\n  limits:\n    cpu: '2'");
    }

    #[test]
    fn include_renders_nested_template() {
        let mut env = minijinja::Environment::new();
        env.add_function("include", include);
        env.add_filter("toYaml", to_yaml);
        env.add_template("_labels.tpl", "app: {{ name }}").unwrap();
        env.add_template("main.tpl", r#"{{ include("_labels.tpl", {"name": "istiod"}) }}"#)
            .unwrap();
        let out = env
            .get_template("main.tpl")
            .unwrap()
            .render(minijinja::context! {})
            .unwrap();
        assert_eq!(out, "app: istiod");
    }
}
