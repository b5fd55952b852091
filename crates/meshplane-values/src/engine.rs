//! Values template engine
//!
//! Every `.tpl` file of a chart is loaded into one minijinja environment so
//! templates can `include` each other. Undefined lookups are chainable and
//! render as empty, which lets templates reference optional spec fields
//! without guards.

use minijinja::{AutoEscape, Environment, UndefinedBehavior, Value};
use serde::Serialize;
use tracing::debug;

use crate::chart::Chart;
use crate::error::TemplateError;
use crate::filters;
use crate::values::Values;

/// Template engine bound to one chart's embedded templates
pub struct TemplateEngine {
    chart: Chart,
    env: Environment<'static>,
}

impl TemplateEngine {
    /// Build an engine for a chart.
    ///
    /// Fails when an embedded template does not parse.
    pub fn for_chart(chart: Chart) -> Result<Self, TemplateError> {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Chainable);
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        env.set_auto_escape_callback(|_| AutoEscape::None);

        env.add_filter("toYaml", filters::to_yaml);
        env.add_filter("fromYaml", filters::from_yaml);
        env.add_filter("toJson", filters::to_json);
        env.add_filter("fromJson", filters::from_json);
        env.add_filter("toJsonPb", filters::to_json_pb);
        env.add_filter("indent", filters::indent);
        env.add_filter("nindent", filters::nindent);
        env.add_function("include", filters::include);
        env.add_function("valueIf", filters::value_if);
        env.add_function("toYamlIf", filters::to_yaml_if);

        for file in chart.templates() {
            env.add_template(file.path, file.contents)
                .map_err(|source| TemplateError::Render {
                    template: file.path.to_string(),
                    body: file.contents.to_string(),
                    source,
                })?;
        }

        Ok(Self { chart, env })
    }

    /// The chart this engine renders
    pub fn chart(&self) -> &Chart {
        &self.chart
    }

    /// Render a template to text
    pub fn render_text<T: Serialize>(
        &self,
        template_name: &str,
        input: &T,
    ) -> Result<String, TemplateError> {
        if self.chart.file(template_name).is_none() {
            return Err(TemplateError::NotFound {
                chart: self.chart.name.to_string(),
                template: template_name.to_string(),
            });
        }

        let json = serde_json::to_value(input).map_err(|e| TemplateError::Input {
            template: template_name.to_string(),
            message: e.to_string(),
        })?;

        let template = self
            .env
            .get_template(template_name)
            .map_err(|source| self.render_error(template_name, source))?;
        template
            .render(Value::from_serialize(&json))
            .map_err(|source| self.render_error(template_name, source))
    }

    /// Render a template and decode the output into a values tree
    pub fn render_values<T: Serialize>(
        &self,
        template_name: &str,
        input: &T,
    ) -> Result<Values, TemplateError> {
        let text = self.render_text(template_name, input)?;
        let mut values = decode_values(template_name, &text)?;
        values.prune_empty();
        debug!(
            chart = self.chart.name,
            template = template_name,
            keys = values.as_map().len(),
            "rendered values"
        );
        Ok(values)
    }

    /// Attach the body of the template that actually failed, which may be
    /// an included one.
    fn render_error(&self, template_name: &str, source: minijinja::Error) -> TemplateError {
        let failing = source.name().unwrap_or(template_name).to_string();
        let body = self
            .chart
            .file(&failing)
            .or_else(|| self.chart.file(template_name))
            .unwrap_or_default()
            .to_string();
        TemplateError::Render {
            template: failing,
            body,
            source,
        }
    }
}

fn decode_values(template_name: &str, text: &str) -> Result<Values, TemplateError> {
    let parsed = meshplane_common::yaml::parse_yaml(text).map_err(|e| TemplateError::Decode {
        template: template_name.to_string(),
        message: e.to_string(),
    })?;
    match parsed {
        serde_json::Value::Null => Ok(Values::new()),
        serde_json::Value::Object(map) => Ok(Values::from(map)),
        other => Err(TemplateError::Decode {
            template: template_name.to_string(),
            message: format!("expected a mapping, got {}", json_type(&other)),
        }),
    }
}

fn json_type(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "a sequence",
        serde_json::Value::Object(_) => "a mapping",
    }
}

/// Serialize `input`, execute `template_name` from `chart` against it and
/// decode the result.
pub fn transform<T: Serialize>(
    input: &T,
    chart: Chart,
    template_name: &str,
) -> Result<Values, TemplateError> {
    TemplateEngine::for_chart(chart)?.render_values(template_name, input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart::{ChartFile, VALUES_TEMPLATE};
    use serde_json::json;

    const VALUES: &str = r#"
global:
  {{ valueIf("hub", spec.hub) }}
  {{ valueIf("tag", spec.tag) }}
pilot:
{{- toYamlIf("resources", spec.resources) | nindent(2) }}
{% if properties.revision %}
revision: {{ properties.revision }}
{% endif %}
{{ include("_mesh.tpl", spec) }}
"#;

    const MESH: &str = r#"{{ toYamlIf("meshConfig", meshConfig) }}"#;

    const BROKEN: &str = "a: {{ spec.x | doesNotExist }}";

    const FILES: &[ChartFile] = &[
        ChartFile {
            path: VALUES_TEMPLATE,
            contents: VALUES,
        },
        ChartFile {
            path: "_mesh.tpl",
            contents: MESH,
        },
        ChartFile {
            path: "broken.tpl",
            contents: BROKEN,
        },
        ChartFile {
            path: "list.tpl",
            contents: "- a\n- b",
        },
    ];

    fn chart() -> Chart {
        Chart {
            name: "test",
            files: FILES,
        }
    }

    #[test]
    fn empty_input_renders_no_keys() {
        let values = transform(&json!({"spec": {}, "properties": {}}), chart(), VALUES_TEMPLATE).unwrap();
        assert!(values.is_empty(), "unexpected values: {values:?}");
    }

    #[test]
    fn zero_fields_are_omitted() {
        let input = json!({
            "spec": {"hub": "", "tag": "1.11.1", "resources": {"limits": {}}, "meshConfig": {"enableTracing": false}},
            "properties": {"revision": ""}
        });
        let values = transform(&input, chart(), VALUES_TEMPLATE).unwrap();
        assert_eq!(serde_json::Value::from(values), json!({"global": {"tag": "1.11.1"}}));
    }

    #[test]
    fn full_input_renders_structured_values() {
        let input = json!({
            "spec": {
                "hub": "gcr.io/istio",
                "resources": {"requests": {"cpu": "500m"}},
                "meshConfig": {"enableTracing": true}
            },
            "properties": {"revision": "cp-v111x"}
        });
        let values = transform(&input, chart(), VALUES_TEMPLATE).unwrap();
        assert_eq!(values.get("global.hub"), Some(&json!("gcr.io/istio")));
        assert_eq!(values.get("pilot.resources.requests.cpu"), Some(&json!("500m")));
        assert_eq!(values.get("revision"), Some(&json!("cp-v111x")));
        assert_eq!(values.get("meshConfig.enableTracing"), Some(&json!(true)));
    }

    #[test]
    fn rendering_is_idempotent() {
        let input = json!({
            "spec": {"hub": "gcr.io/istio", "tag": "1.11.1", "resources": {"limits": {"memory": "1Gi"}}},
            "properties": {"revision": "cp"}
        });
        let engine = TemplateEngine::for_chart(chart()).unwrap();
        let first = engine.render_text(VALUES_TEMPLATE, &input).unwrap();
        let second = engine.render_text(VALUES_TEMPLATE, &input).unwrap();
        assert_eq!(first, second);
        assert_eq!(
            engine.render_values(VALUES_TEMPLATE, &input).unwrap(),
            engine.render_values(VALUES_TEMPLATE, &input).unwrap()
        );
    }

    #[test]
    fn failures_carry_template_body() {
        let err = TemplateEngine::for_chart(chart())
            .and_then(|engine| engine.render_values("broken.tpl", &json!({"spec": {}})))
            .unwrap_err();
        match &err {
            TemplateError::Render { template, body, .. } => {
                assert_eq!(template, "broken.tpl");
                assert_eq!(body, BROKEN);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(err.to_string().contains("doesNotExist"));
    }

    #[test]
    fn missing_template_is_reported() {
        let err = transform(&json!({}), chart(), "nope.tpl").unwrap_err();
        assert!(matches!(err, TemplateError::NotFound { .. }));
    }

    #[test]
    fn non_mapping_output_is_a_decode_error() {
        let err = transform(&json!({}), chart(), "list.tpl").unwrap_err();
        match err {
            TemplateError::Decode { message, .. } => assert!(message.contains("sequence")),
            other => panic!("unexpected {other:?}"),
        }
    }
}
