//! Structured Helm values tree
//!
//! Values are kept as a `serde_json` mapping so that composition and
//! comparison are structural. "Zero" follows proto3 semantics: null, false,
//! 0, "", empty sequences, and mappings whose every entry is zero.

use meshplane_common::yaml::{to_yaml_string, YamlError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A Helm values document
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Values(Map<String, Value>);

impl Values {
    /// Empty values
    pub fn new() -> Self {
        Self::default()
    }

    /// Borrow the underlying mapping
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Take the underlying mapping
    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    /// True when there are no top-level keys
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Look up a dotted path such as `global.hub`
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let mut current = self.0.get(parts.next()?)?;
        for part in parts {
            current = current.as_object()?.get(part)?;
        }
        Some(current)
    }

    /// Set a dotted path, creating intermediate mappings
    pub fn set(&mut self, path: &str, value: Value) {
        let mut parts: Vec<&str> = path.split('.').collect();
        let Some(last) = parts.pop() else {
            return;
        };
        let mut current = &mut self.0;
        for part in parts {
            let entry = current
                .entry(part.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            let Value::Object(next) = entry else {
                return;
            };
            current = next;
        }
        current.insert(last.to_string(), value);
    }

    /// Merge `other` into `self`; `other` wins on scalar conflicts and
    /// mappings merge recursively.
    pub fn merge(&mut self, other: Values) {
        merge_maps(&mut self.0, other.0);
    }

    /// Drop nulls and mappings left empty, recursively.
    ///
    /// Template sections whose every conditional key was omitted decode as
    /// `section: null`; this removes them without touching explicit
    /// `false`/`0` values emitted by the chart logic.
    pub fn prune_empty(&mut self) {
        prune_empty_map(&mut self.0);
    }

    /// Render as a YAML document
    pub fn to_yaml(&self) -> Result<String, YamlError> {
        to_yaml_string(&self.0)
    }
}

impl From<Map<String, Value>> for Values {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl From<Values> for Value {
    fn from(values: Values) -> Self {
        Value::Object(values.0)
    }
}

/// Proto3 style zero check, recursive through mappings
pub fn is_zero(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f == 0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.values().all(is_zero),
    }
}

/// Remove zero fields from mappings recursively.
///
/// Returns `None` when the value itself is zero. Sequence elements are kept
/// in place (their position is meaningful) but pruned internally.
pub fn prune_zero(value: &Value) -> Option<Value> {
    match value {
        Value::Object(map) => {
            let pruned: Map<String, Value> = map
                .iter()
                .filter_map(|(k, v)| prune_zero(v).map(|v| (k.clone(), v)))
                .collect();
            if pruned.is_empty() {
                None
            } else {
                Some(Value::Object(pruned))
            }
        }
        Value::Array(items) if !items.is_empty() => Some(Value::Array(
            items
                .iter()
                .map(|item| prune_zero(item).unwrap_or_else(|| empty_like(item)))
                .collect(),
        )),
        v if is_zero(v) => None,
        v => Some(v.clone()),
    }
}

fn empty_like(value: &Value) -> Value {
    match value {
        Value::Object(_) => Value::Object(Map::new()),
        other => other.clone(),
    }
}

fn merge_maps(base: &mut Map<String, Value>, overlay: Map<String, Value>) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                merge_maps(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

fn prune_empty_map(map: &mut Map<String, Value>) {
    map.retain(|_, value| {
        prune_empty_value(value);
        match value {
            Value::Null => false,
            Value::Object(inner) => !inner.is_empty(),
            _ => true,
        }
    });
}

fn prune_empty_value(value: &mut Value) {
    match value {
        Value::Object(map) => prune_empty_map(map),
        Value::Array(items) => items.iter_mut().for_each(prune_empty_value),
        _ => {}
    }
}
